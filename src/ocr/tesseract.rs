//! Tesseract CLI recognition engine.
//!
//! Runs `tesseract` out of process and parses its TSV output. Word rows are
//! grouped into text lines so each detection is a phrase with one box, which
//! matches what callers expect from a line-level recognizer.

use super::{Detection, EngineFactory, RecognitionEngine};
use crate::error::{EngineInferError, EngineInitError};
use crate::languages::LanguageSet;
use crate::normalize::NormalizedImage;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Command;
use tracing::{debug, info};

/// Fully automatic page segmentation.
const DEFAULT_PSM: u8 = 3;

/// Request codes (as accepted by the HTTP API) to Tesseract traineddata names.
const LANGUAGE_MAP: &[(&str, &str)] = &[
    ("en", "eng"),
    ("fr", "fra"),
    ("de", "deu"),
    ("es", "spa"),
    ("it", "ita"),
    ("pt", "por"),
    ("nl", "nld"),
    ("pl", "pol"),
    ("ru", "rus"),
    ("uk", "ukr"),
    ("tr", "tur"),
    ("ar", "ara"),
    ("fa", "fas"),
    ("hi", "hin"),
    ("bn", "ben"),
    ("ta", "tam"),
    ("te", "tel"),
    ("th", "tha"),
    ("vi", "vie"),
    ("id", "ind"),
    ("ja", "jpn"),
    ("ko", "kor"),
    ("ch_sim", "chi_sim"),
    ("ch_tra", "chi_tra"),
];

/// Map a request code to a traineddata name. Three-letter codes and
/// Tesseract-style names with an underscore pass through unchanged.
pub fn tesseract_code(code: &str) -> Option<String> {
    if let Some((_, tess)) = LANGUAGE_MAP.iter().find(|(short, _)| *short == code) {
        return Some(tess.to_string());
    }
    let looks_native = code.len() == 3 || (code.len() > 4 && code.contains('_'));
    if looks_native && code.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Some(code.to_string());
    }
    None
}

/// Builds [`TesseractEngine`] instances for a language set.
pub struct TesseractFactory {
    binary: PathBuf,
    psm: u8,
}

impl TesseractFactory {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            psm: DEFAULT_PSM,
        }
    }

    /// Traineddata names reported by `tesseract --list-langs`.
    fn installed_languages(&self) -> Result<BTreeSet<String>, EngineInitError> {
        let output = Command::new(&self.binary)
            .arg("--list-langs")
            .output()
            .map_err(|e| {
                EngineInitError::Unavailable(format!(
                    "failed to run {}: {}",
                    self.binary.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineInitError::Unavailable(format!(
                "{} --list-langs exited with {}: {}",
                self.binary.display(),
                output.status,
                stderr.trim()
            )));
        }

        // Older releases print the list on stderr.
        let mut listing = String::from_utf8_lossy(&output.stdout).into_owned();
        if listing.trim().is_empty() {
            listing = String::from_utf8_lossy(&output.stderr).into_owned();
        }
        Ok(parse_language_listing(&listing))
    }
}

impl EngineFactory for TesseractFactory {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn construct(
        &self,
        languages: &LanguageSet,
    ) -> Result<Box<dyn RecognitionEngine>, EngineInitError> {
        let codes = languages
            .iter()
            .map(|code| {
                tesseract_code(code)
                    .ok_or_else(|| EngineInitError::UnsupportedLanguage(code.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let installed = self.installed_languages()?;
        let missing: Vec<String> = codes
            .iter()
            .filter(|c| !installed.contains(*c))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EngineInitError::MissingLanguageData {
                languages: languages.clone(),
                missing,
            });
        }

        info!("Tesseract reader ready for {} ({})", languages, codes.join("+"));
        Ok(Box::new(TesseractEngine {
            binary: self.binary.clone(),
            lang_arg: codes.join("+"),
            psm: self.psm,
        }))
    }

    fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// One Tesseract configuration. Every call is a separate process, so the
/// instance holds no mutable state.
pub struct TesseractEngine {
    binary: PathBuf,
    lang_arg: String,
    psm: u8,
}

impl RecognitionEngine for TesseractEngine {
    fn infer(&self, image: &NormalizedImage) -> Result<Vec<Detection>, EngineInferError> {
        let output = Command::new(&self.binary)
            .arg(image.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.lang_arg)
            .arg("--psm")
            .arg(self.psm.to_string())
            .arg("tsv")
            .output()?;

        if !output.status.success() {
            return Err(EngineInferError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let tsv = String::from_utf8_lossy(&output.stdout);
        let detections = parse_tsv(&tsv)?;
        debug!(
            "Tesseract read {} lines from {}",
            detections.len(),
            image.path().display()
        );
        Ok(detections)
    }

    fn supports_concurrent_inference(&self) -> bool {
        true
    }
}

fn parse_language_listing(listing: &str) -> BTreeSet<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with("List of"))
        .map(str::to_string)
        .collect()
}

/// Word-level TSV row (`level` 5).
struct Word<'a> {
    line_key: (u32, u32, u32, u32),
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
    conf: f64,
    text: &'a str,
}

struct LineAcc {
    key: (u32, u32, u32, u32),
    words: Vec<String>,
    conf_sum: f64,
    left: f64,
    top: f64,
    right: f64,
    bottom: f64,
}

impl LineAcc {
    fn start(word: &Word<'_>) -> Self {
        Self {
            key: word.line_key,
            words: vec![word.text.to_string()],
            conf_sum: word.conf,
            left: word.left,
            top: word.top,
            right: word.right,
            bottom: word.bottom,
        }
    }

    fn push(&mut self, word: &Word<'_>) {
        self.words.push(word.text.to_string());
        self.conf_sum += word.conf;
        self.left = self.left.min(word.left);
        self.top = self.top.min(word.top);
        self.right = self.right.max(word.right);
        self.bottom = self.bottom.max(word.bottom);
    }

    fn finish(self) -> Detection {
        let confidence = self.conf_sum / self.words.len() as f64 / 100.0;
        Detection {
            quad: [
                [self.left, self.top],
                [self.right, self.top],
                [self.right, self.bottom],
                [self.left, self.bottom],
            ],
            text: self.words.join(" "),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// Parse `tesseract ... tsv` output into line detections in reading order.
pub fn parse_tsv(tsv: &str) -> Result<Vec<Detection>, EngineInferError> {
    let mut lines = tsv.lines();
    match lines.next() {
        Some(header) if header.starts_with("level") => {}
        Some(other) => {
            return Err(EngineInferError::MalformedOutput(format!(
                "unexpected TSV header: {}",
                other
            )))
        }
        None => return Ok(Vec::new()),
    }

    let mut detections = Vec::new();
    let mut current: Option<LineAcc> = None;

    for row in lines {
        let Some(word) = parse_word(row)? else {
            continue;
        };
        if let Some(acc) = current.as_mut().filter(|acc| acc.key == word.line_key) {
            acc.push(&word);
            continue;
        }
        if let Some(done) = current.replace(LineAcc::start(&word)) {
            detections.push(done.finish());
        }
    }
    if let Some(done) = current {
        detections.push(done.finish());
    }

    Ok(detections)
}

fn parse_word(row: &str) -> Result<Option<Word<'_>>, EngineInferError> {
    if row.trim().is_empty() {
        return Ok(None);
    }
    let cols: Vec<&str> = row.splitn(12, '\t').collect();
    if cols.len() < 11 {
        return Err(EngineInferError::MalformedOutput(format!(
            "expected at least 11 TSV columns, got {}: {:?}",
            cols.len(),
            row
        )));
    }
    if cols[0] != "5" {
        return Ok(None);
    }

    let text = cols.get(11).map(|t| t.trim()).unwrap_or("");
    let num = |i: usize| -> Result<f64, EngineInferError> {
        cols[i].trim().parse::<f64>().map_err(|_| {
            EngineInferError::MalformedOutput(format!("bad numeric column {}: {:?}", i, cols[i]))
        })
    };
    let id = |i: usize| -> Result<u32, EngineInferError> {
        cols[i].trim().parse::<u32>().map_err(|_| {
            EngineInferError::MalformedOutput(format!("bad id column {}: {:?}", i, cols[i]))
        })
    };

    let conf = num(10)?;
    if conf < 0.0 || text.is_empty() {
        return Ok(None);
    }

    let (left, top, width, height) = (num(6)?, num(7)?, num(8)?, num(9)?);
    Ok(Some(Word {
        line_key: (id(1)?, id(2)?, id(3)?, id(4)?),
        left,
        top,
        right: left + width,
        bottom: top + height,
        conf,
        text,
    }))
}
