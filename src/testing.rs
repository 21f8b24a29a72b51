//! Test doubles for the recognition engine and the rasterizer.

use crate::error::{EngineInferError, EngineInitError, RasterizeError};
use crate::languages::LanguageSet;
use crate::normalize::NormalizedImage;
use crate::ocr::{Detection, EngineFactory, RecognitionEngine};
use crate::rasterize::{RasterizedDocument, RasterizedPage, Rasterizer};
use image::{ImageBuffer, Rgb};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Axis-aligned detection at `(x, y)` with a 100x20 box.
pub fn detection(text: &str, confidence: f64, x: f64, y: f64) -> Detection {
    Detection {
        quad: [[x, y], [x + 100.0, y], [x + 100.0, y + 20.0], [x, y + 20.0]],
        text: text.to_string(),
        confidence,
    }
}

/// Factory producing [`StubEngine`]s that return a fixed detection list.
pub struct StubFactory {
    detections: Vec<Detection>,
    supported: Option<Vec<String>>,
    fail_marker: Option<String>,
    concurrent: bool,
    construct_delay: Duration,
    infer_delay: Duration,
    attempts: Mutex<Vec<LanguageSet>>,
    constructed: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl StubFactory {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            supported: None,
            fail_marker: None,
            concurrent: false,
            construct_delay: Duration::ZERO,
            infer_delay: Duration::ZERO,
            attempts: Mutex::new(Vec::new()),
            constructed: AtomicUsize::new(0),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Only these codes construct successfully.
    pub fn supporting(mut self, codes: &[&str]) -> Self {
        self.supported = Some(codes.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Inference fails for images whose path contains `marker`.
    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_string());
        self
    }

    pub fn concurrent(mut self) -> Self {
        self.concurrent = true;
        self
    }

    pub fn with_construct_delay_ms(mut self, ms: u64) -> Self {
        self.construct_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_infer_delay_ms(mut self, ms: u64) -> Self {
        self.infer_delay = Duration::from_millis(ms);
        self
    }

    /// Every language set `construct` was called with, in order.
    pub fn attempts(&self) -> Vec<LanguageSet> {
        self.attempts.lock().clone()
    }

    /// Successful constructions.
    pub fn construct_count(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `infer` calls seen by any engine.
    pub fn max_in_flight(&self) -> Arc<AtomicUsize> {
        self.max_in_flight.clone()
    }

    /// Image paths handed to `infer`, across all engines.
    pub fn seen_paths(&self) -> Vec<PathBuf> {
        self.seen.lock().clone()
    }
}

impl EngineFactory for StubFactory {
    fn name(&self) -> &str {
        "stub"
    }

    fn construct(
        &self,
        languages: &LanguageSet,
    ) -> Result<Box<dyn RecognitionEngine>, EngineInitError> {
        self.attempts.lock().push(languages.clone());
        std::thread::sleep(self.construct_delay);

        if let Some(supported) = &self.supported {
            if let Some(bad) = languages.iter().find(|c| !supported.iter().any(|s| s.as_str() == *c)) {
                return Err(EngineInitError::UnsupportedLanguage(bad.to_string()));
            }
        }

        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StubEngine {
            detections: self.detections.clone(),
            fail_marker: self.fail_marker.clone(),
            concurrent: self.concurrent,
            delay: self.infer_delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: self.max_in_flight.clone(),
            seen: self.seen.clone(),
        }))
    }
}

pub struct StubEngine {
    detections: Vec<Detection>,
    fail_marker: Option<String>,
    concurrent: bool,
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl RecognitionEngine for StubEngine {
    fn infer(&self, image: &NormalizedImage) -> Result<Vec<Detection>, EngineInferError> {
        self.seen.lock().push(image.path().to_path_buf());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let path = image.path().to_string_lossy();
        match &self.fail_marker {
            Some(marker) if path.contains(marker.as_str()) => Err(EngineInferError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("stub failure on {}", path),
            }),
            _ => Ok(self.detections.clone()),
        }
    }

    fn supports_concurrent_inference(&self) -> bool {
        self.concurrent
    }
}

/// Writes `pages` small PNGs named `page-<n>.png`, or fails outright.
pub struct StubRasterizer {
    pub pages: u32,
    pub fail: bool,
    calls: Mutex<Vec<(u32, u32)>>,
    workspaces: Mutex<Vec<PathBuf>>,
}

impl StubRasterizer {
    pub fn new(pages: u32) -> Self {
        Self {
            pages,
            fail: false,
            calls: Mutex::new(Vec::new()),
            workspaces: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0)
        }
    }

    /// `(dpi, max_pages)` of every call.
    pub fn calls(&self) -> Vec<(u32, u32)> {
        self.calls.lock().clone()
    }

    /// Scratch directories created so far.
    pub fn workspaces(&self) -> Vec<PathBuf> {
        self.workspaces.lock().clone()
    }
}

impl Rasterizer for StubRasterizer {
    fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        max_pages: u32,
    ) -> Result<RasterizedDocument, RasterizeError> {
        self.calls.lock().push((dpi, max_pages));
        if self.fail {
            return Err(RasterizeError::Failed {
                status: "exit status: 1".to_string(),
                stderr: format!("Syntax Error: Couldn't read xref table in {}", pdf.display()),
            });
        }

        let workspace = tempfile::tempdir().map_err(RasterizeError::Workspace)?;
        self.workspaces.lock().push(workspace.path().to_path_buf());
        let mut pages = Vec::new();
        for n in 1..=self.pages.min(max_pages) {
            let path = workspace.path().join(format!("page-{}.png", n));
            write_png(&path, 40, 20);
            pages.push(RasterizedPage {
                page_number: n,
                path,
            });
        }
        Ok(RasterizedDocument::new(workspace, pages, Some(self.pages)))
    }
}

/// Write a small white RGB PNG.
pub fn write_png(path: &Path, width: u32, height: u32) {
    ImageBuffer::from_pixel(width, height, Rgb([255u8, 255, 255]))
        .save(path)
        .unwrap();
}
