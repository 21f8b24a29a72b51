//! Error taxonomy for the OCR pipeline.
//!
//! Each collaborator gets its own error type so the dispatcher can decide
//! per failure whether it is page-local or fatal to the document.

use std::path::PathBuf;
use thiserror::Error;

use crate::languages::LanguageSet;

/// Recognition engine could not be constructed for a language set.
#[derive(Debug, Error)]
pub enum EngineInitError {
    #[error("unsupported language code: {0}")]
    UnsupportedLanguage(String),

    #[error("language data not installed for {languages}: missing {missing:?}")]
    MissingLanguageData {
        languages: LanguageSet,
        missing: Vec<String>,
    },

    #[error("recognition engine unavailable: {0}")]
    Unavailable(String),

    /// Construction failed for the requested set and again for the English fallback.
    #[error("failed to initialise reader for {requested} ({cause}); English fallback also failed ({fallback})")]
    FallbackFailed {
        requested: LanguageSet,
        cause: Box<EngineInitError>,
        fallback: Box<EngineInitError>,
    },
}

/// Recognition engine failed while reading one image.
#[derive(Debug, Error)]
pub enum EngineInferError {
    #[error("failed to run recognition engine: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("recognition engine exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("malformed recognition output: {0}")]
    MalformedOutput(String),
}

/// PDF could not be turned into page images.
#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("failed to prepare rasterization workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("failed to run rasterizer: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("rasterizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("rasterizer produced no pages for {}", .0.display())]
    NoPages(PathBuf),
}

/// Image could not be normalized. Always recovered by using the original image.
#[derive(Debug, Error)]
pub enum NormalizationError {
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to write normalized image: {0}")]
    Io(#[from] std::io::Error),
}

/// The whole document could not be produced.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("reader initialisation failed: {0}")]
    EngineInit(#[from] EngineInitError),

    #[error("PDF rasterization failed: {0}")]
    Rasterize(#[from] RasterizeError),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] EngineInferError),
}
