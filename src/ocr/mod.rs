//! Recognition engine abstraction.
//!
//! Defines the [`EngineFactory`] / [`RecognitionEngine`] traits so different
//! OCR backends can sit behind the reader cache. Engines are blocking: callers
//! in async code run them on the blocking pool.

pub mod tesseract;

use crate::error::{EngineInferError, EngineInitError};
use crate::languages::LanguageSet;
use crate::normalize::NormalizedImage;
use crate::schema::Point;

/// Raw engine output for one text region, before filtering and rounding.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Corners ordered top_left, top_right, bottom_right, bottom_left.
    pub quad: [Point; 4],
    pub text: String,
    pub confidence: f64,
}

/// A constructed recognizer bound to one language set.
pub trait RecognitionEngine: Send + Sync {
    /// Read one image. Detections come back in the engine's native order.
    fn infer(&self, image: &NormalizedImage) -> Result<Vec<Detection>, EngineInferError>;

    /// Whether `infer` may run concurrently on the same instance.
    fn supports_concurrent_inference(&self) -> bool {
        false
    }
}

/// Builds recognizers. Construction is the expensive step.
pub trait EngineFactory: Send + Sync {
    fn name(&self) -> &str;

    fn construct(
        &self,
        languages: &LanguageSet,
    ) -> Result<Box<dyn RecognitionEngine>, EngineInitError>;

    /// Cheap liveness probe used by the health endpoint.
    fn is_available(&self) -> bool {
        true
    }
}
