//! Page extraction: raw engine detections to a normalized [`Page`].

use crate::error::EngineInferError;
use crate::normalize::NormalizedImage;
use crate::ocr::Detection;
use crate::reader_cache::ReaderHandle;
use crate::schema::{round_to, Block, Page, Position};
use tracing::debug;

/// Blocks whose rounded confidence is at or below this are dropped.
pub const MIN_CONFIDENCE: f64 = 0.1;

/// Turns one image's detections into blocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageExtractor;

impl PageExtractor {
    /// Run the reader on `image` and build page `page_number`.
    ///
    /// Engine failures are returned; whether they sink the document is the
    /// dispatcher's call.
    pub fn extract(
        &self,
        image: &NormalizedImage,
        reader: &ReaderHandle,
        page_number: u32,
    ) -> Result<Page, EngineInferError> {
        let detections = reader.infer(image)?;
        let total = detections.len();
        let blocks = self.blocks(detections);

        debug!(
            "Page {}: kept {} of {} detections (size {:?}, re-encoded: {})",
            page_number,
            blocks.len(),
            total,
            image.dimensions(),
            image.is_reencoded()
        );
        Ok(Page {
            page_number,
            blocks,
        })
    }

    /// Round, filter and trim, keeping the engine's order.
    ///
    /// The threshold applies to the rounded confidence, so no emitted block
    /// reports a confidence at or below [`MIN_CONFIDENCE`].
    pub fn blocks(&self, detections: Vec<Detection>) -> Vec<Block> {
        detections
            .into_iter()
            .filter_map(|d| {
                let confidence = round_to(d.confidence, 3);
                (confidence > MIN_CONFIDENCE).then(|| Block {
                    text: d.text.trim().to_string(),
                    confidence,
                    position: Position::from_corners(d.quad).rounded(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::languages::LanguageSet;
    use crate::ocr::EngineFactory;
    use crate::testing::{detection, StubFactory};

    fn reader(detections: Vec<Detection>) -> ReaderHandle {
        let factory = StubFactory::new(detections);
        let engine = factory.construct(&LanguageSet::english()).unwrap();
        ReaderHandle::new(LanguageSet::english(), engine)
    }

    #[test]
    fn test_trims_text_and_keeps_confidence() {
        let reader = reader(vec![detection(" OCR ", 0.42, 0.0, 0.0)]);
        let image = NormalizedImage::original("/tmp/page.png");

        let page = PageExtractor.extract(&image, &reader, 1).unwrap();
        assert_eq!(page.page_number, 1);
        assert_eq!(page.blocks.len(), 1);
        assert_eq!(page.blocks[0].text, "OCR");
        assert_eq!(page.blocks[0].confidence, 0.42);
    }

    #[test]
    fn test_drops_low_confidence_inclusive() {
        let blocks = PageExtractor.blocks(vec![
            detection("keep", 0.1006, 0.0, 0.0),
            detection("edge", 0.1, 0.0, 0.0),
            detection("noise", 0.05, 0.0, 0.0),
            detection("zero", 0.0, 0.0, 0.0),
        ]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].text, "keep");
        assert_eq!(blocks[0].confidence, 0.101);
    }

    #[test]
    fn test_threshold_applies_after_rounding() {
        let blocks = PageExtractor.blocks(vec![
            detection("a", 0.1001, 0.0, 0.0),
            detection("b", 0.1004, 0.0, 0.0),
            detection("c", 0.1006, 0.0, 0.0),
        ]);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["c"]);
        assert!(blocks.iter().all(|b| b.confidence > MIN_CONFIDENCE));
    }

    #[test]
    fn test_rounding() {
        let mut d = detection("x", 0.987654, 0.0, 0.0);
        d.quad = [[1.005, 2.3333], [10.126, 2.3333], [10.126, 20.999], [1.005, 20.999]];

        let blocks = PageExtractor.blocks(vec![d]);
        assert_eq!(blocks[0].confidence, 0.988);
        assert_eq!(blocks[0].position.top_left[1], 2.33);
        assert_eq!(blocks[0].position.top_right, [10.13, 2.33]);
        assert_eq!(blocks[0].position.bottom_right, [10.13, 21.0]);
    }

    #[test]
    fn test_preserves_order_and_duplicates() {
        let blocks = PageExtractor.blocks(vec![
            detection("b", 0.5, 0.0, 50.0),
            detection("a", 0.9, 0.0, 0.0),
            detection("b", 0.5, 0.0, 50.0),
        ]);
        let texts: Vec<&str> = blocks.iter().map(|b| b.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "b"]);
    }

    #[test]
    fn test_engine_failure_propagates() {
        let factory = StubFactory::new(vec![detection("x", 0.9, 0.0, 0.0)]).failing_on("bad");
        let engine = factory.construct(&LanguageSet::english()).unwrap();
        let reader = ReaderHandle::new(LanguageSet::english(), engine);

        let image = NormalizedImage::original("/tmp/bad.png");
        let result = PageExtractor.extract(&image, &reader, 2);
        assert!(matches!(result, Err(EngineInferError::Failed { .. })));
    }
}
