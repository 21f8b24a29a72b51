//! Document dispatcher.
//!
//! Entry point for one document: picks the image or PDF path, fans PDF pages
//! out to the extractor, folds per-page outcomes into a [`DocumentResult`].
//! A failing PDF page is skipped; only failures with no narrower scope
//! (reader init, rasterization, the single page of an image) fail the call.
//!
//! Intermediate files (page images, re-encoded copies) are owned by guards
//! that delete them when they go out of scope, on every exit path.

use crate::config::PipelineConfig;
use crate::error::{EngineInferError, PipelineError};
use crate::extractor::PageExtractor;
use crate::languages::LanguageSet;
use crate::normalize::ImageNormalizer;
use crate::rasterize::{RasterizedPage, Rasterizer};
use crate::reader_cache::{ReaderCache, ReaderHandle};
use crate::schema::{DocumentResult, Page};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Input format, decided once from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Image,
    Pdf,
}

impl DocumentKind {
    /// `.pdf` (any case) is a PDF; anything else was validated upstream as an image.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("pdf") => Self::Pdf,
            _ => Self::Image,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }
}

/// Result of extracting one PDF page.
#[derive(Debug)]
pub struct PageOutcome {
    pub page_number: u32,
    pub result: Result<Page, EngineInferError>,
}

/// Keep successful pages in page order; log and drop the rest.
pub fn fold_pages(outcomes: Vec<PageOutcome>) -> DocumentResult {
    let mut pages = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome.result {
            Ok(page) => pages.push(page),
            Err(e) => warn!("Skipping page {}: {}", outcome.page_number, e),
        }
    }
    DocumentResult { pages }
}

/// Runs documents through normalization, recognition and result shaping.
pub struct DocumentProcessor {
    readers: Arc<ReaderCache>,
    rasterizer: Arc<dyn Rasterizer>,
    normalizer: ImageNormalizer,
    extractor: PageExtractor,
    config: PipelineConfig,
}

impl DocumentProcessor {
    pub fn new(
        readers: Arc<ReaderCache>,
        rasterizer: Arc<dyn Rasterizer>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            readers,
            rasterizer,
            normalizer: ImageNormalizer::from_config(&config),
            extractor: PageExtractor,
            config,
        }
    }

    pub fn readers(&self) -> &ReaderCache {
        &self.readers
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Recognize text in the file at `path`.
    ///
    /// Blocking; call from a blocking context.
    pub fn process(
        &self,
        path: &Path,
        languages: &LanguageSet,
    ) -> Result<DocumentResult, PipelineError> {
        let kind = DocumentKind::from_path(path);
        info!(
            "Processing {} as {} with languages {}",
            path.display(),
            kind.as_str(),
            languages
        );

        let reader = self.readers.acquire(languages)?;
        if reader.languages() != languages {
            warn!("Reading {} with the {} reader", path.display(), reader.languages());
        }
        debug!("Dispatching to {} path", kind.as_str());
        let result = match kind {
            DocumentKind::Image => self.process_image(path, &reader),
            DocumentKind::Pdf => self.process_pdf(path, &reader),
        };

        match &result {
            Ok(doc) => info!(
                "Finished {}: pages {:?}, {} blocks",
                path.display(),
                doc.page_numbers(),
                doc.block_count()
            ),
            Err(e) => error!("Failed to process {}: {}", path.display(), e),
        }
        result
    }

    fn process_image(
        &self,
        path: &Path,
        reader: &ReaderHandle,
    ) -> Result<DocumentResult, PipelineError> {
        let image = self.normalizer.normalize(path);
        let page = self.extractor.extract(&image, reader, 1)?;
        Ok(DocumentResult { pages: vec![page] })
    }

    fn process_pdf(
        &self,
        path: &Path,
        reader: &ReaderHandle,
    ) -> Result<DocumentResult, PipelineError> {
        let rasterized =
            self.rasterizer
                .rasterize(path, self.config.pdf_dpi, self.config.max_pdf_pages)?;

        if let Some(total) = rasterized.source_pages() {
            if total > self.config.max_pdf_pages {
                info!(
                    "Page cap {} reached; {} later pages not processed",
                    self.config.max_pdf_pages,
                    total - self.config.max_pdf_pages
                );
            }
        }

        let outcomes = self.extract_pages(rasterized.pages(), reader);
        debug!("Aggregating {} page outcomes", outcomes.len());
        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        if failed > 0 {
            warn!(
                "{} of {} pages failed in {}",
                failed,
                outcomes.len(),
                path.display()
            );
        }
        Ok(fold_pages(outcomes))
    }

    /// Extract pages in order, across up to `page_workers` threads.
    fn extract_pages(&self, pages: &[RasterizedPage], reader: &ReaderHandle) -> Vec<PageOutcome> {
        let workers = self.config.page_workers.min(pages.len());
        if workers <= 1 {
            return pages
                .iter()
                .map(|page| self.extract_page(page, reader))
                .collect();
        }

        let chunk_size = pages.len().div_ceil(workers);
        debug!(
            "Extracting {} pages on {} workers",
            pages.len(),
            workers
        );
        std::thread::scope(|scope| {
            let handles: Vec<_> = pages
                .chunks(chunk_size)
                .map(|chunk| {
                    scope.spawn(move || {
                        chunk
                            .iter()
                            .map(|page| self.extract_page(page, reader))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|handle| match handle.join() {
                    Ok(outcomes) => outcomes,
                    Err(panic) => std::panic::resume_unwind(panic),
                })
                .collect()
        })
    }

    fn extract_page(&self, page: &RasterizedPage, reader: &ReaderHandle) -> PageOutcome {
        debug!("Extracting page {}", page.page_number);
        let image = self.normalizer.normalize(&page.path);
        PageOutcome {
            page_number: page.page_number,
            result: self.extractor.extract(&image, reader, page.page_number),
        }
    }
}
