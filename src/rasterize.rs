//! PDF rasterization.
//!
//! Pages are rendered by poppler's `pdftoppm` into a scratch directory owned by
//! the returned [`RasterizedDocument`]; dropping it deletes every page image.

use crate::error::RasterizeError;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// One rendered page; `page_number` is the 1-based index in the source PDF.
#[derive(Debug, Clone)]
pub struct RasterizedPage {
    pub page_number: u32,
    pub path: PathBuf,
}

/// Page images of one PDF, in page order, plus the directory that holds them.
#[derive(Debug)]
pub struct RasterizedDocument {
    pages: Vec<RasterizedPage>,
    source_pages: Option<u32>,
    workspace: Option<TempDir>,
}

impl RasterizedDocument {
    pub fn new(workspace: TempDir, mut pages: Vec<RasterizedPage>, source_pages: Option<u32>) -> Self {
        pages.sort_by_key(|p| p.page_number);
        pages.dedup_by_key(|p| p.page_number);
        Self {
            pages,
            source_pages,
            workspace: Some(workspace),
        }
    }

    pub fn pages(&self) -> &[RasterizedPage] {
        &self.pages
    }

    /// Page count of the source PDF, when it could be read.
    pub fn source_pages(&self) -> Option<u32> {
        self.source_pages
    }
}

impl Drop for RasterizedDocument {
    fn drop(&mut self) {
        if let Some(workspace) = self.workspace.take() {
            let path = workspace.path().to_path_buf();
            if let Err(e) = workspace.close() {
                warn!("Failed to remove rasterized pages in {}: {}", path.display(), e);
            }
        }
    }
}

/// Converts a PDF into page images.
pub trait Rasterizer: Send + Sync {
    /// Render pages `1..=max_pages` (or fewer, if the document is shorter) at `dpi`.
    fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        max_pages: u32,
    ) -> Result<RasterizedDocument, RasterizeError>;
}

/// `pdftoppm`-backed rasterizer.
pub struct PdftoppmRasterizer {
    binary: PathBuf,
}

impl PdftoppmRasterizer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Rasterizer for PdftoppmRasterizer {
    fn rasterize(
        &self,
        pdf: &Path,
        dpi: u32,
        max_pages: u32,
    ) -> Result<RasterizedDocument, RasterizeError> {
        let source_pages = count_pages(pdf);
        // pdftoppm clamps `-l` to the real page count when lopdf could not tell us.
        let last_page = source_pages.map_or(max_pages, |n| n.min(max_pages));
        if let Some(n) = source_pages {
            if n > max_pages {
                info!(
                    "{} has {} pages; only the first {} are processed",
                    pdf.display(),
                    n,
                    max_pages
                );
            }
        }
        if last_page == 0 {
            return Err(RasterizeError::NoPages(pdf.to_path_buf()));
        }

        let workspace = tempfile::Builder::new()
            .prefix("ocr-pages-")
            .tempdir()
            .map_err(RasterizeError::Workspace)?;
        let prefix = workspace.path().join("page");

        debug!(
            "Rasterizing {} pages 1..={} at {} dpi",
            pdf.display(),
            last_page,
            dpi
        );
        let output = Command::new(&self.binary)
            .arg("-png")
            .arg("-r")
            .arg(dpi.to_string())
            .arg("-f")
            .arg("1")
            .arg("-l")
            .arg(last_page.to_string())
            .arg(pdf)
            .arg(&prefix)
            .output()
            .map_err(RasterizeError::Spawn)?;

        if !output.status.success() {
            return Err(RasterizeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let pages = collect_pages(workspace.path()).map_err(RasterizeError::Workspace)?;
        if pages.is_empty() {
            return Err(RasterizeError::NoPages(pdf.to_path_buf()));
        }

        info!("Rasterized {} pages from {}", pages.len(), pdf.display());
        Ok(RasterizedDocument::new(workspace, pages, source_pages))
    }
}

/// Page count via lopdf; `None` if lopdf cannot parse the file.
fn count_pages(pdf: &Path) -> Option<u32> {
    match lopdf::Document::load(pdf) {
        Ok(doc) => Some(doc.get_pages().len() as u32),
        Err(e) => {
            debug!("lopdf could not count pages of {}: {}", pdf.display(), e);
            None
        }
    }
}

/// Find `page-<n>.png` files (pdftoppm zero-pads `n` to the page count width).
fn collect_pages(dir: &Path) -> std::io::Result<Vec<RasterizedPage>> {
    let mut pages = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if let Some(page_number) = page_number_from_name(&path) {
            pages.push(RasterizedPage { page_number, path });
        }
    }
    pages.sort_by_key(|p| p.page_number);
    Ok(pages)
}

fn page_number_from_name(path: &Path) -> Option<u32> {
    if path.extension()? != "png" {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    let (_, digits) = stem.rsplit_once('-')?;
    digits.parse::<u32>().ok().filter(|n| *n > 0)
}
