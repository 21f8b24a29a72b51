//! Service configuration.
//!
//! Settings come from environment variables (a `.env` file is loaded first in
//! `main`). Every value has a default; malformed values fail startup.

use anyhow::{Context, Result};
use serde::Serialize;
use std::env;
use std::str::FromStr;

/// Tuning for the document pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    /// Longest allowed image side before downscaling.
    pub max_image_dimension: u32,
    /// JPEG quality used when a downscaled image is re-encoded.
    pub jpeg_quality: u8,
    /// Resolution PDF pages are rasterized at.
    pub pdf_dpi: u32,
    /// Pages past this index are not rasterized.
    pub max_pdf_pages: u32,
    /// Concurrent page extractions within one PDF.
    pub page_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_image_dimension: 2048,
            jpeg_quality: 85,
            pdf_dpi: 200,
            max_pdf_pages: 20,
            page_workers: 1,
        }
    }
}

impl PipelineConfig {
    /// Read overrides from `OCR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            max_image_dimension: env_or("OCR_MAX_IMAGE_DIMENSION", defaults.max_image_dimension)?,
            jpeg_quality: env_or("OCR_JPEG_QUALITY", defaults.jpeg_quality)?,
            pdf_dpi: env_or("OCR_PDF_DPI", defaults.pdf_dpi)?,
            max_pdf_pages: env_or("OCR_MAX_PDF_PAGES", defaults.max_pdf_pages)?,
            page_workers: env_or("OCR_PAGE_WORKERS", defaults.page_workers)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_image_dimension == 0 {
            anyhow::bail!("OCR_MAX_IMAGE_DIMENSION must be greater than 0");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            anyhow::bail!("OCR_JPEG_QUALITY must be within 1..=100, got {}", self.jpeg_quality);
        }
        if self.pdf_dpi == 0 {
            anyhow::bail!("OCR_PDF_DPI must be greater than 0");
        }
        if self.max_pdf_pages == 0 {
            anyhow::bail!("OCR_MAX_PDF_PAGES must be greater than 0");
        }
        if self.page_workers == 0 {
            anyhow::bail!("OCR_PAGE_WORKERS must be greater than 0");
        }
        Ok(())
    }
}

/// HTTP server and external tool settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub max_upload_bytes: usize,
    pub tesseract_bin: String,
    pub pdftoppm_bin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            max_upload_bytes: 10 * 1024 * 1024,
            tesseract_bin: "tesseract".to_string(),
            pdftoppm_bin: "pdftoppm".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: env::var("OCR_BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_upload_bytes: env_or("OCR_MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            tesseract_bin: env::var("TESSERACT_BIN").unwrap_or(defaults.tesseract_bin),
            pdftoppm_bin: env::var("PDFTOPPM_BIN").unwrap_or(defaults.pdftoppm_bin),
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pdf_dpi, 200);
        assert_eq!(config.max_pdf_pages, 20);
        assert_eq!(config.jpeg_quality, 85);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = PipelineConfig {
            jpeg_quality: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            page_workers: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = PipelineConfig {
            max_pdf_pages: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_parses_and_defaults() {
        std::env::set_var("OCR_TEST_ENV_OR_VALUE", " 42 ");
        assert_eq!(env_or("OCR_TEST_ENV_OR_VALUE", 7u32).unwrap(), 42);
        assert_eq!(env_or("OCR_TEST_ENV_OR_MISSING", 7u32).unwrap(), 7);

        std::env::set_var("OCR_TEST_ENV_OR_BAD", "many");
        assert!(env_or("OCR_TEST_ENV_OR_BAD", 7u32).is_err());
    }
}
