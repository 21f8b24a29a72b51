//! Image normalization ahead of recognition.
//!
//! Bounds the pixel count handed to the engine: color mode is coerced to RGB8
//! or Luma8 and images whose longest side exceeds the configured maximum are
//! downscaled with Lanczos3 and re-encoded as JPEG. Any failure falls back to
//! the original file.

use crate::config::PipelineConfig;
use crate::error::NormalizationError;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The image a recognizer reads: either the original file or a temporary
/// re-encoded copy that is removed when this value is dropped.
#[derive(Debug)]
pub struct NormalizedImage {
    path: PathBuf,
    dimensions: Option<(u32, u32)>,
    artifact: Option<NamedTempFile>,
}

impl NormalizedImage {
    /// Use a file as-is.
    pub fn original(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            dimensions: None,
            artifact: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pixel dimensions, when the image was decoded.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions
    }

    /// Whether a temporary re-encoded copy backs this image.
    pub fn is_reencoded(&self) -> bool {
        self.artifact.is_some()
    }
}

impl Drop for NormalizedImage {
    fn drop(&mut self) {
        if let Some(artifact) = self.artifact.take() {
            let path = artifact.path().to_path_buf();
            if let Err(e) = artifact.close() {
                warn!("Failed to remove normalized image {}: {}", path.display(), e);
            }
        }
    }
}

/// Applies the color/size policy to images on disk.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    max_dimension: u32,
    jpeg_quality: u8,
}

impl ImageNormalizer {
    pub fn new(max_dimension: u32, jpeg_quality: u8) -> Self {
        Self {
            max_dimension,
            jpeg_quality,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.max_image_dimension, config.jpeg_quality)
    }

    /// Normalize the image at `path`. Never fails: on any error the original
    /// file is used unchanged.
    pub fn normalize(&self, path: &Path) -> NormalizedImage {
        match self.try_normalize(path) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(
                    "Image normalization failed for {}, using original: {}",
                    path.display(),
                    e
                );
                NormalizedImage::original(path)
            }
        }
    }

    fn try_normalize(&self, path: &Path) -> Result<NormalizedImage, NormalizationError> {
        let img = image::open(path)?;
        let (width, height) = img.dimensions();
        let oversized = self.is_oversized(width, height);
        let canonical = is_canonical_color(&img);

        if !oversized && canonical {
            return Ok(NormalizedImage {
                path: path.to_path_buf(),
                dimensions: Some((width, height)),
                artifact: None,
            });
        }

        let img = self.normalize_image(img);
        let dimensions = img.dimensions();

        // Downscaled images are re-encoded lossy; a color-only conversion stays lossless.
        let (suffix, format) = if oversized {
            (".jpg", ImageFormat::Jpeg)
        } else {
            (".png", ImageFormat::Png)
        };
        let mut artifact = tempfile::Builder::new()
            .prefix("ocr-normalized-")
            .suffix(suffix)
            .tempfile()?;

        match format {
            ImageFormat::Jpeg => {
                let writer = BufWriter::new(artifact.as_file_mut());
                let encoder = JpegEncoder::new_with_quality(writer, self.jpeg_quality);
                match &img {
                    DynamicImage::ImageLuma8(luma) => luma.write_with_encoder(encoder)?,
                    other => other.to_rgb8().write_with_encoder(encoder)?,
                }
            }
            _ => img.write_to(artifact.as_file_mut(), ImageFormat::Png)?,
        }

        info!(
            "Normalized {} from {}x{} to {}x{}",
            path.display(),
            width,
            height,
            dimensions.0,
            dimensions.1
        );

        Ok(NormalizedImage {
            path: artifact.path().to_path_buf(),
            dimensions: Some(dimensions),
            artifact: Some(artifact),
        })
    }

    /// Coerce color mode and fit within `max_dimension`, preserving aspect ratio.
    pub fn normalize_image(&self, img: DynamicImage) -> DynamicImage {
        let img = coerce_color(img);
        let (width, height) = img.dimensions();
        if !self.is_oversized(width, height) {
            return img;
        }

        debug!(
            "Downscaling {}x{} to fit {}px",
            width, height, self.max_dimension
        );
        img.resize(self.max_dimension, self.max_dimension, FilterType::Lanczos3)
    }

    fn is_oversized(&self, width: u32, height: u32) -> bool {
        width > self.max_dimension || height > self.max_dimension
    }
}

fn is_canonical_color(img: &DynamicImage) -> bool {
    matches!(img, DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_))
}

fn coerce_color(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageLuma16(_)
        | DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLuma8(img.to_luma8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Luma, Rgb, Rgba};

    fn rgb(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([255, 255, 255])))
    }

    #[test]
    fn test_downscale_preserves_aspect_ratio() {
        let normalizer = ImageNormalizer::new(1536, 85);
        let scan = DynamicImage::ImageLuma8(ImageBuffer::from_pixel(4000, 3000, Luma([255u8])));
        let out = normalizer.normalize_image(scan);
        let (w, h) = out.dimensions();
        assert!(w.max(h) <= 1536);
        assert_eq!(w, 1536);
        let ratio = w as f64 / h as f64;
        assert!((ratio - 4000.0 / 3000.0).abs() < 0.01, "ratio was {}", ratio);
    }

    #[test]
    fn test_small_image_untouched() {
        let normalizer = ImageNormalizer::new(2048, 85);
        let out = normalizer.normalize_image(rgb(800, 600));
        assert_eq!(out.dimensions(), (800, 600));
    }

    #[test]
    fn test_color_coercion() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(10, 10, Rgba([1, 2, 3, 255])));
        assert!(matches!(coerce_color(rgba), DynamicImage::ImageRgb8(_)));

        let luma16 = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(10, 10, Luma([1000u16])));
        assert!(matches!(coerce_color(luma16), DynamicImage::ImageLuma8(_)));
    }

    #[test]
    fn test_normalize_file_downscales_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("large.png");
        rgb(3000, 1000).save(&src).unwrap();

        let normalizer = ImageNormalizer::new(1536, 85);
        let normalized = normalizer.normalize(&src);
        assert!(normalized.is_reencoded());
        assert_eq!(normalized.dimensions(), Some((1536, 512)));

        let artifact = normalized.path().to_path_buf();
        assert!(artifact.exists());
        assert_eq!(artifact.extension().and_then(|e| e.to_str()), Some("jpg"));
        assert_eq!(image::open(&artifact).unwrap().dimensions(), (1536, 512));

        drop(normalized);
        assert!(!artifact.exists());
        assert!(src.exists());
    }

    #[test]
    fn test_normalize_keeps_canonical_small_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("small.png");
        rgb(100, 50).save(&src).unwrap();

        let normalized = ImageNormalizer::new(2048, 85).normalize(&src);
        assert!(!normalized.is_reencoded());
        assert_eq!(normalized.path(), src.as_path());
        assert_eq!(normalized.dimensions(), Some((100, 50)));
    }

    #[test]
    fn test_normalize_falls_back_on_undecodable_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("broken.png");
        std::fs::write(&src, b"not an image").unwrap();

        let normalized = ImageNormalizer::new(2048, 85).normalize(&src);
        assert!(!normalized.is_reencoded());
        assert_eq!(normalized.path(), src.as_path());
        assert_eq!(normalized.dimensions(), None);
    }
}
