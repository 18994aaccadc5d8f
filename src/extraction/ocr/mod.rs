//! Image text recognition with table-region awareness.
//!
//! The structured pass binarizes the image, locates ruled regions with directional
//! morphology, and recognizes each region and the remaining horizontal bands separately so
//! that tables come back as markdown in their vertical position. Every recognition call goes
//! through the language cascade in [`OcrPipeline::recognize`].

mod engine;
pub mod morphology;

use std::sync::Arc;

use image::{DynamicImage, GrayImage, Luma};

pub use engine::{OcrEngine, OcrError, TesseractCli};
use morphology::{
    PixelRect, connected_components, dilate, erode, otsu_level, saturating_add,
    threshold_inverted,
};

use crate::config::Config;
use crate::extraction::markdown::strings_to_markdown;

/// Results shorter than this (in characters) trigger the fallback language.
pub const MIN_USABLE_LENGTH: usize = 5;
/// Length of the line-detection kernels; also the minimum table side in pixels.
const KERNEL_LENGTH: u32 = 40;
/// Bands thinner than this are not worth a recognition pass.
const MIN_BAND_HEIGHT: u32 = 8;

/// OCR pipeline shared by image uploads and scanned PDF pages.
#[derive(Clone)]
pub struct OcrPipeline {
    engine: Arc<dyn OcrEngine>,
    primary_language: String,
    fallback_language: String,
}

impl OcrPipeline {
    /// Build a pipeline around an explicit engine.
    pub fn new(
        engine: Arc<dyn OcrEngine>,
        primary_language: impl Into<String>,
        fallback_language: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            primary_language: primary_language.into(),
            fallback_language: fallback_language.into(),
        }
    }

    /// Tesseract-backed pipeline using the configured binary and languages.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(TesseractCli::new(&config.tesseract_path)),
            &config.ocr_primary_language,
            &config.ocr_fallback_language,
        )
    }

    /// Decode `bytes` and extract its text.
    pub fn extract_bytes(&self, bytes: &[u8]) -> Result<String, OcrError> {
        let image = image::load_from_memory(bytes).map_err(OcrError::Decode)?;
        self.extract_image(&image)
    }

    /// Structured pass first; a contrast-enhanced whole-image pass when it yields nothing.
    pub fn extract_image(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let structured = self.structured_pass(image)?;
        if !structured.trim().is_empty() {
            return Ok(structured);
        }

        tracing::debug!("Structured OCR pass empty; retrying on enhanced image");
        let enhanced = image.adjust_contrast(20.0).unsharpen(1.0, 1);
        self.recognize(&enhanced)
    }

    /// Recognize `image` with the primary language, falling back when the result is unusable.
    ///
    /// The returned text is trimmed. A primary-language failure is logged and never fatal on
    /// its own; only a failing fallback with no primary text to return is an error.
    pub fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let primary = match self.engine.recognize(image, &self.primary_language) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.chars().count() >= MIN_USABLE_LENGTH {
                    return Ok(text);
                }
                Some(text)
            }
            Err(err) => {
                tracing::warn!(
                    language = %self.primary_language,
                    error = %err,
                    "Primary OCR language failed"
                );
                None
            }
        };

        match self.engine.recognize(image, &self.fallback_language) {
            Ok(text) => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    Ok(primary.unwrap_or_default())
                } else {
                    Ok(text)
                }
            }
            Err(err) => match primary {
                Some(text) => {
                    tracing::warn!(
                        language = %self.fallback_language,
                        error = %err,
                        "Fallback OCR language failed; keeping primary result"
                    );
                    Ok(text)
                }
                None => Err(err),
            },
        }
    }

    fn structured_pass(&self, image: &DynamicImage) -> Result<String, OcrError> {
        let gray = image.to_luma8();
        let binary = dilate(&threshold_inverted(&gray, otsu_level(&gray)), 2, 2);
        let regions = detect_table_regions(&binary);

        let mut blocks: Vec<(u32, String)> = Vec::new();
        for region in &regions {
            let crop = image.crop_imm(region.x, region.y, region.width, region.height);
            let text = self.recognize(&crop)?;
            let rows: Vec<Vec<String>> = text
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.split_whitespace().map(str::to_string).collect())
                .collect();
            let markdown = strings_to_markdown(&rows);
            if !markdown.is_empty() {
                blocks.push((region.y, markdown));
            }
        }

        let remainder = DynamicImage::ImageLuma8(mask_regions(gray, &regions));
        for (start, end) in text_bands(remainder.height(), &regions) {
            let band = remainder.crop_imm(0, start, remainder.width(), end - start);
            let text = self.recognize(&band)?;
            if !text.is_empty() {
                blocks.push((start, text));
            }
        }

        blocks.sort_by_key(|(y, _)| *y);
        tracing::debug!(
            tables = regions.len(),
            blocks = blocks.len(),
            "Structured OCR pass finished"
        );
        Ok(blocks
            .into_iter()
            .map(|(_, text)| text)
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

/// Locate ruled table regions in a binary mask (ink = 255).
///
/// Horizontal and vertical strokes at least [`KERNEL_LENGTH`] pixels long survive an opening
/// with line-shaped kernels; the union of both masks is split into connected regions and
/// regions smaller than a kernel in either dimension are discarded, as are regions nested
/// inside another.
pub fn detect_table_regions(binary: &GrayImage) -> Vec<PixelRect> {
    let horizontal = line_mask(binary, KERNEL_LENGTH, 1);
    let vertical = line_mask(binary, 1, KERNEL_LENGTH);
    let combined = saturating_add(&horizontal, &vertical);

    let candidates: Vec<PixelRect> = connected_components(&combined)
        .into_iter()
        .filter(|rect| rect.width >= KERNEL_LENGTH && rect.height >= KERNEL_LENGTH)
        .collect();

    candidates
        .iter()
        .filter(|rect| {
            !candidates
                .iter()
                .any(|other| other != *rect && contains(other, rect))
        })
        .copied()
        .collect()
}

fn line_mask(binary: &GrayImage, kernel_width: u32, kernel_height: u32) -> GrayImage {
    let opened = erode(binary, kernel_width, kernel_height);
    let once = dilate(&opened, kernel_width, kernel_height);
    dilate(&once, kernel_width, kernel_height)
}

fn contains(outer: &PixelRect, inner: &PixelRect) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.x + inner.width <= outer.x + outer.width
        && inner.bottom() <= outer.bottom()
}

fn mask_regions(mut gray: GrayImage, regions: &[PixelRect]) -> GrayImage {
    for region in regions {
        for y in region.y..region.bottom().min(gray.height()) {
            for x in region.x..(region.x + region.width).min(gray.width()) {
                gray.put_pixel(x, y, Luma([255]));
            }
        }
    }
    gray
}

/// Vertical spans `[start, end)` not covered by any region.
fn text_bands(height: u32, regions: &[PixelRect]) -> Vec<(u32, u32)> {
    let mut sorted: Vec<&PixelRect> = regions.iter().collect();
    sorted.sort_by_key(|rect| rect.y);

    let mut bands = Vec::new();
    let mut cursor = 0;
    for rect in sorted {
        if rect.y > cursor {
            bands.push((cursor, rect.y));
        }
        cursor = cursor.max(rect.bottom());
    }
    if cursor < height {
        bands.push((cursor, height));
    }
    bands.retain(|(start, end)| end - start >= MIN_BAND_HEIGHT);
    bands
}
