//! PDF extraction through Pdfium.
//!
//! Each page is converted into a [`PageLayout`] (glyph boxes plus ruling paths) and rendered
//! with [`layout::render_page`]. Pages without a text layer are rasterized and sent through
//! OCR; the document is rendered at most once, on the first page that needs it.

pub mod layout;
pub mod tables;

use std::env;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbaImage};
use pdfium_render::prelude::*;
use thiserror::Error;

pub use layout::{BoundingBox, PageChar, PageLayout};

use super::ocr::{OcrError, OcrPipeline};

/// Target raster width for scanned pages, roughly 200 dpi on A4.
const RENDER_WIDTH: i32 = 1650;

/// Errors raised while reading a PDF.
#[derive(Debug, Error)]
pub enum PdfError {
    /// The Pdfium library could not be bound.
    #[error("Failed to load Pdfium runtime: {0}")]
    Library(#[source] PdfiumError),
    /// The bytes are not a readable PDF.
    #[error("Failed to load PDF document: {0}")]
    Document(#[source] PdfiumError),
    /// Text or objects of a page could not be read.
    #[error("Failed to read page {page}: {source}")]
    Page {
        /// Zero-based page index.
        page: usize,
        /// Underlying Pdfium error.
        #[source]
        source: PdfiumError,
    },
    /// A page could not be rasterized for OCR.
    #[error("Failed to render page {page}: {source}")]
    Render {
        /// Zero-based page index.
        page: usize,
        /// Underlying Pdfium error.
        #[source]
        source: PdfiumError,
    },
    /// A rendered page could not be turned into an image buffer.
    #[error("Rendered page {page} has no usable bitmap")]
    Raster {
        /// Zero-based page index.
        page: usize,
    },
    /// OCR of a scanned page failed.
    #[error("OCR failed for page {page}: {source}")]
    Ocr {
        /// Zero-based page index.
        page: usize,
        /// Underlying OCR error.
        #[source]
        source: OcrError,
    },
}

/// Extract text and ruled tables from every page, in page order.
pub fn extract(bytes: &[u8], ocr: &OcrPipeline) -> Result<String, PdfError> {
    let pdfium = load_pdfium().map_err(PdfError::Library)?;
    let document = pdfium
        .load_pdf_from_byte_slice(bytes, None)
        .map_err(PdfError::Document)?;

    let mut layouts = Vec::with_capacity(document.pages().len() as usize);
    for (page_index, page) in document.pages().iter().enumerate() {
        layouts.push(page_layout(page_index, &page)?);
    }

    let mut rasters: Option<Vec<DynamicImage>> = None;
    assemble_document(&layouts, |page_index| {
        if rasters.is_none() {
            tracing::info!(pages = layouts.len(), "Rasterizing PDF for OCR");
            rasters = Some(render_pages(&document)?);
        }
        let image = rasters
            .as_ref()
            .and_then(|images| images.get(page_index))
            .ok_or(PdfError::Raster { page: page_index })?;
        ocr.extract_image(image).map_err(|source| PdfError::Ocr {
            page: page_index,
            source,
        })
    })
}

/// Render each page's layout and join pages with blank lines.
///
/// `ocr_page` is invoked for pages whose text layer renders to nothing.
pub(crate) fn assemble_document<F>(layouts: &[PageLayout], mut ocr_page: F) -> Result<String, PdfError>
where
    F: FnMut(usize) -> Result<String, PdfError>,
{
    let mut pages = Vec::with_capacity(layouts.len());
    for (page_index, page) in layouts.iter().enumerate() {
        let text = layout::render_page(page);
        if text.trim().is_empty() {
            tracing::debug!(page = page_index, "Page has no text layer; using OCR");
            pages.push(ocr_page(page_index)?);
        } else {
            pages.push(text);
        }
    }
    Ok(pages.join("\n\n"))
}

fn page_layout(page_index: usize, page: &PdfPage) -> Result<PageLayout, PdfError> {
    let page_error = |source| PdfError::Page {
        page: page_index,
        source,
    };
    let height = page.height().value;
    let flip = |rect_left: f32, rect_top: f32, rect_right: f32, rect_bottom: f32| {
        BoundingBox::new(rect_left, height - rect_top, rect_right, height - rect_bottom)
    };

    let text = page.text().map_err(page_error)?;
    let mut chars = Vec::new();
    for ch in text.chars().iter() {
        let Some(value) = ch.unicode_char() else {
            continue;
        };
        if value == '\u{0}' || value == '\r' || value == '\n' {
            continue;
        }
        let rect = ch
            .loose_bounds()
            .or_else(|_| ch.tight_bounds())
            .map_err(page_error)?;
        chars.push(PageChar {
            text: value,
            bbox: flip(
                rect.left().value,
                rect.top().value,
                rect.right().value,
                rect.bottom().value,
            ),
        });
    }

    let mut rulings = Vec::new();
    for object in page.objects().iter() {
        if object.object_type() != PdfPageObjectType::Path {
            continue;
        }
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        rulings.push(flip(
            bounds.left().value,
            bounds.top().value,
            bounds.right().value,
            bounds.bottom().value,
        ));
    }

    Ok(PageLayout { chars, rulings })
}

fn render_pages(document: &PdfDocument) -> Result<Vec<DynamicImage>, PdfError> {
    let config = PdfRenderConfig::new().set_target_width(RENDER_WIDTH);
    let mut images = Vec::with_capacity(document.pages().len() as usize);

    for (page_index, page) in document.pages().iter().enumerate() {
        let bitmap = page
            .render_with_config(&config)
            .map_err(|source| PdfError::Render {
                page: page_index,
                source,
            })?;
        let (width, height) = (bitmap.width() as u32, bitmap.height() as u32);
        let rgba = RgbaImage::from_raw(width, height, bitmap.as_rgba_bytes())
            .ok_or(PdfError::Raster { page: page_index })?;
        images.push(DynamicImage::ImageRgba8(rgba));
    }
    Ok(images)
}

fn load_pdfium() -> Result<Pdfium, PdfiumError> {
    if let Some(path) = env::var_os("PDFIUM_LIBRARY_PATH").map(PathBuf::from) {
        return bind_path(&path);
    }
    match bind_path(Path::new("./")) {
        Ok(pdfium) => Ok(pdfium),
        Err(local_err) => Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|_| local_err),
    }
}

fn bind_path(path: &Path) -> Result<Pdfium, PdfiumError> {
    let library = if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    };
    Pdfium::bind_to_library(library).map(Pdfium::new)
}

#[cfg(test)]
mod tests {
    use super::layout::tests::{ruled_table_page, word};
    use super::*;

    #[test]
    fn table_page_then_text_page_in_order() {
        let second = PageLayout {
            chars: word("Closing", 50.0, 80.0),
            rulings: Vec::new(),
        };
        let text = assemble_document(&[ruled_table_page(), second], |_| {
            panic!("no page needs OCR")
        })
        .unwrap();
        assert_eq!(
            text,
            "| Name | Qty |\n| --- | --- |\n| apple | 3 |\n\nClosing"
        );
        assert_eq!(text.matches("| --- |").count(), 1);
    }

    #[test]
    fn textless_pages_are_recognized_individually() {
        let mut requested = Vec::new();
        let layouts = [
            PageLayout::default(),
            PageLayout {
                chars: word("Typed", 10.0, 10.0),
                rulings: Vec::new(),
            },
            PageLayout::default(),
        ];
        let text = assemble_document(&layouts, |page| {
            requested.push(page);
            Ok(format!("scanned {page}"))
        })
        .unwrap();
        assert_eq!(text, "scanned 0\n\nTyped\n\nscanned 2");
        assert_eq!(requested, vec![0, 2]);
    }

    #[test]
    fn ocr_failure_propagates() {
        let result = assemble_document(&[PageLayout::default()], |page| {
            Err(PdfError::Ocr {
                page,
                source: OcrError::Engine {
                    language: "eng".into(),
                    stderr: "boom".into(),
                },
            })
        });
        assert!(matches!(result, Err(PdfError::Ocr { page: 0, .. })));
    }
}
