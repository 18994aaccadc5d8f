//! Format-aware text extraction.
//!
//! [`TableAwareExtractor`] dispatches on the file extension and returns the document text
//! with every tabular region serialized as a markdown table in its reading position.

pub mod docx;
pub mod format;
pub mod markdown;
pub mod ocr;
pub mod pdf;
pub mod spreadsheet;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
pub use format::FileType;
use ocr::OcrPipeline;

/// A named byte stream supplied by the caller.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied file name; only its extension is interpreted.
    pub filename: String,
    /// Raw file contents.
    pub content: Bytes,
}

impl UploadedFile {
    /// Wrap a name and its contents.
    pub fn new(filename: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }
}

/// Text extracted from one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedDocument {
    /// Extracted text; may be empty when the file carries no recognizable content.
    pub raw_text: String,
    /// Source file name.
    pub filename: String,
    /// Lower-cased extension without the dot.
    pub file_extension: String,
}

/// Format-specific failure wrapped by [`ExtractionError::ExtractionFailure`].
#[derive(Debug, Error)]
pub enum FormatError {
    /// PDF reader failure.
    #[error(transparent)]
    Pdf(#[from] pdf::PdfError),
    /// Word document failure.
    #[error(transparent)]
    Docx(#[from] docx::DocxError),
    /// Workbook failure.
    #[error(transparent)]
    Spreadsheet(#[from] spreadsheet::SpreadsheetError),
    /// Image recognition failure.
    #[error(transparent)]
    Ocr(#[from] ocr::OcrError),
}

/// Errors raised by [`DocumentExtractor::process`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The extension is missing or not in the dispatch table.
    #[error("Unsupported file type: {filename}")]
    UnsupportedFormat {
        /// Offending file name.
        filename: String,
    },
    /// The file was recognized but could not be read.
    #[error("Failed to extract text from {format} file: {source}")]
    ExtractionFailure {
        /// Strategy that was attempted.
        format: FileType,
        /// Underlying cause.
        #[source]
        source: FormatError,
    },
}

/// Turns an uploaded file into text.
///
/// Implementations are synchronous and CPU/IO bound; async callers run them on the blocking
/// pool.
pub trait DocumentExtractor: Send + Sync {
    /// Extract the text of `file`, rejecting unsupported formats before reading any bytes.
    fn process(&self, file: &UploadedFile) -> Result<ExtractedDocument, ExtractionError>;
}

/// Production extractor covering PDF, DOCX, spreadsheets and images.
#[derive(Clone)]
pub struct TableAwareExtractor {
    ocr: OcrPipeline,
}

impl TableAwareExtractor {
    /// Build an extractor around an explicit OCR pipeline.
    pub fn new(ocr: OcrPipeline) -> Self {
        Self { ocr }
    }

    /// Build an extractor using the configured Tesseract binary and languages.
    pub fn from_config(config: &Config) -> Self {
        Self::new(OcrPipeline::from_config(config))
    }

    fn extract_text(&self, file_type: FileType, bytes: &[u8]) -> Result<String, FormatError> {
        let text = match file_type {
            FileType::Pdf => pdf::extract(bytes, &self.ocr)?,
            FileType::Docx => docx::extract(bytes)?,
            FileType::Spreadsheet => spreadsheet::extract(bytes)?,
            FileType::Image => self.ocr.extract_bytes(bytes)?,
        };
        Ok(text)
    }
}

impl DocumentExtractor for TableAwareExtractor {
    fn process(&self, file: &UploadedFile) -> Result<ExtractedDocument, ExtractionError> {
        let Some((file_type, extension)) = format::detect(&file.filename) else {
            return Err(ExtractionError::UnsupportedFormat {
                filename: file.filename.clone(),
            });
        };

        let raw_text = self
            .extract_text(file_type, &file.content)
            .map_err(|source| ExtractionError::ExtractionFailure {
                format: file_type,
                source,
            })?;

        tracing::debug!(
            filename = %file.filename,
            format = %file_type,
            characters = raw_text.len(),
            "Extracted document text"
        );

        Ok(ExtractedDocument {
            raw_text,
            filename: file.filename.clone(),
            file_extension: extension,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::extraction::ocr::tests::ScriptedEngine;

    fn extractor(engine: Arc<ScriptedEngine>) -> TableAwareExtractor {
        TableAwareExtractor::new(OcrPipeline::new(engine, "vie", "eng"))
    }

    #[test]
    fn unsupported_extension_is_rejected_before_reading() {
        let engine = Arc::new(ScriptedEngine::default());
        let file = UploadedFile::new("archive.zip", Bytes::new());
        let err = extractor(engine.clone()).process(&file).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::UnsupportedFormat { ref filename } if filename == "archive.zip"
        ));
        assert!(engine.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn corrupt_docx_reports_its_format() {
        let file = UploadedFile::new("Broken.DOCX", &b"garbage"[..]);
        let err = extractor(Arc::new(ScriptedEngine::default()))
            .process(&file)
            .unwrap_err();
        match err {
            ExtractionError::ExtractionFailure { format, source } => {
                assert_eq!(format, FileType::Docx);
                assert!(matches!(source, FormatError::Docx(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn images_route_through_ocr() {
        let mut png = Vec::new();
        image::DynamicImage::new_luma8(32, 32)
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        let engine = Arc::new(ScriptedEngine::default().with("vie", Ok("Hóa đơn bán hàng")));

        let document = extractor(engine)
            .process(&UploadedFile::new("scan.PNG", png))
            .unwrap();
        assert_eq!(document.raw_text, "Hóa đơn bán hàng");
        assert_eq!(document.file_extension, "png");
        assert_eq!(document.filename, "scan.PNG");
    }
}
