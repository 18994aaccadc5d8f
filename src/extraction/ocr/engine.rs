use std::path::PathBuf;
use std::process::Command;

use image::{DynamicImage, ImageFormat};
use thiserror::Error;

/// Errors raised by OCR engines and the surrounding image pipeline.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Input bytes could not be decoded as an image.
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    /// Intermediate image could not be written for the engine.
    #[error("Failed to stage image for OCR: {0}")]
    Stage(#[source] image::ImageError),
    /// The engine process could not be spawned or its scratch file created.
    #[error("OCR engine I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The engine exited unsuccessfully.
    #[error("OCR engine failed for language {language}: {stderr}")]
    Engine {
        /// Language pack requested.
        language: String,
        /// Captured standard error.
        stderr: String,
    },
}

/// Recognizes text in a raster image for a given language pack.
pub trait OcrEngine: Send + Sync {
    /// Run recognition and return the raw text (untrimmed).
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError>;
}

/// [`OcrEngine`] backed by the `tesseract` command-line tool.
///
/// Images are staged to a temporary PNG and the engine runs with `--oem 3 --psm 6`
/// (LSTM engine, single uniform block of text).
#[derive(Debug, Clone)]
pub struct TesseractCli {
    binary: PathBuf,
}

impl TesseractCli {
    /// Use the given binary name or path.
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<String, OcrError> {
        let staged = tempfile::Builder::new()
            .prefix("knowledge-ingest-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(staged.path(), ImageFormat::Png)
            .map_err(OcrError::Stage)?;

        let output = Command::new(&self.binary)
            .arg(staged.path())
            .arg("stdout")
            .args(["--oem", "3", "--psm", "6", "-l", language])
            .output()?;

        if !output.status.success() {
            return Err(OcrError::Engine {
                language: language.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        tracing::debug!(language, characters = text.len(), "Tesseract pass finished");
        Ok(text)
    }
}
