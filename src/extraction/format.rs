//! Extension-based format dispatch.

use std::fmt;

/// Extraction strategy selected for an uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    /// Portable Document Format.
    Pdf,
    /// Office Open XML word-processing document.
    Docx,
    /// Spreadsheet workbook (`.xlsx` or legacy `.xls`).
    Spreadsheet,
    /// Raster image routed through OCR.
    Image,
}

const EXTENSION_TABLE: &[(&str, FileType)] = &[
    ("pdf", FileType::Pdf),
    ("docx", FileType::Docx),
    ("xlsx", FileType::Spreadsheet),
    ("xls", FileType::Spreadsheet),
    ("jpg", FileType::Image),
    ("jpeg", FileType::Image),
    ("png", FileType::Image),
    ("gif", FileType::Image),
    ("bmp", FileType::Image),
    ("tiff", FileType::Image),
];

impl FileType {
    /// Map a bare extension (no dot, any case) to a file type.
    pub fn from_extension(extension: &str) -> Option<Self> {
        let normalized = extension.trim().to_ascii_lowercase();
        EXTENSION_TABLE
            .iter()
            .find(|(candidate, _)| *candidate == normalized)
            .map(|(_, file_type)| *file_type)
    }

    /// Every extension accepted by the dispatcher.
    pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
        EXTENSION_TABLE.iter().map(|(extension, _)| *extension)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Spreadsheet => "spreadsheet",
            FileType::Image => "image",
        };
        f.write_str(label)
    }
}

/// Lower-cased extension of `filename` without the leading dot.
///
/// Returns `None` for names without an extension, including dot-files such as `.env`.
pub fn file_extension(filename: &str) -> Option<String> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let (stem, extension) = base.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// Resolve the extraction strategy for `filename` without touching its contents.
pub fn detect(filename: &str) -> Option<(FileType, String)> {
    let extension = file_extension(filename)?;
    FileType::from_extension(&extension).map(|file_type| (file_type, extension))
}
