//! Word document extraction with `docx-rs`.

use std::io::Cursor;

use docx_rs::{
    DocumentChild, Paragraph, ParagraphChild, RunChild, Table, TableCellContent, TableChild,
    TableRowChild,
};
use thiserror::Error;

use super::markdown::table_to_markdown;

const MEDIA_PREFIX: &str = "word/media/";

/// Errors raised while reading a `.docx` package.
#[derive(Debug, Error)]
pub enum DocxError {
    /// The document XML could not be parsed.
    #[error("Failed to parse document: {0}")]
    Parse(#[source] docx_rs::ReaderError),
    /// The package is not a readable zip archive.
    #[error("Failed to read package: {0}")]
    Archive(#[source] zip::result::ZipError),
}

/// Extract paragraphs and tables in authored order, followed by embedded image placeholders.
pub fn extract(bytes: &[u8]) -> Result<String, DocxError> {
    let document = docx_rs::read_docx(bytes).map_err(DocxError::Parse)?;

    let mut blocks = Vec::new();
    for child in &document.document.children {
        match child {
            DocumentChild::Paragraph(paragraph) => {
                let text = paragraph_text(paragraph);
                let text = text.trim();
                if !text.is_empty() {
                    blocks.push(text.to_string());
                }
            }
            DocumentChild::Table(table) => {
                let markdown = table_to_markdown(&table_rows(table));
                if !markdown.is_empty() {
                    blocks.push(markdown);
                }
            }
            _ => {}
        }
    }

    for name in embedded_images(bytes)? {
        blocks.push(format!(
            "[IMAGE: {name}] (embedded image text not extracted)"
        ));
    }

    Ok(blocks.join("\n\n"))
}

fn paragraph_text(paragraph: &Paragraph) -> String {
    let mut text = String::new();
    collect_children(&paragraph.children, &mut text);
    text
}

fn collect_children(children: &[ParagraphChild], text: &mut String) {
    for child in children {
        match child {
            ParagraphChild::Run(run) => {
                for part in &run.children {
                    match part {
                        RunChild::Text(value) => text.push_str(&value.text),
                        RunChild::Tab(_) => text.push('\t'),
                        RunChild::Break(_) => text.push('\n'),
                        _ => {}
                    }
                }
            }
            ParagraphChild::Hyperlink(link) => collect_children(&link.children, text),
            _ => {}
        }
    }
}

fn table_rows(table: &Table) -> Vec<Vec<Option<String>>> {
    table
        .rows
        .iter()
        .map(|TableChild::TableRow(row)| {
            row.cells
                .iter()
                .map(|TableRowChild::TableCell(cell)| {
                    let paragraphs: Vec<String> = cell
                        .children
                        .iter()
                        .filter_map(|content| match content {
                            TableCellContent::Paragraph(paragraph) => Some(paragraph_text(paragraph)),
                            _ => None,
                        })
                        .map(|text| text.trim().to_string())
                        .filter(|text| !text.is_empty())
                        .collect();
                    Some(paragraphs.join(" "))
                })
                .collect()
        })
        .collect()
}

/// File names of media parts stored in the package, sorted for stable output.
fn embedded_images(bytes: &[u8]) -> Result<Vec<String>, DocxError> {
    let archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(DocxError::Archive)?;
    let mut names: Vec<String> = archive
        .file_names()
        .filter_map(|name| name.strip_prefix(MEDIA_PREFIX))
        .filter(|name| !name.is_empty() && !name.ends_with('/'))
        .map(|name| name.rsplit('/').next().unwrap_or(name).to_string())
        .collect();
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use docx_rs::{Docx, Run, TableCell, TableRow};

    use super::*;

    fn cell(text: &str) -> TableCell {
        TableCell::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text(text)))
    }

    fn build(docx: Docx) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        docx.build().pack(&mut buffer).expect("pack docx");
        buffer.into_inner()
    }

    #[test]
    fn preserves_paragraph_and_table_order() {
        let table = Table::new(vec![
            TableRow::new(vec![cell("Name"), cell("Qty")]),
            TableRow::new(vec![cell("apple"), cell("3")]),
        ]);
        let bytes = build(
            Docx::new()
                .add_paragraph(Paragraph::new().add_run(Run::new().add_text("  Intro  ")))
                .add_paragraph(Paragraph::new())
                .add_table(table)
                .add_paragraph(Paragraph::new().add_run(Run::new().add_text("Outro"))),
        );

        let text = extract(&bytes).unwrap();
        assert_eq!(
            text,
            "Intro\n\n| Name | Qty |\n| --- | --- |\n| apple | 3 |\n\nOutro"
        );
    }

    #[test]
    fn media_entries_become_placeholders() {
        let base = build(
            Docx::new().add_paragraph(Paragraph::new().add_run(Run::new().add_text("Body"))),
        );

        // Re-pack with an extra media entry.
        let mut source = zip::ZipArchive::new(Cursor::new(base)).unwrap();
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for idx in 0..source.len() {
            let entry = source.by_index(idx).unwrap();
            writer.raw_copy_file(entry).unwrap();
        }
        writer
            .start_file(
                "word/media/image1.png",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
        writer.write_all(b"png").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let text = extract(&bytes).unwrap();
        assert_eq!(
            text,
            "Body\n\n[IMAGE: image1.png] (embedded image text not extracted)"
        );
    }

    #[test]
    fn corrupt_input_is_an_error() {
        assert!(extract(b"definitely not a docx").is_err());
    }
}
