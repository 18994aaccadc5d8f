//! Workbook extraction with `calamine`.

use std::io::Cursor;

use calamine::{Data, Range, Reader};
use thiserror::Error;

use super::markdown::table_to_markdown;

/// Marker emitted for sheets without any populated cell.
pub const EMPTY_SHEET_MARKER: &str = "(Empty sheet)";

/// Errors raised while reading a workbook.
#[derive(Debug, Error)]
pub enum SpreadsheetError {
    /// The workbook container could not be opened.
    #[error("Failed to open workbook: {0}")]
    Open(#[source] calamine::Error),
    /// A sheet listed in the workbook could not be read.
    #[error("Failed to read sheet '{sheet}': {source}")]
    Sheet {
        /// Sheet name.
        sheet: String,
        /// Underlying reader error.
        #[source]
        source: calamine::Error,
    },
}

/// Emit every sheet in workbook order as a heading followed by its populated rectangle.
pub fn extract(bytes: &[u8]) -> Result<String, SpreadsheetError> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(SpreadsheetError::Open)?;

    let mut blocks = Vec::new();
    for name in workbook.sheet_names().to_vec() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|source| SpreadsheetError::Sheet {
                sheet: name.clone(),
                source,
            })?;
        blocks.extend(sheet_blocks(&name, &populated_grid(&range)));
    }
    Ok(blocks.join("\n\n"))
}

/// Cells from A1 to the furthest populated row and column, `None` for blanks.
fn populated_grid(range: &Range<Data>) -> Vec<Vec<Option<String>>> {
    let Some((start_row, start_col)) = range.start() else {
        return Vec::new();
    };

    let mut extent: Option<(u32, u32)> = None;
    for (row, col, value) in range.used_cells() {
        if matches!(value, Data::Empty) {
            continue;
        }
        let (row, col) = (start_row + row as u32, start_col + col as u32);
        extent = Some(match extent {
            Some((max_row, max_col)) => (max_row.max(row), max_col.max(col)),
            None => (row, col),
        });
    }

    let Some((max_row, max_col)) = extent else {
        return Vec::new();
    };
    (0..=max_row)
        .map(|row| {
            (0..=max_col)
                .map(|col| range.get_value((row, col)).and_then(cell_text))
                .collect()
        })
        .collect()
}

fn cell_text(value: &Data) -> Option<String> {
    match value {
        Data::Empty => None,
        Data::String(text) => Some(text.trim().to_string()),
        other => Some(other.to_string().trim().to_string()),
    }
}

/// Heading plus table (or the empty marker) for one sheet.
pub(crate) fn sheet_blocks(name: &str, grid: &[Vec<Option<String>>]) -> Vec<String> {
    let heading = format!("## Sheet: {name}");
    let markdown = table_to_markdown(grid);
    if markdown.is_empty() {
        vec![heading, EMPTY_SHEET_MARKER.to_string()]
    } else {
        vec![heading, markdown]
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";
    const REL_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";

    fn inline(cell: &str, text: &str) -> String {
        format!(r#"<c r="{cell}" t="inlineStr"><is><t>{text}</t></is></c>"#)
    }

    fn sheet_xml(rows: &str) -> String {
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="{MAIN_NS}"><sheetData>{rows}</sheetData></worksheet>"#)
    }

    /// Minimal two-sheet workbook: `Sales` with a header and one row, then an empty `Notes`.
    fn sales_workbook() -> Vec<u8> {
        let sales = sheet_xml(&format!(
            r#"<row r="1">{}{}</row><row r="2">{}<c r="B2"><v>120</v></c></row>"#,
            inline("A1", "Region"),
            inline("B1", "Total"),
            inline("A2", "North"),
        ));
        let entries = [
            (
                "[Content_Types].xml",
                r#"<?xml version="1.0" encoding="UTF-8"?><Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/><Override PartName="/xl/worksheets/sheet1.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/><Override PartName="/xl/worksheets/sheet2.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.worksheet+xml"/></Types>"#.to_string(),
            ),
            (
                "_rels/.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/officeDocument" Target="xl/workbook.xml"/></Relationships>"#),
            ),
            (
                "xl/workbook.xml",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><workbook xmlns="{MAIN_NS}" xmlns:r="{REL_NS}"><sheets><sheet name="Sales" sheetId="1" r:id="rId1"/><sheet name="Notes" sheetId="2" r:id="rId2"/></sheets></workbook>"#),
            ),
            (
                "xl/_rels/workbook.xml.rels",
                format!(r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="{REL_NS}/worksheet" Target="worksheets/sheet1.xml"/><Relationship Id="rId2" Type="{REL_NS}/worksheet" Target="worksheets/sheet2.xml"/></Relationships>"#),
            ),
            ("xl/worksheets/sheet1.xml", sales),
            ("xl/worksheets/sheet2.xml", sheet_xml("")),
        ];

        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, body) in entries {
            writer
                .start_file(name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(body.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn workbook_emits_table_then_empty_marker_in_sheet_order() {
        let text = extract(&sales_workbook()).expect("workbook");
        assert_eq!(
            text,
            "## Sheet: Sales\n\n| Region | Total |\n| --- | --- |\n| North | 120 |\n\n## Sheet: Notes\n\n(Empty sheet)"
        );
    }

    #[test]
    fn populated_and_empty_sheets_keep_workbook_order() {
        let populated = vec![
            vec![Some("Region".to_string()), Some("Total".to_string())],
            vec![Some("North".to_string()), None],
        ];
        let mut blocks = sheet_blocks("Sales", &populated);
        blocks.extend(sheet_blocks("Notes", &[]));

        assert_eq!(
            blocks.join("\n\n"),
            "## Sheet: Sales\n\n| Region | Total |\n| --- | --- |\n| North |  |\n\n## Sheet: Notes\n\n(Empty sheet)"
        );
    }

    #[test]
    fn rectangle_is_anchored_at_a1() {
        let mut range: Range<Data> = Range::new((1, 1), (2, 3));
        range.set_value((1, 1), Data::String(" header ".into()));
        range.set_value((2, 3), Data::Float(3.0));

        let grid = populated_grid(&range);
        assert_eq!(grid.len(), 3);
        assert!(grid.iter().all(|row| row.len() == 4));
        assert_eq!(grid[0], vec![None, None, None, None]);
        assert_eq!(grid[1][1].as_deref(), Some("header"));
        assert_eq!(grid[2][3].as_deref(), Some("3"));
    }

    #[test]
    fn blank_range_yields_no_grid() {
        let range: Range<Data> = Range::new((0, 0), (1, 1));
        assert!(populated_grid(&range).is_empty());
        assert!(populated_grid(&Range::empty()).is_empty());
    }

    #[test]
    fn corrupt_workbook_is_an_error() {
        assert!(extract(b"not a workbook").is_err());
    }
}
