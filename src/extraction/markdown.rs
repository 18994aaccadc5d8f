//! Markdown serialization shared by every tabular source.

/// Normalize a single cell: strip surrounding whitespace and collapse line breaks.
pub fn clean_cell(value: Option<&str>) -> String {
    match value {
        Some(text) => text
            .trim()
            .replace("\r\n", " ")
            .replace(['\n', '\r'], " "),
        None => String::new(),
    }
}

/// Serialize rows as a markdown table whose first row is the header.
///
/// Every row is padded to the widest row before emission. Returns an empty string when there
/// are no rows or the header row is empty.
pub fn table_to_markdown<S: AsRef<str>>(rows: &[Vec<Option<S>>]) -> String {
    let Some(first) = rows.first() else {
        return String::new();
    };
    if first.is_empty() {
        return String::new();
    }

    let max_cols = rows.iter().map(Vec::len).max().unwrap_or(0);
    let cleaned: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells: Vec<String> = row
                .iter()
                .map(|cell| clean_cell(cell_text(cell)))
                .collect();
            cells.resize(max_cols, String::new());
            cells
        })
        .collect();

    let mut lines = Vec::with_capacity(cleaned.len() + 1);
    lines.push(format_row(&cleaned[0]));
    lines.push(format_row(&vec!["---".to_string(); max_cols]));
    lines.extend(cleaned[1..].iter().map(|row| format_row(row)));
    lines.join("\n")
}

fn cell_text<S: AsRef<str>>(cell: &Option<S>) -> Option<&str> {
    cell.as_ref().map(|value| value.as_ref())
}

fn format_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

/// Convenience wrapper for tables whose cells are always present.
pub fn strings_to_markdown(rows: &[Vec<String>]) -> String {
    let wrapped: Vec<Vec<Option<&str>>> = rows
        .iter()
        .map(|row| row.iter().map(|cell| Some(cell.as_str())).collect())
        .collect();
    table_to_markdown(&wrapped)
}
