//! Page geometry and reading-order text assembly.
//!
//! Coordinates use a top-left origin with `y` growing downward, so sorting by `top` follows
//! the visual reading order of a page.

use std::cmp::Ordering;

use super::tables::{DetectedTable, detect_tables};
use crate::extraction::markdown::table_to_markdown;

/// Vertical distance within which glyphs are considered to share a line.
const LINE_TOLERANCE: f32 = 3.0;
/// Horizontal gap beyond which a space is inserted between adjacent glyphs.
const WORD_GAP: f32 = 3.0;

/// Axis-aligned rectangle in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    /// Left edge.
    pub x0: f32,
    /// Top edge.
    pub top: f32,
    /// Right edge.
    pub x1: f32,
    /// Bottom edge.
    pub bottom: f32,
}

impl BoundingBox {
    /// Build a box from two corners in any order.
    pub fn new(x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        Self {
            x0: x0.min(x1),
            top: top.min(bottom),
            x1: x0.max(x1),
            bottom: top.max(bottom),
        }
    }

    /// Horizontal extent.
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    /// Vertical extent.
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    /// Whether the two boxes share any area or edge.
    ///
    /// Touching boxes count as overlapping; full containment is not required.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        let width = self.x1.min(other.x1) - self.x0.max(other.x0);
        let height = self.bottom.min(other.bottom) - self.top.max(other.top);
        width >= 0.0 && height >= 0.0 && width + height > 0.0
    }

    /// Geometric center.
    pub fn center(&self) -> (f32, f32) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }

    /// Whether the point lies inside or on the border.
    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.x0 && x <= self.x1 && y >= self.top && y <= self.bottom
    }
}

/// A single glyph with its layout box.
#[derive(Debug, Clone, PartialEq)]
pub struct PageChar {
    /// Unicode value.
    pub text: char,
    /// Glyph bounds.
    pub bbox: BoundingBox,
}

/// Layout-level description of one page: glyphs in content-stream order and ruling marks.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    /// Glyphs in the order the content stream emitted them.
    pub chars: Vec<PageChar>,
    /// Bounds of stroked or filled path objects (lines and rectangles).
    pub rulings: Vec<BoundingBox>,
}

#[derive(Debug, Clone)]
enum ItemContent {
    Glyph(char),
    Block(String),
}

#[derive(Debug, Clone)]
struct LayoutItem {
    bbox: BoundingBox,
    content: ItemContent,
}

/// Render a page as text with tables replaced by markdown blocks.
///
/// Glyphs overlapping a detected table are removed from the flowing text. The table's
/// markdown is anchored where the first removed glyph sat so it keeps its place in the
/// reading order.
pub fn render_page(page: &PageLayout) -> String {
    let tables = detect_tables(&page.rulings, &page.chars);
    render_with_tables(page, &tables)
}

pub(crate) fn render_with_tables(page: &PageLayout, tables: &[DetectedTable]) -> String {
    let mut items = Vec::with_capacity(page.chars.len() + tables.len());

    for table in tables {
        let markdown = table_to_markdown(&table.rows);
        if markdown.is_empty() {
            continue;
        }
        let anchor = page
            .chars
            .iter()
            .find(|ch| ch.bbox.overlaps(&table.bbox))
            .map(|ch| ch.bbox)
            .unwrap_or_else(|| {
                BoundingBox::new(table.bbox.x0, table.bbox.top, table.bbox.x0, table.bbox.top)
            });
        items.push(LayoutItem {
            bbox: anchor,
            content: ItemContent::Block(markdown),
        });
    }

    items.extend(
        page.chars
            .iter()
            .filter(|ch| !tables.iter().any(|table| ch.bbox.overlaps(&table.bbox)))
            .map(|ch| LayoutItem {
                bbox: ch.bbox,
                content: ItemContent::Glyph(ch.text),
            }),
    );

    render_items(items).join("\n")
}

/// Assemble glyphs into text lines, used for table cell contents.
pub(crate) fn render_glyphs<'a>(chars: impl IntoIterator<Item = &'a PageChar>) -> String {
    let items = chars
        .into_iter()
        .map(|ch| LayoutItem {
            bbox: ch.bbox,
            content: ItemContent::Glyph(ch.text),
        })
        .collect();
    render_items(items).join("\n")
}

fn render_items(mut items: Vec<LayoutItem>) -> Vec<String> {
    items.sort_by(|a, b| cmp_f32(a.bbox.top, b.bbox.top));

    let mut lines: Vec<Vec<LayoutItem>> = Vec::new();
    let mut line_top = f32::NEG_INFINITY;
    for item in items {
        match lines.last_mut() {
            Some(line) if item.bbox.top - line_top <= LINE_TOLERANCE => line.push(item),
            _ => {
                line_top = item.bbox.top;
                lines.push(vec![item]);
            }
        }
    }

    let mut output = Vec::new();
    for mut line in lines {
        line.sort_by(|a, b| cmp_f32(a.bbox.x0, b.bbox.x0));
        let mut current = String::new();
        let mut previous: Option<(char, BoundingBox)> = None;

        for item in line {
            match item.content {
                ItemContent::Glyph(ch) => {
                    if let Some((prev_ch, prev_box)) = previous
                        && item.bbox.x0 - prev_box.x1 > WORD_GAP
                        && !prev_ch.is_whitespace()
                        && !ch.is_whitespace()
                    {
                        current.push(' ');
                    }
                    current.push(ch);
                    previous = Some((ch, item.bbox));
                }
                ItemContent::Block(block) => {
                    flush_line(&mut output, &mut current);
                    output.push(block);
                    previous = None;
                }
            }
        }
        flush_line(&mut output, &mut current);
    }

    output
}

fn flush_line(output: &mut Vec<String>, current: &mut String) {
    let line = current.trim_end();
    if !line.trim().is_empty() {
        output.push(line.to_string());
    }
    current.clear();
}

pub(crate) fn cmp_f32(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
