//! Ruling-line table detection.
//!
//! Path objects are decomposed into horizontal and vertical edges. Edges that intersect are
//! merged into connected groups; a group with at least two edges in each orientation forms a
//! table whose cell grid is given by the distinct edge positions.

use super::layout::{BoundingBox, PageChar, cmp_f32, render_glyphs};

/// Maximum thickness for a path to be treated as a single ruling line.
const LINE_THICKNESS: f32 = 2.0;
/// Shortest edge considered when building the grid.
const MIN_EDGE_LENGTH: f32 = 3.0;
/// Distance within which edges are considered to touch or share a position.
const SNAP_TOLERANCE: f32 = 3.0;

/// A table found on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTable {
    /// Outer bounds of the table.
    pub bbox: BoundingBox,
    /// Cell text, row-major; `None` marks a cell covered by a merged neighbour.
    pub rows: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Orientation {
    Horizontal,
    Vertical,
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    orientation: Orientation,
    /// `y` for horizontal edges, `x` for vertical ones.
    position: f32,
    start: f32,
    end: f32,
}

impl Edge {
    fn horizontal(y: f32, x0: f32, x1: f32) -> Self {
        Self {
            orientation: Orientation::Horizontal,
            position: y,
            start: x0,
            end: x1,
        }
    }

    fn vertical(x: f32, top: f32, bottom: f32) -> Self {
        Self {
            orientation: Orientation::Vertical,
            position: x,
            start: top,
            end: bottom,
        }
    }

    fn covers(&self, value: f32) -> bool {
        value >= self.start - SNAP_TOLERANCE && value <= self.end + SNAP_TOLERANCE
    }

    fn intersects(&self, other: &Edge) -> bool {
        self.orientation != other.orientation
            && self.covers(other.position)
            && other.covers(self.position)
    }
}

fn edges_from_rulings(rulings: &[BoundingBox]) -> Vec<Edge> {
    let mut edges = Vec::new();
    for rect in rulings {
        let (width, height) = (rect.width(), rect.height());
        let (cx, cy) = rect.center();
        if height <= LINE_THICKNESS && width >= MIN_EDGE_LENGTH {
            edges.push(Edge::horizontal(cy, rect.x0, rect.x1));
        } else if width <= LINE_THICKNESS && height >= MIN_EDGE_LENGTH {
            edges.push(Edge::vertical(cx, rect.top, rect.bottom));
        } else if width >= MIN_EDGE_LENGTH && height >= MIN_EDGE_LENGTH {
            edges.push(Edge::horizontal(rect.top, rect.x0, rect.x1));
            edges.push(Edge::horizontal(rect.bottom, rect.x0, rect.x1));
            edges.push(Edge::vertical(rect.x0, rect.top, rect.bottom));
            edges.push(Edge::vertical(rect.x1, rect.top, rect.bottom));
        }
    }
    edges
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
        }
    }

    fn find(&mut self, node: usize) -> usize {
        let mut root = node;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut current = node;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (root_a, root_b) = (self.find(a), self.find(b));
        if root_a != root_b {
            self.parent[root_b] = root_a;
        }
    }
}

/// Detect ruled tables and read their cell text from `chars`.
///
/// Tables are returned in reading order (top to bottom, then left to right).
pub fn detect_tables(rulings: &[BoundingBox], chars: &[PageChar]) -> Vec<DetectedTable> {
    let edges = edges_from_rulings(rulings);
    if edges.is_empty() {
        return Vec::new();
    }

    let mut groups = DisjointSet::new(edges.len());
    for (i, a) in edges.iter().enumerate() {
        for (j, b) in edges.iter().enumerate().skip(i + 1) {
            if a.intersects(b) {
                groups.union(i, j);
            }
        }
    }

    let mut components: Vec<(usize, Vec<Edge>)> = Vec::new();
    for (idx, edge) in edges.iter().enumerate() {
        let root = groups.find(idx);
        match components.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(*edge),
            None => components.push((root, vec![*edge])),
        }
    }

    let mut tables: Vec<DetectedTable> = components
        .into_iter()
        .filter_map(|(_, members)| build_table(&members, chars))
        .collect();
    tables.sort_by(|a, b| cmp_f32(a.bbox.top, b.bbox.top).then(cmp_f32(a.bbox.x0, b.bbox.x0)));
    tables
}

fn build_table(edges: &[Edge], chars: &[PageChar]) -> Option<DetectedTable> {
    let verticals: Vec<&Edge> = edges
        .iter()
        .filter(|edge| edge.orientation == Orientation::Vertical)
        .collect();
    let horizontals: Vec<&Edge> = edges
        .iter()
        .filter(|edge| edge.orientation == Orientation::Horizontal)
        .collect();
    if verticals.len() < 2 || horizontals.len() < 2 {
        return None;
    }

    let xs = snap_positions(verticals.iter().map(|edge| edge.position));
    let ys = snap_positions(horizontals.iter().map(|edge| edge.position));
    if xs.len() < 2 || ys.len() < 2 {
        return None;
    }

    let bbox = BoundingBox::new(xs[0], ys[0], xs[xs.len() - 1], ys[ys.len() - 1]);
    let mut rows = Vec::with_capacity(ys.len() - 1);

    for row in ys.windows(2) {
        let mid_y = (row[0] + row[1]) / 2.0;
        let mut cells: Vec<Option<String>> = Vec::with_capacity(xs.len() - 1);
        let mut open_cell: Option<usize> = None;

        for (col_idx, col) in xs.windows(2).enumerate() {
            let cell_box = BoundingBox::new(col[0], row[0], col[1], row[1]);
            let text = render_glyphs(chars.iter().filter(|ch| {
                let (cx, cy) = ch.bbox.center();
                cell_box.contains_point(cx, cy)
            }));

            let separated = col_idx == 0
                || verticals
                    .iter()
                    .any(|edge| (edge.position - col[0]).abs() <= SNAP_TOLERANCE && edge.covers(mid_y));

            match open_cell {
                Some(owner) if !separated => {
                    if !text.is_empty()
                        && let Some(Some(existing)) = cells.get_mut(owner)
                    {
                        if !existing.is_empty() {
                            existing.push(' ');
                        }
                        existing.push_str(&text);
                    }
                    cells.push(None);
                }
                _ => {
                    open_cell = Some(cells.len());
                    cells.push(Some(text));
                }
            }
        }
        rows.push(cells);
    }

    Some(DetectedTable { bbox, rows })
}

/// Sort positions and merge values closer than [`SNAP_TOLERANCE`] into their mean.
fn snap_positions(values: impl Iterator<Item = f32>) -> Vec<f32> {
    let mut sorted: Vec<f32> = values.collect();
    sorted.sort_by(|a, b| cmp_f32(*a, *b));

    let mut clusters: Vec<Vec<f32>> = Vec::new();
    for value in sorted {
        match clusters.last_mut() {
            Some(cluster) if value - cluster[0] <= SNAP_TOLERANCE => cluster.push(value),
            _ => clusters.push(vec![value]),
        }
    }
    clusters
        .into_iter()
        .map(|cluster| cluster.iter().sum::<f32>() / cluster.len() as f32)
        .collect()
}
