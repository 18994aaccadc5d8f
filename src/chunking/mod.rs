//! Chunking contract and the default section-aware token chunker.
//!
//! [`TokenChunker`] walks extracted text as markdown: `#` headings open sections, markdown
//! tables become standalone `table` chunks with a structured `content_json` copy of their rows,
//! and the remaining prose is split to the token budget.

pub mod tokens;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::Config;
pub use tokens::TokenCounter;
use tokens::{build_token_counter, split_text};

/// Errors produced while turning text into chunks.
#[derive(Debug, Error)]
pub enum ChunkingError {
    /// The configured token budget is zero.
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,
    /// Tokenizer resources were unavailable for the configured model.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Tokenizer {
        /// Model we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: anyhow::Error,
    },
}

/// Kind of content carried by a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    /// Prose.
    Text,
    /// A markdown table kept whole.
    Table,
}

/// Unit of text that is embedded and indexed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Stable identifier derived from the file name, its source key and the position.
    pub id: String,
    /// Chunk text.
    pub content: String,
    /// Source file name.
    pub filename: String,
    /// Zero-based order of the chunk within its file.
    pub position: usize,
    /// Token count under the chunker's counter.
    pub tokens: Option<usize>,
    /// Nearest preceding heading, or empty.
    pub section_title: String,
    /// Content kind.
    #[serde(rename = "type")]
    pub chunk_type: ChunkType,
    /// Structured copy of table rows.
    pub content_json: Option<Value>,
    /// Level of the section heading (1-6).
    pub heading_level: Option<u8>,
}

/// Per-document information handed to the chunker.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    /// Source file name.
    pub filename: String,
    /// Identifies the document among others sharing its file name.
    pub source_key: String,
}

impl ChunkMetadata {
    /// Metadata keyed by the digest of the file's bytes.
    pub fn for_content(filename: impl Into<String>, content: &[u8]) -> Self {
        Self {
            filename: filename.into(),
            source_key: content_digest(content),
        }
    }
}

/// Splits extracted text into ordered chunks.
pub trait Chunker: Send + Sync {
    /// Produce chunks for `text` with positions starting at zero.
    fn chunk(&self, text: &str, metadata: &ChunkMetadata) -> Result<Vec<Chunk>, ChunkingError>;
}

/// Hex sha256 of a document's bytes.
pub fn content_digest(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Deterministic id derived from the file name, source key and chunk position.
///
/// Re-ingesting the same bytes under the same name reproduces the ids, so writes overwrite
/// rather than duplicate. Same-named files with different content never share an id.
pub fn chunk_id(filename: &str, source_key: &str, position: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(b":");
    hasher.update(source_key.as_bytes());
    hasher.update(b":");
    hasher.update(position.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Section-aware chunker bounded by a token budget.
#[derive(Clone)]
pub struct TokenChunker {
    chunk_size: usize,
    counter: TokenCounter,
}

impl TokenChunker {
    /// Chunker with an explicit counter.
    pub fn new(chunk_size: usize, counter: TokenCounter) -> Self {
        Self {
            chunk_size,
            counter,
        }
    }

    /// Chunker using the configured budget and a tokenizer matched to the embedding model.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.chunk_size,
            build_token_counter(&config.embedding_model),
        )
    }

    fn count(&self, text: &str) -> usize {
        self.counter.as_ref()(text)
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, text: &str, metadata: &ChunkMetadata) -> Result<Vec<Chunk>, ChunkingError> {
        if self.chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }

        let mut chunks = Vec::new();
        let mut push = |content: String,
                        section: &Section,
                        chunk_type: ChunkType,
                        content_json: Option<Value>,
                        tokens: usize| {
            let position = chunks.len();
            chunks.push(Chunk {
                id: chunk_id(&metadata.filename, &metadata.source_key, position),
                content,
                filename: metadata.filename.clone(),
                position,
                tokens: Some(tokens),
                section_title: section.title.clone(),
                chunk_type,
                content_json,
                heading_level: section.level,
            });
        };

        for section in parse_sections(text) {
            for block in &section.blocks {
                match block {
                    Block::Prose(prose) => {
                        for piece in split_text(prose, self.chunk_size, &self.counter) {
                            let tokens = self.count(&piece);
                            push(piece, &section, ChunkType::Text, None, tokens);
                        }
                    }
                    Block::Table(lines) => {
                        let content = lines.join("\n");
                        let tokens = self.count(&content);
                        let rows = table_json(lines);
                        push(content, &section, ChunkType::Table, Some(rows), tokens);
                    }
                }
            }
        }

        tracing::debug!(
            filename = %metadata.filename,
            chunks = chunks.len(),
            chunk_size = self.chunk_size,
            "Chunked document"
        );
        Ok(chunks)
    }
}

#[derive(Debug, Default)]
struct Section {
    title: String,
    level: Option<u8>,
    blocks: Vec<Block>,
}

#[derive(Debug, PartialEq)]
enum Block {
    Prose(String),
    Table(Vec<String>),
}

fn heading(line: &str) -> Option<(u8, &str)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((hashes as u8, rest.trim()))
}

fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1
}

fn is_separator_row(line: &str) -> bool {
    let cells = split_row(line);
    !cells.is_empty()
        && cells
            .iter()
            .all(|cell| !cell.is_empty() && cell.chars().all(|c| c == '-' || c == ':'))
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let inner = trimmed
        .strip_prefix('|')
        .and_then(|rest| rest.strip_suffix('|'))
        .unwrap_or(trimmed);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn parse_sections(text: &str) -> Vec<Section> {
    let lines: Vec<&str> = text.lines().collect();
    let mut sections = vec![Section::default()];
    let mut prose: Vec<&str> = Vec::new();

    fn flush(prose: &mut Vec<&str>, section: &mut Section) {
        let body = prose.join("\n");
        if !body.trim().is_empty() {
            section.blocks.push(Block::Prose(body.trim().to_string()));
        }
        prose.clear();
    }

    let mut idx = 0;
    while idx < lines.len() {
        let line = lines[idx];
        let current = sections.len() - 1;

        if let Some((level, title)) = heading(line) {
            flush(&mut prose, &mut sections[current]);
            sections.push(Section {
                title: title.to_string(),
                level: Some(level),
                blocks: Vec::new(),
            });
            idx += 1;
            continue;
        }

        if is_table_line(line) && lines.get(idx + 1).is_some_and(|next| is_separator_row(next)) {
            flush(&mut prose, &mut sections[current]);
            let mut table = Vec::new();
            while idx < lines.len() && is_table_line(lines[idx]) {
                table.push(lines[idx].trim().to_string());
                idx += 1;
            }
            sections[current].blocks.push(Block::Table(table));
            continue;
        }

        prose.push(line);
        idx += 1;
    }

    let last = sections.len() - 1;
    flush(&mut prose, &mut sections[last]);
    sections.retain(|section| !section.blocks.is_empty());
    sections
}

/// Table rows as objects keyed by header; blank headers become `column_<n>`.
fn table_json(lines: &[String]) -> Value {
    let Some(header_line) = lines.first() else {
        return Value::Array(Vec::new());
    };
    let headers: Vec<String> = split_row(header_line)
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            if header.is_empty() {
                format!("column_{}", idx + 1)
            } else {
                header
            }
        })
        .collect();

    let rows = lines
        .iter()
        .skip(1)
        .filter(|line| !is_separator_row(line))
        .map(|line| {
            let cells = split_row(line);
            let mut object = Map::new();
            for (idx, header) in headers.iter().enumerate() {
                let value = cells.get(idx).cloned().unwrap_or_default();
                object.insert(header.clone(), Value::String(value));
            }
            Value::Object(object)
        })
        .collect();
    Value::Array(rows)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::tokens::whitespace_token_counter;
    use super::*;

    fn chunker(size: usize) -> TokenChunker {
        TokenChunker::new(size, whitespace_token_counter())
    }

    fn metadata() -> ChunkMetadata {
        ChunkMetadata {
            filename: "report.docx".into(),
            source_key: "k1".into(),
        }
    }

    #[test]
    fn headings_open_sections_and_tables_stay_whole() {
        let text = "Preface line\n\n## Sheet: Sales\n\n| Region | Total |\n| --- | --- |\n| North | 10 |\n| South |  |\n\nClosing remarks here";
        let chunks = chunker(50).chunk(text, &metadata()).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content, "Preface line");
        assert_eq!(chunks[0].section_title, "");
        assert_eq!(chunks[0].heading_level, None);

        assert_eq!(chunks[1].chunk_type, ChunkType::Table);
        assert_eq!(chunks[1].section_title, "Sheet: Sales");
        assert_eq!(chunks[1].heading_level, Some(2));
        assert_eq!(
            chunks[1].content_json,
            Some(json!([
                {"Region": "North", "Total": "10"},
                {"Region": "South", "Total": ""}
            ]))
        );

        assert_eq!(chunks[2].chunk_type, ChunkType::Text);
        assert_eq!(chunks[2].content, "Closing remarks here");
        assert_eq!(chunks[2].section_title, "Sheet: Sales");
    }

    #[test]
    fn positions_are_monotonic_and_ids_deterministic() {
        let text = "one two three four five six seven";
        let first = chunker(2).chunk(text, &metadata()).unwrap();
        let second = chunker(2).chunk(text, &metadata()).unwrap();

        assert_eq!(first.len(), 4);
        for (idx, chunk) in first.iter().enumerate() {
            assert_eq!(chunk.position, idx);
            assert_eq!(chunk.id, chunk_id("report.docx", "k1", idx));
            assert!(chunk.tokens.unwrap() <= 2);
        }
        assert_eq!(first, second);
        assert_ne!(chunk_id("a.pdf", "k1", 0), chunk_id("b.pdf", "k1", 0));
        assert_eq!(chunk_id("a.pdf", "k1", 0).len(), 64);
    }

    #[test]
    fn same_name_with_different_content_gets_distinct_ids() {
        let first = ChunkMetadata::for_content("report.pdf", b"first quarter");
        let second = ChunkMetadata::for_content("report.pdf", b"second quarter");
        let again = ChunkMetadata::for_content("report.pdf", b"first quarter");

        let ids = |metadata: &ChunkMetadata| -> Vec<String> {
            chunker(2)
                .chunk("one two three", metadata)
                .unwrap()
                .into_iter()
                .map(|chunk| chunk.id)
                .collect()
        };
        assert_ne!(ids(&first), ids(&second));
        assert_eq!(ids(&first), ids(&again));
        assert_eq!(first.source_key, content_digest(b"first quarter"));
    }

    #[test]
    fn prose_chunks_stay_within_the_budget() {
        let text = "keep this one\n\nfail right here\n\nkeep that one\n\na much longer paragraph that cannot fit";
        let chunks = chunker(4).chunk(text, &metadata()).unwrap();
        for chunk in &chunks {
            assert!(chunk.tokens.unwrap() <= 4, "{:?}", chunk.content);
        }
        let words: Vec<&str> = chunks.iter().flat_map(|c| c.content.split_whitespace()).collect();
        assert_eq!(words, text.split_whitespace().collect::<Vec<_>>());
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunker(8).chunk("  \n\n ", &metadata()).unwrap().is_empty());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let err = chunker(0).chunk("text", &metadata()).unwrap_err();
        assert!(matches!(err, ChunkingError::InvalidChunkSize));
    }

    #[test]
    fn pipe_lines_without_separator_are_prose() {
        let text = "| not a table |";
        let chunks = chunker(10).chunk(text, &metadata()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_type, ChunkType::Text);
    }

    #[test]
    fn chunk_serializes_type_field() {
        let chunk = chunker(10).chunk("hello", &metadata()).unwrap().remove(0);
        let value = serde_json::to_value(&chunk).unwrap();
        assert_eq!(value["type"], "text");
        assert_eq!(value["position"], 0);
    }
}
