//! Token counting and budget-bounded splitting.
//!
//! Token counting prefers `tiktoken-rs` encodings and falls back to a whitespace counter when
//! no encoding can be loaded. Splitting delegates to `semchunk-rs`, which prefers paragraph,
//! sentence and word boundaries; any segment it returns over budget is re-packed by paragraph
//! and then by word.

use std::sync::Arc;

use anyhow::Error as TokenizerError;
use semchunk_rs::Chunker as SemanticSplitter;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

use super::ChunkingError;

/// Shared token counting function.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Build a token counter for `model`, falling back to whitespace counting.
///
/// Embedding models served by Ollama rarely ship a tiktoken encoding; those resolve to
/// `cl100k_base`, which approximates their budgets closely enough for chunking.
pub fn build_token_counter(model: &str) -> TokenCounter {
    match build_tiktoken_counter(model) {
        Ok(counter) => counter,
        Err(error) => {
            tracing::warn!(
                model,
                error = %error,
                "Tokenizer unavailable; falling back to whitespace counter"
            );
            whitespace_token_counter()
        }
    }
}

fn build_tiktoken_counter(model: &str) -> Result<TokenCounter, ChunkingError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| ChunkingError::Tokenizer {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, TokenizerError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            encoding_from_name(model).unwrap_or_else(cl100k_base)
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, TokenizerError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

/// Counts whitespace-separated words; non-empty text always counts as at least one token.
pub fn whitespace_token_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Split `text` into segments of at most `chunk_size` tokens.
///
/// Returns an empty vector for blank input. A single word longer than the budget is emitted
/// on its own.
pub fn split_text(text: &str, chunk_size: usize, counter: &TokenCounter) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    let splitter_counter = counter.clone();
    let splitter = SemanticSplitter::new(
        chunk_size,
        Box::new(move |segment: &str| splitter_counter.as_ref()(segment)),
    );
    splitter
        .chunk(text)
        .into_iter()
        .filter(|segment| !segment.trim().is_empty())
        .flat_map(|segment| enforce_budget(segment, chunk_size, counter))
        .collect()
}

fn enforce_budget(segment: String, chunk_size: usize, counter: &TokenCounter) -> Vec<String> {
    let count = |text: &str| counter.as_ref()(text);
    if count(&segment) <= chunk_size {
        return vec![segment];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for paragraph in segment.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        let candidate = if current.is_empty() {
            paragraph.to_string()
        } else {
            format!("{current}\n\n{paragraph}")
        };
        if count(&candidate) <= chunk_size {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        if count(paragraph) <= chunk_size {
            current = paragraph.to_string();
        } else {
            pieces.extend(pack_words(paragraph, chunk_size, &count));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

fn pack_words(paragraph: &str, chunk_size: usize, count: &dyn Fn(&str) -> usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for word in paragraph.split_whitespace() {
        let candidate = if current.is_empty() {
            word.to_string()
        } else {
            format!("{current} {word}")
        };
        if count(&candidate) <= chunk_size || current.is_empty() {
            current = candidate;
        } else {
            pieces.push(std::mem::replace(&mut current, word.to_string()));
        }
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}
