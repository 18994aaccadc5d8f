use std::env;
use std::path::PathBuf;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the ingestion pipeline.
///
/// Built once near process start and passed by reference into every constructor that needs
/// it; nothing in the crate reads the environment after [`Config::from_env`] returns.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the OpenSearch cluster.
    pub opensearch_url: String,
    /// Index holding chunk documents.
    pub opensearch_index: String,
    /// Optional basic-auth user.
    pub opensearch_username: Option<String>,
    /// Optional basic-auth password.
    pub opensearch_password: Option<String>,
    /// Embedding backend.
    pub embedding_backend: EmbeddingBackend,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Width of the per-batch embedding worker set.
    pub embedding_concurrency: usize,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Model used by the answer generator, when configured.
    pub generation_model: Option<String>,
    /// Documents per `_bulk` request.
    pub bulk_batch_size: usize,
    /// Attempts per bulk batch before giving up.
    pub bulk_max_retries: u32,
    /// Upper bound for the per-upload file worker pool.
    pub ingest_max_workers: usize,
    /// Token budget per chunk.
    pub chunk_size: usize,
    /// First OCR language tried.
    pub ocr_primary_language: String,
    /// OCR language used when the primary pass yields nothing usable.
    pub ocr_fallback_language: String,
    /// Path or name of the Tesseract binary.
    pub tesseract_path: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Log file location for the file layer.
    pub log_file: PathBuf,
}

/// Supported embedding backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EmbeddingBackend {
    /// Local Ollama runtime.
    Ollama,
    /// Deterministic offline hashing encoder.
    Hashing,
}

impl Config {
    /// Load `.env` (when present) and then build the configuration from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config = Self::from_env()?;
        tracing::debug!(
            opensearch_url = %config.opensearch_url,
            index = %config.opensearch_index,
            embedding_backend = ?config.embedding_backend,
            embedding_model = %config.embedding_model,
            dimension = config.embedding_dimension,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Configuration with every optional setting at its default.
    pub fn defaults(opensearch_url: impl Into<String>) -> Self {
        Self {
            opensearch_url: opensearch_url.into(),
            opensearch_index: "semantic_chunks".to_string(),
            opensearch_username: None,
            opensearch_password: None,
            embedding_backend: EmbeddingBackend::Ollama,
            embedding_model: "bge-m3".to_string(),
            embedding_dimension: 1024,
            embedding_concurrency: 10,
            ollama_url: "http://127.0.0.1:11434".to_string(),
            generation_model: None,
            bulk_batch_size: 500,
            bulk_max_retries: 3,
            ingest_max_workers: 4,
            chunk_size: 512,
            ocr_primary_language: "vie".to_string(),
            ocr_fallback_language: "eng".to_string(),
            tesseract_path: "tesseract".to_string(),
            server_port: None,
            log_file: PathBuf::from("logs/knowledge-ingest.log"),
        }
    }

    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::defaults(load_env("OPENSEARCH_URL")?);
        Ok(Self {
            opensearch_index: load_env_optional("OPENSEARCH_INDEX")
                .unwrap_or(defaults.opensearch_index),
            opensearch_username: load_env_optional("OPENSEARCH_USERNAME"),
            opensearch_password: load_env_optional("OPENSEARCH_PASSWORD"),
            embedding_backend: load_env_optional("EMBEDDING_PROVIDER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("EMBEDDING_PROVIDER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.embedding_backend),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_or("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            embedding_concurrency: parse_or(
                "EMBEDDING_CONCURRENCY",
                defaults.embedding_concurrency,
            )?,
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            generation_model: load_env_optional("GENERATION_MODEL"),
            bulk_batch_size: parse_or("BULK_BATCH_SIZE", defaults.bulk_batch_size)?,
            bulk_max_retries: parse_or("BULK_MAX_RETRIES", defaults.bulk_max_retries)?,
            ingest_max_workers: parse_or("INGEST_MAX_WORKERS", defaults.ingest_max_workers)?,
            chunk_size: parse_or("TEXT_SPLITTER_CHUNK_SIZE", defaults.chunk_size)?,
            ocr_primary_language: load_env_optional("OCR_PRIMARY_LANGUAGE")
                .unwrap_or(defaults.ocr_primary_language),
            ocr_fallback_language: load_env_optional("OCR_FALLBACK_LANGUAGE")
                .unwrap_or(defaults.ocr_fallback_language),
            tesseract_path: load_env_optional("TESSERACT_PATH")
                .unwrap_or(defaults.tesseract_path),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
            log_file: load_env_optional("KNOWLEDGE_INGEST_LOG_FILE")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_file),
            ..defaults
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    load_env_optional(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

impl std::str::FromStr for EmbeddingBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" => Ok(Self::Hashing),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config(opensearch_url: &str) -> Config {
    Config {
        embedding_backend: EmbeddingBackend::Hashing,
        embedding_model: "test-model".into(),
        embedding_dimension: 8,
        embedding_concurrency: 4,
        chunk_size: 64,
        log_file: PathBuf::from("logs/test.log"),
        ..Config::defaults(opensearch_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_parsing_is_case_insensitive() {
        assert_eq!("Ollama".parse(), Ok(EmbeddingBackend::Ollama));
        assert_eq!(" HASHING ".parse(), Ok(EmbeddingBackend::Hashing));
        assert!("bedrock".parse::<EmbeddingBackend>().is_err());
    }
}
