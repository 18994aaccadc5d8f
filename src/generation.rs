//! Answer generation over retrieved context via a local LLM runtime.
//!
//! Unlike retrieval, generation failures are surfaced to the caller: there is no useful
//! fallback answer.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::Config;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// No model configured, or the runtime was unreachable.
    #[error("Answer generator unavailable: {0}")]
    ProviderUnavailable(String),
    /// Runtime returned an error response.
    #[error("Failed to generate answer: {0}")]
    GenerationFailed(String),
    /// Runtime response could not be parsed.
    #[error("Malformed provider response: {0}")]
    InvalidResponse(String),
}

/// Produces an answer to a prompt grounded in context passages.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Generate an answer for `prompt` using `context`.
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String, GenerationError>;
}

/// Build the configured generator, if a generation model is set.
pub fn build_generator(config: &Config) -> Result<Option<OllamaAnswerGenerator>, GenerationError> {
    config
        .generation_model
        .as_deref()
        .map(|model| OllamaAnswerGenerator::new(&config.ollama_url, model))
        .transpose()
}

/// Generator backed by Ollama `/api/generate`.
pub struct OllamaAnswerGenerator {
    http: Client,
    base_url: String,
    model: String,
}

impl OllamaAnswerGenerator {
    /// Generator for `model` served at `base_url`.
    pub fn new(base_url: &str, model: &str) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .user_agent("knowledge-ingest/generate")
            .build()
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to build HTTP client: {error}"
                ))
            })?;
        Ok(Self {
            http,
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.base_url.trim_end_matches('/'))
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

fn build_prompt(prompt: &str, context: &[String]) -> String {
    if context.is_empty() {
        return prompt.to_string();
    }
    let passages = context
        .iter()
        .enumerate()
        .map(|(idx, passage)| format!("[{}] {}", idx + 1, passage.trim()))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "Answer the question using only the context below.\n\nContext:\n{passages}\n\nQuestion: {prompt}"
    )
}

#[async_trait]
impl AnswerGenerator for OllamaAnswerGenerator {
    async fn generate(&self, prompt: &str, context: &[String]) -> Result<String, GenerationError> {
        let payload = json!({
            "model": self.model,
            "prompt": build_prompt(prompt, context),
            "stream": false,
            "options": {
                "temperature": 0.1,
            }
        });

        let response = self
            .http
            .post(self.endpoint())
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GenerationError::ProviderUnavailable(format!(
                "Ollama endpoint {} returned 404",
                self.endpoint()
            )));
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::GenerationFailed(format!(
                "Ollama returned {status}: {body}"
            )));
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    #[tokio::test]
    async fn returns_trimmed_answer() {
        let server = MockServer::start_async().await;
        let generator = OllamaAnswerGenerator::new(&server.base_url(), "qwen2.5").unwrap();

        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .body_contains("[1] Revenue rose 12%");
                then.status(200).json_body(json!({
                    "response": "  Revenue grew by 12%. ",
                    "done": true
                }));
            })
            .await;

        let answer = generator
            .generate("How did revenue change?", &["Revenue rose 12%".to_string()])
            .await
            .expect("answer");

        mock.assert();
        assert_eq!(answer, "Revenue grew by 12%.");
    }

    #[tokio::test]
    async fn error_status_is_surfaced() {
        let server = MockServer::start_async().await;
        let generator = OllamaAnswerGenerator::new(&server.base_url(), "qwen2.5").unwrap();

        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("boom");
            })
            .await;

        let error = generator
            .generate("question", &[])
            .await
            .expect_err("error response");
        assert!(
            matches!(error, GenerationError::GenerationFailed(ref message) if message.contains("500"))
        );
    }

    #[test]
    fn generator_is_optional() {
        let config = crate::config::test_config("http://localhost:9200");
        assert!(build_generator(&config).unwrap().is_none());
    }
}
