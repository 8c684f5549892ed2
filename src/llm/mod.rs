pub mod ollama;
pub mod prompt_builder;
mod prompts;
pub mod stream;

use std::pin::Pin;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::{GenerateError, UpstreamError};

pub use ollama::OllamaClient;

/// One line of generated output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenChunk {
    pub delta: String,
    pub done: bool,
}

/// Lazily pulled token sequence for a single generation.
///
/// Dropping it closes the upstream HTTP connection.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<TokenChunk, UpstreamError>> + Send>>;

/// Sampling parameters sent as Ollama `options`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingOptions {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
}

impl Default for SamplingOptions {
    fn default() -> Self {
        SamplingOptions {
            temperature: 0.7,
            top_p: 0.9,
            top_k: 40,
        }
    }
}

/// Which Ollama server and model one request talks to.
///
/// Resolved per request and passed explicitly; the shared client never
/// stores a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    base_url: String,
    model: String,
}

impl UpstreamTarget {
    pub fn new(base_url: &str, model: &str) -> Result<Self, GenerateError> {
        let base_url = base_url.trim().trim_end_matches('/');
        let parsed = reqwest::Url::parse(base_url)
            .map_err(|e| GenerateError::validation(format!("invalid Ollama URL '{base_url}': {e}")))?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
            return Err(GenerateError::validation(format!(
                "Ollama URL must be an http(s) URL, got '{base_url}'"
            )));
        }

        let model = model.trim();
        if model.is_empty() {
            return Err(GenerateError::validation("model name must not be empty"));
        }

        Ok(UpstreamTarget {
            base_url: base_url.to_string(),
            model: model.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_normalizes_trailing_slash() {
        let target = UpstreamTarget::new("http://localhost:11434/", "llama2").unwrap();
        assert_eq!(target.base_url(), "http://localhost:11434");
        assert_eq!(target.endpoint("/api/generate"), "http://localhost:11434/api/generate");
    }

    #[test]
    fn target_rejects_non_http_urls() {
        assert!(UpstreamTarget::new("ftp://example.com", "llama2").is_err());
        assert!(UpstreamTarget::new("not a url", "llama2").is_err());
    }

    #[test]
    fn target_rejects_blank_model() {
        let err = UpstreamTarget::new("http://localhost:11434", "  ").unwrap_err();
        assert!(matches!(err, GenerateError::Validation(_)));
    }
}
