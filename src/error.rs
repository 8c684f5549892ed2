use std::time::Duration;

use thiserror::Error;

/// Everything that can end an article generation before `[DONE]`.
#[derive(Debug, Error)]
pub enum GenerateError {
    /// The inbound request was unusable; the LLM backend was never contacted.
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl GenerateError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GenerateError::Validation(msg.into())
    }
}

/// Failures talking to the Ollama server.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Ollama returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to reach Ollama at {url}: {message}")]
    Transport { url: String, message: String },

    #[error("no response from Ollama within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("model '{0}' is not available on the Ollama server")]
    ModelNotFound(String),

    #[error("Ollama reported an error: {0}")]
    Generation(String),
}

impl UpstreamError {
    /// HTTP status of the upstream response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Keeps the whole source chain; reqwest puts the root cause
    /// (refused, DNS, reset) in `source()`, not in its own message.
    pub(crate) fn transport<E>(url: &str, err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        UpstreamError::Transport {
            url: url.to_string(),
            message: format!("{:#}", anyhow::Error::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_mentions_code() {
        let err = UpstreamError::Status {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.status(), Some(500));
        assert!(err.to_string().contains("500"));
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = UpstreamError::transport(
            "http://localhost:1",
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused"),
        );
        assert_eq!(err.status(), None);
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn transport_error_keeps_source_chain() {
        #[derive(Debug, Error)]
        #[error("error sending request")]
        struct Outer(#[source] std::io::Error);

        let root = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "Connection refused");
        let err = UpstreamError::transport("http://localhost:1", Outer(root));
        let msg = err.to_string();
        assert!(msg.contains("error sending request"), "{msg}");
        assert!(msg.contains("Connection refused"), "{msg}");
    }

    #[test]
    fn upstream_converts_into_generate_error() {
        let err: GenerateError = UpstreamError::ModelNotFound("llama2".into()).into();
        assert_eq!(
            err.to_string(),
            "model 'llama2' is not available on the Ollama server"
        );
    }
}
