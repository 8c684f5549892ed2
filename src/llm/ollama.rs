use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::stream::{decode_ndjson, truncate};
use super::{SamplingOptions, TokenStream, UpstreamTarget};
use crate::error::UpstreamError;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: SamplingOptions,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
}

/// A model as listed by `/api/tags`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub modified_at: Option<String>,
}

/// Async Ollama client using /api/generate.
///
/// Holds only the connection pool and generation settings; the server and
/// model are supplied on every call.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    sampling: SamplingOptions,
    timeout: Duration,
}

impl OllamaClient {
    pub fn new(sampling: SamplingOptions, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            sampling,
            timeout,
        })
    }

    pub async fn list_models(&self, base_url: &str) -> Result<Vec<ModelInfo>, UpstreamError> {
        let url = format!("{}/api/tags", base_url.trim().trim_end_matches('/'));

        let resp = tokio::time::timeout(self.timeout, self.http.get(&url).send())
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(|e| UpstreamError::transport(&url, e))?;
        let resp = check_status(resp, self.timeout).await?;

        let tags: TagsResponse = tokio::time::timeout(self.timeout, resp.json())
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(|e| UpstreamError::transport(&url, e))?;

        Ok(tags.models)
    }

    /// Start a streaming generation. Resolves once response headers arrive;
    /// tokens are pulled lazily from the returned stream.
    pub async fn open(
        &self,
        target: &UpstreamTarget,
        prompt: &str,
    ) -> Result<TokenStream, UpstreamError> {
        self.ensure_model(target).await?;

        let url = target.endpoint("/api/generate");
        let body = GenerateRequest {
            model: target.model(),
            prompt,
            stream: true,
            options: self.sampling,
        };

        log::info!(
            "Streaming Ollama model {:?} from {}",
            target.model(),
            target.base_url()
        );
        log::trace!("Ollama prompt:\n{}", truncate(prompt, 3000));

        let resp = tokio::time::timeout(self.timeout, self.http.post(&url).json(&body).send())
            .await
            .map_err(|_| UpstreamError::Timeout(self.timeout))?
            .map_err(|e| UpstreamError::transport(&url, e))?;
        let resp = check_status(resp, self.timeout).await?;

        Ok(decode_ndjson(resp.bytes_stream(), url, self.timeout))
    }

    /// Best effort: only a successful listing that lacks the model fails.
    async fn ensure_model(&self, target: &UpstreamTarget) -> Result<(), UpstreamError> {
        match self.list_models(target.base_url()).await {
            Ok(models) => {
                if models.iter().any(|m| model_matches(&m.name, target.model())) {
                    Ok(())
                } else {
                    Err(UpstreamError::ModelNotFound(target.model().to_string()))
                }
            }
            Err(e) => {
                log::debug!("Skipping model check for {:?}: {e}", target.model());
                Ok(())
            }
        }
    }
}

/// `llama2` and `llama2:latest` name the same model.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted
        || listed.strip_suffix(":latest") == Some(wanted)
        || wanted.strip_suffix(":latest") == Some(listed)
}

/// Pass successful responses through; drain failed ones into an error.
///
/// The drain is bounded by `read_timeout`; a stalled error body still
/// reports the status, with an empty message.
async fn check_status(
    resp: reqwest::Response,
    read_timeout: Duration,
) -> Result<reqwest::Response, UpstreamError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = match tokio::time::timeout(read_timeout, resp.text()).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            log::debug!("Failed to read Ollama error body: {e}");
            String::new()
        }
        Err(_) => {
            log::debug!("Ollama error body stalled for {}s", read_timeout.as_secs());
            String::new()
        }
    };
    Err(UpstreamError::Status {
        status: status.as_u16(),
        body: error_message(&text),
    })
}

/// Ollama reports failures as `{"error": "..."}`; fall back to the raw body.
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => truncate(body.trim(), 500),
    }
}
