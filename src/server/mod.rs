//! HTTP server for the browser UI
//!
//! - GET  /api/generate-article-stream - SSE article streaming (also at /generate-article-stream)
//! - POST /api/generate-article        - same generation, answered in one JSON response
//! - POST /api/scan-git                - commits of one day across a directory tree
//! - POST /api/test-ollama, /api/test-wordpress, /api/publish-wordpress
//! - GET  /api/health, /api/config

mod api;
mod relay;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::error::GenerateError;
use crate::llm::OllamaClient;

/// Shared by every handler. Read-only apart from the session counter.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ollama: OllamaClient,
    sessions: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let ollama = OllamaClient::new(config.sampling, config.ollama_timeout())?;
        Ok(Self {
            config: Arc::new(config),
            ollama,
            sessions: Arc::new(AtomicU64::new(0)),
        })
    }

    fn next_session_id(&self) -> u64 {
        self.sessions.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(api::health))
        .route("/api/config", get(api::show_config))
        .route("/api/test-ollama", post(api::test_ollama))
        .route("/api/test-wordpress", post(api::test_wordpress))
        .route("/api/scan-git", post(api::scan_git))
        .route("/api/generate-article", post(api::generate_article))
        .route("/api/generate-article-stream", get(relay::generate_article_stream))
        .route("/generate-article-stream", get(relay::generate_article_stream))
        .route("/api/publish-wordpress", post(api::publish_wordpress))
        .fallback(api::not_found)
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(config)?;

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    log::info!("Listening on http://{addr}");
    log::info!("Health check: http://{addr}/api/health");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown requested");
}

/// JSON error body: `{ "success": false, "error": "..." }`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{} {}", self.status, self.message);
        }

        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<GenerateError> for ApiError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::Validation(msg) => ApiError::bad_request(msg),
            GenerateError::Upstream(e) => ApiError::bad_gateway(e.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("{err:#}"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}
