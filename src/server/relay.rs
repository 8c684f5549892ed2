use std::convert::Infallible;

use async_stream::stream;
use axum::{
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderName, header},
    response::{
        IntoResponse,
        sse::{Event, KeepAlive, Sse},
    },
};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;

use super::AppState;
use crate::article::GenerationRequest;
use crate::error::GenerateError;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    data: Option<String>,
}

/// `GET /api/generate-article-stream?data=<url-encoded JSON>`
pub async fn generate_article_stream(
    State(state): State<AppState>,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> impl IntoResponse {
    let request = query
        .map_err(|rejection| GenerateError::validation(rejection.body_text()))
        .and_then(|Query(q)| GenerationRequest::from_query(q.data.as_deref()));

    let events = relay(state, request).map(Ok::<_, Infallible>);

    (
        [
            (HeaderName::from_static("x-accel-buffering"), "no"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Initializing,
    Streaming,
    Completed,
    Failed,
    /// The browser went away before a terminal event was sent.
    Cancelled,
}

/// Per-request bookkeeping. Dropped together with the event stream, so a
/// drop in a non-terminal phase is a cancellation.
#[derive(Debug)]
struct StreamSession {
    id: u64,
    phase: Phase,
    forwarded: usize,
}

impl StreamSession {
    fn new(id: u64) -> Self {
        Self {
            id,
            phase: Phase::Initializing,
            forwarded: 0,
        }
    }

    fn fail(&mut self, err: &GenerateError) -> Event {
        match err {
            GenerateError::Validation(msg) => {
                log::warn!("[session {}] rejected request: {msg}", self.id)
            }
            GenerateError::Upstream(e) => log::error!(
                "[session {}] upstream failure after {} chunks: {e}",
                self.id,
                self.forwarded
            ),
        }
        self.phase = Phase::Failed;
        error_event(&err.to_string())
    }

    /// Move a session that has not reached a terminal phase to `Cancelled`.
    fn cancel(&mut self) -> bool {
        match self.phase {
            Phase::Initializing | Phase::Streaming => {
                self.phase = Phase::Cancelled;
                true
            }
            Phase::Completed | Phase::Failed | Phase::Cancelled => false,
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        if self.cancel() {
            log::info!(
                "[session {}] client disconnected after {} chunks, upstream closed",
                self.id,
                self.forwarded
            );
        } else if self.phase == Phase::Completed {
            log::debug!(
                "[session {}] completed with {} chunks",
                self.id,
                self.forwarded
            );
        }
    }
}

/// The event sequence for one generation:
/// status, content deltas, then `end: [DONE]` or a single `error`.
///
/// Everything, including the upstream token stream, lives inside the
/// generator; axum drops it when the client disconnects.
fn relay(
    state: AppState,
    request: Result<GenerationRequest, GenerateError>,
) -> impl Stream<Item = Event> + Send + 'static {
    stream! {
        let mut session = StreamSession::new(state.next_session_id());

        let job = match request.and_then(|req| req.resolve(&state.config)) {
            Ok(job) => job,
            Err(err) => {
                yield session.fail(&err);
                return;
            }
        };

        log::info!(
            "[session {}] generating for {} projects ({} commits) with {:?} at {}",
            session.id,
            job.project_count,
            job.commit_count,
            job.target.model(),
            job.target.base_url()
        );

        yield status_event(&format!(
            "Connected, generating article with {}",
            job.target.model()
        ));
        session.phase = Phase::Streaming;

        let mut tokens = match state.ollama.open(&job.target, &job.prompt).await {
            Ok(tokens) => tokens,
            Err(err) => {
                yield session.fail(&err.into());
                return;
            }
        };

        while let Some(chunk) = tokens.next().await {
            match chunk {
                Ok(chunk) => {
                    if !chunk.delta.is_empty() {
                        session.forwarded += 1;
                        yield content_event(&chunk.delta);
                    }
                    if chunk.done {
                        break;
                    }
                }
                Err(err) => {
                    yield session.fail(&err.into());
                    return;
                }
            }
        }
        drop(tokens);

        session.phase = Phase::Completed;
        yield Event::default().event("end").data("[DONE]");
    }
}

fn status_event(message: &str) -> Event {
    Event::default().data(json!({ "type": "status", "message": message }).to_string())
}

fn content_event(delta: &str) -> Event {
    Event::default().data(json!({ "content": delta }).to_string())
}

fn error_event(message: &str) -> Event {
    Event::default()
        .event("error")
        .data(json!({ "error": message }).to_string())
}
