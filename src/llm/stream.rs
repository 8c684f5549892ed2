use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;

use super::{TokenChunk, TokenStream};
use crate::error::UpstreamError;

/// Accumulates raw response bytes and hands out complete lines.
///
/// Works on bytes rather than `str` so a multi-byte character split across
/// two network reads is reassembled before decoding.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next newline-terminated line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let end = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=end).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    /// Whatever is left once the body has ended, if it is not blank.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.pending);
        if rest.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(String::from_utf8_lossy(&rest).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// One line of Ollama's `/api/generate` stream.
#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    error: Option<String>,
}

/// Parse one stream line. Malformed JSON is logged and skipped.
pub fn parse_line(line: &str) -> Result<Option<TokenChunk>, UpstreamError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let parsed: GenerateLine = match serde_json::from_str(line) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!(
                "Skipping malformed Ollama stream line ({e}): {}",
                truncate(line, 200)
            );
            return Ok(None);
        }
    };

    if let Some(err) = parsed.error {
        return Err(UpstreamError::Generation(err));
    }

    Ok(Some(TokenChunk {
        delta: parsed.response,
        done: parsed.done,
    }))
}

/// Turn a streamed newline-delimited JSON body into token chunks.
///
/// Each read from `body` must arrive within `read_timeout`. The stream ends
/// after the first chunk flagged `done`, after the first error, or at EOF.
pub fn decode_ndjson<S, B, E>(body: S, url: String, read_timeout: Duration) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
{
    Box::pin(async_stream::stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::default();

        loop {
            let next = match tokio::time::timeout(read_timeout, body.next()).await {
                Ok(next) => next,
                Err(_) => {
                    yield Err(UpstreamError::Timeout(read_timeout));
                    return;
                }
            };

            match next {
                Some(Ok(bytes)) => {
                    lines.extend(bytes.as_ref());
                    while let Some(line) = lines.next_line() {
                        match parse_line(&line) {
                            Ok(Some(chunk)) => {
                                let done = chunk.done;
                                yield Ok(chunk);
                                if done {
                                    return;
                                }
                            }
                            Ok(None) => {}
                            Err(err) => {
                                yield Err(err);
                                return;
                            }
                        }
                    }
                }
                Some(Err(err)) => {
                    yield Err(UpstreamError::transport(&url, err));
                    return;
                }
                None => break,
            }
        }

        if let Some(line) = lines.finish() {
            match parse_line(&line) {
                Ok(Some(chunk)) => {
                    yield Ok(chunk);
                }
                Ok(None) => {}
                Err(err) => {
                    yield Err(err);
                }
            }
        }
    })
}

/// Drain a token stream into the full generated text.
pub async fn collect_article(mut tokens: TokenStream) -> Result<String, UpstreamError> {
    let mut out = String::new();

    while let Some(chunk) = tokens.next().await {
        let chunk = chunk?;
        out.push_str(&chunk.delta);
        if chunk.done {
            break;
        }
    }

    Ok(out)
}

/// Truncate long strings for logging.
pub(crate) fn truncate(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated {} bytes]", &s[..end], s.len() - end)
}
