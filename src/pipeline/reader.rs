//! Streaming reply reader
//!
//! Posts the transcribed order to the orchestrator's SSE endpoint and turns
//! the token stream into sentences as they complete. If the stream cannot be
//! read, the blocking endpoint is asked once for the whole reply instead.

use std::time::Duration;

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::Dispatcher;
use super::segmenter::SentenceBuffer;
use crate::config::OrchestratorConfig;
use crate::{Error, Result};

#[derive(Serialize)]
struct OrderRequest<'a> {
    order: &'a str,
}

#[derive(Deserialize)]
struct OrderResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct StreamMessage {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// One meaningful `data:` line of the event stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Next piece of the reply
    Token(String),
    /// The orchestrator gave up on this order
    Error(String),
    /// End of the reply
    Done,
}

/// Parse one line of the event stream
///
/// Blank lines, comments, other fields, malformed JSON and empty tokens all
/// yield `None`.
#[must_use]
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.trim_end_matches('\r').strip_prefix("data:")?;
    let data = data.strip_prefix(' ').unwrap_or(data);

    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }

    let message: StreamMessage = serde_json::from_str(data).ok()?;
    if let Some(error) = message.error {
        let error = match error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Some(SseEvent::Error(error));
    }

    message
        .token
        .filter(|t| !t.is_empty())
        .map(SseEvent::Token)
}

/// How a reply ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The stream ended normally
    Streamed,
    /// The orchestrator reported an error on the stream
    ServerError,
    /// The stream failed and the blocking endpoint answered
    Fallback,
    /// Both the stream and the blocking endpoint failed
    Failed,
}

enum StreamEnd {
    Completed,
    ServerError(String),
}

/// Client for the orchestrator's order endpoints
pub struct OrchestratorClient {
    client: reqwest::Client,
    stream_url: String,
    order_url: String,
    token: SecretString,
    stream_timeout: Duration,
    fallback_timeout: Duration,
}

impl OrchestratorClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &OrchestratorConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            stream_url: config.stream_url.clone(),
            order_url: config.order_url.clone(),
            token: SecretString::from(config.bearer_token.expose_secret().to_owned()),
            stream_timeout: config.stream_timeout,
            fallback_timeout: config.fallback_timeout,
        })
    }

    /// Get the reply to `text`, dispatching each sentence as it completes
    ///
    /// Consumes the dispatcher so the queue is always terminated exactly
    /// once, whatever path the reply takes.
    pub async fn respond(&self, text: &str, mut dispatcher: Dispatcher) -> ReplyOutcome {
        tracing::info!(order = %text, "order");

        let outcome = match self.stream(text, &mut dispatcher).await {
            Ok(StreamEnd::Completed) => ReplyOutcome::Streamed,
            Ok(StreamEnd::ServerError(error)) => {
                tracing::error!(%error, "stream error from server");
                ReplyOutcome::ServerError
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    dispatched = dispatcher.dispatched(),
                    "SSE reader error, falling back to blocking call"
                );
                match self.fallback(text).await {
                    Ok(response) => {
                        dispatcher.dispatch(&response);
                        ReplyOutcome::Fallback
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "fallback also failed");
                        ReplyOutcome::Failed
                    }
                }
            }
        };

        tracing::debug!(?outcome, sentences = dispatcher.dispatched(), "reply finished");
        dispatcher.finish();
        outcome
    }

    /// Read the token stream; the unterminated tail is lost on error
    async fn stream(&self, text: &str, dispatcher: &mut Dispatcher) -> Result<StreamEnd> {
        let response = self
            .client
            .post(&self.stream_url)
            .bearer_auth(self.token.expose_secret())
            .json(&OrderRequest { order: text })
            .timeout(self.stream_timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| Error::Transport(e.to_string()))?;

        let mut body = response.bytes_stream();
        let mut pending: Vec<u8> = Vec::new();
        let mut sentences = SentenceBuffer::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| Error::Transport(e.to_string()))?;
            pending.extend_from_slice(&chunk);

            while let Some(newline) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=newline).collect();
                if let Some(end) = apply_line(&line[..newline], &mut sentences, dispatcher) {
                    return Ok(end);
                }
            }
        }

        // Last line may arrive without its newline
        if !pending.is_empty()
            && let Some(end) = apply_line(&pending, &mut sentences, dispatcher)
        {
            return Ok(end);
        }

        // Body closed cleanly without [DONE]
        flush(&mut sentences, dispatcher);
        Ok(StreamEnd::Completed)
    }

    /// One blocking request for the whole reply
    async fn fallback(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.order_url)
            .bearer_auth(self.token.expose_secret())
            .json(&OrderRequest { order: text })
            .timeout(self.fallback_timeout)
            .send()
            .await?
            .error_for_status()?;

        let reply: OrderResponse = response.json().await?;
        Ok(reply.response)
    }
}

/// Apply one SSE line; `Some` once the stream is over
fn apply_line(
    line: &[u8],
    sentences: &mut SentenceBuffer,
    dispatcher: &mut Dispatcher,
) -> Option<StreamEnd> {
    match parse_sse_line(&String::from_utf8_lossy(line))? {
        SseEvent::Token(token) => {
            for sentence in sentences.push(&token) {
                dispatcher.dispatch(&sentence);
            }
            None
        }
        SseEvent::Done => {
            flush(sentences, dispatcher);
            Some(StreamEnd::Completed)
        }
        SseEvent::Error(error) => Some(StreamEnd::ServerError(error)),
    }
}

fn flush(sentences: &mut SentenceBuffer, dispatcher: &mut Dispatcher) {
    if let Some(rest) = sentences.finish() {
        dispatcher.dispatch(&rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_lines() {
        assert_eq!(
            parse_sse_line(r#"data: {"token": "Bon"}"#),
            Some(SseEvent::Token("Bon".to_string()))
        );
        assert_eq!(
            parse_sse_line("data: {\"token\": \"jour\"}\r"),
            Some(SseEvent::Token("jour".to_string()))
        );
        assert_eq!(parse_sse_line(r#"data: {"token": ""}"#), None);
    }

    #[test]
    fn done_and_error_lines() {
        assert_eq!(parse_sse_line("data: [DONE]"), Some(SseEvent::Done));
        assert_eq!(
            parse_sse_line(r#"data: {"error": "model overloaded"}"#),
            Some(SseEvent::Error("model overloaded".to_string()))
        );
    }

    #[test]
    fn ignored_lines() {
        assert_eq!(parse_sse_line(""), None);
        assert_eq!(parse_sse_line(": keep-alive"), None);
        assert_eq!(parse_sse_line("event: message"), None);
        assert_eq!(parse_sse_line("data: {not json"), None);
    }
}
