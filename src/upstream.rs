use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::translate::ooba_types::OobaStreamEvent;
use crate::translate::openai_types::{ChatCompletionRequest, ChatCompletionResponse};
use crate::translate::streaming::{LineSplitter, RelayStep, StreamRelay};

use bytes::Bytes;
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Lazy, finite stream of Ooba events relayed from one upstream response.
/// Dropping it closes the upstream connection.
pub type OobaEventStream = Pin<Box<dyn Stream<Item = OobaStreamEvent> + Send>>;

/// Outcome of an upstream call
pub enum UpstreamReply<T> {
    Success(T),
    Rejected(UpstreamRejection),
}

/// A non-success upstream response, kept verbatim for passthrough.
#[derive(Debug, Clone)]
pub struct UpstreamRejection {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Client for the chat completions endpoint. Built once at startup, read-only after.
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl UpstreamClient {
    pub fn new(config: &ProxyConfig) -> Result<Self> {
        // No client-wide timeout: it would also cut long streaming bodies
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self::with_client(
            client,
            &config.upstream.base_url,
            config.resolve_api_key(),
            &config.upstream.model,
        )
        .with_timeout(Duration::from_secs(config.upstream.timeout_secs)))
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
        model: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: model.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Total time allowed for a buffered call. Streaming calls are not bounded.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    async fn send(
        &self,
        req: &ChatCompletionRequest,
        timeout: Option<Duration>,
    ) -> Result<reqwest::Response> {
        let mut builder = self
            .client
            .post(self.chat_url())
            .header("Content-Type", "application/json")
            .json(req);

        if let Some(ref key) = self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        builder
            .send()
            .await
            .map_err(|e| ProxyError::provider(format!("Request failed: {}", e)))
    }

    /// Buffered call: the whole body is read and parsed as a chat completion.
    pub async fn complete(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<UpstreamReply<ChatCompletionResponse>> {
        tracing::info!(url = %self.chat_url(), model = %req.model, "POST upstream");

        let response = self.send(req, Some(self.timeout)).await?;
        if !response.status().is_success() {
            return Ok(UpstreamReply::Rejected(rejection(response).await?));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ProxyError::provider(format!("Failed to read response body: {}", e)))?;

        tracing::debug!(body_len = body.len(), "Upstream response received");

        let parsed: ChatCompletionResponse = serde_json::from_slice(&body).map_err(|e| {
            ProxyError::translation(format!(
                "Failed to parse provider response: {}. Body: {}",
                e,
                truncate(&String::from_utf8_lossy(&body), 300)
            ))
        })?;

        Ok(UpstreamReply::Success(parsed))
    }

    /// Streaming call: the body is relayed line by line as it arrives.
    pub async fn stream(
        &self,
        req: &ChatCompletionRequest,
    ) -> Result<UpstreamReply<OobaEventStream>> {
        tracing::info!(url = %self.chat_url(), model = %req.model, "POST upstream (streaming)");

        let response = self.send(req, None).await?;
        if !response.status().is_success() {
            return Ok(UpstreamReply::Rejected(rejection(response).await?));
        }

        Ok(UpstreamReply::Success(Box::pin(relay_events(
            response.bytes_stream(),
        ))))
    }
}

async fn rejection(response: reqwest::Response) -> Result<UpstreamRejection> {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let body = response
        .bytes()
        .await
        .map_err(|e| ProxyError::provider(format!("Failed to read error body: {}", e)))?;

    let preview = String::from_utf8_lossy(&body);
    tracing::warn!(
        status,
        body = %truncate(&preview, 300),
        "Upstream rejected request"
    );

    Ok(UpstreamRejection {
        status,
        content_type,
        body,
    })
}

/// Relay an upstream SSE byte stream as Ooba events, ending with exactly one `stream_end`.
pub fn relay_events<S, E>(byte_stream: S) -> impl Stream<Item = OobaStreamEvent> + Send + 'static
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::stream! {
        let mut relay = StreamRelay::new();
        let mut lines = LineSplitter::new();

        tokio::pin!(byte_stream);

        'read: while let Some(chunk_result) = byte_stream.next().await {
            let chunk = match chunk_result {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!(error = %e, "Upstream stream error");
                    break;
                }
            };

            for line in lines.push(&chunk) {
                match relay.push_line(&line) {
                    RelayStep::Emit(event) => {
                        yield event;
                    }
                    RelayStep::Skip => {}
                    RelayStep::Done => break 'read,
                }
            }
        }

        if !relay.is_done() {
            if let Some(line) = lines.flush() {
                if let RelayStep::Emit(event) = relay.push_line(&line) {
                    yield event;
                }
            }
        }

        tracing::info!(
            events = relay.emitted(),
            dropped = relay.dropped(),
            "Stream completed"
        );

        if let Some(end) = relay.finish() {
            yield end;
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
