//! HTTP client for the model-serving backend.

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use relaychat_core::ResponseMode;
use relaychat_error::{RelayError, RelayErrorKind, RelayResult};
use reqwest::{Client, Response, header::CONTENT_TYPE};
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, error, instrument, warn};

/// Byte stream of a streamed backend response.
pub type BackendByteStream = BoxStream<'static, Result<Bytes, reqwest::Error>>;

/// Backend answer to a generation call.
pub enum BackendReply {
    /// Fully read and parsed JSON body.
    Buffered {
        /// Backend status code
        status: u16,
        /// Parsed body
        body: serde_json::Value,
    },
    /// Live body, already known to have produced its first chunk.
    Stream {
        /// Backend status code
        status: u16,
        /// Backend content type
        content_type: Option<String>,
        /// Remaining body, first chunk included
        body: BackendByteStream,
    },
}

impl std::fmt::Debug for BackendReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendReply::Buffered { status, body } => f
                .debug_struct("Buffered")
                .field("status", status)
                .field("body", body)
                .finish(),
            BackendReply::Stream {
                status,
                content_type,
                ..
            } => f
                .debug_struct("Stream")
                .field("status", status)
                .field("content_type", content_type)
                .finish_non_exhaustive(),
        }
    }
}

/// A backend response forwarded verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passthrough {
    /// Backend status code
    pub status: u16,
    /// Backend content type
    pub content_type: Option<String>,
    /// Backend body
    pub body: Bytes,
}

/// Client for the backend's `/health`, `/generate` and `/model_info`.
///
/// Holds no per-request state; cloning shares the connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
}

impl BackendClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// Only connection establishment is bounded here; response deadlines are
    /// applied per call so streams are never cut off.
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> RelayResult<Self> {
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| {
                RelayError::new(RelayErrorKind::Config(format!(
                    "Failed to build HTTP client: {}",
                    e
                )))
            })?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "Created backend client");
        Ok(Self { http, base_url })
    }

    /// Base URL of the backend.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Forward the backend's health response verbatim.
    #[instrument(skip(self), fields(backend = %self.base_url))]
    pub async fn health(&self, deadline: Duration) -> RelayResult<Passthrough> {
        self.passthrough("health", deadline).await
    }

    /// Forward the backend's model description verbatim.
    #[instrument(skip(self), fields(backend = %self.base_url))]
    pub async fn model_info(&self, deadline: Duration) -> RelayResult<Passthrough> {
        self.passthrough("model_info", deadline).await
    }

    async fn passthrough(&self, path: &str, deadline: Duration) -> RelayResult<Passthrough> {
        let response = self.send_within(self.http.get(self.url(path)), deadline).await?;
        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let body = match timeout(deadline, response.bytes()).await {
            Err(_) => return Err(RelayError::new(RelayErrorKind::Timeout(deadline.as_secs()))),
            Ok(Err(e)) => {
                return Err(RelayError::new(RelayErrorKind::BackendUnavailable(
                    e.to_string(),
                )));
            }
            Ok(Ok(body)) => body,
        };
        debug!(status, bytes = body.len(), "Backend passthrough received");
        Ok(Passthrough {
            status,
            content_type,
            body,
        })
    }

    /// Send a generation body to the backend unmodified.
    ///
    /// `deadline` bounds the wait for response headers and, for buffered
    /// responses, the whole body. Once a streamed response has produced its
    /// first chunk no further deadline applies.
    ///
    /// # Errors
    ///
    /// - `Timeout` if the deadline elapses before a buffered response completes
    /// - `BackendUnavailable` if the backend cannot be reached, or a stream
    ///   fails or ends before its first byte
    /// - `InvalidBackendResponse` if a JSON response does not parse
    #[instrument(skip(self, body), fields(backend = %self.base_url, bytes = body.len()))]
    pub async fn generate(&self, body: Bytes, deadline: Duration) -> RelayResult<BackendReply> {
        let started = Instant::now();
        let request = self
            .http
            .post(self.url("generate"))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        let response = self.send_within(request, deadline).await?;

        let status = response.status().as_u16();
        let content_type = content_type_of(&response);
        let mode = ResponseMode::from_content_type(content_type.as_deref());
        debug!(status, ?mode, content_type = ?content_type, "Backend responded");

        match mode {
            ResponseMode::Buffered => {
                let remaining = deadline.saturating_sub(started.elapsed());
                let bytes = match timeout(remaining, response.bytes()).await {
                    Err(_) => {
                        warn!(deadline_secs = deadline.as_secs(), "Buffered response timed out");
                        return Err(RelayError::new(RelayErrorKind::Timeout(deadline.as_secs())));
                    }
                    Ok(Err(e)) => {
                        error!(error = %e, "Failed reading buffered response");
                        return Err(RelayError::new(RelayErrorKind::BackendUnavailable(
                            e.to_string(),
                        )));
                    }
                    Ok(Ok(bytes)) => bytes,
                };
                let body = serde_json::from_slice(&bytes).map_err(|e| {
                    error!(error = %e, "Backend JSON did not parse");
                    RelayError::new(RelayErrorKind::InvalidBackendResponse(e.to_string()))
                })?;
                Ok(BackendReply::Buffered { status, body })
            }
            ResponseMode::Stream => {
                let mut chunks = response.bytes_stream();
                let first = match chunks.next().await {
                    Some(Ok(chunk)) => chunk,
                    Some(Err(e)) => {
                        error!(error = %e, "Backend stream failed before first byte");
                        return Err(RelayError::new(RelayErrorKind::BackendUnavailable(
                            e.to_string(),
                        )));
                    }
                    None => {
                        error!("Backend stream ended before first byte");
                        return Err(RelayError::new(RelayErrorKind::BackendUnavailable(
                            "backend closed the stream without sending data".to_string(),
                        )));
                    }
                };
                let body = stream::once(async move { Ok(first) }).chain(chunks).boxed();
                Ok(BackendReply::Stream {
                    status,
                    content_type,
                    body,
                })
            }
        }
    }

    async fn send_within(
        &self,
        request: reqwest::RequestBuilder,
        deadline: Duration,
    ) -> RelayResult<Response> {
        match timeout(deadline, request.send()).await {
            Err(_) => {
                warn!(deadline_secs = deadline.as_secs(), "Backend headers timed out");
                Err(RelayError::new(RelayErrorKind::Timeout(deadline.as_secs())))
            }
            Ok(Err(e)) => {
                error!(error = %e, "Backend request failed");
                Err(RelayError::new(RelayErrorKind::BackendUnavailable(
                    e.to_string(),
                )))
            }
            Ok(Ok(response)) => Ok(response),
        }
    }
}

fn content_type_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() -> Result<(), Box<dyn std::error::Error>> {
        let client = BackendClient::new("http://localhost:8001/", Duration::from_secs(1))?;
        assert_eq!(client.url("/generate"), "http://localhost:8001/generate");
        Ok(())
    }
}
