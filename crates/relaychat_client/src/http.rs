//! HTTP client for the relay.

use crate::{ClientConfig, PickedFile};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use relaychat_core::{
    BufferedResponse, GenerationRequest, ResponseMode, TIMEOUT_HEADER, UploadReceipt,
};
use relaychat_error::{ClientError, ClientErrorKind, ClientResult};
use reqwest::{Client, Response, header::CONTENT_TYPE, multipart};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, instrument};

/// Body chunks of a streamed generation response.
pub type ReplyStream = BoxStream<'static, ClientResult<Bytes>>;

/// Relay answer to a generation request.
pub enum GenerationReply {
    /// One parsed JSON document.
    Buffered(BufferedResponse),
    /// A live body to decode incrementally. Dropping it closes the connection.
    Stream(ReplyStream),
}

impl std::fmt::Debug for GenerationReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationReply::Buffered(body) => f.debug_tuple("Buffered").field(body).finish(),
            GenerationReply::Stream(_) => f.debug_tuple("Stream").finish_non_exhaustive(),
        }
    }
}

/// Uploads one file and returns its stored reference.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Upload `file`.
    async fn upload(&self, file: &PickedFile) -> ClientResult<UploadReceipt>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

/// Client for the relay's `/health`, `/upload` and `/generate` routes.
#[derive(Debug, Clone)]
pub struct RelayClient {
    http: Client,
    base_url: String,
    request_timeout: Option<Duration>,
}

impl RelayClient {
    /// Creates a client from configuration.
    pub fn new(config: &ClientConfig) -> ClientResult<Self> {
        let http = Client::builder().build().map_err(|e| {
            ClientError::new(ClientErrorKind::Http(format!(
                "Failed to build HTTP client: {}",
                e
            )))
        })?;
        let base_url = config.relay_url().trim_end_matches('/').to_string();
        debug!(relay_url = %base_url, "Created relay client");
        Ok(Self {
            http,
            base_url,
            request_timeout: config.request_timeout(),
        })
    }

    /// Base URL of the relay.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Backend health as reported through the relay.
    #[instrument(skip(self), fields(relay = %self.base_url))]
    pub async fn health(&self) -> ClientResult<serde_json::Value> {
        let response = self
            .http
            .get(self.url("health"))
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response.json().await.map_err(|e| {
            ClientError::new(ClientErrorKind::InvalidResponse(format!(
                "Health body is not JSON: {}",
                e
            )))
        })
    }

    /// Upload one file as a multipart form.
    #[instrument(skip(self, file), fields(name = %file.name(), size = file.size()))]
    pub async fn upload_file(&self, file: &PickedFile) -> ClientResult<UploadReceipt> {
        let part = multipart::Part::stream_with_length(file.bytes().clone(), file.size())
            .file_name(file.name().to_string())
            .mime_str(file.mime_type())
            .map_err(|e| ClientError::new(ClientErrorKind::Http(e.to_string())))?;
        let form = multipart::Form::new().part("file", part);

        let response = self
            .http
            .post(self.url("upload"))
            .multipart(form)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let receipt: UploadReceipt = response.json().await.map_err(|e| {
            ClientError::new(ClientErrorKind::InvalidResponse(format!(
                "Upload body is not a receipt: {}",
                e
            )))
        })?;
        if receipt.path().is_empty() {
            return Err(ClientError::new(ClientErrorKind::InvalidResponse(
                "Upload returned an empty reference".to_string(),
            )));
        }
        debug!(reference = %receipt.path(), "Upload resolved");
        Ok(receipt)
    }

    /// Send a generation request.
    ///
    /// The relay's content type decides the reply shape; a JSON reply is read
    /// completely, anything else is returned as a live stream.
    #[instrument(
        skip(self, request),
        fields(prompt_len = request.prompt().len(), references = request.image_paths().len())
    )]
    pub async fn generate(&self, request: &GenerationRequest) -> ClientResult<GenerationReply> {
        let mut builder = self.http.post(self.url("generate")).json(request);
        if let Some(timeout) = self.request_timeout {
            builder = builder.header(TIMEOUT_HEADER, timeout.as_secs().to_string());
        }
        let response = builder.send().await.map_err(transport_error)?;
        let response = check_status(response).await?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        match ResponseMode::from_content_type(content_type.as_deref()) {
            ResponseMode::Buffered => {
                let body: BufferedResponse = response.json().await.map_err(|e| {
                    error!(error = %e, "Buffered reply did not parse");
                    ClientError::new(ClientErrorKind::InvalidResponse(e.to_string()))
                })?;
                Ok(GenerationReply::Buffered(body))
            }
            ResponseMode::Stream => {
                debug!(content_type = ?content_type, "Streaming reply");
                let stream = response
                    .bytes_stream()
                    .map(|chunk| chunk.map_err(transport_error))
                    .boxed();
                Ok(GenerationReply::Stream(stream))
            }
        }
    }
}

#[async_trait]
impl FileUploader for RelayClient {
    async fn upload(&self, file: &PickedFile) -> ClientResult<UploadReceipt> {
        self.upload_file(file).await
    }
}

#[track_caller]
fn transport_error(err: reqwest::Error) -> ClientError {
    error!(error = %err, "Relay request failed");
    if err.is_timeout() {
        ClientError::new(ClientErrorKind::Timeout(err.to_string()))
    } else {
        ClientError::new(ClientErrorKind::Http(err.to_string()))
    }
}

/// Turn a non-success response into the matching client error.
async fn check_status(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let body: Option<ErrorBody> = serde_json::from_str(&text).ok();
    let message = body
        .as_ref()
        .and_then(|b| b.error.clone())
        .unwrap_or_else(|| text.clone());
    error!(status = status.as_u16(), message = %message, "Relay returned an error");

    let kind = match body.as_ref().and_then(|b| b.kind.as_deref()) {
        Some("timeout") => ClientErrorKind::Timeout(message),
        Some("backend_unavailable") => ClientErrorKind::BackendUnavailable(message),
        _ => ClientErrorKind::Status {
            status: status.as_u16(),
            message,
        },
    };
    Err(ClientError::new(kind))
}
