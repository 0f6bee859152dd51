//! Request handlers for the relay routes.

use crate::api::{ApiError, AppState};
use crate::{BackendReply, Passthrough, RelayConfig};
use axum::{
    Json,
    body::Body,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::BytesRejection,
    },
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::TryStreamExt;
use relaychat_core::{TIMEOUT_HEADER, UploadReceipt};
use relaychat_error::{RelayError, RelayErrorKind};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Form field names accepted for the uploaded file when the part carries no
/// file name.
const FILE_FIELDS: [&str; 2] = ["file", "image"];

/// `GET /health`
#[instrument(skip(state))]
pub async fn health(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.metrics.record_request("health");
    let started = Instant::now();
    let reply = state
        .backend
        .health(state.config.buffered_timeout())
        .await
        .inspect_err(|e| state.metrics.record_error(e.kind.code()))?;
    state
        .metrics
        .record_backend_latency("health", started.elapsed().as_secs_f64());
    passthrough_response(reply)
}

/// `GET /model_info`
#[instrument(skip(state))]
pub async fn model_info(State(state): State<AppState>) -> Result<Response, ApiError> {
    state.metrics.record_request("model_info");
    let started = Instant::now();
    let reply = state
        .backend
        .model_info(state.config.buffered_timeout())
        .await
        .inspect_err(|e| state.metrics.record_error(e.kind.code()))?;
    state
        .metrics
        .record_backend_latency("model_info", started.elapsed().as_secs_f64());
    passthrough_response(reply)
}

fn passthrough_response(reply: Passthrough) -> Result<Response, ApiError> {
    let mut builder = Response::builder().status(status_from(reply.status)?);
    if let Some(content_type) = reply.content_type {
        builder = builder.header(CONTENT_TYPE, content_type);
    }
    builder
        .body(Body::from(reply.body))
        .map_err(|e| RelayErrorKind::InvalidBackendResponse(e.to_string()).into())
}

/// `POST /generate`
///
/// The body must be a JSON object; it is forwarded byte for byte. The
/// backend's content type decides whether the answer is returned as one JSON
/// document or piped through as a stream.
#[instrument(skip_all, fields(bytes))]
pub async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    state.metrics.record_request("generate");
    let result = relay_generation(&state, &headers, body).await;
    if let Err(e) = &result {
        state.metrics.record_error(e.0.kind.code());
    }
    result
}

async fn relay_generation(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, ApiError> {
    let body = body.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            RelayErrorKind::PayloadTooLarge(rejection.body_text())
        } else {
            RelayErrorKind::InvalidRequest(rejection.body_text())
        }
    })?;
    tracing::Span::current().record("bytes", body.len());

    serde_json::from_slice::<serde_json::Map<String, serde_json::Value>>(&body).map_err(|e| {
        RelayErrorKind::InvalidRequest(format!("Body must be a JSON object: {}", e))
    })?;

    let deadline = deadline_for(headers, &state.config)?;
    let started = Instant::now();
    let reply = state.backend.generate(body, deadline).await?;
    state
        .metrics
        .record_backend_latency("generate", started.elapsed().as_secs_f64());

    match reply {
        BackendReply::Buffered { status, body } => {
            debug!(status, "Returning buffered response");
            Ok((status_from(status)?, Json(body)).into_response())
        }
        BackendReply::Stream {
            status,
            content_type,
            body,
        } => {
            info!(status, content_type = ?content_type, "Relaying stream");
            let metrics = state.metrics.clone();
            let stream = body.inspect_ok(move |chunk| metrics.record_stream_bytes(chunk.len()));

            let mut builder = Response::builder()
                .status(status_from(status)?)
                .header(CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header("x-accel-buffering", HeaderValue::from_static("no"));
            if let Some(content_type) = content_type {
                builder = builder.header(CONTENT_TYPE, content_type);
            }
            builder
                .body(Body::from_stream(stream))
                .map_err(|e| RelayErrorKind::InvalidBackendResponse(e.to_string()).into())
        }
    }
}

/// Deadline of a buffered call: the client's header value clamped to the
/// configured maximum, or the configured default.
pub fn deadline_for(headers: &HeaderMap, config: &RelayConfig) -> Result<Duration, RelayError> {
    let Some(value) = headers.get(TIMEOUT_HEADER) else {
        return Ok(config.buffered_timeout());
    };
    let secs = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .ok_or_else(|| {
            RelayError::new(RelayErrorKind::InvalidRequest(format!(
                "{} must be a positive integer",
                TIMEOUT_HEADER
            )))
        })?;
    Ok(Duration::from_secs(secs).min(config.max_timeout()))
}

/// `POST /upload`
///
/// Stores the first file part of a multipart form and returns its reference.
#[instrument(skip_all)]
pub async fn upload_file(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadReceipt>, ApiError> {
    state.metrics.record_request("upload");
    let result = store_first_file(&state, multipart).await;
    match &result {
        Ok(receipt) => {
            state.metrics.record_upload(receipt.size().unwrap_or_default());
        }
        Err(e) => state.metrics.record_error(e.0.kind.code()),
    }
    result.map(Json)
}

async fn store_first_file(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<UploadReceipt, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(reason = %rejection.body_text(), "Upload is not a multipart form");
        RelayError::new(RelayErrorKind::MissingFile)
    })?;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let file_name = field.file_name().map(str::to_string);
        let is_file = file_name.is_some()
            || field
                .name()
                .is_some_and(|name| FILE_FIELDS.contains(&name));
        if !is_file {
            continue;
        }

        let original_name = file_name.unwrap_or_else(|| "upload".to_string());
        let mut pending = state.uploads.begin(&original_name).await?;
        loop {
            match field.chunk().await {
                Ok(Some(chunk)) => {
                    if let Err(e) = pending.write_chunk(&chunk).await {
                        pending.discard().await;
                        return Err(e.into());
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    pending.discard().await;
                    return Err(multipart_error(e));
                }
            }
        }

        let stored = pending.finish().await?;
        info!(
            original_name = %stored.original_name,
            reference = %stored.reference,
            size = stored.size,
            "Stored upload"
        );
        return Ok(stored.receipt());
    }

    Err(RelayErrorKind::MissingFile.into())
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        RelayErrorKind::PayloadTooLarge(err.body_text()).into()
    } else {
        RelayErrorKind::InvalidRequest(err.body_text()).into()
    }
}

fn status_from(status: u16) -> Result<StatusCode, ApiError> {
    StatusCode::from_u16(status).map_err(|e| {
        RelayErrorKind::InvalidBackendResponse(format!("Bad status {}: {}", status, e)).into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RelayConfig {
        RelayConfig::builder()
            .buffered_timeout_secs(300u64)
            .max_timeout_secs(600u64)
            .build()
            .expect("valid config")
    }

    #[test]
    fn test_deadline_defaults_without_header() {
        let deadline = deadline_for(&HeaderMap::new(), &config()).expect("deadline");
        assert_eq!(deadline, Duration::from_secs(300));
    }

    #[test]
    fn test_deadline_header_is_clamped() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("9000"));
        let deadline = deadline_for(&headers, &config()).expect("deadline");
        assert_eq!(deadline, Duration::from_secs(600));

        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("30"));
        let deadline = deadline_for(&headers, &config()).expect("deadline");
        assert_eq!(deadline, Duration::from_secs(30));
    }

    #[test]
    fn test_deadline_rejects_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("soon"));
        let err = deadline_for(&headers, &config()).expect_err("should reject");
        assert_eq!(err.kind.status_code(), 400);

        headers.insert(TIMEOUT_HEADER, HeaderValue::from_static("0"));
        assert!(deadline_for(&headers, &config()).is_err());
    }
}
