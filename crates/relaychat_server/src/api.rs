//! Router, shared state and error rendering for the relay.

use crate::handlers::{generate, health, model_info, upload_file};
use crate::{BackendClient, RelayConfig, RelayMetrics, ReferenceStyle, UploadStore};
use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use relaychat_error::{RelayError, RelayErrorKind, RelayResult};
use serde_json::json;
use std::sync::Arc;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Relay server state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Backend client
    pub backend: BackendClient,
    /// Upload storage
    pub uploads: Arc<UploadStore>,
    /// Relay settings
    pub config: Arc<RelayConfig>,
    /// Metrics instruments
    pub metrics: RelayMetrics,
}

impl AppState {
    /// Builds state from configuration.
    pub fn from_config(config: RelayConfig) -> RelayResult<Self> {
        let backend = BackendClient::new(config.backend_url().clone(), config.connect_timeout())?;
        let uploads = UploadStore::new(
            config.upload_dir().clone(),
            *config.reference_style(),
            config.public_upload_prefix(),
        )
        .with_max_bytes(config.upload_limit());
        Ok(Self {
            backend,
            uploads: Arc::new(uploads),
            config: Arc::new(config),
            metrics: RelayMetrics::new(),
        })
    }
}

/// Relay error rendered as an HTTP response.
///
/// The body is `{"error": <message>, "kind": <code>}` with the status of the
/// error kind, so failures are never an empty success.
#[derive(Debug)]
pub struct ApiError(pub RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

impl From<RelayErrorKind> for ApiError {
    #[track_caller]
    fn from(kind: RelayErrorKind) -> Self {
        Self(RelayError::new(kind))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = &self.0.kind;
        let status =
            StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Request rejected");
        }
        let body = json!({
            "error": self.0.public_message(),
            "kind": kind.code(),
        });
        (status, Json(body)).into_response()
    }
}

/// Creates the relay router.
///
/// Routes:
/// - `GET /health`, `GET /model_info`: backend passthrough
/// - `POST /generate`: generation relay
/// - `POST /upload`: multipart upload
/// - `GET <public_upload_prefix>/*`: stored uploads, for URL-style references
/// - everything else: the static UI, when `static_dir` is configured
pub fn create_router(state: AppState) -> Router {
    let config = state.config.clone();

    let upload_limit = match config.upload_body_limit() {
        Some(limit) => DefaultBodyLimit::max(limit),
        None => DefaultBodyLimit::disable(),
    };

    // Generation bodies are forwarded as-is, whatever their size.
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/model_info", get(model_info))
        .route("/generate", post(generate).layer(DefaultBodyLimit::disable()))
        .route("/upload", post(upload_file).layer(upload_limit))
        .with_state(state);

    if *config.reference_style() == ReferenceStyle::Url {
        router = router.nest_service(
            config.public_upload_prefix(),
            ServeDir::new(config.upload_dir()),
        );
    }

    if let Some(dir) = config.static_dir() {
        let index = dir.join("index.html");
        router = router.fallback_service(ServeDir::new(dir).fallback(ServeFile::new(index)));
    }

    router.layer(TraceLayer::new_for_http())
}

/// Bind the configured address and serve until Ctrl+C.
#[instrument(skip(config), fields(listen_addr = %config.listen_addr(), backend = %config.backend_url()))]
pub async fn serve(config: RelayConfig) -> RelayResult<()> {
    let addr = config
        .socket_addr()
        .map_err(|e| RelayError::new(RelayErrorKind::Config(e.message)))?;
    let state = AppState::from_config(config)?;
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        RelayError::new(RelayErrorKind::Io(format!("Failed to bind {}: {}", addr, e)))
    })?;
    info!(%addr, "Relay listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RelayError::new(RelayErrorKind::Io(format!("Server error: {}", e))))?;

    info!("Relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down relay...");
}
