//! Generation and health relay tests against a mock backend.

use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header::CONTENT_TYPE};
use relaychat_core::TIMEOUT_HEADER;
use relaychat_server::{AppState, RelayConfig, create_router};
use serde_json::{Value, json};
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{body_string, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn router_for(backend_url: &str, upload_dir: &std::path::Path) -> axum::Router {
    let config = RelayConfig::builder()
        .backend_url(backend_url)
        .upload_dir(upload_dir)
        .connect_timeout_secs(2u64)
        .build()
        .expect("config");
    create_router(AppState::from_config(config).expect("state"))
}

fn generate_request(body: &str) -> Request<Body> {
    Request::post("/generate")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn test_buffered_response_is_returned_as_json() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "Hello"})))
        .expect(1)
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for(&backend.uri(), dir.path())
        .oneshot(generate_request(r#"{"prompt":"hi","image_paths":[]}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"response": "Hello"}));
}

#[tokio::test]
async fn test_body_is_forwarded_unmodified() {
    let raw = r#"{ "prompt" : "describe",   "images": ["/uploads/a.png"], "extra": 1 }"#;
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_string(raw))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"generated_text": "ok"})))
        .expect(1)
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for(&backend.uri(), dir.path())
        .oneshot(generate_request(raw))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_generate_body_is_not_bound_by_upload_cap() {
    let inline_image = "A".repeat(3 * 1024 * 1024);
    let raw = json!({"prompt": "a".repeat(300), "images": [inline_image]}).to_string();
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_string(raw.clone()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "seen"})))
        .expect(1)
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let config = RelayConfig::builder()
        .backend_url(backend.uri())
        .upload_dir(dir.path())
        .max_upload_bytes(256u64)
        .build()
        .expect("config");

    let response = create_router(AppState::from_config(config).expect("state"))
        .oneshot(generate_request(&raw))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({"response": "seen"}));
}

#[tokio::test]
async fn test_buffered_error_status_is_mirrored() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"detail": "prompt too long"})),
        )
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for(&backend.uri(), dir.path())
        .oneshot(generate_request(r#"{"prompt":"x"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(read_json(response).await["detail"], "prompt too long");
}

#[tokio::test]
async fn test_stream_is_piped_through_verbatim() {
    let frames = "data: {\"token\": \"A\"}\n\ndata: {\"token\": \"B\"}\n\ndata: [DONE]\n\n";
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(frames.as_bytes().to_vec(), "text/event-stream"),
        )
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for(&backend.uri(), dir.path())
        .oneshot(generate_request(r#"{"prompt":"stream please"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    assert_eq!(content_type.as_deref(), Some("text/event-stream"));
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(bytes, frames.as_bytes());
}

#[tokio::test]
async fn test_empty_stream_reports_backend_unavailable() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(Vec::new(), "text/event-stream"))
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for(&backend.uri(), dir.path())
        .oneshot(generate_request(r#"{"prompt":"x"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["kind"], "backend_unavailable");
}

#[tokio::test]
async fn test_unreachable_backend_is_an_explicit_error() {
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for("http://127.0.0.1:1", dir.path())
        .oneshot(generate_request(r#"{"prompt":"x"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["kind"], "backend_unavailable");
    assert!(
        body["error"].as_str().is_some_and(|msg| !msg.is_empty()),
        "error message should carry the cause: {}",
        body
    );
}

#[tokio::test]
async fn test_slow_buffered_backend_times_out() {
    let backend = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"response": "late"}))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");

    let request = Request::post("/generate")
        .header(CONTENT_TYPE, "application/json")
        .header(TIMEOUT_HEADER, "1")
        .body(Body::from(r#"{"prompt":"x"}"#))
        .expect("request");
    let response = router_for(&backend.uri(), dir.path())
        .oneshot(request)
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(read_json(response).await["kind"], "timeout");
}

#[tokio::test]
async fn test_non_object_body_is_rejected() {
    let backend = MockServer::start().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let router = router_for(&backend.uri(), dir.path());

    for body in ["not json", "[1, 2]", "\"prompt\""] {
        let response = router
            .clone()
            .oneshot(generate_request(body))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(read_json(response).await["kind"], "invalid_request");
    }

    let received = backend.received_requests().await.unwrap_or_default();
    assert!(received.is_empty(), "nothing should reach the backend");
}

#[tokio::test]
async fn test_health_is_passed_through() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "healthy", "model_loaded": true})),
        )
        .mount(&backend)
        .await;
    Mock::given(method("GET"))
        .and(path("/model_info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"model": "medgemma"})))
        .mount(&backend)
        .await;
    let dir = tempfile::tempdir().expect("tempdir");
    let router = router_for(&backend.uri(), dir.path());

    let response = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        read_json(response).await,
        json!({"status": "healthy", "model_loaded": true})
    );

    let response = router
        .oneshot(Request::get("/model_info").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(read_json(response).await["model"], "medgemma");
}

#[tokio::test]
async fn test_health_with_backend_down() {
    let dir = tempfile::tempdir().expect("tempdir");

    let response = router_for("http://127.0.0.1:1", dir.path())
        .oneshot(Request::get("/health").body(Body::empty()).expect("request"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_json(response).await["kind"], "backend_unavailable");
}
