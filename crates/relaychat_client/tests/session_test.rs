//! Send pipeline tests against a mocked relay.

use relaychat_client::{
    ChatSession, ClientConfig, RelayClient, ResolvedFile, SendOutcome, TranscriptEvent,
};
use relaychat_core::{GenerationOptions, MessageId, MessageStatus, Part, Role, StreamRecord};
use relaychat_error::ClientErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn session_for(relay_url: &str) -> ChatSession {
    let config = ClientConfig::builder()
        .relay_url(relay_url)
        .build()
        .expect("config");
    let client = RelayClient::new(&config).expect("client");
    ChatSession::new(client, GenerationOptions::default())
}

fn frames(records: &[StreamRecord]) -> String {
    records
        .iter()
        .map(|record| format!("{}\n", record.to_frame()))
        .collect()
}

#[tokio::test]
async fn test_buffered_reply_appends_one_message() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(serde_json::json!({"prompt": "hi"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "Hello there"
        })))
        .expect(1)
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let outcome = session.send("hi", Vec::new()).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Buffered { .. }));

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(*messages[0].role(), Role::User);
    assert_eq!(messages[0].text(), "hi");
    assert_eq!(*messages[1].role(), Role::Assistant);
    assert_eq!(messages[1].text(), "Hello there");
    assert!(!session.is_busy().await);
}

#[tokio::test]
async fn test_stream_completes_exactly_once() {
    let relay = MockServer::start().await;
    let body = frames(&[
        StreamRecord::Token("A".to_string()),
        StreamRecord::Token("B".to_string()),
        StreamRecord::Done,
    ]);
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let mut events = session.subscribe();
    let outcome = session.send("go", Vec::new()).await.expect("send");

    let SendOutcome::Streamed {
        message,
        tokens,
        malformed,
    } = outcome
    else {
        panic!("expected a streamed outcome, got {:?}", outcome);
    };
    assert_eq!(tokens, 2);
    assert_eq!(malformed, 0);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(*messages[1].id(), message);
    assert_eq!(messages[1].text(), "AB");
    assert_eq!(*messages[1].status(), MessageStatus::Complete);

    let mut finished = 0;
    let mut tokens_seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            TranscriptEvent::TokenAppended { token, .. } => tokens_seen.push(token),
            TranscriptEvent::MessageFinished { status, .. } => {
                assert_eq!(status, MessageStatus::Complete);
                finished += 1;
            }
            TranscriptEvent::MessageAdded(_) => {}
        }
    }
    assert_eq!(tokens_seen, vec!["A", "B"]);
    assert_eq!(finished, 1);
}

#[tokio::test]
async fn test_malformed_record_is_skipped() {
    let relay = MockServer::start().await;
    let body = "data: garbage\n\ndata: {\"token\":\"X\"}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let outcome = session.send("go", Vec::new()).await.expect("send");
    assert!(matches!(
        outcome,
        SendOutcome::Streamed {
            tokens: 1,
            malformed: 1,
            ..
        }
    ));

    let messages = session.messages().await;
    assert_eq!(messages[1].text(), "X");
    assert_eq!(*messages[1].status(), MessageStatus::Complete);
}

#[tokio::test]
async fn test_stream_without_end_marker_still_completes() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("data: {\"content\":\"partial\"}", "text/event-stream"),
        )
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let outcome = session.send("go", Vec::new()).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Streamed { tokens: 1, .. }));
    assert_eq!(session.messages().await[1].text(), "partial");
}

#[tokio::test]
async fn test_relay_error_keeps_user_message_and_appends_error() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
            "error": "Backend unavailable: connection refused",
            "kind": "backend_unavailable"
        })))
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let outcome = session.send("hello?", Vec::new()).await.expect("send");
    let SendOutcome::Failed { error, .. } = outcome else {
        panic!("expected failure, got {:?}", outcome);
    };
    assert!(matches!(error.kind, ClientErrorKind::BackendUnavailable(_)));

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].text(), "hello?");
    assert_eq!(*messages[1].role(), Role::Error);
    assert!(messages[1].text().starts_with("Failed to send message:"));
    assert!(!session.is_busy().await);
}

#[tokio::test]
async fn test_unreachable_relay_appends_error() {
    let session = session_for("http://127.0.0.1:1");
    let outcome = session.send("anyone?", Vec::new()).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Failed { .. }));

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(*messages[1].role(), Role::Error);
}

#[tokio::test]
async fn test_empty_send_is_rejected() {
    let session = session_for("http://127.0.0.1:1");
    let err = session.send("   ", Vec::new()).await.unwrap_err();
    assert_eq!(err.kind, ClientErrorKind::EmptyMessage);
    assert!(session.messages().await.is_empty());
}

#[tokio::test]
async fn test_attachments_are_cited_in_request_and_message() {
    let relay = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(body_partial_json(serde_json::json!({
            "prompt": "",
            "image_paths": ["/uploads/1-scan.png"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "response": "A chest X-ray"
        })))
        .expect(1)
        .mount(&relay)
        .await;

    let session = session_for(&relay.uri());
    let attachment = ResolvedFile {
        name: "scan.png".to_string(),
        reference: "/uploads/1-scan.png".to_string(),
        preview: "data:image/png;base64,AA==".to_string(),
    };
    let outcome = session.send("", vec![attachment]).await.expect("send");
    assert!(matches!(outcome, SendOutcome::Buffered { .. }));

    let messages = session.messages().await;
    assert_eq!(
        messages[0].content(),
        &vec![Part::image("/uploads/1-scan.png")]
    );
}

/// Answers every request with a chunked event stream that sends a single
/// token and then stays open. Each closed client connection is reported on
/// the returned channel.
async fn held_open_stream() -> (String, mpsc::UnboundedReceiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (closed_tx, closed_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let closed_tx = closed_tx.clone();
            tokio::spawn(async move {
                if serve_held_open(socket).await {
                    let _ = closed_tx.send(());
                }
            });
        }
    });

    (format!("http://{}", addr), closed_rx)
}

/// Returns `true` once the client hangs up after the token was sent.
async fn serve_held_open(mut socket: TcpStream) -> bool {
    let mut request = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = socket.read(&mut buf).await.expect("read request");
        request.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&request);
        if let Some(header_end) = text.find("\r\n\r\n") {
            let length = text[..header_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if request.len() >= header_end + 4 + length {
                break;
            }
        }
        if n == 0 {
            return false;
        }
    }

    let frame = StreamRecord::Token("A".to_string()).to_frame() + "\n";
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\n\r\n{:x}\r\n{}\r\n",
        frame.len(),
        frame
    );
    socket
        .write_all(response.as_bytes())
        .await
        .expect("write response");

    loop {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return true,
            Ok(_) => {}
        }
    }
}

/// Waits for the next streamed token and returns the message it went to.
/// A token landing in `stale` fails the test.
async fn next_token(
    events: &mut broadcast::Receiver<TranscriptEvent>,
    stale: Option<&MessageId>,
) -> MessageId {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Ok(TranscriptEvent::TokenAppended { id, token }) = events.recv().await {
                assert_ne!(Some(&id), stale, "token reached a stale placeholder");
                assert_eq!(token, "A");
                return id;
            }
        }
    })
    .await
    .expect("token")
}

#[tokio::test]
async fn test_cancel_stops_tokens_and_closes_connection() {
    let (relay_url, mut closed) = held_open_stream().await;
    let session = Arc::new(session_for(&relay_url));
    let mut events = session.subscribe();

    let sending = {
        let session = session.clone();
        tokio::spawn(async move { session.send("stream please", Vec::new()).await })
    };

    let placeholder = next_token(&mut events, None).await;

    assert!(session.is_busy().await);
    assert!(session.cancel().await);

    let outcome = tokio::time::timeout(Duration::from_secs(5), sending)
        .await
        .expect("send finishes")
        .expect("join")
        .expect("send");
    let SendOutcome::Cancelled {
        placeholder: Some(cancelled),
    } = outcome
    else {
        panic!("expected cancellation, got {:?}", outcome);
    };
    assert_eq!(cancelled, placeholder);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].text(), "A");
    assert_eq!(*messages[1].status(), MessageStatus::Cancelled);
    assert!(!session.is_busy().await);
    assert!(!session.cancel().await);

    tokio::time::timeout(Duration::from_secs(5), closed.recv())
        .await
        .expect("connection closed")
        .expect("server reported");
}

#[tokio::test]
async fn test_new_send_cancels_stream_in_flight() {
    let (relay_url, mut closed) = held_open_stream().await;
    let session = Arc::new(session_for(&relay_url));
    let mut events = session.subscribe();

    let first = {
        let session = session.clone();
        tokio::spawn(async move { session.send("first", Vec::new()).await })
    };
    let first_placeholder = next_token(&mut events, None).await;

    let second = {
        let session = session.clone();
        tokio::spawn(async move { session.send("second", Vec::new()).await })
    };

    let outcome = tokio::time::timeout(Duration::from_secs(5), first)
        .await
        .expect("first send finishes")
        .expect("join")
        .expect("send");
    let SendOutcome::Cancelled {
        placeholder: Some(cancelled),
    } = outcome
    else {
        panic!("expected the first send to be cancelled, got {:?}", outcome);
    };
    assert_eq!(cancelled, first_placeholder);
    tokio::time::timeout(Duration::from_secs(5), closed.recv())
        .await
        .expect("first connection closed")
        .expect("server reported");

    let second_placeholder = next_token(&mut events, Some(&first_placeholder)).await;
    assert_ne!(second_placeholder, first_placeholder);

    let messages = session.messages().await;
    let superseded = messages
        .iter()
        .find(|m| m.id() == &first_placeholder)
        .expect("first placeholder kept");
    assert_eq!(superseded.text(), "A");
    assert_eq!(*superseded.status(), MessageStatus::Cancelled);
    let texts: Vec<_> = messages.iter().map(|m| m.text()).collect();
    assert_eq!(texts, vec!["first", "A", "second", "A"]);

    assert!(session.cancel().await);
    let outcome = tokio::time::timeout(Duration::from_secs(5), second)
        .await
        .expect("second send finishes")
        .expect("join")
        .expect("send");
    assert!(matches!(outcome, SendOutcome::Cancelled { placeholder: Some(_) }));

    while let Ok(event) = events.try_recv() {
        if let TranscriptEvent::TokenAppended { id, .. } = event {
            assert_ne!(id, first_placeholder, "token reached a stale placeholder");
        }
    }
}

#[tokio::test]
async fn test_removing_placeholder_abandons_stream() {
    let (relay_url, mut closed) = held_open_stream().await;
    let session = Arc::new(session_for(&relay_url));
    let mut events = session.subscribe();

    let sending = {
        let session = session.clone();
        tokio::spawn(async move { session.send("stream please", Vec::new()).await })
    };
    let placeholder = next_token(&mut events, None).await;

    assert!(session.remove_message(&placeholder).await);
    assert!(!session.remove_message(&placeholder).await);

    let outcome = tokio::time::timeout(Duration::from_secs(5), sending)
        .await
        .expect("send finishes")
        .expect("join")
        .expect("send");
    let SendOutcome::Cancelled {
        placeholder: Some(abandoned),
    } = outcome
    else {
        panic!("expected abandonment, got {:?}", outcome);
    };
    assert_eq!(abandoned, placeholder);

    let messages = session.messages().await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].text(), "stream please");
    assert!(messages.iter().all(|m| m.id() != &placeholder));
    assert!(!session.is_busy().await);

    tokio::time::timeout(Duration::from_secs(5), closed.recv())
        .await
        .expect("connection closed")
        .expect("server reported");
    assert!(session.messages().await.iter().all(|m| m.id() != &placeholder));
}
