//! External tests for the HTTP completion client: wire format, SSE decoding,
//! status mapping and history replay, against a local canned HTTP responder.

use devmind::conversation::Conversation;
use devmind::extract::Extractor;
use devmind::preview::Compositor;
use devmind::project::{ProjectLibrary, DEFAULT_STORAGE_KEY};
use devmind::providers::*;
use devmind::store::MemoryStore;
use devmind::{DevmindError, SessionState, Workspace, ERROR_REPLY};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

// -- canned responder -------------------------------------------------------

struct Canned {
    status: u16,
    body: String,
}

fn ok(body: &str) -> Canned {
    Canned {
        status: 200,
        body: body.to_string(),
    }
}

fn status(status: u16, body: &str) -> Canned {
    Canned {
        status,
        body: body.to_string(),
    }
}

/// Serve `responses` in order, one connection each. Yields every raw request.
async fn serve(responses: Vec<Canned>) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        for canned in responses {
            let (mut sock, _) = listener.accept().await.unwrap();
            let request = read_request(&mut sock).await;
            let _ = tx.send(request);
            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: text/event-stream\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                canned.status,
                canned.body.len(),
                canned.body
            );
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        }
    });
    (format!("http://{}", addr), rx)
}

async fn read_request(sock: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = sock.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let len = head
                .lines()
                .filter_map(|l| l.split_once(':'))
                .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}

fn openai_sse(parts: &[&str]) -> String {
    let mut body = String::new();
    for part in parts {
        let chunk = serde_json::json!({ "choices": [{ "delta": { "content": part } }] });
        body.push_str(&format!("data: {}\n\n", chunk));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

fn anthropic_sse(parts: &[&str]) -> String {
    let mut body = String::from("event: message_start\ndata: {\"type\":\"message_start\"}\n\n");
    for part in parts {
        let event = serde_json::json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": part }
        });
        body.push_str(&format!("event: content_block_delta\ndata: {}\n\n", event));
    }
    body.push_str("event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n");
    body
}

fn client(provider: Provider, base_url: &str) -> HttpCompletionClient {
    HttpCompletionClient::with_api_key(provider, "test-model".into(), "sk-test".into())
        .with_base_url(base_url)
}

async fn drain(stream: FragmentStream) -> Vec<String> {
    stream.map(|r| r.unwrap()).collect().await
}

// -- provider basics --------------------------------------------------------

#[test]
fn test_provider_display_lowercase() {
    for p in [Provider::Openai, Provider::Anthropic] {
        assert!(p.to_string().chars().all(|c| c.is_lowercase()));
    }
}

#[test]
fn test_provider_default_models() {
    assert_eq!(Provider::Openai.default_model(), "gpt-4o");
    assert!(Provider::Anthropic.default_model().starts_with("claude"));
}

#[test]
fn test_anthropic_request_carries_system_field() {
    let req = AnthropicRequest {
        model: "claude".into(),
        messages: vec![ChatTurn::new("user", "hi")],
        max_tokens: 100,
        stream: true,
        temperature: 0.4,
        system: "be terse".into(),
    };
    let json = serde_json::to_value(&req).unwrap();
    assert_eq!(json["system"], "be terse");
    assert_eq!(json["messages"][0]["role"], "user");
}

// -- OpenAI over HTTP -------------------------------------------------------

#[tokio::test]
async fn test_openai_stream_yields_fragments() {
    let (url, mut requests) = serve(vec![ok(&openai_sse(&["Hel", "lo"]))]).await;
    let client = client(Provider::Openai, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();

    let out = drain(client.send_turn(&mut session, "hi").await.unwrap()).await;
    assert_eq!(out, vec!["Hel", "lo"]);

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("POST /chat/completions"));
    assert!(request.contains("Bearer sk-test"));
    assert!(request.contains("\"stream\":true"));
    assert!(request.contains("\"content\":\"SYS\""));
}

#[tokio::test]
async fn test_openai_second_turn_replays_history() {
    let (url, mut requests) = serve(vec![
        ok(&openai_sse(&["first answer"])),
        ok(&openai_sse(&["second"])),
    ])
    .await;
    let client = client(Provider::Openai, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();

    drain(client.send_turn(&mut session, "one").await.unwrap()).await;
    drain(client.send_turn(&mut session, "two").await.unwrap()).await;

    let _ = requests.recv().await.unwrap();
    let second = requests.recv().await.unwrap();
    assert!(second.contains("first answer"));
    assert!(second.contains("\"content\":\"one\""));
    assert_eq!(session.history().len(), 4);
}

const MODEL_MISSING: &str = "{\"error\":{\"message\":\"The model x does not exist\"}}";

#[tokio::test]
async fn test_http_404_is_api_error_with_body() {
    let (url, _requests) = serve(vec![status(404, MODEL_MISSING)]).await;
    let client = client(Provider::Openai, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();
    match client.send_turn(&mut session, "hi").await {
        Err(err @ DevmindError::Api { .. }) => {
            assert!(!err.is_session_missing());
            let DevmindError::Api { status, body, .. } = err else {
                unreachable!()
            };
            assert_eq!(status, 404);
            assert_eq!(body, MODEL_MISSING);
        }
        other => panic!("expected Api error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_truncated_stream_is_left_out_of_history() {
    let truncated = "data: {\"choices\":[{\"delta\":{\"content\":\"cut\"}}]}\n\n";
    let (url, mut requests) = serve(vec![ok(truncated), ok(&openai_sse(&["fine"]))]).await;
    let client = client(Provider::Openai, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();

    assert_eq!(drain(client.send_turn(&mut session, "one").await.unwrap()).await, vec!["cut"]);
    assert!(session.history().is_empty());

    drain(client.send_turn(&mut session, "two").await.unwrap()).await;
    let _ = requests.recv().await.unwrap();
    let second = requests.recv().await.unwrap();
    assert!(!second.contains("cut"));
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_http_500_is_api_error_with_body() {
    let (url, _requests) = serve(vec![status(500, "upstream exploded")]).await;
    let client = client(Provider::Openai, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();
    match client.send_turn(&mut session, "hi").await {
        Err(DevmindError::Api { status, body, .. }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected Api error, got {:?}", other.map(|_| ())),
    }
    assert!(session.history().is_empty());
}

// -- Anthropic over HTTP ----------------------------------------------------

#[tokio::test]
async fn test_anthropic_stream_yields_fragments() {
    let (url, mut requests) = serve(vec![ok(&anthropic_sse(&["a", "b", "c"]))]).await;
    let client = client(Provider::Anthropic, &url);
    let mut session = client.create_session("SYS", &SamplingConfig::default()).unwrap();

    let out = drain(client.send_turn(&mut session, "hi").await.unwrap()).await;
    assert_eq!(out, vec!["a", "b", "c"]);

    let request = requests.recv().await.unwrap();
    assert!(request.starts_with("POST /messages"));
    assert!(request.to_ascii_lowercase().contains("x-api-key: sk-test"));
    assert!(request.contains("\"system\":\"SYS\""));
}

// -- Through the workspace --------------------------------------------------

#[tokio::test]
async fn test_workspace_heals_after_404_and_extracts_files() {
    let reply = "FILE: index.html\n```html\n<h1>Hi</h1>\n```\n";
    let (url, _requests) = serve(vec![
        status(404, "Requested entity was not found."),
        ok(&openai_sse(&[&reply[..20], &reply[20..]])),
    ])
    .await;
    let store = MemoryStore::new();
    let mut ws = Workspace::open(
        ProjectLibrary::new(Box::new(store), DEFAULT_STORAGE_KEY),
        Conversation::new(client(Provider::Openai, &url)),
        Extractor::default(),
        Compositor::default(),
    );

    assert!(ws.send_turn("page", |_| {}).await.is_err());
    assert_eq!(ws.session_state(), SessionState::Idle);
    assert_eq!(ws.messages()[1].content, ERROR_REPLY);

    let report = ws.send_turn("page again", |_| {}).await.unwrap();
    assert_eq!(report.reply, reply);
    assert_eq!(ws.session_state(), SessionState::Active);
    assert_eq!(ws.files().find_by_path("index.html").unwrap().content, "<h1>Hi</h1>");
}

#[tokio::test]
async fn test_workspace_keeps_session_after_unknown_model_404() {
    let (url, mut requests) = serve(vec![
        ok(&openai_sse(&["remembered"])),
        status(404, MODEL_MISSING),
        ok(&openai_sse(&["still here"])),
    ])
    .await;
    let mut ws = Workspace::open(
        ProjectLibrary::new(Box::new(MemoryStore::new()), DEFAULT_STORAGE_KEY),
        Conversation::new(client(Provider::Openai, &url)),
        Extractor::default(),
        Compositor::default(),
    );

    ws.send_turn("first", |_| {}).await.unwrap();
    let err = ws.send_turn("second", |_| {}).await.err().unwrap();
    assert!(matches!(err, DevmindError::Api { status: 404, .. }));
    assert_eq!(ws.session_state(), SessionState::Active);
    assert_eq!(ws.messages()[3].content, ERROR_REPLY);

    ws.send_turn("third", |_| {}).await.unwrap();
    let _ = requests.recv().await.unwrap();
    let _ = requests.recv().await.unwrap();
    let third = requests.recv().await.unwrap();
    assert!(third.contains("remembered"));
}
