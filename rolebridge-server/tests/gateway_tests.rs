//! OpenAI-compatible gateway against a fake upstream
//!
//! A local axum server plays the model endpoint so the real HTTP client,
//! SSE decoding, timeouts and cancellation are exercised end to end.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use rolebridge_common::config::{LimitsConfig, UpstreamSettings};
use rolebridge_common::{Stage, TranslationDirection};
use rolebridge_server::llm::{
    ChatMessage, CompletionRequest, GatewayError, LlmGateway, OpenAiCompatibleGateway,
};
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Clone, Copy)]
enum Behaviour {
    /// Well-formed stream with CRLF frame terminators
    Stream,
    /// One fragment, then silence
    Stall,
    /// HTTP 500
    ServerError,
    /// Error object inside a 200 stream
    InlineError,
    /// HTTP 503 whose body never finishes
    StalledErrorBody,
}

#[derive(Clone)]
struct Upstream {
    behaviour: Behaviour,
    seen: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn chat_completions(
    State(upstream): State<Upstream>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    upstream.seen.lock().unwrap().push((auth, body.clone()));

    let streaming = body["stream"].as_bool().unwrap_or(false);
    match upstream.behaviour {
        Behaviour::ServerError => {
            (StatusCode::INTERNAL_SERVER_ERROR, "model overloaded").into_response()
        }
        Behaviour::StalledErrorBody => {
            let stream = async_stream::stream! {
                yield Ok::<_, Infallible>("{\"error\":".to_string());
                tokio::time::sleep(Duration::from_secs(30)).await;
                yield Ok("{}}".to_string());
            };
            (StatusCode::SERVICE_UNAVAILABLE, Body::from_stream(stream)).into_response()
        }
        _ if !streaming => Json(json!({
            "choices": [{"message": {"role": "assistant", "content": "buffered reply"}}]
        }))
        .into_response(),
        Behaviour::Stream => {
            let text = concat!(
                ": keep-alive\r\n\r\n",
                "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\r\n\r\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\r\n\r\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"lo 世界\"}}]}\r\n\r\n",
                "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\r\n\r\n",
                "data: [DONE]\r\n\r\n",
            );
            ([("content-type", "text/event-stream")], text).into_response()
        }
        Behaviour::InlineError => {
            let text = "data: {\"error\":{\"message\":\"context length exceeded\"}}\n\n";
            ([("content-type", "text/event-stream")], text).into_response()
        }
        Behaviour::Stall => {
            let stream = async_stream::stream! {
                yield Ok::<_, Infallible>(
                    "data: {\"choices\":[{\"delta\":{\"content\":\"first\"}}]}\n\n".to_string(),
                );
                tokio::time::sleep(Duration::from_secs(30)).await;
                yield Ok("data: [DONE]\n\n".to_string());
            };
            (
                [("content-type", "text/event-stream")],
                Body::from_stream(stream),
            )
                .into_response()
        }
    }
}

async fn spawn_upstream(behaviour: Behaviour) -> (SocketAddr, Upstream) {
    let upstream = Upstream {
        behaviour,
        seen: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(upstream.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, upstream)
}

fn gateway(addr: SocketAddr) -> OpenAiCompatibleGateway {
    let settings = UpstreamSettings {
        api_key: "sk-fake".to_string(),
        base_url: format!("http://{}/v1", addr),
        model: "fake-model".to_string(),
    };
    OpenAiCompatibleGateway::new(settings, &LimitsConfig::default())
        .unwrap()
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(300))
}

fn request(structured: bool) -> CompletionRequest {
    CompletionRequest {
        request_id: Uuid::new_v4(),
        direction: TranslationDirection::ForwardToImplementer,
        stage: if structured { Stage::Analysis } else { Stage::Direct },
        messages: vec![ChatMessage::system("system"), ChatMessage::user("做个导出")],
        max_tokens: 256,
        structured_output: structured,
    }
}

async fn drain(mut rx: mpsc::Receiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(chunk) = rx.recv().await {
        out.push(chunk);
    }
    out
}

#[tokio::test]
async fn test_streaming_fragments_in_order() {
    let (addr, upstream) = spawn_upstream(Behaviour::Stream).await;
    let gateway = gateway(addr);

    let (tx, rx) = mpsc::channel(16);
    let text = gateway
        .complete_streaming(&request(true), tx, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(text, "Hello 世界");
    assert_eq!(drain(rx).await, vec!["Hel".to_string(), "lo 世界".to_string()]);

    let seen = upstream.seen.lock().unwrap();
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer sk-fake"));
    assert_eq!(body["model"], "fake-model");
    assert_eq!(body["stream"], true);
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["response_format"]["type"], "json_object");
}

#[tokio::test]
async fn test_buffered_completion() {
    let (addr, upstream) = spawn_upstream(Behaviour::Stream).await;
    let text = gateway(addr).complete(&request(false)).await.unwrap();
    assert_eq!(text, "buffered reply");

    let seen = upstream.seen.lock().unwrap();
    assert_eq!(seen[0].1["stream"], false);
    assert!(seen[0].1.get("response_format").is_none());
}

#[tokio::test]
async fn test_non_success_status_is_upstream_error() {
    let (addr, _) = spawn_upstream(Behaviour::ServerError).await;
    let (tx, _rx) = mpsc::channel(16);
    let err = gateway(addr)
        .complete_streaming(&request(false), tx, &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        GatewayError::Upstream { status, body } => {
            assert_eq!(status, 500);
            assert!(body.contains("overloaded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_stalled_error_body_does_not_hang() {
    let (addr, _) = spawn_upstream(Behaviour::StalledErrorBody).await;
    let gateway =
        gateway(addr).with_timeouts(Duration::from_millis(300), Duration::from_millis(300));

    let err = tokio::time::timeout(Duration::from_secs(3), gateway.complete(&request(false)))
        .await
        .expect("error body read was not bounded")
        .unwrap_err();
    match err {
        GatewayError::Upstream { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "<error body not received>");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_inline_error_object_is_upstream_error() {
    let (addr, _) = spawn_upstream(Behaviour::InlineError).await;
    let (tx, _rx) = mpsc::channel(16);
    let err = gateway(addr)
        .complete_streaming(&request(false), tx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Upstream { .. }));
}

#[tokio::test]
async fn test_idle_stream_times_out() {
    let (addr, _) = spawn_upstream(Behaviour::Stall).await;
    let (tx, rx) = mpsc::channel(16);
    let err = gateway(addr)
        .complete_streaming(&request(false), tx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
    assert_eq!(drain(rx).await, vec!["first".to_string()]);
}

#[tokio::test]
async fn test_cancel_stops_reading() {
    let (addr, _) = spawn_upstream(Behaviour::Stall).await;
    let gateway = Arc::new(
        gateway(addr).with_timeouts(Duration::from_secs(5), Duration::from_secs(10)),
    );
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(16);

    let call = {
        let gateway = gateway.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { gateway.complete_streaming(&request(false), tx, &cancel).await })
    };

    assert_eq!(rx.recv().await.as_deref(), Some("first"));
    cancel.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), call)
        .await
        .expect("call did not stop after cancel")
        .unwrap();
    assert!(matches!(result, Err(GatewayError::Cancelled)));
    assert_eq!(rx.recv().await, None);
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    // Bind then drop to get a port nobody listens on
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = gateway(addr).complete(&request(false)).await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
