//! Relay endpoints against in-process mock upstreams

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use vtalk_relay::{router, AppState, LipSyncResponse, RelayConfig};

const SAMPLE_RATE: u32 = 24_000;

/// Requests seen by a mock upstream
#[derive(Clone, Default)]
struct Recorder {
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

impl Recorder {
    fn push(&self, path: &str, body: Value) {
        self.calls.lock().push((path.to_string(), body));
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().clone()
    }
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// 0.25 s of tone followed by 0.25 s of silence, 16-bit mono
fn speech_wav() -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        let half = SAMPLE_RATE / 4;
        for i in 0..half * 2 {
            let sample = if i < half {
                let t = i as f32 / SAMPLE_RATE as f32;
                0.5 * (t * 220.0 * std::f32::consts::TAU).sin()
            } else {
                0.0
            };
            writer
                .write_sample((sample * i16::MAX as f32) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

async fn audio_query(
    State(recorder): State<Recorder>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let params = json!(params);
    recorder.push("/audio_query", params.clone());
    Json(json!({ "accent_phrases": [], "speedScale": 1.0, "echo": params }))
}

async fn synthesis(
    State(recorder): State<Recorder>,
    Query(params): Query<HashMap<String, String>>,
    Json(query): Json<Value>,
) -> Vec<u8> {
    recorder.push("/synthesis", json!({ "params": params, "query": query }));
    speech_wav()
}

async fn mock_tts(recorder: Recorder) -> SocketAddr {
    spawn(
        Router::new()
            .route("/audio_query", post(audio_query))
            .route("/synthesis", post(synthesis))
            .with_state(recorder),
    )
    .await
}

async fn failing_tts() -> SocketAddr {
    spawn(Router::new().route(
        "/audio_query",
        post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "engine exploded") }),
    ))
    .await
}

async fn slow_tts() -> SocketAddr {
    spawn(Router::new().route(
        "/audio_query",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({}))
        }),
    ))
    .await
}

/// Reply shape is picked by model name
async fn completions(State(recorder): State<Recorder>, Json(body): Json<Value>) -> Json<Value> {
    recorder.push("/v1/chat/completions", body.clone());
    let reply = "[happy] Nice to meet you!";
    match body["model"].as_str() {
        Some("ollama") => Json(json!({
            "model": "ollama",
            "message": { "role": "assistant", "content": reply },
            "done": true,
        })),
        Some("broken") => Json(json!({ "choices": [] })),
        _ => Json(json!({
            "id": "upstream-id",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": reply },
                "finish_reason": "stop",
            }],
        })),
    }
}

async fn mock_chat(recorder: Recorder) -> SocketAddr {
    spawn(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(recorder),
    )
    .await
}

/// An address nothing is listening on
async fn dead_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

async fn relay(config: RelayConfig) -> String {
    let addr = spawn(router(AppState::new(&config).unwrap())).await;
    format!("http://{addr}")
}

fn config(tts: SocketAddr, chat: SocketAddr) -> RelayConfig {
    RelayConfig {
        tts_url: format!("http://{tts}"),
        chat_url: format!("http://{chat}/"),
        system_prompt: "tag your replies".into(),
        request_timeout: Duration::from_secs(5),
        ..RelayConfig::default()
    }
}

#[tokio::test]
async fn test_health() {
    let base = relay(RelayConfig::default()).await;
    let body: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_tts_two_step_synthesis() {
    let recorder = Recorder::default();
    let tts = mock_tts(recorder.clone()).await;
    let base = relay(config(tts, dead_addr().await)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/tts"))
        .json(&json!({ "text": "[happy] こんにちは" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "audio/wav");
    assert_eq!(response.bytes().await.unwrap().as_ref(), speech_wav().as_slice());

    let calls = recorder.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].0, "/audio_query");
    // The tag is not spoken.
    assert_eq!(calls[0].1["text"], "こんにちは");
    assert_eq!(calls[0].1["speaker"], "1");
    assert_eq!(calls[1].0, "/synthesis");
    assert_eq!(calls[1].1["params"]["speaker"], "1");
    // The query object is passed through untouched.
    assert_eq!(calls[1].1["query"]["echo"]["text"], "こんにちは");
}

#[tokio::test]
async fn test_tts_explicit_speaker() {
    let recorder = Recorder::default();
    let tts = mock_tts(recorder.clone()).await;
    let base = relay(config(tts, dead_addr().await)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/tts"))
        .json(&json!({ "text": "hello", "speaker": 8 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(recorder.calls()[0].1["speaker"], "8");
}

#[tokio::test]
async fn test_tts_empty_text_is_bad_request() {
    let recorder = Recorder::default();
    let tts = mock_tts(recorder.clone()).await;
    let base = relay(config(tts, dead_addr().await)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/tts"))
        .json(&json!({ "text": "  [sad] " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("empty"));
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_tts_upstream_failure_is_bad_gateway() {
    let client = reqwest::Client::new();

    for tts in [failing_tts().await, dead_addr().await] {
        let base = relay(config(tts, dead_addr().await)).await;
        let response = client
            .post(format!("{base}/api/tts"))
            .json(&json!({ "text": "hello" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("tts"));
    }
}

#[tokio::test]
async fn test_tts_timeout_is_gateway_timeout() {
    let base = relay(RelayConfig {
        request_timeout: Duration::from_millis(200),
        ..config(slow_tts().await, dead_addr().await)
    })
    .await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/tts"))
        .json(&json!({ "text": "hello" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_chat_openai_shape() {
    let recorder = Recorder::default();
    let chat = mock_chat(recorder.clone()).await;
    let mut cfg = config(dead_addr().await, chat);
    cfg.chat_model = "gpt-local".into();
    cfg.expressions = cfg.expressions.with(vtalk_core::Emotion::Happy, "exp_smile");
    let base = relay(cfg).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({
            "message": "hi!",
            "history": [
                { "role": "user", "content": "earlier" },
                { "role": "assistant", "content": "[neutral] reply" },
            ],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();

    assert!(body["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "gpt-local");
    assert_eq!(body["choices"][0]["message"]["content"], "[happy] Nice to meet you!");
    assert_eq!(body["emotion"], "happy");
    assert_eq!(body["expression"], "exp_smile");
    assert_eq!(body["text"], "Nice to meet you!");

    let calls = recorder.calls();
    assert_eq!(calls.len(), 1);
    let upstream = &calls[0].1;
    assert_eq!(upstream["model"], "gpt-local");
    let roles: Vec<&str> = upstream["messages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["role"].as_str().unwrap())
        .collect();
    assert_eq!(roles, ["system", "user", "assistant", "user"]);
    assert_eq!(upstream["messages"][0]["content"], "tag your replies");
    assert_eq!(upstream["messages"][3]["content"], "hi!");
}

#[tokio::test]
async fn test_chat_ollama_fallback() {
    let chat = mock_chat(Recorder::default()).await;
    let mut cfg = config(dead_addr().await, chat);
    cfg.chat_model = "ollama".into();
    let base = relay(cfg).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["emotion"], "happy");
    assert_eq!(body["text"], "Nice to meet you!");
}

#[tokio::test]
async fn test_chat_missing_content_is_bad_gateway() {
    let chat = mock_chat(Recorder::default()).await;
    let mut cfg = config(dead_addr().await, chat);
    cfg.chat_model = "broken".into();
    let base = relay(cfg).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_chat_empty_message_is_bad_request() {
    let recorder = Recorder::default();
    let chat = mock_chat(recorder.clone()).await;
    let base = relay(config(dead_addr().await, chat)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/chat"))
        .json(&json!({ "message": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(recorder.calls().is_empty());
}

#[tokio::test]
async fn test_lipsync_track() {
    let tts = mock_tts(Recorder::default()).await;
    let base = relay(config(tts, dead_addr().await)).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/lipsync"))
        .json(&json!({ "text": "hello", "fps": 30.0 }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let track: LipSyncResponse = response.json().await.unwrap();

    assert_eq!(track.fps, 30.0);
    assert_eq!(track.parameter_hint, "ParamMouthOpenY");
    assert_eq!(track.duration_ms, 500);
    assert_eq!(track.levels.len(), 15);
    assert!(track.levels.iter().all(|l| (0.0..=1.0).contains(l)));
    // Open during the tone, closing through the silence.
    assert!(track.levels[0] > 0.0);
    assert!(track.levels[5] > 0.5);
    assert!(track.levels[14] < track.levels[7]);
}

#[tokio::test]
async fn test_lipsync_envelope_override() {
    let tts = mock_tts(Recorder::default()).await;
    let base = relay(config(tts, dead_addr().await)).await;

    let track: LipSyncResponse = reqwest::Client::new()
        .post(format!("{base}/api/lipsync"))
        .json(&json!({ "text": "hello", "envelope": { "gain": 0.0 } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(track.fps, 60.0);
    assert_eq!(track.levels.len(), 30);
    assert!(track.levels.iter().all(|l| *l == 0.0));
}

#[tokio::test]
async fn test_lipsync_rejects_bad_fps_before_synthesis() {
    let recorder = Recorder::default();
    let tts = mock_tts(recorder.clone()).await;
    let base = relay(config(tts, dead_addr().await)).await;
    let client = reqwest::Client::new();

    for fps in [0.0, -5.0, 1000.0, 1e-30] {
        let response = client
            .post(format!("{base}/api/lipsync"))
            .json(&json!({ "text": "hello", "fps": fps }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST, "fps {fps}");
    }
    assert!(recorder.calls().is_empty());
}
