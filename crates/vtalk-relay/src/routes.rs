//! HTTP routes and server entry point
//!
//! - `POST /api/tts`     text to WAV via the speech engine
//! - `POST /api/chat`    chat reply with emotion and expression
//! - `POST /api/lipsync` speech plus a per-frame mouth track
//! - `GET  /health`      liveness

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use vtalk_core::{ExpressionMap, VtalkError, VtalkResult};
use vtalk_lipsync::{
    decode_wav, render_track, EnvelopeConfig, FrameLoopConfig, TapConfig, DEFAULT_MOUTH_PARAM,
};

use crate::chat::{shape_completion, ChatClient, ChatCompletion, ChatRequest};
use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult};
use crate::tts::{TtsClient, TtsRequest};

/// Highest frame rate accepted for mouth tracks
pub const MAX_TRACK_FPS: f32 = 240.0;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<Shared>,
}

struct Shared {
    tts: TtsClient,
    chat: ChatClient,
    expressions: ExpressionMap,
}

impl AppState {
    /// Build upstream clients from `config`
    pub fn new(config: &RelayConfig) -> VtalkResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| VtalkError::Config(format!("http client: {e}")))?;

        Ok(AppState {
            inner: Arc::new(Shared {
                tts: TtsClient::new(http.clone(), config),
                chat: ChatClient::new(http, config),
                expressions: config.expressions.clone(),
            }),
        })
    }

    pub fn tts(&self) -> &TtsClient {
        &self.inner.tts
    }

    pub fn chat(&self) -> &ChatClient {
        &self.inner.chat
    }
}

/// Body of `POST /api/lipsync`
#[derive(Clone, Debug, Deserialize)]
pub struct LipSyncRequest {
    pub text: String,
    #[serde(default)]
    pub speaker: Option<u32>,
    /// Track frame rate, 60 when absent
    #[serde(default)]
    pub fps: Option<f32>,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub tap: TapConfig,
}

/// Response of `POST /api/lipsync`
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LipSyncResponse {
    pub fps: f32,
    /// Model parameter the levels are meant for
    pub parameter_hint: String,
    pub duration_ms: u64,
    /// One mouth level in [0, 1] per frame
    pub levels: Vec<f32>,
}

/// Build the relay router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tts", post(tts))
        .route("/api/chat", post(chat))
        .route("/api/lipsync", post(lipsync))
        .with_state(state)
}

/// Serve the relay until `shutdown` resolves
pub async fn serve<F>(config: RelayConfig, shutdown: F) -> VtalkResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;
    let state = AppState::new(&config)?;
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|e| VtalkError::Server(format!("bind {}: {e}", config.bind_addr)))?;
    let addr = listener
        .local_addr()
        .map_err(|e| VtalkError::Server(e.to_string()))?;

    tracing::info!(
        %addr,
        tts = config.tts_base(),
        chat = config.chat_base(),
        model = %config.chat_model,
        "relay listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| VtalkError::Server(e.to_string()))?;

    tracing::info!("relay stopped");
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn tts(
    State(state): State<AppState>,
    Json(request): Json<TtsRequest>,
) -> RelayResult<impl IntoResponse> {
    let wav = state.tts().synthesize(&request.text, request.speaker).await?;
    Ok(([(header::CONTENT_TYPE, "audio/wav")], wav))
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> RelayResult<Json<ChatCompletion>> {
    let reply = state.chat().reply(&request).await?;
    let completion = shape_completion(state.chat().model(), &reply, &state.inner.expressions);
    tracing::info!(
        emotion = completion.emotion.map(|e| e.as_str()).unwrap_or("none"),
        chars = completion.text.chars().count(),
        "chat relayed"
    );
    Ok(Json(completion))
}

async fn lipsync(
    State(state): State<AppState>,
    Json(request): Json<LipSyncRequest>,
) -> RelayResult<Json<LipSyncResponse>> {
    let frames = FrameLoopConfig {
        fps: request.fps.unwrap_or(FrameLoopConfig::default().fps),
    };
    frames.period()?;
    if frames.fps > MAX_TRACK_FPS {
        return Err(RelayError::BadRequest(format!(
            "fps {} exceeds {MAX_TRACK_FPS}",
            frames.fps
        )));
    }
    if request.tap.block_size == 0 {
        return Err(RelayError::BadRequest("tap block_size must be positive".into()));
    }

    let wav = state.tts().synthesize(&request.text, request.speaker).await?;

    let tap = request.tap;
    let envelope = request.envelope;
    let (track, duration) = tokio::task::spawn_blocking(move || {
        let audio = decode_wav(&wav)?;
        let track = render_track(&audio, frames, tap, &envelope)?;
        Ok::<_, VtalkError>((track, audio.duration()))
    })
    .await
    .map_err(|e| VtalkError::Server(format!("track render task: {e}")))??;

    tracing::debug!(
        frames = track.levels.len(),
        open = track.open_frames(),
        "mouth track built"
    );
    Ok(Json(LipSyncResponse {
        fps: track.fps,
        parameter_hint: DEFAULT_MOUTH_PARAM.to_string(),
        duration_ms: duration.as_millis() as u64,
        levels: track.levels,
    }))
}
