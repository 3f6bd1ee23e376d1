//! Chat relay - OpenAI-compatible completion client
//!
//! The reply is returned in OpenAI completion shape with three extra
//! fields: the parsed `emotion`, the model `expression` it maps to, and
//! the spoken `text` with the tag removed.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vtalk_core::{parse_emotion_tag, Emotion, ExpressionMap};

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult, CHAT_SERVICE};

/// One conversation turn
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Body of `POST /api/chat`
#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    /// Earlier turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// Chat completion returned to the client
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub id: String,
    pub object: String,
    pub created: u64,
    pub model: String,
    pub choices: Vec<ChatChoice>,
    /// Emotion the reply was tagged with, `None` when untagged
    pub emotion: Option<Emotion>,
    /// Expression to show, `None` when untagged
    pub expression: Option<String>,
    /// Reply text without the tag
    pub text: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatChoice {
    pub index: u32,
    pub message: ChatMessage,
    pub finish_reason: String,
}

/// Client for the chat backend
#[derive(Clone, Debug)]
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    max_history: usize,
}

impl ChatClient {
    pub fn new(http: reqwest::Client, config: &RelayConfig) -> Self {
        ChatClient {
            http,
            base_url: config.chat_base().to_string(),
            model: config.chat_model.clone(),
            api_key: config.chat_api_key.clone(),
            system_prompt: config.system_prompt.clone(),
            max_history: config.max_history,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Messages sent upstream: system prompt, recent history, then the user turn.
    ///
    /// History turns with roles other than `user` and `assistant` are dropped.
    pub fn build_messages(&self, request: &ChatRequest) -> RelayResult<Vec<ChatMessage>> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(RelayError::BadRequest("message is empty".into()));
        }

        let history: Vec<&ChatMessage> = request
            .history
            .iter()
            .filter(|m| matches!(m.role.as_str(), "user" | "assistant"))
            .collect();
        let dropped = request.history.len() - history.len();
        if dropped > 0 {
            tracing::debug!(dropped, "ignoring history turns with unsupported roles");
        }
        let skip = history.len().saturating_sub(self.max_history);

        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        if !self.system_prompt.trim().is_empty() {
            messages.push(ChatMessage::new("system", self.system_prompt.as_str()));
        }
        messages.extend(history.into_iter().skip(skip).cloned());
        messages.push(ChatMessage::new("user", message));
        Ok(messages)
    }

    /// Ask the backend for a reply and return its raw text
    pub async fn reply(&self, request: &ChatRequest) -> RelayResult<String> {
        let messages = self.build_messages(request)?;
        let turns = messages.len();

        let mut upstream = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "stream": false,
            }));
        if let Some(key) = &self.api_key {
            upstream = upstream.bearer_auth(key);
        }

        let body: Value = upstream
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RelayError::upstream(CHAT_SERVICE, e))?
            .json()
            .await
            .map_err(|e| RelayError::BadUpstreamResponse {
                service: CHAT_SERVICE,
                message: e.to_string(),
            })?;

        let content = extract_reply(&body).ok_or_else(|| RelayError::BadUpstreamResponse {
            service: CHAT_SERVICE,
            message: "no reply content".into(),
        })?;

        tracing::debug!(model = %self.model, turns, chars = content.chars().count(), "chat reply received");
        Ok(content.to_string())
    }
}

/// Reply text from an upstream body.
///
/// OpenAI shape first (`choices[0].message.content`), then the Ollama
/// shape (`message.content`).
pub fn extract_reply(body: &Value) -> Option<&str> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .or_else(|| body.pointer("/message/content").and_then(Value::as_str))
}

/// Wrap a raw reply in completion shape with its emotion resolved
pub fn shape_completion(model: &str, reply: &str, expressions: &ExpressionMap) -> ChatCompletion {
    let tagged = parse_emotion_tag(reply);
    let text = tagged.text.trim().to_string();
    if let Some(tag) = tagged.tag {
        tracing::debug!(tag, emotion = ?tagged.emotion, "reply tagged");
    }

    ChatCompletion {
        id: completion_id(),
        object: "chat.completion".into(),
        created: SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        model: model.to_string(),
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage::new("assistant", reply),
            finish_reason: "stop".into(),
        }],
        emotion: tagged.emotion,
        expression: tagged
            .emotion
            .map(|e| expressions.expression_for(e).to_string()),
        text,
    }
}

fn completion_id() -> String {
    format!("chatcmpl-{:016x}", rand::random::<u64>())
}
