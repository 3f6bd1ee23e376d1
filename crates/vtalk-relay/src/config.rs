//! Relay configuration
//!
//! Defaults target a VOICEVOX-compatible engine and an OpenAI-compatible
//! chat backend on localhost. Environment variables override defaults;
//! command line flags override both.

use std::net::SocketAddr;
use std::time::Duration;

use vtalk_core::{Emotion, ExpressionMap, VtalkError, VtalkResult};

/// Prompt asking the model to lead with an emotion tag
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly virtual character. \
Begin every reply with exactly one emotion tag in square brackets, chosen from \
[neutral], [happy], [sad], [angry], [surprised], [shy], [relaxed]. \
Keep replies short and conversational.";

/// Relay server configuration
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Listen address
    pub bind_addr: SocketAddr,
    /// TTS engine base URL
    pub tts_url: String,
    /// Chat backend base URL
    pub chat_url: String,
    pub chat_model: String,
    /// Bearer token for the chat backend, if it wants one
    pub chat_api_key: Option<String>,
    /// Speaker used when a request names none
    pub default_speaker: u32,
    pub system_prompt: String,
    /// Per upstream request
    pub request_timeout: Duration,
    /// Longest text accepted for synthesis, in chars
    pub max_text_chars: usize,
    /// Prior turns forwarded to the chat backend
    pub max_history: usize,
    /// Emotion to model expression names
    pub expressions: ExpressionMap,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            tts_url: "http://127.0.0.1:50021".into(),
            chat_url: "http://127.0.0.1:11434".into(),
            chat_model: "llama3".into(),
            chat_api_key: None,
            default_speaker: 1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
            request_timeout: Duration::from_secs(60),
            max_text_chars: 1000,
            max_history: 20,
            expressions: ExpressionMap::default(),
        }
    }
}

impl RelayConfig {
    /// Defaults overridden by `VTALK_*` environment variables
    pub fn from_env() -> VtalkResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key
    pub fn from_lookup<F>(lookup: F) -> VtalkResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = RelayConfig::default();

        if let Some(v) = lookup("VTALK_BIND") {
            config.bind_addr = parse(&v, "VTALK_BIND")?;
        }
        if let Some(v) = lookup("VTALK_TTS_URL") {
            config.tts_url = v;
        }
        if let Some(v) = lookup("VTALK_CHAT_URL") {
            config.chat_url = v;
        }
        if let Some(v) = lookup("VTALK_CHAT_MODEL") {
            config.chat_model = v;
        }
        if let Some(v) = lookup("VTALK_CHAT_API_KEY") {
            config.chat_api_key = Some(v).filter(|k| !k.is_empty());
        }
        if let Some(v) = lookup("VTALK_SPEAKER") {
            config.default_speaker = parse(&v, "VTALK_SPEAKER")?;
        }
        if let Some(v) = lookup("VTALK_SYSTEM_PROMPT") {
            config.system_prompt = v;
        }
        if let Some(v) = lookup("VTALK_TIMEOUT") {
            config.request_timeout = humantime::parse_duration(&v)
                .map_err(|e| VtalkError::Config(format!("VTALK_TIMEOUT: {e}")))?;
        }
        if let Some(v) = lookup("VTALK_MAX_TEXT_CHARS") {
            config.max_text_chars = parse(&v, "VTALK_MAX_TEXT_CHARS")?;
        }
        if let Some(v) = lookup("VTALK_MAX_HISTORY") {
            config.max_history = parse(&v, "VTALK_MAX_HISTORY")?;
        }
        if let Some(v) = lookup("VTALK_EXPRESSIONS") {
            config.expressions = parse_expressions(&v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the relay cannot run with
    pub fn validate(&self) -> VtalkResult<()> {
        for (name, url) in [("tts_url", &self.tts_url), ("chat_url", &self.chat_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(VtalkError::Config(format!("{name} must be an http(s) URL: {url}")));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(VtalkError::Config("request timeout must be positive".into()));
        }
        if self.max_text_chars == 0 {
            return Err(VtalkError::Config("max_text_chars must be positive".into()));
        }
        Ok(())
    }

    /// Base URL without a trailing slash
    pub fn tts_base(&self) -> &str {
        self.tts_url.trim_end_matches('/')
    }

    /// Base URL without a trailing slash
    pub fn chat_base(&self) -> &str {
        self.chat_url.trim_end_matches('/')
    }
}

/// Parse `emotion=expression` pairs separated by commas
pub fn parse_expressions(value: &str) -> VtalkResult<ExpressionMap> {
    let mut map = ExpressionMap::default();
    for pair in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (tag, expression) = pair
            .split_once('=')
            .map(|(t, e)| (t.trim(), e.trim()))
            .filter(|(t, e)| !t.is_empty() && !e.is_empty())
            .ok_or_else(|| {
                VtalkError::Config(format!("VTALK_EXPRESSIONS: expected emotion=name, got {pair:?}"))
            })?;
        let emotion = Emotion::from_tag(tag);
        if emotion == Emotion::Neutral && !tag.eq_ignore_ascii_case("neutral") {
            return Err(VtalkError::Config(format!(
                "VTALK_EXPRESSIONS: unknown emotion {tag:?}"
            )));
        }
        map = map.with(emotion, expression);
    }
    Ok(map)
}

fn parse<T: std::str::FromStr>(value: &str, key: &str) -> VtalkResult<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| VtalkError::Config(format!("{key}: {e}")))
}
