//! TTS relay - VOICEVOX-compatible engine client
//!
//! Synthesis is two requests:
//! 1. `POST /audio_query?text=..&speaker=..` builds a query object
//! 2. `POST /synthesis?speaker=..` with that query returns WAV bytes

use bytes::Bytes;
use serde::Deserialize;
use vtalk_core::parse_emotion_tag;

use crate::config::RelayConfig;
use crate::error::{RelayError, RelayResult, TTS_SERVICE};

/// Body of `POST /api/tts`
#[derive(Clone, Debug, Deserialize)]
pub struct TtsRequest {
    pub text: String,
    /// Engine speaker id, the configured default when absent
    #[serde(default)]
    pub speaker: Option<u32>,
}

/// Client for the speech engine
#[derive(Clone, Debug)]
pub struct TtsClient {
    http: reqwest::Client,
    base_url: String,
    default_speaker: u32,
    max_text_chars: usize,
}

impl TtsClient {
    pub fn new(http: reqwest::Client, config: &RelayConfig) -> Self {
        TtsClient {
            http,
            base_url: config.tts_base().to_string(),
            default_speaker: config.default_speaker,
            max_text_chars: config.max_text_chars,
        }
    }

    /// Text that will actually be spoken: tag stripped, whitespace trimmed.
    ///
    /// Rejects empty and overlong input before anything goes upstream.
    pub fn speakable<'a>(&self, text: &'a str) -> RelayResult<&'a str> {
        let spoken = parse_emotion_tag(text).text.trim();
        if spoken.is_empty() {
            return Err(RelayError::BadRequest("text is empty".into()));
        }
        let chars = spoken.chars().count();
        if chars > self.max_text_chars {
            return Err(RelayError::BadRequest(format!(
                "text is {chars} chars, limit is {}",
                self.max_text_chars
            )));
        }
        Ok(spoken)
    }

    /// Synthesize `text` and return the WAV bytes
    pub async fn synthesize(&self, text: &str, speaker: Option<u32>) -> RelayResult<Bytes> {
        let text = self.speakable(text)?;
        let speaker = speaker.unwrap_or(self.default_speaker).to_string();

        let query: serde_json::Value = self
            .http
            .post(format!("{}/audio_query", self.base_url))
            .query(&[("text", text), ("speaker", speaker.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RelayError::upstream(TTS_SERVICE, e))?
            .json()
            .await
            .map_err(|e| RelayError::BadUpstreamResponse {
                service: TTS_SERVICE,
                message: format!("audio query: {e}"),
            })?;

        let wav = self
            .http
            .post(format!("{}/synthesis", self.base_url))
            .query(&[("speaker", speaker.as_str())])
            .json(&query)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| RelayError::upstream(TTS_SERVICE, e))?
            .bytes()
            .await
            .map_err(|e| RelayError::upstream(TTS_SERVICE, e))?;

        if wav.is_empty() {
            return Err(RelayError::BadUpstreamResponse {
                service: TTS_SERVICE,
                message: "empty synthesis body".into(),
            });
        }

        tracing::debug!(
            speaker = %speaker,
            chars = text.chars().count(),
            bytes = wav.len(),
            "speech synthesized"
        );
        Ok(wav)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(max_text_chars: usize) -> TtsClient {
        let config = RelayConfig {
            max_text_chars,
            ..RelayConfig::default()
        };
        TtsClient::new(reqwest::Client::new(), &config)
    }

    #[test]
    fn test_speakable_strips_tag() {
        let tts = client(100);
        assert_eq!(tts.speakable("[happy] Hello there ").unwrap(), "Hello there");
        assert_eq!(tts.speakable("plain").unwrap(), "plain");
    }

    #[test]
    fn test_speakable_rejects_empty() {
        let tts = client(100);
        for text in ["", "   ", "[sad]", "【嬉しい】  "] {
            assert!(matches!(tts.speakable(text), Err(RelayError::BadRequest(_))), "{text:?}");
        }
    }

    #[test]
    fn test_speakable_counts_chars_not_bytes() {
        let tts = client(3);
        assert!(tts.speakable("こんに").is_ok());
        assert!(matches!(tts.speakable("こんにちは"), Err(RelayError::BadRequest(_))));
    }
}
