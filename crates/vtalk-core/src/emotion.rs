//! Emotion Tags - leading `[emotion]` markers on chat replies
//!
//! The chat backend is prompted to open every reply with a bracketed
//! emotion tag. The tag selects a model expression; the remaining text is
//! what gets spoken.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Emotion carried by a reply tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    #[default]
    Neutral,
    Happy,
    Sad,
    Angry,
    Surprised,
    Shy,
    Relaxed,
}

impl Emotion {
    /// All emotions, in declaration order
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Surprised,
        Emotion::Shy,
        Emotion::Relaxed,
    ];

    /// Get emotion from a tag name. Unknown tags are neutral.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "happy" | "joy" | "smile" | "fun" => Emotion::Happy,
            "sad" | "sorrow" | "cry" => Emotion::Sad,
            "angry" | "anger" | "mad" => Emotion::Angry,
            "surprised" | "surprise" | "shock" => Emotion::Surprised,
            "shy" | "embarrassed" | "blush" => Emotion::Shy,
            "relaxed" | "calm" | "relief" => Emotion::Relaxed,
            _ => Emotion::Neutral,
        }
    }

    /// Canonical lowercase name
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Surprised => "surprised",
            Emotion::Shy => "shy",
            Emotion::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply text split into its emotion tag and the spoken remainder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaggedText<'a> {
    /// Parsed emotion, `None` when the text carried no tag
    pub emotion: Option<Emotion>,
    /// Raw tag contents, trimmed
    pub tag: Option<&'a str>,
    /// Text following the tag
    pub text: &'a str,
}

const TAG_BRACKETS: [(char, char); 2] = [('[', ']'), ('【', '】')];

/// Split a leading `[emotion]` tag off `input`.
///
/// Text without a tag comes back unchanged with `emotion: None`. An empty
/// tag (`[]`) or an unterminated bracket is not a tag.
pub fn parse_emotion_tag(input: &str) -> TaggedText<'_> {
    let untagged = TaggedText {
        emotion: None,
        tag: None,
        text: input,
    };

    let trimmed = input.trim_start();
    for (open, close) in TAG_BRACKETS {
        let Some(body) = trimmed.strip_prefix(open) else {
            continue;
        };
        let Some(end) = body.find(close) else {
            return untagged;
        };

        let tag = body[..end].trim();
        if tag.is_empty() {
            return untagged;
        }

        return TaggedText {
            emotion: Some(Emotion::from_tag(tag)),
            tag: Some(tag),
            text: body[end + close.len_utf8()..].trim_start(),
        };
    }

    untagged
}

/// Emotion to model expression name
#[derive(Debug, Clone)]
pub struct ExpressionMap {
    names: HashMap<Emotion, String>,
}

impl ExpressionMap {
    /// Map every emotion to its canonical name
    pub fn new() -> Self {
        let names = Emotion::ALL
            .iter()
            .map(|e| (*e, e.as_str().to_string()))
            .collect();
        Self { names }
    }

    /// Override the expression used for `emotion`
    pub fn with(mut self, emotion: Emotion, expression: impl Into<String>) -> Self {
        self.names.insert(emotion, expression.into());
        self
    }

    /// Expression name for an emotion
    pub fn expression_for(&self, emotion: Emotion) -> &str {
        self.names
            .get(&emotion)
            .map(String::as_str)
            .unwrap_or(emotion.as_str())
    }
}

impl Default for ExpressionMap {
    fn default() -> Self {
        Self::new()
    }
}
