//! Mouth parameter resolution and value mapping
//!
//! Models name their mouth-open parameter differently. Resolution runs once
//! per session: exact preferred names first, then a keyword match, then a
//! hardcoded default. A fallback never fails the session.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::sanitize_level;

/// Default mouth parameter id
pub const DEFAULT_MOUTH_PARAM: &str = "ParamMouthOpenY";

/// Preferred mouth parameter ids, most specific first
pub const PREFERRED_MOUTH_PARAMS: [&str; 4] = [
    "ParamMouthOpenY",
    "PARAM_MOUTH_OPEN_Y",
    "ParamMouthOpen",
    "MouthOpen",
];

/// Outcome of parameter resolution
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamResolution {
    /// The model exposes this parameter
    Found(String),
    /// Nothing matched; the default name is used blind
    Fallback(String),
}

impl ParamResolution {
    pub fn name(&self) -> &str {
        match self {
            ParamResolution::Found(name) | ParamResolution::Fallback(name) => name,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ParamResolution::Fallback(_))
    }
}

impl fmt::Display for ParamResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamResolution::Found(name) => write!(f, "{name}"),
            ParamResolution::Fallback(name) => write!(f, "{name} (fallback)"),
        }
    }
}

/// Parameter name resolution strategy
#[derive(Clone, Debug)]
pub struct ParameterResolver {
    /// Exact ids, tried in order
    pub preferred: Vec<String>,
    /// Lowercase keywords that must all appear in an id
    pub keywords: Vec<String>,
    /// Used when nothing matches
    pub default_name: String,
}

impl Default for ParameterResolver {
    fn default() -> Self {
        ParameterResolver {
            preferred: PREFERRED_MOUTH_PARAMS.iter().map(|s| s.to_string()).collect(),
            keywords: vec!["mouth".into(), "open".into()],
            default_name: DEFAULT_MOUTH_PARAM.into(),
        }
    }
}

impl ParameterResolver {
    /// Resolve against the parameter ids a model exposes
    pub fn resolve<I, S>(&self, ids: I) -> ParamResolution
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<S> = ids.into_iter().collect();
        let ids: Vec<&str> = ids.iter().map(|id| id.as_ref()).collect();

        for preferred in &self.preferred {
            if ids.iter().any(|id| *id == preferred.as_str()) {
                tracing::debug!(parameter = %preferred, "mouth parameter found");
                return ParamResolution::Found(preferred.clone());
            }
        }

        if !self.keywords.is_empty() {
            let matched = ids.iter().find(|id| {
                let id = id.to_lowercase();
                self.keywords.iter().all(|k| id.contains(k.as_str()))
            });
            if let Some(id) = matched {
                tracing::debug!(parameter = %id, "mouth parameter matched by keyword");
                return ParamResolution::Found(id.to_string());
            }
        }

        tracing::warn!(
            parameter = %self.default_name,
            candidates = ids.len(),
            "no mouth parameter matched, using default"
        );
        ParamResolution::Fallback(self.default_name.clone())
    }
}

/// Linear mapping from a level in [0, 1] onto a parameter range
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
}

impl Default for ParamRange {
    fn default() -> Self {
        ParamRange { min: 0.0, max: 1.0 }
    }
}

impl ParamRange {
    pub fn new(min: f32, max: f32) -> Self {
        ParamRange { min, max }
    }

    /// Parameter value for a level
    #[inline]
    pub fn map(&self, level: f32) -> f32 {
        self.min + (self.max - self.min) * sanitize_level(level)
    }

    /// Value for a closed mouth
    #[inline]
    pub fn rest(&self) -> f32 {
        self.min
    }
}
