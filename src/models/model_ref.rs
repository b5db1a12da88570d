use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A provider-qualified model reference (e.g. `anthropic/claude-sonnet-4`)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ModelRef {
    /// Provider identifier (e.g. "anthropic", "openai")
    pub provider_id: String,

    /// Model identifier within the provider (e.g. "gpt-5")
    pub model_id: String,
}

impl ModelRef {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }
}

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

/// Error returned when a `provider/model` string cannot be parsed
#[derive(Debug, thiserror::Error)]
#[error("invalid model reference '{0}', expected provider/model")]
pub struct ParseModelError(pub String);

impl FromStr for ModelRef {
    type Err = ParseModelError;

    /// Parse `provider/model`. The model id may itself contain slashes
    /// (e.g. `openrouter/meta/llama-3`), so only the first one splits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((provider, model)) if !provider.is_empty() && !model.is_empty() => {
                Ok(Self::new(provider, model))
            }
            _ => Err(ParseModelError(s.to_string())),
        }
    }
}
