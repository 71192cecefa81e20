//! Engine configuration: defaults, JSON file, environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::translate::retry::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Translate attempts per fetch, including the first.
    pub max_attempts: u32,
    /// Backoff after failed attempt `n` is `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
    /// Value shown for a span whose translation is in flight.
    pub loading_sentinel: String,
    /// Store item holding the group translations.
    pub translations_key: String,
    /// Store item holding the text cache.
    pub cache_key_name: String,
    /// Save both maps after every settled resolution when a store is attached.
    pub autosave: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_ms: 500,
            loading_sentinel: "...".to_string(),
            translations_key: "selection-translations".to_string(),
            cache_key_name: "translation-cache".to_string(),
            autosave: true,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "config IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl EngineConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Defaults overridden by `SPAN_TRANSLATOR_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(v) = parse_var(&lookup, "SPAN_TRANSLATOR_MAX_ATTEMPTS") {
            self.max_attempts = v;
        }
        if let Some(v) = parse_var(&lookup, "SPAN_TRANSLATOR_BACKOFF_MS") {
            self.backoff_base_ms = v;
        }
        if let Some(v) = parse_var(&lookup, "SPAN_TRANSLATOR_AUTOSAVE") {
            self.autosave = v;
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

fn parse_var<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(var = name, value = %raw, "ignoring unparsable config override");
            None
        }
    }
}
