//! Translation backend interface.
//! The engine only depends on `Translator`; `deepseek` is the HTTP adapter,
//! `retry` wraps any backend with bounded retries and `cache` deduplicates
//! in-flight calls and memoizes results.

pub mod cache;
pub mod deepseek;
pub mod normalize;
pub mod retry;

use futures_util::future::BoxFuture;
use serde::Serialize;

/// One translate call as sent to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslateRequest {
    pub text: String,
    pub target_lang: String,
    /// Surrounding sentence, if any.
    pub context: Option<String>,
    /// ISO 639-1 code; `None` lets the backend infer it.
    pub source_lang: Option<String>,
}

/// Translator trait (adapter for different backends).
/// Must fail on network errors, non-2xx responses and malformed payloads.
pub trait Translator: Send + Sync {
    fn translate(&self, request: TranslateRequest) -> BoxFuture<'_, Result<String, TranslateError>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    Api(String),
    RateLimited { retry_after_ms: u64 },
    Timeout,
    InvalidInput(String),
    MalformedResponse(String),
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::Api(msg) => write!(f, "API error: {msg}"),
            TranslateError::RateLimited { retry_after_ms } => {
                write!(f, "rate limited, retry after {retry_after_ms}ms")
            }
            TranslateError::Timeout => write!(f, "translation timeout"),
            TranslateError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            TranslateError::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
        }
    }
}

impl std::error::Error for TranslateError {}
