//! DeepSeek chat-completions translation backend.
//! Connection pooling via reqwest and a simple token-bucket rate limiter.
//! Single attempt per call: retries belong to `retry::fetch_translation`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::debug;

use super::{TranslateError, TranslateRequest, Translator};

const DEFAULT_BASE_URL: &str = "https://api.deepseek.com";
const DEFAULT_MODEL: &str = "deepseek-chat";

/// System prompt kept under 60 tokens.
const SYSTEM_PROMPT: &str = "You are a translator for language learners. \
Translate field t into language l. Field c is surrounding context, do not translate it. \
Output only the translation of t.";

pub struct DeepSeekTranslator {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    /// Simple token-bucket: tracks the next allowed request time.
    next_allowed: Arc<tokio::sync::Mutex<Instant>>,
    /// Minimum interval between requests (e.g. 100ms = 10 req/s).
    min_interval: Duration,
}

impl DeepSeekTranslator {
    /// Create a new client. Reads `DEEPSEEK_API_KEY`, and optionally
    /// `DEEPSEEK_BASE_URL` and `DEEPSEEK_MODEL`, from the environment.
    pub fn from_env() -> Result<Self, TranslateError> {
        let api_key = std::env::var("DEEPSEEK_API_KEY").map_err(|_| {
            TranslateError::InvalidInput("DEEPSEEK_API_KEY environment variable not set".into())
        })?;
        let base_url = std::env::var("DEEPSEEK_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
        let model = std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Self::new(api_key, base_url, model)
    }

    pub fn new(api_key: String, base_url: String, model: String) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| TranslateError::Api(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            next_allowed: Arc::new(tokio::sync::Mutex::new(Instant::now())),
            min_interval: Duration::from_millis(100),
        })
    }

    /// Wait until the rate limiter allows a request.
    async fn rate_limit_wait(&self) {
        let mut next = self.next_allowed.lock().await;
        let now = Instant::now();
        if *next > now {
            tokio::time::sleep(*next - now).await;
        }
        *next = Instant::now() + self.min_interval;
    }

    async fn complete(&self, request: TranslateRequest) -> Result<String, TranslateError> {
        if request.text.trim().is_empty() {
            return Err(TranslateError::InvalidInput("empty text".into()));
        }
        self.rate_limit_wait().await;

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_user_prompt(&request)}
            ],
            "max_tokens": estimate_max_tokens(&request.text),
            "stream": false,
            "temperature": 0.1
        });

        let start = Instant::now();
        let response = self
            .http
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Timeout
                } else {
                    TranslateError::Api(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(0);
            return Err(TranslateError::RateLimited { retry_after_ms });
        }
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(TranslateError::Api(format!(
                "unexpected status {}: {}",
                status,
                body_text.chars().take(200).collect::<String>()
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|e| TranslateError::MalformedResponse(e.to_string()))?;
        let translated = extract_translation(payload)?;

        debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            chars = translated.chars().count(),
            "deepseek translation received"
        );
        Ok(translated)
    }
}

impl Translator for DeepSeekTranslator {
    fn translate(&self, request: TranslateRequest) -> BoxFuture<'_, Result<String, TranslateError>> {
        Box::pin(self.complete(request))
    }
}

// --- Prompt construction ---

/// Compact user prompt: {"t":"text","l":"lang"} plus optional "c" (context) and "s" (source).
fn build_user_prompt(request: &TranslateRequest) -> String {
    let mut fields = vec![
        format!("\"t\":{}", json_string(&request.text)),
        format!("\"l\":{}", json_string(&request.target_lang)),
    ];
    if let Some(context) = request.context.as_deref().filter(|c| *c != request.text) {
        fields.push(format!("\"c\":{}", json_string(context)));
    }
    if let Some(source) = &request.source_lang {
        fields.push(format!("\"s\":{}", json_string(source)));
    }
    format!("{{{}}}", fields.join(","))
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// Estimate max_tokens: (input_tokens * 1.15 + 32), capped at 768.
fn estimate_max_tokens(text: &str) -> u32 {
    // Rough: ~4 chars/token for Latin, ~1.5 for CJK
    let estimated_input_tokens = text.len() as f64 / 3.0;
    let max = (estimated_input_tokens * 1.15 + 32.0) as u32;
    max.clamp(64, 768)
}

fn extract_translation(payload: ChatResponse) -> Result<String, TranslateError> {
    let content = payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| TranslateError::MalformedResponse("no choices in response".into()))?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(TranslateError::MalformedResponse("empty translation".into()));
    }
    Ok(trimmed.to_string())
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
