//! Fetch/retry controller: bounded attempts with linear backoff.
//! Failures never escape: the terminal outcome is `None`.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{TranslateRequest, Translator};
use crate::metrics::{metric_names, MetricsRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Wait after failed attempt `n` is `backoff_base * n`.
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

/// Translate `request`, retrying transient failures.
/// Blank text short-circuits to `None` without calling the backend.
pub async fn fetch_translation(
    translator: &dyn Translator,
    request: TranslateRequest,
    policy: RetryPolicy,
    metrics: &MetricsRegistry,
) -> Option<String> {
    if request.text.trim().is_empty() {
        debug!("blank text, skipping translate call");
        return None;
    }

    let request_id = uuid::Uuid::new_v4().to_string();
    let attempts = policy.max_attempts.max(1);
    let start = Instant::now();

    for attempt in 1..=attempts {
        match translator.translate(request.clone()).await {
            Ok(translated) => {
                metrics.record(
                    metric_names::TRANSLATE_DONE,
                    start.elapsed().as_micros() as f64,
                );
                debug!(request_id = %request_id, attempt, "translation fetched");
                return Some(translated);
            }
            Err(e) => {
                metrics.incr(metric_names::ATTEMPT_FAILED);
                warn!(
                    request_id = %request_id,
                    attempt,
                    max_attempts = attempts,
                    error = %e,
                    "translate attempt failed"
                );
                if attempt < attempts {
                    tokio::time::sleep(policy.backoff_base * attempt).await;
                }
            }
        }
    }

    metrics.incr(metric_names::TRANSLATE_EXHAUSTED);
    warn!(
        request_id = %request_id,
        text = %request.text,
        target_lang = %request.target_lang,
        "translation failed after all attempts"
    );
    None
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures_util::future::BoxFuture;

    use super::*;
    use crate::translate::TranslateError;

    /// Fails the first `fail_times` calls, then echoes the text.
    struct Flaky {
        fail_times: u32,
        calls: AtomicU32,
    }

    impl Translator for Flaky {
        fn translate(&self, request: TranslateRequest) -> BoxFuture<'_, Result<String, TranslateError>> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = n < self.fail_times;
            Box::pin(async move {
                if fail {
                    Err(TranslateError::Api("boom".into()))
                } else {
                    Ok(format!("T:{}", request.text))
                }
            })
        }
    }

    fn req(text: &str) -> TranslateRequest {
        TranslateRequest {
            text: text.to_string(),
            target_lang: "en".to_string(),
            context: None,
            source_lang: None,
        }
    }

    #[tokio::test]
    async fn blank_text_makes_no_call() {
        let t = Flaky { fail_times: 0, calls: AtomicU32::new(0) };
        let metrics = MetricsRegistry::new();
        let out = fetch_translation(&t, req("  \n "), RetryPolicy::default(), &metrics).await;
        assert_eq!(out, None);
        assert_eq!(t.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_failures() {
        let t = Flaky { fail_times: 2, calls: AtomicU32::new(0) };
        let metrics = MetricsRegistry::new();
        let started = tokio::time::Instant::now();
        let out = fetch_translation(&t, req("hola"), RetryPolicy::default(), &metrics).await;
        assert_eq!(out.as_deref(), Some("T:hola"));
        assert_eq!(t.calls.load(Ordering::SeqCst), 3);
        // 500ms after the first failure, 1000ms after the second.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(1500));
        assert!(waited < Duration::from_millis(1600));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_resolves_to_none() {
        let t = Flaky { fail_times: u32::MAX, calls: AtomicU32::new(0) };
        let metrics = MetricsRegistry::new();
        let out = fetch_translation(&t, req("hola"), RetryPolicy::default(), &metrics).await;
        assert_eq!(out, None);
        assert_eq!(t.calls.load(Ordering::SeqCst), 3);
        assert_eq!(metrics.count(metric_names::ATTEMPT_FAILED), 3);
        assert_eq!(metrics.count(metric_names::TRANSLATE_EXHAUSTED), 1);
    }
}
