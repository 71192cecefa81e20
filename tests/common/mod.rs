#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use span_translator::{Engine, EngineConfig, KeyValueStore, SpanKey, TranslateError, TranslateRequest, Translator};

/// Scripted backend: records calls, delays per text, fails on demand.
#[derive(Default)]
pub struct Scripted {
    calls: Mutex<Vec<String>>,
    delays: Mutex<HashMap<String, Duration>>,
    responses: Mutex<HashMap<String, String>>,
    responses_in: Mutex<HashMap<(String, String), String>>,
    failing: Mutex<HashSet<String>>,
}

impl Scripted {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay(&self, text: &str, ms: u64) {
        self.delays.lock().insert(text.to_string(), Duration::from_millis(ms));
    }

    pub fn respond(&self, text: &str, translated: &str) {
        self.responses.lock().insert(text.to_string(), translated.to_string());
    }

    /// Response for `text` in one target language only.
    pub fn respond_in(&self, text: &str, lang: &str, translated: &str) {
        self.responses_in
            .lock()
            .insert((text.to_string(), lang.to_string()), translated.to_string());
    }

    pub fn fail(&self, text: &str) {
        self.failing.lock().insert(text.to_string());
    }

    pub fn recover(&self, text: &str) {
        self.failing.lock().remove(text);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Translator for Scripted {
    fn translate(&self, request: TranslateRequest) -> BoxFuture<'_, Result<String, TranslateError>> {
        self.calls.lock().push(request.text.clone());
        let delay = self
            .delays
            .lock()
            .get(&request.text)
            .copied()
            .unwrap_or(Duration::from_millis(20));
        let fail = self.failing.lock().contains(&request.text);
        let translated = self
            .responses_in
            .lock()
            .get(&(request.text.clone(), request.target_lang.clone()))
            .cloned()
            .or_else(|| self.responses.lock().get(&request.text).cloned())
            .unwrap_or_else(|| format!("[{}] {}", request.target_lang, request.text));
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            if fail {
                Err(TranslateError::Api("scripted failure".into()))
            } else {
                Ok(translated)
            }
        })
    }
}

pub fn toks(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

pub fn engine(backend: &Arc<Scripted>) -> Engine {
    Engine::new(backend.clone(), EngineConfig::default())
}

pub fn engine_with_store(backend: &Arc<Scripted>, store: Arc<dyn KeyValueStore>) -> Engine {
    Engine::with_store(backend.clone(), EngineConfig::default(), store)
}

pub fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// No two live spans overlap.
pub fn assert_disjoint(engine: &Engine) {
    let keys: Vec<SpanKey> = engine.spans().keys().copied().collect();
    for w in keys.windows(2) {
        assert!(!w[0].overlaps(&w[1]), "spans {} and {} overlap", w[0], w[1]);
    }
}
