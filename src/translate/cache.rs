//! Content-addressed translation cache plus in-flight request registry.
//! Key: normalized text + "_" + target language (see `keys::cache_key`).
//! Concurrent lookups for the same key share one spawned fetch. The fetch task
//! removes its own registry entry when it settles, whether or not anyone is
//! still waiting on it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::retry::{fetch_translation, RetryPolicy};
use super::{TranslateRequest, Translator};
use crate::keys::cache_key;
use crate::metrics::{metric_names, MetricsRegistry};

pub type SharedFetch = Shared<BoxFuture<'static, Option<String>>>;

/// Result of the synchronous half of a lookup.
pub enum Lookup {
    Cached(String),
    Fetch(SharedFetch),
}

pub struct TranslationCache {
    entries: Mutex<HashMap<String, String>>,
    pending: Arc<Mutex<HashMap<String, SharedFetch>>>,
    translator: Arc<dyn Translator>,
    policy: RetryPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl TranslationCache {
    pub fn new(
        translator: Arc<dyn Translator>,
        policy: RetryPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            translator,
            policy,
            metrics,
        }
    }

    /// Look up a cached translation.
    pub fn get(&self, text: &str, target_lang: &str) -> Option<String> {
        self.entries.lock().get(&cache_key(text, target_lang)).cloned()
    }

    /// Store a successful translation. Failures never reach this point.
    pub fn insert(&self, text: &str, target_lang: &str, translated: &str) {
        self.entries
            .lock()
            .insert(cache_key(text, target_lang), translated.to_string());
    }

    /// Replace the whole map (used when restoring persisted state).
    pub fn restore(&self, entries: impl IntoIterator<Item = (String, String)>) {
        let mut map = self.entries.lock();
        map.clear();
        map.extend(entries);
    }

    /// Ordered copy of the cache map.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.entries
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Number of fetches currently registered as in flight.
    pub fn pending_requests(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cache hit, an existing in-flight fetch, or a newly started one.
    /// `force` skips the cache but still joins an in-flight fetch.
    /// Must be called inside a tokio runtime.
    pub fn lookup(&self, request: TranslateRequest, force: bool) -> Lookup {
        let key = cache_key(&request.text, &request.target_lang);

        if !force {
            if let Some(hit) = self.entries.lock().get(&key) {
                self.metrics.incr(metric_names::CACHE_HIT);
                debug!(cache_key = %key, "cache hit");
                return Lookup::Cached(hit.clone());
            }
        }

        let mut pending = self.pending.lock();
        if let Some(in_flight) = pending.get(&key) {
            self.metrics.incr(metric_names::DEDUP_JOIN);
            debug!(cache_key = %key, "joining in-flight request");
            return Lookup::Fetch(in_flight.clone());
        }

        let fetch = self.spawn_fetch(key.clone(), request);
        pending.insert(key, fetch.clone());
        Lookup::Fetch(fetch)
    }

    /// Cache-or-fetch. `None` means the fetch failed or the text was blank.
    pub async fn resolve(&self, request: TranslateRequest, force: bool) -> Option<String> {
        match self.lookup(request, force) {
            Lookup::Cached(hit) => Some(hit),
            Lookup::Fetch(fetch) => fetch.await,
        }
    }

    fn spawn_fetch(&self, key: String, request: TranslateRequest) -> SharedFetch {
        let translator = Arc::clone(&self.translator);
        let metrics = Arc::clone(&self.metrics);
        let pending = Arc::clone(&self.pending);
        let policy = self.policy;

        metrics.incr(metric_names::NETWORK_FETCH);
        let registry_key = key.clone();
        let handle = tokio::spawn(async move {
            let result = fetch_translation(translator.as_ref(), request, policy, &metrics).await;
            pending.lock().remove(&registry_key);
            result
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "fetch task failed");
                    None
                }
            }
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::translate::TranslateError;

    struct Slow {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Translator for Slow {
        fn translate(&self, request: TranslateRequest) -> BoxFuture<'_, Result<String, TranslateError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let fail = self.fail;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                if fail {
                    Err(TranslateError::Timeout)
                } else {
                    Ok(request.text.to_uppercase())
                }
            })
        }
    }

    fn cache_with(fail: bool) -> (Arc<Slow>, TranslationCache) {
        let slow = Arc::new(Slow { calls: AtomicUsize::new(0), fail });
        let cache = TranslationCache::new(
            slow.clone(),
            RetryPolicy::default(),
            Arc::new(MetricsRegistry::new()),
        );
        (slow, cache)
    }

    fn req(text: &str) -> TranslateRequest {
        TranslateRequest {
            text: text.into(),
            target_lang: "en".into(),
            context: None,
            source_lang: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_lookups_share_one_call() {
        let (slow, cache) = cache_with(false);
        let results = futures_util::future::join_all(
            (0..5).map(|_| cache.resolve(req("hola"), false)),
        )
        .await;
        assert!(results.iter().all(|r| r.as_deref() == Some("HOLA")));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn registry_is_empty_after_settlement() {
        let (_, cache) = cache_with(true);
        assert_eq!(cache.resolve(req("hola"), false).await, None);
        tokio::task::yield_now().await;
        assert_eq!(cache.pending_requests(), 0);
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn registry_clears_even_without_waiters() {
        let (_, cache) = cache_with(false);
        drop(cache.lookup(req("adios"), false));
        assert_eq!(cache.pending_requests(), 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(cache.pending_requests(), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_network_unless_forced() {
        let (slow, cache) = cache_with(false);
        cache.insert("hola ", "en", "hello");
        assert_eq!(cache.resolve(req("hola"), false).await.as_deref(), Some("hello"));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 0);

        assert_eq!(cache.resolve(req("hola"), true).await.as_deref(), Some("HOLA"));
        assert_eq!(slow.calls.load(Ordering::SeqCst), 1);
    }
}
