//! Selection translation engine.
//!
//! `group_and_reconcile` groups the caller's selected token indices, resolves
//! overlaps with the live translated spans and writes the optimistic state
//! (cached translation or loading placeholder) before any network work starts.
//! Fetches run as spawned tasks. Each one re-validates against the live map
//! when it settles, so a narrower result never overwrites a broader selection
//! made while it was in flight.
//!
//! Map mutations only happen while a lock is held and no lock is held across
//! an `.await`.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::grouper::{self, sentence_context, span_text};
use crate::hover::{HoverSlot, HoverState};
use crate::keys::SpanKey;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::persist::{decode_pairs, decode_spans, encode_pairs, encode_spans, KeyValueStore, StoreError};
use crate::reconcile::reconcile;
use crate::translate::cache::{Lookup, SharedFetch, TranslationCache};
use crate::translate::normalize::resolve_source_lang;
use crate::translate::{TranslateRequest, Translator};

/// State of one live span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SpanState {
    Loading,
    /// Finished translation and the language it was translated into.
    Translated { text: String, target_lang: String },
}

impl SpanState {
    fn translated(text: impl Into<String>, target_lang: impl Into<String>) -> Self {
        SpanState::Translated {
            text: text.into(),
            target_lang: target_lang.into(),
        }
    }
}

/// How remainders of split spans are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// The selection set is authoritative: only still-selected remainder
    /// indices are re-translated.
    #[default]
    Word,
    /// The whole remainder of a split span is re-translated.
    Phrase,
}

/// Background work started by an engine call. Dropping it detaches the work.
#[derive(Default)]
pub struct Pending {
    handles: Vec<JoinHandle<()>>,
}

impl Pending {
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every task, including its autosave.
    pub async fn wait(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "engine task failed");
            }
        }
    }
}

struct Inner {
    spans: Mutex<BTreeMap<SpanKey, SpanState>>,
    cache: TranslationCache,
    hover: HoverSlot,
    store: Option<Arc<dyn KeyValueStore>>,
    save_lock: tokio::sync::Mutex<()>,
    config: EngineConfig,
    metrics: Arc<MetricsRegistry>,
}

/// One engine per document/session. Clones share state.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<Inner>,
}

/// Work item for a span whose translation must be fetched.
struct FetchJob {
    key: SpanKey,
    text: String,
    target_lang: String,
    fetch: SharedFetch,
}

impl Engine {
    pub fn new(translator: Arc<dyn Translator>, config: EngineConfig) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = TranslationCache::new(translator, config.retry_policy(), Arc::clone(&metrics));
        Self::from_parts(cache, metrics, config, None)
    }

    /// Engine that persists its maps to `store`.
    pub fn with_store(
        translator: Arc<dyn Translator>,
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let metrics = Arc::new(MetricsRegistry::new());
        let cache = TranslationCache::new(translator, config.retry_policy(), Arc::clone(&metrics));
        Self::from_parts(cache, metrics, config, Some(store))
    }

    pub fn from_parts(
        cache: TranslationCache,
        metrics: Arc<MetricsRegistry>,
        config: EngineConfig,
        store: Option<Arc<dyn KeyValueStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                spans: Mutex::new(BTreeMap::new()),
                cache,
                hover: HoverSlot::new(),
                store,
                save_lock: tokio::sync::Mutex::new(()),
                config,
                metrics,
            }),
        }
    }

    /// Group `indices` and reconcile every group in word mode.
    pub fn group_and_reconcile<'a, I>(
        &self,
        indices: I,
        tokens: &[String],
        source_lang: &str,
        target_lang: &str,
        force: bool,
    ) -> Pending
    where
        I: IntoIterator<Item = &'a usize>,
    {
        self.group_and_reconcile_mode(SelectionMode::Word, indices, tokens, source_lang, target_lang, force)
    }

    pub fn group_and_reconcile_mode<'a, I>(
        &self,
        mode: SelectionMode,
        indices: I,
        tokens: &[String],
        source_lang: &str,
        target_lang: &str,
        force: bool,
    ) -> Pending
    where
        I: IntoIterator<Item = &'a usize>,
    {
        let selection: BTreeSet<usize> = indices
            .into_iter()
            .copied()
            .filter(|&i| i < tokens.len())
            .collect();
        let initial: Vec<SpanKey> = grouper::group(&selection, tokens)
            .iter()
            .filter_map(|g| SpanKey::from_group(g))
            .collect();

        let mut queue: VecDeque<SpanKey> = initial.iter().copied().collect();
        let mut seen: HashSet<SpanKey> = initial.iter().copied().collect();
        let mut jobs = Vec::new();

        {
            let mut spans = self.inner.spans.lock();
            while let Some(key) = queue.pop_front() {
                let outcome = reconcile(key, spans.keys(), force);
                if outcome.already_present {
                    debug!(span = %key, "span already live");
                    continue;
                }

                for deleted in &outcome.to_delete {
                    if let Some(SpanState::Translated { text: existing, target_lang: lang }) =
                        spans.remove(deleted)
                    {
                        // Cached under its own language, not this call's.
                        self.inner
                            .cache
                            .insert(&span_text(tokens, *deleted), &lang, &existing);
                    }
                    debug!(span = %key, removed = %deleted, "overlapping span removed");
                }

                // Reversed so the leftmost remainder ends up first in the queue.
                for remainder in outcome.remainders.into_iter().rev() {
                    let kept: Vec<usize> = match mode {
                        SelectionMode::Word => remainder
                            .into_iter()
                            .filter(|i| selection.contains(i))
                            .collect(),
                        SelectionMode::Phrase => remainder,
                    };
                    for group in grouper::group(&kept, tokens).iter().rev() {
                        let Some(rest) = SpanKey::from_group(group) else {
                            continue;
                        };
                        // Groups of this call handle their own indices.
                        if initial.iter().any(|g| g.strictly_contains(&rest)) || !seen.insert(rest) {
                            continue;
                        }
                        debug!(span = %rest, split_from = %key, "re-translating remainder");
                        queue.push_front(rest);
                    }
                }

                let text = span_text(tokens, key);
                let context = sentence_context(tokens, key);
                let request = TranslateRequest {
                    source_lang: resolve_source_lang(source_lang, &context),
                    context: (!context.is_empty()).then_some(context),
                    text: text.clone(),
                    target_lang: target_lang.to_string(),
                };
                match self.inner.cache.lookup(request, force) {
                    Lookup::Cached(hit) => {
                        spans.insert(key, SpanState::translated(hit, target_lang));
                    }
                    Lookup::Fetch(fetch) => {
                        spans.insert(key, SpanState::Loading);
                        jobs.push(FetchJob {
                            key,
                            text,
                            target_lang: target_lang.to_string(),
                            fetch,
                        });
                    }
                }
            }
        }

        info!(
            groups = initial.len(),
            fetches = jobs.len(),
            force,
            "selection reconciled"
        );

        let handles = jobs
            .into_iter()
            .map(|job| {
                let engine = self.clone();
                tokio::spawn(async move {
                    let result = job.fetch.await;
                    engine.settle(job.key, &job.text, &job.target_lang, result);
                    engine.autosave().await;
                })
            })
            .collect();
        Pending { handles }
    }

    /// Apply a settled fetch for `key`. Returns whether it was written.
    fn settle(&self, key: SpanKey, text: &str, target_lang: &str, result: Option<String>) -> bool {
        let mut spans = self.inner.spans.lock();

        let Some(translated) = result else {
            if spans.get(&key) == Some(&SpanState::Loading) {
                spans.remove(&key);
            }
            warn!(span = %key, "translation failed, placeholder removed");
            return false;
        };

        if spans.keys().any(|live| live.strictly_contains(&key)) {
            if spans.get(&key) == Some(&SpanState::Loading) {
                spans.remove(&key);
            }
            self.inner.metrics.incr(metric_names::SUPERSEDED);
            debug!(span = %key, "result superseded by a broader span");
            return false;
        }

        let written = match spans.get_mut(&key) {
            Some(state) => {
                *state = SpanState::translated(translated.clone(), target_lang);
                true
            }
            None => {
                // Removed while in flight; writing it back could overlap a newer span.
                self.inner.metrics.incr(metric_names::ORPHANED);
                debug!(span = %key, "span no longer live, result not written");
                false
            }
        };
        drop(spans);

        self.inner.cache.insert(text, target_lang, &translated);
        written
    }

    /// Remove a span ("toggle off"). With `text`, a finished translation is
    /// migrated into the cache first, under the language it was translated
    /// into.
    pub fn remove_translation(
        &self,
        key: SpanKey,
        text: Option<&str>,
        target_lang: Option<&str>,
    ) -> bool {
        let removed = self.inner.spans.lock().remove(&key);
        let Some(state) = removed else {
            return false;
        };
        if let (SpanState::Translated { text: translated, target_lang: lang }, Some(source)) = (&state, text) {
            if target_lang.is_some_and(|given| given != lang.as_str()) {
                debug!(
                    span = %key,
                    given = ?target_lang,
                    recorded = %lang,
                    "caching removed span under its recorded language"
                );
            }
            self.inner.cache.insert(source, lang, translated);
        }
        debug!(span = %key, "translation removed");

        if self.inner.store.is_some() && self.inner.config.autosave {
            match tokio::runtime::Handle::try_current() {
                Ok(runtime) => {
                    let engine = self.clone();
                    runtime.spawn(async move { engine.autosave().await });
                }
                Err(_) => debug!(span = %key, "no runtime, removal not autosaved"),
            }
        }
        true
    }

    /// Hover a single token. Cached translations show immediately; otherwise
    /// the result is shown only if the same index is still hovered.
    pub fn hover(&self, index: usize, tokens: &[String], source_lang: &str, target_lang: &str) -> Pending {
        let Some(token) = tokens.get(index) else {
            self.clear_hover();
            return Pending::default();
        };
        let guard = self.inner.hover.begin(index);

        let key = SpanKey::new(index, index);
        let context = sentence_context(tokens, key);
        let request = TranslateRequest {
            text: token.clone(),
            target_lang: target_lang.to_string(),
            source_lang: resolve_source_lang(source_lang, &context),
            context: (!context.is_empty()).then_some(context),
        };

        match self.inner.cache.lookup(request, false) {
            Lookup::Cached(hit) => {
                guard.complete(hit);
                Pending::default()
            }
            Lookup::Fetch(fetch) => {
                let engine = self.clone();
                let text = token.clone();
                let target = target_lang.to_string();
                let handle = tokio::spawn(async move {
                    let Some(translated) = fetch.await else {
                        return;
                    };
                    engine.inner.cache.insert(&text, &target, &translated);
                    if !guard.complete(translated) {
                        engine.inner.metrics.incr(metric_names::HOVER_STALE);
                        debug!(index = guard.index(), "hover moved, result dropped");
                    }
                });
                Pending { handles: vec![handle] }
            }
        }
    }

    pub fn clear_hover(&self) {
        self.inner.hover.clear();
    }

    pub fn hover_state(&self) -> HoverState {
        self.inner.hover.current()
    }

    /// Live spans in start order.
    pub fn spans(&self) -> BTreeMap<SpanKey, SpanState> {
        self.inner.spans.lock().clone()
    }

    /// Live spans as `"{start}-{end}"` → translation or loading sentinel.
    pub fn translations(&self) -> Vec<(String, String)> {
        let sentinel = &self.inner.config.loading_sentinel;
        self.inner
            .spans
            .lock()
            .iter()
            .map(|(key, state)| {
                let value = match state {
                    SpanState::Loading => sentinel.clone(),
                    SpanState::Translated { text, .. } => text.clone(),
                };
                (key.to_string(), value)
            })
            .collect()
    }

    pub fn translation_for(&self, key: SpanKey) -> Option<SpanState> {
        self.inner.spans.lock().get(&key).cloned()
    }

    pub fn cache_snapshot(&self) -> BTreeMap<String, String> {
        self.inner.cache.snapshot()
    }

    pub fn cached(&self, text: &str, target_lang: &str) -> Option<String> {
        self.inner.cache.get(text, target_lang)
    }

    /// Fetches currently registered as in flight.
    pub fn pending_requests(&self) -> usize {
        self.inner.cache.pending_requests()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.inner.metrics
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Persist finished spans and the cache. Loading spans are not written.
    pub async fn save(&self) -> Result<(), StoreError> {
        let Some(store) = &self.inner.store else {
            return Ok(());
        };
        let _serial = self.inner.save_lock.lock().await;

        let spans: Vec<(String, String, String)> = self
            .inner
            .spans
            .lock()
            .iter()
            .filter_map(|(key, state)| match state {
                SpanState::Translated { text, target_lang } => {
                    Some((key.to_string(), text.clone(), target_lang.clone()))
                }
                SpanState::Loading => None,
            })
            .collect();
        let cache = self.inner.cache.snapshot();

        let spans_raw = encode_spans(
            spans
                .iter()
                .map(|(k, text, lang)| (k.as_str(), text.as_str(), lang.as_str())),
        )?;
        let cache_raw = encode_pairs(cache.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let cfg = &self.inner.config;
        store.set_item(&cfg.translations_key, spans_raw).await?;
        store.set_item(&cfg.cache_key_name, cache_raw).await?;
        debug!(spans = spans.len(), cached = cache.len(), "engine state saved");
        Ok(())
    }

    /// Replace both maps with the persisted ones. Missing items load as empty;
    /// spans overlapping an earlier span are dropped.
    pub async fn load(&self) -> Result<(), StoreError> {
        let Some(store) = &self.inner.store else {
            return Ok(());
        };
        let cfg = &self.inner.config;

        let spans_raw = store.get_item(&cfg.translations_key).await?;
        let cache_raw = store.get_item(&cfg.cache_key_name).await?;

        let loaded = match spans_raw {
            Some(raw) => decode_spans(&raw)?,
            None => BTreeMap::new(),
        };
        let cache_entries = match cache_raw {
            Some(raw) => decode_pairs(&raw)?,
            None => Vec::new(),
        };

        let mut restored: BTreeMap<SpanKey, SpanState> = BTreeMap::new();
        let mut last_end: Option<usize> = None;
        for (key, (translated, lang)) in loaded {
            if last_end.is_some_and(|end| key.start <= end) {
                warn!(span = %key, "dropping persisted span that overlaps another");
                continue;
            }
            last_end = Some(key.end);
            restored.insert(key, SpanState::translated(translated, lang));
        }

        info!(spans = restored.len(), cached = cache_entries.len(), "engine state loaded");
        *self.inner.spans.lock() = restored;
        self.inner.cache.restore(cache_entries);
        Ok(())
    }

    /// Drop every span, cache entry and hover, and remove the persisted items.
    pub async fn clear(&self) -> Result<(), StoreError> {
        self.inner.spans.lock().clear();
        self.inner.cache.restore(Vec::<(String, String)>::new());
        self.inner.hover.clear();
        if let Some(store) = &self.inner.store {
            let _serial = self.inner.save_lock.lock().await;
            store.remove_item(&self.inner.config.translations_key).await?;
            store.remove_item(&self.inner.config.cache_key_name).await?;
        }
        Ok(())
    }

    async fn autosave(&self) {
        if !self.inner.config.autosave || self.inner.store.is_none() {
            return;
        }
        if let Err(e) = self.save().await {
            warn!(error = %e, "autosave failed");
        }
    }
}
