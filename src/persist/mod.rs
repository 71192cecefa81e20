//! Persistence for the engine's two maps.
//! The cache is written as a JSON array of `[key, value]` pairs in key order;
//! live spans as `[key, translation, target_lang]` rows. Both are rebuilt on
//! read. The store itself is an external key-value collaborator.

pub mod sqlite;

use std::collections::{BTreeMap, HashMap};

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::warn;

use crate::keys::SpanKey;

#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serde(serde_json::Error),
    Backend(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "store sqlite error: {e}"),
            StoreError::Serde(e) => write!(f, "store encoding error: {e}"),
            StoreError::Backend(msg) => write!(f, "store error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e)
    }
}

/// External string key-value store.
pub trait KeyValueStore: Send + Sync {
    fn get_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>>;
    fn set_item<'a>(&'a self, name: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>>;
    fn remove_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), StoreError>>;
}

/// In-process store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<Option<String>, StoreError>> {
        let value = self.items.lock().get(name).cloned();
        Box::pin(async move { Ok(value) })
    }

    fn set_item<'a>(&'a self, name: &'a str, value: String) -> BoxFuture<'a, Result<(), StoreError>> {
        self.items.lock().insert(name.to_string(), value);
        Box::pin(async { Ok(()) })
    }

    fn remove_item<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<(), StoreError>> {
        self.items.lock().remove(name);
        Box::pin(async { Ok(()) })
    }
}

/// Encode an ordered map as `[[key, value], ...]`.
pub fn encode_pairs<'a, I>(pairs: I) -> Result<String, StoreError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let list: Vec<(&str, &str)> = pairs.into_iter().collect();
    Ok(serde_json::to_string(&list)?)
}

/// Decode `[[key, value], ...]`, keeping the stored order.
pub fn decode_pairs(raw: &str) -> Result<Vec<(String, String)>, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode live spans as `[[key, translation, target_lang], ...]`.
pub fn encode_spans<'a, I>(rows: I) -> Result<String, StoreError>
where
    I: IntoIterator<Item = (&'a str, &'a str, &'a str)>,
{
    let list: Vec<(&str, &str, &str)> = rows.into_iter().collect();
    Ok(serde_json::to_string(&list)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SpanRow {
    Full(String, String, String),
    Other(serde_json::Value),
}

/// Rebuild the span map as key → (translation, target_lang).
/// Rows with a bad key or without a target language are skipped.
pub fn decode_spans(raw: &str) -> Result<BTreeMap<SpanKey, (String, String)>, StoreError> {
    let rows: Vec<SpanRow> = serde_json::from_str(raw)?;
    let mut out = BTreeMap::new();
    for row in rows {
        let (key, translation, lang) = match row {
            SpanRow::Full(key, translation, lang) => (key, translation, lang),
            SpanRow::Other(value) => {
                warn!(row = %value, "skipping persisted span without a target language");
                continue;
            }
        };
        match key.parse::<SpanKey>() {
            Ok(span) => {
                out.insert(span, (translation, lang));
            }
            Err(e) => warn!(error = %e, "skipping persisted span with bad key"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_encode_as_ordered_list() {
        let raw = encode_pairs([("0-0", "El"), ("2-4", "gato")]).unwrap();
        assert_eq!(raw, r#"[["0-0","El"],["2-4","gato"]]"#);
        assert_eq!(
            decode_pairs(&raw).unwrap(),
            vec![("0-0".to_string(), "El".to_string()), ("2-4".to_string(), "gato".to_string())]
        );
    }

    #[test]
    fn span_rows_carry_their_language() {
        let raw = encode_spans([("0-0", "El", "es"), ("2-2", "chat", "fr")]).unwrap();
        assert_eq!(raw, r#"[["0-0","El","es"],["2-2","chat","fr"]]"#);
        let map = decode_spans(&raw).unwrap();
        assert_eq!(map.get(&SpanKey::new(2, 2)), Some(&("chat".to_string(), "fr".to_string())));
    }

    #[test]
    fn bad_span_rows_are_skipped() {
        let map = decode_spans(r#"[["0-1","a","es"],["x","b","es"],["7-3","c","es"],["4-4","d"]]"#)
            .unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&SpanKey::new(0, 1)), Some(&("a".to_string(), "es".to_string())));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(matches!(decode_pairs("{not json"), Err(StoreError::Serde(_))));
    }

    #[tokio::test]
    async fn memory_store_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get_item("k").await.unwrap(), None);
        store.set_item("k", "v".into()).await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap().as_deref(), Some("v"));
        store.remove_item("k").await.unwrap();
        assert_eq!(store.get_item("k").await.unwrap(), None);
    }
}
