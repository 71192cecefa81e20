//! span-translator: selection translation engine for a reading assistant.
//! Groups selected tokens into spans, keeps translated spans from overlapping,
//! and deduplicates and caches translate calls.

pub mod cli;
pub mod config;
pub mod engine;
pub mod grouper;
pub mod hover;
pub mod keys;
pub mod metrics;
pub mod persist;
pub mod reconcile;
pub mod translate;

pub use config::EngineConfig;
pub use engine::{Engine, Pending, SelectionMode, SpanState};
pub use hover::HoverState;
pub use keys::SpanKey;
pub use persist::{KeyValueStore, MemoryStore, StoreError};
pub use translate::{TranslateError, TranslateRequest, Translator};

/// Install the fmt subscriber. `RUST_LOG` overrides the default filter;
/// `SPAN_TRANSLATOR_LOG_JSON=1` switches to JSON lines.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("span_translator=debug"));
    let json = std::env::var("SPAN_TRANSLATOR_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
