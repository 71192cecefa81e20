//! Hover preview state: one hovered token and its ephemeral translation.
//! A pending lookup holds a `HoverGuard`; its result is written only while
//! the same index is still hovered. Stale results are dropped, never cancelled.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Snapshot of the hover preview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HoverState {
    pub index: Option<usize>,
    pub translation: Option<String>,
}

#[derive(Clone, Default)]
pub struct HoverSlot {
    state: Arc<Mutex<HoverState>>,
}

impl HoverSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hover `index`, dropping any previous translation. Returns the guard the
    /// lookup must check before writing.
    pub fn begin(&self, index: usize) -> HoverGuard {
        *self.state.lock() = HoverState {
            index: Some(index),
            translation: None,
        };
        HoverGuard {
            state: Arc::clone(&self.state),
            index,
        }
    }

    pub fn clear(&self) {
        *self.state.lock() = HoverState::default();
    }

    pub fn current(&self) -> HoverState {
        self.state.lock().clone()
    }
}

/// Write permission for one hover lookup.
pub struct HoverGuard {
    state: Arc<Mutex<HoverState>>,
    index: usize,
}

impl HoverGuard {
    /// Write the translation if this index is still hovered.
    /// Returns false when the result was stale and dropped.
    pub fn complete(&self, translation: String) -> bool {
        let mut state = self.state.lock();
        if state.index != Some(self.index) {
            return false;
        }
        state.translation = Some(translation);
        true
    }

    pub fn index(&self) -> usize {
        self.index
    }
}
