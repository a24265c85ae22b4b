//! Persistence collaborator interface.
//!
//! The core only ever hands finalized transcript entries and session
//! lifecycle events across this seam. Implementations must be cheap — the
//! control loop calls them inline and nothing here may block audio flow.

use std::sync::{Arc, Mutex};

use crate::conversation::transcript::TranscriptEntry;
use crate::transport::protocol::SessionConfig;

/// Trait for transcript persistence backends.
///
/// This trait allows swapping implementations (real store vs in-memory
/// test double).
pub trait TranscriptStore: Send {
    /// A session reached the listening state.
    fn session_started(&mut self, _session: &SessionConfig) {}

    /// The session ended; `reason` is a short human-readable cause.
    fn session_ended(&mut self, _reason: &str) {}

    /// Persist one finalized entry.
    fn persist(&mut self, entry: &TranscriptEntry);
}

/// Store that logs entries through `tracing` — the default for CLI runs
/// without a persistence service.
#[derive(Debug, Default)]
pub struct LogStore;

impl TranscriptStore for LogStore {
    fn session_started(&mut self, session: &SessionConfig) {
        tracing::info!(provider = %session.provider, voice = %session.voice, "session started");
    }

    fn session_ended(&mut self, reason: &str) {
        tracing::info!(reason, "session ended");
    }

    fn persist(&mut self, entry: &TranscriptEntry) {
        tracing::info!(role = ?entry.role, text = %entry.text, "transcript entry");
    }
}

/// In-memory store for testing.
///
/// Clones share state, so a test can keep a handle after the conversation
/// takes ownership.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    entries: Vec<TranscriptEntry>,
    lifecycle: Vec<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All persisted entries, in persistence order.
    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.inner
            .lock()
            .map(|inner| inner.entries.clone())
            .unwrap_or_default()
    }

    /// Session lifecycle events, in order.
    pub fn lifecycle(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.lifecycle.clone())
            .unwrap_or_default()
    }
}

impl TranscriptStore for MemoryStore {
    fn session_started(&mut self, session: &SessionConfig) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.lifecycle.push(format!("started:{}", session.provider));
        }
    }

    fn session_ended(&mut self, reason: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.lifecycle.push(format!("ended:{}", reason));
        }
    }

    fn persist(&mut self, entry: &TranscriptEntry) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.entries.push(entry.clone());
        }
    }
}
