//! Transcript reconciliation.
//!
//! Streamed deltas are merged into per-role accumulators; at most one
//! non-finalized entry exists per role at any time. A flush (turn complete
//! or interruption) persists every pending entry with text and clears the
//! slot — the next delta for that role starts a fresh entry with a fresh
//! identity. Tool calls arrive whole and are persisted immediately,
//! never pending.

use crate::conversation::Notice;
use crate::conversation::store::TranscriptStore;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Caller,
    Model,
    Tool,
}

/// One externally addressable transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    /// Opaque identity, stable across delta merges.
    pub id: u64,
    pub role: Role,
    /// Accumulated text.
    pub text: String,
    /// True while deltas are still arriving for this entry.
    pub pending: bool,
}

/// Merges transcript deltas into stable entries and decides finality.
pub struct TranscriptReconciler {
    next_id: u64,
    caller: Option<TranscriptEntry>,
    model: Option<TranscriptEntry>,
    store: Box<dyn TranscriptStore>,
    notices: Option<crossbeam_channel::Sender<Notice>>,
}

impl TranscriptReconciler {
    pub fn new(
        store: Box<dyn TranscriptStore>,
        notices: Option<crossbeam_channel::Sender<Notice>>,
    ) -> Self {
        Self {
            next_id: 0,
            caller: None,
            model: None,
            store,
            notices,
        }
    }

    /// Applies a streamed delta for `role`.
    ///
    /// Appends to the role's pending entry when one exists (same
    /// identity), otherwise creates a fresh pending entry. `Tool` never
    /// streams deltas; such a delta is dropped with a warning.
    pub fn apply_delta(&mut self, role: Role, text: &str) {
        let slot = match role {
            Role::Caller => &mut self.caller,
            Role::Model => &mut self.model,
            Role::Tool => {
                tracing::warn!("dropping transcript delta for tool role");
                return;
            }
        };

        match slot {
            Some(entry) => {
                entry.text.push_str(text);
                notify(&self.notices, Notice::EntryUpdated(entry.clone()));
            }
            None => {
                let entry = TranscriptEntry {
                    id: self.next_id,
                    role,
                    text: text.to_string(),
                    pending: true,
                };
                self.next_id += 1;
                *slot = Some(entry.clone());
                notify(&self.notices, Notice::EntryCreated(entry));
            }
        }
    }

    /// Finalizes all pending entries.
    ///
    /// Entries with accumulated text are persisted; empty ones are
    /// discarded. Idempotent: with nothing pending this does nothing.
    pub fn flush(&mut self) {
        for slot in [&mut self.caller, &mut self.model] {
            if let Some(mut entry) = slot.take() {
                if entry.text.is_empty() {
                    continue;
                }
                entry.pending = false;
                self.store.persist(&entry);
                notify(&self.notices, Notice::EntryFinalized(entry));
            }
        }
    }

    /// Records a tool invocation as one already-final entry.
    pub fn record_tool_call(&mut self, name: &str, args: &serde_json::Value, result: Option<&str>) {
        let mut text = if args.is_null() {
            format!("{}()", name)
        } else {
            format!("{}({})", name, args)
        };
        if let Some(result) = result {
            text.push_str(" => ");
            text.push_str(result);
        }

        let entry = TranscriptEntry {
            id: self.next_id,
            role: Role::Tool,
            text,
            pending: false,
        };
        self.next_id += 1;
        self.store.persist(&entry);
        notify(&self.notices, Notice::EntryFinalized(entry));
    }

    /// The pending entry for `role`, if any.
    pub fn pending(&self, role: Role) -> Option<&TranscriptEntry> {
        match role {
            Role::Caller => self.caller.as_ref(),
            Role::Model => self.model.as_ref(),
            Role::Tool => None,
        }
    }

    /// Direct access to the store for lifecycle events.
    pub fn store_mut(&mut self) -> &mut dyn TranscriptStore {
        self.store.as_mut()
    }
}

/// Field-scoped send so callers can notify while holding entry borrows.
fn notify(notices: &Option<crossbeam_channel::Sender<Notice>>, notice: Notice) {
    if let Some(tx) = notices {
        let _ = tx.send(notice);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::store::MemoryStore;

    fn reconciler_with_store() -> (TranscriptReconciler, MemoryStore) {
        let store = MemoryStore::new();
        (
            TranscriptReconciler::new(Box::new(store.clone()), None),
            store,
        )
    }

    #[test]
    fn first_delta_creates_pending_entry() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "Hel");

        let entry = reconciler.pending(Role::Caller).expect("entry exists");
        assert_eq!(entry.text, "Hel");
        assert!(entry.pending);
        assert!(store.entries().is_empty());
    }

    #[test]
    fn deltas_accumulate_with_same_identity() {
        let (mut reconciler, _store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "Hel");
        let id = reconciler.pending(Role::Caller).unwrap().id;
        reconciler.apply_delta(Role::Caller, "lo");

        let entry = reconciler.pending(Role::Caller).unwrap();
        assert_eq!(entry.text, "Hello");
        assert_eq!(entry.id, id);
    }

    #[test]
    fn roles_accumulate_independently() {
        let (mut reconciler, _store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "hel");
        reconciler.apply_delta(Role::Model, "hi");

        assert_eq!(reconciler.pending(Role::Caller).unwrap().text, "hel");
        assert_eq!(reconciler.pending(Role::Model).unwrap().text, "hi");
        assert_ne!(
            reconciler.pending(Role::Caller).unwrap().id,
            reconciler.pending(Role::Model).unwrap().id
        );
    }

    #[test]
    fn flush_persists_and_clears_pending() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "hel");
        reconciler.apply_delta(Role::Model, "hi");
        reconciler.flush();

        let entries = store.entries();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| !e.pending));
        assert!(entries.iter().any(|e| e.role == Role::Caller && e.text == "hel"));
        assert!(entries.iter().any(|e| e.role == Role::Model && e.text == "hi"));
        assert!(reconciler.pending(Role::Caller).is_none());
        assert!(reconciler.pending(Role::Model).is_none());
    }

    #[test]
    fn flush_with_nothing_pending_is_a_noop() {
        let (mut reconciler, store) = reconciler_with_store();
        reconciler.flush();
        reconciler.flush();
        assert!(store.entries().is_empty());
    }

    #[test]
    fn flush_discards_empty_entries() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "");
        reconciler.flush();

        assert!(store.entries().is_empty());
        assert!(reconciler.pending(Role::Caller).is_none());
    }

    #[test]
    fn delta_after_flush_starts_a_new_identity() {
        let (mut reconciler, _store) = reconciler_with_store();

        reconciler.apply_delta(Role::Caller, "one");
        let first_id = reconciler.pending(Role::Caller).unwrap().id;
        reconciler.flush();

        reconciler.apply_delta(Role::Caller, "two");
        let second = reconciler.pending(Role::Caller).unwrap();
        assert_ne!(second.id, first_id);
        assert_eq!(second.text, "two");
    }

    #[test]
    fn tool_call_is_immediately_final() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.record_tool_call(
            "get_weather",
            &serde_json::json!({"city": "Oslo"}),
            Some("9C"),
        );

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::Tool);
        assert!(!entries[0].pending);
        assert!(entries[0].text.contains("get_weather"));
        assert!(entries[0].text.contains("Oslo"));
        assert!(entries[0].text.ends_with("=> 9C"));
        assert!(reconciler.pending(Role::Tool).is_none());
    }

    #[test]
    fn tool_call_without_args_or_result() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.record_tool_call("noop", &serde_json::Value::Null, None);

        assert_eq!(store.entries()[0].text, "noop()");
    }

    #[test]
    fn tool_call_does_not_disturb_pending_entries() {
        let (mut reconciler, store) = reconciler_with_store();

        reconciler.apply_delta(Role::Model, "thinking");
        reconciler.record_tool_call("lookup", &serde_json::Value::Null, None);

        assert_eq!(reconciler.pending(Role::Model).unwrap().text, "thinking");
        assert_eq!(store.entries().len(), 1);
    }

    #[test]
    fn tool_delta_is_dropped() {
        let (mut reconciler, store) = reconciler_with_store();
        reconciler.apply_delta(Role::Tool, "nope");
        assert!(store.entries().is_empty());
        assert!(reconciler.pending(Role::Tool).is_none());
    }

    #[test]
    fn notices_follow_entry_lifecycle() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let store = MemoryStore::new();
        let mut reconciler = TranscriptReconciler::new(Box::new(store), Some(tx));

        reconciler.apply_delta(Role::Caller, "a");
        reconciler.apply_delta(Role::Caller, "b");
        reconciler.flush();

        let notices: Vec<Notice> = rx.try_iter().collect();
        assert_eq!(notices.len(), 3);
        assert!(matches!(&notices[0], Notice::EntryCreated(e) if e.text == "a"));
        assert!(matches!(&notices[1], Notice::EntryUpdated(e) if e.text == "ab"));
        assert!(matches!(&notices[2], Notice::EntryFinalized(e) if e.text == "ab" && !e.pending));
    }
}
