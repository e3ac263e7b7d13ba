//! C7: event history ring, published as an immutable snapshot for the
//! UI thread. See spec.md §2 ("surrounding glue") and the Open Question
//! in §9 about the original `push_event_history`'s off-by-one.
//!
//! The original C function shifts older entries up to make room for a
//! new one at the front, but reads `event_time` from `i + 1` instead of
//! `i - 1` while doing so -- so every shifted entry's timestamp is one
//! slot stale. spec.md asks re-implementers to flag this rather than
//! copy it; we implement the corrected shift (`i - 1`) here and keep a
//! regression test pinned to the corrected ordering.

use std::time::Instant;

pub const CAPACITY: usize = 32;

/// The "mode" tag carried on a history row. Only `DigitalEncrypted` is
/// exercised by the core today (C6's lockout emission); the rest exist
/// so the UI snapshot's row type is stable as other modes get wired up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    DigitalEncrypted,
    Tune,
    Release,
    Hunt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEvent {
    pub mode: EventMode,
    pub text: String,
    pub time: Instant,
}

/// Fixed-capacity, newest-first event ring.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventHistory {
    events: Vec<HistoryEvent>,
}

impl EventHistory {
    pub fn new() -> Self {
        Self { events: Vec::with_capacity(CAPACITY) }
    }

    /// Push a new event to the front, shifting older events back and
    /// dropping the oldest if at capacity.
    pub fn push(&mut self, mode: EventMode, text: impl Into<String>, time: Instant) {
        if self.events.len() >= CAPACITY {
            self.events.pop();
        }
        self.events.insert(0, HistoryEvent { mode, text: text.into(), time });
    }

    /// Events, newest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEvent> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
