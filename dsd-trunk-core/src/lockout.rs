//! C6: encryption-lockout emitter.
//!
//! Emits a single notification per (talkgroup, slot) per site session
//! that a call is encrypted and will not be followed. See spec.md §4.6.

use std::collections::HashSet;

use crate::ids::Talkgroup;

/// Tracks which (talkgroup, slot) pairs have already been reported, so
/// repeat detections are suppressed until [`LockoutEmitter::scrub`] is
/// called (on a site change, typically).
#[derive(Debug, Clone, Default)]
pub struct LockoutEmitter {
    seen: HashSet<(Talkgroup, i8)>,
}

impl LockoutEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the talkgroup/slot as encrypted-and-not-followed. Returns
    /// `true` the first time this pair is seen (meaning the caller should
    /// emit a history event), `false` on every subsequent call until a
    /// [`scrub`](Self::scrub).
    pub fn notify(&mut self, tg: Talkgroup, slot: i8) -> bool {
        self.seen.insert((tg, slot))
    }

    /// Clear all suppression state, e.g. on a site change.
    pub fn scrub(&mut self) {
        self.seen.clear();
    }
}
