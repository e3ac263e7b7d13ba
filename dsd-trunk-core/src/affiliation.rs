//! C3: affiliation tables.
//!
//! Aging maps of registered radio IDs, and of (radio, talkgroup)
//! group-affiliation pairs. See spec.md §3 and §4.3.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::ids::{RadioId, Talkgroup};

/// Registered-radio table: radio ID → last-seen time.
#[derive(Debug, Clone, Default)]
pub struct AffiliationTable {
    last_seen: HashMap<RadioId, Instant>,
}

impl AffiliationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, radio: RadioId, now: Instant) {
        self.last_seen.insert(radio, now);
    }

    pub fn deregister(&mut self, radio: RadioId) {
        self.last_seen.remove(&radio);
    }

    pub fn is_registered(&self, radio: RadioId) -> bool {
        self.last_seen.contains_key(&radio)
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// Remove entries older than `retention`.
    pub fn tick(&mut self, now: Instant, retention: Duration) {
        self.last_seen.retain(|_, &mut seen| now.duration_since(seen) <= retention);
    }
}

/// Group-affiliation table: (radio, talkgroup) pairs, each aging
/// independently of the plain registration table.
#[derive(Debug, Clone, Default)]
pub struct GroupAffiliationTable {
    last_seen: HashMap<(RadioId, Talkgroup), Instant>,
}

impl GroupAffiliationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, radio: RadioId, tg: Talkgroup, now: Instant) {
        self.last_seen.insert((radio, tg), now);
    }

    pub fn deregister(&mut self, radio: RadioId, tg: Talkgroup) {
        self.last_seen.remove(&(radio, tg));
    }

    pub fn is_registered(&self, radio: RadioId, tg: Talkgroup) -> bool {
        self.last_seen.contains_key(&(radio, tg))
    }

    pub fn talkgroups_for(&self, radio: RadioId) -> impl Iterator<Item = Talkgroup> + '_ {
        self.last_seen.keys().filter(move |(r, _)| *r == radio).map(|(_, tg)| *tg)
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn tick(&mut self, now: Instant, retention: Duration) {
        self.last_seen.retain(|_, &mut seen| now.duration_since(seen) <= retention);
    }
}
