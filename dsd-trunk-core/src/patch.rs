//! C2: patch/regroup tracker.
//!
//! Tracks active super-group (patch / simulselect) records: member
//! talkgroups and radios, and whether the super-group has an explicit
//! clear cryptographic policy that overrides encryption lockout for its
//! members. See spec.md §3 and §4.2.

use std::collections::HashMap;
use std::time::Instant;

use crate::ids::{RadioId, Sgid, Talkgroup};

pub const MAX_MEMBERS: usize = 8;

/// Kind of super-group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    Patch,
    SimulSelect,
}

/// Key/algorithm/serial-number context for a super-group. `-1` sentinels
/// in the wire protocol ("leave unchanged") are modeled by making each
/// field an `Option`, set only when known.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KasContext {
    pub key_id: Option<u16>,
    pub algorithm_id: Option<u8>,
    pub supergroup_serial: Option<u16>,
}

impl KasContext {
    /// Key=0 with algorithm=0x80 marks the super-group as explicitly
    /// clear, per spec.md §4.2.
    pub fn is_explicit_clear(&self) -> bool {
        self.key_id == Some(0) && self.algorithm_id == Some(0x80)
    }
}

#[derive(Debug, Clone)]
struct PatchRecord {
    kind: PatchKind,
    active: bool,
    wgids: Vec<Talkgroup>,
    wuids: Vec<RadioId>,
    kas: KasContext,
    last_update: Instant,
}

/// The patch/regroup tracker itself.
#[derive(Debug, Clone, Default)]
pub struct PatchTracker {
    records: HashMap<Sgid, PatchRecord>,
}

impl PatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or modify a record. Clearing `active` removes the record
    /// entirely, per spec.md §4.2.
    pub fn update(&mut self, sgid: Sgid, kind: PatchKind, active: bool, now: Instant) {
        if !active {
            self.records.remove(&sgid);
            return;
        }

        let record = self.records.entry(sgid).or_insert_with(|| PatchRecord {
            kind,
            active: true,
            wgids: Vec::new(),
            wuids: Vec::new(),
            kas: KasContext::default(),
            last_update: now,
        });
        record.kind = kind;
        record.active = true;
        record.last_update = now;
    }

    fn record_mut_or_create(&mut self, sgid: Sgid, kind: PatchKind, now: Instant) -> &mut PatchRecord {
        self.records.entry(sgid).or_insert_with(|| PatchRecord {
            kind,
            active: true,
            wgids: Vec::new(),
            wuids: Vec::new(),
            kas: KasContext::default(),
            last_update: now,
        })
    }

    /// Add a member talkgroup, creating and activating the super-group
    /// implicitly if it does not already exist.
    pub fn add_wgid(&mut self, sgid: Sgid, tg: Talkgroup, kind: PatchKind, now: Instant) {
        let record = self.record_mut_or_create(sgid, kind, now);
        if !record.wgids.contains(&tg) && record.wgids.len() < MAX_MEMBERS {
            record.wgids.push(tg);
        }
        record.last_update = now;
    }

    /// Add a member radio, creating and activating the super-group
    /// implicitly if it does not already exist.
    pub fn add_wuid(&mut self, sgid: Sgid, radio: RadioId, kind: PatchKind, now: Instant) {
        let record = self.record_mut_or_create(sgid, kind, now);
        if !record.wuids.contains(&radio) && record.wuids.len() < MAX_MEMBERS {
            record.wuids.push(radio);
        }
        record.last_update = now;
    }

    pub fn remove_wgid(&mut self, sgid: Sgid, tg: Talkgroup) {
        if let Some(record) = self.records.get_mut(&sgid) {
            record.wgids.retain(|&m| m != tg);
        }
    }

    pub fn remove_wuid(&mut self, sgid: Sgid, radio: RadioId) {
        if let Some(record) = self.records.get_mut(&sgid) {
            record.wuids.retain(|&m| m != radio);
        }
    }

    pub fn clear_sg(&mut self, sgid: Sgid) {
        self.records.remove(&sgid);
    }

    /// Set key/algorithm/serial context. Pass `None` for a field to leave
    /// it unchanged, mirroring the `-1` sentinel of spec.md §4.2.
    pub fn set_kas(
        &mut self,
        sgid: Sgid,
        key_id: Option<u16>,
        algorithm_id: Option<u8>,
        supergroup_serial: Option<u16>,
        kind: PatchKind,
        now: Instant,
    ) {
        let record = self.record_mut_or_create(sgid, kind, now);
        if let Some(key_id) = key_id {
            record.kas.key_id = Some(key_id);
        }
        if let Some(algorithm_id) = algorithm_id {
            record.kas.algorithm_id = Some(algorithm_id);
        }
        if let Some(serial) = supergroup_serial {
            record.kas.supergroup_serial = Some(serial);
        }
        record.last_update = now;
    }

    /// True when `tg` is a member of an active super-group with explicit
    /// clear policy, overriding encryption lockout for that talkgroup.
    pub fn tg_key_is_clear(&self, tg: Talkgroup) -> bool {
        self.records
            .values()
            .any(|r| r.active && r.kas.is_explicit_clear() && r.wgids.contains(&tg))
    }

    /// Age out records whose `last_update` is older than `retention`.
    pub fn tick(&mut self, now: Instant, retention: std::time::Duration) {
        self.records.retain(|_, r| now.duration_since(r.last_update) <= retention);
    }

    /// Compact summary, e.g. `P: 069,142`.
    pub fn summary(&self) -> String {
        let mut sgids: Vec<_> = self.records.keys().collect();
        sgids.sort_by_key(|s| s.0);

        let mut groups: HashMap<&str, Vec<String>> = HashMap::new();
        for sgid in sgids {
            let record = &self.records[sgid];
            let tag = match record.kind {
                PatchKind::Patch => "P",
                PatchKind::SimulSelect => "S",
            };
            groups.entry(tag).or_default().push(format!("{:03}", sgid.0));
        }

        let mut parts: Vec<String> = groups
            .into_iter()
            .map(|(tag, ids)| format!("{tag}: {}", ids.join(",")))
            .collect();
        parts.sort();
        parts.join("  ")
    }

    /// Detailed status enumerating member counts and known members.
    pub fn detail(&self) -> String {
        let mut sgids: Vec<_> = self.records.keys().collect();
        sgids.sort_by_key(|s| s.0);

        sgids
            .into_iter()
            .map(|sgid| {
                let record = &self.records[sgid];
                let kind = match record.kind {
                    PatchKind::Patch => "patch",
                    PatchKind::SimulSelect => "simulselect",
                };
                let tgs: Vec<String> = record.wgids.iter().map(|t| t.0.to_string()).collect();
                let rids: Vec<String> = record.wuids.iter().map(|r| r.0.to_string()).collect();
                format!(
                    "SG {} ({kind}): {} tg [{}], {} rid [{}]{}",
                    sgid.0,
                    tgs.len(),
                    tgs.join(","),
                    rids.len(),
                    rids.join(","),
                    if record.kas.is_explicit_clear() { ", clear" } else { "" },
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
