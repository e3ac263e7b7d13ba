//! C4: audio gate.
//!
//! Per-slot boolean decision of whether decoded audio is released. Each
//! slot is independent: closing slot 0 must never close slot 1. See
//! spec.md §3 and §4.4.

use crate::ids::Talkgroup;
use crate::patch::PatchTracker;

/// Classifies an algorithm ID as clear, encrypted, or the clear
/// sentinel, per spec.md §4.4 condition 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmClass {
    Clear,
    Encrypted,
}

pub fn classify_algorithm(algorithm_id: u8) -> AlgorithmClass {
    match algorithm_id {
        0x00 | 0x80 => AlgorithmClass::Clear,
        _ => AlgorithmClass::Encrypted,
    }
}

/// Everything the gate needs to know about one slot to decide whether
/// audio should be released.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotSignalState {
    pub algorithm_id: u8,
    pub encrypted_service_option: bool,
    pub key_loaded: bool,
    pub talkgroup: Option<Talkgroup>,
}

/// Allow-list filter mode for condition 3.
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    pub enabled: bool,
    pub talkgroups: std::collections::HashSet<Talkgroup>,
}

impl AllowList {
    fn permits(&self, tg: Option<Talkgroup>) -> bool {
        if !self.enabled {
            return true;
        }
        match tg {
            Some(tg) => self.talkgroups.contains(&tg),
            None => false,
        }
    }
}

/// Evaluate the audio gate for a single slot, per spec.md §4.4.
///
/// The gate closes when algorithm-ID is non-clear, when the encrypted
/// service-option bit is set without a loaded key, or when the
/// allow-list filter rejects the talkgroup; it reopens (overriding the
/// encryption conditions only, never the allow-list) when the operator
/// has enabled "unmute encrypted" or the talkgroup belongs to an active
/// clear-policy patch.
pub fn audio_allowed(
    slot: &SlotSignalState,
    allow_list: &AllowList,
    patches: &PatchTracker,
    unmute_encrypted: bool,
) -> bool {
    if !allow_list.permits(slot.talkgroup) {
        return false;
    }

    let algorithm_locks = classify_algorithm(slot.algorithm_id) == AlgorithmClass::Encrypted;
    let service_locks = slot.encrypted_service_option && !slot.key_loaded;

    if !algorithm_locks && !service_locks {
        return true;
    }

    if unmute_encrypted {
        return true;
    }

    if let Some(tg) = slot.talkgroup {
        if patches.tg_key_is_clear(tg) {
            return true;
        }
    }

    false
}
