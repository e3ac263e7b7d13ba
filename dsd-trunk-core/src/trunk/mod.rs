//! C5: the unified trunk state machine.
//!
//! Four-state channel-grant follower: `Idle` -> `OnCc` -> `Tuned` (with
//! `Armed`/`Following`/`Hangtime` sub-phases) -> `Hunting`. Coordinates
//! C1 (candidate cache), C2 (patch tracker), C3 (affiliation tables),
//! C4 (audio gate), and C6 (lockout emitter) in response to the event
//! stream described in spec.md §4.5.
//!
//! There is no global state: callers own a `TrunkStateMachine` value and
//! pass it to every event handler (spec.md §9).

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::affiliation::{AffiliationTable, GroupAffiliationTable};
use crate::cache::CandidateCache;
use crate::config::Published;
use crate::gate::{classify_algorithm, AlgorithmClass, AllowList};
use crate::history::{self, EventHistory};
use crate::hooks::HookTable;
use crate::ids::{ChannelKind, ChannelNumber, ChannelPlan, IdenParams, RadioId, SiteId, Talkgroup};
use crate::lockout::LockoutEmitter;
use crate::patch::PatchTracker;
use crate::Config;

/// Service-option bit marking an encrypted call, as carried on a grant.
pub const SVC_ENCRYPTED: u8 = 0x40;

/// Map a Phase 2 SACCH slot index to the voice-frame slot it corresponds
/// to. Phase 2 SACCH slot indices are inverted relative to the voice
/// frame slot; every MAC emitter must route its slot index through this
/// helper before constructing an event (spec.md §4.5, §9).
pub fn sacch_to_voice_slot(current_slot: u8) -> u8 {
    current_slot ^ 1
}

fn slot_index(slot: i8) -> usize {
    if slot == 1 {
        1
    } else {
        0
    }
}

/// Follower state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Idle,
    OnCc,
    Tuned(TunedPhase),
    Hunting,
}

/// Sub-phase while `Tuned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunedPhase {
    /// Tuned, awaiting the first voice indicator.
    Armed,
    /// Voice active.
    Following,
    /// Voice ended, retention window running.
    Hangtime,
}

/// Reason a voice channel was released, for logging/testing and the
/// `cc_returns` statistic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseReason {
    GrantTimeout,
    VcLost,
    HangtimeExpired,
    EncryptedLockout,
    Cancelled,
}

/// A channel grant, as delivered by the MAC/TSBK decoders. `freq_hz` is
/// the already-resolved frequency (0 when the IDEN/channel could not be
/// resolved); see spec.md §6. `is_data` distinguishes an SNDCP/data
/// channel grant from a voice grant, gated separately by
/// `FeatureToggles::tune_data_calls`.
#[derive(Debug, Clone, Copy)]
pub struct Grant {
    pub channel: ChannelNumber,
    pub freq_hz: u64,
    pub talkgroup: Talkgroup,
    pub source: RadioId,
    pub destination: RadioId,
    pub service_option_bits: u8,
    pub is_group: bool,
    pub is_data: bool,
}

impl Grant {
    fn is_encrypted_requested(&self) -> bool {
        self.service_option_bits & SVC_ENCRYPTED != 0
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SlotActivity {
    last_active: Option<Instant>,
    voice_active: bool,
    algorithm_id: Option<u8>,
    key: Option<u16>,
    talkgroup: Option<Talkgroup>,
}

#[derive(Debug, Clone, Copy)]
struct VoiceChannelContext {
    freq_hz: u64,
    channel: ChannelNumber,
    talkgroup: Talkgroup,
    source: RadioId,
    is_tdma: bool,
    service_option_encrypted: bool,
}

/// Statistics counters, exposed for UI snapshots and tests (spec.md §3,
/// §8 property 1 and 2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub tunes: u64,
    pub releases: u64,
    pub grants: u64,
    pub grants_dropped: u64,
    pub cc_returns: u64,
    pub hunt_attempts: u64,
}

/// Everything a UI/observer thread needs, published through a
/// `Published<SmSnapshot>` so it never locks the state machine itself
/// (spec.md §5). See `TrunkStateMachine::with_snapshot_publisher`.
#[derive(Debug, Clone, PartialEq)]
pub struct SmSnapshot {
    pub state: State,
    pub stats: Stats,
    pub current_voice_channel: Option<(u64, ChannelNumber, Talkgroup, RadioId)>,
    pub history: EventHistory,
}

/// The trunk state machine, with everything it needs to make policy
/// decisions: the candidate cache, patch tracker, affiliation tables,
/// lockout emitter, channel plan, and the tuning hooks it drives as a
/// side effect.
pub struct TrunkStateMachine {
    state: State,
    config: Config,

    cache: CandidateCache,
    cache_dir: std::path::PathBuf,
    site: Option<SiteId>,

    channel_plan: ChannelPlan,
    patches: PatchTracker,
    affiliations: AffiliationTable,
    group_affiliations: GroupAffiliationTable,
    lockout: LockoutEmitter,
    allow_list: AllowList,
    unmute_encrypted: bool,
    history: EventHistory,
    hooks: HookTable,

    current_cc_freq: Option<u64>,
    vc: Option<VoiceChannelContext>,
    slots: [SlotActivity; 2],

    t_cc_sync: Option<Instant>,
    t_tune: Option<Instant>,
    t_hangtime: Option<Instant>,
    t_hunt_try: Option<Instant>,
    hunt_started_at: Option<Instant>,
    sync_lost_since: Option<Instant>,

    stats: Stats,

    snapshot_publisher: Option<Arc<Published<SmSnapshot>>>,
}

impl TrunkStateMachine {
    pub fn new(config: Config) -> Self {
        let allow_list = AllowList { enabled: config.features.allow_list_mode, ..AllowList::default() };
        Self {
            state: State::Idle,
            config,
            cache: CandidateCache::new(),
            cache_dir: CandidateCache::default_cache_dir(),
            site: None,
            channel_plan: ChannelPlan::default(),
            patches: PatchTracker::new(),
            affiliations: AffiliationTable::new(),
            group_affiliations: GroupAffiliationTable::new(),
            lockout: LockoutEmitter::new(),
            allow_list,
            unmute_encrypted: false,
            history: EventHistory::new(),
            hooks: HookTable::new(),
            current_cc_freq: None,
            vc: None,
            slots: Default::default(),
            t_cc_sync: None,
            t_tune: None,
            t_hangtime: None,
            t_hunt_try: None,
            hunt_started_at: None,
            sync_lost_since: None,
            stats: Stats::default(),
            snapshot_publisher: None,
        }
    }

    pub fn with_hooks(mut self, hooks: HookTable) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Wire a `Published<SmSnapshot>` that `tick()` refreshes on every
    /// call, for a UI/observer thread to `load()` without ever locking
    /// the state machine itself (spec.md §5). The caller keeps its own
    /// clone of `publisher` to read from.
    pub fn with_snapshot_publisher(mut self, publisher: Arc<Published<SmSnapshot>>) -> Self {
        self.snapshot_publisher = Some(publisher);
        self
    }

    /// Build the current UI-facing snapshot. Also published automatically
    /// by `tick()` when a publisher has been installed.
    pub fn snapshot(&self) -> SmSnapshot {
        SmSnapshot {
            state: self.state,
            stats: self.stats,
            current_voice_channel: self.current_voice_channel(),
            history: self.history.clone(),
        }
    }

    /// Load the candidate cache for `site` from disk and remember the
    /// site identity for future persistence. Call once at startup (or on
    /// a site change).
    pub fn set_site(&mut self, site: SiteId) {
        self.cache = CandidateCache::load(&self.cache_dir, &site);
        self.site = Some(site);
        self.lockout.scrub();
    }

    pub fn set_unmute_encrypted(&mut self, value: bool) {
        self.unmute_encrypted = value;
    }

    /// The single allow-list toggle backing both tune admission (C5) and
    /// the audio gate (C4): `enabled` starts seeded from
    /// `config.features.allow_list_mode` and can be flipped at runtime
    /// through this accessor, which is the only place either path reads
    /// it from.
    pub fn allow_list_mut(&mut self) -> &mut AllowList {
        &mut self.allow_list
    }

    pub fn observe_iden(&mut self, iden: u8, params: IdenParams) {
        self.channel_plan.observe(iden, params);
    }

    pub fn resolve_channel(&self, channel: ChannelNumber) -> Option<u64> {
        self.channel_plan.resolve(channel)
    }

    /// Record the frequency the tuner is currently parked on for the
    /// control channel. The `CC_SYNC`/`SYNC_LOST` events themselves carry
    /// no payload (spec.md §6); the caller (which initiated whatever tune
    /// put us here) is responsible for keeping this current.
    pub fn note_cc_frequency(&mut self, freq_hz: u64) {
        self.current_cc_freq = Some(freq_hz);
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn patches(&self) -> &PatchTracker {
        &self.patches
    }

    pub fn patches_mut(&mut self) -> &mut PatchTracker {
        &mut self.patches
    }

    pub fn affiliations_mut(&mut self) -> &mut AffiliationTable {
        &mut self.affiliations
    }

    pub fn group_affiliations_mut(&mut self) -> &mut GroupAffiliationTable {
        &mut self.group_affiliations
    }

    pub fn cache(&self) -> &CandidateCache {
        &self.cache
    }

    /// The frequency, channel, talkgroup and source radio of the voice
    /// channel currently tuned, if any.
    pub fn current_voice_channel(&self) -> Option<(u64, ChannelNumber, Talkgroup, RadioId)> {
        self.vc.map(|v| (v.freq_hz, v.channel, v.talkgroup, v.source))
    }

    /// Whether the slot's decoded audio should currently be released,
    /// per C4 (spec.md §4.4). `slot` is 0 or 1; Phase 1 calls always use
    /// slot 0.
    pub fn audio_allowed(&self, slot: i8) -> bool {
        let idx = slot_index(slot);
        let activity = &self.slots[idx];
        let signal = crate::gate::SlotSignalState {
            algorithm_id: activity.algorithm_id.unwrap_or(0),
            encrypted_service_option: self.vc.map(|v| v.service_option_encrypted).unwrap_or(false),
            key_loaded: activity.key.map(|k| k != 0).unwrap_or(true),
            talkgroup: activity.talkgroup,
        };
        crate::gate::audio_allowed(&signal, &self.allow_list, &self.patches, self.unmute_encrypted)
    }

    // ---- event handlers -------------------------------------------------

    pub fn on_cc_sync(&mut self, now: Instant) {
        match self.state {
            State::Idle => {
                self.t_cc_sync = Some(now);
                self.state = State::OnCc;
                log::info!("control channel acquired, entering ON_CC");
            }
            State::OnCc => {
                self.t_cc_sync = Some(now);
            }
            State::Hunting => {
                self.t_cc_sync = Some(now);
                self.t_hunt_try = None;
                self.hunt_started_at = None;
                self.stats.cc_returns += 1;
                self.state = State::OnCc;
                log::info!("control channel reacquired while hunting, returning to ON_CC");
            }
            State::Tuned(_) => {}
        }
    }

    pub fn on_vc_sync(&mut self, now: Instant) {
        if matches!(self.state, State::Tuned(_)) {
            self.sync_lost_since = None;
        }
        let _ = now;
    }

    pub fn on_sync_lost(&mut self, now: Instant) {
        match self.state {
            State::OnCc => {
                if let Some(t_cc_sync) = self.t_cc_sync {
                    if now.duration_since(t_cc_sync) > self.config.cc_grace {
                        self.enter_hunting(now);
                    }
                }
            }
            State::Tuned(TunedPhase::Following) => {
                let lost_since = *self.sync_lost_since.get_or_insert(now);
                if now.duration_since(lost_since) > self.config.vc_grace {
                    self.release(ReleaseReason::VcLost, now);
                }
            }
            State::Tuned(_) => {
                self.sync_lost_since.get_or_insert(now);
            }
            State::Idle | State::Hunting => {}
        }
    }

    fn enter_hunting(&mut self, now: Instant) {
        self.state = State::Hunting;
        self.t_hunt_try = None;
        self.hunt_started_at = Some(now);
        self.sync_lost_since = None;
        log::info!("control channel lost, entering HUNTING");
    }

    fn tune_admission_allowed(&self, grant: &Grant) -> bool {
        if grant.is_data {
            return self.config.features.tune_data_calls;
        }
        if grant.is_group && !self.config.features.tune_group_calls {
            return false;
        }
        if !grant.is_group && !self.config.features.tune_private_calls {
            return false;
        }
        if self.allow_list.enabled && !self.allow_list.talkgroups.contains(&grant.talkgroup) {
            return false;
        }
        if grant.is_encrypted_requested() && !self.config.features.tune_encrypted_calls {
            return false;
        }
        true
    }

    pub fn on_grant(&mut self, grant: Grant, now: Instant) {
        if grant.freq_hz == 0 {
            self.stats.grants_dropped += 1;
            log::warn!("dropping grant with unresolved frequency, tg {}", grant.talkgroup.0);
            return;
        }

        match self.state {
            State::OnCc => {
                if self.tune_admission_allowed(&grant) {
                    self.enter_tuned(grant, now);
                } else {
                    self.stats.grants_dropped += 1;
                    log::info!("grant for tg {} rejected by policy", grant.talkgroup.0);
                }
            }
            State::Tuned(TunedPhase::Hangtime) => self.handle_grant_during_hangtime(grant, now),
            State::Tuned(TunedPhase::Armed) | State::Tuned(TunedPhase::Following) => {
                log::debug!("ignoring grant for tg {} while already tuned (no pre-emption)", grant.talkgroup.0);
            }
            State::Idle | State::Hunting => {}
        }
    }

    fn handle_grant_during_hangtime(&mut self, grant: Grant, now: Instant) {
        if self.vc.map(|v| v.talkgroup) == Some(grant.talkgroup) {
            self.state = State::Tuned(TunedPhase::Following);
            log::debug!("grant for same tg during hangtime, resuming without retune");
            return;
        }

        if !self.tune_admission_allowed(&grant) {
            self.stats.grants_dropped += 1;
            return;
        }

        log::info!("grant for different tg during hangtime, re-tuning");
        self.enter_tuned(grant, now);
    }

    fn enter_tuned(&mut self, grant: Grant, now: Instant) {
        let is_tdma = self
            .channel_plan
            .slot(grant.channel.iden())
            .and_then(|s| s.params())
            .map(|p| p.kind == ChannelKind::Tdma)
            .unwrap_or(false);

        self.hooks.tune_to_freq(grant.freq_hz, None);
        self.t_tune = Some(now);
        self.vc = Some(VoiceChannelContext {
            freq_hz: grant.freq_hz,
            channel: grant.channel,
            talkgroup: grant.talkgroup,
            source: grant.source,
            is_tdma,
            service_option_encrypted: grant.is_encrypted_requested(),
        });
        self.slots = Default::default();
        self.sync_lost_since = None;
        self.state = State::Tuned(TunedPhase::Armed);
        self.stats.tunes += 1;
        self.stats.grants += 1;
    }

    pub fn on_ptt(&mut self, slot: i8, now: Instant) {
        self.on_slot_active(slot, now);
    }

    pub fn on_active(&mut self, slot: i8, now: Instant) {
        self.on_slot_active(slot, now);
    }

    fn on_slot_active(&mut self, slot: i8, now: Instant) {
        let idx = slot_index(slot);
        match self.state {
            State::Tuned(TunedPhase::Armed) | State::Tuned(TunedPhase::Hangtime) => {
                self.slots[idx].voice_active = true;
                self.slots[idx].last_active = Some(now);
                self.state = State::Tuned(TunedPhase::Following);
            }
            State::Tuned(TunedPhase::Following) => {
                self.slots[idx].voice_active = true;
                self.slots[idx].last_active = Some(now);
            }
            _ => {}
        }
    }

    pub fn on_end(&mut self, slot: i8, now: Instant) {
        self.on_slot_quiescent(slot, now);
    }

    pub fn on_voice_idle(&mut self, slot: i8, now: Instant) {
        self.on_slot_quiescent(slot, now);
    }

    pub fn on_tdu(&mut self, now: Instant) {
        self.on_slot_quiescent(-1, now);
    }

    fn on_slot_quiescent(&mut self, slot: i8, now: Instant) {
        if !matches!(self.state, State::Tuned(TunedPhase::Following)) {
            return;
        }

        let idx = slot_index(slot);
        self.slots[idx].voice_active = false;

        let is_tdma = self.vc.map(|v| v.is_tdma).unwrap_or(false);
        let all_quiescent =
            if is_tdma { self.slots.iter().all(|s| !s.voice_active) } else { !self.slots[0].voice_active };

        if all_quiescent {
            self.t_hangtime = Some(now);
            self.state = State::Tuned(TunedPhase::Hangtime);
            log::debug!("all configured slots quiescent, entering HANGTIME");
        }
    }

    pub fn on_enc(&mut self, slot: i8, algorithm_id: u8, key_id: u16, tg: Talkgroup, now: Instant) {
        let idx = slot_index(slot);
        self.slots[idx].algorithm_id = Some(algorithm_id);
        self.slots[idx].key = Some(key_id);
        self.slots[idx].talkgroup = Some(tg);

        if !matches!(self.state, State::Tuned(_)) {
            return;
        }

        let key_loaded = key_id != 0;
        let encrypted = classify_algorithm(algorithm_id) == AlgorithmClass::Encrypted;
        let patch_clear = self.patches.tg_key_is_clear(tg);

        if encrypted && !key_loaded && !patch_clear {
            if self.lockout.notify(tg, slot) {
                self.history.push(history::EventMode::DigitalEncrypted, format!("DE: tg {}", tg.0), now);
            }

            if self.all_configured_slots_locked() {
                self.release(ReleaseReason::EncryptedLockout, now);
            }
        }
    }

    fn slot_locked(&self, idx: usize) -> bool {
        let slot = &self.slots[idx];
        let Some(alg) = slot.algorithm_id else { return false };
        if classify_algorithm(alg) != AlgorithmClass::Encrypted {
            return false;
        }
        if slot.key.map(|k| k != 0).unwrap_or(false) {
            return false;
        }
        if let Some(tg) = slot.talkgroup {
            if self.patches.tg_key_is_clear(tg) {
                return false;
            }
        }
        true
    }

    fn all_configured_slots_locked(&self) -> bool {
        if self.vc.map(|v| v.is_tdma).unwrap_or(false) {
            (0..2).all(|i| self.slot_locked(i))
        } else {
            self.slot_locked(0)
        }
    }

    pub fn on_neighbor_update(&mut self, freqs: &[u64]) {
        for &freq in freqs {
            self.cache.add(freq, true);
        }
        if let Some(site) = self.site {
            self.cache.persist(&self.cache_dir, &site);
        }
    }

    /// The single path out of `Tuned`. Invokes `return_to_cc`, flushes
    /// any partial Phase 2 audio, and resets per-slot activity. A failed
    /// retune is not fatal: the state machine moves to `ON_CC` regardless
    /// (spec.md §4.5).
    pub fn release(&mut self, reason: ReleaseReason, now: Instant) {
        if !matches!(self.state, State::Tuned(_)) {
            return;
        }

        log::info!("releasing voice channel: {reason:?}");

        if self.vc.map(|v| v.is_tdma).unwrap_or(false) {
            self.hooks.flush_partial_audio();
        }

        self.hooks.return_to_cc();

        self.vc = None;
        self.slots = Default::default();
        self.sync_lost_since = None;
        self.state = State::OnCc;
        self.stats.releases += 1;
        if reason == ReleaseReason::HangtimeExpired {
            self.stats.cc_returns += 1;
        }

        self.history.push(history::EventMode::Release, format!("release: {reason:?}"), now);
    }

    fn tick_hunting(&mut self, now: Instant) {
        if self.config.features.simple_sm_mode {
            // simple mode has no active hunting engine: wait for an
            // external CC_SYNC rather than retuning candidates ourselves.
            return;
        }

        let can_try = self.t_hunt_try.map(|t| now.duration_since(t) > self.config.retune_backoff).unwrap_or(true);
        if !can_try {
            return;
        }

        if let Some(freq) = self.cache.next(now, self.current_cc_freq) {
            self.hooks.tune_to_cc(freq, None);
            self.t_hunt_try = Some(now);
            self.stats.hunt_attempts += 1;
            log::info!("hunting: trying candidate {freq}");
        } else if let Some(started) = self.hunt_started_at {
            // with prefer_cc_candidates, keep retrying the (currently
            // exhausted) candidate cache rather than giving up to IDLE --
            // new candidates may still arrive via on_neighbor_update.
            if !self.config.features.prefer_cc_candidates && now.duration_since(started) > self.config.cc_grace {
                self.state = State::Idle;
                log::warn!("hunting exhausted candidates, giving up, entering IDLE");
            }
        }
    }

    /// Drive all timeout-based transitions and the aging tables. Safe to
    /// call at 1-10 Hz; repeated calls with an unchanged clock are
    /// idempotent (spec.md §4.5, §8 property 8).
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            State::Tuned(TunedPhase::Armed) => {
                if let Some(t_tune) = self.t_tune {
                    if now.duration_since(t_tune) > self.config.grant_timeout {
                        self.release(ReleaseReason::GrantTimeout, now);
                    }
                }
            }
            State::Tuned(TunedPhase::Following) => {
                if let Some(lost_since) = self.sync_lost_since {
                    if now.duration_since(lost_since) > self.config.vc_grace {
                        self.release(ReleaseReason::VcLost, now);
                    }
                }
            }
            State::Tuned(TunedPhase::Hangtime) => {
                if let Some(t_hangtime) = self.t_hangtime {
                    if now.duration_since(t_hangtime) > self.config.hangtime {
                        self.release(ReleaseReason::HangtimeExpired, now);
                    }
                }
            }
            State::Hunting => self.tick_hunting(now),
            State::OnCc | State::Idle => {}
        }

        self.patches.tick(now, self.config.patch_retention);
        self.affiliations.tick(now, self.config.affiliation_retention);
        self.group_affiliations.tick(now, self.config.affiliation_retention);

        if let Some(publisher) = &self.snapshot_publisher {
            publisher.store(self.snapshot());
        }
    }
}

impl std::fmt::Debug for TrunkStateMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrunkStateMachine")
            .field("state", &self.state)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
