use super::*;
use std::time::Duration;

fn grant(tg: u32, channel: u16, freq_hz: u64) -> Grant {
    Grant {
        channel: ChannelNumber(channel),
        freq_hz,
        talkgroup: Talkgroup(tg),
        source: RadioId(1),
        destination: RadioId(0),
        service_option_bits: 0,
        is_group: true,
        is_data: false,
    }
}

fn trusted_plan(sm: &mut TrunkStateMachine, iden: u8) {
    let params = IdenParams { base_freq_5hz: 170_025_000 / 5, spacing_125hz: 100, tx_offset_hz: 0, kind: ChannelKind::Fdma };
    sm.observe_iden(iden, params);
    sm.observe_iden(iden, params);
}

#[test]
fn idle_to_on_cc_on_sync() {
    let mut sm = TrunkStateMachine::new(Config::default());
    assert_eq!(sm.state(), State::Idle);
    sm.on_cc_sync(Instant::now());
    assert_eq!(sm.state(), State::OnCc);
}

#[test]
fn on_cc_to_hunting_after_grace() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_sync_lost(t0);
    assert_eq!(sm.state(), State::OnCc, "should not hunt immediately");
    sm.on_sync_lost(t0 + Duration::from_secs(6));
    assert_eq!(sm.state(), State::Hunting);
}

#[test]
fn grant_on_cc_enters_tuned_armed() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    trusted_plan(&mut sm, 0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Armed));
    assert_eq!(sm.stats().tunes, 1);
}

#[test]
fn zero_freq_grant_is_dropped() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 0), t0);
    assert_eq!(sm.state(), State::OnCc);
    assert_eq!(sm.stats().grants_dropped, 1);
}

#[test]
fn armed_to_following_on_voice_active() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Following));
}

#[test]
fn grant_timeout_releases_from_armed() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.tick(t0 + Duration::from_millis(3100));
    assert_eq!(sm.state(), State::OnCc);
    assert_eq!(sm.stats().releases, 1);
}

#[test]
fn following_to_hangtime_on_slot_quiescent() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_end(0, t0 + Duration::from_millis(100));
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Hangtime));
}

#[test]
fn no_preemption_while_following() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_grant(grant(5678, 0x0002, 851_025_000), t0 + Duration::from_millis(50));
    assert_eq!(sm.current_voice_channel().unwrap().2, Talkgroup(1234), "still on the first call's tg");
}

#[test]
fn hangtime_same_tg_resumes_without_retune() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_end(0, t0 + Duration::from_millis(100));
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Hangtime));

    let tunes_before = sm.stats().tunes;
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0 + Duration::from_millis(200));
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Following));
    assert_eq!(sm.stats().tunes, tunes_before, "resuming same tg must not count as a new tune");
}

#[test]
fn hangtime_different_tg_retunes() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_end(0, t0 + Duration::from_millis(100));

    sm.on_grant(grant(5678, 0x0002, 851_025_000), t0 + Duration::from_millis(200));
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Armed));
    assert_eq!(sm.current_voice_channel().unwrap().2, Talkgroup(5678));
}

#[test]
fn hangtime_expiry_returns_to_cc_and_counts() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_end(0, t0 + Duration::from_millis(100));

    sm.tick(t0 + Duration::from_millis(100) + Duration::from_secs(3));
    assert_eq!(sm.state(), State::OnCc);
    assert_eq!(sm.stats().cc_returns, 1);
}

#[test]
fn encrypted_lockout_releases_when_all_slots_locked() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(9999, 0x0003, 851_037_500), t0);
    sm.on_ptt(0, t0);
    sm.on_enc(0, 0x84, 0, Talkgroup(9999), t0 + Duration::from_millis(10));
    assert_eq!(sm.state(), State::OnCc);
    assert_eq!(sm.stats().releases, 1);
}

#[test]
fn encrypted_lockout_emits_history_once() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(9999, 0x0003, 851_037_500), t0);
    sm.on_ptt(0, t0);
    sm.on_enc(0, 0x84, 0, Talkgroup(9999), t0 + Duration::from_millis(10));
    assert_eq!(sm.history().len(), 1);
}

#[test]
fn vc_lost_releases_after_grace() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.on_sync_lost(t0 + Duration::from_millis(50));
    sm.tick(t0 + Duration::from_millis(50) + Duration::from_millis(1100));
    assert_eq!(sm.state(), State::OnCc);
}

#[test]
fn hunting_tries_candidates_then_gives_up() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_neighbor_update(&[851_500_000]);
    sm.on_cc_sync(t0);
    sm.on_sync_lost(t0 + Duration::from_secs(6));
    assert_eq!(sm.state(), State::Hunting);

    sm.tick(t0 + Duration::from_secs(6));
    assert_eq!(sm.stats().hunt_attempts, 1);
}

#[test]
fn hunting_returns_to_on_cc_when_cc_sync_seen() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_sync_lost(t0 + Duration::from_secs(6));
    assert_eq!(sm.state(), State::Hunting);
    sm.on_cc_sync(t0 + Duration::from_secs(8));
    assert_eq!(sm.state(), State::OnCc);
    assert_eq!(sm.stats().cc_returns, 1);
}

#[test]
fn tdma_release_flushes_partial_audio() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    let flushed = Arc::new(AtomicBool::new(false));
    let flushed2 = flushed.clone();
    let hooks = HookTable::new().with_flush_partial_audio(move || flushed2.store(true, Ordering::SeqCst));

    let mut sm = TrunkStateMachine::new(Config::default()).with_hooks(hooks);
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    trusted_plan(&mut sm, 2);
    let tdma_params =
        IdenParams { base_freq_5hz: 170_025_000 / 5, spacing_125hz: 100, tx_offset_hz: 0, kind: ChannelKind::Tdma };
    sm.observe_iden(2, tdma_params);
    sm.observe_iden(2, tdma_params);

    sm.on_grant(grant(1234, 0x2001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.tick(t0 + Duration::from_millis(3100));
    assert!(flushed.load(Ordering::SeqCst), "TDMA release must flush partial audio");
}

#[test]
fn sacch_to_voice_slot_inverts() {
    assert_eq!(sacch_to_voice_slot(0), 1);
    assert_eq!(sacch_to_voice_slot(1), 0);
}

#[test]
fn allow_list_mode_shares_one_flag_between_admission_and_gate() {
    let config = Config { features: crate::config::FeatureToggles { allow_list_mode: true, ..Default::default() }, ..Config::default() };
    let mut sm = TrunkStateMachine::new(config);
    sm.allow_list_mut().talkgroups.insert(Talkgroup(1234));

    let t0 = Instant::now();
    sm.on_cc_sync(t0);

    // not on the allow-list: admission must reject it before it is ever tuned.
    sm.on_grant(grant(5678, 0x0002, 851_025_000), t0);
    assert_eq!(sm.state(), State::OnCc, "non-allow-listed tg must not be tuned");
    assert_eq!(sm.stats().grants_dropped, 1);

    // on the allow-list: admitted, tuned, and its audio passes the gate
    // that reads the very same `allow_list.enabled`/`talkgroups` pair.
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0 + Duration::from_millis(10));
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Armed));
    sm.on_ptt(0, t0 + Duration::from_millis(10));
    sm.on_enc(0, 0x00, 0, Talkgroup(1234), t0 + Duration::from_millis(20));
    assert!(sm.audio_allowed(0), "allow-listed tg's audio must pass the gate once admitted");
}

#[test]
fn data_grant_gated_by_tune_data_calls() {
    let mut sm = TrunkStateMachine::new(Config::default());
    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(Grant { is_data: true, ..grant(1234, 0x0001, 851_012_500) }, t0);
    assert_eq!(sm.state(), State::OnCc, "data calls are not tuned by default");
    assert_eq!(sm.stats().grants_dropped, 1);

    let config = Config { features: crate::config::FeatureToggles { tune_data_calls: true, ..Default::default() }, ..Config::default() };
    let mut sm = TrunkStateMachine::new(config);
    sm.on_cc_sync(t0);
    sm.on_grant(Grant { is_data: true, ..grant(1234, 0x0001, 851_012_500) }, t0);
    assert_eq!(sm.state(), State::Tuned(TunedPhase::Armed));
}

#[test]
fn simple_sm_mode_never_hunts() {
    let config = Config { features: crate::config::FeatureToggles { simple_sm_mode: true, ..Default::default() }, ..Config::default() };
    let mut sm = TrunkStateMachine::new(config);
    let t0 = Instant::now();
    sm.on_neighbor_update(&[851_500_000]);
    sm.on_cc_sync(t0);
    sm.on_sync_lost(t0 + Duration::from_secs(6));
    assert_eq!(sm.state(), State::Hunting);

    sm.tick(t0 + Duration::from_secs(6));
    assert_eq!(sm.stats().hunt_attempts, 0, "simple mode must not drive any retune attempts");
}

#[test]
fn snapshot_publisher_updates_on_tick() {
    use crate::config::Published;
    use std::sync::Arc;

    let mut sm = TrunkStateMachine::new(Config::default());
    let publisher = Arc::new(Published::new(sm.snapshot()));
    sm = sm.with_snapshot_publisher(publisher.clone());
    let gen0 = publisher.generation();

    let t0 = Instant::now();
    sm.on_cc_sync(t0);
    sm.on_grant(grant(1234, 0x0001, 851_012_500), t0);
    sm.on_ptt(0, t0);
    sm.tick(t0 + Duration::from_millis(10));

    assert!(publisher.generation() > gen0, "tick must publish a fresh snapshot once state changes");
    assert_eq!(publisher.load().state, State::Tuned(TunedPhase::Following));
}
