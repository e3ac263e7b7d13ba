//! Runtime configuration and the published-snapshot mechanism used to
//! share it (and the SM's UI-facing state) across threads without
//! locking the state machine itself. See spec.md §5 and §6.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A value published by a single writer (the processing thread) and read
/// by many. Readers clone out an `Arc<T>`, so they never block the
/// writer and never observe a torn value.
///
/// This is a `Mutex`-guarded store rather than a lock-free structure;
/// the mutex is only ever held for the duration of an `Arc` clone or
/// swap, so contention is not a concern for a UI polling at a few Hz.
/// See DESIGN.md for why this was chosen over a bespoke lock-free
/// snapshot.
pub struct Published<T> {
    generation: AtomicU64,
    current: Mutex<Arc<T>>,
}

impl<T> Published<T> {
    pub fn new(initial: T) -> Self {
        Self { generation: AtomicU64::new(0), current: Mutex::new(Arc::new(initial)) }
    }

    /// Load the current snapshot.
    pub fn load(&self) -> Arc<T> {
        self.current.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Load the current generation counter, useful for readers that only
    /// want to notice a change without paying for a clone every poll.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<T: PartialEq> Published<T> {
    /// Publish a new snapshot, reusing the existing one if it is
    /// field-equivalent (per spec.md §5: "reusing an existing snapshot
    /// when field-equivalent").
    pub fn store(&self, value: T) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if **guard == value {
            return;
        }
        *guard = Arc::new(value);
        self.generation.fetch_add(1, Ordering::Release);
    }
}

/// Feature toggles from spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureToggles {
    pub prefer_cc_candidates: bool,
    pub tune_group_calls: bool,
    pub tune_private_calls: bool,
    pub tune_data_calls: bool,
    pub tune_encrypted_calls: bool,
    pub allow_list_mode: bool,
    pub lcw_explicit_retune: bool,
    pub simple_sm_mode: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            prefer_cc_candidates: false,
            tune_group_calls: true,
            tune_private_calls: true,
            tune_data_calls: false,
            tune_encrypted_calls: true,
            allow_list_mode: false,
            lcw_explicit_retune: false,
            simple_sm_mode: false,
        }
    }
}

/// All environment-derived configuration from spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub hangtime: Duration,
    pub grant_timeout: Duration,
    pub cc_grace: Duration,
    pub vc_grace: Duration,
    pub mac_hold: Duration,
    pub voice_hold: Duration,
    pub min_follow_dwell: Duration,
    pub grant_voice_timeout: Duration,
    pub retune_backoff: Duration,
    pub force_release_extra: Duration,
    pub error_hold_percent: f64,
    pub error_hold_seconds: Duration,
    pub watchdog_period: Duration,
    /// Retention window for patch/regroup records (spec.md §4.2
    /// "configurable retention window"); not individually named in
    /// spec.md §6's env var list, so exposed alongside it here.
    pub patch_retention: Duration,
    /// Retention window for affiliation table aging (spec.md §4.3).
    pub affiliation_retention: Duration,
    pub features: FeatureToggles,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hangtime: Duration::from_secs_f64(2.0),
            grant_timeout: Duration::from_secs_f64(3.0),
            cc_grace: Duration::from_secs_f64(5.0),
            vc_grace: Duration::from_secs_f64(0.75),
            mac_hold: Duration::from_secs_f64(0.75),
            voice_hold: Duration::from_secs_f64(0.75),
            min_follow_dwell: Duration::from_secs_f64(0.0),
            grant_voice_timeout: Duration::from_secs_f64(0.0),
            retune_backoff: Duration::from_secs_f64(0.0),
            force_release_extra: Duration::from_secs_f64(0.0),
            error_hold_percent: 0.0,
            error_hold_seconds: Duration::from_secs_f64(0.0),
            watchdog_period: Duration::from_millis(200),
            patch_retention: Duration::from_secs(60),
            affiliation_retention: Duration::from_secs(900),
            features: FeatureToggles::default(),
        }
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse() {
            Ok(v) => v,
            Err(_) => {
                log::warn!("{name}={raw:?} is not a valid number, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

fn env_secs(name: &str, default: Duration) -> Duration {
    Duration::from_secs_f64(env_f64(name, default.as_secs_f64()))
}

fn env_millis(name: &str, default: Duration) -> Duration {
    Duration::from_millis(env_f64(name, default.as_millis() as f64) as u64)
}

fn env_bool(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(raw) => match raw.trim() {
            "1" | "true" | "on" | "yes" => true,
            "0" | "false" | "off" | "no" => false,
            other => {
                log::warn!("{name}={other:?} is not a valid boolean, using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}

impl Config {
    /// Build a `Config` from `DSD_NEO_*` environment variables, falling
    /// back to the documented defaults for anything missing or
    /// unparseable. Never fails; bad values are logged and ignored, per
    /// spec.md §7's "cache I/O error"-style non-fatal policy.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            hangtime: env_secs("DSD_NEO_HANGTIME", d.hangtime),
            grant_timeout: env_secs("DSD_NEO_GRANT_TIMEOUT", d.grant_timeout),
            cc_grace: env_secs("DSD_NEO_CC_GRACE", d.cc_grace),
            vc_grace: env_secs("DSD_NEO_VC_GRACE", d.vc_grace),
            mac_hold: env_secs("DSD_NEO_MAC_HOLD", d.mac_hold),
            voice_hold: env_secs("DSD_NEO_VOICE_HOLD", d.voice_hold),
            min_follow_dwell: env_secs("DSD_NEO_MIN_FOLLOW_DWELL", d.min_follow_dwell),
            grant_voice_timeout: env_secs("DSD_NEO_GRANT_VOICE_TIMEOUT", d.grant_voice_timeout),
            retune_backoff: env_secs("DSD_NEO_RETUNE_BACKOFF", d.retune_backoff),
            force_release_extra: env_secs("DSD_NEO_FORCE_RELEASE_EXTRA", d.force_release_extra),
            error_hold_percent: env_f64("DSD_NEO_ERROR_HOLD_PERCENT", d.error_hold_percent),
            error_hold_seconds: env_secs("DSD_NEO_ERROR_HOLD_SECONDS", d.error_hold_seconds),
            watchdog_period: env_millis("DSD_NEO_WATCHDOG_PERIOD_MS", d.watchdog_period)
                .clamp(Duration::from_millis(20), Duration::from_millis(2000)),
            patch_retention: env_secs("DSD_NEO_PATCH_RETENTION", d.patch_retention),
            affiliation_retention: env_secs("DSD_NEO_AFFILIATION_RETENTION", d.affiliation_retention),
            features: FeatureToggles {
                prefer_cc_candidates: env_bool("DSD_NEO_PREFER_CC_CANDIDATES", d.features.prefer_cc_candidates),
                tune_group_calls: env_bool("DSD_NEO_TUNE_GROUP_CALLS", d.features.tune_group_calls),
                tune_private_calls: env_bool("DSD_NEO_TUNE_PRIVATE_CALLS", d.features.tune_private_calls),
                tune_data_calls: env_bool("DSD_NEO_TUNE_DATA_CALLS", d.features.tune_data_calls),
                tune_encrypted_calls: env_bool("DSD_NEO_TUNE_ENCRYPTED_CALLS", d.features.tune_encrypted_calls),
                allow_list_mode: env_bool("DSD_NEO_ALLOW_LIST_MODE", d.features.allow_list_mode),
                lcw_explicit_retune: env_bool("DSD_NEO_LCW_EXPLICIT_RETUNE", d.features.lcw_explicit_retune),
                simple_sm_mode: env_bool("DSD_NEO_SIMPLE_SM_MODE", d.features.simple_sm_mode),
            },
        }
    }
}
