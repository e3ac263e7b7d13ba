//! Tuning hook interface to the external tuner subsystem.
//!
//! Modeled as a value-typed table of closures held by the state machine
//! context, rather than a trait object referencing the context's owner
//! (spec.md §9 "cyclic references"). Unset entries are no-ops, mirroring
//! the original's weak-symbol fallback for builds without a UI/tuner.

/// A hint for the symbol-timing loop accompanying a tune, carried
/// through unchanged to the tuning hook.
pub type TedSpsHint = Option<f32>;

/// The set of side-effecting operations the trunk state machine may
/// invoke. Each is best-effort and must not block; see spec.md §5 and
/// §6.
pub struct HookTable {
    tune_to_freq: Box<dyn FnMut(u64, TedSpsHint) + Send>,
    tune_to_cc: Box<dyn FnMut(u64, TedSpsHint) + Send>,
    return_to_cc: Box<dyn FnMut() + Send>,
    flush_partial_audio: Box<dyn FnMut() + Send>,
}

impl Default for HookTable {
    fn default() -> Self {
        Self {
            tune_to_freq: Box::new(|_, _| {}),
            tune_to_cc: Box::new(|_, _| {}),
            return_to_cc: Box::new(|| {}),
            flush_partial_audio: Box::new(|| {}),
        }
    }
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tune_to_freq(mut self, f: impl FnMut(u64, TedSpsHint) + Send + 'static) -> Self {
        self.tune_to_freq = Box::new(f);
        self
    }

    pub fn with_tune_to_cc(mut self, f: impl FnMut(u64, TedSpsHint) + Send + 'static) -> Self {
        self.tune_to_cc = Box::new(f);
        self
    }

    pub fn with_return_to_cc(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.return_to_cc = Box::new(f);
        self
    }

    pub fn with_flush_partial_audio(mut self, f: impl FnMut() + Send + 'static) -> Self {
        self.flush_partial_audio = Box::new(f);
        self
    }

    pub fn tune_to_freq(&mut self, freq_hz: u64, ted_sps_hint: TedSpsHint) {
        (self.tune_to_freq)(freq_hz, ted_sps_hint);
    }

    pub fn tune_to_cc(&mut self, freq_hz: u64, ted_sps_hint: TedSpsHint) {
        (self.tune_to_cc)(freq_hz, ted_sps_hint);
    }

    pub fn return_to_cc(&mut self) {
        (self.return_to_cc)();
    }

    pub fn flush_partial_audio(&mut self) {
        (self.flush_partial_audio)();
    }
}

impl std::fmt::Debug for HookTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookTable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_hooks_are_no_ops() {
        let mut hooks = HookTable::new();
        hooks.tune_to_freq(851_000_000, None);
        hooks.return_to_cc();
        hooks.flush_partial_audio();
    }

    #[test]
    fn custom_hook_is_invoked() {
        use std::sync::atomic::{AtomicU64, Ordering};
        use std::sync::Arc;

        let seen = Arc::new(AtomicU64::new(0));
        let seen2 = seen.clone();
        let mut hooks = HookTable::new().with_tune_to_freq(move |freq, _| {
            seen2.store(freq, Ordering::SeqCst);
        });

        hooks.tune_to_freq(852_250_000, None);
        assert_eq!(seen.load(Ordering::SeqCst), 852_250_000);
    }
}
