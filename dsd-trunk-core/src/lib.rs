//! Core P25 trunking controller: state machine, channel-grant follower,
//! candidate cache, patch tracker, affiliation tables, and audio gate.
//!
//! This crate has no knowledge of any particular radio front-end or UI;
//! it is driven entirely by the [`trunk::TrunkStateMachine`] event
//! handlers and observes the world only through the [`hooks::HookTable`]
//! it is given. See `SPEC_FULL.md` at the repository root.

pub mod affiliation;
pub mod cache;
pub mod config;
pub mod gate;
pub mod history;
pub mod hooks;
pub mod ids;
pub mod lockout;
pub mod patch;
pub mod trunk;

pub use config::{Config, FeatureToggles, Published};
pub use trunk::{Grant, ReleaseReason, SmSnapshot, State, Stats, TrunkStateMachine, TunedPhase};
