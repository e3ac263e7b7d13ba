//! Newtype identifiers for the P25 data model.
//!
//! Keeping these distinct prevents a talkgroup from being passed where a
//! radio ID or channel number is expected, which the original C code has
//! no protection against.

/// Wide Area Communications Network identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wacn(pub u32);

/// System identifier, unique within a WACN.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sysid(pub u16);

/// Network access code distinguishing control channels within a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Nac(pub u16);

/// Talkgroup identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Talkgroup(pub u32);

/// Radio (subscriber unit) identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RadioId(pub u32);

/// Super-Group identifier for patches/regroups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sgid(pub u16);

/// 16-bit channel number as carried on the air: IDEN in the upper 4 bits,
/// index in the lower 12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelNumber(pub u16);

impl ChannelNumber {
    pub fn iden(self) -> u8 {
        (self.0 >> 12) as u8
    }

    pub fn index(self) -> u16 {
        self.0 & 0x0fff
    }
}

/// Identity of a P25 system: the (WACN, SYSID) pair that the candidate
/// cache file is keyed on, plus the NAC of the control channel currently
/// in view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SiteId {
    pub wacn: Wacn,
    pub sysid: Sysid,
    pub nac: Nac,
}

impl SiteId {
    pub fn new(wacn: Wacn, sysid: Sysid, nac: Nac) -> Self {
        Self { wacn, sysid, nac }
    }

    /// File name for this site's candidate cache, per the documented
    /// `p25_cc_<WACN:5X>_<SYSID:3X>.txt` pattern.
    pub fn cache_file_name(&self) -> String {
        format!("p25_cc_{:05X}_{:03X}.txt", self.wacn.0 & 0xf_ffff, self.sysid.0 & 0xfff)
    }
}

/// FDMA vs TDMA access for a channel-plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Fdma,
    Tdma,
}

/// Parameters for a single channel-plan (IDEN) entry, in the air units
/// documented in spec.md §3: base frequency in 5 Hz units, spacing in
/// 125 Hz units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdenParams {
    pub base_freq_5hz: u32,
    pub spacing_125hz: u16,
    pub tx_offset_hz: i64,
    pub kind: ChannelKind,
}

impl IdenParams {
    /// Resolve a channel index to a frequency in Hz.
    pub fn resolve(&self, index: u16) -> u64 {
        let base_hz = self.base_freq_5hz as u64 * 5;
        let spacing_hz = self.spacing_125hz as u64 * 125;
        base_hz + spacing_hz * index as u64
    }
}

/// One of the 16 IDEN slots in a channel plan. An IDEN is only "trusted"
/// (usable to resolve frequencies) once it has been observed at least
/// twice with consistent parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdenSlot {
    params: Option<IdenParams>,
    consistent_observations: u8,
}

impl IdenSlot {
    const TRUST_THRESHOLD: u8 = 2;

    /// Record an observation of this IDEN's parameters. A mismatch resets
    /// the trust counter rather than accepting the new value outright,
    /// per spec.md §3.
    pub fn observe(&mut self, params: IdenParams) {
        match self.params {
            Some(prev) if prev == params => {
                self.consistent_observations = self.consistent_observations.saturating_add(1);
            }
            _ => {
                self.params = Some(params);
                self.consistent_observations = 1;
            }
        }
    }

    pub fn is_trusted(&self) -> bool {
        self.consistent_observations >= Self::TRUST_THRESHOLD
    }

    pub fn params(&self) -> Option<IdenParams> {
        self.params
    }
}

/// A full 16-entry channel plan.
#[derive(Debug, Clone)]
pub struct ChannelPlan {
    idens: [IdenSlot; 16],
}

impl Default for ChannelPlan {
    fn default() -> Self {
        Self { idens: [IdenSlot::default(); 16] }
    }
}

impl ChannelPlan {
    pub fn observe(&mut self, iden: u8, params: IdenParams) {
        if let Some(slot) = self.idens.get_mut(iden as usize) {
            slot.observe(params);
        }
    }

    /// Resolve a channel number to a frequency in Hz. Returns `None` when
    /// the IDEN is untrusted, matching spec.md §3 ("resolves to a
    /// frequency in Hz only when its IDEN is trusted").
    pub fn resolve(&self, channel: ChannelNumber) -> Option<u64> {
        let slot = self.idens.get(channel.iden() as usize)?;
        if !slot.is_trusted() {
            return None;
        }
        slot.params().map(|p| p.resolve(channel.index()))
    }

    pub fn slot(&self, iden: u8) -> Option<&IdenSlot> {
        self.idens.get(iden as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(base: u32) -> IdenParams {
        IdenParams { base_freq_5hz: base, spacing_125hz: 100, tx_offset_hz: 0, kind: ChannelKind::Tdma }
    }

    #[test]
    fn untrusted_until_second_consistent_observation() {
        let mut plan = ChannelPlan::default();
        let chan = ChannelNumber(0x2001);
        assert_eq!(plan.resolve(chan), None);
        plan.observe(2, params(170_025_000 / 5));
        assert_eq!(plan.resolve(chan), None);
        plan.observe(2, params(170_025_000 / 5));
        assert!(plan.resolve(chan).is_some());
    }

    #[test]
    fn inconsistent_observation_resets_trust() {
        let mut plan = ChannelPlan::default();
        plan.observe(2, params(100));
        plan.observe(2, params(100));
        assert!(plan.slot(2).unwrap().is_trusted());
        plan.observe(2, params(200));
        assert!(!plan.slot(2).unwrap().is_trusted());
    }

    #[test]
    fn cache_file_name_format() {
        let id = SiteId::new(Wacn(0xBEE00), Sysid(0x1A2), Nac(0x293));
        assert_eq!(id.cache_file_name(), "p25_cc_BEE00_1A2.txt");
    }
}
