//! # Interference Rule Table
//!
//! Immutable mapping from `(radio access type, cellular band)` to the
//! interference rules that apply while a carrier of that band is active.
//!
//! Rule kinds are a closed set; each describes a different frequency
//! relationship:
//!
//! | Kind         | Aggressor → victim        | Range tested                        |
//! |--------------|---------------------------|-------------------------------------|
//! | Neighboring  | cell ↔ Wi-Fi, adjacent    | carrier range ± guard margin        |
//! | Harmonic     | cell uplink → Wi-Fi       | `N · uplink`                        |
//! | Intermod     | cell uplink + Wi-Fi → DL  | `i · uplink + j · wifi` vs downlink |
//! | Override     | empirical                 | none, fixed channel list            |
//!
//! The table is built once (see [`crate::config`]) and shared read-only with
//! the calculator.

use std::collections::{BTreeSet, HashMap};

use crate::cell::RadioAccessType;
use crate::channel::{self, WifiBand, WifiChannel};

/// Power cap applied to channels found by the default algorithm.
pub const DEFAULT_POWER_CAP_DBM: i32 = -50;

pub const DEFAULT_2G_CHANNEL: u32 = 6;
pub const DEFAULT_5G_CHANNEL: u32 = 36;
pub const DEFAULT_6G_CHANNEL: u32 = 5;

// ─── Rules ──────────────────────────────────────────────────────────────────

/// Adjacent-channel interference thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NeighboringRule {
    /// Guard margin around the cellular transmit range (Wi-Fi is the victim).
    pub wifi_victim_khz: Option<i64>,
    /// Guard margin around the cellular downlink (cellular is the victim).
    pub cell_victim_khz: Option<i64>,
}

/// Nth harmonic of the cellular uplink landing in a Wi-Fi band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarmonicRule {
    pub wifi_band: WifiBand,
    pub degree: i64,
    /// Share of a Wi-Fi channel's bandwidth the harmonic must cover.
    pub overlap_percent: u32,
}

/// Mixing product `cell_degree · uplink + wifi_degree · wifi` landing in
/// the cellular downlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntermodRule {
    pub wifi_band: WifiBand,
    pub cell_degree: i64,
    pub wifi_degree: i64,
    /// Share of the downlink bandwidth the product must cover.
    pub overlap_percent: u32,
}

/// Fixed list of channels that are always unsafe for this cellular band.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OverrideRule {
    pub channels: BTreeSet<WifiChannel>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterferenceRule {
    Neighboring(NeighboringRule),
    Harmonic(HarmonicRule),
    Intermod(IntermodRule),
    Override(OverrideRule),
}

impl InterferenceRule {
    pub fn kind(&self) -> &'static str {
        match self {
            InterferenceRule::Neighboring(_) => "neighboring",
            InterferenceRule::Harmonic(_) => "harmonic",
            InterferenceRule::Intermod(_) => "intermod",
            InterferenceRule::Override(_) => "override",
        }
    }
}

/// Rules for one `(rat, band)` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleEntry {
    pub power_cap_dbm: i32,
    pub rules: Vec<InterferenceRule>,
}

impl Default for RuleEntry {
    fn default() -> Self {
        RuleEntry {
            power_cap_dbm: DEFAULT_POWER_CAP_DBM,
            rules: Vec::new(),
        }
    }
}

impl RuleEntry {
    pub fn with_rule(mut self, rule: InterferenceRule) -> Self {
        self.rules.push(rule);
        self
    }
}

// ─── Table ──────────────────────────────────────────────────────────────────

/// Pre-loaded rule table. An empty table disables the default algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    entries: HashMap<(RadioAccessType, u32), RuleEntry>,
    default_2g: u32,
    default_5g: u32,
    default_6g: u32,
}

impl Default for RuleTable {
    fn default() -> Self {
        RuleTable {
            entries: HashMap::new(),
            default_2g: DEFAULT_2G_CHANNEL,
            default_5g: DEFAULT_5G_CHANNEL,
            default_6g: DEFAULT_6G_CHANNEL,
        }
    }
}

impl RuleTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds or replaces the entry for `(rat, band)`.
    pub fn with_entry(mut self, rat: RadioAccessType, band: u32, entry: RuleEntry) -> Self {
        self.entries.insert((rat, band), entry);
        self
    }

    /// Sets the channel kept available when a whole band is unsafe.
    ///
    /// # Panics
    ///
    /// Panics if the channel is not in the band's catalog.
    pub fn with_default_channel(mut self, band: WifiBand, channel: u32) -> Self {
        channel::channel_info(band, channel);
        match band {
            WifiBand::TwoGhz => self.default_2g = channel,
            WifiBand::FiveGhz => self.default_5g = channel,
            WifiBand::SixGhz => self.default_6g = channel,
        }
        self
    }

    pub fn entry(&self, rat: RadioAccessType, band: u32) -> Option<&RuleEntry> {
        self.entries.get(&(rat, band))
    }

    /// Rules configured for a cellular band, empty if none.
    pub fn rules_for(&self, rat: RadioAccessType, band: u32) -> &[InterferenceRule] {
        self.entry(rat, band)
            .map(|e| e.rules.as_slice())
            .unwrap_or(&[])
    }

    pub fn default_channel(&self, band: WifiBand) -> WifiChannel {
        let channel = match band {
            WifiBand::TwoGhz => self.default_2g,
            WifiBand::FiveGhz => self.default_5g,
            WifiBand::SixGhz => self.default_6g,
        };
        WifiChannel::new(band, channel)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
