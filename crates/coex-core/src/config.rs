use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::cell::RadioAccessType;
use crate::channel::{self, ChannelWidth, WifiBand, WifiChannel};
use crate::error::CoexError;
use crate::rules::{
    HarmonicRule, InterferenceRule, IntermodRule, NeighboringRule, OverrideRule, RuleEntry,
    RuleTable, DEFAULT_POWER_CAP_DBM,
};

pub const TABLE_VERSION: u32 = 1;

/// Highest harmonic or intermodulation order a table may name.
pub const MAX_MIXING_DEGREE: i64 = 10;

// ─── Rule table input ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleTableInput {
    pub version: u32,
    pub default_2g_channel: Option<u32>,
    pub default_5g_channel: Option<u32>,
    pub default_6g_channel: Option<u32>,
    pub entries: Vec<RuleEntryInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuleEntryInput {
    pub rat: Option<String>,
    pub band: Option<u32>,
    pub power_cap_dbm: Option<i32>,
    pub neighboring: Option<NeighboringInput>,
    pub harmonics: Vec<HarmonicInput>,
    pub intermods: Vec<IntermodInput>,
    #[serde(rename = "override")]
    pub override_channels: Option<OverrideInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NeighboringInput {
    pub wifi_victim_mhz: Option<u32>,
    pub cell_victim_mhz: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HarmonicInput {
    pub wifi_band: Option<String>,
    pub degree: Option<i64>,
    pub overlap_percent: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IntermodInput {
    pub wifi_band: Option<String>,
    pub cell_degree: Option<i64>,
    pub wifi_degree: Option<i64>,
    pub overlap_percent: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OverrideInput {
    pub channels_2g: Vec<u32>,
    pub channels_5g: Vec<u32>,
    pub channels_6g: Vec<u32>,
    /// Width categories: `all`, `20mhz`, `40mhz`, `80mhz`, `160mhz`.
    pub categories_5g: Vec<String>,
    pub categories_6g: Vec<String>,
}

fn parse_band(raw: &Option<String>, ctx: &str) -> Result<WifiBand, String> {
    raw.as_deref()
        .ok_or_else(|| format!("{ctx}: missing wifi_band"))?
        .parse::<WifiBand>()
        .map_err(|e| format!("{ctx}: {e}"))
}

fn check_percent(raw: Option<u32>, ctx: &str) -> Result<u32, String> {
    let pct = raw.unwrap_or(100);
    if pct == 0 || pct > 100 {
        return Err(format!("{ctx}: overlap_percent {pct} outside 1..=100"));
    }
    Ok(pct)
}

fn check_channel(band: WifiBand, channel: u32, ctx: &str) -> Result<WifiChannel, String> {
    channel::lookup(band, channel)
        .map(|info| info.wifi_channel())
        .ok_or_else(|| format!("{ctx}: channel {channel} not defined for {band}"))
}

fn expand_categories(
    band: WifiBand,
    categories: &[String],
    out: &mut BTreeSet<WifiChannel>,
    ctx: &str,
) -> Result<(), String> {
    for category in categories {
        if category.trim().eq_ignore_ascii_case("all") {
            out.extend(channel::channels(band).iter().map(|c| c.wifi_channel()));
            continue;
        }
        let width: ChannelWidth = category.parse().map_err(|e| format!("{ctx}: {e}"))?;
        out.extend(channel::channels_with_width(band, width));
    }
    Ok(())
}

impl OverrideInput {
    fn resolve(&self, ctx: &str) -> Result<OverrideRule, String> {
        let mut channels = BTreeSet::new();
        for (band, list) in [
            (WifiBand::TwoGhz, &self.channels_2g),
            (WifiBand::FiveGhz, &self.channels_5g),
            (WifiBand::SixGhz, &self.channels_6g),
        ] {
            for &ch in list {
                channels.insert(check_channel(band, ch, ctx)?);
            }
        }
        expand_categories(WifiBand::FiveGhz, &self.categories_5g, &mut channels, ctx)?;
        expand_categories(WifiBand::SixGhz, &self.categories_6g, &mut channels, ctx)?;
        Ok(OverrideRule { channels })
    }
}

impl RuleEntryInput {
    fn resolve(&self, idx: usize) -> Result<((RadioAccessType, u32), RuleEntry), String> {
        let ctx = format!("entry {idx}");
        let rat: RadioAccessType = self
            .rat
            .as_deref()
            .unwrap_or("lte")
            .parse()
            .map_err(|e| format!("{ctx}: {e}"))?;
        let band = self.band.ok_or_else(|| format!("{ctx}: missing band"))?;
        let ctx = format!("entry {idx} ({rat} band {band})");

        let mut entry = RuleEntry {
            power_cap_dbm: self.power_cap_dbm.unwrap_or(DEFAULT_POWER_CAP_DBM),
            rules: Vec::new(),
        };

        if let Some(n) = &self.neighboring {
            if n.wifi_victim_mhz.is_none() && n.cell_victim_mhz.is_none() {
                return Err(format!("{ctx}: neighboring needs wifi_victim_mhz or cell_victim_mhz"));
            }
            entry.rules.push(InterferenceRule::Neighboring(NeighboringRule {
                wifi_victim_khz: n.wifi_victim_mhz.map(|m| m as i64 * 1000),
                cell_victim_khz: n.cell_victim_mhz.map(|m| m as i64 * 1000),
            }));
        }

        for h in &self.harmonics {
            let degree = h.degree.ok_or_else(|| format!("{ctx}: harmonic missing degree"))?;
            if !(2..=MAX_MIXING_DEGREE).contains(&degree) {
                return Err(format!(
                    "{ctx}: harmonic degree {degree} must be in 2..={MAX_MIXING_DEGREE}"
                ));
            }
            entry.rules.push(InterferenceRule::Harmonic(HarmonicRule {
                wifi_band: parse_band(&h.wifi_band, &ctx)?,
                degree,
                overlap_percent: check_percent(h.overlap_percent, &ctx)?,
            }));
        }

        for im in &self.intermods {
            let (Some(cell_degree), Some(wifi_degree)) = (im.cell_degree, im.wifi_degree) else {
                return Err(format!("{ctx}: intermod needs cell_degree and wifi_degree"));
            };
            if cell_degree == 0 || wifi_degree == 0 {
                return Err(format!("{ctx}: intermod degrees must be non-zero"));
            }
            let limit = MAX_MIXING_DEGREE.unsigned_abs();
            if cell_degree.unsigned_abs() > limit || wifi_degree.unsigned_abs() > limit {
                return Err(format!("{ctx}: intermod degrees must be within ±{limit}"));
            }
            entry.rules.push(InterferenceRule::Intermod(IntermodRule {
                wifi_band: parse_band(&im.wifi_band, &ctx)?,
                cell_degree,
                wifi_degree,
                overlap_percent: check_percent(im.overlap_percent, &ctx)?,
            }));
        }

        if let Some(o) = &self.override_channels {
            entry.rules.push(InterferenceRule::Override(o.resolve(&ctx)?));
        }

        if entry.rules.is_empty() {
            return Err(format!("{ctx}: no rules configured"));
        }
        Ok(((rat, band), entry))
    }
}

impl RuleTableInput {
    pub fn resolve(self) -> Result<RuleTable, String> {
        let version = if self.version == 0 {
            TABLE_VERSION
        } else {
            self.version
        };
        if version != TABLE_VERSION {
            return Err(format!("Unsupported coex table version {}", version));
        }

        let mut table = RuleTable::empty();
        for (band, default) in [
            (WifiBand::TwoGhz, self.default_2g_channel),
            (WifiBand::FiveGhz, self.default_5g_channel),
            (WifiBand::SixGhz, self.default_6g_channel),
        ] {
            if let Some(ch) = default {
                check_channel(band, ch, "default channel")?;
                table = table.with_default_channel(band, ch);
            }
        }

        let mut seen = HashSet::new();
        for (idx, input) in self.entries.iter().enumerate() {
            let (key, entry) = input.resolve(idx)?;
            if !seen.insert(key) {
                return Err(format!(
                    "entry {idx}: duplicate entry for {} band {}",
                    key.0, key.1
                ));
            }
            table = table.with_entry(key.0, key.1, entry);
        }
        Ok(table)
    }
}

impl RuleTable {
    /// Parses a TOML rule table. Blank input yields an empty table.
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(RuleTable::empty());
        }
        let parsed: RuleTableInput =
            toml::from_str(input).map_err(|e| format!("Invalid coex table TOML: {}", e))?;
        parsed.resolve()
    }

    /// Like [`RuleTable::from_toml_str`], but degrades to an empty table.
    pub fn from_toml_str_or_empty(input: &str) -> Self {
        match Self::from_toml_str(input) {
            Ok(table) => table,
            Err(err) => {
                warn!(error = %err, "malformed coex table; continuing without rules");
                RuleTable::empty()
            }
        }
    }

    /// Reads and parses a rule table file.
    pub fn from_file(path: &Path) -> Result<Self, CoexError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoexError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
            .map_err(|e| CoexError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads the table at `path`, falling back to an empty table when the
    /// path is unset, unreadable or malformed.
    pub fn load_or_empty(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            info!("no coex table configured; default algorithm has no rules");
            return RuleTable::empty();
        };
        match Self::from_file(path) {
            Ok(table) => {
                info!(path = %path.display(), entries = table.len(), "coex table loaded");
                table
            }
            Err(err) => {
                warn!(error = %err, "failed to load coex table; continuing without rules");
                RuleTable::empty()
            }
        }
    }
}

// ─── Engine config ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoexConfigInput {
    pub default_algorithm_enabled: Option<bool>,
    pub table_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoexConfig {
    /// Whether unsafe channels are computed from cellular channels at all.
    /// When disabled only manual overrides produce snapshots.
    pub default_algorithm_enabled: bool,
    pub table_path: Option<PathBuf>,
}

impl Default for CoexConfig {
    fn default() -> Self {
        Self {
            default_algorithm_enabled: true,
            table_path: None,
        }
    }
}

impl CoexConfigInput {
    pub fn resolve(self) -> CoexConfig {
        let table_path = self.table_path.and_then(|p| {
            let trimmed = p.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(PathBuf::from(trimmed))
            }
        });
        CoexConfig {
            default_algorithm_enabled: self.default_algorithm_enabled.unwrap_or(true),
            table_path,
        }
    }
}

impl CoexConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, String> {
        if input.trim().is_empty() {
            return Ok(CoexConfig::default());
        }
        let parsed: CoexConfigInput =
            toml::from_str(input).map_err(|e| format!("Invalid coex config TOML: {}", e))?;
        Ok(parsed.resolve())
    }

    /// Loads the rule table this config points at.
    pub fn load_table(&self) -> RuleTable {
        RuleTable::load_or_empty(self.table_path.as_deref())
    }
}
