//! # Cellular Channels
//!
//! Active cellular carriers as reported by the modem, plus the tracker that
//! decides which set of carriers the calculator sees.
//!
//! ## Mock precedence
//!
//! The tracker holds two independent lists: the *real* list reported by the
//! telephony stack and an optional *mock* list pinned by diagnostics or
//! tests. While a mock list is set, [`CellChannelTracker::current`] returns
//! it exclusively. Real reports keep being recorded underneath and surface
//! again once the mock is cleared.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::channel::FreqRange;

/// E-UTRA band used by LTE licensed-assisted access (5 GHz unlicensed).
pub const LAA_BAND: u32 = 46;

// ─── Radio access type ──────────────────────────────────────────────────────

/// Cellular radio access technology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RadioAccessType {
    Lte,
    Nr,
}

impl fmt::Display for RadioAccessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RadioAccessType::Lte => write!(f, "lte"),
            RadioAccessType::Nr => write!(f, "nr"),
        }
    }
}

impl FromStr for RadioAccessType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lte" | "eutran" => Ok(RadioAccessType::Lte),
            "nr" | "ngran" | "5g" => Ok(RadioAccessType::Nr),
            other => Err(format!("unknown radio access type '{other}'")),
        }
    }
}

// ─── Cellular channel ───────────────────────────────────────────────────────

/// One active cellular carrier.
///
/// Frequencies and bandwidths are in kHz. An uplink frequency of zero means
/// the carrier has no separate uplink (TDD bands transmit on the downlink
/// carrier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellularChannel {
    pub rat: RadioAccessType,
    /// 3GPP band number (e.g. 40, 46, 77).
    pub band: u32,
    pub downlink_freq_khz: i64,
    pub downlink_bandwidth_khz: i64,
    pub uplink_freq_khz: i64,
    pub uplink_bandwidth_khz: i64,
}

impl CellularChannel {
    pub fn new(
        rat: RadioAccessType,
        band: u32,
        downlink_freq_khz: i64,
        downlink_bandwidth_khz: i64,
        uplink_freq_khz: i64,
        uplink_bandwidth_khz: i64,
    ) -> Self {
        CellularChannel {
            rat,
            band,
            downlink_freq_khz,
            downlink_bandwidth_khz,
            uplink_freq_khz,
            uplink_bandwidth_khz,
        }
    }

    /// LTE carrier with downlink only.
    pub fn lte(band: u32, downlink_freq_khz: i64, downlink_bandwidth_khz: i64) -> Self {
        Self::new(
            RadioAccessType::Lte,
            band,
            downlink_freq_khz,
            downlink_bandwidth_khz,
            0,
            0,
        )
    }

    pub fn downlink(&self) -> Option<FreqRange> {
        (self.downlink_freq_khz > 0)
            .then(|| FreqRange::centered(self.downlink_freq_khz, self.downlink_bandwidth_khz))
    }

    pub fn uplink(&self) -> Option<FreqRange> {
        (self.uplink_freq_khz > 0)
            .then(|| FreqRange::centered(self.uplink_freq_khz, self.uplink_bandwidth_khz))
    }

    /// Range the handset transmits on: the uplink, or the downlink carrier
    /// when no separate uplink is reported.
    pub fn transmit_range(&self) -> Option<FreqRange> {
        self.uplink().or_else(|| self.downlink())
    }

    /// Whether this carrier is an LTE licensed-assisted access carrier.
    pub fn is_laa(&self) -> bool {
        self.rat == RadioAccessType::Lte && self.band == LAA_BAND
    }
}

impl fmt::Display for CellularChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tech = match self.rat {
            RadioAccessType::Lte => "B",
            RadioAccessType::Nr => "n",
        };
        write!(
            f,
            "{}{} dl={}kHz/{}kHz",
            tech, self.band, self.downlink_freq_khz, self.downlink_bandwidth_khz
        )?;
        if self.uplink_freq_khz > 0 {
            write!(
                f,
                " ul={}kHz/{}kHz",
                self.uplink_freq_khz, self.uplink_bandwidth_khz
            )?;
        }
        Ok(())
    }
}

/// Parses `rat:band:dl_khz:dl_bw_khz[:ul_khz:ul_bw_khz]`,
/// e.g. `lte:27:854500:17000:809500:17000`.
impl FromStr for CellularChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 4 && parts.len() != 6 {
            return Err(format!(
                "expected rat:band:dl_khz:dl_bw_khz[:ul_khz:ul_bw_khz], got '{s}'"
            ));
        }
        let rat: RadioAccessType = parts[0].parse()?;
        let num = |idx: usize| -> Result<i64, String> {
            parts[idx]
                .trim()
                .parse::<i64>()
                .map_err(|e| format!("invalid number '{}': {}", parts[idx], e))
        };
        let band = u32::try_from(num(1)?).map_err(|_| format!("invalid band '{}'", parts[1]))?;
        let (ul, ul_bw) = if parts.len() == 6 {
            (num(4)?, num(5)?)
        } else {
            (0, 0)
        };
        Ok(CellularChannel::new(rat, band, num(2)?, num(3)?, ul, ul_bw))
    }
}

// ─── Tracker ────────────────────────────────────────────────────────────────

/// Holds the real and mock cellular channel lists.
#[derive(Debug, Default)]
pub struct CellChannelTracker {
    real: Vec<CellularChannel>,
    mock: Option<Vec<CellularChannel>>,
}

impl CellChannelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the real channel list wholesale.
    pub fn set_real(&mut self, channels: Vec<CellularChannel>) {
        self.real = channels;
    }

    pub fn set_mock(&mut self, channels: Vec<CellularChannel>) {
        self.mock = Some(channels);
    }

    pub fn clear_mock(&mut self) {
        self.mock = None;
    }

    pub fn is_mocked(&self) -> bool {
        self.mock.is_some()
    }

    /// Channels the calculator should see.
    pub fn current(&self) -> &[CellularChannel] {
        match &self.mock {
            Some(mock) => mock,
            None => &self.real,
        }
    }

    pub fn real(&self) -> &[CellularChannel] {
        &self.real
    }
}
