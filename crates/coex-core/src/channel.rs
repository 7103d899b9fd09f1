//! # Wi-Fi Channel Catalog
//!
//! Static lookup from Wi-Fi channel number to its occupied frequency span.
//! Every interference rule ends up intersecting a frequency range against
//! the entries of this catalog.
//!
//! | Band    | Center            | Widths               |
//! |---------|-------------------|----------------------|
//! | 2.4 GHz | 2407 + 5·n MHz    | 20 MHz (ch 14: 2484) |
//! | 5 GHz   | 5000 + 5·n MHz    | 20 / 40 / 80 / 160   |
//! | 6 GHz   | 5950 + 5·n MHz    | 20 / 40 / 80 / 160   |
//!
//! Channel numbers are unique within a band across all widths, so a
//! `(band, channel)` pair identifies one catalog entry.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

// ─── Bands ──────────────────────────────────────────────────────────────────

/// Wi-Fi frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WifiBand {
    #[serde(rename = "2g")]
    TwoGhz,
    #[serde(rename = "5g")]
    FiveGhz,
    #[serde(rename = "6g")]
    SixGhz,
}

/// All bands known to the catalog, in ascending frequency order.
pub const ALL_WIFI_BANDS: [WifiBand; 3] = [WifiBand::TwoGhz, WifiBand::FiveGhz, WifiBand::SixGhz];

impl fmt::Display for WifiBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WifiBand::TwoGhz => write!(f, "2.4GHz"),
            WifiBand::FiveGhz => write!(f, "5GHz"),
            WifiBand::SixGhz => write!(f, "6GHz"),
        }
    }
}

impl FromStr for WifiBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "2g" | "2.4g" | "2.4ghz" | "24ghz" => Ok(WifiBand::TwoGhz),
            "5g" | "5ghz" => Ok(WifiBand::FiveGhz),
            "6g" | "6ghz" => Ok(WifiBand::SixGhz),
            other => Err(format!("unknown Wi-Fi band '{other}'")),
        }
    }
}

/// Occupied channel width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelWidth {
    Mhz20,
    Mhz40,
    Mhz80,
    Mhz160,
}

impl ChannelWidth {
    pub const fn khz(self) -> i64 {
        match self {
            ChannelWidth::Mhz20 => 20_000,
            ChannelWidth::Mhz40 => 40_000,
            ChannelWidth::Mhz80 => 80_000,
            ChannelWidth::Mhz160 => 160_000,
        }
    }
}

impl FromStr for ChannelWidth {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "20mhz" => Ok(ChannelWidth::Mhz20),
            "40mhz" => Ok(ChannelWidth::Mhz40),
            "80mhz" => Ok(ChannelWidth::Mhz80),
            "160mhz" => Ok(ChannelWidth::Mhz160),
            other => Err(format!("unknown channel width '{other}'")),
        }
    }
}

// ─── Frequency ranges ───────────────────────────────────────────────────────

/// Closed frequency span in kHz.
///
/// Overlap is strict: two ranges that only touch at an edge do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FreqRange {
    pub low_khz: i64,
    pub high_khz: i64,
}

impl FreqRange {
    pub fn new(low_khz: i64, high_khz: i64) -> Self {
        FreqRange {
            low_khz: low_khz.min(high_khz),
            high_khz: low_khz.max(high_khz),
        }
    }

    /// Range occupied by a carrier of the given center and bandwidth.
    pub fn centered(center_khz: i64, bandwidth_khz: i64) -> Self {
        let half = bandwidth_khz.abs() / 2;
        FreqRange::new(center_khz - half, center_khz + half)
    }

    pub fn width_khz(&self) -> i64 {
        self.high_khz.saturating_sub(self.low_khz)
    }

    /// Expands both edges by a guard margin.
    pub fn widen(&self, margin_khz: i64) -> Self {
        FreqRange::new(
            self.low_khz.saturating_sub(margin_khz),
            self.high_khz.saturating_add(margin_khz),
        )
    }

    /// Multiplies both edges by an integer coefficient. Negative
    /// coefficients flip the range. Saturates at the `i64` limits.
    pub fn scale(&self, factor: i64) -> Self {
        FreqRange::new(
            self.low_khz.saturating_mul(factor),
            self.high_khz.saturating_mul(factor),
        )
    }

    /// Range of `a + b` for every `a` in `self` and `b` in `other`.
    pub fn sum(&self, other: &FreqRange) -> Self {
        FreqRange::new(
            self.low_khz.saturating_add(other.low_khz),
            self.high_khz.saturating_add(other.high_khz),
        )
    }

    /// Width of the intersection, zero if the ranges are disjoint.
    pub fn overlap_khz(&self, other: &FreqRange) -> i64 {
        let low = self.low_khz.max(other.low_khz);
        let high = self.high_khz.min(other.high_khz);
        high.saturating_sub(low).max(0)
    }

    pub fn overlaps(&self, other: &FreqRange) -> bool {
        self.overlap_khz(other) > 0
    }
}

impl fmt::Display for FreqRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}kHz, {}kHz]", self.low_khz, self.high_khz)
    }
}

// ─── Channels ───────────────────────────────────────────────────────────────

/// A Wi-Fi channel identified by band and channel number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WifiChannel {
    pub band: WifiBand,
    pub channel: u32,
}

impl WifiChannel {
    pub const fn new(band: WifiBand, channel: u32) -> Self {
        WifiChannel { band, channel }
    }
}

impl fmt::Display for WifiChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ch{}", self.band, self.channel)
    }
}

/// Catalog entry: a channel with its center frequency and width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub band: WifiBand,
    pub channel: u32,
    pub center_khz: i64,
    pub width: ChannelWidth,
}

impl ChannelInfo {
    pub fn wifi_channel(&self) -> WifiChannel {
        WifiChannel::new(self.band, self.channel)
    }

    pub fn range(&self) -> FreqRange {
        FreqRange::centered(self.center_khz, self.width.khz())
    }
}

fn center_2g_khz(channel: u32) -> i64 {
    if channel == 14 {
        2_484_000
    } else {
        (2407 + 5 * channel as i64) * 1000
    }
}

fn center_5g_khz(channel: u32) -> i64 {
    (5000 + 5 * channel as i64) * 1000
}

fn center_6g_khz(channel: u32) -> i64 {
    (5950 + 5 * channel as i64) * 1000
}

fn build(
    band: WifiBand,
    center: fn(u32) -> i64,
    groups: &[(ChannelWidth, &[u32])],
) -> Vec<ChannelInfo> {
    let mut out: Vec<ChannelInfo> = groups
        .iter()
        .flat_map(|(width, channels)| {
            channels.iter().map(move |&channel| ChannelInfo {
                band,
                channel,
                center_khz: center(channel),
                width: *width,
            })
        })
        .collect();
    out.sort_by_key(|c| c.channel);
    out
}

fn stepped(start: u32, end: u32, step: usize) -> Vec<u32> {
    (start..=end).step_by(step).collect()
}

static CATALOG_2G: Lazy<Vec<ChannelInfo>> = Lazy::new(|| {
    let channels: Vec<u32> = (1..=14).collect();
    build(WifiBand::TwoGhz, center_2g_khz, &[(ChannelWidth::Mhz20, &channels[..])])
});

static CATALOG_5G: Lazy<Vec<ChannelInfo>> = Lazy::new(|| {
    let mut ch20 = stepped(32, 68, 4);
    ch20.extend(stepped(96, 144, 4));
    ch20.extend(stepped(149, 173, 4));

    let mut ch40 = vec![34];
    ch40.extend(stepped(38, 62, 8));
    ch40.extend(stepped(102, 142, 8));
    ch40.extend([151, 159]);

    let ch80 = [42, 58, 106, 122, 138, 155];
    let ch160 = [50, 114];

    build(
        WifiBand::FiveGhz,
        center_5g_khz,
        &[
            (ChannelWidth::Mhz20, &ch20[..]),
            (ChannelWidth::Mhz40, &ch40[..]),
            (ChannelWidth::Mhz80, &ch80[..]),
            (ChannelWidth::Mhz160, &ch160[..]),
        ],
    )
});

static CATALOG_6G: Lazy<Vec<ChannelInfo>> = Lazy::new(|| {
    build(
        WifiBand::SixGhz,
        center_6g_khz,
        &[
            (ChannelWidth::Mhz20, &stepped(1, 233, 4)[..]),
            (ChannelWidth::Mhz40, &stepped(3, 227, 8)[..]),
            (ChannelWidth::Mhz80, &stepped(7, 215, 16)[..]),
            (ChannelWidth::Mhz160, &stepped(15, 207, 32)[..]),
        ],
    )
});

/// All catalog channels of a band, sorted by channel number.
pub fn channels(band: WifiBand) -> &'static [ChannelInfo] {
    match band {
        WifiBand::TwoGhz => CATALOG_2G.as_slice(),
        WifiBand::FiveGhz => CATALOG_5G.as_slice(),
        WifiBand::SixGhz => CATALOG_6G.as_slice(),
    }
}

/// Channels of a band with the given width.
pub fn channels_with_width(
    band: WifiBand,
    width: ChannelWidth,
) -> impl Iterator<Item = WifiChannel> {
    channels(band)
        .iter()
        .filter(move |c| c.width == width)
        .map(ChannelInfo::wifi_channel)
}

pub fn lookup(band: WifiBand, channel: u32) -> Option<&'static ChannelInfo> {
    channels(band)
        .binary_search_by_key(&channel, |c| c.channel)
        .ok()
        .map(|idx| &channels(band)[idx])
}

/// Catalog entry for a channel the caller knows to be valid.
///
/// # Panics
///
/// Panics if the channel is not defined for the band.
pub fn channel_info(band: WifiBand, channel: u32) -> &'static ChannelInfo {
    match lookup(band, channel) {
        Some(info) => info,
        None => panic!("channel {channel} is not defined in the {band} catalog"),
    }
}
