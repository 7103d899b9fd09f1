//! Published coexistence state: the unsafe channel set plus role
//! restrictions.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::channel::{WifiBand, WifiChannel};
use crate::restriction::RestrictionFlags;

/// A Wi-Fi channel to avoid, optionally usable at capped transmit power.
///
/// Equality, ordering and hashing look at `(band, channel)` only. Use
/// [`UnsafeChannel::identical`] to also compare the power cap.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct UnsafeChannel {
    pub band: WifiBand,
    pub channel: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power_cap_dbm: Option<i32>,
}

impl UnsafeChannel {
    pub fn new(band: WifiBand, channel: u32) -> Self {
        UnsafeChannel {
            band,
            channel,
            power_cap_dbm: None,
        }
    }

    pub fn with_power_cap(band: WifiBand, channel: u32, power_cap_dbm: i32) -> Self {
        UnsafeChannel {
            band,
            channel,
            power_cap_dbm: Some(power_cap_dbm),
        }
    }

    pub fn wifi_channel(&self) -> WifiChannel {
        WifiChannel::new(self.band, self.channel)
    }

    pub fn identical(&self, other: &UnsafeChannel) -> bool {
        self == other && self.power_cap_dbm == other.power_cap_dbm
    }
}

impl PartialEq for UnsafeChannel {
    fn eq(&self, other: &Self) -> bool {
        self.band == other.band && self.channel == other.channel
    }
}

impl Eq for UnsafeChannel {}

impl PartialOrd for UnsafeChannel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UnsafeChannel {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.band, self.channel).cmp(&(other.band, other.channel))
    }
}

impl Hash for UnsafeChannel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.band.hash(state);
        self.channel.hash(state);
    }
}

impl fmt::Display for UnsafeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ch{}", self.band, self.channel)?;
        if let Some(cap) = self.power_cap_dbm {
            write!(f, " (cap {cap}dBm)")?;
        }
        Ok(())
    }
}

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Immutable published state. Replaced wholesale, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub unsafe_channels: BTreeSet<UnsafeChannel>,
    pub restrictions: RestrictionFlags,
}

impl Snapshot {
    pub fn new(unsafe_channels: BTreeSet<UnsafeChannel>, restrictions: RestrictionFlags) -> Self {
        Snapshot {
            unsafe_channels,
            restrictions,
        }
    }

    /// Builds a snapshot from manual override input.
    ///
    /// Returns `None` when the input must be ignored: no channel list,
    /// undefined restriction bits, or an empty list with no restrictions.
    /// Duplicate channels keep the first occurrence.
    pub fn from_manual(channels: Option<Vec<UnsafeChannel>>, restrictions: u32) -> Option<Self> {
        let channels = channels?;
        let restrictions = RestrictionFlags::from_bits(restrictions)?;
        if channels.is_empty() && restrictions.is_empty() {
            return None;
        }
        let mut set = BTreeSet::new();
        for ch in channels {
            set.insert(ch);
        }
        Some(Snapshot::new(set, restrictions))
    }

    /// Like `==`, but power caps must match too.
    pub fn identical(&self, other: &Snapshot) -> bool {
        self.restrictions == other.restrictions
            && self.unsafe_channels.len() == other.unsafe_channels.len()
            && self
                .unsafe_channels
                .iter()
                .zip(other.unsafe_channels.iter())
                .all(|(a, b)| a.identical(b))
    }

    pub fn channels_in(&self, band: WifiBand) -> impl Iterator<Item = &UnsafeChannel> {
        self.unsafe_channels.iter().filter(move |c| c.band == band)
    }

    pub fn is_empty(&self) -> bool {
        self.unsafe_channels.is_empty() && self.restrictions.is_empty()
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "restrictions: {}", self.restrictions)?;
        write!(f, "unsafe channels: {}", self.unsafe_channels.len())?;
        for ch in &self.unsafe_channels {
            write!(f, "\n  {ch}")?;
        }
        Ok(())
    }
}
