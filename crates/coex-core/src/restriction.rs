//! # Carrier Restriction Policy
//!
//! Role-level restrictions layered on top of channel-level unsafety. A
//! carrier may ask that SoftAP and/or Wi-Fi Direct stay off 5 GHz while an
//! LAA carrier is active; those toggles come from carrier configuration of
//! the active data subscription.
//!
//! Missing configuration fails open: no restrictions.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;

pub type SubscriptionId = i32;

pub const INVALID_SUBSCRIPTION_ID: SubscriptionId = -1;

// ─── Flags ──────────────────────────────────────────────────────────────────

/// Bitmask of restricted Wi-Fi roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct RestrictionFlags(u32);

impl RestrictionFlags {
    pub const NONE: RestrictionFlags = RestrictionFlags(0);
    pub const WIFI_DIRECT: RestrictionFlags = RestrictionFlags(1 << 0);
    pub const SOFTAP: RestrictionFlags = RestrictionFlags(1 << 1);
    pub const WIFI_AWARE: RestrictionFlags = RestrictionFlags(1 << 2);
    pub const ALL: RestrictionFlags = RestrictionFlags(0b111);

    /// Returns `None` if `bits` contains undefined flags.
    pub const fn from_bits(bits: u32) -> Option<Self> {
        if bits & !Self::ALL.0 != 0 {
            None
        } else {
            Some(RestrictionFlags(bits))
        }
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, other: RestrictionFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for RestrictionFlags {
    type Output = RestrictionFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        RestrictionFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RestrictionFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for RestrictionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = [
            (Self::WIFI_DIRECT, "wifi_direct"),
            (Self::SOFTAP, "softap"),
            (Self::WIFI_AWARE, "wifi_aware"),
        ]
        .iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| *name)
        .collect();
        write!(f, "{}", names.join("|"))
    }
}

// ─── Carrier config ─────────────────────────────────────────────────────────

/// Coexistence-related carrier configuration values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CarrierConfig {
    pub avoid_5ghz_softap_for_laa: bool,
    pub avoid_5ghz_wifi_direct_for_laa: bool,
}

impl CarrierConfig {
    pub fn laa_restrictions(&self) -> RestrictionFlags {
        let mut flags = RestrictionFlags::NONE;
        if self.avoid_5ghz_softap_for_laa {
            flags |= RestrictionFlags::SOFTAP;
        }
        if self.avoid_5ghz_wifi_direct_for_laa {
            flags |= RestrictionFlags::WIFI_DIRECT;
        }
        flags
    }
}

/// Source of per-subscription carrier configuration.
pub trait CarrierConfigProvider: Send + Sync {
    /// Returns `None` when the subscription is unknown or its configuration
    /// is not available yet.
    fn config_for_subscription(&self, subscription: SubscriptionId) -> Option<CarrierConfig>;
}

/// Provider that never has configuration.
pub struct NoCarrierConfig;

impl CarrierConfigProvider for NoCarrierConfig {
    fn config_for_subscription(&self, _subscription: SubscriptionId) -> Option<CarrierConfig> {
        None
    }
}

/// In-memory provider, updated by the caller.
#[derive(Default)]
pub struct StaticCarrierConfigs {
    configs: Mutex<HashMap<SubscriptionId, CarrierConfig>>,
}

impl StaticCarrierConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, subscription: SubscriptionId, config: CarrierConfig) {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subscription, config);
    }
}

impl CarrierConfigProvider for StaticCarrierConfigs {
    fn config_for_subscription(&self, subscription: SubscriptionId) -> Option<CarrierConfig> {
        self.configs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&subscription)
            .copied()
    }
}

// ─── Policy ─────────────────────────────────────────────────────────────────

/// Maps a subscription to the restrictions it imposes while LAA is active.
pub trait RestrictionPolicy {
    fn restrictions_for(&self, subscription: SubscriptionId) -> RestrictionFlags;
}

/// Tracks the active subscription and caches its carrier configuration.
pub struct CarrierRestrictionPolicy {
    provider: Arc<dyn CarrierConfigProvider>,
    active_subscription: SubscriptionId,
    active_config: Option<CarrierConfig>,
}

impl CarrierRestrictionPolicy {
    pub fn new(provider: Arc<dyn CarrierConfigProvider>) -> Self {
        CarrierRestrictionPolicy {
            provider,
            active_subscription: INVALID_SUBSCRIPTION_ID,
            active_config: None,
        }
    }

    pub fn active_subscription(&self) -> SubscriptionId {
        self.active_subscription
    }

    pub fn set_active_subscription(&mut self, subscription: SubscriptionId) {
        self.active_subscription = subscription;
        self.refresh();
    }

    /// Re-reads the carrier configuration of the active subscription.
    pub fn refresh(&mut self) {
        self.active_config = self.lookup(self.active_subscription);
        debug!(
            subscription = self.active_subscription,
            config = ?self.active_config,
            "carrier restriction config refreshed"
        );
    }

    fn lookup(&self, subscription: SubscriptionId) -> Option<CarrierConfig> {
        if subscription == INVALID_SUBSCRIPTION_ID {
            return None;
        }
        self.provider.config_for_subscription(subscription)
    }
}

impl RestrictionPolicy for CarrierRestrictionPolicy {
    fn restrictions_for(&self, subscription: SubscriptionId) -> RestrictionFlags {
        let config = if subscription == self.active_subscription {
            self.active_config
        } else {
            self.lookup(subscription)
        };
        config
            .map(|c| c.laa_restrictions())
            .unwrap_or(RestrictionFlags::NONE)
    }
}
