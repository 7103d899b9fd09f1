//! # Channel Safety Calculator
//!
//! Pure derivation of a [`Snapshot`] from the active cellular channels, the
//! rule table and the carrier restriction policy.
//!
//! Per cellular channel, every configured rule contributes Wi-Fi channels
//! with the entry's power cap. Contributions are unioned; when a channel is
//! hit more than once the first contribution's cap is kept. Afterwards:
//!
//! 1. Any band whose every catalog channel is unsafe gets its default
//!    channel back, so the band stays usable at all.
//! 2. If an LAA carrier is active, the policy's restrictions for the active
//!    subscription apply, and a non-empty restriction marks the whole 5 GHz
//!    band unsafe (uncapped).

use std::collections::BTreeSet;

use tracing::debug;

use crate::cell::CellularChannel;
use crate::channel::{self, ChannelInfo, FreqRange, WifiBand, ALL_WIFI_BANDS};
use crate::restriction::{RestrictionFlags, RestrictionPolicy, SubscriptionId};
use crate::rules::{HarmonicRule, InterferenceRule, IntermodRule, NeighboringRule, RuleTable};
use crate::snapshot::{Snapshot, UnsafeChannel};

pub fn compute(
    cells: &[CellularChannel],
    table: &RuleTable,
    active_subscription: SubscriptionId,
    policy: &dyn RestrictionPolicy,
) -> Snapshot {
    let mut unsafe_channels = BTreeSet::new();

    for cell in cells {
        let Some(entry) = table.entry(cell.rat, cell.band) else {
            continue;
        };
        let cap = Some(entry.power_cap_dbm);
        for rule in &entry.rules {
            let hits: Vec<&ChannelInfo> = match rule {
                InterferenceRule::Neighboring(r) => neighboring(cell, r).collect(),
                InterferenceRule::Harmonic(r) => harmonic(cell, r),
                InterferenceRule::Intermod(r) => intermod(cell, r),
                InterferenceRule::Override(r) => r
                    .channels
                    .iter()
                    .map(|ch| channel::channel_info(ch.band, ch.channel))
                    .collect(),
            };
            debug!(cell = %cell, rule = rule.kind(), hits = hits.len(), "coex rule applied");
            for info in hits {
                unsafe_channels.insert(UnsafeChannel {
                    band: info.band,
                    channel: info.channel,
                    power_cap_dbm: cap,
                });
            }
        }
        debug!(
            cell = %cell,
            rules = entry.rules.len(),
            total = unsafe_channels.len(),
            "applied coex rules"
        );
    }

    for band in ALL_WIFI_BANDS {
        let catalog = channel::channels(band);
        let covered = catalog
            .iter()
            .filter(|info| unsafe_channels.contains(&UnsafeChannel::new(band, info.channel)))
            .count();
        if covered == catalog.len() {
            let default = table.default_channel(band);
            debug!(
                band = %band,
                keep = default.channel,
                "whole band unsafe; keeping default channel"
            );
            unsafe_channels.remove(&UnsafeChannel::new(band, default.channel));
        }
    }

    let mut restrictions = RestrictionFlags::NONE;
    if cells.iter().any(CellularChannel::is_laa) {
        restrictions = policy.restrictions_for(active_subscription);
        if !restrictions.is_empty() {
            debug!(%restrictions, subscription = active_subscription, "LAA active; avoiding 5GHz");
            for info in channel::channels(WifiBand::FiveGhz) {
                unsafe_channels.insert(UnsafeChannel::new(info.band, info.channel));
            }
        }
    }

    Snapshot::new(unsafe_channels, restrictions)
}

// ─── Rules ──────────────────────────────────────────────────────────────────

fn overlapping(range: FreqRange) -> impl Iterator<Item = &'static ChannelInfo> {
    ALL_WIFI_BANDS
        .into_iter()
        .flat_map(channel::channels)
        .filter(move |info| info.range().overlaps(&range))
}

/// Channels within the guard margin of the cellular transmit and/or
/// receive range.
fn neighboring(
    cell: &CellularChannel,
    rule: &NeighboringRule,
) -> impl Iterator<Item = &'static ChannelInfo> {
    let wifi_victim = rule
        .wifi_victim_khz
        .zip(cell.transmit_range())
        .map(|(margin, tx)| overlapping(tx.widen(margin)));
    let cell_victim = rule
        .cell_victim_khz
        .zip(cell.downlink())
        .map(|(margin, rx)| overlapping(rx.widen(margin)));
    wifi_victim.into_iter().flatten().chain(cell_victim.into_iter().flatten())
}

fn covers(overlap_khz: i64, width_khz: i64, percent: u32) -> bool {
    overlap_khz > 0 && overlap_khz * 100 >= width_khz * i64::from(percent)
}

/// Channels of the target band covered by the Nth uplink harmonic.
fn harmonic(cell: &CellularChannel, rule: &HarmonicRule) -> Vec<&'static ChannelInfo> {
    let Some(tx) = cell.transmit_range() else {
        return Vec::new();
    };
    let harmonic = tx.scale(rule.degree);
    channel::channels(rule.wifi_band)
        .iter()
        .filter(|info| {
            let range = info.range();
            covers(range.overlap_khz(&harmonic), range.width_khz(), rule.overlap_percent)
        })
        .collect()
}

/// Channels whose mixing product with the uplink lands on the downlink.
fn intermod(cell: &CellularChannel, rule: &IntermodRule) -> Vec<&'static ChannelInfo> {
    let (Some(ul), Some(dl)) = (cell.uplink(), cell.downlink()) else {
        return Vec::new();
    };
    let cell_term = ul.scale(rule.cell_degree);
    channel::channels(rule.wifi_band)
        .iter()
        .filter(|info| {
            let product = cell_term.sum(&info.range().scale(rule.wifi_degree));
            covers(product.overlap_khz(&dl), dl.width_khz(), rule.overlap_percent)
        })
        .collect()
}
