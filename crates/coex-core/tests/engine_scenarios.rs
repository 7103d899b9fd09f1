//! End-to-end coex engine scenarios.
//!
//! Drives a full [`CoexEngine`] (worker thread, snapshot swap, notification
//! hub) through mock collaborators:
//! 1. Manual overrides and their no-op cases
//! 2. Listener and remote subscriber delivery, including failure removal
//! 3. Telephony-driven recomputation with mock precedence
//! 4. LAA carrier restrictions following carrier config changes
//! 5. Default algorithm gating by config and table contents

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};

use coex_core::cell::{CellularChannel, RadioAccessType};
use coex_core::channel::{self, WifiBand};
use coex_core::config::CoexConfig;
use coex_core::error::RemoteError;
use coex_core::notify::{CoexListener, RemoteCoexCallback};
use coex_core::restriction::{CarrierConfig, RestrictionFlags, StaticCarrierConfigs};
use coex_core::rules::RuleTable;
use coex_core::snapshot::UnsafeChannel;
use coex_core::{CoexCollaborators, CoexEngine, CoexEvents, RadioControl, TelephonySource};

const TABLE: &str = r#"
version = 1

[[entries]]
rat = "lte"
band = 40
neighboring = { cell_victim_mhz = 20 }

[[entries]]
rat = "lte"
band = 46
neighboring = { cell_victim_mhz = 20 }

[[entries]]
rat = "lte"
band = 27
harmonics = [{ wifi_band = "2g", degree = 3, overlap_percent = 100 }]

[[entries]]
rat = "lte"
band = 7
intermods = [{ wifi_band = "2g", cell_degree = 2, wifi_degree = -1, overlap_percent = 100 }]
"#;

const TIMEOUT: Duration = Duration::from_secs(2);

// ─── Mock collaborators ─────────────────────────────────────────────────

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl CoexListener for CountingListener {
    fn on_coex_unsafe_channels_changed(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

struct ChannelRemote {
    tx: Sender<(Vec<UnsafeChannel>, RestrictionFlags)>,
}

impl RemoteCoexCallback for ChannelRemote {
    fn on_coex_unsafe_channels_changed(
        &self,
        channels: &[UnsafeChannel],
        restrictions: RestrictionFlags,
    ) -> Result<(), RemoteError> {
        self.tx
            .send((channels.to_vec(), restrictions))
            .map_err(|e| RemoteError(e.to_string()))
    }
}

fn channel_remote() -> (
    Arc<dyn RemoteCoexCallback>,
    Receiver<(Vec<UnsafeChannel>, RestrictionFlags)>,
) {
    let (tx, rx) = unbounded();
    (Arc::new(ChannelRemote { tx }), rx)
}

struct DeadRemote;

impl RemoteCoexCallback for DeadRemote {
    fn on_coex_unsafe_channels_changed(
        &self,
        _channels: &[UnsafeChannel],
        _restrictions: RestrictionFlags,
    ) -> Result<(), RemoteError> {
        Err(RemoteError("peer gone".into()))
    }
}

/// Reports each delivery, then blocks until released.
struct StalledRemote {
    seen: Sender<Vec<UnsafeChannel>>,
    release: Receiver<()>,
}

impl RemoteCoexCallback for StalledRemote {
    fn on_coex_unsafe_channels_changed(
        &self,
        channels: &[UnsafeChannel],
        _restrictions: RestrictionFlags,
    ) -> Result<(), RemoteError> {
        self.seen
            .send(channels.to_vec())
            .map_err(|e| RemoteError(e.to_string()))?;
        self.release.recv().map_err(|e| RemoteError(e.to_string()))
    }
}

#[derive(Default)]
struct RecordingRadio {
    calls: Mutex<Vec<(Vec<UnsafeChannel>, RestrictionFlags)>>,
}

impl RadioControl for RecordingRadio {
    fn set_coex_unsafe_channels(&self, channels: &[UnsafeChannel], restrictions: RestrictionFlags) {
        self.calls
            .lock()
            .unwrap()
            .push((channels.to_vec(), restrictions));
    }
}

#[derive(Default)]
struct CapturingTelephony {
    events: Mutex<Option<CoexEvents>>,
}

impl CapturingTelephony {
    fn events(&self) -> Option<CoexEvents> {
        self.events.lock().unwrap().clone()
    }
}

impl TelephonySource for CapturingTelephony {
    fn register(&self, events: CoexEvents) {
        *self.events.lock().unwrap() = Some(events);
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn table() -> RuleTable {
    RuleTable::from_toml_str(TABLE).unwrap()
}

fn b40(bandwidth_khz: i64) -> CellularChannel {
    CellularChannel::lte(40, 2_399_900, bandwidth_khz)
}

fn b46(bandwidth_khz: i64) -> CellularChannel {
    CellularChannel::lte(46, 5_150_000, bandwidth_khz)
}

fn b27() -> CellularChannel {
    CellularChannel::new(RadioAccessType::Lte, 27, 854_500, 17_000, 809_500, 17_000)
}

fn numbers(channels: &[UnsafeChannel], band: WifiBand) -> Vec<u32> {
    channels
        .iter()
        .filter(|c| c.band == band)
        .map(|c| c.channel)
        .collect()
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    cond()
}

struct Harness {
    engine: CoexEngine,
    events: CoexEvents,
    radio: Arc<RecordingRadio>,
    carriers: Arc<StaticCarrierConfigs>,
}

fn harness() -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let radio = Arc::new(RecordingRadio::default());
    let carriers = Arc::new(StaticCarrierConfigs::new());
    let telephony = Arc::new(CapturingTelephony::default());
    let engine = CoexEngine::with_config(
        &CoexConfig::default(),
        table(),
        CoexCollaborators {
            carrier_configs: carriers.clone(),
            radio: radio.clone(),
            telephony: Some(telephony.clone()),
        },
    );
    let events = telephony.events().expect("telephony registered");
    Harness {
        engine,
        events,
        radio,
        carriers,
    }
}

// ─── Manual override ────────────────────────────────────────────────────

#[test]
fn manual_override_is_published_verbatim() -> Result<()> {
    let h = harness();
    let channels = vec![
        UnsafeChannel::with_power_cap(WifiBand::TwoGhz, 1, -40),
        UnsafeChannel::new(WifiBand::FiveGhz, 149),
        UnsafeChannel::new(WifiBand::SixGhz, 5),
    ];
    h.engine
        .set_coex_unsafe_channels(Some(channels.clone()), 0b011)?;

    let got = h.engine.coex_unsafe_channels();
    assert_eq!(got, channels);
    assert_eq!(got[0].power_cap_dbm, Some(-40));
    assert_eq!(
        h.engine.coex_restrictions(),
        RestrictionFlags::WIFI_DIRECT | RestrictionFlags::SOFTAP
    );

    let radio = h.radio.calls.lock().unwrap();
    assert_eq!(radio.len(), 1);
    assert_eq!(radio[0].0, channels);
    Ok(())
}

#[test]
fn no_op_overrides_keep_previous_snapshot() -> Result<()> {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    h.engine.register_coex_listener(listener.clone())?;

    let channels = vec![UnsafeChannel::new(WifiBand::TwoGhz, 11)];
    h.engine
        .set_coex_unsafe_channels(Some(channels.clone()), 4)?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    h.engine.set_coex_unsafe_channels(None, 0)?;
    h.engine.set_coex_unsafe_channels(Some(Vec::new()), 0)?;
    h.engine.set_coex_unsafe_channels(Some(Vec::new()), 1 << 5)?;
    // Same content again is not a change.
    h.engine
        .set_coex_unsafe_channels(Some(channels.clone()), 4)?;

    assert_eq!(h.engine.coex_unsafe_channels(), channels);
    assert_eq!(h.engine.coex_restrictions(), RestrictionFlags::WIFI_AWARE);
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn power_cap_change_is_a_change() -> Result<()> {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    h.engine.register_coex_listener(listener.clone())?;

    h.engine.set_coex_unsafe_channels(
        Some(vec![UnsafeChannel::with_power_cap(WifiBand::TwoGhz, 6, -50)]),
        0,
    )?;
    h.engine.set_coex_unsafe_channels(
        Some(vec![UnsafeChannel::with_power_cap(WifiBand::TwoGhz, 6, -40)]),
        0,
    )?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    assert_eq!(h.engine.coex_unsafe_channels()[0].power_cap_dbm, Some(-40));
    Ok(())
}

// ─── Subscribers ────────────────────────────────────────────────────────

#[test]
fn remote_receives_current_snapshot_on_registration() -> Result<()> {
    let h = harness();
    let (remote, rx) = channel_remote();
    h.engine.register_remote_coex_callback(remote)?;

    let (channels, restrictions) = rx.recv_timeout(TIMEOUT)?;
    assert!(channels.is_empty());
    assert!(restrictions.is_empty());

    let override_channels = vec![UnsafeChannel::new(WifiBand::FiveGhz, 36)];
    h.engine
        .set_coex_unsafe_channels(Some(override_channels.clone()), 2)?;
    let (channels, restrictions) = rx.recv_timeout(TIMEOUT)?;
    assert_eq!(channels, override_channels);
    assert_eq!(restrictions, RestrictionFlags::SOFTAP);

    // A late subscriber starts from the current state.
    let (late, late_rx) = channel_remote();
    h.engine.register_remote_coex_callback(late)?;
    let (channels, _) = late_rx.recv_timeout(TIMEOUT)?;
    assert_eq!(channels, override_channels);
    Ok(())
}

#[test]
fn unregistered_remote_gets_nothing_more() -> Result<()> {
    let h = harness();
    let (remote, rx) = channel_remote();
    h.engine.register_remote_coex_callback(remote.clone())?;
    rx.recv_timeout(TIMEOUT)?;

    h.engine.unregister_remote_coex_callback(remote)?;
    h.engine
        .set_coex_unsafe_channels(Some(vec![UnsafeChannel::new(WifiBand::TwoGhz, 3)]), 0)?;
    h.events.cell_channels_changed(vec![b40(10_000)])?;

    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    Ok(())
}

#[test]
fn stalled_remote_never_blocks_the_worker() -> Result<()> {
    let h = harness();
    let (seen_tx, seen) = unbounded();
    let (release, release_rx) = unbounded();
    let stalled: Arc<dyn RemoteCoexCallback> = Arc::new(StalledRemote {
        seen: seen_tx,
        release: release_rx,
    });
    let (healthy, rx) = channel_remote();
    h.engine.register_remote_coex_callback(stalled.clone())?;
    h.engine.register_remote_coex_callback(healthy)?;
    seen.recv_timeout(TIMEOUT)?;
    rx.recv_timeout(TIMEOUT)?;

    // Updates pile up behind the stalled delivery.
    let start = Instant::now();
    for channel in 1..=5 {
        let update = vec![UnsafeChannel::new(WifiBand::TwoGhz, channel)];
        h.engine.set_coex_unsafe_channels(Some(update), 0)?;
    }
    h.engine.unregister_remote_coex_callback(stalled)?;
    h.events.cell_channels_changed(vec![b40(10_000)])?;
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz),
        vec![1, 2, 3, 4, 5]
    );

    // The healthy subscriber ends on the latest state.
    let mut last = Vec::new();
    while let Ok((channels, _)) = rx.recv_timeout(Duration::from_millis(300)) {
        last = channels;
    }
    assert_eq!(numbers(&last, WifiBand::TwoGhz), vec![1, 2, 3, 4, 5]);

    // Released after unregistering: no further delivery starts.
    release.send(())?;
    assert!(seen.recv_timeout(Duration::from_millis(300)).is_err());
    Ok(())
}

#[test]
fn unregistered_listener_is_not_signalled() -> Result<()> {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    let as_dyn: Arc<dyn CoexListener> = listener.clone();
    h.engine.register_coex_listener(as_dyn.clone())?;
    h.engine.register_coex_listener(as_dyn.clone())?;

    h.events.cell_channels_changed(vec![b40(10_000)])?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1, "registered once");

    h.engine.unregister_coex_listener(as_dyn)?;
    h.events.cell_channels_changed(vec![b27()])?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn failing_remote_is_unregistered() -> Result<()> {
    let h = harness();
    let (healthy, rx) = channel_remote();
    h.engine.register_remote_coex_callback(Arc::new(DeadRemote))?;
    h.engine.register_remote_coex_callback(healthy)?;
    rx.recv_timeout(TIMEOUT)?;

    assert!(wait_until(|| h
        .engine
        .dump()
        .map(|d| d.contains("remote callbacks: 1"))
        .unwrap_or(false)));

    // The healthy subscriber keeps receiving.
    h.engine
        .set_coex_unsafe_channels(Some(vec![UnsafeChannel::new(WifiBand::TwoGhz, 9)]), 0)?;
    let (channels, _) = rx.recv_timeout(TIMEOUT)?;
    assert_eq!(numbers(&channels, WifiBand::TwoGhz), vec![9]);
    Ok(())
}

// ─── Default algorithm ──────────────────────────────────────────────────

#[test]
fn telephony_reports_drive_snapshot() -> Result<()> {
    let h = harness();
    let (remote, rx) = channel_remote();
    h.engine.register_remote_coex_callback(remote)?;
    rx.recv_timeout(TIMEOUT)?;

    h.events.cell_channels_changed(vec![b40(10_000)])?;
    let expected = vec![1, 2, 3, 4, 5];
    assert_eq!(numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz), expected);
    let (channels, _) = rx.recv_timeout(TIMEOUT)?;
    assert_eq!(numbers(&channels, WifiBand::TwoGhz), expected);

    h.events.cell_channels_changed(vec![b40(2_000_000)])?;
    let wide = numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz);
    assert_eq!(wide.len(), 13);
    assert!(!wide.contains(&6));

    h.events.cell_channels_changed(vec![b27()])?;
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz),
        vec![2, 3, 4, 5, 6, 7]
    );

    let b7 = CellularChannel::new(RadioAccessType::Lte, 7, 2_680_000, 10_000, 2_560_000, 10_000);
    h.events.cell_channels_changed(vec![b7])?;
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz),
        vec![4, 5, 6, 7, 8, 9]
    );

    h.events.cell_channels_changed(Vec::new())?;
    assert!(h.engine.coex_unsafe_channels().is_empty());
    Ok(())
}

#[test]
fn b46_whole_5ghz_band_keeps_channel_36() -> Result<()> {
    let h = harness();
    h.events.cell_channels_changed(vec![b46(10_000)])?;
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::FiveGhz),
        vec![32, 34, 36, 38, 42, 50]
    );

    h.events.cell_channels_changed(vec![b46(2_000_000)])?;
    let five = numbers(&h.engine.coex_unsafe_channels(), WifiBand::FiveGhz);
    assert_eq!(five.len(), channel::channels(WifiBand::FiveGhz).len() - 1);
    assert!(!five.contains(&36));
    Ok(())
}

#[test]
fn mock_channels_pin_result_until_reset() -> Result<()> {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    h.engine.register_coex_listener(listener.clone())?;

    h.engine.set_mock_cell_channels(vec![b40(10_000)])?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    // Real reports are recorded but do not surface.
    h.events.cell_channels_changed(vec![b27()])?;
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz),
        vec![1, 2, 3, 4, 5]
    );
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);

    h.engine.reset_mock_cell_channels()?;
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::TwoGhz),
        vec![2, 3, 4, 5, 6, 7]
    );
    assert_eq!(listener.calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
fn laa_restrictions_follow_carrier_config() -> Result<()> {
    let h = harness();
    h.carriers.set(
        1,
        CarrierConfig {
            avoid_5ghz_softap_for_laa: true,
            avoid_5ghz_wifi_direct_for_laa: true,
        },
    );
    h.events.active_subscription_changed(1)?;
    h.events.cell_channels_changed(vec![b46(1_000)])?;

    assert_eq!(
        h.engine.coex_restrictions(),
        RestrictionFlags::SOFTAP | RestrictionFlags::WIFI_DIRECT
    );
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::FiveGhz).len(),
        channel::channels(WifiBand::FiveGhz).len()
    );

    // Config updates for another subscription are ignored.
    h.carriers.set(2, CarrierConfig::default());
    h.events.carrier_config_changed(2)?;
    assert!(!h.engine.coex_restrictions().is_empty());

    h.carriers.set(1, CarrierConfig::default());
    h.events.carrier_config_changed(1)?;
    assert!(h.engine.coex_restrictions().is_empty());
    assert_eq!(
        numbers(&h.engine.coex_unsafe_channels(), WifiBand::FiveGhz),
        vec![32, 34, 36, 38, 42, 50]
    );

    h.carriers.set(
        1,
        CarrierConfig {
            avoid_5ghz_softap_for_laa: true,
            avoid_5ghz_wifi_direct_for_laa: false,
        },
    );
    h.events.carrier_config_changed(1)?;
    assert_eq!(h.engine.coex_restrictions(), RestrictionFlags::SOFTAP);

    // Unconfigured subscription fails open.
    h.events.active_subscription_changed(5)?;
    assert!(h.engine.coex_restrictions().is_empty());
    Ok(())
}

#[test]
fn unchanged_inputs_do_not_renotify() -> Result<()> {
    let h = harness();
    let listener = Arc::new(CountingListener::default());
    h.engine.register_coex_listener(listener.clone())?;

    h.events.cell_channels_changed(vec![b40(10_000)])?;
    h.events.cell_channels_changed(vec![b40(10_000)])?;
    h.events.active_subscription_changed(3)?;
    h.events.carrier_config_changed(3)?;
    assert_eq!(listener.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.radio.calls.lock().unwrap().len(), 1);
    Ok(())
}

#[test]
fn disabled_algorithm_never_registers_telephony() {
    let telephony = Arc::new(CapturingTelephony::default());
    let config = CoexConfig {
        default_algorithm_enabled: false,
        table_path: None,
    };
    let engine = CoexEngine::with_config(
        &config,
        table(),
        CoexCollaborators {
            telephony: Some(telephony.clone()),
            ..CoexCollaborators::default()
        },
    );
    assert!(!engine.is_default_algorithm_active());
    assert!(telephony.events().is_none());

    // Manual overrides still work.
    engine
        .set_coex_unsafe_channels(Some(vec![UnsafeChannel::new(WifiBand::TwoGhz, 1)]), 0)
        .unwrap();
    assert_eq!(engine.coex_unsafe_channels().len(), 1);
}

#[test]
fn empty_table_never_registers_telephony() {
    let telephony = Arc::new(CapturingTelephony::default());
    let engine = CoexEngine::with_config(
        &CoexConfig::default(),
        RuleTable::from_toml_str_or_empty("not = [valid"),
        CoexCollaborators {
            telephony: Some(telephony.clone()),
            ..CoexCollaborators::default()
        },
    );
    assert!(!engine.is_default_algorithm_active());
    assert!(telephony.events().is_none());
}

#[test]
fn engine_loads_table_from_config_path() -> Result<()> {
    let path = std::env::temp_dir().join(format!("coex_table_{}.toml", std::process::id()));
    std::fs::write(&path, TABLE)?;
    let config =
        CoexConfig::from_toml_str(&format!("table_path = {:?}", path.display().to_string()))
            .map_err(anyhow::Error::msg)?;

    let engine = CoexEngine::from_config(&config, CoexCollaborators::default());
    std::fs::remove_file(&path)?;
    assert!(engine.is_default_algorithm_active());

    engine.set_mock_cell_channels(vec![b40(10_000)])?;
    assert_eq!(engine.coex_unsafe_channels().len(), 5);
    Ok(())
}

#[test]
fn readers_never_see_torn_snapshots() -> Result<()> {
    let h = harness();
    let engine = Arc::new(h.engine);
    let narrow = vec![1, 2, 3, 4, 5];

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            let narrow = narrow.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    let snap = engine.snapshot();
                    let two: Vec<u32> = snap
                        .channels_in(WifiBand::TwoGhz)
                        .map(|c| c.channel)
                        .collect();
                    assert!(
                        two.is_empty() || two == narrow || two.len() == 13,
                        "unexpected snapshot {two:?}"
                    );
                }
            })
        })
        .collect();

    for i in 0..50 {
        let bandwidth = if i % 2 == 0 { 10_000 } else { 2_000_000 };
        h.events.cell_channels_changed(vec![b40(bandwidth)])?;
    }
    for reader in readers {
        reader.join().expect("reader panicked");
    }
    Ok(())
}
