//! # Coexistence Engine
//!
//! Owns the coexistence state and serializes every change to it.
//!
//! ## Threading
//!
//! All mutations run on one worker thread (`coex-worker`) fed by a
//! crossbeam channel. Each command carries an acknowledgement sender, and
//! the calling thread blocks until the worker has applied the command and
//! published the result. Readers never touch the worker: they load the last
//! published [`Snapshot`] from an [`ArcSwap`].
//!
//! ```text
//!  CoexEngine ──┐                          ┌──> ArcSwap<Snapshot> ──> getters
//!  CoexEvents ──┼──> Envelope ──> worker ──┼──> RadioControl
//!  (telephony)  ┘     + ack                └──> NotificationHub ──> listeners
//!                                                            └──> remote threads
//! ```
//!
//! ## Default algorithm
//!
//! Unsafe channels are derived from cellular channels only when the
//! configuration enables it and the rule table is non-empty. Otherwise the
//! telephony source is never registered with, calculator triggers are
//! dropped, and only manual overrides produce snapshots.
//!
//! Listener callbacks run on the worker; calling a mutating engine operation
//! from inside one deadlocks.

use std::fmt::Write as _;
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwap;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::calculator;
use crate::cell::{CellChannelTracker, CellularChannel};
use crate::config::CoexConfig;
use crate::error::CoexError;
use crate::notify::{CoexListener, NotificationHub, RemoteCoexCallback};
use crate::restriction::{
    CarrierConfigProvider, CarrierRestrictionPolicy, NoCarrierConfig, RestrictionFlags,
    SubscriptionId,
};
use crate::rules::RuleTable;
use crate::snapshot::{Snapshot, UnsafeChannel};

// ─── Collaborators ──────────────────────────────────────────────────────────

/// Downstream Wi-Fi radio control. Called on the worker after every
/// publish; must not block.
pub trait RadioControl: Send + Sync {
    fn set_coex_unsafe_channels(&self, channels: &[UnsafeChannel], restrictions: RestrictionFlags);
}

pub struct NoopRadioControl;

impl RadioControl for NoopRadioControl {
    fn set_coex_unsafe_channels(
        &self,
        _channels: &[UnsafeChannel],
        _restrictions: RestrictionFlags,
    ) {
    }
}

/// Source of cellular channel, subscription and carrier-config changes.
pub trait TelephonySource: Send + Sync {
    /// Hands the source the sink it reports changes through.
    fn register(&self, events: CoexEvents);
}

pub struct CoexCollaborators {
    pub carrier_configs: Arc<dyn CarrierConfigProvider>,
    pub radio: Arc<dyn RadioControl>,
    pub telephony: Option<Arc<dyn TelephonySource>>,
}

impl Default for CoexCollaborators {
    fn default() -> Self {
        CoexCollaborators {
            carrier_configs: Arc::new(NoCarrierConfig),
            radio: Arc::new(NoopRadioControl),
            telephony: None,
        }
    }
}

// ─── Control messages ───────────────────────────────────────────────────────

enum ControlMessage {
    CellChannelsChanged(Vec<CellularChannel>),
    ActiveSubscriptionChanged(SubscriptionId),
    CarrierConfigChanged(SubscriptionId),
    SetMockCellChannels(Vec<CellularChannel>),
    ResetMockCellChannels,
    SetUnsafeChannels(Option<Vec<UnsafeChannel>>, u32),
    RegisterListener(Arc<dyn CoexListener>),
    UnregisterListener(Arc<dyn CoexListener>),
    RegisterRemote(Arc<dyn RemoteCoexCallback>),
    UnregisterRemote(Arc<dyn RemoteCoexCallback>),
    Dump(Sender<String>),
    Shutdown,
}

struct Envelope {
    msg: ControlMessage,
    ack: Sender<()>,
}

/// Sends a command and waits until the worker has applied it.
fn request(sender: &Sender<Envelope>, msg: ControlMessage) -> Result<(), CoexError> {
    let (ack, done) = bounded(1);
    sender
        .send(Envelope { msg, ack })
        .map_err(|_| CoexError::Stopped)?;
    done.recv().map_err(|_| CoexError::Stopped)
}

/// Cloneable sink the telephony source reports through.
#[derive(Clone)]
pub struct CoexEvents {
    sender: Sender<Envelope>,
}

impl CoexEvents {
    /// Replaces the real cellular channel list.
    pub fn cell_channels_changed(&self, channels: Vec<CellularChannel>) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::CellChannelsChanged(channels))
    }

    pub fn active_subscription_changed(
        &self,
        subscription: SubscriptionId,
    ) -> Result<(), CoexError> {
        request(
            &self.sender,
            ControlMessage::ActiveSubscriptionChanged(subscription),
        )
    }

    /// Carrier configuration of `subscription` changed. Ignored unless it
    /// is the active subscription.
    pub fn carrier_config_changed(&self, subscription: SubscriptionId) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::CarrierConfigChanged(subscription))
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct CoexEngine {
    sender: Sender<Envelope>,
    current: Arc<ArcSwap<Snapshot>>,
    default_algorithm_active: bool,
    handle: Option<thread::JoinHandle<()>>,
}

impl CoexEngine {
    /// Engine with the default configuration and no collaborators.
    pub fn new(table: RuleTable) -> Self {
        Self::with_config(&CoexConfig::default(), table, CoexCollaborators::default())
    }

    /// Engine whose rule table is loaded from `config.table_path`.
    pub fn from_config(config: &CoexConfig, collaborators: CoexCollaborators) -> Self {
        let table = config.load_table();
        Self::with_config(config, table, collaborators)
    }

    pub fn with_config(
        config: &CoexConfig,
        table: RuleTable,
        collaborators: CoexCollaborators,
    ) -> Self {
        let default_algorithm_active = config.default_algorithm_enabled && !table.is_empty();
        info!(
            enabled = config.default_algorithm_enabled,
            table_entries = table.len(),
            active = default_algorithm_active,
            "coex engine starting"
        );

        let current = Arc::new(ArcSwap::from_pointee(Snapshot::default()));
        let state = CoexState {
            table,
            default_algorithm_active,
            tracker: CellChannelTracker::new(),
            policy: CarrierRestrictionPolicy::new(collaborators.carrier_configs),
            current: current.clone(),
            radio: collaborators.radio,
            hub: NotificationHub::new(),
        };

        let (tx, rx) = unbounded();
        let handle = thread::Builder::new()
            .name("coex-worker".into())
            .spawn(move || coex_worker(rx, state))
            .expect("failed to spawn coex worker thread");

        let engine = CoexEngine {
            sender: tx,
            current,
            default_algorithm_active,
            handle: Some(handle),
        };

        match collaborators.telephony {
            Some(telephony) if default_algorithm_active => telephony.register(engine.events()),
            Some(_) => info!("default coex algorithm inactive; not registering with telephony"),
            None => debug!("no telephony source"),
        }
        engine
    }

    /// Sink for telephony-side changes.
    pub fn events(&self) -> CoexEvents {
        CoexEvents {
            sender: self.sender.clone(),
        }
    }

    pub fn is_default_algorithm_active(&self) -> bool {
        self.default_algorithm_active
    }

    /// Replaces the published state with a manual override.
    ///
    /// Ignored, keeping the previous state, when `channels` is `None`,
    /// `restrictions` has undefined bits, or both are empty.
    pub fn set_coex_unsafe_channels(
        &self,
        channels: Option<Vec<UnsafeChannel>>,
        restrictions: u32,
    ) -> Result<(), CoexError> {
        request(
            &self.sender,
            ControlMessage::SetUnsafeChannels(channels, restrictions),
        )
    }

    pub fn coex_unsafe_channels(&self) -> Vec<UnsafeChannel> {
        self.current.load().unsafe_channels.iter().copied().collect()
    }

    pub fn coex_restrictions(&self) -> RestrictionFlags {
        self.current.load().restrictions
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Pins the cellular channels the calculator sees until
    /// [`CoexEngine::reset_mock_cell_channels`].
    pub fn set_mock_cell_channels(&self, channels: Vec<CellularChannel>) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::SetMockCellChannels(channels))
    }

    pub fn reset_mock_cell_channels(&self) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::ResetMockCellChannels)
    }

    pub fn register_coex_listener(&self, listener: Arc<dyn CoexListener>) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::RegisterListener(listener))
    }

    pub fn unregister_coex_listener(
        &self,
        listener: Arc<dyn CoexListener>,
    ) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::UnregisterListener(listener))
    }

    /// Registers a remote subscriber; it receives the current snapshot
    /// right away.
    pub fn register_remote_coex_callback(
        &self,
        callback: Arc<dyn RemoteCoexCallback>,
    ) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::RegisterRemote(callback))
    }

    pub fn unregister_remote_coex_callback(
        &self,
        callback: Arc<dyn RemoteCoexCallback>,
    ) -> Result<(), CoexError> {
        request(&self.sender, ControlMessage::UnregisterRemote(callback))
    }

    /// Human-readable description of the engine state.
    pub fn dump(&self) -> Result<String, CoexError> {
        let (tx, rx) = bounded(1);
        request(&self.sender, ControlMessage::Dump(tx))?;
        rx.recv().map_err(|_| CoexError::Stopped)
    }

    pub fn shutdown(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        let _ = request(&self.sender, ControlMessage::Shutdown);
        let _ = handle.join();
        info!("coex engine stopped");
    }
}

impl Drop for CoexEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ─── Worker ─────────────────────────────────────────────────────────────────

struct CoexState {
    table: RuleTable,
    default_algorithm_active: bool,
    tracker: CellChannelTracker,
    policy: CarrierRestrictionPolicy,
    current: Arc<ArcSwap<Snapshot>>,
    radio: Arc<dyn RadioControl>,
    hub: NotificationHub,
}

impl CoexState {
    /// Returns `false` and logs when calculator triggers are disabled.
    fn algorithm_active(&self, trigger: &str) -> bool {
        if !self.default_algorithm_active {
            warn!(trigger, "default coex algorithm inactive; ignoring");
        }
        self.default_algorithm_active
    }

    fn recompute(&mut self) {
        let snapshot = calculator::compute(
            self.tracker.current(),
            &self.table,
            self.policy.active_subscription(),
            &self.policy,
        );
        self.publish(snapshot);
    }

    fn publish(&mut self, snapshot: Snapshot) {
        if self.current.load().identical(&snapshot) {
            debug!("coex snapshot unchanged");
            return;
        }
        let snapshot = Arc::new(snapshot);
        self.current.store(snapshot.clone());
        info!(
            unsafe_channels = snapshot.unsafe_channels.len(),
            restrictions = %snapshot.restrictions,
            "coex snapshot published"
        );

        let channels: Vec<UnsafeChannel> = snapshot.unsafe_channels.iter().copied().collect();
        self.radio
            .set_coex_unsafe_channels(&channels, snapshot.restrictions);
        self.hub.publish(&snapshot);
    }

    fn dump(&mut self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "default algorithm active: {}", self.default_algorithm_active);
        let _ = writeln!(out, "rule table entries: {}", self.table.len());
        let _ = writeln!(out, "mock cell channels: {}", self.tracker.is_mocked());
        let _ = writeln!(out, "cell channels: {}", self.tracker.current().len());
        for cell in self.tracker.current() {
            let _ = writeln!(out, "  {cell}");
        }
        let _ = writeln!(out, "active subscription: {}", self.policy.active_subscription());
        let _ = writeln!(out, "listeners: {}", self.hub.listener_count());
        let _ = writeln!(out, "remote callbacks: {}", self.hub.remote_count());
        let _ = write!(out, "{}", self.current.load_full());
        out
    }

    /// Applies one command. Returns `false` when the worker should exit.
    fn handle(&mut self, msg: ControlMessage) -> bool {
        match msg {
            ControlMessage::CellChannelsChanged(channels) => {
                if self.algorithm_active("cell channels changed") {
                    debug!(count = channels.len(), "cell channels changed");
                    self.tracker.set_real(channels);
                    self.recompute();
                }
            }
            ControlMessage::ActiveSubscriptionChanged(subscription) => {
                if self.algorithm_active("active subscription changed") {
                    debug!(subscription, "active subscription changed");
                    self.policy.set_active_subscription(subscription);
                    self.recompute();
                }
            }
            ControlMessage::CarrierConfigChanged(subscription) => {
                if subscription != self.policy.active_subscription() {
                    debug!(subscription, "carrier config changed for inactive subscription");
                } else if self.algorithm_active("carrier config changed") {
                    self.policy.refresh();
                    self.recompute();
                }
            }
            ControlMessage::SetMockCellChannels(channels) => {
                if self.algorithm_active("set mock cell channels") {
                    info!(count = channels.len(), "mock cell channels set");
                    self.tracker.set_mock(channels);
                    self.recompute();
                }
            }
            ControlMessage::ResetMockCellChannels => {
                if self.algorithm_active("reset mock cell channels") {
                    info!("mock cell channels cleared");
                    self.tracker.clear_mock();
                    self.recompute();
                }
            }
            ControlMessage::SetUnsafeChannels(channels, restrictions) => {
                match Snapshot::from_manual(channels, restrictions) {
                    Some(snapshot) => self.publish(snapshot),
                    None => warn!(restrictions, "invalid coex unsafe channel override; ignoring"),
                }
            }
            ControlMessage::RegisterListener(listener) => {
                if !self.hub.register_listener(listener) {
                    debug!("coex listener already registered");
                }
            }
            ControlMessage::UnregisterListener(listener) => {
                self.hub.unregister_listener(&listener);
            }
            ControlMessage::RegisterRemote(callback) => {
                let current = self.current.load_full();
                if !self.hub.register_remote(callback, current) {
                    debug!("remote coex callback not registered");
                }
            }
            ControlMessage::UnregisterRemote(callback) => {
                self.hub.unregister_remote(&callback);
            }
            ControlMessage::Dump(reply) => {
                let _ = reply.send(self.dump());
            }
            ControlMessage::Shutdown => {
                self.hub.close_all();
                return false;
            }
        }
        true
    }
}

fn coex_worker(rx: Receiver<Envelope>, mut state: CoexState) {
    while let Ok(Envelope { msg, ack }) = rx.recv() {
        let keep_running = state.handle(msg);
        let _ = ack.send(());
        if !keep_running {
            break;
        }
    }
}
