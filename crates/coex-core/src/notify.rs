//! # Notification Hub
//!
//! Fan-out of published snapshots to two kinds of subscribers:
//!
//! - **Listeners**: in-process [`CoexListener`]s receive a bare "changed"
//!   signal and read the engine getters themselves. They are called on the
//!   engine worker, in registration order.
//! - **Remote callbacks**: [`RemoteCoexCallback`]s receive the full payload.
//!   Each has its own delivery thread, so a slow subscriber never holds up
//!   the worker or the other subscribers.
//!
//! A remote subscriber holds at most one pending snapshot. Publishing
//! replaces it and wakes the delivery thread, so a subscriber that falls
//! behind skips intermediate states and gets the latest one next.
//!
//! Every remote subscriber has an open flag, checked right before each
//! delivery. Unregistering clears it without waiting, so once
//! [`NotificationHub::unregister_remote`] returns no new delivery starts.
//! A delivery already running finishes on its own thread. A failed delivery
//! clears the flag too and reports the subscriber for removal.
//!
//! Identity for both registries is `Arc` pointer identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use arc_swap::ArcSwapOption;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::error::RemoteError;
use crate::restriction::RestrictionFlags;
use crate::snapshot::{Snapshot, UnsafeChannel};

/// In-process change listener.
pub trait CoexListener: Send + Sync {
    /// Called on the engine worker after a new snapshot is published. Must
    /// not call mutating engine operations.
    fn on_coex_unsafe_channels_changed(&self);
}

/// Subscriber in another component that wants the full snapshot.
pub trait RemoteCoexCallback: Send + Sync {
    /// Called on the subscriber's delivery thread. An error unregisters the
    /// subscriber. Must not synchronously unregister itself.
    fn on_coex_unsafe_channels_changed(
        &self,
        channels: &[UnsafeChannel],
        restrictions: RestrictionFlags,
    ) -> Result<(), RemoteError>;
}

fn same_object<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

struct RemoteSubscriber {
    id: u64,
    callback: Arc<dyn RemoteCoexCallback>,
    pending: Arc<ArcSwapOption<Snapshot>>,
    wake: Sender<()>,
    open: Arc<AtomicBool>,
}

impl RemoteSubscriber {
    /// Replaces the pending snapshot. Returns `false` once the delivery
    /// thread is gone.
    fn offer(&self, snapshot: Arc<Snapshot>) -> bool {
        self.pending.store(Some(snapshot));
        !matches!(self.wake.try_send(()), Err(TrySendError::Disconnected(())))
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
    }
}

pub struct NotificationHub {
    listeners: Vec<Arc<dyn CoexListener>>,
    remotes: Vec<RemoteSubscriber>,
    next_id: u64,
    dead_tx: Sender<u64>,
    dead_rx: Receiver<u64>,
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationHub {
    pub fn new() -> Self {
        let (dead_tx, dead_rx) = unbounded();
        NotificationHub {
            listeners: Vec::new(),
            remotes: Vec::new(),
            next_id: 0,
            dead_tx,
            dead_rx,
        }
    }

    /// Returns `false` if the listener was already registered.
    pub fn register_listener(&mut self, listener: Arc<dyn CoexListener>) -> bool {
        if self.listeners.iter().any(|l| same_object(l, &listener)) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    pub fn unregister_listener(&mut self, listener: &Arc<dyn CoexListener>) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|l| !same_object(l, listener));
        self.listeners.len() != before
    }

    /// Registers a remote subscriber and hands `current` to it.
    ///
    /// Returns `false` if the callback was already registered or its
    /// delivery thread could not be started.
    pub fn register_remote(
        &mut self,
        callback: Arc<dyn RemoteCoexCallback>,
        current: Arc<Snapshot>,
    ) -> bool {
        self.reap();
        if self.remotes.iter().any(|r| same_object(&r.callback, &callback)) {
            return false;
        }

        let id = self.next_id;
        self.next_id += 1;
        let (wake, wake_rx) = bounded(1);
        let remote = RemoteSubscriber {
            id,
            callback,
            pending: Arc::new(ArcSwapOption::empty()),
            wake,
            open: Arc::new(AtomicBool::new(true)),
        };

        let spawned = {
            let delivery = Delivery {
                id,
                callback: remote.callback.clone(),
                pending: remote.pending.clone(),
                open: remote.open.clone(),
                dead: self.dead_tx.clone(),
            };
            thread::Builder::new()
                .name(format!("coex-remote-{id}"))
                .spawn(move || delivery.run(wake_rx))
        };
        if let Err(err) = spawned {
            warn!(error = %err, "failed to start remote coex delivery thread");
            return false;
        }

        remote.offer(current);
        self.remotes.push(remote);
        debug!(id, remotes = self.remotes.len(), "remote coex callback registered");
        true
    }

    /// Stops delivery to `callback` without waiting for a delivery in
    /// progress. No new delivery starts after this returns.
    pub fn unregister_remote(&mut self, callback: &Arc<dyn RemoteCoexCallback>) -> bool {
        self.reap();
        let Some(pos) = self
            .remotes
            .iter()
            .position(|r| same_object(&r.callback, callback))
        else {
            return false;
        };
        let remote = self.remotes.remove(pos);
        remote.close();
        debug!(id = remote.id, "remote coex callback unregistered");
        true
    }

    /// Signals every listener and hands `snapshot` to every remote.
    pub fn publish(&mut self, snapshot: &Arc<Snapshot>) {
        for listener in &self.listeners {
            listener.on_coex_unsafe_channels_changed();
        }
        self.reap();
        for remote in &self.remotes {
            if !remote.offer(snapshot.clone()) {
                let _ = self.dead_tx.send(remote.id);
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn remote_count(&mut self) -> usize {
        self.reap();
        self.remotes.len()
    }

    /// Drops every subscriber. Used on engine shutdown.
    pub fn close_all(&mut self) {
        for remote in self.remotes.drain(..) {
            remote.close();
        }
        self.listeners.clear();
    }

    fn reap(&mut self) {
        while let Ok(id) = self.dead_rx.try_recv() {
            if let Some(pos) = self.remotes.iter().position(|r| r.id == id) {
                let remote = self.remotes.remove(pos);
                remote.close();
                info!(id, "remote coex callback unreachable; unregistered");
            }
        }
    }
}

struct Delivery {
    id: u64,
    callback: Arc<dyn RemoteCoexCallback>,
    pending: Arc<ArcSwapOption<Snapshot>>,
    open: Arc<AtomicBool>,
    dead: Sender<u64>,
}

impl Delivery {
    /// Runs until the subscriber is dropped from the hub or a delivery
    /// fails.
    fn run(self, wake: Receiver<()>) {
        while wake.recv().is_ok() {
            let Some(snapshot) = self.pending.swap(None) else {
                continue;
            };
            if !self.open.load(Ordering::Acquire) {
                break;
            }
            let channels: Vec<UnsafeChannel> = snapshot.unsafe_channels.iter().copied().collect();
            if let Err(err) = self
                .callback
                .on_coex_unsafe_channels_changed(&channels, snapshot.restrictions)
            {
                debug!(id = self.id, error = %err, "remote coex delivery failed");
                self.open.store(false, Ordering::Release);
                let _ = self.dead.send(self.id);
                break;
            }
        }
    }
}
