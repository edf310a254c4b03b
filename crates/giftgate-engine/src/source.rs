#![forbid(unsafe_code)]

//! Cart total sources.
//!
//! Every way the tracker can learn about a cart change funnels into one
//! channel of [`CartEvent`]s, processed in arrival order. Sources run on
//! background threads managed by [`SourceManager`]; the engine starts and
//! stops them by reconciling the declared set against what is running.
//!
//! The built-in [`ReactiveStorePoll`] is the documented last resort for
//! host stores that cannot push changes: it samples a [`ReactiveStore`]
//! at a configurable interval and emits an event only when the total
//! actually moved.

use std::collections::HashSet;
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use giftgate_core::event::CartEvent;

/// Stable identifier for a source, used for lifecycle reconciliation.
pub type SourceId = u64;

/// A background producer of cart events.
pub trait TotalSource: Send {
    /// Identifier for deduplication across reconcile cycles.
    fn id(&self) -> SourceId;

    /// Run until the channel closes or the stop signal fires.
    fn run(&self, sender: mpsc::Sender<CartEvent>, stop: StopSignal);
}

/// Cooperative stop signal for a running source.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    fn new() -> (Self, StopTrigger) {
        let inner = Arc::new((Mutex::new(false), Condvar::new()));
        (
            Self {
                inner: inner.clone(),
            },
            StopTrigger { inner },
        )
    }

    /// Whether the stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().expect("stop lock")
    }

    /// Block for up to `duration`; returns `true` if stopped.
    #[must_use]
    pub fn wait_timeout(&self, duration: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().expect("stop lock");
        if *guard {
            return true;
        }
        let (guard, _timeout) = cvar
            .wait_timeout_while(guard, duration, |stopped| !*stopped)
            .expect("stop lock");
        *guard
    }
}

struct StopTrigger {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopTrigger {
    fn stop(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().expect("stop lock") = true;
        cvar.notify_all();
    }
}

struct RunningSource {
    id: SourceId,
    trigger: StopTrigger,
    thread: Option<thread::JoinHandle<()>>,
}

impl RunningSource {
    fn stop(mut self) {
        self.trigger.stop();
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RunningSource {
    fn drop(&mut self) {
        self.trigger.stop();
    }
}

/// Starts, stops and drains cart total sources.
pub struct SourceManager {
    active: Vec<RunningSource>,
    sender: mpsc::Sender<CartEvent>,
    receiver: mpsc::Receiver<CartEvent>,
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceManager {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            active: Vec::new(),
            sender,
            receiver,
        }
    }

    /// A sender external pushers (event bus bridges, store callbacks) can
    /// use to feed the same channel as managed sources.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<CartEvent> {
        self.sender.clone()
    }

    /// Reconcile the running set against `sources`: start new ids, stop
    /// ids no longer declared, leave the rest running.
    pub fn reconcile(&mut self, sources: Vec<Box<dyn TotalSource>>) {
        let wanted: HashSet<SourceId> = sources.iter().map(|s| s.id()).collect();

        let mut remaining = Vec::new();
        for running in self.active.drain(..) {
            if wanted.contains(&running.id) {
                remaining.push(running);
            } else {
                debug!(source_id = running.id, "stopping cart total source");
                running.stop();
            }
        }
        self.active = remaining;

        let mut active_ids: HashSet<SourceId> = self.active.iter().map(|r| r.id).collect();
        for source in sources {
            let id = source.id();
            if !active_ids.insert(id) {
                continue;
            }
            debug!(source_id = id, "starting cart total source");
            let (signal, trigger) = StopSignal::new();
            let sender = self.sender.clone();
            let thread = thread::spawn(move || source.run(sender, signal));
            self.active.push(RunningSource {
                id,
                trigger,
                thread: Some(thread),
            });
        }
    }

    /// Drain pending events in arrival order.
    #[must_use]
    pub fn drain(&self) -> Vec<CartEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block for up to `timeout` waiting for one event, then drain the
    /// rest without blocking.
    #[must_use]
    pub fn drain_timeout(&self, timeout: Duration) -> Vec<CartEvent> {
        let mut events = Vec::new();
        if let Ok(event) = self.receiver.recv_timeout(timeout) {
            events.push(event);
            events.extend(self.drain());
        }
        events
    }

    /// Stop every running source.
    pub fn stop_all(&mut self) {
        for running in self.active.drain(..) {
            running.stop();
        }
    }
}

impl Drop for SourceManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Reactive store polling
// ─────────────────────────────────────────────────────────────────────────

/// A host-provided reactive cart store.
///
/// `subscribe` is preferred: implementations that can push changes invoke
/// the callback with each new total and return `true`. Implementations
/// that cannot return `false`, and the engine falls back to polling
/// through [`ReactiveStorePoll`].
pub trait ReactiveStore: Send + Sync {
    /// Current cart total in cents, `None` if the store has no cart yet.
    fn total_cents(&self) -> Option<u64>;

    /// Register a change callback. Returns `false` when push notification
    /// is unsupported.
    fn subscribe(&self, _callback: Box<dyn Fn(u64) + Send + Sync>) -> bool {
        false
    }
}

/// Interval poll against a [`ReactiveStore`], emitting only on change.
pub struct ReactiveStorePoll {
    store: Arc<dyn ReactiveStore>,
    interval: Duration,
}

impl ReactiveStorePoll {
    /// Fixed source id: there is at most one store poll per engine.
    pub const ID: SourceId = 0x504f_4c4c; // "POLL"

    #[must_use]
    pub fn new(store: Arc<dyn ReactiveStore>, interval: Duration) -> Self {
        Self { store, interval }
    }
}

impl TotalSource for ReactiveStorePoll {
    fn id(&self) -> SourceId {
        Self::ID
    }

    fn run(&self, sender: mpsc::Sender<CartEvent>, stop: StopSignal) {
        let mut last: Option<u64> = None;
        loop {
            if stop.wait_timeout(self.interval) {
                break;
            }
            let Some(total) = self.store.total_cents() else {
                continue;
            };
            if last == Some(total) {
                continue;
            }
            trace!(total_cents = total, "store poll observed new total");
            last = Some(total);
            if sender
                .send(CartEvent::Changed { total_cents: total })
                .is_err()
            {
                break;
            }
        }
    }
}

/// A source that replays a fixed event list, for tests.
pub struct ScriptedSource {
    id: SourceId,
    events: Vec<CartEvent>,
}

impl ScriptedSource {
    #[must_use]
    pub fn new(id: SourceId, events: Vec<CartEvent>) -> Self {
        Self { id, events }
    }
}

impl TotalSource for ScriptedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    fn run(&self, sender: mpsc::Sender<CartEvent>, _stop: StopSignal) {
        for event in &self.events {
            if sender.send(event.clone()).is_err() {
                break;
            }
        }
    }
}
