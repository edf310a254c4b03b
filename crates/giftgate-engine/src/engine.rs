#![forbid(unsafe_code)]

//! The engine: wires the controller to its collaborators.
//!
//! Owns the FIFO message queue, executes [`Cmd`]s against the cart API and
//! session store, keeps the notification banner in sync, and manages cart
//! total sources. Everything runs cooperatively on the caller's thread;
//! the only background work is delayed cart fetches and managed sources,
//! both of which deliver back through the same queue so evaluations stay
//! in arrival order.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use giftgate_core::cart::VariantId;
use giftgate_core::catalog::ProductLookup;
use giftgate_core::event::{CartEvent, EventSink, NullSink};

use crate::cart_api::CartApi;
use crate::config::GiftConfig;
use crate::controller::{Cmd, GiftController, Msg};
use crate::notification::{BannerHost, ContainerLocator, NotificationBanner, NullBannerHost};
use crate::session::{SessionStore, StateStore};
use crate::source::{ReactiveStore, ReactiveStorePoll, SourceManager};

/// The assembled gift threshold tracker.
pub struct Engine {
    controller: GiftController,
    api: Arc<dyn CartApi>,
    store: StateStore,
    sink: Arc<dyn EventSink>,
    banner: NotificationBanner,
    banner_host: Arc<dyn BannerHost>,
    sources: SourceManager,
    tx: mpsc::Sender<Msg>,
    rx: mpsc::Receiver<Msg>,
}

impl Engine {
    /// Assemble an engine from its collaborators. Session state is loaded
    /// (or freshly created) here; call [`Engine::start`] to begin
    /// observing the cart.
    #[must_use]
    pub fn new(
        config: GiftConfig,
        api: Arc<dyn CartApi>,
        session_store: Arc<dyn SessionStore>,
    ) -> Self {
        let store = StateStore::new(
            session_store,
            config.state_key.clone(),
            config.skip_key.clone(),
        );
        let state = store.load_state();
        let skipped = store.is_skipped(&state.session_id);
        debug!(
            session_id = %state.session_id,
            skipped,
            "gift tracker session loaded"
        );
        let controller = GiftController::new(config, state, skipped);
        let (tx, rx) = mpsc::channel();
        Self {
            controller,
            api,
            store,
            sink: Arc::new(NullSink),
            banner: NotificationBanner::default(),
            banner_host: Arc::new(NullBannerHost),
            sources: SourceManager::new(),
            tx,
            rx,
        }
    }

    /// Attach an outbound event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Attach the banner host and its container locator strategies.
    #[must_use]
    pub fn with_banner(
        mut self,
        host: Arc<dyn BannerHost>,
        locators: Vec<Box<dyn ContainerLocator>>,
    ) -> Self {
        self.banner_host = host;
        self.banner = NotificationBanner::new(locators);
        self
    }

    #[must_use]
    pub fn controller(&self) -> &GiftController {
        &self.controller
    }

    /// Resolve missing catalog images/prices. Best-effort; unresolved
    /// entries keep their placeholder.
    pub fn hydrate_catalog(&mut self, lookup: &dyn ProductLookup) {
        self.controller.hydrate_catalog(lookup);
    }

    /// Begin observing the cart.
    ///
    /// Performs the initial cart check and, when a reactive store is
    /// provided, either subscribes to its change callback or falls back
    /// to interval polling.
    pub fn start(&mut self, reactive: Option<Arc<dyn ReactiveStore>>) {
        if let Some(store) = reactive {
            let sender = Mutex::new(self.sources.sender());
            let subscribed = store.subscribe(Box::new(move |total_cents| {
                if let Ok(sender) = sender.lock() {
                    let _ = sender.send(CartEvent::Changed { total_cents });
                }
            }));
            if subscribed {
                info!("reactive store subscription active");
            } else {
                let interval = self.controller.config().poll_interval;
                info!(?interval, "reactive store cannot push, falling back to polling");
                self.sources
                    .reconcile(vec![Box::new(ReactiveStorePoll::new(store, interval))]);
            }
        }

        // Initial cart check funnels through the same evaluation path as
        // every later change.
        self.exec(Cmd::FetchCart {
            delay: Duration::ZERO,
        });
        self.pump();
    }

    /// Deliver an external cart event (theme event bus bridge).
    pub fn dispatch(&mut self, event: CartEvent) {
        self.enqueue(Msg::Cart(event));
        self.pump();
    }

    /// Shopper asked to (re)open gift selection from the banner.
    pub fn open_gift_selection(&mut self) {
        self.enqueue(Msg::OpenRequested);
        self.pump();
    }

    /// Toggle an entry in the open popup.
    pub fn toggle_gift(&mut self, id: VariantId) {
        self.enqueue(Msg::Toggle(id));
        self.pump();
    }

    /// Confirm the open popup's selection.
    pub fn confirm_selection(&mut self) {
        self.enqueue(Msg::Confirm);
        self.pump();
    }

    /// Skip gift selection for the rest of the session.
    pub fn skip_selection(&mut self) {
        self.enqueue(Msg::Skip);
        self.pump();
    }

    /// Close the open popup without deciding.
    pub fn dismiss_popup(&mut self) {
        self.enqueue(Msg::Dismiss);
        self.pump();
    }

    /// Process everything currently queued, without blocking.
    pub fn pump(&mut self) {
        loop {
            for event in self.sources.drain() {
                self.enqueue(Msg::Cart(event));
            }
            match self.rx.try_recv() {
                Ok(msg) => self.step(msg),
                Err(_) => break,
            }
        }
    }

    /// Block up to `timeout` for one queued message (e.g. a delayed
    /// fetch result or a poll tick), then drain the rest. Returns whether
    /// anything was processed.
    pub fn pump_wait(&mut self, timeout: Duration) -> bool {
        for event in self.sources.drain_timeout(timeout) {
            self.enqueue(Msg::Cart(event));
        }
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => {
                self.step(msg);
                self.pump();
                true
            }
            Err(_) => {
                let had_sources = {
                    let events = self.sources.drain();
                    let any = !events.is_empty();
                    for event in events {
                        self.enqueue(Msg::Cart(event));
                    }
                    any
                };
                self.pump();
                had_sources
            }
        }
    }

    /// Stop all background sources.
    pub fn shutdown(&mut self) {
        self.sources.stop_all();
    }

    fn enqueue(&self, msg: Msg) {
        // Send can only fail if the receiver is gone, i.e. self is being
        // torn down.
        let _ = self.tx.send(msg);
    }

    fn step(&mut self, msg: Msg) {
        let cmd = self.controller.update(msg);
        self.exec(cmd);
        self.banner
            .sync(self.controller.available_gifts(), self.banner_host.as_ref());
    }

    fn exec(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::None => {}
            Cmd::Batch(cmds) => {
                for cmd in cmds {
                    self.exec(cmd);
                }
            }
            Cmd::FetchCart { delay } => {
                if delay.is_zero() {
                    let result = self.api.fetch();
                    self.enqueue(Msg::CartFetched(result));
                } else {
                    let api = Arc::clone(&self.api);
                    let tx = self.tx.clone();
                    thread::spawn(move || {
                        thread::sleep(delay);
                        let _ = tx.send(Msg::CartFetched(api.fetch()));
                    });
                }
            }
            Cmd::AddGifts(requests) => {
                for request in &requests {
                    if let Err(e) = self.api.add_line(request) {
                        warn!(variant = %request.variant_id, error = %e, "gift add failed");
                    }
                }
                // Reconcile against what actually landed in the cart.
                self.exec(Cmd::FetchCart {
                    delay: self.controller.config().refetch_delay,
                });
            }
            Cmd::RemoveGifts(ids) => {
                self.remove_gift_lines(&ids);
                self.exec(Cmd::FetchCart {
                    delay: self.controller.config().refetch_delay,
                });
            }
            Cmd::RecordSkip => {
                self.store.record_skip(&self.controller.state().session_id);
            }
            Cmd::SaveState => {
                self.store.save_state(self.controller.state());
            }
            Cmd::Emit(event) => {
                self.sink.emit(&event);
            }
        }
    }

    /// Zero out gift lines for the given variants.
    ///
    /// Only lines carrying the gift tag are touched: a variant the
    /// shopper also bought normally is never silently removed.
    fn remove_gift_lines(&self, ids: &[VariantId]) {
        let cart = match self.api.fetch() {
            Ok(cart) => cart,
            Err(e) => {
                warn!(error = %e, "cart fetch for gift removal failed");
                return;
            }
        };
        let updates: std::collections::BTreeMap<VariantId, u32> = cart
            .items
            .iter()
            .filter(|line| line.is_gift() && ids.contains(&line.variant_id))
            .map(|line| (line.variant_id.clone(), 0u32))
            .collect();
        if updates.is_empty() {
            return;
        }
        debug!(count = updates.len(), "removing gift lines");
        if let Err(e) = self.api.update_quantities(&updates) {
            warn!(error = %e, "gift removal failed");
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
