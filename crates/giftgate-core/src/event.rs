#![forbid(unsafe_code)]

//! Event vocabulary between the tracker and its host page.
//!
//! [`CartEvent`] is inbound: the host theme (or a cart total source)
//! notifies the tracker that something about the cart changed.
//! [`GiftEvent`] is outbound: the tracker tells the host what UI state it
//! wants reflected, through an [`EventSink`].

use std::sync::Mutex;

use crate::tier::Tier;

/// Inbound cart notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CartEvent {
    /// The cart total changed; carries the new non-gift total in cents
    /// when the source already computed it, otherwise the raw total.
    Changed { total_cents: u64 },
    /// Something mutated the cart; the tracker should re-fetch and
    /// re-evaluate.
    RefreshRequested,
    /// The cart drawer opened; injection targets may have been recreated.
    DrawerOpened,
}

/// Outbound notifications to the host page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GiftEvent {
    /// A selection popup opened for a tier.
    PopupOpened { tier: Tier, max_selectable: usize },
    /// The open popup closed (confirmed, skipped or dismissed).
    PopupClosed,
    /// The tracker mutated the cart; the host should refresh its cart UI.
    CartRefreshRequested,
}

/// Receives outbound events.
///
/// Implementations bridge to the host page's event bus. Emission is
/// fire-and-forget; sinks must not call back into the tracker.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &GiftEvent);
}

/// Sink that drops every event. Useful for headless operation and tests.
#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: &GiftEvent) {}
}

/// Sink that records events for inspection in tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<GiftEvent>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain recorded events.
    #[must_use]
    pub fn take(&self) -> Vec<GiftEvent> {
        std::mem::take(&mut self.events.lock().expect("sink lock"))
    }
}

impl EventSink for RecordingSink {
    fn emit(&self, event: &GiftEvent) {
        self.events.lock().expect("sink lock").push(event.clone());
    }
}
