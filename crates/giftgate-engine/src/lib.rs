#![forbid(unsafe_code)]

//! The giftgate tracker engine.
//!
//! A client-side state synchronizer for a tiered free-gift promotion:
//! observes cart total changes, maps totals to gift tiers, drives the
//! selection popup and notification banner, and reconciles selected gifts
//! against the external cart.
//!
//! # Architecture
//!
//! ```text
//! sources (events / store poll / mutation refetch)
//!        │  CartEvent, arrival order
//!        ▼
//!    Engine ── Msg ──► GiftController ── Cmd ──► cart API / session
//!        │                                       store / event sink
//!        └─► NotificationBanner sync after every message
//! ```
//!
//! The controller is the only place state transitions happen; everything
//! else executes its commands or feeds it messages. All failures degrade
//! to "promotion inactive" — nothing here is fatal to the host page.

pub mod cart_api;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod notification;
pub mod popup;
pub mod session;
pub mod source;

pub use cart_api::{CartApi, InMemoryCartApi};
#[cfg(feature = "http")]
pub use cart_api::{HttpCartApi, HttpCartConfig};
pub use config::GiftConfig;
pub use controller::{Cmd, GiftController, Msg};
pub use engine::Engine;
pub use error::{CartError, CartResult, StorageError, StorageResult};
pub use notification::{
    BannerContent, BannerHost, ContainerLocator, ContainerRef, NotificationBanner, NullBannerHost,
};
pub use popup::{GiftPopup, ToggleOutcome};
#[cfg(feature = "session-file")]
pub use session::FileSessionStore;
pub use session::{GiftState, MemorySessionStore, SelectedGifts, SessionSkip, SessionStore};
pub use source::{ReactiveStore, ReactiveStorePoll, SourceManager, TotalSource};
