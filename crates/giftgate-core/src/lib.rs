#![forbid(unsafe_code)]

//! Domain types for giftgate.
//!
//! This crate holds the pure data model of the tiered free-gift promotion:
//! tiers and thresholds, the gift catalog, cart snapshots, and the event
//! vocabulary. It performs no I/O; everything that talks to a cart API,
//! session storage, or a host page lives in `giftgate-engine`.

pub mod cart;
pub mod catalog;
pub mod event;
pub mod tier;

pub use cart::{AddLineRequest, CartLine, CartSnapshot, VariantId};
pub use catalog::{GiftCatalog, GiftEntry, ProductLookup, ResolvedProduct};
pub use event::{CartEvent, EventSink, GiftEvent, NullSink, RecordingSink};
pub use tier::{Thresholds, ThresholdsError, Tier};
