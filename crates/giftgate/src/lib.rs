#![forbid(unsafe_code)]

//! Public facade for the giftgate tiered free-gift tracker.
//!
//! Re-exports the domain types from `giftgate-core` and the engine from
//! `giftgate-engine`. Most embedders only need [`prelude`].

pub use giftgate_core as core;
pub use giftgate_engine as engine;

/// Everything needed to assemble and drive a tracker.
pub mod prelude {
    pub use giftgate_core::cart::{AddLineRequest, CartLine, CartSnapshot, VariantId};
    pub use giftgate_core::catalog::{GiftCatalog, GiftEntry, ProductLookup, ResolvedProduct};
    pub use giftgate_core::event::{CartEvent, EventSink, GiftEvent, NullSink, RecordingSink};
    pub use giftgate_core::tier::{Thresholds, ThresholdsError, Tier};

    pub use giftgate_engine::cart_api::{CartApi, InMemoryCartApi};
    #[cfg(feature = "http")]
    pub use giftgate_engine::cart_api::{HttpCartApi, HttpCartConfig};
    pub use giftgate_engine::config::GiftConfig;
    pub use giftgate_engine::engine::Engine;
    pub use giftgate_engine::notification::{
        BannerContent, BannerHost, ContainerLocator, ContainerRef, NullBannerHost,
    };
    pub use giftgate_engine::popup::{GiftPopup, ToggleOutcome};
    #[cfg(feature = "session-file")]
    pub use giftgate_engine::session::FileSessionStore;
    pub use giftgate_engine::session::{GiftState, MemorySessionStore, SessionStore};
    pub use giftgate_engine::source::{ReactiveStore, ReactiveStorePoll};
}
