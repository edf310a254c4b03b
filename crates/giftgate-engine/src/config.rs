#![forbid(unsafe_code)]

//! Engine configuration.

use std::time::Duration;

use giftgate_core::catalog::GiftCatalog;
use giftgate_core::tier::Thresholds;

/// Storage key for the gift state record.
pub const DEFAULT_STATE_KEY: &str = "tiered_gift_state";
/// Storage key for the session skip record.
pub const DEFAULT_SKIP_KEY: &str = "tiered_gift_session_skip";

/// Static configuration for one tracker instance.
#[derive(Clone, Debug)]
pub struct GiftConfig {
    pub thresholds: Thresholds,
    pub catalog: GiftCatalog,
    /// Reactive store polling interval (last-resort source).
    pub poll_interval: Duration,
    /// Delay between a cart mutation and the reconciling re-fetch, giving
    /// the hosted cart time to settle.
    pub refetch_delay: Duration,
    pub state_key: String,
    pub skip_key: String,
}

impl GiftConfig {
    #[must_use]
    pub fn new(thresholds: Thresholds, catalog: GiftCatalog) -> Self {
        Self {
            thresholds,
            catalog,
            poll_interval: Duration::from_secs(1),
            refetch_delay: Duration::from_millis(500),
            state_key: DEFAULT_STATE_KEY.to_owned(),
            skip_key: DEFAULT_SKIP_KEY.to_owned(),
        }
    }

    /// Override the reactive store polling interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Override the post-mutation re-fetch delay.
    #[must_use]
    pub fn with_refetch_delay(mut self, delay: Duration) -> Self {
        self.refetch_delay = delay;
        self
    }
}
