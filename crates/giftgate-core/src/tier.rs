#![forbid(unsafe_code)]

//! Tiers and spending thresholds.
//!
//! A tier is one of three increasing cart-total thresholds, each unlocking
//! one additional free-gift selection slot. All amounts are integer cents;
//! the storefront wire format never carries fractional or negative totals.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three gift tiers, ordered by spending threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    One,
    Two,
    Three,
}

impl Tier {
    /// All tiers in ascending threshold order.
    pub const ALL: [Tier; 3] = [Tier::One, Tier::Two, Tier::Three];

    /// Cumulative number of gift slots unlocked at this tier (1, 2 or 3).
    #[must_use]
    pub fn slots(self) -> usize {
        match self {
            Tier::One => 1,
            Tier::Two => 2,
            Tier::Three => 3,
        }
    }

    /// Zero-based index into per-tier arrays.
    #[must_use]
    pub fn index(self) -> usize {
        self.slots() - 1
    }

    /// Tiers strictly above this one, ascending.
    #[must_use]
    pub fn above(self) -> &'static [Tier] {
        match self {
            Tier::One => &[Tier::Two, Tier::Three],
            Tier::Two => &[Tier::Three],
            Tier::Three => &[],
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tier{}", self.slots())
    }
}

/// Error raised when threshold configuration is not strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdsError {
    pub tier1: u64,
    pub tier2: u64,
    pub tier3: u64,
}

impl fmt::Display for ThresholdsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thresholds must be strictly increasing: {} < {} < {} does not hold",
            self.tier1, self.tier2, self.tier3
        )
    }
}

impl std::error::Error for ThresholdsError {}

/// The three spending thresholds, in cents, strictly increasing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thresholds {
    tier1: u64,
    tier2: u64,
    tier3: u64,
}

impl Thresholds {
    /// Build a validated threshold set.
    ///
    /// Returns an error unless `tier1 < tier2 < tier3`.
    pub fn new(tier1: u64, tier2: u64, tier3: u64) -> Result<Self, ThresholdsError> {
        if tier1 < tier2 && tier2 < tier3 {
            Ok(Self {
                tier1,
                tier2,
                tier3,
            })
        } else {
            Err(ThresholdsError {
                tier1,
                tier2,
                tier3,
            })
        }
    }

    /// Threshold for a tier, in cents.
    #[must_use]
    pub fn cents(&self, tier: Tier) -> u64 {
        match tier {
            Tier::One => self.tier1,
            Tier::Two => self.tier2,
            Tier::Three => self.tier3,
        }
    }

    /// Highest tier whose threshold is `<= total`, if any.
    #[must_use]
    pub fn eligible(&self, total_cents: u64) -> Option<Tier> {
        Tier::ALL
            .iter()
            .rev()
            .copied()
            .find(|t| total_cents >= self.cents(*t))
    }

    /// Cumulative gift slots unlocked at `total` (0 when below tier 1).
    #[must_use]
    pub fn eligible_slots(&self, total_cents: u64) -> usize {
        self.eligible(total_cents).map_or(0, Tier::slots)
    }

    /// Highest tier newly crossed by a total change, if any.
    ///
    /// A tier counts as crossed when `previous < threshold <= current`.
    /// A single jump over several thresholds reports only the highest one.
    #[must_use]
    pub fn crossed(&self, previous_cents: u64, current_cents: u64) -> Option<Tier> {
        Tier::ALL
            .iter()
            .rev()
            .copied()
            .find(|t| previous_cents < self.cents(*t) && current_cents >= self.cents(*t))
    }
}
