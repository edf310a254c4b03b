#![forbid(unsafe_code)]

//! Cart wire types.
//!
//! Mirrors the storefront cart JSON: a snapshot with a total and line
//! items, each carrying a variant id, quantity, line price and arbitrary
//! string properties. Gift lines are tagged through well-known property
//! keys so reconciliation can tell promotional gifts from paid lines.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize};

use crate::catalog::GiftCatalog;
use crate::tier::{Thresholds, Tier};

/// Property key marking a line item as a promotional gift.
pub const PROP_GIFT_ITEM: &str = "_gift_item";
/// Property key carrying the tier that granted the gift.
pub const PROP_GIFT_TIER: &str = "_gift_tier";
/// Property key carrying the threshold (cents) that was crossed.
pub const PROP_GIFT_THRESHOLD: &str = "_gift_threshold";

/// A product variant identifier.
///
/// The storefront serializes variant ids sometimes as JSON numbers and
/// sometimes as strings; both deserialize into the same canonical string
/// form.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct VariantId(String);

impl VariantId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VariantId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for VariantId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

impl<'de> Deserialize<'de> for VariantId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct IdVisitor;

        impl Visitor<'_> for IdVisitor {
            type Value = VariantId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a variant id as string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<VariantId, E> {
                Ok(VariantId::new(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<VariantId, E> {
                Ok(VariantId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<VariantId, E> {
                Ok(VariantId::new(v.to_string()))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}

/// One cart line item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub variant_id: VariantId,
    pub quantity: u32,
    /// Extended price of the line, in cents.
    #[serde(rename = "line_price")]
    pub line_price_cents: u64,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl CartLine {
    /// Whether this line is tagged as a promotional gift.
    #[must_use]
    pub fn is_gift(&self) -> bool {
        self.properties
            .get(PROP_GIFT_ITEM)
            .is_some_and(|v| v == "true")
    }
}

/// A point-in-time view of the external cart.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Cart total in cents, gifts included.
    #[serde(rename = "total_price")]
    pub total_cents: u64,
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl CartSnapshot {
    /// Cart total excluding lines whose variant matches a catalog gift.
    ///
    /// Matching is by variant id against the catalog, not by property tag:
    /// an untagged line for a gift variant still does not count toward the
    /// promotion, mirroring how the promotion must never fund itself.
    #[must_use]
    pub fn non_gift_total(&self, catalog: &GiftCatalog) -> u64 {
        self.items
            .iter()
            .filter(|line| !catalog.is_gift_variant(&line.variant_id))
            .map(|line| line.line_price_cents)
            .sum()
    }

    /// Variant ids of lines tagged as gifts.
    #[must_use]
    pub fn gift_line_ids(&self) -> Vec<VariantId> {
        self.items
            .iter()
            .filter(|line| line.is_gift())
            .map(|line| line.variant_id.clone())
            .collect()
    }
}

/// An add-to-cart request for one line item.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AddLineRequest {
    #[serde(rename = "id")]
    pub variant_id: VariantId,
    pub quantity: u32,
    pub properties: BTreeMap<String, String>,
}

impl AddLineRequest {
    /// Build the add request for a selected gift.
    ///
    /// Carries the gift tag, tier and threshold as line properties so the
    /// cart echoes them back and reconciliation can identify the line.
    #[must_use]
    pub fn gift(variant_id: VariantId, tier: Tier, thresholds: &Thresholds) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(PROP_GIFT_ITEM.to_owned(), "true".to_owned());
        properties.insert(PROP_GIFT_TIER.to_owned(), tier.slots().to_string());
        properties.insert(
            PROP_GIFT_THRESHOLD.to_owned(),
            thresholds.cents(tier).to_string(),
        );
        Self {
            variant_id,
            quantity: 1,
            properties,
        }
    }
}
