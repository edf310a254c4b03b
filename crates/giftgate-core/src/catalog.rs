#![forbid(unsafe_code)]

//! The gift catalog: three ordered tiers of selectable products.
//!
//! The catalog is static at runtime. Image URLs and prices may be missing
//! at construction and are resolved lazily through a [`ProductLookup`];
//! lookup failure falls back to a generated placeholder so gift selection
//! is never blocked on product data.

use serde::{Deserialize, Serialize};

use crate::cart::VariantId;
use crate::tier::Tier;

/// One selectable gift product.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftEntry {
    pub variant_id: VariantId,
    pub title: String,
    /// Product handle used for lazy image/price resolution.
    #[serde(default)]
    pub handle: Option<String>,
    /// Resolved image URL; `None` until hydrated.
    #[serde(default)]
    pub image_url: Option<String>,
    /// Price in cents; zero until hydrated (gifts render as free anyway).
    #[serde(default)]
    pub price_cents: u64,
}

impl GiftEntry {
    #[must_use]
    pub fn new(variant_id: impl Into<VariantId>, title: impl Into<String>) -> Self {
        Self {
            variant_id: variant_id.into(),
            title: title.into(),
            handle: None,
            image_url: None,
            price_cents: 0,
        }
    }

    /// Attach the product handle used for hydration.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.handle = Some(handle.into());
        self
    }

    /// Image URL to render, substituting a placeholder when unresolved.
    #[must_use]
    pub fn display_image(&self) -> String {
        self.image_url
            .clone()
            .unwrap_or_else(|| placeholder_image(&self.title))
    }
}

/// Placeholder image URL labelled with the product title.
#[must_use]
pub fn placeholder_image(title: &str) -> String {
    // Percent-encode just enough for a query component.
    let mut encoded = String::with_capacity(title.len());
    for b in title.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(b as char);
            }
            b' ' => encoded.push('+'),
            _ => {
                encoded.push('%');
                encoded.push_str(&format!("{b:02X}"));
            }
        }
    }
    format!("https://via.placeholder.com/300x300/f0f0f0/333333?text={encoded}")
}

/// Resolved product data from a [`ProductLookup`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedProduct {
    pub image_url: Option<String>,
    pub price_cents: u64,
}

/// Resolves image and price for a catalog entry.
///
/// Implementations may hit the storefront product API; returning `None`
/// (product missing, network failure) leaves the entry on its placeholder.
pub trait ProductLookup {
    fn resolve(&self, entry: &GiftEntry) -> Option<ResolvedProduct>;
}

/// The full catalog, grouped into the three tiers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftCatalog {
    tiers: [Vec<GiftEntry>; 3],
}

impl GiftCatalog {
    #[must_use]
    pub fn new(tiers: [Vec<GiftEntry>; 3]) -> Self {
        Self { tiers }
    }

    /// Entries belonging to a single tier.
    #[must_use]
    pub fn tier_entries(&self, tier: Tier) -> &[GiftEntry] {
        &self.tiers[tier.index()]
    }

    /// Entries from tier 1 up to and including `tier`, in tier order.
    pub fn entries_up_to(&self, tier: Tier) -> impl Iterator<Item = &GiftEntry> {
        self.tiers[..=tier.index()].iter().flatten()
    }

    /// Whether a variant id belongs to any gift in the catalog.
    #[must_use]
    pub fn is_gift_variant(&self, id: &VariantId) -> bool {
        self.tiers
            .iter()
            .flatten()
            .any(|entry| entry.variant_id == *id)
    }

    /// Entries offerable for a popup at `tier`: everything up to the tier
    /// minus gifts already selected.
    #[must_use]
    pub fn offerable(&self, tier: Tier, already_selected: &[VariantId]) -> Vec<GiftEntry> {
        self.entries_up_to(tier)
            .filter(|entry| !already_selected.contains(&entry.variant_id))
            .cloned()
            .collect()
    }

    /// Fill in missing image/price data through a lookup.
    ///
    /// Entries the lookup cannot resolve keep their placeholder; hydration
    /// never fails.
    pub fn hydrate(&mut self, lookup: &dyn ProductLookup) {
        for entry in self.tiers.iter_mut().flatten() {
            if entry.image_url.is_some() && entry.price_cents > 0 {
                continue;
            }
            if let Some(resolved) = lookup.resolve(entry) {
                if entry.image_url.is_none() {
                    entry.image_url = resolved.image_url;
                }
                if entry.price_cents == 0 {
                    entry.price_cents = resolved.price_cents;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> GiftCatalog {
        GiftCatalog::new([
            vec![
                GiftEntry::new("100", "Pomodoro Timer"),
                GiftEntry::new("101", "Highlighter Set"),
            ],
            vec![GiftEntry::new("200", "Expansion Pack")],
            vec![GiftEntry::new("300", "Gratitude Journal")],
        ])
    }

    struct FixedLookup;

    impl ProductLookup for FixedLookup {
        fn resolve(&self, entry: &GiftEntry) -> Option<ResolvedProduct> {
            (entry.variant_id.as_str() == "100").then(|| ResolvedProduct {
                image_url: Some("https://cdn.example/timer.jpg".into()),
                price_cents: 1500,
            })
        }
    }

    #[test]
    fn offerable_accumulates_lower_tiers() {
        let c = catalog();
        assert_eq!(c.offerable(Tier::One, &[]).len(), 2);
        assert_eq!(c.offerable(Tier::Three, &[]).len(), 4);
    }

    #[test]
    fn offerable_excludes_selected() {
        let c = catalog();
        let selected = vec![VariantId::new("101")];
        let offered = c.offerable(Tier::Two, &selected);
        assert_eq!(offered.len(), 2);
        assert!(offered.iter().all(|e| e.variant_id != selected[0]));
    }

    #[test]
    fn gift_variant_membership() {
        let c = catalog();
        assert!(c.is_gift_variant(&VariantId::new("300")));
        assert!(!c.is_gift_variant(&VariantId::new("999")));
    }

    #[test]
    fn hydrate_fills_resolved_and_keeps_placeholders() {
        let mut c = catalog();
        c.hydrate(&FixedLookup);
        let timer = &c.tier_entries(Tier::One)[0];
        assert_eq!(timer.display_image(), "https://cdn.example/timer.jpg");
        assert_eq!(timer.price_cents, 1500);

        let journal = &c.tier_entries(Tier::Three)[0];
        assert!(journal.display_image().contains("placeholder"));
        assert!(journal.display_image().contains("Gratitude+Journal"));
    }
}
