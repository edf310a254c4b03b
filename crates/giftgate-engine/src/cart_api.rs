#![forbid(unsafe_code)]

//! The external cart API boundary.
//!
//! The cart owns authoritative contents; the tracker only reads snapshots
//! and issues add/update requests through [`CartApi`]. All mutation paths
//! go through this one seam so the engine can observe its own side effects
//! without intercepting the host's network layer.
//!
//! [`InMemoryCartApi`] mimics the hosted cart for tests and headless use.
//! [`HttpCartApi`] (feature `http`) talks to the storefront endpoints with
//! a blocking client and a bounded timeout.

use std::collections::BTreeMap;
use std::sync::Mutex;

use giftgate_core::cart::{AddLineRequest, CartLine, CartSnapshot, VariantId};

use crate::error::{CartError, CartResult};

/// Read and mutate the external cart.
pub trait CartApi: Send + Sync {
    /// Fetch the current cart.
    fn fetch(&self) -> CartResult<CartSnapshot>;

    /// Add one line item.
    fn add_line(&self, request: &AddLineRequest) -> CartResult<()>;

    /// Set quantities per variant id; zero removes the line.
    fn update_quantities(&self, updates: &BTreeMap<VariantId, u32>) -> CartResult<()>;
}

// ─────────────────────────────────────────────────────────────────────────
// In-memory implementation
// ─────────────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Line {
    variant_id: VariantId,
    quantity: u32,
    unit_price_cents: u64,
    properties: BTreeMap<String, String>,
}

/// An in-memory cart following the hosted cart's semantics.
///
/// Adding an existing variant increments its quantity; updating to zero
/// removes the line; the total is the sum of extended line prices.
#[derive(Debug, Default)]
pub struct InMemoryCartApi {
    lines: Mutex<Vec<Line>>,
    /// Unit prices for known variants, used when lines are added.
    prices: Mutex<BTreeMap<VariantId, u64>>,
}

impl InMemoryCartApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a unit price for a variant (gifts default to zero).
    pub fn set_price(&self, variant_id: impl Into<VariantId>, unit_price_cents: u64) {
        self.prices
            .lock()
            .expect("cart lock")
            .insert(variant_id.into(), unit_price_cents);
    }

    /// Seed a regular (non-gift) purchase line.
    pub fn add_paid_line(
        &self,
        variant_id: impl Into<VariantId>,
        quantity: u32,
        unit_price_cents: u64,
    ) {
        let variant_id = variant_id.into();
        self.set_price(variant_id.clone(), unit_price_cents);
        self.lines.lock().expect("cart lock").push(Line {
            variant_id,
            quantity,
            unit_price_cents,
            properties: BTreeMap::new(),
        });
    }

    /// Remove every line (shopper emptied the cart).
    pub fn clear(&self) {
        self.lines.lock().expect("cart lock").clear();
    }
}

impl CartApi for InMemoryCartApi {
    fn fetch(&self) -> CartResult<CartSnapshot> {
        let lines = self.lines.lock().expect("cart lock");
        let items: Vec<CartLine> = lines
            .iter()
            .map(|line| CartLine {
                variant_id: line.variant_id.clone(),
                quantity: line.quantity,
                line_price_cents: line.unit_price_cents * u64::from(line.quantity),
                properties: line.properties.clone(),
            })
            .collect();
        let total_cents = items.iter().map(|i| i.line_price_cents).sum();
        Ok(CartSnapshot { total_cents, items })
    }

    fn add_line(&self, request: &AddLineRequest) -> CartResult<()> {
        let mut lines = self.lines.lock().expect("cart lock");
        if let Some(line) = lines.iter_mut().find(|l| {
            l.variant_id == request.variant_id && l.properties == request.properties
        }) {
            line.quantity += request.quantity;
            return Ok(());
        }
        let unit_price_cents = self
            .prices
            .lock()
            .expect("cart lock")
            .get(&request.variant_id)
            .copied()
            .unwrap_or(0);
        lines.push(Line {
            variant_id: request.variant_id.clone(),
            quantity: request.quantity,
            unit_price_cents,
            properties: request.properties.clone(),
        });
        Ok(())
    }

    fn update_quantities(&self, updates: &BTreeMap<VariantId, u32>) -> CartResult<()> {
        let mut lines = self.lines.lock().expect("cart lock");
        for (variant_id, quantity) in updates {
            if *quantity == 0 {
                lines.retain(|l| l.variant_id != *variant_id);
            } else {
                for line in lines.iter_mut().filter(|l| l.variant_id == *variant_id) {
                    line.quantity = *quantity;
                }
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────
// HTTP implementation (feature "http")
// ─────────────────────────────────────────────────────────────────────────

#[cfg(feature = "http")]
mod http {
    use super::*;
    use std::time::Duration;

    use giftgate_core::catalog::{GiftEntry, ProductLookup, ResolvedProduct};
    use serde::Serialize;
    use tracing::warn;

    /// Configuration for the storefront HTTP client.
    #[derive(Clone, Debug)]
    pub struct HttpCartConfig {
        /// Base URL of the storefront, no trailing slash.
        pub base_url: String,
        /// Per-request timeout.
        pub timeout: Duration,
    }

    impl Default for HttpCartConfig {
        fn default() -> Self {
            Self {
                base_url: String::new(),
                timeout: Duration::from_secs(10),
            }
        }
    }

    /// Blocking HTTP client for the storefront cart endpoints.
    #[derive(Debug)]
    pub struct HttpCartApi {
        config: HttpCartConfig,
        client: reqwest::blocking::Client,
    }

    #[derive(Serialize)]
    struct UpdatePayload<'a> {
        updates: &'a BTreeMap<VariantId, u32>,
    }

    impl HttpCartApi {
        pub fn new(config: HttpCartConfig) -> CartResult<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(config.timeout)
                .build()
                .map_err(|e| CartError::Network(e.to_string()))?;
            Ok(Self { config, client })
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.config.base_url, path)
        }

        fn check(response: reqwest::blocking::Response) -> CartResult<reqwest::blocking::Response> {
            let status = response.status();
            if status.is_success() {
                Ok(response)
            } else {
                Err(CartError::Status(status.as_u16()))
            }
        }
    }

    impl CartApi for HttpCartApi {
        fn fetch(&self) -> CartResult<CartSnapshot> {
            let response = self
                .client
                .get(self.url("/cart.js"))
                .send()
                .map_err(|e| CartError::Network(e.to_string()))?;
            Self::check(response)?
                .json::<CartSnapshot>()
                .map_err(|e| CartError::Decode(e.to_string()))
        }

        fn add_line(&self, request: &AddLineRequest) -> CartResult<()> {
            let response = self
                .client
                .post(self.url("/cart/add.js"))
                .json(request)
                .send()
                .map_err(|e| CartError::Network(e.to_string()))?;
            Self::check(response).map(|_| ())
        }

        fn update_quantities(&self, updates: &BTreeMap<VariantId, u32>) -> CartResult<()> {
            let response = self
                .client
                .post(self.url("/cart/update.js"))
                .json(&UpdatePayload { updates })
                .send()
                .map_err(|e| CartError::Network(e.to_string()))?;
            Self::check(response).map(|_| ())
        }
    }

    /// Product data shape returned by `/products/{handle}.js`, reduced to
    /// the fields the catalog needs.
    #[derive(serde::Deserialize)]
    struct ProductData {
        #[serde(default)]
        featured_image: Option<String>,
        #[serde(default)]
        variants: Vec<ProductVariant>,
    }

    #[derive(serde::Deserialize)]
    struct ProductVariant {
        id: VariantId,
        #[serde(default)]
        price: u64,
        #[serde(default)]
        featured_image: Option<VariantImage>,
    }

    #[derive(serde::Deserialize)]
    struct VariantImage {
        #[serde(default)]
        src: Option<String>,
    }

    impl ProductLookup for HttpCartApi {
        fn resolve(&self, entry: &GiftEntry) -> Option<ResolvedProduct> {
            let handle = entry.handle.as_deref()?;
            let url = self.url(&format!("/products/{handle}.js"));
            let product = self
                .client
                .get(&url)
                .send()
                .and_then(reqwest::blocking::Response::error_for_status)
                .and_then(reqwest::blocking::Response::json::<ProductData>)
                .map_err(|e| {
                    warn!(handle, error = %e, "product lookup failed, using placeholder");
                })
                .ok()?;

            match product
                .variants
                .iter()
                .find(|v| v.id == entry.variant_id)
            {
                Some(variant) => Some(ResolvedProduct {
                    image_url: variant
                        .featured_image
                        .as_ref()
                        .and_then(|img| img.src.clone())
                        .or(product.featured_image),
                    price_cents: variant.price,
                }),
                None => Some(ResolvedProduct {
                    image_url: product.featured_image,
                    price_cents: 0,
                }),
            }
        }
    }

}

#[cfg(feature = "http")]
pub use http::{HttpCartApi, HttpCartConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use giftgate_core::tier::{Thresholds, Tier};

    #[test]
    fn add_then_fetch_reflects_lines() {
        let cart = InMemoryCartApi::new();
        cart.add_paid_line("900", 2, 2250);
        let th = Thresholds::new(4500, 6000, 8500).unwrap();
        cart.add_line(&AddLineRequest::gift("100".into(), Tier::One, &th))
            .unwrap();

        let snapshot = cart.fetch().unwrap();
        assert_eq!(snapshot.total_cents, 4500);
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.gift_line_ids(), vec![VariantId::new("100")]);
    }

    #[test]
    fn adding_same_gift_twice_increments_quantity() {
        let cart = InMemoryCartApi::new();
        let th = Thresholds::new(4500, 6000, 8500).unwrap();
        let req = AddLineRequest::gift("100".into(), Tier::One, &th);
        cart.add_line(&req).unwrap();
        cart.add_line(&req).unwrap();
        let snapshot = cart.fetch().unwrap();
        assert_eq!(snapshot.items.len(), 1);
        assert_eq!(snapshot.items[0].quantity, 2);
    }

    #[test]
    fn zero_quantity_removes_line() {
        let cart = InMemoryCartApi::new();
        cart.add_paid_line("900", 1, 4500);
        let mut updates = BTreeMap::new();
        updates.insert(VariantId::new("900"), 0u32);
        cart.update_quantities(&updates).unwrap();
        assert!(cart.fetch().unwrap().items.is_empty());
    }
}
