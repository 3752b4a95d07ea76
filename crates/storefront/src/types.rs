//! Domain types for the storefront store layer.
//!
//! These are the client-side views of the remote API's entities. Branches
//! and availability rows are immutable from the client's perspective; the
//! client only selects branches, never edits them.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use verdura_core::{BranchId, CartLineId, CurrencyCode, Price, ProductId};

/// Default substitution preference for new cart items.
pub const DEFAULT_SUBSTITUTION: &str = "none";

/// A physical retail/fulfillment branch.
///
/// Scopes pricing, stock, and delivery eligibility. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub name: String,
    pub address: String,
    pub phone: String,
    /// Absent coordinates exclude the branch from distance-based resolution.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Optional service radius in kilometers.
    pub coverage_radius_km: Option<f64>,
    pub is_active: bool,
}

impl Branch {
    /// Both coordinates present, so the branch can participate in
    /// distance-based resolution.
    #[must_use]
    pub const fn has_coordinates(&self) -> bool {
        self.latitude.is_some() && self.longitude.is_some()
    }
}

/// A catalog product as the cart needs it.
///
/// Pass-through data from the catalog; the store layer never derives
/// anything from these fields except `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Price,
    pub image_url: Option<String>,
    /// Display unit, e.g. "kg" or "piece".
    pub unit: Option<String>,
}

/// A line in the cart: a product plus quantity and substitution preference.
///
/// At most one `CartItem` per product identity exists in a cart; adding an
/// already-present product increments its quantity instead of duplicating
/// the row. Quantity is at least 1 by construction — a line that would drop
/// to zero is removed instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    pub quantity: u32,
    pub substitution_preference: String,
    /// Server-assigned line identifier, present only for server-persisted
    /// carts.
    pub cart_line_id: Option<CartLineId>,
}

impl CartItem {
    /// Create a new line with the default substitution preference applied
    /// when the caller passes an empty preference.
    #[must_use]
    pub fn new(product: Product, quantity: u32, substitution_preference: &str) -> Self {
        let substitution_preference = if substitution_preference.is_empty() {
            DEFAULT_SUBSTITUTION.to_string()
        } else {
            substitution_preference.to_string()
        };
        Self {
            product,
            quantity,
            substitution_preference,
            cart_line_id: None,
        }
    }

    /// Line total: quantity × unit price.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Per-branch stock and pricing for one product.
///
/// Stock figures are optional: a row without them cannot gate an add and is
/// treated as unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchProduct {
    pub product_id: ProductId,
    pub stock_quantity: Option<i64>,
    pub reserved_quantity: Option<i64>,
    /// Branch-specific price override, if the branch prices differently
    /// from the catalog.
    pub branch_price: Option<Decimal>,
}

impl BranchProduct {
    /// Sellable stock: `max(0, stock - reserved)`, or `None` when the row
    /// carries no stock figure at all.
    #[must_use]
    pub fn available(&self) -> Option<i64> {
        self.stock_quantity
            .map(|stock| (stock - self.reserved_quantity.unwrap_or(0)).max(0))
    }

    /// Branch price override as a `Price` in the storefront currency.
    #[must_use]
    pub fn price_override(&self) -> Option<Price> {
        self.branch_price
            .map(|amount| Price::new(amount, CurrencyCode::default()))
    }
}
