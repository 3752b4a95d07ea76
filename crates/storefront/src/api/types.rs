//! Wire types for the Verdura API.
//!
//! The API wraps most payloads in a `{"data": ...}` envelope, but some
//! deployments return bare arrays from the branch listing, so list
//! endpoints accept both shapes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Standard `{"data": ...}` response envelope.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

/// A payload that may or may not be wrapped in the `data` envelope.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MaybeEnveloped<T> {
    Wrapped(Envelope<T>),
    Bare(T),
}

impl<T> MaybeEnveloped<T> {
    /// Unwrap to the inner payload regardless of shape.
    pub fn into_inner(self) -> T {
        match self {
            Self::Wrapped(envelope) => envelope.data,
            Self::Bare(inner) => inner,
        }
    }
}

/// A branch as the API serves it.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchDto {
    pub id: i64,
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub coverage_radius_km: Option<f64>,
    /// Absent means active.
    pub is_active: Option<bool>,
}

/// Response of the authoritative nearest-branch endpoint.
#[derive(Debug, Deserialize)]
pub struct NearestBranchResponse {
    pub data: BranchDto,
    pub distance_km: Option<f64>,
}

/// One stock/price row from the per-branch product listing.
#[derive(Debug, Clone, Deserialize)]
pub struct BranchProductDto {
    pub product_id: i64,
    pub stock_quantity: Option<i64>,
    pub reserved_quantity: Option<i64>,
    pub branch_price: Option<Decimal>,
}

/// One line of a server-persisted cart.
#[derive(Debug, Clone, Deserialize)]
pub struct CartLineDto {
    /// Server-assigned cart line identifier.
    pub id: Option<i64>,
    pub product_id: i64,
    pub product_name: String,
    pub unit_price: Decimal,
    pub image_url: Option<String>,
    pub unit: Option<String>,
    pub quantity: u32,
    pub substitution_preference: Option<String>,
}

// =============================================================================
// Request bodies
// =============================================================================

/// Body for adding a quantity delta to a cart line.
#[derive(Debug, Serialize)]
pub struct CartAddRequest {
    pub user_id: i64,
    pub branch_id: Option<i64>,
    pub product_id: i64,
    pub quantity: u32,
    pub substitution_preference: String,
}

/// Body for setting a cart line to an absolute quantity.
#[derive(Debug, Serialize)]
pub struct CartUpdateRequest {
    pub user_id: i64,
    pub branch_id: Option<i64>,
    pub quantity: u32,
    pub substitution_preference: String,
}

/// Body for adding/removing a favorite.
#[derive(Debug, Serialize)]
pub struct FavoriteRequest {
    pub user_id: i64,
    pub product_id: i64,
}
