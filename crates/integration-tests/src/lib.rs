//! Test support for the store layer.
//!
//! [`FakeApi`] is an in-memory implementation of the three collaborator
//! traits. It keeps a server-side cart and favorites list per user, serves
//! a configurable branch catalog, records every write call, and can be
//! flipped into failure modes per endpoint family. The actual tests live
//! under `tests/`.

// Lock poisoning cannot happen in single-threaded test support.
#![allow(clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;

use verdura_core::{BranchId, CurrencyCode, Price, ProductId, UserId};
use verdura_storefront::api::{
    ApiError, BranchApi, CartApi, FavoritesApi, NearestBranch,
};
use verdura_storefront::types::{Branch, BranchProduct, CartItem, Product};

/// Route store-layer tracing to the test writer.
///
/// Safe to call from every test; only the first call installs a
/// subscriber. `RUST_LOG` overrides the default `info` filter.
pub fn init_test_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Builders
// =============================================================================

/// A branch with coordinates.
#[must_use]
pub fn branch(id: i64, name: &str, lat: f64, lng: f64) -> Branch {
    Branch {
        id: BranchId::new(id),
        name: name.to_string(),
        address: format!("{name} St."),
        phone: String::new(),
        latitude: Some(lat),
        longitude: Some(lng),
        coverage_radius_km: Some(10.0),
        is_active: true,
    }
}

/// A branch without coordinates.
#[must_use]
pub fn branch_without_location(id: i64, name: &str) -> Branch {
    Branch {
        latitude: None,
        longitude: None,
        coverage_radius_km: None,
        ..branch(id, name, 0.0, 0.0)
    }
}

/// A product priced in piasters (scale 2).
#[must_use]
pub fn product(id: i64, piasters: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("product-{id}"),
        price: Price::new(Decimal::new(piasters, 2), CurrencyCode::EGP),
        image_url: None,
        unit: None,
    }
}

/// An availability row.
#[must_use]
pub fn stock_row(product_id: i64, stock: i64, reserved: i64) -> BranchProduct {
    BranchProduct {
        product_id: ProductId::new(product_id),
        stock_quantity: Some(stock),
        reserved_quantity: Some(reserved),
        branch_price: None,
    }
}

// =============================================================================
// Recorded calls
// =============================================================================

/// One recorded `add_item` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddCall {
    pub user: UserId,
    pub branch: Option<BranchId>,
    pub product: ProductId,
    pub quantity: u32,
    pub substitution_preference: String,
}

/// One recorded `update_item` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateCall {
    pub user: UserId,
    pub branch: Option<BranchId>,
    pub product: ProductId,
    pub quantity: u32,
    pub substitution_preference: String,
}

// =============================================================================
// FakeApi
// =============================================================================

#[derive(Default)]
struct FakeApiState {
    branches: Vec<Branch>,
    branch_products: HashMap<BranchId, Vec<BranchProduct>>,
    nearest: Option<NearestBranch>,
    carts: HashMap<UserId, Vec<CartItem>>,
    favorites: HashMap<UserId, Vec<ProductId>>,
    add_calls: Vec<AddCall>,
    update_calls: Vec<UpdateCall>,
    remove_calls: Vec<ProductId>,
    clear_calls: u32,
}

/// In-memory implementation of [`BranchApi`], [`CartApi`], and
/// [`FavoritesApi`].
///
/// Cheaply cloneable; clones share state.
#[derive(Clone, Default)]
pub struct FakeApi {
    state: Arc<Mutex<FakeApiState>>,
    fail_branches: Arc<AtomicBool>,
    fail_nearest: Arc<AtomicBool>,
    fail_availability: Arc<AtomicBool>,
    fail_cart_writes: Arc<AtomicBool>,
    fail_cart_reads: Arc<AtomicBool>,
    favorites_unauthorized: Arc<AtomicBool>,
}

impl FakeApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- setup ---------------------------------------------------------------

    pub fn set_branches(&self, branches: Vec<Branch>) {
        self.state.lock().unwrap().branches = branches;
    }

    pub fn set_branch_products(&self, branch: BranchId, rows: Vec<BranchProduct>) {
        self.state.lock().unwrap().branch_products.insert(branch, rows);
    }

    pub fn set_nearest(&self, branch: Branch, distance_km: f64) {
        self.state.lock().unwrap().nearest = Some(NearestBranch {
            branch,
            distance_km: Some(distance_km),
        });
    }

    pub fn set_server_cart(&self, user: UserId, items: Vec<CartItem>) {
        self.state.lock().unwrap().carts.insert(user, items);
    }

    pub fn set_server_favorites(&self, user: UserId, favorites: Vec<ProductId>) {
        self.state.lock().unwrap().favorites.insert(user, favorites);
    }

    // -- failure toggles -----------------------------------------------------

    pub fn fail_branches(&self, fail: bool) {
        self.fail_branches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_nearest(&self, fail: bool) {
        self.fail_nearest.store(fail, Ordering::SeqCst);
    }

    pub fn fail_availability(&self, fail: bool) {
        self.fail_availability.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cart_writes(&self, fail: bool) {
        self.fail_cart_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cart_reads(&self, fail: bool) {
        self.fail_cart_reads.store(fail, Ordering::SeqCst);
    }

    pub fn favorites_unauthorized(&self, unauthorized: bool) {
        self.favorites_unauthorized.store(unauthorized, Ordering::SeqCst);
    }

    // -- inspection ----------------------------------------------------------

    #[must_use]
    pub fn server_cart(&self, user: UserId) -> Vec<CartItem> {
        self.state
            .lock()
            .unwrap()
            .carts
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn server_favorites(&self, user: UserId) -> Vec<ProductId> {
        self.state
            .lock()
            .unwrap()
            .favorites
            .get(&user)
            .cloned()
            .unwrap_or_default()
    }

    #[must_use]
    pub fn add_calls(&self) -> Vec<AddCall> {
        self.state.lock().unwrap().add_calls.clone()
    }

    #[must_use]
    pub fn update_calls(&self) -> Vec<UpdateCall> {
        self.state.lock().unwrap().update_calls.clone()
    }

    #[must_use]
    pub fn remove_calls(&self) -> Vec<ProductId> {
        self.state.lock().unwrap().remove_calls.clone()
    }

    #[must_use]
    pub fn clear_calls(&self) -> u32 {
        self.state.lock().unwrap().clear_calls
    }

    fn server_error() -> ApiError {
        ApiError::Status {
            status: 500,
            body: "fake failure".to_string(),
        }
    }
}

#[async_trait]
impl BranchApi for FakeApi {
    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError> {
        if self.fail_branches.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(self.state.lock().unwrap().branches.clone())
    }

    async fn nearby_branches(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<Branch>, ApiError> {
        if self.fail_branches.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        let branches = self.state.lock().unwrap().branches.clone();
        Ok(branches
            .into_iter()
            .filter(|b| match (b.latitude, b.longitude) {
                (Some(b_lat), Some(b_lng)) => {
                    verdura_storefront::geo::distance_km(lat, lng, b_lat, b_lng) <= radius_km
                }
                _ => false,
            })
            .collect())
    }

    async fn nearest_branch(&self, _lat: f64, _lng: f64) -> Result<NearestBranch, ApiError> {
        if self.fail_nearest.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        self.state
            .lock()
            .unwrap()
            .nearest
            .clone()
            .ok_or(ApiError::Status {
                status: 404,
                body: "no nearest branch configured".to_string(),
            })
    }

    async fn branch_products(&self, branch: BranchId) -> Result<Vec<BranchProduct>, ApiError> {
        if self.fail_availability.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(self
            .state
            .lock()
            .unwrap()
            .branch_products
            .get(&branch)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CartApi for FakeApi {
    async fn get_cart(
        &self,
        user: UserId,
        _branch: Option<BranchId>,
    ) -> Result<Vec<CartItem>, ApiError> {
        if self.fail_cart_reads.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        Ok(self.server_cart(user))
    }

    async fn add_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: &Product,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.add_calls.push(AddCall {
            user,
            branch,
            product: product.id,
            quantity,
            substitution_preference: substitution_preference.to_string(),
        });
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let cart = state.carts.entry(user).or_default();
        if let Some(item) = cart.iter_mut().find(|i| i.product.id == product.id) {
            item.quantity += quantity;
        } else {
            cart.push(CartItem::new(
                product.clone(),
                quantity,
                substitution_preference,
            ));
        }
        Ok(())
    }

    async fn update_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: ProductId,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.update_calls.push(UpdateCall {
            user,
            branch,
            product,
            quantity,
            substitution_preference: substitution_preference.to_string(),
        });
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }

        let cart = state.carts.entry(user).or_default();
        if let Some(item) = cart.iter_mut().find(|i| i.product.id == product) {
            item.quantity = quantity;
            item.substitution_preference = substitution_preference.to_string();
        } else {
            cart.push(CartItem::new(
                Product {
                    id: product,
                    name: format!("product-{product}"),
                    price: Price::zero(CurrencyCode::default()),
                    image_url: None,
                    unit: None,
                },
                quantity,
                substitution_preference,
            ));
        }
        Ok(())
    }

    async fn remove_item(
        &self,
        user: UserId,
        _branch: Option<BranchId>,
        product: ProductId,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.remove_calls.push(product);
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        if let Some(cart) = state.carts.get_mut(&user) {
            cart.retain(|i| i.product.id != product);
        }
        Ok(())
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), ApiError> {
        let mut state = self.state.lock().unwrap();
        state.clear_calls += 1;
        if self.fail_cart_writes.load(Ordering::SeqCst) {
            return Err(Self::server_error());
        }
        state.carts.remove(&user);
        Ok(())
    }
}

#[async_trait]
impl FavoritesApi for FakeApi {
    async fn get_favorites(&self, user: UserId) -> Result<Vec<ProductId>, ApiError> {
        if self.favorites_unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        Ok(self.server_favorites(user))
    }

    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError> {
        if self.favorites_unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        let mut state = self.state.lock().unwrap();
        let favorites = state.favorites.entry(user).or_default();
        if !favorites.contains(&product) {
            favorites.push(product);
        }
        Ok(())
    }

    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError> {
        if self.favorites_unauthorized.load(Ordering::SeqCst) {
            return Err(ApiError::Unauthorized);
        }
        let mut state = self.state.lock().unwrap();
        if let Some(favorites) = state.favorites.get_mut(&user) {
            favorites.retain(|p| *p != product);
        }
        Ok(())
    }
}
