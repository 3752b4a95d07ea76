//! Verdura API client.
//!
//! # Architecture
//!
//! - Plain REST-JSON endpoints; the server is the source of truth for
//!   branches, stock, pricing, and authenticated carts
//! - Collaborator seams are the [`BranchApi`], [`CartApi`], and
//!   [`FavoritesApi`] traits so stores can be tested against in-memory
//!   fakes
//! - Read-only catalog responses (branch listing, availability rows) are
//!   cached via `moka` with a short TTL; cart and favorites calls are
//!   never cached
//!
//! # Example
//!
//! ```rust,ignore
//! use verdura_storefront::api::{ApiClient, BranchApi};
//!
//! let client = ApiClient::new(&config)?;
//! let branches = client.list_branches().await?;
//! ```

mod conversions;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use moka::future::Cache;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, instrument};

use verdura_core::{BranchId, ProductId, UserId};

use crate::config::StorefrontConfig;
use crate::types::{Branch, BranchProduct, CartItem, Product};

use conversions::{convert_branch, convert_branch_product, convert_cart_line};
use types::{
    BranchDto, BranchProductDto, CartAddRequest, CartLineDto, CartUpdateRequest, Envelope,
    FavoriteRequest, MaybeEnveloped, NearestBranchResponse,
};

/// How much response body to keep in error values and logs.
const BODY_SNIPPET_LEN: usize = 500;

/// Errors that can occur when talking to the Verdura API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (transport-level).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned a non-success status.
    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Caller is not authenticated for this call (401/403).
    #[error("Unauthorized")]
    Unauthorized,

    /// Configured API token is not a valid header value.
    #[error("Invalid API token")]
    InvalidToken,
}

/// Nearest-branch resolution result from the remote endpoint.
#[derive(Debug, Clone)]
pub struct NearestBranch {
    pub branch: Branch,
    pub distance_km: Option<f64>,
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// Branch listing, nearest-branch resolution, and per-branch availability.
#[async_trait]
pub trait BranchApi: Send + Sync {
    /// List all branches.
    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError>;

    /// Advisory list of branches within `radius_km` of a point.
    async fn nearby_branches(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<Branch>, ApiError>;

    /// Authoritative nearest branch to a point.
    async fn nearest_branch(&self, lat: f64, lng: f64) -> Result<NearestBranch, ApiError>;

    /// Stock and price rows for every product the branch carries.
    async fn branch_products(&self, branch: BranchId) -> Result<Vec<BranchProduct>, ApiError>;
}

/// Server-persisted cart for authenticated sessions.
///
/// Lines are keyed by `(user_id, product_id)` and scoped to a branch when
/// one is selected.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Fetch the authoritative cart for a user and branch.
    async fn get_cart(
        &self,
        user: UserId,
        branch: Option<BranchId>,
    ) -> Result<Vec<CartItem>, ApiError>;

    /// Add a quantity delta to a line (creates the line if absent).
    async fn add_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: &Product,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError>;

    /// Set a line to an absolute quantity (upserts the line).
    async fn update_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: ProductId,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError>;

    /// Remove a line.
    async fn remove_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: ProductId,
    ) -> Result<(), ApiError>;

    /// Remove every line of the user's cart.
    async fn clear_cart(&self, user: UserId) -> Result<(), ApiError>;
}

/// Server-persisted favorites for authenticated sessions.
#[async_trait]
pub trait FavoritesApi: Send + Sync {
    /// Fetch the user's favorite product ids.
    async fn get_favorites(&self, user: UserId) -> Result<Vec<ProductId>, ApiError>;

    /// Add a favorite.
    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError>;

    /// Remove a favorite.
    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError>;
}

// =============================================================================
// ApiClient
// =============================================================================

/// Cached catalog responses.
#[derive(Clone)]
enum CacheValue {
    Branches(Arc<Vec<Branch>>),
    BranchProducts(Arc<Vec<BranchProduct>>),
}

/// HTTP client for the Verdura API.
///
/// Cheaply cloneable via `Arc`. Branch listings and availability rows are
/// cached for the configured TTL (default 30 seconds).
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    client: reqwest::Client,
    base_url: String,
    cache: Cache<String, CacheValue>,
}

impl ApiClient {
    /// Create a new API client from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build or the configured
    /// token is not a valid header value.
    pub fn new(config: &StorefrontConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let value = format!("Bearer {}", token.expose_secret());
            let mut value =
                HeaderValue::from_str(&value).map_err(|_| ApiError::InvalidToken)?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()?;

        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_live(config.catalog_cache_ttl)
            .build();

        Ok(Self {
            inner: Arc::new(ApiClientInner {
                client,
                base_url: config.api_base_url.trim_end_matches('/').to_string(),
                cache,
            }),
        })
    }

    /// Drop all cached catalog responses.
    pub async fn invalidate_cache(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    /// GET a JSON payload.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.get(&url).query(query).send().await?;
        Self::parse_response(path, response).await
    }

    /// POST a JSON body, discarding the response payload.
    async fn post_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.post(&url).json(body).send().await?;
        Self::check_status(path, response).await
    }

    /// PUT a JSON body, discarding the response payload.
    async fn put_json<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.put(&url).json(body).send().await?;
        Self::check_status(path, response).await
    }

    /// DELETE with query parameters, discarding the response payload.
    async fn delete(&self, path: &str, query: &[(&str, String)]) -> Result<(), ApiError> {
        let url = format!("{}{path}", self.inner.base_url);
        let response = self.inner.client.delete(&url).query(query).send().await?;
        Self::check_status(path, response).await
    }

    /// Read the body as text first so parse failures can be logged with
    /// their payload.
    async fn parse_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }

        let text = response.text().await?;

        if !status.is_success() {
            tracing::error!(
                path,
                status = %status,
                body = %snippet(&text),
                "Verdura API returned non-success status"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: snippet(&text),
            });
        }

        serde_json::from_str(&text).map_err(|e| {
            tracing::error!(
                path,
                error = %e,
                body = %snippet(&text),
                "Failed to parse Verdura API response"
            );
            ApiError::Parse(e)
        })
    }

    /// Status-only check for write endpoints.
    async fn check_status(path: &str, response: reqwest::Response) -> Result<(), ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ApiError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(
                path,
                status = %status,
                body = %snippet(&body),
                "Verdura API write failed"
            );
            return Err(ApiError::Status {
                status: status.as_u16(),
                body: snippet(&body),
            });
        }
        Ok(())
    }
}

fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl BranchApi for ApiClient {
    #[instrument(skip(self))]
    async fn list_branches(&self) -> Result<Vec<Branch>, ApiError> {
        let cache_key = "branches".to_string();
        if let Some(CacheValue::Branches(branches)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for branch listing");
            return Ok(branches.as_ref().clone());
        }

        // Some deployments wrap the listing in a data envelope, some don't
        let payload: MaybeEnveloped<Vec<BranchDto>> = self.get_json("/branches", &[]).await?;
        let branches: Vec<Branch> = payload.into_inner().into_iter().map(convert_branch).collect();

        self.inner
            .cache
            .insert(cache_key, CacheValue::Branches(Arc::new(branches.clone())))
            .await;

        Ok(branches)
    }

    #[instrument(skip(self))]
    async fn nearby_branches(
        &self,
        lat: f64,
        lng: f64,
        radius_km: f64,
    ) -> Result<Vec<Branch>, ApiError> {
        let payload: Envelope<Vec<BranchDto>> = self
            .get_json(
                "/branches/nearby",
                &[
                    ("lat", lat.to_string()),
                    ("lng", lng.to_string()),
                    ("radius", radius_km.to_string()),
                ],
            )
            .await?;

        Ok(payload.data.into_iter().map(convert_branch).collect())
    }

    #[instrument(skip(self))]
    async fn nearest_branch(&self, lat: f64, lng: f64) -> Result<NearestBranch, ApiError> {
        let payload: NearestBranchResponse = self
            .get_json(
                "/branches/location/nearest",
                &[("lat", lat.to_string()), ("lng", lng.to_string())],
            )
            .await?;

        Ok(NearestBranch {
            branch: convert_branch(payload.data),
            distance_km: payload.distance_km,
        })
    }

    #[instrument(skip(self), fields(branch = %branch))]
    async fn branch_products(&self, branch: BranchId) -> Result<Vec<BranchProduct>, ApiError> {
        let cache_key = format!("branch_products:{branch}");
        if let Some(CacheValue::BranchProducts(rows)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for branch products");
            return Ok(rows.as_ref().clone());
        }

        let payload: Envelope<Vec<BranchProductDto>> = self
            .get_json(&format!("/branches/{branch}/products"), &[])
            .await?;
        let rows: Vec<BranchProduct> = payload
            .data
            .into_iter()
            .map(convert_branch_product)
            .collect();

        self.inner
            .cache
            .insert(cache_key, CacheValue::BranchProducts(Arc::new(rows.clone())))
            .await;

        Ok(rows)
    }
}

#[async_trait]
impl CartApi for ApiClient {
    #[instrument(skip(self), fields(user = %user))]
    async fn get_cart(
        &self,
        user: UserId,
        branch: Option<BranchId>,
    ) -> Result<Vec<CartItem>, ApiError> {
        let mut query = vec![("user_id", user.to_string())];
        if let Some(branch) = branch {
            query.push(("branch_id", branch.to_string()));
        }

        let payload: Envelope<Vec<CartLineDto>> = self.get_json("/cart", &query).await?;
        Ok(payload.data.into_iter().map(convert_cart_line).collect())
    }

    #[instrument(skip(self, product), fields(user = %user, product_id = %product.id))]
    async fn add_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: &Product,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError> {
        self.post_json(
            "/cart/items",
            &CartAddRequest {
                user_id: user.as_i64(),
                branch_id: branch.map(|b| b.as_i64()),
                product_id: product.id.as_i64(),
                quantity,
                substitution_preference: substitution_preference.to_string(),
            },
        )
        .await
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product))]
    async fn update_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: ProductId,
        quantity: u32,
        substitution_preference: &str,
    ) -> Result<(), ApiError> {
        self.put_json(
            &format!("/cart/items/{product}"),
            &CartUpdateRequest {
                user_id: user.as_i64(),
                branch_id: branch.map(|b| b.as_i64()),
                quantity,
                substitution_preference: substitution_preference.to_string(),
            },
        )
        .await
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product))]
    async fn remove_item(
        &self,
        user: UserId,
        branch: Option<BranchId>,
        product: ProductId,
    ) -> Result<(), ApiError> {
        let mut query = vec![("user_id", user.to_string())];
        if let Some(branch) = branch {
            query.push(("branch_id", branch.to_string()));
        }
        self.delete(&format!("/cart/items/{product}"), &query).await
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn clear_cart(&self, user: UserId) -> Result<(), ApiError> {
        self.delete("/cart", &[("user_id", user.to_string())]).await
    }
}

#[async_trait]
impl FavoritesApi for ApiClient {
    #[instrument(skip(self), fields(user = %user))]
    async fn get_favorites(&self, user: UserId) -> Result<Vec<ProductId>, ApiError> {
        let payload: Envelope<Vec<i64>> = self
            .get_json("/favorites", &[("user_id", user.to_string())])
            .await?;
        Ok(payload.data.into_iter().map(ProductId::new).collect())
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product))]
    async fn add_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError> {
        self.post_json(
            "/favorites",
            &FavoriteRequest {
                user_id: user.as_i64(),
                product_id: product.as_i64(),
            },
        )
        .await
    }

    #[instrument(skip(self), fields(user = %user, product_id = %product))]
    async fn remove_favorite(&self, user: UserId, product: ProductId) -> Result<(), ApiError> {
        self.delete(
            &format!("/favorites/{product}"),
            &[("user_id", user.to_string())],
        )
        .await
    }
}
