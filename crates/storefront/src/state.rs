//! Session-scoped store container.
//!
//! One [`Storefront`] is built per session and handed to the UI layer; it
//! wires the API client, local storage, and the three stores together.
//! Cross-store flows that span more than one store live here, like
//! re-deriving the cart when the selected branch changes.

use std::sync::Arc;

use tracing::instrument;

use crate::api::{ApiClient, BranchApi, CartApi, FavoritesApi};
use crate::config::StorefrontConfig;
use crate::error::Result;
use crate::notify::{Notifier, TracingNotifier};
use crate::session::Session;
use crate::storage::LocalStorage;
use crate::stores::{BranchStore, CartStore, FavoritesStore};
use crate::types::Branch;

/// The store layer for one session.
///
/// Cheaply cloneable via `Arc`; clones share state.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    config: StorefrontConfig,
    api: ApiClient,
    branches: BranchStore,
    cart: CartStore,
    favorites: FavoritesStore,
}

impl Storefront {
    /// Wire up the store layer for a session.
    ///
    /// Nothing is fetched here; call [`Self::start`] to populate the
    /// stores.
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be opened or the API
    /// client cannot be built.
    pub fn new(
        config: StorefrontConfig,
        session: Session,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        let shared = Arc::new(api.clone());
        Self::assemble(
            config,
            api,
            session,
            notifier,
            shared.clone(),
            shared.clone(),
            shared,
        )
    }

    /// Wire up the store layer against externally supplied API backends.
    ///
    /// Lets embedders substitute the transport, for example in-memory
    /// backends in tests. The bundled [`ApiClient`] is still built from
    /// `config` for callers that reach it through [`Self::api`].
    ///
    /// # Errors
    ///
    /// Returns an error if local storage cannot be opened or the API
    /// client cannot be built.
    pub fn with_backends(
        config: StorefrontConfig,
        session: Session,
        notifier: Arc<dyn Notifier>,
        branch_api: Arc<dyn BranchApi>,
        cart_api: Arc<dyn CartApi>,
        favorites_api: Arc<dyn FavoritesApi>,
    ) -> Result<Self> {
        let api = ApiClient::new(&config)?;
        Self::assemble(
            config,
            api,
            session,
            notifier,
            branch_api,
            cart_api,
            favorites_api,
        )
    }

    fn assemble(
        config: StorefrontConfig,
        api: ApiClient,
        session: Session,
        notifier: Arc<dyn Notifier>,
        branch_api: Arc<dyn BranchApi>,
        cart_api: Arc<dyn CartApi>,
        favorites_api: Arc<dyn FavoritesApi>,
    ) -> Result<Self> {
        let storage = LocalStorage::open(&config.data_dir)?;

        let branches = BranchStore::new(branch_api.clone(), storage.clone());
        let cart = CartStore::new(
            cart_api,
            branch_api,
            branches.clone(),
            storage.clone(),
            notifier,
            session,
        );
        let favorites = FavoritesStore::new(favorites_api, storage, session);

        Ok(Self {
            inner: Arc::new(StorefrontInner {
                config,
                api,
                branches,
                cart,
                favorites,
            }),
        })
    }

    /// Wire up the store layer from environment configuration, with
    /// notifications going to the tracing log.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is missing or invalid, or if
    /// construction fails (see [`Self::new`]).
    pub fn from_env(session: Session) -> Result<Self> {
        let config = StorefrontConfig::from_env()?;
        Self::new(config, session, Arc::new(TracingNotifier))
    }

    /// Populate the stores: refresh branches, pull the server cart, and
    /// load favorites. Each step degrades independently on failure.
    #[instrument(skip(self))]
    pub async fn start(&self) {
        self.inner.branches.fetch_branches().await;
        self.inner.cart.sync_cart().await;
        self.inner.favorites.load().await;
    }

    /// Select a branch and re-derive the cart against it.
    ///
    /// Branch-scoped pricing and availability make the server cart a
    /// function of the selected branch, so the cart is resynced after
    /// every selection change.
    #[instrument(skip(self, branch), fields(branch = %branch.id))]
    pub async fn select_branch(&self, branch: Branch) {
        self.inner.branches.select_branch(branch);
        self.inner.cart.sync_cart().await;
    }

    /// Resolve and select the branch nearest to a location, then
    /// re-derive the cart if the selection changed.
    ///
    /// Same contract as [`Self::select_branch`]: the server cart is a
    /// function of the selected branch, so an automatic selection must
    /// resync it too.
    #[instrument(skip(self))]
    pub async fn auto_select_by_location(&self, lat: f64, lng: f64) -> Option<Branch> {
        let previous = self.inner.branches.selected_branch().map(|b| b.id);
        let selected = self.inner.branches.auto_select_by_location(lat, lng).await;
        if let Some(branch) = &selected
            && previous != Some(branch.id)
        {
            self.inner.cart.sync_cart().await;
        }
        selected
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn branches(&self) -> &BranchStore {
        &self.inner.branches
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesStore {
        &self.inner.favorites
    }
}
