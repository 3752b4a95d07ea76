//! Favorite products with optimistic toggling.
//!
//! Mutations apply locally first and persist to local storage for every
//! session type, so favorites survive restarts even for guests. For
//! authenticated sessions the server write is best-effort: authorization
//! failures are expected during session expiry and are ignored silently,
//! other failures are logged. The optimistic local change is never rolled
//! back.

use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};

use verdura_core::ProductId;

use crate::api::{ApiError, FavoritesApi};
use crate::session::Session;
use crate::storage::{LocalStorage, keys};

/// Session-scoped favorites store.
///
/// Cheaply cloneable via `Arc`; clones share state.
#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<FavoritesStoreInner>,
}

struct FavoritesStoreInner {
    api: Arc<dyn FavoritesApi>,
    storage: LocalStorage,
    session: Session,
    state: Mutex<Vec<ProductId>>,
}

impl FavoritesStore {
    /// Create a favorites store, restoring the locally persisted list.
    #[must_use]
    pub fn new(api: Arc<dyn FavoritesApi>, storage: LocalStorage, session: Session) -> Self {
        let favorites = match storage.get::<Vec<ProductId>>(keys::FAVORITES) {
            Ok(favorites) => favorites.unwrap_or_default(),
            Err(e) => {
                warn!(error = %e, "Failed to restore persisted favorites");
                Vec::new()
            }
        };

        Self {
            inner: Arc::new(FavoritesStoreInner {
                api,
                storage,
                session,
                state: Mutex::new(favorites),
            }),
        }
    }

    /// Current favorite product ids, in insertion order.
    #[must_use]
    pub fn favorites(&self) -> Vec<ProductId> {
        self.lock_state().clone()
    }

    /// Whether a product is favorited.
    #[must_use]
    pub fn is_favorite(&self, product: ProductId) -> bool {
        self.lock_state().contains(&product)
    }

    /// Replace the local list with the server's, for authenticated
    /// sessions. A failed fetch keeps the locally restored list.
    #[instrument(skip(self))]
    pub async fn load(&self) {
        let Some(user) = self.inner.session.user_id() else {
            return;
        };

        match self.inner.api.get_favorites(user).await {
            Ok(favorites) => {
                *self.lock_state() = favorites;
                self.persist();
            }
            Err(e) => self.log_server_failure("Favorites fetch failed", &e),
        }
    }

    /// Add a product to favorites. No-op if already present.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn add_favorite(&self, product: ProductId) {
        {
            let mut state = self.lock_state();
            if state.contains(&product) {
                return;
            }
            state.push(product);
        }
        self.persist();

        if let Some(user) = self.inner.session.user_id()
            && let Err(e) = self.inner.api.add_favorite(user, product).await
        {
            self.log_server_failure("Favorite add failed", &e);
        }
    }

    /// Remove a product from favorites. No-op if absent.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn remove_favorite(&self, product: ProductId) {
        {
            let mut state = self.lock_state();
            let before = state.len();
            state.retain(|p| *p != product);
            if state.len() == before {
                return;
            }
        }
        self.persist();

        if let Some(user) = self.inner.session.user_id()
            && let Err(e) = self.inner.api.remove_favorite(user, product).await
        {
            self.log_server_failure("Favorite removal failed", &e);
        }
    }

    /// Toggle a product's favorite status.
    pub async fn toggle_favorite(&self, product: ProductId) {
        if self.is_favorite(product) {
            self.remove_favorite(product).await;
        } else {
            self.add_favorite(product).await;
        }
    }

    fn persist(&self) {
        let favorites = self.favorites();
        if let Err(e) = self.inner.storage.set(keys::FAVORITES, &favorites) {
            warn!(error = %e, "Failed to persist favorites");
        }
    }

    // Expired or missing credentials are a normal part of session
    // lifetime; only unexpected failures are worth a warning.
    fn log_server_failure(&self, context: &str, error: &ApiError) {
        match error {
            ApiError::Unauthorized => {
                debug!("{context}: not authorized; keeping local favorites");
            }
            other => warn!(error = %other, "{context}"),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, Vec<ProductId>> {
        #[allow(clippy::unwrap_used)]
        self.inner.state.lock().unwrap()
    }
}
