//! Branch listing, selection, and nearest-branch resolution.
//!
//! The storefront must always have a usable branch: listing failures
//! degrade to a synthetic default branch instead of surfacing an error,
//! and the nearest-branch endpoint falls back to a local Haversine
//! computation when unreachable.

use std::sync::{Arc, Mutex};

use tracing::{debug, instrument, warn};

use verdura_core::BranchId;

use crate::api::BranchApi;
use crate::geo;
use crate::storage::{LocalStorage, keys};
use crate::types::Branch;

/// Default radius for the advisory nearby listing, in kilometers.
pub const DEFAULT_NEARBY_RADIUS_KM: f64 = 10.0;

/// Outcome of loading the branch listing.
///
/// Fail-open is a policy here, so the degrade is a value rather than a
/// logged side effect: a fetch either yields fresh active branches or the
/// synthetic fallback with the reason it was substituted.
enum Listing {
    Fresh(Vec<Branch>),
    Fallback { reason: String },
}

#[derive(Default)]
struct BranchState {
    branches: Vec<Branch>,
    selected: Option<Branch>,
    loading: bool,
    last_error: Option<String>,
}

/// Session-scoped branch store.
///
/// Cheaply cloneable via `Arc`; clones share state.
#[derive(Clone)]
pub struct BranchStore {
    inner: Arc<BranchStoreInner>,
}

struct BranchStoreInner {
    api: Arc<dyn BranchApi>,
    storage: LocalStorage,
    state: Mutex<BranchState>,
}

impl BranchStore {
    /// Create a branch store, restoring any persisted selection.
    #[must_use]
    pub fn new(api: Arc<dyn BranchApi>, storage: LocalStorage) -> Self {
        let selected = match storage.get::<Branch>(keys::SELECTED_BRANCH) {
            Ok(selected) => selected,
            Err(e) => {
                warn!(error = %e, "Failed to restore persisted branch selection");
                None
            }
        };

        Self {
            inner: Arc::new(BranchStoreInner {
                api,
                storage,
                state: Mutex::new(BranchState {
                    selected,
                    ..BranchState::default()
                }),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The known (active) branches.
    #[must_use]
    pub fn branches(&self) -> Vec<Branch> {
        self.lock_state().branches.clone()
    }

    /// The currently selected branch, if any.
    #[must_use]
    pub fn selected_branch(&self) -> Option<Branch> {
        self.lock_state().selected.clone()
    }

    /// Whether a branch fetch is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.lock_state().loading
    }

    /// The degrade reason of the most recent failed fetch, if any.
    ///
    /// Informational only — fetch failures never propagate to callers.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.lock_state().last_error.clone()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Refresh the branch list from the API.
    ///
    /// Keeps only active branches. On any failure — transport error,
    /// non-success status, malformed payload, or an empty/all-inactive
    /// list — degrades silently to the synthetic default branch so the
    /// storefront stays usable. Afterwards, if no branch is selected or
    /// the selected branch is no longer active, auto-selects the first
    /// active branch.
    #[instrument(skip(self))]
    pub async fn fetch_branches(&self) {
        self.lock_state().loading = true;

        let listing = self.load_listing().await;
        let (branches, degrade_reason) = match listing {
            Listing::Fresh(branches) => (branches, None),
            Listing::Fallback { reason } => {
                warn!(reason, "Degrading to default branch");
                (vec![default_branch()], Some(reason))
            }
        };

        let newly_selected = {
            let mut state = self.lock_state();
            state.branches = branches;
            state.loading = false;
            state.last_error = degrade_reason;

            let selection_stale = match &state.selected {
                None => true,
                Some(selected) => !state
                    .branches
                    .iter()
                    .any(|b| b.id == selected.id && b.is_active),
            };

            if selection_stale {
                state.selected = state.branches.first().cloned();
                state.selected.clone()
            } else {
                None
            }
        };

        if let Some(branch) = newly_selected {
            debug!(branch = %branch.id, "Auto-selected branch after refresh");
            self.persist_selection(&branch);
        }
    }

    /// Select a branch and persist the selection.
    ///
    /// Accepts any branch the caller passes; activeness validation is the
    /// fetch path's responsibility.
    pub fn select_branch(&self, branch: Branch) {
        self.persist_selection(&branch);
        self.lock_state().selected = Some(branch);
    }

    /// Resolve and select the branch nearest to a location.
    ///
    /// Tries the remote nearest-branch endpoint first; an unreachable
    /// endpoint or an inactive result falls back to
    /// [`Self::find_nearest_branch`]. The fallback trusts the locally
    /// cached activity flags, which may be staler than the server's view.
    ///
    /// Either selects a branch and returns it, or returns `None` (only
    /// when the branch list is empty) — never a partial update.
    #[instrument(skip(self))]
    pub async fn auto_select_by_location(&self, lat: f64, lng: f64) -> Option<Branch> {
        match self.inner.api.nearest_branch(lat, lng).await {
            Ok(nearest) if nearest.branch.is_active => {
                self.select_branch(nearest.branch.clone());
                return Some(nearest.branch);
            }
            Ok(nearest) => {
                debug!(
                    branch = %nearest.branch.id,
                    "Nearest endpoint returned inactive branch; falling back to local resolution"
                );
            }
            Err(e) => {
                warn!(error = %e, "Nearest-branch endpoint failed; falling back to local resolution");
            }
        }

        self.find_nearest_branch(lat, lng).await
    }

    /// Locally compute, select, and return the nearest branch.
    ///
    /// Fetches the branch list first if it is empty. Prefers the minimum
    /// Haversine distance among branches with coordinates (ties broken by
    /// list order); falls back to the first active branch when no branch
    /// has coordinates. Returns `None` only when the list is empty.
    pub async fn find_nearest_branch(&self, lat: f64, lng: f64) -> Option<Branch> {
        if self.lock_state().branches.is_empty() {
            self.fetch_branches().await;
        }

        let branches = self.branches();

        let nearest = branches
            .iter()
            .filter_map(|branch| match (branch.latitude, branch.longitude) {
                (Some(branch_lat), Some(branch_lng)) => {
                    Some((branch, geo::distance_km(lat, lng, branch_lat, branch_lng)))
                }
                _ => None,
            })
            .min_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(branch, _)| branch)
            .or_else(|| branches.iter().find(|b| b.is_active))
            .cloned();

        if let Some(branch) = &nearest {
            self.select_branch(branch.clone());
        }
        nearest
    }

    /// Advisory list of branches near a location.
    ///
    /// Display-only: returns an empty list on any failure instead of
    /// synthesizing a fallback.
    #[instrument(skip(self))]
    pub async fn find_nearby_branches(&self, lat: f64, lng: f64, radius_km: f64) -> Vec<Branch> {
        match self.inner.api.nearby_branches(lat, lng, radius_km).await {
            Ok(branches) => branches,
            Err(e) => {
                warn!(error = %e, "Nearby-branch lookup failed");
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Load the branch listing, classifying every failure mode — transport
    /// error, non-success status, malformed payload, empty or all-inactive
    /// list — as a fallback with a reason.
    async fn load_listing(&self) -> Listing {
        match self.inner.api.list_branches().await {
            Ok(list) => {
                let active: Vec<Branch> = list.into_iter().filter(|b| b.is_active).collect();
                if active.is_empty() {
                    Listing::Fallback {
                        reason: "branch listing contained no active branches".to_string(),
                    }
                } else {
                    Listing::Fresh(active)
                }
            }
            Err(e) => Listing::Fallback {
                reason: e.to_string(),
            },
        }
    }

    fn persist_selection(&self, branch: &Branch) {
        if let Err(e) = self.inner.storage.set(keys::SELECTED_BRANCH, branch) {
            warn!(error = %e, "Failed to persist branch selection");
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, BranchState> {
        // State mutex is never held across an await, so poisoning only
        // happens if a holder panicked; propagate by panicking too.
        #[allow(clippy::unwrap_used)]
        self.inner.state.lock().unwrap()
    }
}

/// Synthetic branch used when the branch service is unreachable or returns
/// nothing usable.
fn default_branch() -> Branch {
    Branch {
        id: BranchId::new(1),
        name: "Verdura".to_string(),
        address: "Main Branch".to_string(),
        phone: String::new(),
        latitude: None,
        longitude: None,
        coverage_radius_km: None,
        is_active: true,
    }
}
