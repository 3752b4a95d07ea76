//! Branch-aware cart with optimistic updates.
//!
//! Local state is mutated synchronously and is immediately visible to
//! reads; for authenticated sessions the corresponding server writes are
//! debounced and reconciled. A failed server write never rolls back the
//! optimistic change — it triggers a full [`CartStore::sync_cart`] so the
//! server's cart replaces local state wholesale. Guest carts skip the
//! server entirely and persist to local storage.
//!
//! Each mutation kind keeps at most one pending flush timer; a new
//! mutation within the debounce window aborts the pending timer and
//! restarts it, carrying the accumulated dirty lines forward so nothing
//! is lost when the surviving timer fires. In-flight HTTP requests are
//! never cancelled.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use verdura_core::{CurrencyCode, Price, ProductId};

use crate::api::{BranchApi, CartApi};
use crate::notify::{NoticeLevel, Notifier};
use crate::session::Session;
use crate::storage::{LocalStorage, keys};
use crate::stores::BranchStore;
use crate::types::{Branch, CartItem, Product};

/// Debounce window for server sync after `add_to_cart` bursts.
const ADD_SYNC_DEBOUNCE: Duration = Duration::from_millis(300);

/// Debounce window for server writes after `update_quantity` bursts.
/// Longer than the add window: +/- steppers fire in rapid succession.
const UPDATE_WRITE_DEBOUNCE: Duration = Duration::from_millis(500);

/// A pending quantity-delta write (from `add_to_cart`).
struct AddWrite {
    product: Product,
    quantity: u32,
    substitution_preference: String,
}

/// A pending absolute-quantity write (from `update_quantity`).
struct SetWrite {
    quantity: u32,
    substitution_preference: String,
}

/// Dirty lines plus the single surviving debounce timer for one mutation
/// kind.
struct PendingFlush<W> {
    dirty: HashMap<ProductId, W>,
    timer: Option<JoinHandle<()>>,
}

impl<W> Default for PendingFlush<W> {
    fn default() -> Self {
        Self {
            dirty: HashMap::new(),
            timer: None,
        }
    }
}

/// Outcome of the availability gate for one add or increase.
enum Gate {
    Reject,
    Allow { price_override: Option<Price> },
}

#[derive(Default)]
struct CartState {
    items: Vec<CartItem>,
    is_open: bool,
}

/// Session-scoped cart store.
///
/// Cheaply cloneable via `Arc`; clones share state.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    api: Arc<dyn CartApi>,
    branch_api: Arc<dyn BranchApi>,
    branches: BranchStore,
    storage: LocalStorage,
    notifier: Arc<dyn Notifier>,
    session: Session,
    state: Mutex<CartState>,
    pending_adds: Mutex<PendingFlush<AddWrite>>,
    pending_sets: Mutex<PendingFlush<SetWrite>>,
}

impl CartStore {
    /// Create a cart store.
    ///
    /// Guest sessions restore the persisted local cart immediately;
    /// authenticated sessions start empty until [`Self::sync_cart`] pulls
    /// the server cart.
    #[must_use]
    pub fn new(
        api: Arc<dyn CartApi>,
        branch_api: Arc<dyn BranchApi>,
        branches: BranchStore,
        storage: LocalStorage,
        notifier: Arc<dyn Notifier>,
        session: Session,
    ) -> Self {
        let items = if session.is_guest() {
            match storage.get::<Vec<CartItem>>(keys::GUEST_CART) {
                Ok(items) => items.unwrap_or_default(),
                Err(e) => {
                    warn!(error = %e, "Failed to restore guest cart");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        Self {
            inner: Arc::new(CartStoreInner {
                api,
                branch_api,
                branches,
                storage,
                notifier,
                session,
                state: Mutex::new(CartState {
                    items,
                    is_open: false,
                }),
                pending_adds: Mutex::new(PendingFlush::default()),
                pending_sets: Mutex::new(PendingFlush::default()),
            }),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current cart lines, in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.lock_state().items.clone()
    }

    /// Sum of line quantities. Recomputed on every read.
    #[must_use]
    pub fn total_items(&self) -> u32 {
        self.lock_state().items.iter().map(|i| i.quantity).sum()
    }

    /// Sum of line totals. Recomputed on every read.
    #[must_use]
    pub fn total_price(&self) -> Price {
        let state = self.lock_state();
        let total: Decimal = state
            .items
            .iter()
            .map(|item| item.line_total().amount)
            .sum();
        drop(state);
        Price::new(total, CurrencyCode::default())
    }

    /// Quantity of one product currently in the cart (0 when absent).
    #[must_use]
    pub fn quantity_of(&self, product: ProductId) -> u32 {
        self.lock_state()
            .items
            .iter()
            .find(|item| item.product.id == product)
            .map_or(0, |item| item.quantity)
    }

    /// Whether the cart drawer should be shown.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock_state().is_open
    }

    /// Show or hide the cart drawer.
    pub fn set_open(&self, open: bool) {
        self.lock_state().is_open = open;
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Add a product to the cart.
    ///
    /// Gated by branch availability when a branch is selected: if the
    /// branch's row carries stock figures and the desired total exceeds
    /// `max(0, stock - reserved)`, the add is rejected with a warning
    /// notification and the cart is left unchanged. An availability
    /// lookup failure does not block the add (fail-open). A
    /// branch-specific price overrides the catalog price before storing.
    ///
    /// Adding an already-present product increments its quantity; the
    /// substitution preference is only overwritten by a non-empty value.
    /// Opens the cart drawer in every path.
    #[instrument(skip(self, product), fields(product_id = %product.id, quantity))]
    pub async fn add_to_cart(
        &self,
        product: Product,
        quantity: u32,
        substitution_preference: &str,
    ) {
        if quantity == 0 {
            return;
        }

        let selected = self.inner.branches.selected_branch();
        let mut product = product;

        if let Some(branch) = &selected {
            let current = self.quantity_of(product.id);
            let desired = i64::from(current) + i64::from(quantity);
            match self.availability_gate(branch, &product, desired).await {
                Gate::Reject => return,
                Gate::Allow { price_override } => {
                    if let Some(price) = price_override {
                        product.price = price;
                    }
                }
            }
        }

        {
            let mut state = self.lock_state();
            upsert_item(
                &mut state.items,
                product.clone(),
                quantity,
                substitution_preference,
            );
            state.is_open = true;
        }

        if self.inner.session.is_guest() {
            self.persist_guest_cart();
        } else {
            self.queue_add_write(product, quantity, substitution_preference);
        }
    }

    /// Set a line to an absolute quantity.
    ///
    /// A quantity below 1 removes the line. Increases re-run the
    /// availability gate (fail-open on lookup error). Authenticated
    /// writes are debounced by 500ms and reconciled via [`Self::sync_cart`]
    /// on failure; guest updates persist synchronously.
    #[instrument(skip(self), fields(product_id = %product, quantity))]
    pub async fn update_quantity(
        &self,
        product: ProductId,
        quantity: i64,
        substitution_preference: Option<&str>,
    ) {
        if quantity < 1 {
            self.remove_from_cart(product).await;
            return;
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);

        let current = self.quantity_of(product);
        if current == 0 {
            debug!(product_id = %product, "update_quantity for a product not in the cart");
            return;
        }

        if quantity > current
            && let Some(branch) = self.inner.branches.selected_branch()
            && let Some(item) = self.find_item(product)
            && matches!(
                self.availability_gate(&branch, &item.product, i64::from(quantity))
                    .await,
                Gate::Reject
            )
        {
            return;
        }

        let substitution = {
            let mut state = self.lock_state();
            let Some(item) = state.items.iter_mut().find(|i| i.product.id == product) else {
                return;
            };
            item.quantity = quantity;
            if let Some(preference) = substitution_preference
                && !preference.is_empty()
            {
                item.substitution_preference = preference.to_string();
            }
            item.substitution_preference.clone()
        };

        if self.inner.session.is_guest() {
            self.persist_guest_cart();
        } else {
            self.queue_set_write(product, quantity, substitution);
        }
    }

    /// Remove a line from the cart.
    ///
    /// Authenticated sessions issue a best-effort server removal: a
    /// failure is logged only — not retried, not rolled back — and stays
    /// inconsistent until the next sync.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn remove_from_cart(&self, product: ProductId) {
        self.lock_state().items.retain(|i| i.product.id != product);

        // A pending debounced write for this line would resurrect it.
        self.lock_pending_adds().dirty.remove(&product);
        self.lock_pending_sets().dirty.remove(&product);

        match self.inner.session {
            Session::Guest => self.persist_guest_cart(),
            Session::Authenticated(user) => {
                let branch = self.selected_branch_id();
                if let Err(e) = self.inner.api.remove_item(user, branch, product).await {
                    warn!(error = %e, product_id = %product, "Server cart removal failed");
                }
            }
        }
    }

    /// Empty the cart.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) {
        self.lock_state().items.clear();

        self.abort_pending(&self.inner.pending_adds);
        self.abort_pending(&self.inner.pending_sets);

        match self.inner.session {
            Session::Guest => self.persist_guest_cart(),
            Session::Authenticated(user) => {
                if let Err(e) = self.inner.api.clear_cart(user).await {
                    warn!(error = %e, "Server cart clear failed");
                }
            }
        }
    }

    /// Replace local items with the server's authoritative cart.
    ///
    /// No-op for guest sessions. Invoked after any failed optimistic
    /// write, and whenever the selected branch changes (pricing and
    /// availability are branch-scoped, so the cart is re-derived per
    /// branch).
    #[instrument(skip(self))]
    pub async fn sync_cart(&self) {
        let Some(user) = self.inner.session.user_id() else {
            return;
        };
        let branch = self.selected_branch_id();

        match self.inner.api.get_cart(user, branch).await {
            Ok(items) => {
                self.lock_state().items = items;
            }
            Err(e) => {
                warn!(error = %e, "Cart sync failed; keeping local state");
            }
        }
    }

    // =========================================================================
    // Availability gate
    // =========================================================================

    async fn availability_gate(&self, branch: &Branch, product: &Product, desired: i64) -> Gate {
        let rows = match self.inner.branch_api.branch_products(branch.id).await {
            Ok(rows) => rows,
            Err(e) => {
                // Fail-open: a flaky availability service must not block
                // checkout.
                warn!(error = %e, branch = %branch.id, "Availability lookup failed; allowing");
                return Gate::Allow {
                    price_override: None,
                };
            }
        };

        let Some(row) = rows.iter().find(|r| r.product_id == product.id) else {
            return Gate::Allow {
                price_override: None,
            };
        };

        if let Some(available) = row.available()
            && desired > available
        {
            self.inner.notifier.notify(
                NoticeLevel::Warning,
                &format!(
                    "Only {available} of {} available at {}",
                    product.name, branch.name
                ),
            );
            return Gate::Reject;
        }

        Gate::Allow {
            price_override: row.price_override(),
        }
    }

    // =========================================================================
    // Debounced server writes
    // =========================================================================

    fn queue_add_write(&self, product: Product, quantity: u32, substitution_preference: &str) {
        let mut pending = self.lock_pending_adds();
        pending
            .dirty
            .entry(product.id)
            .and_modify(|write| {
                write.quantity = write.quantity.saturating_add(quantity);
                if !substitution_preference.is_empty() {
                    write.substitution_preference = substitution_preference.to_string();
                }
            })
            .or_insert_with(|| AddWrite {
                product,
                quantity,
                substitution_preference: if substitution_preference.is_empty() {
                    crate::types::DEFAULT_SUBSTITUTION.to_string()
                } else {
                    substitution_preference.to_string()
                },
            });

        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        let store = self.clone();
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(ADD_SYNC_DEBOUNCE).await;
            store.flush_add_writes().await;
        }));
    }

    fn queue_set_write(&self, product: ProductId, quantity: u32, substitution_preference: String) {
        let mut pending = self.lock_pending_sets();
        pending.dirty.insert(
            product,
            SetWrite {
                quantity,
                substitution_preference,
            },
        );

        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
        let store = self.clone();
        pending.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(UPDATE_WRITE_DEBOUNCE).await;
            store.flush_set_writes().await;
        }));
    }

    async fn flush_add_writes(&self) {
        let writes: Vec<AddWrite> = {
            let mut pending = self.lock_pending_adds();
            pending.timer = None;
            pending.dirty.drain().map(|(_, write)| write).collect()
        };
        let Some(user) = self.inner.session.user_id() else {
            return;
        };
        let branch = self.selected_branch_id();

        let mut failed = false;
        for write in writes {
            if self
                .inner
                .api
                .add_item(
                    user,
                    branch,
                    &write.product,
                    write.quantity,
                    &write.substitution_preference,
                )
                .await
                .is_err()
            {
                failed = true;
            }
        }

        if failed {
            warn!("Debounced cart add failed; resyncing from server");
            self.sync_cart().await;
        }
    }

    async fn flush_set_writes(&self) {
        let writes: Vec<(ProductId, SetWrite)> = {
            let mut pending = self.lock_pending_sets();
            pending.timer = None;
            pending.dirty.drain().collect()
        };
        let Some(user) = self.inner.session.user_id() else {
            return;
        };
        let branch = self.selected_branch_id();

        let mut failed = false;
        for (product, write) in writes {
            if self
                .inner
                .api
                .update_item(
                    user,
                    branch,
                    product,
                    write.quantity,
                    &write.substitution_preference,
                )
                .await
                .is_err()
            {
                failed = true;
            }
        }

        if failed {
            warn!("Debounced cart update failed; resyncing from server");
            self.sync_cart().await;
        }
    }

    fn abort_pending<W>(&self, pending: &Mutex<PendingFlush<W>>) {
        #[allow(clippy::unwrap_used)]
        let mut pending = pending.lock().unwrap();
        pending.dirty.clear();
        if let Some(timer) = pending.timer.take() {
            timer.abort();
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn persist_guest_cart(&self) {
        let items = self.items();
        if let Err(e) = self.inner.storage.set(keys::GUEST_CART, &items) {
            warn!(error = %e, "Failed to persist guest cart");
        }
    }

    fn selected_branch_id(&self) -> Option<verdura_core::BranchId> {
        self.inner.branches.selected_branch().map(|b| b.id)
    }

    fn find_item(&self, product: ProductId) -> Option<CartItem> {
        self.lock_state()
            .items
            .iter()
            .find(|item| item.product.id == product)
            .cloned()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, CartState> {
        #[allow(clippy::unwrap_used)]
        self.inner.state.lock().unwrap()
    }

    fn lock_pending_adds(&self) -> std::sync::MutexGuard<'_, PendingFlush<AddWrite>> {
        #[allow(clippy::unwrap_used)]
        self.inner.pending_adds.lock().unwrap()
    }

    fn lock_pending_sets(&self) -> std::sync::MutexGuard<'_, PendingFlush<SetWrite>> {
        #[allow(clippy::unwrap_used)]
        self.inner.pending_sets.lock().unwrap()
    }
}

/// Upsert a line by product identity: increment the quantity when the
/// product is already present, otherwise append a new line.
fn upsert_item(
    items: &mut Vec<CartItem>,
    product: Product,
    quantity: u32,
    substitution_preference: &str,
) {
    if let Some(existing) = items.iter_mut().find(|i| i.product.id == product.id) {
        existing.quantity = existing.quantity.saturating_add(quantity);
        if !substitution_preference.is_empty() {
            existing.substitution_preference = substitution_preference.to_string();
        }
    } else {
        items.push(CartItem::new(product, quantity, substitution_preference));
    }
}
