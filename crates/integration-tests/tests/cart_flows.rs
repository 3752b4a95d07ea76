//! Cart flows: optimistic mutations, availability gating, debounced
//! server sync, and reconciliation.
//!
//! Debounce tests run on a paused clock; `tokio::time::sleep` in the test
//! body auto-advances time past pending flush timers.

#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use verdura_core::{BranchId, ProductId, UserId};
use verdura_storefront::notify::RecordingNotifier;
use verdura_storefront::session::Session;
use verdura_storefront::storage::LocalStorage;
use verdura_storefront::stores::{BranchStore, CartStore};
use verdura_storefront::types::{BranchProduct, CartItem};

use verdura_integration_tests::{branch, init_test_logging, product, stock_row, FakeApi};

const USER: UserId = UserId::new(42);

struct Harness {
    cart: CartStore,
    branches: BranchStore,
    notifier: Arc<RecordingNotifier>,
}

fn setup(api: &FakeApi, session: Session, dir: &tempfile::TempDir) -> Harness {
    init_test_logging();
    let storage = LocalStorage::open(dir.path()).unwrap();
    let branches = BranchStore::new(Arc::new(api.clone()), storage.clone());
    let notifier = Arc::new(RecordingNotifier::new());
    let cart = CartStore::new(
        Arc::new(api.clone()),
        Arc::new(api.clone()),
        branches.clone(),
        storage,
        notifier.clone(),
        session,
    );
    Harness {
        cart,
        branches,
        notifier,
    }
}

// =============================================================================
// Guest cart
// =============================================================================

#[tokio::test]
async fn guest_add_upserts_and_persists_across_restart() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();

    {
        let h = setup(&api, Session::Guest, &dir);
        h.cart.add_to_cart(product(1, 1000), 2, "").await;
        h.cart.add_to_cart(product(1, 1000), 1, "").await;
        h.cart.add_to_cart(product(2, 500), 1, "refund").await;

        let items = h.cart.items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].substitution_preference, "none");
        assert_eq!(items[1].substitution_preference, "refund");
        assert!(h.cart.is_open());
    }

    // Next session on the same storage directory.
    let h = setup(&api, Session::Guest, &dir);
    assert_eq!(h.cart.items().len(), 2);
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 3);
    assert!(!h.cart.is_open());
}

#[tokio::test]
async fn guest_cart_never_calls_the_server() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.add_to_cart(product(1, 1000), 2, "").await;
    h.cart.update_quantity(ProductId::new(1), 5, None).await;
    h.cart.remove_from_cart(ProductId::new(1)).await;
    h.cart.clear_cart().await;

    assert!(api.add_calls().is_empty());
    assert!(api.update_calls().is_empty());
    assert!(api.remove_calls().is_empty());
    assert_eq!(api.clear_calls(), 0);
}

#[tokio::test]
async fn add_zero_quantity_is_a_no_op() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.add_to_cart(product(1, 1000), 0, "").await;
    assert!(h.cart.items().is_empty());
    assert!(!h.cart.is_open());
}

#[tokio::test]
async fn update_below_one_removes_the_line() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.add_to_cart(product(1, 1000), 2, "").await;
    h.cart.update_quantity(ProductId::new(1), 0, None).await;
    assert!(h.cart.items().is_empty());
}

#[tokio::test]
async fn update_of_absent_product_is_a_no_op() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.update_quantity(ProductId::new(99), 3, None).await;
    assert!(h.cart.items().is_empty());
}

#[tokio::test]
async fn totals_are_recomputed_from_lines() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.add_to_cart(product(1, 1050), 3, "").await; // 31.50
    h.cart.add_to_cart(product(2, 500), 2, "").await; // 10.00

    assert_eq!(h.cart.total_items(), 5);
    assert_eq!(h.cart.total_price().amount, Decimal::new(4150, 2));
}

// =============================================================================
// Availability gate
// =============================================================================

#[tokio::test]
async fn add_is_rejected_when_quantity_exceeds_availability() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    // stock 5, reserved 3 -> 2 sellable
    api.set_branch_products(BranchId::new(1), vec![stock_row(1, 5, 3)]);

    h.cart.add_to_cart(product(1, 1000), 3, "").await;

    assert!(h.cart.items().is_empty());
    assert_eq!(h.notifier.warnings().len(), 1);
}

#[tokio::test]
async fn add_within_availability_succeeds() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.set_branch_products(BranchId::new(1), vec![stock_row(1, 5, 3)]);

    h.cart.add_to_cart(product(1, 1000), 2, "").await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 2);
    assert!(h.notifier.warnings().is_empty());
}

#[tokio::test]
async fn gate_counts_the_quantity_already_in_the_cart() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.set_branch_products(BranchId::new(1), vec![stock_row(1, 4, 0)]);

    h.cart.add_to_cart(product(1, 1000), 3, "").await;
    h.cart.add_to_cart(product(1, 1000), 2, "").await; // 3 + 2 > 4

    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 3);
    assert_eq!(h.notifier.warnings().len(), 1);
}

#[tokio::test]
async fn availability_lookup_failure_does_not_block_the_add() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.fail_availability(true);

    h.cart.add_to_cart(product(1, 1000), 10, "").await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 10);
}

#[tokio::test]
async fn row_without_stock_figures_is_unconstrained() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.set_branch_products(
        BranchId::new(1),
        vec![BranchProduct {
            product_id: ProductId::new(1),
            stock_quantity: None,
            reserved_quantity: None,
            branch_price: None,
        }],
    );

    h.cart.add_to_cart(product(1, 1000), 100, "").await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 100);
}

#[tokio::test]
async fn branch_price_override_applies_on_add() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.set_branch_products(
        BranchId::new(1),
        vec![BranchProduct {
            product_id: ProductId::new(1),
            stock_quantity: None,
            reserved_quantity: None,
            branch_price: Some(Decimal::new(750, 2)),
        }],
    );

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    assert_eq!(h.cart.items()[0].product.price.amount, Decimal::new(750, 2));
}

#[tokio::test]
async fn quantity_increase_is_gated_but_decrease_is_not() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.branches.select_branch(branch(1, "Downtown", 30.05, 31.24));
    api.set_branch_products(BranchId::new(1), vec![stock_row(1, 2, 0)]);

    h.cart.add_to_cart(product(1, 1000), 2, "").await;

    h.cart.update_quantity(ProductId::new(1), 5, None).await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 2);
    assert_eq!(h.notifier.warnings().len(), 1);

    h.cart.update_quantity(ProductId::new(1), 1, None).await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 1);
}

// =============================================================================
// Debounced server sync (authenticated)
// =============================================================================

#[tokio::test(start_paused = true)]
async fn add_burst_coalesces_into_one_server_write() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    h.cart.add_to_cart(product(1, 1000), 2, "").await;

    // Local state is immediate, the server write is not.
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 3);
    assert!(api.add_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(400)).await;

    let calls = api.add_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].quantity, 3);
    assert_eq!(calls[0].user, USER);
    assert_eq!(api.server_cart(USER)[0].quantity, 3);
}

#[tokio::test(start_paused = true)]
async fn a_new_add_restarts_the_debounce_window() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    tokio::time::sleep(Duration::from_millis(200)).await;

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    tokio::time::sleep(Duration::from_millis(250)).await;
    // 450ms in; the restarted window expires at 500ms.
    assert!(api.add_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let calls = api.add_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].quantity, 2);
}

#[tokio::test(start_paused = true)]
async fn adds_for_distinct_products_all_survive_the_window() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    h.cart.add_to_cart(product(2, 500), 2, "").await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    let mut seen: Vec<(ProductId, u32)> = api
        .add_calls()
        .into_iter()
        .map(|c| (c.product, c.quantity))
        .collect();
    seen.sort_unstable();
    assert_eq!(
        seen,
        vec![(ProductId::new(1), 1), (ProductId::new(2), 2)]
    );
}

#[tokio::test(start_paused = true)]
async fn flush_carries_the_selected_branch() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);
    h.branches.select_branch(branch(3, "Maadi", 29.96, 31.25));

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    tokio::time::sleep(Duration::from_millis(400)).await;

    assert_eq!(api.add_calls()[0].branch, Some(BranchId::new(3)));
}

#[tokio::test(start_paused = true)]
async fn quantity_updates_debounce_and_write_the_absolute_value() {
    let api = FakeApi::new();
    api.set_server_cart(USER, vec![CartItem::new(product(1, 1000), 2, "none")]);
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);
    h.cart.sync_cart().await;

    h.cart.update_quantity(ProductId::new(1), 4, None).await;
    h.cart.update_quantity(ProductId::new(1), 7, None).await;

    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 7);
    assert!(api.update_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(600)).await;

    let calls = api.update_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].quantity, 7);
    assert_eq!(api.server_cart(USER)[0].quantity, 7);
}

#[tokio::test(start_paused = true)]
async fn failed_flush_resyncs_from_the_server() {
    let api = FakeApi::new();
    api.set_server_cart(USER, vec![CartItem::new(product(9, 2000), 5, "none")]);
    api.fail_cart_writes(true);
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 1);

    tokio::time::sleep(Duration::from_millis(400)).await;

    // The optimistic line is gone; the server cart replaced local state.
    let items = h.cart.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].product.id, ProductId::new(9));
    assert_eq!(items[0].quantity, 5);
}

#[tokio::test(start_paused = true)]
async fn removing_a_line_cancels_its_pending_write() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    h.cart.remove_from_cart(ProductId::new(1)).await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(api.add_calls().is_empty());
    assert_eq!(api.remove_calls(), vec![ProductId::new(1)]);
    assert!(api.server_cart(USER).is_empty());
    assert!(h.cart.items().is_empty());
}

#[tokio::test(start_paused = true)]
async fn clear_cart_drops_pending_writes_and_clears_the_server() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 1, "").await;
    h.cart.clear_cart().await;

    tokio::time::sleep(Duration::from_millis(400)).await;

    assert!(api.add_calls().is_empty());
    assert_eq!(api.clear_calls(), 1);
    assert!(h.cart.items().is_empty());
}

#[tokio::test]
async fn remove_failure_keeps_the_optimistic_local_removal() {
    let api = FakeApi::new();
    api.set_server_cart(USER, vec![CartItem::new(product(1, 1000), 2, "none")]);
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);
    h.cart.sync_cart().await;

    api.fail_cart_writes(true);
    h.cart.remove_from_cart(ProductId::new(1)).await;

    assert!(h.cart.items().is_empty());
    assert_eq!(api.server_cart(USER).len(), 1);
}

#[tokio::test]
async fn sync_cart_is_a_no_op_for_guests() {
    let api = FakeApi::new();
    api.set_server_cart(USER, vec![CartItem::new(product(1, 1000), 2, "none")]);
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Guest, &dir);

    h.cart.sync_cart().await;
    assert!(h.cart.items().is_empty());
}

#[tokio::test]
async fn sync_failure_keeps_local_state() {
    let api = FakeApi::new();
    let dir = tempfile::tempdir().unwrap();
    let h = setup(&api, Session::Authenticated(USER), &dir);

    h.cart.add_to_cart(product(1, 1000), 2, "").await;
    api.fail_cart_reads(true);
    h.cart.sync_cart().await;

    assert_eq!(h.cart.quantity_of(ProductId::new(1)), 2);
}
