//! Container-level flows: startup population and the branch-change cart
//! resync contract, for both manual and location-based selection.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use verdura_core::{BranchId, ProductId, UserId};
use verdura_storefront::config::StorefrontConfig;
use verdura_storefront::notify::RecordingNotifier;
use verdura_storefront::session::Session;
use verdura_storefront::state::Storefront;
use verdura_storefront::types::CartItem;

use verdura_integration_tests::{branch, init_test_logging, product, FakeApi};

const USER: UserId = UserId::new(42);
const CAIRO: (f64, f64) = (30.0444, 31.2357);

fn test_config(dir: &tempfile::TempDir) -> StorefrontConfig {
    StorefrontConfig {
        api_base_url: "http://127.0.0.1:9".to_string(),
        api_token: None,
        data_dir: dir.path().to_path_buf(),
        request_timeout: Duration::from_secs(1),
        catalog_cache_ttl: Duration::from_secs(30),
    }
}

fn storefront_with(api: &FakeApi, session: Session, dir: &tempfile::TempDir) -> Storefront {
    init_test_logging();
    let shared = Arc::new(api.clone());
    Storefront::with_backends(
        test_config(dir),
        session,
        Arc::new(RecordingNotifier::new()),
        shared.clone(),
        shared.clone(),
        shared,
    )
    .unwrap()
}

#[tokio::test]
async fn start_populates_every_store() {
    let api = FakeApi::new();
    api.set_branches(vec![branch(1, "Downtown", 30.05, 31.24)]);
    api.set_server_cart(USER, vec![CartItem::new(product(3, 500), 1, "none")]);
    api.set_server_favorites(USER, vec![ProductId::new(9)]);
    let dir = tempfile::tempdir().unwrap();

    let store = storefront_with(&api, Session::Authenticated(USER), &dir);
    store.start().await;

    assert_eq!(
        store.branches().selected_branch().map(|b| b.id),
        Some(BranchId::new(1))
    );
    assert_eq!(store.cart().quantity_of(ProductId::new(3)), 1);
    assert!(store.favorites().is_favorite(ProductId::new(9)));
}

#[tokio::test]
async fn manual_selection_re_derives_the_cart() {
    let api = FakeApi::new();
    api.set_branches(vec![
        branch(1, "Downtown", 30.05, 31.24),
        branch(2, "Maadi", 29.96, 31.25),
    ]);
    api.set_server_cart(USER, vec![CartItem::new(product(1, 1000), 2, "none")]);
    let dir = tempfile::tempdir().unwrap();

    let store = storefront_with(&api, Session::Authenticated(USER), &dir);
    store.select_branch(branch(2, "Maadi", 29.96, 31.25)).await;

    assert_eq!(
        store.branches().selected_branch().map(|b| b.id),
        Some(BranchId::new(2))
    );
    assert_eq!(store.cart().quantity_of(ProductId::new(1)), 2);
}

#[tokio::test]
async fn location_selection_re_derives_the_cart() {
    let api = FakeApi::new();
    api.set_branches(vec![
        branch(1, "Downtown", 30.05, 31.24),
        branch(2, "Maadi", 29.96, 31.25),
    ]);
    api.set_nearest(branch(2, "Maadi", 29.96, 31.25), 2.4);
    api.set_server_cart(USER, vec![CartItem::new(product(1, 1000), 2, "none")]);
    let dir = tempfile::tempdir().unwrap();

    let store = storefront_with(&api, Session::Authenticated(USER), &dir);
    let selected = store.auto_select_by_location(CAIRO.0, CAIRO.1).await;

    assert_eq!(selected.map(|b| b.id), Some(BranchId::new(2)));
    assert_eq!(store.cart().quantity_of(ProductId::new(1)), 2);
}

#[tokio::test]
async fn location_selection_resyncs_even_after_a_prior_selection() {
    let api = FakeApi::new();
    api.set_branches(vec![
        branch(1, "Downtown", 30.05, 31.24),
        branch(2, "Maadi", 29.96, 31.25),
    ]);
    api.set_nearest(branch(2, "Maadi", 29.96, 31.25), 2.4);
    let dir = tempfile::tempdir().unwrap();

    let store = storefront_with(&api, Session::Authenticated(USER), &dir);
    store.select_branch(branch(1, "Downtown", 30.05, 31.24)).await;

    // The server cart changes while branch 1 is selected; moving to the
    // nearest branch must pick the new contents up.
    api.set_server_cart(USER, vec![CartItem::new(product(4, 750), 3, "none")]);
    let selected = store.auto_select_by_location(CAIRO.0, CAIRO.1).await;

    assert_eq!(selected.map(|b| b.id), Some(BranchId::new(2)));
    assert_eq!(store.cart().quantity_of(ProductId::new(4)), 3);
}

#[tokio::test]
async fn guest_location_selection_leaves_the_local_cart_alone() {
    let api = FakeApi::new();
    api.set_branches(vec![
        branch(1, "Downtown", 30.05, 31.24),
        branch(2, "Maadi", 29.96, 31.25),
    ]);
    api.set_nearest(branch(2, "Maadi", 29.96, 31.25), 2.4);
    let dir = tempfile::tempdir().unwrap();

    let store = storefront_with(&api, Session::Guest, &dir);
    store.cart().add_to_cart(product(1, 1000), 2, "").await;

    let selected = store.auto_select_by_location(CAIRO.0, CAIRO.1).await;

    assert_eq!(selected.map(|b| b.id), Some(BranchId::new(2)));
    assert_eq!(store.cart().quantity_of(ProductId::new(1)), 2);
}
