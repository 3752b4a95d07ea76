//! Verdura Storefront Core library.
//!
//! Session-scoped state management for the customer-facing grocery
//! storefront: branch selection with nearest-branch resolution, a
//! branch-aware cart with optimistic updates and debounced server sync,
//! and favorites. The UI layer consumes these stores; everything here is
//! a client of the remote Verdura API.
#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod config;
pub mod error;
pub mod geo;
pub mod notify;
pub mod session;
pub mod state;
pub mod storage;
pub mod stores;
pub mod types;
