//! Verdura Core - Shared types library.
//!
//! This crate provides common types used across all Verdura components:
//! - `storefront` - Session-scoped store layer for the customer storefront
//! - `integration-tests` - Cross-store scenario tests
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no HTTP clients. This keeps
//! it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs and prices
#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
