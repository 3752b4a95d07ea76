//! Session-scoped stores.
//!
//! One instance of each store exists per session; consumers receive them by
//! reference from [`crate::state::Storefront`] rather than through ambient
//! globals. Stores own their state exclusively — the only cross-store
//! dependency is [`CartStore`] reading [`BranchStore`]'s selection to scope
//! availability checks.
//!
//! Collaborator failures never escape a store: every operation has a
//! defined degrade path (synthetic default branch, fail-open availability,
//! resync after a failed optimistic write). The single user-visible error
//! surface is the warning notification for a quantity that exceeds branch
//! availability.

mod branch;
mod cart;
mod favorites;

pub use branch::{BranchStore, DEFAULT_NEARBY_RADIUS_KM};
pub use cart::CartStore;
pub use favorites::FavoritesStore;
