//! Session identity for the store layer.
//!
//! Authentication itself is out of scope here; the embedder resolves the
//! user and hands the stores a `Session`. Stores are constructed once per
//! session, so the identity never changes underneath them — a login or
//! logout builds a fresh set of stores.

use serde::{Deserialize, Serialize};

use verdura_core::UserId;

/// Who owns the cart and favorites for this store instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Session {
    /// Anonymous visitor. Cart and favorites live only in local storage.
    Guest,
    /// Signed-in user. The server-side cart is the source of truth and
    /// local state mirrors it.
    Authenticated(UserId),
}

impl Session {
    /// Whether this is an anonymous session.
    #[must_use]
    pub const fn is_guest(&self) -> bool {
        matches!(self, Self::Guest)
    }

    /// The authenticated user, if any.
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Guest => None,
            Self::Authenticated(user_id) => Some(*user_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_has_no_user() {
        assert!(Session::Guest.is_guest());
        assert_eq!(Session::Guest.user_id(), None);
    }

    #[test]
    fn test_authenticated_user() {
        let session = Session::Authenticated(UserId::new(9));
        assert!(!session.is_guest());
        assert_eq!(session.user_id(), Some(UserId::new(9)));
    }
}
