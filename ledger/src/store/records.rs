//! The persistent documents: user records and the minimal order record the
//! loyalty read path needs.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::wallet::Wallet;

// ---------------------------------------------------------------------------
// UserRecord
// ---------------------------------------------------------------------------

/// The stored state of a single user.
///
/// The wallet is embedded rather than stored separately so a balance
/// mutation is a single-document update, exactly as the storefront kept
/// `wallet` as a sub-object of the user document. The friend list is the
/// user's half of each symmetric friendship edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user id.
    pub id: String,
    /// Display name shown to other users.
    pub display_name: String,
    /// Push-gateway token, when the user's device registered one.
    pub push_token: Option<String>,
    /// Coin and diamond balances.
    pub wallet: Wallet,
    /// Ids of this user's friends. Membership is always mutual: `a` lists
    /// `b` exactly when `b` lists `a`.
    pub friends: Vec<String>,
    /// Account creation time, unix milliseconds.
    pub created_at_ms: u64,
}

impl UserRecord {
    /// Creates a fresh user with an empty wallet and no friends.
    pub fn new(id: &str, display_name: &str, created_at_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            push_token: None,
            wallet: Wallet::empty(),
            friends: Vec::new(),
            created_at_ms,
        }
    }

    /// Whether this user lists `other` as a friend.
    pub fn is_friends_with(&self, other: &str) -> bool {
        self.friends.iter().any(|f| f == other)
    }

    /// Adds `other` to the friend list if not already present.
    pub fn add_friend(&mut self, other: &str) {
        if !self.is_friends_with(other) {
            self.friends.push(other.to_string());
        }
    }

    /// Removes `other` from the friend list if present.
    pub fn remove_friend(&mut self, other: &str) {
        self.friends.retain(|f| f != other);
    }
}

// ---------------------------------------------------------------------------
// OrderRecord
// ---------------------------------------------------------------------------

/// Fulfillment state of an order. Only `Delivered` matters to the ledger:
/// loyalty tiering counts delivered orders and ignores the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Placed,
    Shipped,
    Delivered,
    Cancelled,
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placed => write!(f, "placed"),
            Self::Shipped => write!(f, "shipped"),
            Self::Delivered => write!(f, "delivered"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A storefront order, reduced to what loyalty tiering needs.
///
/// Order management proper (carts, line items, fulfillment workflow) lives
/// outside this service; the ledger keeps just enough to recompute the
/// delivered-order count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    /// Unique order id (UUID v4).
    pub id: String,
    /// The user who placed the order.
    pub user: String,
    /// Fulfillment state.
    pub status: OrderStatus,
    /// Order total in millimes.
    pub total_millimes: u64,
    /// Creation time, unix milliseconds.
    pub timestamp_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn friend_list_membership() {
        let mut alice = UserRecord::new("alice", "Alice", 0);
        assert!(!alice.is_friends_with("bob"));

        alice.add_friend("bob");
        assert!(alice.is_friends_with("bob"));

        // Adding twice does not duplicate.
        alice.add_friend("bob");
        assert_eq!(alice.friends.len(), 1);

        alice.remove_friend("bob");
        assert!(!alice.is_friends_with("bob"));
        // Removing a non-friend is a no-op.
        alice.remove_friend("carol");
    }

    #[test]
    fn user_record_roundtrip() {
        let mut user = UserRecord::new("alice", "Alice", 42);
        user.push_token = Some("ExponentPushToken[abc]".into());
        user.wallet = crate::wallet::Wallet::with_balances(100, 20);
        user.add_friend("bob");

        let bytes = bincode::serialize(&user).expect("serialize");
        let recovered: UserRecord = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(recovered, user);
    }
}
