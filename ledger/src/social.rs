//! # Friend Requests & the Friendship Edge
//!
//! Peer-to-peer transfers are gated on friendship, and friendship is created
//! only by the mutual-accept handshake modeled here. A [`FriendRequest`] is
//! a tiny state machine:
//!
//! ```text
//! Pending ──accept──> Accepted
//!    │
//!    └────reject──> Rejected
//! ```
//!
//! Both outcomes are terminal. A resolved request is never re-opened; users
//! who change their minds send a fresh request.
//!
//! The request is stored twice, mirroring the storefront's layout: a global
//! record keyed by request id, and a copy in the receiver's inbox so the
//! inbox can be listed with a single prefix scan. Accepting or rejecting
//! removes the inbox copy and updates the global record in the same atomic
//! commit that touches the friend lists.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from friend-request state transitions.
#[derive(Debug, Error)]
pub enum RequestStateError {
    /// The request has already been resolved. Terminal means terminal.
    #[error("friend request {id} is not pending (status: {status})")]
    NotPending {
        /// The request that was being resolved.
        id: String,
        /// Its current status.
        status: RequestStatus,
    },
}

// ---------------------------------------------------------------------------
// RequestStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a friend request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Sent, visible to both parties, awaiting the receiver's decision.
    Pending,
    /// Accepted; the friendship edge exists.
    Accepted,
    /// Rejected by the receiver.
    Rejected,
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Accepted => write!(f, "accepted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

// ---------------------------------------------------------------------------
// FriendRequest
// ---------------------------------------------------------------------------

/// A friend request between two users.
///
/// Carries denormalized display names so inbox rendering doesn't need a
/// second lookup per row, same trade-off the storefront made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Unique request id (UUID v4).
    pub id: String,
    /// The user who sent the request.
    pub sender: String,
    /// Sender's display name at send time.
    pub sender_name: String,
    /// The user the request was sent to.
    pub receiver: String,
    /// Receiver's display name at send time.
    pub receiver_name: String,
    /// Lifecycle state.
    pub status: RequestStatus,
    /// Creation time, unix milliseconds.
    pub timestamp_ms: u64,
}

impl FriendRequest {
    /// Creates a fresh pending request.
    pub fn new(
        id: String,
        sender: &str,
        sender_name: &str,
        receiver: &str,
        receiver_name: &str,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            id,
            sender: sender.to_string(),
            sender_name: sender_name.to_string(),
            receiver: receiver.to_string(),
            receiver_name: receiver_name.to_string(),
            status: RequestStatus::Pending,
            timestamp_ms,
        }
    }

    /// Whether the request is still awaiting a decision.
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    /// Transitions `Pending -> Accepted`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestStateError::NotPending`] if already resolved.
    pub fn accept(&mut self) -> Result<(), RequestStateError> {
        self.resolve(RequestStatus::Accepted)
    }

    /// Transitions `Pending -> Rejected`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestStateError::NotPending`] if already resolved.
    pub fn reject(&mut self) -> Result<(), RequestStateError> {
        self.resolve(RequestStatus::Rejected)
    }

    fn resolve(&mut self, target: RequestStatus) -> Result<(), RequestStateError> {
        if !self.is_pending() {
            return Err(RequestStateError::NotPending {
                id: self.id.clone(),
                status: self.status,
            });
        }
        self.status = target;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> FriendRequest {
        FriendRequest::new(
            "req-1".into(),
            "alice",
            "Alice",
            "bob",
            "Bob",
            1_000,
        )
    }

    #[test]
    fn new_request_is_pending() {
        let r = request();
        assert!(r.is_pending());
        assert_eq!(r.status, RequestStatus::Pending);
    }

    #[test]
    fn accept_resolves_once() {
        let mut r = request();
        r.accept().unwrap();
        assert_eq!(r.status, RequestStatus::Accepted);

        // Terminal: a second transition of either kind fails.
        assert!(matches!(
            r.accept(),
            Err(RequestStateError::NotPending { .. })
        ));
        assert!(matches!(
            r.reject(),
            Err(RequestStateError::NotPending { .. })
        ));
        assert_eq!(r.status, RequestStatus::Accepted);
    }

    #[test]
    fn reject_resolves_once() {
        let mut r = request();
        r.reject().unwrap();
        assert_eq!(r.status, RequestStatus::Rejected);
        assert!(r.accept().is_err());
        assert_eq!(r.status, RequestStatus::Rejected);
    }

    #[test]
    fn request_roundtrip() {
        let r = request();
        let bytes = bincode::serialize(&r).expect("serialize");
        let recovered: FriendRequest = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(recovered, r);
    }
}
