//! Core type definitions for ledger transaction records.
//!
//! These types form the vocabulary of every entry in a user's history.
//! They are intentionally kept small and `Copy`-friendly where possible;
//! the record itself owns only the strings it must.

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// TransactionKind
// ---------------------------------------------------------------------------

/// Discriminant for the operation a record represents.
///
/// Transfers and gifts produce *paired* records: the debit side lands in the
/// sender's history as `TransferSent`/`GiftSent` and the credit side in the
/// recipient's as `TransferReceived`/`GiftReceived`, each naming the
/// counterparty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Coin purchase through a recharge package.
    Recharge,
    /// Conversion between coins and diamonds.
    Exchange,
    /// Outgoing peer-to-peer transfer.
    TransferSent,
    /// Incoming peer-to-peer transfer.
    TransferReceived,
    /// Diamond cash-out request.
    Withdrawal,
    /// Gift paid for in coins.
    GiftSent,
    /// Gift received as diamonds.
    GiftReceived,
}

impl TransactionKind {
    /// Whether this record represents value leaving the owner's wallet.
    /// Drives the +/- sign in history rendering.
    pub fn is_outgoing(&self) -> bool {
        matches!(self, Self::TransferSent | Self::Withdrawal | Self::GiftSent)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recharge => write!(f, "recharge"),
            Self::Exchange => write!(f, "exchange"),
            Self::TransferSent => write!(f, "transfer_sent"),
            Self::TransferReceived => write!(f, "transfer_received"),
            Self::Withdrawal => write!(f, "withdrawal"),
            Self::GiftSent => write!(f, "gift_sent"),
            Self::GiftReceived => write!(f, "gift_received"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a record.
///
/// Almost everything completes synchronously inside its atomic commit and is
/// born `Completed`. Withdrawal requests are the exception: they are born
/// `Pending` and settled manually by support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting manual processing.
    Pending,
    /// Fully settled.
    Completed,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionRecord
// ---------------------------------------------------------------------------

/// One entry in a user's transaction history.
///
/// A record is owned by exactly one user. Operations affecting two users
/// write one record into each party's history, both inside the same atomic
/// commit as the balance mutations they describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record id (UUID v4).
    pub id: String,
    /// The user whose history this record belongs to.
    pub user: String,
    /// What happened.
    pub kind: TransactionKind,
    /// Coins moved by this record, if any.
    pub amount_coins: u64,
    /// Diamonds moved by this record, if any.
    pub amount_diamonds: u64,
    /// Cash involved, in millimes. Price metadata for recharges, payout
    /// value for withdrawals, zero otherwise.
    pub amount_millimes: u64,
    /// The other party, for transfers and gifts.
    pub counterparty: Option<String>,
    /// Human-readable summary shown in history lists.
    pub description: String,
    /// Settlement state.
    pub status: TransactionStatus,
    /// Creation time, unix milliseconds.
    pub timestamp_ms: u64,
}

impl TransactionRecord {
    /// Creates a completed record with no amounts set. The ledger's
    /// operation constructors fill in the relevant fields.
    pub fn new(id: String, user: &str, kind: TransactionKind, timestamp_ms: u64) -> Self {
        Self {
            id,
            user: user.to_string(),
            kind,
            amount_coins: 0,
            amount_diamonds: 0,
            amount_millimes: 0,
            counterparty: None,
            description: String::new(),
            status: TransactionStatus::Completed,
            timestamp_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outgoing_kinds_carry_the_minus_sign() {
        assert!(TransactionKind::TransferSent.is_outgoing());
        assert!(TransactionKind::Withdrawal.is_outgoing());
        assert!(TransactionKind::GiftSent.is_outgoing());
        assert!(!TransactionKind::Recharge.is_outgoing());
        assert!(!TransactionKind::TransferReceived.is_outgoing());
        assert!(!TransactionKind::GiftReceived.is_outgoing());
    }

    #[test]
    fn kind_serializes_to_snake_case() {
        let json = serde_json::to_string(&TransactionKind::TransferSent).unwrap();
        assert_eq!(json, "\"transfer_sent\"");
        let json = serde_json::to_string(&TransactionKind::Recharge).unwrap();
        assert_eq!(json, "\"recharge\"");
    }

    #[test]
    fn record_roundtrip() {
        let mut record =
            TransactionRecord::new("tx-1".into(), "alice", TransactionKind::Recharge, 1_000);
        record.amount_coins = 100;
        record.amount_millimes = 3_000;
        record.description = "Coin Pack Purchase (100 + 0 Bonus)".into();

        let bytes = bincode::serialize(&record).expect("serialize");
        let recovered: TransactionRecord = bincode::deserialize(&bytes).expect("deserialize");
        assert_eq!(recovered, record);
    }
}
