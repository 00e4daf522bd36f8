//! # LedgerDb — Persistent Storage Engine
//!
//! The persistence layer for the Souk ledger, built on sled's embedded
//! key-value store. All on-disk data flows through this module.
//!
//! ## Tree Layout
//!
//! sled organizes data into named "trees" (analogous to collections in a
//! document database). Each tree is an independent B+ tree with its own
//! keyspace:
//!
//! | Tree              | Key                                    | Value                        |
//! |-------------------|----------------------------------------|------------------------------|
//! | `users`           | user id (UTF-8)                        | `bincode(UserRecord)`        |
//! | `transactions`    | `user \0 !timestamp (8B BE) \0 tx id`  | `bincode(TransactionRecord)` |
//! | `friend_requests` | namespaced, see below                  | see below                    |
//! | `orders`          | `user \0 order id`                     | `bincode(OrderRecord)`       |
//!
//! Transaction keys embed the bitwise-complemented timestamp in big-endian
//! form, so sled's lexicographic ordering within a user's prefix is
//! newest-first. History reads become a single bounded prefix scan.
//!
//! The `friend_requests` tree carries three key namespaces:
//!
//! - `g \0 <request id>` — the global record (`bincode(FriendRequest)`),
//! - `i \0 <receiver> \0 <request id>` — the receiver's inbox copy,
//! - `p \0 <low user> \0 <high user>` — pending-pair marker (value: request
//!   id), which makes "is a request already outstanding between these two
//!   users, in either direction" a single point lookup inside a transaction.
//!
//! ## Atomicity
//!
//! Multi-document mutations (balance + history, friend lists + request
//! state) run as sled multi-tree transactions, driven by [`crate::ledger`].
//! The trees are `pub(crate)` for exactly that reason; everything outside
//! the crate goes through the typed accessors below.

use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::{Db, Tree};
use std::path::Path;

use super::records::{OrderRecord, OrderStatus, UserRecord};
use crate::social::FriendRequest;
use crate::transaction::TransactionRecord;

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Encoding Helpers
// ---------------------------------------------------------------------------

/// bincode-encodes a document for storage.
pub(crate) fn encode<T: Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

/// Decodes a stored document.
pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

// ---------------------------------------------------------------------------
// Key Builders
// ---------------------------------------------------------------------------

/// Separator byte between key segments. User ids are UTF-8 and never
/// contain NUL, so the separator is unambiguous.
const SEP: u8 = 0x00;

/// Key prefix for a user's transaction history.
pub(crate) fn tx_prefix(user: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.len() + 1);
    key.extend_from_slice(user.as_bytes());
    key.push(SEP);
    key
}

/// Full transaction key: prefix, inverted big-endian timestamp, record id.
/// The inverted timestamp makes an ascending scan return newest-first.
pub(crate) fn tx_key(user: &str, timestamp_ms: u64, id: &str) -> Vec<u8> {
    let mut key = tx_prefix(user);
    key.extend_from_slice(&(!timestamp_ms).to_be_bytes());
    key.push(SEP);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Global friend-request key.
pub(crate) fn request_key(id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(id.len() + 2);
    key.extend_from_slice(b"g");
    key.push(SEP);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Inbox prefix for a receiver.
pub(crate) fn inbox_prefix(receiver: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(receiver.len() + 3);
    key.extend_from_slice(b"i");
    key.push(SEP);
    key.extend_from_slice(receiver.as_bytes());
    key.push(SEP);
    key
}

/// Inbox copy key for one request.
pub(crate) fn inbox_key(receiver: &str, id: &str) -> Vec<u8> {
    let mut key = inbox_prefix(receiver);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Pending-pair marker key. Order-independent: the lexicographically
/// smaller user id always comes first, so `(a, b)` and `(b, a)` collide.
pub(crate) fn pair_key(a: &str, b: &str) -> Vec<u8> {
    let (low, high) = if a <= b { (a, b) } else { (b, a) };
    let mut key = Vec::with_capacity(low.len() + high.len() + 4);
    key.extend_from_slice(b"p");
    key.push(SEP);
    key.extend_from_slice(low.as_bytes());
    key.push(SEP);
    key.extend_from_slice(high.as_bytes());
    key
}

/// Order key within the orders tree.
pub(crate) fn order_key(user: &str, id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.len() + id.len() + 1);
    key.extend_from_slice(user.as_bytes());
    key.push(SEP);
    key.extend_from_slice(id.as_bytes());
    key
}

/// Order prefix for one user.
pub(crate) fn order_prefix(user: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(user.len() + 1);
    key.extend_from_slice(user.as_bytes());
    key.push(SEP);
    key
}

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// Persistent storage engine for the wallet ledger.
///
/// Wraps a sled `Db` instance and exposes typed accessors for users,
/// transaction history, friend requests, and orders. All serialization uses
/// bincode for compactness and speed.
///
/// # Thread Safety
///
/// sled is inherently thread-safe: trees support lock-free concurrent reads
/// and serialized writes. `LedgerDb` can be shared across threads via
/// `Arc<LedgerDb>` without external synchronization.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    /// The underlying sled database handle.
    db: Db,
    /// User records indexed by user id.
    pub(crate) users: Tree,
    /// Transaction history, newest-first within each user's prefix.
    pub(crate) transactions: Tree,
    /// Friend requests: global records, inbox copies, pending-pair markers.
    pub(crate) friend_requests: Tree,
    /// Minimal order records for the loyalty read path.
    pub(crate) orders: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    ///
    /// If the directory doesn't exist, sled creates it. If the database
    /// already exists, all existing data is available immediately.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that lives in memory and is cleaned up
    /// when dropped. Ideal for unit tests.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    /// Internal constructor: opens named trees from an existing sled `Db`.
    fn from_db(db: Db) -> DbResult<Self> {
        let users = db.open_tree("users")?;
        let transactions = db.open_tree("transactions")?;
        let friend_requests = db.open_tree("friend_requests")?;
        let orders = db.open_tree("orders")?;

        Ok(Self {
            db,
            users,
            transactions,
            friend_requests,
            orders,
        })
    }

    // -- User operations ----------------------------------------------------

    /// Persist a user record, overwriting any existing one.
    pub fn put_user(&self, user: &UserRecord) -> DbResult<()> {
        self.users.insert(user.id.as_bytes(), encode(user)?)?;
        Ok(())
    }

    /// Retrieve a user record by id. Returns `None` for unknown users.
    pub fn get_user(&self, id: &str) -> DbResult<Option<UserRecord>> {
        match self.users.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Number of stored users.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// All users that have a push token on file. Drives broadcast fan-out.
    pub fn users_with_push_tokens(&self) -> DbResult<Vec<UserRecord>> {
        let mut out = Vec::new();
        for entry in self.users.iter() {
            let (_key, value) = entry?;
            let user: UserRecord = decode(&value)?;
            if user.push_token.is_some() {
                out.push(user);
            }
        }
        Ok(out)
    }

    // -- Transaction history ------------------------------------------------

    /// The most recent transaction records for a user, newest first.
    ///
    /// Equivalent to the storefront's `orderBy timestamp desc, limit N`
    /// history query; the key layout makes it a single bounded prefix scan.
    pub fn recent_transactions(&self, user: &str, limit: usize) -> DbResult<Vec<TransactionRecord>> {
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in self.transactions.scan_prefix(tx_prefix(user)).take(limit) {
            let (_key, value) = entry?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// Total number of stored transaction records, across all users.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len()
    }

    // -- Friend requests ----------------------------------------------------

    /// Retrieve the global record of a friend request by id.
    pub fn get_request(&self, id: &str) -> DbResult<Option<FriendRequest>> {
        match self.friend_requests.get(request_key(id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The pending requests sitting in a receiver's inbox.
    pub fn pending_requests_for(&self, receiver: &str) -> DbResult<Vec<FriendRequest>> {
        let mut out = Vec::new();
        for entry in self.friend_requests.scan_prefix(inbox_prefix(receiver)) {
            let (_key, value) = entry?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    /// The pending requests a sender has outstanding. Scans the global
    /// namespace; outgoing lists are short and rarely read, so no reverse
    /// index is kept for them.
    pub fn pending_requests_from(&self, sender: &str) -> DbResult<Vec<FriendRequest>> {
        let mut out = Vec::new();
        for entry in self.friend_requests.scan_prefix(b"g\x00") {
            let (_key, value) = entry?;
            let request: FriendRequest = decode(&value)?;
            if request.sender == sender && request.is_pending() {
                out.push(request);
            }
        }
        Ok(out)
    }

    // -- Orders -------------------------------------------------------------

    /// Persist an order record.
    pub fn put_order(&self, order: &OrderRecord) -> DbResult<()> {
        self.orders
            .insert(order_key(&order.user, &order.id), encode(order)?)?;
        Ok(())
    }

    /// Count of a user's delivered orders. The loyalty tiering input.
    pub fn delivered_order_count(&self, user: &str) -> DbResult<u64> {
        let mut count = 0;
        for entry in self.orders.scan_prefix(order_prefix(user)) {
            let (_key, value) = entry?;
            let order: OrderRecord = decode(&value)?;
            if order.status == OrderStatus::Delivered {
                count += 1;
            }
        }
        Ok(count)
    }

    // -- Utility ------------------------------------------------------------

    /// Force a flush of all pending writes to disk.
    ///
    /// sled buffers writes in memory for performance. This call blocks
    /// until all data is durable on the underlying storage device.
    pub fn flush(&self) -> DbResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{TransactionKind, TransactionRecord};

    fn make_tx(user: &str, id: &str, timestamp_ms: u64) -> TransactionRecord {
        TransactionRecord::new(id.to_string(), user, TransactionKind::Recharge, timestamp_ms)
    }

    fn insert_tx(db: &LedgerDb, tx: &TransactionRecord) {
        db.transactions
            .insert(
                tx_key(&tx.user, tx.timestamp_ms, &tx.id),
                encode(tx).unwrap(),
            )
            .unwrap();
    }

    #[test]
    fn open_temporary_database() {
        let db = LedgerDb::open_temporary().expect("should create temp db");
        assert_eq!(db.user_count(), 0);
        assert_eq!(db.transaction_count(), 0);
    }

    #[test]
    fn open_persistent_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = LedgerDb::open(dir.path()).expect("should open db");
        db.put_user(&UserRecord::new("alice", "Alice", 1)).unwrap();
        db.flush().unwrap();
        drop(db);

        // Re-open to verify the data survived.
        let db2 = LedgerDb::open(dir.path()).expect("should reopen db");
        let alice = db2.get_user("alice").unwrap().expect("alice persisted");
        assert_eq!(alice.display_name, "Alice");
    }

    #[test]
    fn user_crud() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.get_user("alice").unwrap().is_none());

        let mut alice = UserRecord::new("alice", "Alice", 1);
        db.put_user(&alice).unwrap();
        assert_eq!(db.user_count(), 1);

        alice.wallet.credit(crate::wallet::Currency::Coins, 500).unwrap();
        db.put_user(&alice).unwrap();

        let stored = db.get_user("alice").unwrap().unwrap();
        assert_eq!(stored.wallet.coins, 500);
        assert_eq!(db.user_count(), 1);
    }

    #[test]
    fn recent_transactions_newest_first() {
        let db = LedgerDb::open_temporary().unwrap();
        for (i, ts) in [(1u64, 1_000u64), (2, 3_000), (3, 2_000)] {
            insert_tx(&db, &make_tx("alice", &format!("tx-{i}"), ts));
        }

        let history = db.recent_transactions("alice", 20).unwrap();
        let timestamps: Vec<u64> = history.iter().map(|t| t.timestamp_ms).collect();
        assert_eq!(timestamps, vec![3_000, 2_000, 1_000]);
    }

    #[test]
    fn recent_transactions_respects_limit() {
        let db = LedgerDb::open_temporary().unwrap();
        for i in 0..30u64 {
            insert_tx(&db, &make_tx("alice", &format!("tx-{i}"), i));
        }
        let history = db.recent_transactions("alice", 20).unwrap();
        assert_eq!(history.len(), 20);
        // Newest of the 30 comes first.
        assert_eq!(history[0].timestamp_ms, 29);
    }

    #[test]
    fn transaction_histories_are_per_user() {
        let db = LedgerDb::open_temporary().unwrap();
        insert_tx(&db, &make_tx("alice", "a1", 1));
        insert_tx(&db, &make_tx("bob", "b1", 2));

        let alice = db.recent_transactions("alice", 20).unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].user, "alice");

        let bob = db.recent_transactions("bob", 20).unwrap();
        assert_eq!(bob.len(), 1);
        assert_eq!(bob[0].user, "bob");
    }

    #[test]
    fn same_timestamp_records_both_survive() {
        // Paired transfer legs share a timestamp; the record id breaks the tie.
        let db = LedgerDb::open_temporary().unwrap();
        insert_tx(&db, &make_tx("alice", "tx-a", 5_000));
        insert_tx(&db, &make_tx("alice", "tx-b", 5_000));
        assert_eq!(db.recent_transactions("alice", 20).unwrap().len(), 2);
    }

    #[test]
    fn pair_key_is_order_independent() {
        assert_eq!(pair_key("alice", "bob"), pair_key("bob", "alice"));
        assert_ne!(pair_key("alice", "bob"), pair_key("alice", "carol"));
    }

    #[test]
    fn users_with_push_tokens_filters() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut alice = UserRecord::new("alice", "Alice", 1);
        alice.push_token = Some("ExponentPushToken[a]".into());
        db.put_user(&alice).unwrap();
        db.put_user(&UserRecord::new("bob", "Bob", 2)).unwrap();

        let reachable = db.users_with_push_tokens().unwrap();
        assert_eq!(reachable.len(), 1);
        assert_eq!(reachable[0].id, "alice");
    }

    #[test]
    fn delivered_order_count_ignores_other_statuses() {
        let db = LedgerDb::open_temporary().unwrap();
        let statuses = [
            OrderStatus::Delivered,
            OrderStatus::Placed,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Shipped,
        ];
        for (i, status) in statuses.into_iter().enumerate() {
            db.put_order(&OrderRecord {
                id: format!("order-{i}"),
                user: "alice".into(),
                status,
                total_millimes: 10_000,
                timestamp_ms: i as u64,
            })
            .unwrap();
        }
        // Someone else's deliveries must not leak in.
        db.put_order(&OrderRecord {
            id: "order-x".into(),
            user: "bob".into(),
            status: OrderStatus::Delivered,
            total_millimes: 10_000,
            timestamp_ms: 99,
        })
        .unwrap();

        assert_eq!(db.delivered_order_count("alice").unwrap(), 2);
        assert_eq!(db.delivered_order_count("bob").unwrap(), 1);
    }

    #[test]
    fn concurrent_reads_do_not_block() {
        use std::sync::Arc;
        use std::thread;

        let db = Arc::new(LedgerDb::open_temporary().unwrap());
        for i in 0..10u64 {
            let mut user = UserRecord::new(&format!("user_{i}"), "User", i);
            user.wallet = crate::wallet::Wallet::with_balances(i * 100, 0);
            db.put_user(&user).unwrap();
        }

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    for i in 0..10u64 {
                        let user = db.get_user(&format!("user_{i}")).unwrap().unwrap();
                        assert_eq!(user.wallet.coins, i * 100);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("reader thread should not panic");
        }
    }
}
