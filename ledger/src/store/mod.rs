//! # Store Module
//!
//! Persistent storage for the ledger, built on sled's embedded key-value
//! store. The storefront clients used to delegate persistence and
//! multi-document atomicity to a hosted document database; this module
//! supplies the same contract locally:
//!
//! - named trees play the role of collections,
//! - bincode blobs play the role of documents,
//! - sled's serializable multi-tree transactions play the role of the atomic
//!   compare-and-set across documents (optimistic, automatically retried on
//!   conflict by sled).
//!
//! ```text
//! records.rs — UserRecord, OrderRecord: the documents
//! db.rs      — LedgerDb: tree layout, keys, typed accessors
//! ```
//!
//! Business rules live one level up in [`crate::ledger`]; this module only
//! knows how bytes are laid out.

pub mod db;
pub mod records;

pub use db::{DbError, DbResult, LedgerDb};
pub use records::{OrderRecord, OrderStatus, UserRecord};
