//! # Transaction Module
//!
//! The paper trail. Every balance-changing operation on the ledger writes at
//! least one [`TransactionRecord`], in the same atomic commit as the balance
//! mutation. Records are append-only: nothing in the crate updates or
//! deletes one after it lands, with the single exception of a withdrawal
//! request flipping from `Pending` to `Completed` during manual settlement,
//! which happens outside this codebase.

pub mod types;

pub use types::{TransactionKind, TransactionRecord, TransactionStatus};
