//! # Wallet Module — Balances & Catalogs
//!
//! The wallet is where value lives in Souk. Every coin purchased, every
//! diamond earned from a live-stream gift, every exchange between the two
//! passes through this module. If the transaction module is the paper trail,
//! the wallet is the vault it describes.
//!
//! ## Architecture
//!
//! ```text
//! balance.rs  — Wallet struct, checked credit/debit, Currency enum
//! packages.rs — The fixed recharge catalog (coins for cash)
//! gifts.rs    — The fixed gift catalog (coins in, diamonds out)
//! ```
//!
//! Balances are plain `u64` values mutated only through checked arithmetic.
//! The non-negativity invariant is enforced by construction: a debit that
//! would underflow is rejected before anything is written.

pub mod balance;
pub mod gifts;
pub mod packages;

pub use balance::{BalanceError, Currency, Wallet};
pub use gifts::Gift;
pub use packages::RechargePackage;
