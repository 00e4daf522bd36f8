// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Souk Ledger — Core Library
//!
//! The stateful heart of the Souk commerce platform: a per-user wallet of two
//! virtual currencies (coins and diamonds), the append-only transaction
//! history behind it, the friend graph that gates peer-to-peer transfers,
//! and the loyalty tiering read path.
//!
//! Everything that touches a balance goes through one place and one rule:
//! a balance never changes without its transaction record landing in the
//! same atomic commit. No exceptions, no "we'll backfill it later".
//!
//! ## Architecture
//!
//! The crate is split into modules that mirror the actual concerns of the
//! ledger:
//!
//! - **wallet** — Balance arithmetic, the recharge catalog, the gift catalog.
//! - **transaction** — Transaction records: the paper trail for every mutation.
//! - **social** — Friend requests and the friendship edge. Transfers need it.
//! - **loyalty** — Pure tiering arithmetic over delivered orders.
//! - **store** — Persistent storage abstraction over sled.
//! - **ledger** — The operations facade: every mutation, one atomic unit each.
//! - **config** — Product constants and exchange-rate arithmetic.
//!
//! ## Design Philosophy
//!
//! 1. Integer arithmetic only. Floating point never touches a balance.
//! 2. Preconditions are re-checked inside the transaction, not just at the
//!    call site. A stale UI balance must not become a negative ledger balance.
//! 3. Every public API is documented. If it touches money, it has tests.

pub mod config;
pub mod ledger;
pub mod loyalty;
pub mod social;
pub mod store;
pub mod transaction;
pub mod wallet;
