//! # Dual-Currency Balance
//!
//! Every user holds exactly two balances: coins (the spending currency,
//! purchased with cash) and diamonds (the earning currency, received through
//! gifts and convertible back to cash). A [`Wallet`] is the pair, plus the
//! checked arithmetic that keeps both non-negative.
//!
//! Balances are mutated only through [`Wallet::credit`] and
//! [`Wallet::debit`]; nothing in the crate assigns an absolute value to a
//! balance during normal operation. The single exception is the withdrawal
//! request, which drains the diamond balance via [`Wallet::drain_diamonds`].

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Currency
// ---------------------------------------------------------------------------

/// The two virtual currencies of the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    /// Spending currency. Purchased with cash through recharge packages.
    Coins,
    /// Earning currency. Received through gifts, convertible to cash or coins.
    Diamonds,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Coins => write!(f, "coins"),
            Self::Diamonds => write!(f, "diamonds"),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during balance operations.
#[derive(Debug, Error)]
pub enum BalanceError {
    /// Attempted to debit more than the available balance.
    #[error("insufficient balance: available {available}, requested {requested} ({currency})")]
    InsufficientBalance {
        /// The currency that was being debited.
        currency: Currency,
        /// The current balance.
        available: u64,
        /// The amount that was requested.
        requested: u64,
    },

    /// Arithmetic overflow during a credit operation. If you're hitting
    /// this, someone is crediting more than 18.4 quintillion units. That's
    /// either a bug or an attack.
    #[error("balance overflow: current {current}, credit {credit} ({currency})")]
    Overflow {
        /// The currency that was being credited.
        currency: Currency,
        /// The balance before the failed credit.
        current: u64,
        /// The amount that caused the overflow.
        credit: u64,
    },
}

// ---------------------------------------------------------------------------
// Wallet
// ---------------------------------------------------------------------------

/// A user's coin and diamond balances.
///
/// Embedded in the user record and persisted with it. Concurrent access is
/// coordinated at the storage layer: the ledger only mutates wallets inside
/// a multi-tree sled transaction, so a `Wallet` value in hand is always a
/// consistent snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Coin balance, in whole coins.
    pub coins: u64,
    /// Diamond balance, in whole diamonds.
    pub diamonds: u64,
}

impl Wallet {
    /// Creates an empty wallet. New users start with nothing.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a wallet with explicit balances. Test seeding, mostly.
    pub fn with_balances(coins: u64, diamonds: u64) -> Self {
        Self { coins, diamonds }
    }

    /// Returns the balance of the given currency.
    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::Coins => self.coins,
            Currency::Diamonds => self.diamonds,
        }
    }

    /// Credits (adds) funds to a currency.
    ///
    /// Returns the new balance on success.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::Overflow`] if the credit would exceed `u64::MAX`.
    pub fn credit(&mut self, currency: Currency, amount: u64) -> Result<u64, BalanceError> {
        let slot = self.slot_mut(currency);
        let new_balance = slot.checked_add(amount).ok_or(BalanceError::Overflow {
            currency,
            current: *slot,
            credit: amount,
        })?;
        *slot = new_balance;
        Ok(new_balance)
    }

    /// Debits (subtracts) funds from a currency.
    ///
    /// Returns the remaining balance on success.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::InsufficientBalance`] if the debit exceeds
    /// the current balance.
    pub fn debit(&mut self, currency: Currency, amount: u64) -> Result<u64, BalanceError> {
        let slot = self.slot_mut(currency);
        if *slot < amount {
            return Err(BalanceError::InsufficientBalance {
                currency,
                available: *slot,
                requested: amount,
            });
        }
        *slot -= amount;
        Ok(*slot)
    }

    /// Empties the diamond balance and returns the amount drained.
    ///
    /// Used by the withdrawal request, which cashes out the entire diamond
    /// balance in one shot.
    pub fn drain_diamonds(&mut self) -> u64 {
        std::mem::take(&mut self.diamonds)
    }

    fn slot_mut(&mut self, currency: Currency) -> &mut u64 {
        match currency {
            Currency::Coins => &mut self.coins,
            Currency::Diamonds => &mut self.diamonds,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
