//! # Product Configuration & Constants
//!
//! Every magic number in the Souk ledger lives here. If you're hardcoding a
//! rate or a threshold somewhere else, you're doing it wrong and you owe the
//! team coffee.
//!
//! The exchange rates and the withdrawal minimum are product decisions
//! inherited from the storefront. They are deliberately not configurable at
//! runtime: a rate that can drift between two deployments is a reconciliation
//! incident waiting to happen.

// ---------------------------------------------------------------------------
// Cash Denomination
// ---------------------------------------------------------------------------

/// Smallest cash unit. All cash amounts in the ledger are integers in
/// millimes; 1 TND = 1000 millimes. Display formatting divides at the edge.
pub const MILLIMES_PER_DINAR: u64 = 1_000;

// ---------------------------------------------------------------------------
// Exchange Rates
// ---------------------------------------------------------------------------

/// Diamonds convert to coins 1:1. Earning currency spends at face value.
pub const DIAMOND_TO_COIN_RATE: u64 = 1;

/// Coins convert to diamonds at 70%, expressed as a ratio so the arithmetic
/// stays in integers. The missing 30% is the conversion fee, and it is
/// one-directional: diamonds-to-coins pays no fee.
pub const COIN_TO_DIAMOND_NUM: u64 = 7;
pub const COIN_TO_DIAMOND_DEN: u64 = 10;

/// Cash value of one diamond, in millimes (0.010 TND).
pub const DIAMOND_VALUE_MILLIMES: u64 = 10;

/// Minimum cash value required to file a withdrawal request: 50 TND.
/// At the current rate that is 5000 diamonds.
pub const MIN_WITHDRAWAL_MILLIMES: u64 = 50 * MILLIMES_PER_DINAR;

// ---------------------------------------------------------------------------
// Loyalty
// ---------------------------------------------------------------------------

/// Delivered orders required to complete one loyalty card.
pub const ORDERS_PER_CARD: u64 = 10;

/// Number of cards shown on the loyalty card wall.
pub const CARD_WALL_SIZE: usize = 5;

// ---------------------------------------------------------------------------
// History & Push
// ---------------------------------------------------------------------------

/// Default page size for transaction history reads.
pub const HISTORY_LIMIT: usize = 20;

/// Maximum recipients per push-gateway request. The gateway rejects larger
/// batches, so the dispatcher chunks at exactly this size.
pub const PUSH_CHUNK_SIZE: usize = 100;

/// Default push-gateway endpoint (Expo-compatible).
pub const DEFAULT_PUSH_ENDPOINT: &str = "https://exp.host/--/api/v2/push/send";

// ---------------------------------------------------------------------------
// Network Defaults
// ---------------------------------------------------------------------------

/// Default REST/WS API port.
pub const DEFAULT_API_PORT: u16 = 8470;

/// Default Prometheus metrics port.
pub const DEFAULT_METRICS_PORT: u16 = 8471;

// ---------------------------------------------------------------------------
// Rate Arithmetic
// ---------------------------------------------------------------------------

/// Converts coins to diamonds at the 70% rate, rounding up.
///
/// `ceil(amount * 7 / 10)` — the ceiling matches the storefront's quote, so
/// the amount previewed to the user is the amount credited. Returns `None`
/// on arithmetic overflow.
pub fn coins_to_diamonds(amount: u64) -> Option<u64> {
    let scaled = amount.checked_mul(COIN_TO_DIAMOND_NUM)?;
    Some(scaled.div_ceil(COIN_TO_DIAMOND_DEN))
}

/// Converts diamonds to coins at the 1:1 rate.
///
/// Returns `None` on overflow (only reachable if the rate ever exceeds 1).
pub fn diamonds_to_coins(amount: u64) -> Option<u64> {
    amount.checked_mul(DIAMOND_TO_COIN_RATE)
}

/// Cash value of a diamond balance, in millimes.
pub fn diamond_cash_value_millimes(diamonds: u64) -> Option<u64> {
    diamonds.checked_mul(DIAMOND_VALUE_MILLIMES)
}

/// Formats a millime amount as a TND string, e.g. `3.000 TND`.
pub fn format_millimes(amount: u64) -> String {
    format!(
        "{}.{:03} TND",
        amount / MILLIMES_PER_DINAR,
        amount % MILLIMES_PER_DINAR
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coin_to_diamond_rate_rounds_up() {
        // 70% of 10 is exactly 7.
        assert_eq!(coins_to_diamonds(10), Some(7));
        // 70% of 1 is 0.7, which rounds up to 1.
        assert_eq!(coins_to_diamonds(1), Some(1));
        // 70% of 15 is 10.5, rounds up to 11.
        assert_eq!(coins_to_diamonds(15), Some(11));
        assert_eq!(coins_to_diamonds(0), Some(0));
    }

    #[test]
    fn coin_to_diamond_overflow_is_none() {
        assert_eq!(coins_to_diamonds(u64::MAX), None);
    }

    #[test]
    fn diamond_to_coin_rate_is_one_to_one() {
        assert_eq!(diamonds_to_coins(0), Some(0));
        assert_eq!(diamonds_to_coins(12_345), Some(12_345));
    }

    #[test]
    fn round_trip_never_gains() {
        // Diamonds -> coins -> diamonds must never exceed the original:
        // the fee is one-directional and lossy.
        for original in [1u64, 10, 33, 100, 9_999] {
            let coins = diamonds_to_coins(original).unwrap();
            let back = coins_to_diamonds(coins).unwrap();
            assert!(back <= original, "gained value: {original} -> {back}");
        }
    }

    #[test]
    fn withdrawal_minimum_in_diamonds() {
        // The 50 TND floor corresponds to exactly 5000 diamonds.
        assert_eq!(diamond_cash_value_millimes(5_000), Some(MIN_WITHDRAWAL_MILLIMES));
        assert!(diamond_cash_value_millimes(4_999).unwrap() < MIN_WITHDRAWAL_MILLIMES);
    }

    #[test]
    fn millime_formatting() {
        assert_eq!(format_millimes(3_000), "3.000 TND");
        assert_eq!(format_millimes(150_000), "150.000 TND");
        assert_eq!(format_millimes(50), "0.050 TND");
        assert_eq!(format_millimes(0), "0.000 TND");
    }

    #[test]
    fn rate_constants_sanity() {
        // The coin-to-diamond ratio must stay strictly below 1, or the
        // exchange loop becomes a money printer.
        assert!(COIN_TO_DIAMOND_NUM < COIN_TO_DIAMOND_DEN);
        assert!(MIN_WITHDRAWAL_MILLIMES > 0);
        assert!(DIAMOND_VALUE_MILLIMES > 0);
    }
}
