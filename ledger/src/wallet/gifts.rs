//! # Gift Catalog
//!
//! Gifts are how diamonds enter the economy: a viewer spends coins on a gift
//! during a live stream, and the host receives the gift's value in diamonds.
//! The catalog is compiled in for the same reason the recharge catalog is.

use serde::Serialize;

use crate::config::DIAMOND_TO_COIN_RATE;

/// A sendable gift. Serialized for catalog listings; never read back in,
/// so the static strings stay static.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Gift {
    /// Catalog identifier.
    pub id: &'static str,
    /// Display name shown in the gift tray and transaction history.
    pub name: &'static str,
    /// Coin price paid by the sender.
    pub price_coins: u64,
}

impl Gift {
    /// Diamonds credited to the recipient.
    pub fn diamonds(&self) -> u64 {
        self.price_coins * DIAMOND_TO_COIN_RATE
    }
}

/// The full gift catalog, cheapest first.
pub const CATALOG: &[Gift] = &[
    Gift { id: "rose", name: "Rose", price_coins: 1 },
    Gift { id: "heart", name: "Heart", price_coins: 5 },
    Gift { id: "perfume", name: "Perfume", price_coins: 20 },
    Gift { id: "handbag", name: "Handbag", price_coins: 100 },
    Gift { id: "crown", name: "Crown", price_coins: 500 },
    Gift { id: "lion", name: "Lion", price_coins: 2_000 },
];

/// Looks up a gift by its catalog id.
pub fn by_id(id: &str) -> Option<&'static Gift> {
    CATALOG.iter().find(|g| g.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_id() {
        assert_eq!(by_id("rose").unwrap().price_coins, 1);
        assert!(by_id("yacht").is_none());
    }

    #[test]
    fn diamonds_match_coin_price_at_current_rate() {
        for gift in CATALOG {
            assert_eq!(gift.diamonds(), gift.price_coins);
        }
    }

    #[test]
    fn catalog_is_sorted_by_price() {
        for window in CATALOG.windows(2) {
            assert!(window[0].price_coins < window[1].price_coins);
        }
    }
}
