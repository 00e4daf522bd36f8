//! # Recharge Catalog
//!
//! The fixed set of coin packages a user can purchase. Larger packages carry
//! a bonus, which is credited in the same operation and recorded in the same
//! transaction description the storefront shows.
//!
//! The catalog is compiled in rather than stored: packages change with app
//! releases, not at runtime, and a ledger that can disagree with the client
//! about what package `3` costs is worse than a redeploy.

use serde::{Deserialize, Serialize};

use crate::config::format_millimes;

/// A purchasable coin package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RechargePackage {
    /// Catalog identifier, stable across releases.
    pub id: u32,
    /// Coins credited on purchase.
    pub coins: u64,
    /// Bonus coins credited on top.
    pub bonus: u64,
    /// Cash price in millimes.
    pub price_millimes: u64,
}

impl RechargePackage {
    /// Total coins credited: base plus bonus.
    pub fn total_coins(&self) -> u64 {
        self.coins + self.bonus
    }

    /// Human-readable price string, e.g. `15.000 TND`.
    pub fn price_display(&self) -> String {
        format_millimes(self.price_millimes)
    }
}

/// The full recharge catalog, cheapest first.
pub const CATALOG: &[RechargePackage] = &[
    RechargePackage { id: 1, coins: 100, bonus: 0, price_millimes: 3_000 },
    RechargePackage { id: 2, coins: 550, bonus: 50, price_millimes: 15_000 },
    RechargePackage { id: 3, coins: 1_200, bonus: 200, price_millimes: 30_000 },
    RechargePackage { id: 4, coins: 2_500, bonus: 500, price_millimes: 60_000 },
    RechargePackage { id: 5, coins: 6_500, bonus: 1_500, price_millimes: 150_000 },
    RechargePackage { id: 6, coins: 13_500, bonus: 3_500, price_millimes: 300_000 },
];

/// Looks up a package by its catalog id.
pub fn by_id(id: u32) -> Option<&'static RechargePackage> {
    CATALOG.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_ids_are_unique_and_ordered() {
        for window in CATALOG.windows(2) {
            assert!(window[0].id < window[1].id);
            assert!(window[0].price_millimes < window[1].price_millimes);
        }
    }

    #[test]
    fn lookup_by_id() {
        let pack = by_id(1).expect("package 1 exists");
        assert_eq!(pack.coins, 100);
        assert_eq!(pack.bonus, 0);
        assert_eq!(pack.price_millimes, 3_000);
        assert!(by_id(99).is_none());
    }

    #[test]
    fn total_includes_bonus() {
        let pack = by_id(2).unwrap();
        assert_eq!(pack.total_coins(), 600);
    }

    #[test]
    fn price_display_formatting() {
        assert_eq!(by_id(1).unwrap().price_display(), "3.000 TND");
        assert_eq!(by_id(6).unwrap().price_display(), "300.000 TND");
    }
}
