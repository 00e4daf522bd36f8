//! # Loyalty Tiering
//!
//! Pure derived-value arithmetic over a user's delivered-order count. Ten
//! delivered orders fill one loyalty card; the wall shows a fixed number of
//! cards with the first incomplete one active. Nothing here persists; the
//! tiering is recomputed from the order history on every read.

use serde::{Deserialize, Serialize};

use crate::config::{CARD_WALL_SIZE, ORDERS_PER_CARD};

/// Summary tiering numbers for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyStatus {
    /// Total delivered orders the tiering was computed from.
    pub delivered_orders: u64,
    /// Fully completed cards: `delivered / 10`.
    pub completed_cards: u64,
    /// Points on the active card: `delivered % 10`.
    pub active_points: u64,
}

/// Render state of a single card on the wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardStatus {
    /// All ten points stamped.
    Completed,
    /// The card currently collecting points.
    Active,
    /// Not reached yet.
    Locked,
}

/// One card on the loyalty wall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltyCard {
    /// Position on the wall, 1-based.
    pub index: u32,
    /// Stamped points, 0..=10.
    pub points: u64,
    /// Render state.
    pub status: CardStatus,
}

/// Computes the tiering summary from a delivered-order count.
pub fn tiering(delivered_orders: u64) -> LoyaltyStatus {
    LoyaltyStatus {
        delivered_orders,
        completed_cards: delivered_orders / ORDERS_PER_CARD,
        active_points: delivered_orders % ORDERS_PER_CARD,
    }
}

/// Builds the card wall: completed cards first, then the active card, then
/// locked placeholders up to [`CARD_WALL_SIZE`].
pub fn card_wall(delivered_orders: u64) -> Vec<LoyaltyCard> {
    let status = tiering(delivered_orders);
    (0..CARD_WALL_SIZE as u64)
        .map(|i| {
            let (points, card_status) = if i < status.completed_cards {
                (ORDERS_PER_CARD, CardStatus::Completed)
            } else if i == status.completed_cards {
                (status.active_points, CardStatus::Active)
            } else {
                (0, CardStatus::Locked)
            };
            LoyaltyCard {
                index: i as u32 + 1,
                points,
                status: card_status,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiering_reference_points() {
        // The canonical table: N delivered orders -> (cards, points).
        let cases = [(0, 0, 0), (9, 0, 9), (10, 1, 0), (15, 1, 5), (20, 2, 0)];
        for (delivered, cards, points) in cases {
            let status = tiering(delivered);
            assert_eq!(status.completed_cards, cards, "delivered = {delivered}");
            assert_eq!(status.active_points, points, "delivered = {delivered}");
        }
    }

    #[test]
    fn empty_wall_has_one_active_card() {
        let wall = card_wall(0);
        assert_eq!(wall.len(), CARD_WALL_SIZE);
        assert_eq!(wall[0].status, CardStatus::Active);
        assert_eq!(wall[0].points, 0);
        assert!(wall[1..].iter().all(|c| c.status == CardStatus::Locked));
    }

    #[test]
    fn wall_marks_completed_active_locked() {
        let wall = card_wall(15);
        assert_eq!(wall[0].status, CardStatus::Completed);
        assert_eq!(wall[0].points, 10);
        assert_eq!(wall[1].status, CardStatus::Active);
        assert_eq!(wall[1].points, 5);
        assert_eq!(wall[2].status, CardStatus::Locked);
        assert_eq!(wall[2].points, 0);
    }

    #[test]
    fn wall_indices_are_one_based() {
        let wall = card_wall(3);
        let indices: Vec<u32> = wall.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn full_wall_has_no_active_card() {
        // More delivered orders than the wall can show: every visible card
        // is completed.
        let wall = card_wall(ORDERS_PER_CARD * CARD_WALL_SIZE as u64);
        assert!(wall.iter().all(|c| c.status == CardStatus::Completed));
    }
}
