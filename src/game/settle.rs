//! Winner determination seam.
//!
//! Hand evaluation is not part of this engine; integrators plug a real
//! evaluator in through [`WinnerSelector`]. The shipped [`FoldWinner`]
//! resolves the everyone-else-folded case and otherwise splits the pot
//! evenly among the seats still standing.

use super::types::{Chips, Slot};

/// Decides how the pot is distributed at showdown.
pub trait WinnerSelector: Send + Sync {
    /// Returns the payout per live slot, in the same order as `live_slots`.
    /// `board` and `hole_cards` carry decoded card values where known
    /// (`-1` for unknown); implementations may ignore them.
    fn distribute(
        &self,
        pot: Chips,
        live_slots: &[Slot],
        board: &[i32],
        hole_cards: &[Vec<i32>],
    ) -> Vec<Chips>;
}

#[derive(Default)]
pub struct FoldWinner;

impl WinnerSelector for FoldWinner {
    fn distribute(
        &self,
        pot: Chips,
        live_slots: &[Slot],
        _board: &[i32],
        _hole_cards: &[Vec<i32>],
    ) -> Vec<Chips> {
        if live_slots.is_empty() {
            return Vec::new();
        }
        let share = pot / live_slots.len() as Chips;
        live_slots.iter().map(|_| share).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sole_survivor_takes_the_pot() {
        let payouts = FoldWinner.distribute(0.04, &[1], &[], &[]);
        assert_eq!(payouts.len(), 1);
        assert!((payouts[0] - 0.04).abs() < 1e-9);
    }

    #[test]
    fn split_pot_across_survivors() {
        let payouts = FoldWinner.distribute(0.06, &[0, 2], &[], &[]);
        assert!((payouts.iter().sum::<f64>() - 0.06).abs() < 1e-9);
        assert!((payouts[0] - payouts[1]).abs() < 1e-12);
    }
}
