//! Dealer-side betting engine.
//!
//! Tracks per-seat funds and per-round bet amounts, applies player actions
//! with all-in coercion, decides whose turn is next and when a round ends.
//! All amounts are CHIPS. The engine is pure state; the dealer loop feeds it
//! polled actions and publishes the resulting `t_betting_state`.

use thiserror::Error;

use super::types::{
    BetAction, BettingState, Chips, PlayerBetAction, Slot, MAX_ROUNDS, TURN_TIMEOUT_BLOCKS,
    TURN_TIMEOUT_SECS,
};

const LOG_TARGET: &str = "game::betting";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BettingError {
    #[error("seat {0} is out of range")]
    InvalidSlot(Slot),

    #[error("action arrived for round {got}, expected {expected}")]
    WrongRound { expected: usize, got: usize },

    #[error("cannot check while facing a bet")]
    CannotCheckFacingBet,

    #[error("betting round index exhausted")]
    RoundOutOfRange,
}

#[derive(Clone, Debug)]
pub struct HandVars {
    pub num_players: usize,
    pub small_blind: Chips,
    pub big_blind: Chips,
    pub dealer_seat: Slot,

    pub round: usize,
    pub turn: Slot,
    pub last_turn: Slot,
    pub pot: Chips,
    pub last_raise: Chips,

    pub funds: Vec<Chips>,
    pub ini_funds: Vec<Chips>,
    bet_amounts: Vec<[Chips; MAX_ROUNDS]>,
    actions: Vec<[BetAction; MAX_ROUNDS]>,

    pub turn_start_time: i64,
    pub turn_start_block: u64,
}

impl HandVars {
    /// Seats are funded from the payin amounts recorded in `t_player_info`.
    pub fn new(payins: &[Chips], small_blind: Chips, big_blind: Chips, dealer_seat: Slot) -> Self {
        let num_players = payins.len();
        Self {
            num_players,
            small_blind,
            big_blind,
            dealer_seat,
            round: 0,
            turn: dealer_seat % num_players.max(1),
            last_turn: dealer_seat,
            pot: 0.0,
            last_raise: 0.0,
            funds: payins.to_vec(),
            ini_funds: payins.to_vec(),
            bet_amounts: vec![[0.0; MAX_ROUNDS]; num_players],
            actions: vec![[BetAction::None; MAX_ROUNDS]; num_players],
            turn_start_time: 0,
            turn_start_block: 0,
        }
    }

    pub fn bet_amount(&self, slot: Slot, round: usize) -> Chips {
        self.bet_amounts[slot][round]
    }

    pub fn action(&self, slot: Slot, round: usize) -> BetAction {
        self.actions[slot][round]
    }

    /// Highest bet among non-folded seats in the current round.
    pub fn max_bet(&self) -> Chips {
        (0..self.num_players)
            .filter(|&slot| !self.has_folded(slot))
            .map(|slot| self.bet_amounts[slot][self.round])
            .fold(0.0, Chips::max)
    }

    pub fn to_call(&self, slot: Slot) -> Chips {
        (self.max_bet() - self.bet_amounts[slot][self.round]).max(0.0)
    }

    pub fn has_folded(&self, slot: Slot) -> bool {
        self.actions[slot].iter().any(|a| a.is_fold())
    }

    pub fn is_all_in(&self, slot: Slot) -> bool {
        self.actions[slot].iter().any(|a| a.is_allin()) || self.funds[slot] <= 0.0
    }

    pub fn players_left(&self) -> usize {
        (0..self.num_players)
            .filter(|&slot| !self.has_folded(slot))
            .count()
    }

    /// Seats still able to win the pot, in slot order.
    pub fn live_slots(&self) -> Vec<Slot> {
        (0..self.num_players)
            .filter(|&slot| !self.has_folded(slot))
            .collect()
    }

    /// Record a fold for every round; used when a seat times out during a
    /// reveal and is removed from the hand entirely.
    pub fn fold_all_rounds(&mut self, slot: Slot) {
        for round in 0..MAX_ROUNDS {
            self.actions[slot][round] = BetAction::Fold;
        }
    }

    pub fn start_turn(&mut self, now_secs: i64, height: u64) {
        self.turn_start_time = now_secs;
        self.turn_start_block = height;
    }

    /// A turn times out only when the wall clock *and* the chain have both
    /// moved past their thresholds; either alone is insufficient.
    pub fn turn_timed_out(&self, now_secs: i64, height: u64) -> bool {
        let elapsed_secs = now_secs - self.turn_start_time;
        let elapsed_blocks = height.saturating_sub(self.turn_start_block);
        elapsed_secs >= TURN_TIMEOUT_SECS && elapsed_blocks >= TURN_TIMEOUT_BLOCKS
    }

    /// Apply the current seat's action. Amounts beyond the seat's remaining
    /// funds coerce the action to all-in. Returns the action as recorded.
    pub fn process_action(
        &mut self,
        slot: Slot,
        action: &PlayerBetAction,
    ) -> Result<BetAction, BettingError> {
        if slot >= self.num_players {
            return Err(BettingError::InvalidSlot(slot));
        }
        if self.round >= MAX_ROUNDS {
            return Err(BettingError::RoundOutOfRange);
        }
        if action.round != self.round {
            return Err(BettingError::WrongRound {
                expected: self.round,
                got: action.round,
            });
        }

        let round = self.round;
        let available = self.funds[slot];
        let mut amount = action.amount;

        let recorded = match action.action {
            BetAction::Fold => {
                self.actions[slot][round] = BetAction::Fold;
                BetAction::Fold
            }
            BetAction::Check => {
                if self.to_call(slot) > 0.0 {
                    return Err(BettingError::CannotCheckFacingBet);
                }
                self.actions[slot][round] = BetAction::Check;
                BetAction::Check
            }
            BetAction::Call => {
                let mut to_call = self.to_call(slot);
                let mut recorded = BetAction::Call;
                if to_call > available {
                    to_call = available;
                    recorded = BetAction::Allin;
                }
                self.commit(slot, to_call);
                self.actions[slot][round] = recorded;
                recorded
            }
            BetAction::Raise => {
                let mut recorded = BetAction::Raise;
                if amount > available {
                    amount = available;
                    recorded = BetAction::Allin;
                } else {
                    self.last_raise = amount;
                }
                self.commit(slot, amount);
                self.actions[slot][round] = recorded;
                recorded
            }
            BetAction::Allin => {
                let all = self.funds[slot];
                self.commit(slot, all);
                self.actions[slot][round] = BetAction::Allin;
                BetAction::Allin
            }
            BetAction::Bet | BetAction::SmallBlind => {
                let recorded = if amount > available {
                    amount = available;
                    BetAction::Allin
                } else {
                    BetAction::SmallBlind
                };
                self.commit(slot, amount);
                self.actions[slot][round] = recorded;
                recorded
            }
            BetAction::BigBlind => {
                let recorded = if amount > available {
                    amount = available;
                    BetAction::Allin
                } else {
                    BetAction::BigBlind
                };
                self.commit(slot, amount);
                self.actions[slot][round] = recorded;
                recorded
            }
            BetAction::None | BetAction::RoundBetting => self.actions[slot][round],
        };

        tracing::info!(
            target: LOG_TARGET,
            slot,
            round,
            action = ?recorded,
            pot = self.pot,
            funds = self.funds[slot],
            "betting action applied"
        );
        Ok(recorded)
    }

    fn commit(&mut self, slot: Slot, amount: Chips) {
        self.bet_amounts[slot][self.round] += amount;
        self.funds[slot] -= amount;
        self.pot += amount;
    }

    /// Next seat that still owes an action this round, or `None` when the
    /// round is complete. Folded seats, all-in seats and empty stacks are
    /// skipped.
    pub fn next_turn(&self) -> Option<Slot> {
        let max_bet = self.max_bet();
        for offset in 1..=self.num_players {
            let slot = (self.turn + offset) % self.num_players;
            if self.has_folded(slot) || self.is_all_in(slot) {
                continue;
            }
            if self.actions[slot][self.round] == BetAction::None {
                return Some(slot);
            }
            if self.bet_amounts[slot][self.round] < max_bet {
                return Some(slot);
            }
        }
        None
    }

    /// Close the current round; turn resets to the dealer seat.
    pub fn advance_round(&mut self) -> Result<(), BettingError> {
        if self.round + 1 > MAX_ROUNDS {
            return Err(BettingError::RoundOutOfRange);
        }
        self.round += 1;
        self.turn = self.dealer_seat % self.num_players;
        Ok(())
    }

    fn min_amount_for(&self, action: BetAction) -> Chips {
        match action {
            BetAction::SmallBlind => self.small_blind,
            BetAction::BigBlind => self.big_blind,
            _ => self.to_call(self.turn),
        }
    }

    fn possibilities_for(&self, action: BetAction) -> Vec<BetAction> {
        match action {
            BetAction::SmallBlind | BetAction::BigBlind => vec![BetAction::Bet],
            _ => {
                let mut options = Vec::new();
                if self.to_call(self.turn) <= 0.0 {
                    options.push(BetAction::Check);
                } else {
                    options.push(BetAction::Call);
                }
                options.extend([BetAction::Raise, BetAction::Fold, BetAction::Allin]);
                options
            }
        }
    }

    /// `t_betting_state` payload for the seat now on turn.
    pub fn betting_state(&self, action: BetAction) -> BettingState {
        BettingState {
            current_turn: self.turn,
            round: self.round,
            pot: self.pot,
            action,
            last_turn: self.last_turn,
            turn_start_time: self.turn_start_time,
            turn_start_block: self.turn_start_block,
            timeout_secs: TURN_TIMEOUT_SECS,
            timeout_blocks: TURN_TIMEOUT_BLOCKS,
            min_amount: self.min_amount_for(action),
            bet_amounts: (0..self.num_players)
                .map(|slot| self.bet_amounts[slot][self.round])
                .collect(),
            player_funds: self.funds.clone(),
            possibilities: self.possibilities_for(action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(kind: BetAction, amount: Chips, round: usize) -> PlayerBetAction {
        PlayerBetAction {
            action: kind,
            amount,
            round,
            turn_start_block: 0,
            auto_fold: false,
        }
    }

    fn two_player_vars() -> HandVars {
        HandVars::new(&[1.0, 1.0], 0.01, 0.02, 0)
    }

    #[test]
    fn blinds_then_call_closes_preflop() {
        let mut vars = two_player_vars();

        // SB posts, BB posts.
        vars.process_action(0, &action(BetAction::Bet, 0.01, 0)).unwrap();
        vars.turn = 1;
        vars.process_action(1, &action(BetAction::BigBlind, 0.02, 0))
            .unwrap();

        // SB owes 0.01 more.
        assert_eq!(vars.next_turn(), Some(0));
        vars.turn = 0;
        assert!((vars.to_call(0) - 0.01).abs() < 1e-9);
        vars.process_action(0, &action(BetAction::Call, 0.01, 0)).unwrap();

        // Everyone has acted and the bets match: the round is over.
        assert_eq!(vars.next_turn(), None);
        assert!((vars.pot - 0.04).abs() < 1e-9);
    }

    #[test]
    fn pot_equals_sum_of_round_bets() {
        let mut vars = two_player_vars();
        vars.process_action(0, &action(BetAction::Bet, 0.01, 0)).unwrap();
        vars.turn = 1;
        vars.process_action(1, &action(BetAction::Raise, 0.05, 0)).unwrap();
        vars.turn = 0;
        vars.process_action(0, &action(BetAction::Call, 0.0, 0)).unwrap();

        let total: Chips = (0..vars.num_players)
            .map(|slot| vars.bet_amount(slot, 0))
            .sum();
        assert!((vars.pot - total).abs() < 1e-9);
        // Funds are monotonically non-increasing against the initial stake.
        for slot in 0..vars.num_players {
            assert!(vars.funds[slot] <= vars.ini_funds[slot]);
        }
    }

    #[test]
    fn oversized_bet_is_coerced_to_all_in() {
        let mut vars = HandVars::new(&[0.05, 1.0], 0.01, 0.02, 0);
        let recorded = vars
            .process_action(0, &action(BetAction::Raise, 0.50, 0))
            .unwrap();
        assert_eq!(recorded, BetAction::Allin);
        assert!(vars.funds[0].abs() < 1e-12);
        assert!((vars.bet_amount(0, 0) - 0.05).abs() < 1e-9);
        assert!(vars.is_all_in(0));
    }

    #[test]
    fn cannot_check_facing_a_bet() {
        let mut vars = two_player_vars();
        vars.process_action(0, &action(BetAction::Bet, 0.02, 0)).unwrap();
        vars.turn = 1;
        let err = vars
            .process_action(1, &action(BetAction::Check, 0.0, 0))
            .unwrap_err();
        assert_eq!(err, BettingError::CannotCheckFacingBet);
    }

    #[test]
    fn next_turn_skips_folded_and_all_in_seats() {
        let mut vars = HandVars::new(&[1.0, 1.0, 1.0], 0.01, 0.02, 0);
        vars.process_action(0, &action(BetAction::Bet, 0.02, 0)).unwrap();
        vars.turn = 1;
        vars.process_action(1, &action(BetAction::Fold, 0.0, 0)).unwrap();
        // Seat 2 still owes a call; seat 1 folded.
        assert_eq!(vars.next_turn(), Some(2));
        vars.turn = 2;
        vars.process_action(2, &action(BetAction::Allin, 0.0, 0)).unwrap();

        // Seat 0 now faces the all-in; seats 1 and 2 are out of the rotation.
        assert_eq!(vars.next_turn(), Some(0));
        vars.turn = 0;
        vars.process_action(0, &action(BetAction::Call, 0.0, 0)).unwrap();
        assert_eq!(vars.next_turn(), None);

        assert_eq!(vars.players_left(), 2);
        assert_eq!(vars.live_slots(), vec![0, 2]);
    }

    #[test]
    fn fold_in_an_earlier_round_sticks() {
        let mut vars = HandVars::new(&[1.0, 1.0, 1.0], 0.01, 0.02, 0);
        vars.turn = 1;
        vars.process_action(1, &action(BetAction::Fold, 0.0, 0)).unwrap();
        vars.advance_round().unwrap();
        assert!(vars.has_folded(1));
        // Seat 1 never comes back on turn.
        vars.turn = 0;
        vars.process_action(0, &action(BetAction::Check, 0.0, 1)).unwrap();
        assert_eq!(vars.next_turn(), Some(2));
    }

    #[test]
    fn timeout_requires_both_clocks() {
        let mut vars = two_player_vars();
        vars.start_turn(1_000, 100);

        // Neither elapsed.
        assert!(!vars.turn_timed_out(1_010, 101));
        // Only wall clock elapsed.
        assert!(!vars.turn_timed_out(1_070, 102));
        // Only blocks elapsed.
        assert!(!vars.turn_timed_out(1_030, 110));
        // Both elapsed.
        assert!(vars.turn_timed_out(1_061, 106));
    }

    #[test]
    fn wrong_round_action_is_rejected() {
        let mut vars = two_player_vars();
        let err = vars
            .process_action(0, &action(BetAction::Call, 0.0, 2))
            .unwrap_err();
        assert_eq!(
            err,
            BettingError::WrongRound {
                expected: 0,
                got: 2
            }
        );
    }

    #[test]
    fn betting_state_payload_reflects_turn() {
        let mut vars = two_player_vars();
        vars.start_turn(500, 42);
        let state = vars.betting_state(BetAction::SmallBlind);
        assert_eq!(state.current_turn, 0);
        assert_eq!(state.possibilities, vec![BetAction::Bet]);
        assert!((state.min_amount - 0.01).abs() < 1e-9);
        assert_eq!(state.turn_start_block, 42);
        assert_eq!(state.timeout_secs, TURN_TIMEOUT_SECS);
    }
}
