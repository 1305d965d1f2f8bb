//! Logical key catalog for the on-chain content multimaps.
//!
//! Every logical key is namespaced under the configured prefix
//! (`chips.vrsc::poker.<org>.`) and, for per-hand keys, suffixed with
//! `.<game_id>` so entries from earlier hands never collide.

pub const T_GAME_ID: &str = "t_game_id";
pub const T_TABLE_INFO: &str = "t_table_info";
pub const T_PLAYER_INFO: &str = "t_player_info";
pub const T_GAME_INFO: &str = "t_game_info";
pub const T_BETTING_STATE: &str = "t_betting_state";
pub const T_BOARD_CARDS: &str = "t_board_cards";
pub const T_SETTLEMENT_INFO: &str = "t_settlement_info";
pub const T_CARD_BV: &str = "t_card_bv";
pub const T_D_DECK: &str = "t_d_deck";
pub const T_B_DECK: &str = "t_b_deck";

pub const PLAYER_DECK: &str = "player_deck";
pub const P_DECODED_CARD: &str = "p_decoded_card";
pub const P_BETTING_ACTION: &str = "p_betting_action";
pub const P_JOIN_REQUEST: &str = "p_join_request";
pub const P_GAME_HISTORY: &str = "p_game_history";
pub const P_DISPUTE_REQUEST: &str = "p_dispute_request";

pub const C_DISPUTE_RESULT: &str = "c_dispute_result";
pub const CASHIERS: &str = "cashiers";
pub const DEALERS: &str = "dealers";

/// Per-slot dealer-blinded deck key (`slot` is 0-based).
pub fn t_d_p_deck(slot: usize) -> String {
    format!("t_d_p{}_deck", slot + 1)
}

/// Per-slot cashier-blinded deck key (`slot` is 0-based).
pub fn t_b_p_deck(slot: usize) -> String {
    format!("t_b_p{}_deck", slot + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_slot_deck_keys_are_one_based() {
        assert_eq!(t_d_p_deck(0), "t_d_p1_deck");
        assert_eq!(t_d_p_deck(8), "t_d_p9_deck");
        assert_eq!(t_b_p_deck(1), "t_b_p2_deck");
    }
}
