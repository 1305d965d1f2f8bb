pub mod cashier_deck_info;
pub mod dealer_deck_info;
pub mod game_history;
pub mod player_deck_info;
pub mod player_local_state;
