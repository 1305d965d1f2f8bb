use serde::{Deserialize, Serialize};

use crate::game::types::{BetAction, BettingState, Chips, SettlementInfo, Slot, TableInfo};

/// One seat as shown in the lobby view.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SeatView {
    pub seat_name: String,
    pub seat: Slot,
    pub chips: Chips,
    pub empty: bool,
    pub playing: bool,
}

/// Server -> client messages. The `method` tags are fixed wire names.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum GuiPush {
    #[serde(rename = "backend_status")]
    BackendStatus { ready: bool },

    #[serde(rename = "table_info")]
    TableInfo { table: TableInfo },

    #[serde(rename = "seats")]
    Seats { seats: Vec<SeatView> },

    #[serde(rename = "deal")]
    Deal {
        hole_cards: Vec<i32>,
        board: Vec<i32>,
    },

    #[serde(rename = "betting")]
    Betting { state: BettingState },

    #[serde(rename = "finalInfo")]
    FinalInfo { settlement: SettlementInfo },

    #[serde(rename = "walletInfo")]
    WalletInfo { balance: Chips, address: String },

    #[serde(rename = "player_init_state")]
    PlayerInitState {
        player_id: Slot,
        table_id: String,
        game_id: String,
    },
}

/// Client -> server messages.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum GuiCommand {
    #[serde(rename = "player_join")]
    PlayerJoin,

    #[serde(rename = "join_table")]
    JoinTable { table_id: String },

    #[serde(rename = "betting")]
    Betting { action: BetAction, amount: Chips },

    #[serde(rename = "withdraw")]
    Withdraw { amount: Chips, address: String },

    #[serde(rename = "table_info")]
    TableInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_messages_carry_method_tags() {
        let json = serde_json::to_value(GuiPush::BackendStatus { ready: true }).unwrap();
        assert_eq!(json["method"], "backend_status");

        let json = serde_json::to_value(GuiPush::FinalInfo {
            settlement: SettlementInfo {
                player_ids: vec![],
                settle_amounts: vec![],
                status: crate::game::types::SettlementStatus::Pending,
                payout_txs: vec![],
            },
        })
        .unwrap();
        assert_eq!(json["method"], "finalInfo");
    }

    #[test]
    fn betting_command_round_trips() {
        let text = r#"{"method":"betting","action":"call","amount":0.02}"#;
        let command: GuiCommand = serde_json::from_str(text).unwrap();
        match command {
            GuiCommand::Betting { action, amount } => {
                assert_eq!(action, BetAction::Call);
                assert!((amount - 0.02).abs() < 1e-9);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
