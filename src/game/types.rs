//! Wire records published through the identity content multimaps, and the
//! constants every role agrees on.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;

/// Seat slot on a table, `0..MAX_PLAYERS`.
pub type Slot = usize;

/// CHIPS amount, 8 decimals of precision on the wire.
pub type Chips = f64;

pub const MAX_PLAYERS: usize = 9;
pub const MAX_ROUNDS: usize = 4;

pub const HOLE_CARDS: usize = 2;
pub const FLOP_CARDS: usize = 3;
pub const COMMUNITY_CARDS: usize = 5;
/// Two hole cards plus the five-card board.
pub const HAND_SIZE: usize = HOLE_CARDS + COMMUNITY_CARDS;

/// Deck size for the two-player configuration. Larger decks are supported
/// through chunked identity updates; see [`DeckConfig`].
pub const DECK_CARDS: usize = 14;

pub const TURN_TIMEOUT_SECS: i64 = 60;
pub const TURN_TIMEOUT_BLOCKS: u64 = 6;
pub const JOIN_WAIT_BLOCKS: u64 = 5;
pub const DISPUTE_TIMEOUT_BLOCKS: u64 = 60;
pub const DISPUTE_SCAN_BACK_BLOCKS: u64 = 200;

pub const DEFAULT_TX_FEE: Chips = 0.0001;
pub const DEFAULT_BIG_BLIND: Chips = 0.02;
pub const DEFAULT_SMALL_BLIND: Chips = 0.01;
pub const DEFAULT_MIN_STAKE: Chips = 0.5;
pub const DEFAULT_MAX_STAKE: Chips = 2.0;
/// Minimum wallet balance a dealer keeps in reserve when hosting.
pub const DEALER_RESERVE: Chips = 0.1;

/// Deck sizing for one table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeckConfig {
    pub num_cards: usize,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            num_cards: DECK_CARDS,
        }
    }
}

impl DeckConfig {
    /// Cards consumed by a hand for `players` seats, burn slots included.
    pub fn cards_needed(players: usize) -> usize {
        HOLE_CARDS * players + 8
    }

    pub fn supports(&self, players: usize) -> bool {
        self.num_cards >= Self::cards_needed(players)
    }
}

// ---------------------------------------------------------------------------
// Game state
// ---------------------------------------------------------------------------

/// State published under `t_game_info.game_state`. The integer codes are part
/// of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GameState {
    Zeroized = 0,
    TableActive = 1,
    TableStarted = 2,
    PlayersJoined = 3,
    DeckShufflingP = 4,
    DeckShufflingD = 5,
    DeckShufflingB = 6,
    RevealCard = 7,
    RevealCardPDone = 8,
    RoundBetting = 9,
    Showdown = 10,
    SettlementPending = 11,
    SettlementComplete = 12,
}

impl GameState {
    pub fn from_code(code: u8) -> Option<Self> {
        use GameState::*;
        Some(match code {
            0 => Zeroized,
            1 => TableActive,
            2 => TableStarted,
            3 => PlayersJoined,
            4 => DeckShufflingP,
            5 => DeckShufflingD,
            6 => DeckShufflingB,
            7 => RevealCard,
            8 => RevealCardPDone,
            9 => RoundBetting,
            10 => Showdown,
            11 => SettlementPending,
            12 => SettlementComplete,
            _ => return None,
        })
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for GameState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            GameState::Zeroized => "table not initialized",
            GameState::TableActive => "table active",
            GameState::TableStarted => "table started",
            GameState::PlayersJoined => "players joined",
            GameState::DeckShufflingP => "deck shuffled by players",
            GameState::DeckShufflingD => "deck shuffled by dealer",
            GameState::DeckShufflingB => "deck shuffled by cashier",
            GameState::RevealCard => "revealing card",
            GameState::RevealCardPDone => "player received card",
            GameState::RoundBetting => "round betting",
            GameState::Showdown => "showdown",
            GameState::SettlementPending => "settlement pending",
            GameState::SettlementComplete => "settlement complete",
        };
        f.write_str(text)
    }
}

impl Serialize for GameState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for GameState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        GameState::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid game state code {code}")))
    }
}

/// Payload under `t_game_info.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameInfoEntry {
    pub game_state: GameState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_state_info: Option<JsonValue>,
}

// ---------------------------------------------------------------------------
// Cards
// ---------------------------------------------------------------------------

/// Card request kind; the integer codes are part of the wire format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CardType {
    Hole = 1,
    Flop1 = 2,
    Flop2 = 3,
    Flop3 = 4,
    Turn = 5,
    River = 6,
}

impl CardType {
    pub fn from_code(code: u8) -> Option<Self> {
        use CardType::*;
        Some(match code {
            1 => Hole,
            2 => Flop1,
            3 => Flop2,
            4 => Flop3,
            5 => Turn,
            6 => River,
            _ => return None,
        })
    }

    pub fn is_community(self) -> bool {
        !matches!(self, CardType::Hole)
    }

    /// Index into the seven-slot hand view for community cards; hole cards
    /// are addressed by their own index.
    pub fn hand_index(self) -> Option<usize> {
        match self {
            CardType::Hole => None,
            CardType::Flop1 => Some(HOLE_CARDS),
            CardType::Flop2 => Some(HOLE_CARDS + 1),
            CardType::Flop3 => Some(HOLE_CARDS + 2),
            CardType::Turn => Some(HOLE_CARDS + FLOP_CARDS),
            CardType::River => Some(HOLE_CARDS + FLOP_CARDS + 1),
        }
    }
}

impl Serialize for CardType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

impl<'de> Deserialize<'de> for CardType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = u8::deserialize(deserializer)?;
        CardType::from_code(code)
            .ok_or_else(|| D::Error::custom(format!("invalid card type code {code}")))
    }
}

/// Reveal request carried in `t_game_info.game_state_info`. `player_id` is
/// `-1` for community cards addressed to every seat.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct RevealRequest {
    pub player_id: i32,
    pub card_id: usize,
    pub card_type: CardType,
}

/// Cashier blinding reveal under `t_card_bv.<game_id>`. For community cards
/// `bv` carries one scalar per seat, indexed by slot.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CardBv {
    pub player_id: i32,
    pub card_id: usize,
    pub bv: Vec<String>,
}

/// Decoded community-card claim under `p_decoded_card.<game_id>`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DecodedCardReport {
    pub card_id: usize,
    pub card_type: CardType,
    pub card_value: i32,
}

/// Board view under `t_board_cards.<game_id>`; `-1` marks an unrevealed slot.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardCards {
    pub flop: [i32; FLOP_CARDS],
    pub turn: i32,
    pub river: i32,
}

impl Default for BoardCards {
    fn default() -> Self {
        Self {
            flop: [-1; FLOP_CARDS],
            turn: -1,
            river: -1,
        }
    }
}

impl BoardCards {
    pub fn set(&mut self, card_type: CardType, value: i32) {
        match card_type {
            CardType::Flop1 => self.flop[0] = value,
            CardType::Flop2 => self.flop[1] = value,
            CardType::Flop3 => self.flop[2] = value,
            CardType::Turn => self.turn = value,
            CardType::River => self.river = value,
            CardType::Hole => {}
        }
    }

    pub fn get(&self, card_type: CardType) -> Option<i32> {
        let value = match card_type {
            CardType::Flop1 => self.flop[0],
            CardType::Flop2 => self.flop[1],
            CardType::Flop3 => self.flop[2],
            CardType::Turn => self.turn,
            CardType::River => self.river,
            CardType::Hole => return None,
        };
        (value >= 0).then_some(value)
    }
}

// ---------------------------------------------------------------------------
// Table and roster
// ---------------------------------------------------------------------------

/// Immutable table parameters under `t_table_info.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TableInfo {
    pub max_players: usize,
    pub big_blind: Chips,
    pub min_stake: Chips,
    pub max_stake: Chips,
    pub table_id: String,
    pub dealer_id: String,
    pub cashier_id: String,
    /// Height the hand was initialized at; the `height_start` every reader
    /// uses for this hand.
    pub start_block: u64,
    /// Dealer commission, percent of the pot withheld at settlement.
    #[serde(default)]
    pub commission_pct: f64,
}

/// Seated-player roster under `t_player_info.<game_id>`. `player_info`
/// entries have the historical `<verus_pid>_<payin_tx>_<slot>` form.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PlayerRoster {
    pub num_players: usize,
    pub player_info: Vec<String>,
    pub payin_amounts: Vec<Chips>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosterEntry {
    pub verus_pid: String,
    pub payin_tx: String,
    pub slot: Slot,
}

impl PlayerRoster {
    pub fn entries(&self) -> Vec<RosterEntry> {
        self.player_info
            .iter()
            .filter_map(|record| {
                let mut parts = record.split('_');
                let verus_pid = parts.next()?.to_string();
                let payin_tx = parts.next()?.to_string();
                let slot = parts.next()?.parse().ok()?;
                Some(RosterEntry {
                    verus_pid,
                    payin_tx,
                    slot,
                })
            })
            .collect()
    }

    pub fn contains_pid(&self, verus_pid: &str) -> bool {
        self.entries().iter().any(|e| e.verus_pid == verus_pid)
    }

    pub fn slot_of(&self, verus_pid: &str) -> Option<Slot> {
        self.entries()
            .iter()
            .find(|e| e.verus_pid == verus_pid)
            .map(|e| e.slot)
    }

    /// Append a seat; the slot index is the current player count. The three
    /// arrays always grow together.
    pub fn push(&mut self, verus_pid: &str, payin_tx: &str, amount: Chips) {
        let slot = self.num_players;
        self.player_info
            .push(format!("{verus_pid}_{payin_tx}_{slot}"));
        self.payin_amounts.push(amount);
        self.num_players += 1;
    }
}

// ---------------------------------------------------------------------------
// Betting
// ---------------------------------------------------------------------------

/// Betting action vocabulary. String forms are part of the wire format.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BetAction {
    #[default]
    None,
    SmallBlind,
    BigBlind,
    Check,
    Bet,
    Call,
    Raise,
    Allin,
    Fold,
    /// Dealer-side request marker for a regular turn.
    RoundBetting,
}

impl BetAction {
    pub fn is_fold(self) -> bool {
        matches!(self, BetAction::Fold)
    }

    pub fn is_allin(self) -> bool {
        matches!(self, BetAction::Allin)
    }
}

/// Dealer-published betting state under `t_betting_state.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BettingState {
    pub current_turn: Slot,
    pub round: usize,
    pub pot: Chips,
    pub action: BetAction,
    pub last_turn: Slot,
    pub turn_start_time: i64,
    pub turn_start_block: u64,
    pub timeout_secs: i64,
    pub timeout_blocks: u64,
    pub min_amount: Chips,
    pub bet_amounts: Vec<Chips>,
    pub player_funds: Vec<Chips>,
    pub possibilities: Vec<BetAction>,
}

/// Player response under `p_betting_action.<game_id>`. `turn_start_block`
/// echoes the published betting state so the dealer never mistakes an
/// earlier same-round action for the answer to the current turn.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct PlayerBetAction {
    pub action: BetAction,
    pub amount: Chips,
    pub round: usize,
    #[serde(default)]
    pub turn_start_block: u64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auto_fold: bool,
}

// ---------------------------------------------------------------------------
// Join / settlement / dispute
// ---------------------------------------------------------------------------

/// Join intent under `p_join_request` on a player identity.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequest {
    pub dealer_id: String,
    pub table_id: String,
    pub cashier_id: String,
    pub payin_tx: String,
}

/// Dispute evidence under `p_game_history.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GameHistory {
    pub payin_tx: String,
    pub table_id: String,
    pub dealer_id: String,
    pub cashier_id: String,
    pub join_block: u64,
    pub amount: Chips,
    pub game_id: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SettlementStatus {
    Pending,
    Completed,
}

/// Settlement record under `t_settlement_info.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SettlementInfo {
    pub player_ids: Vec<String>,
    pub settle_amounts: Vec<Chips>,
    pub status: SettlementStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub payout_txs: Vec<String>,
}

/// Player dispute under `p_dispute_request.<game_id>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct DisputeRequest {
    pub payin_tx: String,
    pub table_id: String,
    pub game_id: String,
    pub reason: String,
    pub request_block: u64,
    pub player_id: String,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
    Paid,
    Refunded,
    Rejected,
}

/// Cashier verdict under `c_dispute_result.<game_id>.<player_id>`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DisputeResult {
    pub player_id: String,
    pub game_id: String,
    pub status: DisputeStatus,
    pub payout_tx: String,
    pub reason: String,
    pub resolved_block: u64,
}

/// Phase-P publication under `player_deck.<game_id>` on a player identity.
/// `cardinfo` holds the per-card public points in value order; `sealing_key`
/// is the X25519 key Shamir shares are sealed to.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlayerDeckEntry {
    pub id: Slot,
    pub pubkey: String,
    pub sealing_key: String,
    pub cardinfo: Vec<String>,
}

/// Phase-D publication chunk under `t_d_p{slot}_deck.<game_id>`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DealerDeckEntry {
    pub cards: Vec<String>,
    pub ghash: Vec<String>,
}

/// Phase-B publication chunk under `t_b_p{slot}_deck.<game_id>`.
/// `shares[i][k]` is card `i`'s Shamir share sealed to seat `k`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BlindedDeckEntry {
    pub cards: Vec<String>,
    pub shares: Vec<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_state_codes_round_trip() {
        for code in 0..=12u8 {
            let state = GameState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, code.to_string());
            let back: GameState = serde_json::from_str(&json).unwrap();
            assert_eq!(back, state);
        }
        assert!(GameState::from_code(13).is_none());
    }

    #[test]
    fn bet_action_wire_names() {
        assert_eq!(
            serde_json::to_string(&BetAction::SmallBlind).unwrap(),
            "\"small_blind\""
        );
        assert_eq!(serde_json::to_string(&BetAction::Allin).unwrap(), "\"allin\"");
        let parsed: BetAction = serde_json::from_str("\"round_betting\"").unwrap();
        assert_eq!(parsed, BetAction::RoundBetting);
    }

    #[test]
    fn roster_parses_historical_record_form() {
        let mut roster = PlayerRoster::default();
        roster.push("p1", "txaaa", 0.5);
        roster.push("p2", "txbbb", 0.75);

        assert_eq!(roster.num_players, 2);
        assert_eq!(roster.player_info[1], "p2_txbbb_1");
        assert_eq!(roster.slot_of("p2"), Some(1));
        assert!(roster.contains_pid("p1"));
        assert!(!roster.contains_pid("p3"));

        let entries = roster.entries();
        assert_eq!(entries[0].payin_tx, "txaaa");
        assert_eq!(entries[1].slot, 1);
    }

    #[test]
    fn board_cards_fill_by_type() {
        let mut board = BoardCards::default();
        assert_eq!(board.get(CardType::Turn), None);
        board.set(CardType::Flop2, 17);
        board.set(CardType::Turn, 3);
        assert_eq!(board.flop, [-1, 17, -1]);
        assert_eq!(board.get(CardType::Turn), Some(3));
    }

    #[test]
    fn deck_config_two_player_fits_default() {
        let deck = DeckConfig::default();
        assert!(deck.supports(2));
        assert!(!deck.supports(4));
        assert_eq!(DeckConfig::cards_needed(9), 26);
    }
}
