//! Node-local SQLite cache.
//!
//! Holds what is either too large for the content multimaps (private deck
//! scalar vectors) or must survive restarts (mid-hand rejoin state). All
//! writes are idempotent upserts; an empty cache only costs the ability to
//! resume unfinished hands.

pub mod entity;

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    QueryFilter,
};
use thiserror::Error;

use crate::crypto::curve::scalar_to_hex;
use crate::crypto::{DeckError, DealerDeck, PlayerDeck};
use crate::game::types::{GameState, HAND_SIZE};

use entity::{
    cashier_deck_info, dealer_deck_info, game_history, player_deck_info, player_local_state,
};

const LOG_TARGET: &str = "storage";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS player_deck_info (
        game_id TEXT PRIMARY KEY,
        table_id TEXT NOT NULL,
        player_id INTEGER NOT NULL,
        player_priv TEXT NOT NULL,
        player_deck_priv TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS player_local_state (
        game_id TEXT PRIMARY KEY,
        table_id TEXT NOT NULL,
        payin_tx TEXT NOT NULL,
        player_id INTEGER NOT NULL,
        decoded_cards TEXT NOT NULL,
        cards_decoded_count INTEGER NOT NULL,
        last_card_id INTEGER NOT NULL,
        last_game_state INTEGER NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS dealer_deck_info (
        game_id TEXT PRIMARY KEY,
        perm TEXT NOT NULL,
        dealer_deck_priv TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS cashier_deck_info (
        game_id TEXT NOT NULL,
        player_id INTEGER NOT NULL,
        perm TEXT NOT NULL,
        cashier_deck_priv TEXT NOT NULL,
        PRIMARY KEY (game_id, player_id)
    )",
    "CREATE TABLE IF NOT EXISTS game_history (
        game_id TEXT PRIMARY KEY,
        table_id TEXT NOT NULL,
        payin_tx TEXT NOT NULL,
        status TEXT NOT NULL
    )",
];

#[derive(Error, Debug)]
pub enum StorageError {
    #[error(transparent)]
    Db(#[from] sea_orm::DbErr),

    #[error(transparent)]
    Deck(#[from] DeckError),
}

/// Player-side mid-hand state, persisted so a restart can rejoin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerLocalState {
    pub game_id: String,
    pub table_id: String,
    pub payin_tx: String,
    pub player_id: i32,
    pub decoded_cards: [i32; HAND_SIZE],
    pub cards_decoded_count: i32,
    pub last_card_id: i32,
    pub last_game_state: i32,
}

impl PlayerLocalState {
    pub fn new(game_id: &str, table_id: &str, payin_tx: &str, player_id: i32) -> Self {
        Self {
            game_id: game_id.to_string(),
            table_id: table_id.to_string(),
            payin_tx: payin_tx.to_string(),
            player_id,
            decoded_cards: [-1; HAND_SIZE],
            cards_decoded_count: 0,
            last_card_id: -1,
            last_game_state: GameState::Zeroized.code() as i32,
        }
    }

    fn cards_csv(&self) -> String {
        self.decoded_cards
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    fn cards_from_csv(csv: &str) -> [i32; HAND_SIZE] {
        let mut cards = [-1; HAND_SIZE];
        for (slot, value) in csv.split(',').take(HAND_SIZE).enumerate() {
            cards[slot] = value.parse().unwrap_or(-1);
        }
        cards
    }
}

pub struct Cache {
    db: DatabaseConnection,
}

impl Cache {
    pub async fn open(path: &str) -> Result<Self, StorageError> {
        Self::connect(&format!("sqlite://{path}?mode=rwc")).await
    }

    pub async fn open_in_memory() -> Result<Self, StorageError> {
        Self::connect("sqlite::memory:").await
    }

    async fn connect(url: &str) -> Result<Self, StorageError> {
        let db = Database::connect(url).await?;
        for statement in SCHEMA {
            db.execute_unprepared(statement).await?;
        }
        tracing::debug!(target: LOG_TARGET, %url, "cache opened");
        Ok(Self { db })
    }

    // ------------------------------------------------------------------
    // Player deck
    // ------------------------------------------------------------------

    pub async fn save_player_deck(
        &self,
        game_id: &str,
        table_id: &str,
        deck: &PlayerDeck,
    ) -> Result<(), StorageError> {
        let model = player_deck_info::ActiveModel {
            game_id: Set(game_id.to_string()),
            table_id: Set(table_id.to_string()),
            player_id: Set(deck.slot as i32),
            player_priv: Set(scalar_to_hex(&deck.key_secret)),
            player_deck_priv: Set(deck.secrets_hex()),
        };
        player_deck_info::Entity::insert(model)
            .on_conflict(
                OnConflict::column(player_deck_info::Column::GameId)
                    .update_columns([
                        player_deck_info::Column::TableId,
                        player_deck_info::Column::PlayerId,
                        player_deck_info::Column::PlayerPriv,
                        player_deck_info::Column::PlayerDeckPriv,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_player_deck(&self, game_id: &str) -> Result<Option<PlayerDeck>, StorageError> {
        let Some(row) = player_deck_info::Entity::find_by_id(game_id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        let deck = PlayerDeck::from_cache(
            row.player_id as usize,
            &row.player_priv,
            &row.player_deck_priv,
        )?;
        Ok(Some(deck))
    }

    // ------------------------------------------------------------------
    // Player local state
    // ------------------------------------------------------------------

    pub async fn save_player_local_state(
        &self,
        state: &PlayerLocalState,
    ) -> Result<(), StorageError> {
        let model = player_local_state::ActiveModel {
            game_id: Set(state.game_id.clone()),
            table_id: Set(state.table_id.clone()),
            payin_tx: Set(state.payin_tx.clone()),
            player_id: Set(state.player_id),
            decoded_cards: Set(state.cards_csv()),
            cards_decoded_count: Set(state.cards_decoded_count),
            last_card_id: Set(state.last_card_id),
            last_game_state: Set(state.last_game_state),
        };
        player_local_state::Entity::insert(model)
            .on_conflict(
                OnConflict::column(player_local_state::Column::GameId)
                    .update_columns([
                        player_local_state::Column::TableId,
                        player_local_state::Column::PayinTx,
                        player_local_state::Column::PlayerId,
                        player_local_state::Column::DecodedCards,
                        player_local_state::Column::CardsDecodedCount,
                        player_local_state::Column::LastCardId,
                        player_local_state::Column::LastGameState,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_player_local_state(
        &self,
        game_id: &str,
    ) -> Result<Option<PlayerLocalState>, StorageError> {
        let Some(row) = player_local_state::Entity::find_by_id(game_id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(PlayerLocalState {
            game_id: row.game_id,
            table_id: row.table_id,
            payin_tx: row.payin_tx,
            player_id: row.player_id,
            decoded_cards: PlayerLocalState::cards_from_csv(&row.decoded_cards),
            cards_decoded_count: row.cards_decoded_count,
            last_card_id: row.last_card_id,
            last_game_state: row.last_game_state,
        }))
    }

    // ------------------------------------------------------------------
    // Dealer deck
    // ------------------------------------------------------------------

    pub async fn save_dealer_deck(
        &self,
        game_id: &str,
        deck: &DealerDeck,
    ) -> Result<(), StorageError> {
        let model = dealer_deck_info::ActiveModel {
            game_id: Set(game_id.to_string()),
            perm: Set(deck.perm_csv()),
            dealer_deck_priv: Set(deck.secrets_hex()),
        };
        dealer_deck_info::Entity::insert(model)
            .on_conflict(
                OnConflict::column(dealer_deck_info::Column::GameId)
                    .update_columns([
                        dealer_deck_info::Column::Perm,
                        dealer_deck_info::Column::DealerDeckPriv,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_dealer_deck(&self, game_id: &str) -> Result<Option<DealerDeck>, StorageError> {
        let Some(row) = dealer_deck_info::Entity::find_by_id(game_id.to_string())
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };
        Ok(Some(DealerDeck::from_cache(
            &row.perm,
            &row.dealer_deck_priv,
        )?))
    }

    // ------------------------------------------------------------------
    // Cashier deck
    // ------------------------------------------------------------------

    pub async fn save_cashier_deck(
        &self,
        game_id: &str,
        player_id: i32,
        perm_csv: &str,
        secrets_hex: &str,
    ) -> Result<(), StorageError> {
        let model = cashier_deck_info::ActiveModel {
            game_id: Set(game_id.to_string()),
            player_id: Set(player_id),
            perm: Set(perm_csv.to_string()),
            cashier_deck_priv: Set(secrets_hex.to_string()),
        };
        cashier_deck_info::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    cashier_deck_info::Column::GameId,
                    cashier_deck_info::Column::PlayerId,
                ])
                .update_columns([
                    cashier_deck_info::Column::Perm,
                    cashier_deck_info::Column::CashierDeckPriv,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn load_cashier_deck(
        &self,
        game_id: &str,
        player_id: i32,
    ) -> Result<Option<(String, String)>, StorageError> {
        let row = cashier_deck_info::Entity::find()
            .filter(cashier_deck_info::Column::GameId.eq(game_id))
            .filter(cashier_deck_info::Column::PlayerId.eq(player_id))
            .one(&self.db)
            .await?;
        Ok(row.map(|r| (r.perm, r.cashier_deck_priv)))
    }

    // ------------------------------------------------------------------
    // Game history index
    // ------------------------------------------------------------------

    pub async fn record_game(
        &self,
        game_id: &str,
        table_id: &str,
        payin_tx: &str,
        status: &str,
    ) -> Result<(), StorageError> {
        let model = game_history::ActiveModel {
            game_id: Set(game_id.to_string()),
            table_id: Set(table_id.to_string()),
            payin_tx: Set(payin_tx.to_string()),
            status: Set(status.to_string()),
        };
        game_history::Entity::insert(model)
            .on_conflict(
                OnConflict::column(game_history::Column::GameId)
                    .update_columns([
                        game_history::Column::TableId,
                        game_history::Column::PayinTx,
                        game_history::Column::Status,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn list_games(&self) -> Result<Vec<game_history::Model>, StorageError> {
        Ok(game_history::Entity::find().all(&self.db).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[tokio::test]
    async fn player_deck_survives_a_restart() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mut rng = StdRng::seed_from_u64(51);
        let deck = PlayerDeck::generate(1, 14, &mut rng);

        cache.save_player_deck("gid1", "table1", &deck).await.unwrap();
        let restored = cache.load_player_deck("gid1").await.unwrap().unwrap();
        assert_eq!(restored.slot, 1);
        assert_eq!(restored.card_points, deck.card_points);

        assert!(cache.load_player_deck("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn local_state_upsert_is_idempotent() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mut state = PlayerLocalState::new("gid2", "table1", "txabc", 0);
        cache.save_player_local_state(&state).await.unwrap();

        state.decoded_cards[0] = 12;
        state.cards_decoded_count = 1;
        state.last_card_id = 0;
        cache.save_player_local_state(&state).await.unwrap();

        let restored = cache.load_player_local_state("gid2").await.unwrap().unwrap();
        assert_eq!(restored, state);
    }

    #[tokio::test]
    async fn dealer_and_cashier_decks_round_trip() {
        let cache = Cache::open_in_memory().await.unwrap();
        let mut rng = StdRng::seed_from_u64(52);
        let dealer = DealerDeck::generate(14, &mut rng);
        cache.save_dealer_deck("gid3", &dealer).await.unwrap();
        let restored = cache.load_dealer_deck("gid3").await.unwrap().unwrap();
        assert_eq!(restored.perm, dealer.perm);

        cache
            .save_cashier_deck("gid3", 2, "1,0", "aabb")
            .await
            .unwrap();
        let (perm, secrets) = cache.load_cashier_deck("gid3", 2).await.unwrap().unwrap();
        assert_eq!(perm, "1,0");
        assert_eq!(secrets, "aabb");
        assert!(cache.load_cashier_deck("gid3", 5).await.unwrap().is_none());
    }
}
