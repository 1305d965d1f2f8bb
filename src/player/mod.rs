//! Player: joins a table, runs Phase P of the shuffle, decodes cards
//! addressed to it, answers betting turns and raises disputes.
//!
//! Like the dealer, the player is a poll-decide-publish loop; [`Player::tick`]
//! performs one iteration against the table identity.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use thiserror::Error;

use crate::chain::{ChainError, OperationStatus};
use crate::config::PlayerConfig;
use crate::crypto::curve::{point_from_hex, scalar_from_hex};
use crate::crypto::{deck, DeckError, PlayerDeck, Point};
use crate::game::clock::Clock;
use crate::game::types::{
    BetAction, BettingState, BlindedDeckEntry, CardBv, Chips, DealerDeckEntry, DeckConfig,
    DecodedCardReport, DisputeRequest, GameHistory, GameState, JoinRequest, PlayerBetAction,
    PlayerRoster, RevealRequest, Slot, TableInfo, HAND_SIZE, JOIN_WAIT_BLOCKS,
};
use crate::gui::{GuiHandle, GuiPush};
use crate::storage::{Cache, PlayerLocalState, StorageError};
use crate::vdxf::{keys, IdentityStore, VdxfError};

const LOG_TARGET: &str = "player";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Wallet balance must exceed the stake by this factor before joining.
const RESERVE_RATE: f64 = 1.025;

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Vdxf(#[from] VdxfError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("insufficient wallet funds: have {have}, need {need}")]
    InsufficientFunds { have: Chips, need: Chips },

    #[error("no joinable table found")]
    NoTablesFound,

    #[error("payin confirmed but seat never appeared in t_player_info")]
    PlayerNotAdded,

    #[error("game already started and no cached deck secrets exist")]
    GameAlreadyStarted,

    #[error("payin operation failed: {0}")]
    PayinFailed(String),

    #[error("dealer commission {got}% exceeds allowed {allowed}%")]
    CommissionTooHigh { got: f64, allowed: f64 },

    #[error("malformed entry under {0}")]
    BadEntry(&'static str),
}

pub struct Player {
    store: Arc<IdentityStore>,
    cache: Arc<Cache>,
    config: PlayerConfig,
    gui: Option<GuiHandle>,
    pub clock: Arc<Clock>,
    rng: StdRng,

    player_fqn: String,
    table_fqn: String,
    cashier_fqn: String,

    table: Option<TableInfo>,
    start_block: u64,
    game_id: String,
    slot: Option<Slot>,
    num_players: usize,
    payin_tx: String,

    deck: Option<PlayerDeck>,
    local: Option<PlayerLocalState>,
}

impl Player {
    pub fn new(
        store: Arc<IdentityStore>,
        cache: Arc<Cache>,
        config: PlayerConfig,
        gui: Option<GuiHandle>,
    ) -> Self {
        let namespace = store.namespace().clone();
        let player_fqn = namespace.qualify(&config.player_id);
        let table_fqn = namespace.qualify(&config.table_id);
        Self {
            store,
            cache,
            config,
            gui,
            clock: Arc::new(Clock::new()),
            rng: StdRng::from_entropy(),
            player_fqn,
            table_fqn,
            cashier_fqn: String::new(),
            table: None,
            start_block: 0,
            game_id: String::new(),
            slot: None,
            num_players: 0,
            payin_tx: String::new(),
            deck: None,
            local: None,
        }
    }

    pub fn player_fqn(&self) -> &str {
        &self.player_fqn
    }

    pub fn slot(&self) -> Option<Slot> {
        self.slot
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    // ------------------------------------------------------------------
    // Table selection and join
    // ------------------------------------------------------------------

    /// Adopt the configured table if joinable, else scan the dealer registry
    /// for any table in `TABLE_STARTED` with an open seat within stake.
    pub async fn find_table(&mut self) -> Result<TableInfo, PlayerError> {
        let balance = self.store.chain().get_balance().await?;
        if let Some(gui) = &self.gui {
            gui.push(GuiPush::WalletInfo {
                balance,
                address: self.config.wallet_addr.clone(),
            });
        }

        if let Some(table) = self.try_table(&self.table_fqn.clone(), balance).await? {
            self.adopt_table(table.clone());
            return Ok(table);
        }

        let registry = crate::dealer::registry::list_tables(&self.store).await?;
        for table in registry {
            let table_fqn = self.store.namespace().qualify(&table.table_id);
            if let Some(table) = self.try_table(&table_fqn, balance).await? {
                self.adopt_table(table.clone());
                return Ok(table);
            }
        }
        Err(PlayerError::NoTablesFound)
    }

    async fn try_table(
        &self,
        table_fqn: &str,
        balance: Chips,
    ) -> Result<Option<TableInfo>, PlayerError> {
        if !self.store.chain().identity_exists(table_fqn).await? {
            return Ok(None);
        }
        let state = self.store.game_state(table_fqn, 0).await?;
        let Some(game_id) = self.store.game_id(table_fqn, 0).await? else {
            return Ok(None);
        };
        let Some(table) = self
            .store
            .read_latest(table_fqn, keys::T_TABLE_INFO, Some(&game_id), 0)
            .await?
            .and_then(|v| serde_json::from_value::<TableInfo>(v).ok())
        else {
            return Ok(None);
        };

        let roster: PlayerRoster = self
            .store
            .read_latest(table_fqn, keys::T_PLAYER_INFO, Some(&game_id), table.start_block)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();

        // A table we already sit at is always adoptable (rejoin path).
        if roster.contains_pid(&self.player_fqn) {
            return Ok(Some(table));
        }
        if state != GameState::TableStarted {
            return Ok(None);
        }
        if roster.num_players >= table.max_players {
            return Ok(None);
        }
        if table.commission_pct > self.config.max_allowed_dcv_commission {
            return Err(PlayerError::CommissionTooHigh {
                got: table.commission_pct,
                allowed: self.config.max_allowed_dcv_commission,
            });
        }
        if balance < table.min_stake * RESERVE_RATE {
            return Err(PlayerError::InsufficientFunds {
                have: balance,
                need: table.min_stake * RESERVE_RATE,
            });
        }
        Ok(Some(table))
    }

    fn adopt_table(&mut self, table: TableInfo) {
        self.table_fqn = self.store.namespace().qualify(&table.table_id);
        self.cashier_fqn = self.store.namespace().qualify(&table.cashier_id);
        self.start_block = table.start_block;
        self.table = Some(table);
    }

    /// Send the payin to the cashier and publish the join request. Returns
    /// the payin txid.
    pub async fn join_table(&mut self) -> Result<String, PlayerError> {
        let table = self.table.clone().ok_or(PlayerError::NoTablesFound)?;
        let chain = self.store.chain().clone();

        tracing::info!(
            target: LOG_TARGET,
            cashier = %self.cashier_fqn,
            amount = table.min_stake,
            "sending payin"
        );
        let opid = chain
            .send_currency("*", &self.cashier_fqn, table.min_stake, None)
            .await?;
        let txid = loop {
            match chain.get_operation_status(&opid).await? {
                OperationStatus::Executing => tokio::time::sleep(Duration::from_secs(1)).await,
                OperationStatus::Success { txid } => break txid,
                OperationStatus::Failed { reason } => {
                    return Err(PlayerError::PayinFailed(reason))
                }
            }
        };
        self.payin_tx = txid.clone();

        let request = JoinRequest {
            dealer_id: table.dealer_id.clone(),
            table_id: table.table_id.clone(),
            cashier_id: self.cashier_fqn.clone(),
            payin_tx: txid.clone(),
        };
        self.store
            .append_json(
                &self.player_fqn,
                keys::P_JOIN_REQUEST,
                None,
                &serde_json::to_value(&request).expect("join request serializes"),
            )
            .await?;
        tracing::info!(target: LOG_TARGET, payin_tx = %txid, "join request published");
        Ok(txid)
    }

    /// Single check for our seat in `t_player_info`.
    pub async fn try_seat(&mut self) -> Result<Option<Slot>, PlayerError> {
        if self.game_id.is_empty() {
            self.game_id = self.store.require_game_id(&self.table_fqn, 0).await?;
        }
        let roster: PlayerRoster = self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_PLAYER_INFO,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        self.num_players = roster.num_players;
        if let Some(slot) = roster.slot_of(&self.player_fqn) {
            self.slot = Some(slot);
            return Ok(Some(slot));
        }
        Ok(None)
    }

    /// Wait up to [`JOIN_WAIT_BLOCKS`] blocks for the dealer to seat us.
    pub async fn await_seat(&mut self) -> Result<Slot, PlayerError> {
        let deadline = self.store.chain().get_block_count().await? + JOIN_WAIT_BLOCKS;
        loop {
            if let Some(slot) = self.try_seat().await? {
                tracing::info!(target: LOG_TARGET, slot, "seated at table");
                return Ok(slot);
            }
            if self.store.chain().get_block_count().await? > deadline {
                return Err(PlayerError::PlayerNotAdded);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Record dispute evidence for this hand on our own identity.
    pub async fn record_game_history(&mut self) -> Result<(), PlayerError> {
        let table = self.table.clone().ok_or(PlayerError::NoTablesFound)?;
        let join_block = self.store.chain().get_block_count().await?;
        let history = GameHistory {
            payin_tx: self.payin_tx.clone(),
            table_id: table.table_id.clone(),
            dealer_id: table.dealer_id.clone(),
            cashier_id: self.cashier_fqn.clone(),
            join_block,
            amount: table.min_stake,
            game_id: self.game_id.clone(),
        };
        self.store
            .append_json(
                &self.player_fqn,
                keys::P_GAME_HISTORY,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&history).expect("history serializes"),
            )
            .await?;
        self.cache
            .record_game(&self.game_id, &table.table_id, &self.payin_tx, "joined")
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase P and rejoin
    // ------------------------------------------------------------------

    /// Load the table's game id and either generate and publish our deck
    /// (first join) or restore it from the cache (rejoin). A hand past
    /// `DECK_SHUFFLING_B` without cached secrets cannot be resumed.
    pub async fn prepare_deck(&mut self) -> Result<(), PlayerError> {
        self.game_id = self.store.require_game_id(&self.table_fqn, 0).await?;
        let game_id = self.game_id.clone();
        let state = self.store.game_state(&self.table_fqn, self.start_block).await?;

        if let Some(cached) = self.cache.load_player_deck(&game_id).await? {
            tracing::info!(target: LOG_TARGET, "restored deck secrets from cache");
            self.slot = Some(cached.slot);
            self.deck = Some(cached);
            self.local = self.cache.load_player_local_state(&game_id).await?;
            if let Some(local) = &self.local {
                self.payin_tx = local.payin_tx.clone();
            }
            return Ok(());
        }

        if state > GameState::DeckShufflingB {
            return Err(PlayerError::GameAlreadyStarted);
        }

        let slot = self.slot.ok_or(PlayerError::PlayerNotAdded)?;
        let deck = PlayerDeck::generate(slot, DeckConfig::default().num_cards, &mut self.rng);

        // Secrets reach the cache before anything goes on chain; a crash
        // between the two must stay resumable.
        self.cache
            .save_player_deck(&game_id, &self.config.table_id, &deck)
            .await?;
        let mut local = PlayerLocalState::new(
            &game_id,
            &self.config.table_id,
            &self.payin_tx,
            slot as i32,
        );
        local.last_game_state = GameState::DeckShufflingP.code() as i32;
        self.cache.save_player_local_state(&local).await?;
        self.local = Some(local);

        self.store
            .append_hex(&self.player_fqn, keys::T_GAME_ID, &game_id)
            .await?;
        let entry = deck.entry();
        self.store
            .append_json(
                &self.player_fqn,
                keys::PLAYER_DECK,
                Some(&game_id),
                &serde_json::to_value(&entry).expect("player deck serializes"),
            )
            .await?;
        self.store
            .append_game_state(&self.player_fqn, &game_id, GameState::DeckShufflingP, None)
            .await?;
        tracing::info!(target: LOG_TARGET, slot, "player deck published");

        if let Some(gui) = &self.gui {
            gui.push(GuiPush::PlayerInitState {
                player_id: slot,
                table_id: self.config.table_id.clone(),
                game_id: game_id.clone(),
            });
        }
        self.deck = Some(deck);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Main loop
    // ------------------------------------------------------------------

    pub async fn run(&mut self) -> Result<(), PlayerError> {
        loop {
            let state = self.tick().await?;
            if state == GameState::SettlementComplete {
                tracing::info!(target: LOG_TARGET, "hand settled");
                return Ok(());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    pub async fn tick(&mut self) -> Result<GameState, PlayerError> {
        let state = self
            .store
            .game_state(&self.table_fqn, self.start_block)
            .await?;
        match state {
            GameState::RevealCard => self.handle_reveal().await?,
            GameState::RoundBetting => self.handle_betting().await?,
            GameState::Showdown => {
                if let Some(local) = &self.local {
                    tracing::info!(
                        target: LOG_TARGET,
                        cards = ?local.decoded_cards,
                        "showdown reached"
                    );
                }
            }
            _ => {}
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Card reveal
    // ------------------------------------------------------------------

    async fn reveal_request(&self) -> Result<Option<RevealRequest>, PlayerError> {
        Ok(self
            .store
            .game_state_info(&self.table_fqn, self.start_block)
            .await?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn handle_reveal(&mut self) -> Result<(), PlayerError> {
        let Some(request) = self.reveal_request().await? else {
            return Ok(());
        };
        // Seats can fill after we were seated; hole-card indexes depend on
        // the final seat count.
        self.try_seat().await?;
        let slot = self.slot.ok_or(PlayerError::PlayerNotAdded)?;
        if request.player_id >= 0 && request.player_id as usize != slot {
            return Ok(());
        }

        let hand_index = self.hand_index(&request);
        if let Some(local) = &self.local {
            if hand_index < HAND_SIZE && local.decoded_cards[hand_index] >= 0 {
                // Already decoded (restart path); just make sure the echo is
                // out so the dealer can move on.
                return self.echo_reveal(&request).await;
            }
        }

        // The cashier may not have published the blinding yet.
        let Some(bv_entry) = self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_CARD_BV,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<CardBv>(v).ok())
            .filter(|bv| bv.card_id == request.card_id && bv.player_id == request.player_id)
        else {
            tracing::debug!(
                target: LOG_TARGET,
                card_id = request.card_id,
                "blinding value not yet revealed"
            );
            return Ok(());
        };

        let bv_hex = if request.player_id == -1 {
            bv_entry
                .bv
                .get(slot)
                .ok_or(PlayerError::BadEntry(keys::T_CARD_BV))?
        } else {
            bv_entry
                .bv
                .first()
                .ok_or(PlayerError::BadEntry(keys::T_CARD_BV))?
        };
        let bv = scalar_from_hex(bv_hex)?;

        let blinded = self.blinded_deck(slot).await?;
        let blinded_card = blinded
            .cards
            .get(request.card_id)
            .ok_or(PlayerError::BadEntry("blinded deck"))
            .and_then(|hex| scalar_from_hex(hex).map_err(PlayerError::Deck))?;

        let (dealer_points, ghash) = self.dealer_commitments(slot).await?;
        let deck = self.deck.as_ref().ok_or(PlayerError::GameAlreadyStarted)?;
        let value = deck::decode_card(deck, &blinded_card, &bv, &dealer_points, &ghash)?;

        tracing::info!(
            target: LOG_TARGET,
            card_id = request.card_id,
            card_type = ?request.card_type,
            value,
            "card decoded"
        );

        if let Some(local) = self.local.as_mut() {
            if hand_index < HAND_SIZE {
                local.decoded_cards[hand_index] = value as i32;
                local.cards_decoded_count += 1;
                local.last_card_id = request.card_id as i32;
            }
            self.cache.save_player_local_state(local).await?;
        }
        self.push_deal();

        if request.card_type.is_community() {
            let report = DecodedCardReport {
                card_id: request.card_id,
                card_type: request.card_type,
                card_value: value as i32,
            };
            self.store
                .append_json(
                    &self.player_fqn,
                    keys::P_DECODED_CARD,
                    Some(&self.game_id.clone()),
                    &serde_json::to_value(report).expect("report serializes"),
                )
                .await?;
        }

        self.echo_reveal(&request).await
    }

    fn hand_index(&self, request: &RevealRequest) -> usize {
        match request.card_type {
            crate::game::types::CardType::Hole => {
                request.card_id / self.num_players.max(1)
            }
            other => other.hand_index().expect("community card has hand index"),
        }
    }

    async fn echo_reveal(&mut self, request: &RevealRequest) -> Result<(), PlayerError> {
        self.store
            .append_game_state(
                &self.player_fqn,
                &self.game_id.clone(),
                GameState::RevealCardPDone,
                Some(serde_json::to_value(request).expect("request serializes")),
            )
            .await?;
        Ok(())
    }

    fn push_deal(&self) {
        let (Some(gui), Some(local)) = (&self.gui, &self.local) else {
            return;
        };
        gui.push(GuiPush::Deal {
            hole_cards: local.decoded_cards[..2].to_vec(),
            board: local.decoded_cards[2..].to_vec(),
        });
    }

    async fn blinded_deck(&self, slot: Slot) -> Result<BlindedDeckEntry, PlayerError> {
        let entries = self
            .store
            .read_entries(
                &self.table_fqn,
                &keys::t_b_p_deck(slot),
                Some(&self.game_id),
                self.start_block,
            )
            .await?;
        let mut merged = BlindedDeckEntry::default();
        for entry in entries {
            let piece: BlindedDeckEntry =
                serde_json::from_value(entry).map_err(|_| PlayerError::BadEntry("blinded deck"))?;
            merged.cards.extend(piece.cards);
            merged.shares.extend(piece.shares);
        }
        Ok(merged)
    }

    async fn dealer_commitments(
        &self,
        slot: Slot,
    ) -> Result<(Vec<Point>, Vec<[u8; 32]>), PlayerError> {
        let points = self
            .store
            .read_concat(
                &self.table_fqn,
                keys::T_D_DECK,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .into_iter()
            .map(|v| {
                v.as_str()
                    .ok_or(PlayerError::BadEntry(keys::T_D_DECK))
                    .and_then(|hex| point_from_hex(hex).map_err(PlayerError::Deck))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let entries = self
            .store
            .read_entries(
                &self.table_fqn,
                &keys::t_d_p_deck(slot),
                Some(&self.game_id),
                self.start_block,
            )
            .await?;
        let mut ghash = Vec::new();
        for entry in entries {
            let piece: DealerDeckEntry = serde_json::from_value(entry)
                .map_err(|_| PlayerError::BadEntry("dealer deck"))?;
            for hash_hex in piece.ghash {
                let bytes: [u8; 32] = hex::decode(&hash_hex)
                    .map_err(|_| PlayerError::BadEntry("dealer deck"))?
                    .try_into()
                    .map_err(|_| PlayerError::BadEntry("dealer deck"))?;
                ghash.push(bytes);
            }
        }
        Ok((points, ghash))
    }

    // ------------------------------------------------------------------
    // Betting
    // ------------------------------------------------------------------

    /// Submit an interactively chosen action against the current turn.
    pub async fn submit_gui_action(
        &mut self,
        action: BetAction,
        amount: Chips,
    ) -> Result<(), PlayerError> {
        let Some(state) = self.betting_state().await? else {
            return Ok(());
        };
        self.submit_action(action, amount, state.round, state.turn_start_block)
            .await
    }

    async fn betting_state(&self) -> Result<Option<BettingState>, PlayerError> {
        Ok(self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_BETTING_STATE,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value(v).ok()))
    }

    async fn handle_betting(&mut self) -> Result<(), PlayerError> {
        let Some(state) = self.betting_state().await? else {
            return Ok(());
        };
        let slot = self.slot.ok_or(PlayerError::PlayerNotAdded)?;
        if state.current_turn != slot {
            return Ok(());
        }
        // Turn already answered; the dealer just has not advanced yet.
        if self.acted_this_turn(state.round, state.turn_start_block).await? {
            return Ok(());
        }

        if let Some(gui) = &self.gui {
            gui.push(GuiPush::Betting {
                state: state.clone(),
            });
        }
        if !self.config.auto_betting {
            // Interactive mode: the GUI command handler calls submit_action.
            return Ok(());
        }

        let (action, amount) = match state.action {
            BetAction::SmallBlind | BetAction::BigBlind => (BetAction::Bet, state.min_amount),
            _ if state.min_amount > 0.0 => (BetAction::Call, state.min_amount),
            _ => (BetAction::Check, 0.0),
        };
        self.submit_action(action, amount, state.round, state.turn_start_block)
            .await
    }

    async fn acted_this_turn(
        &self,
        round: usize,
        turn_start_block: u64,
    ) -> Result<bool, PlayerError> {
        Ok(self
            .store
            .read_latest(
                &self.player_fqn,
                keys::P_BETTING_ACTION,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<PlayerBetAction>(v).ok())
            .map(|a| a.round == round && a.turn_start_block == turn_start_block)
            .unwrap_or(false))
    }

    pub async fn submit_action(
        &mut self,
        action: BetAction,
        amount: Chips,
        round: usize,
        turn_start_block: u64,
    ) -> Result<(), PlayerError> {
        let payload = PlayerBetAction {
            action,
            amount,
            round,
            turn_start_block,
            auto_fold: false,
        };
        tracing::info!(
            target: LOG_TARGET,
            ?action,
            amount,
            round,
            "submitting betting action"
        );
        self.store
            .append_json(
                &self.player_fqn,
                keys::P_BETTING_ACTION,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&payload).expect("action serializes"),
            )
            .await?;
        if let Some(local) = self.local.as_mut() {
            local.last_game_state = round as i32;
            self.cache.save_player_local_state(local).await?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Disputes
    // ------------------------------------------------------------------

    /// Publish a dispute request for this hand, backed by the recorded game
    /// history.
    pub async fn raise_dispute(&self, reason: &str) -> Result<(), PlayerError> {
        let history: GameHistory = self
            .store
            .read_latest(
                &self.player_fqn,
                keys::P_GAME_HISTORY,
                Some(&self.game_id),
                0,
            )
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .ok_or(PlayerError::BadEntry(keys::P_GAME_HISTORY))?;

        let request = DisputeRequest {
            payin_tx: history.payin_tx,
            table_id: history.table_id,
            game_id: self.game_id.clone(),
            reason: reason.to_string(),
            request_block: self.store.chain().get_block_count().await?,
            player_id: self.player_fqn.clone(),
        };
        tracing::info!(target: LOG_TARGET, %reason, "raising dispute");
        self.store
            .append_json(
                &self.player_fqn,
                keys::P_DISPUTE_REQUEST,
                Some(&self.game_id),
                &serde_json::to_value(&request).expect("dispute serializes"),
            )
            .await?;
        Ok(())
    }

    /// Check the cashier's verdict for our dispute, if any.
    pub async fn dispute_result(
        &self,
    ) -> Result<Option<crate::game::types::DisputeResult>, PlayerError> {
        let suffix = format!("{}.{}", self.game_id, self.player_fqn);
        Ok(self
            .store
            .read_latest(&self.cashier_fqn, keys::C_DISPUTE_RESULT, Some(&suffix), 0)
            .await?
            .and_then(|v| serde_json::from_value(v).ok()))
    }
}
