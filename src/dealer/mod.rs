//! Dealer: initializes the table identity, seats players, runs Phase D of
//! the shuffle, directs card reveals, tallies bets and publishes the
//! settlement.
//!
//! The dealer is a poll-decide-publish loop over the table identity's game
//! state. [`Dealer::tick`] performs one iteration; [`Dealer::run`] loops
//! with the standard two-second sleep.

pub mod registry;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::chain::ChainError;
use crate::config::DealerConfig;
use crate::crypto::curve::point_from_hex;
use crate::crypto::{DealerDeck, DeckError};
use crate::game::betting::{BettingError, HandVars};
use crate::game::clock::Clock;
use crate::game::schedule::DealSchedule;
use crate::game::settle::WinnerSelector;
use crate::game::types::{
    BetAction, BoardCards, CardType, Chips, DealerDeckEntry, DeckConfig, GameState,
    PlayerBetAction, PlayerDeckEntry, PlayerRoster, RevealRequest, RosterEntry, SettlementInfo,
    SettlementStatus, Slot, TableInfo, MAX_ROUNDS,
};
use crate::gui::{GuiHandle, GuiPush};
use crate::storage::{Cache, StorageError};
use crate::vdxf::{keys, IdentityStore, VdxfError};

const LOG_TARGET: &str = "dealer";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum DealerError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Vdxf(#[from] VdxfError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Betting(#[from] BettingError),

    #[error("insufficient wallet funds: have {have}, need {need}")]
    InsufficientFunds { have: Chips, need: Chips },

    #[error("no signing authority over {0}")]
    CannotSign(String),

    #[error("dealer {0} is not in the dealers registry")]
    Unregistered(String),

    #[error("deck of {cards} cards cannot seat {players} players")]
    DeckTooSmall { cards: usize, players: usize },

    #[error("players disagree on community card {card_id}: {values:?}")]
    CardConsensus { card_id: usize, values: Vec<i32> },

    #[error("malformed entry under {0}")]
    BadEntry(&'static str),
}

/// Reveal in flight: the request published on the table plus which seats
/// have echoed it so far.
#[derive(Debug)]
struct PendingReveal {
    request: RevealRequest,
    started_time: i64,
    started_block: u64,
    echoed: HashSet<Slot>,
}

pub struct Dealer {
    store: Arc<IdentityStore>,
    cache: Arc<Cache>,
    config: DealerConfig,
    deck_config: DeckConfig,
    winner: Arc<dyn WinnerSelector>,
    gui: Option<GuiHandle>,
    pub clock: Arc<Clock>,
    rng: StdRng,

    table_fqn: String,
    dealer_fqn: String,
    cashier_fqn: String,

    game_id: String,
    start_block: u64,

    players: Vec<RosterEntry>,
    deck: Option<DealerDeck>,
    schedule: Option<DealSchedule>,
    vars: Option<HandVars>,
    pending_reveal: Option<PendingReveal>,
    current_action: BetAction,
    board: BoardCards,
}

impl Dealer {
    /// Verify funds, authority and registration, then bring the table
    /// identity to `TABLE_STARTED` (or adopt an in-progress hand).
    pub async fn init(
        store: Arc<IdentityStore>,
        cache: Arc<Cache>,
        config: DealerConfig,
        winner: Arc<dyn WinnerSelector>,
        gui: Option<GuiHandle>,
    ) -> Result<Self, DealerError> {
        let deck_config = DeckConfig::default();
        if !deck_config.supports(config.max_players) {
            return Err(DealerError::DeckTooSmall {
                cards: deck_config.num_cards,
                players: config.max_players,
            });
        }

        let namespace = store.namespace().clone();
        let table_fqn = namespace.qualify(&config.table_id);
        let dealer_fqn = namespace.qualify(&config.dealer_id);
        let cashier_fqn = namespace.qualify(&config.cashier_id);

        let chain = store.chain().clone();
        let balance = chain.get_balance().await?;
        if balance < crate::game::types::DEALER_RESERVE {
            return Err(DealerError::InsufficientFunds {
                have: balance,
                need: crate::game::types::DEALER_RESERVE,
            });
        }
        for id in [&dealer_fqn, &table_fqn] {
            if !chain.can_sign_for(id).await? {
                return Err(DealerError::CannotSign(id.clone()));
            }
        }

        if !registry::is_dealer_registered(&store, &config.dealer_id).await? {
            return Err(DealerError::Unregistered(config.dealer_id.clone()));
        }

        let mut dealer = Self {
            store,
            cache,
            config,
            deck_config,
            winner,
            gui,
            clock: Arc::new(Clock::new()),
            rng: StdRng::from_entropy(),
            table_fqn,
            dealer_fqn,
            cashier_fqn,
            game_id: String::new(),
            start_block: 0,
            players: Vec::new(),
            deck: None,
            schedule: None,
            vars: None,
            pending_reveal: None,
            current_action: BetAction::RoundBetting,
            board: BoardCards::default(),
        };

        dealer.register_table().await?;
        dealer.table_init().await?;
        Ok(dealer)
    }

    /// Hosted-table advertisement on the dealer identity.
    async fn register_table(&self) -> Result<(), DealerError> {
        let current = self
            .store
            .read_latest(&self.dealer_fqn, keys::T_TABLE_INFO, None, 0)
            .await?;
        let registered = current
            .and_then(|v| serde_json::from_value::<TableInfo>(v).ok())
            .map(|t| t.table_id == self.config.table_id)
            .unwrap_or(false);
        if registered {
            tracing::info!(
                target: LOG_TARGET,
                table = %self.config.table_id,
                "table already registered with dealer"
            );
            return Ok(());
        }
        let info = self.table_info(0);
        self.store
            .append_json(
                &self.dealer_fqn,
                keys::T_TABLE_INFO,
                None,
                &serde_json::to_value(&info).expect("table info serializes"),
            )
            .await?;
        Ok(())
    }

    fn table_info(&self, start_block: u64) -> TableInfo {
        TableInfo {
            max_players: self.config.max_players,
            big_blind: self.config.big_blind,
            min_stake: self.config.min_stake,
            max_stake: self.config.max_stake,
            table_id: self.config.table_id.clone(),
            dealer_id: self.config.dealer_id.clone(),
            cashier_id: self.config.cashier_id.clone(),
            start_block,
            commission_pct: self.config.commission_pct,
        }
    }

    async fn table_init(&mut self) -> Result<(), DealerError> {
        let state = self.store.game_state(&self.table_fqn, 0).await?;
        match state {
            GameState::Zeroized => {
                let mut game_id_bytes = [0u8; 32];
                self.rng.fill_bytes(&mut game_id_bytes);
                let game_id = hex::encode(game_id_bytes);
                tracing::info!(target: LOG_TARGET, %game_id, "generated new game id");

                self.store
                    .append_hex(&self.table_fqn, keys::T_GAME_ID, &game_id)
                    .await?;
                self.game_id = game_id;
                self.store
                    .append_game_state(&self.table_fqn, &self.game_id, GameState::TableActive, None)
                    .await?;
                self.start_table().await
            }
            GameState::TableActive => {
                self.game_id = self.store.require_game_id(&self.table_fqn, 0).await?;
                self.start_table().await
            }
            _ => self.adopt_running_table(state).await,
        }
    }

    async fn start_table(&mut self) -> Result<(), DealerError> {
        self.start_block = self.store.chain().get_block_count().await?;
        tracing::info!(
            target: LOG_TARGET,
            start_block = self.start_block,
            "table starting"
        );
        let info = self.table_info(self.start_block);
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_TABLE_INFO,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&info).expect("table info serializes"),
            )
            .await?;
        self.store
            .append_game_state(&self.table_fqn, &self.game_id, GameState::TableStarted, None)
            .await?;
        if let Some(gui) = &self.gui {
            gui.push(GuiPush::TableInfo { table: info });
        }
        Ok(())
    }

    /// The table is mid-hand; reload `start_block`, roster and deck secrets
    /// and continue from the published state.
    async fn adopt_running_table(&mut self, state: GameState) -> Result<(), DealerError> {
        self.game_id = self.store.require_game_id(&self.table_fqn, 0).await?;
        let game_id = self.game_id.clone();

        if let Some(info) = self
            .store
            .read_latest(&self.table_fqn, keys::T_TABLE_INFO, Some(&game_id), 0)
            .await?
            .and_then(|v| serde_json::from_value::<TableInfo>(v).ok())
        {
            self.start_block = info.start_block;
        }
        self.refresh_roster().await?;
        self.deck = self.cache.load_dealer_deck(&game_id).await?;
        if state >= GameState::DeckShufflingB && !self.players.is_empty() {
            self.rebuild_mid_hand().await?;
        }
        tracing::info!(
            target: LOG_TARGET,
            %state,
            players = self.players.len(),
            "adopted running table"
        );
        Ok(())
    }

    /// Best-effort reconstruction of hand bookkeeping after a restart: funds
    /// from the roster, dealt cards from the published board.
    async fn rebuild_mid_hand(&mut self) -> Result<(), DealerError> {
        let roster = self.roster().await?;
        let mut vars = HandVars::new(
            &roster.payin_amounts,
            self.config.big_blind / 2.0,
            self.config.big_blind,
            0,
        );
        vars.start_turn(self.clock.now(), self.store.chain().get_block_count().await?);
        self.vars = Some(vars);

        let mut schedule = DealSchedule::new(self.players.len());
        if let Some(board) = self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_BOARD_CARDS,
                Some(&self.game_id.clone()),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<BoardCards>(v).ok())
        {
            // Any board progress implies the hole cards are long dealt.
            for hole_index in 0..crate::game::types::HOLE_CARDS {
                for slot in 0..self.players.len() {
                    schedule.mark_dealt(&RevealRequest {
                        player_id: slot as i32,
                        card_id: schedule.hole_card_id(hole_index, slot),
                        card_type: CardType::Hole,
                    });
                }
            }
            for card_type in [
                CardType::Flop1,
                CardType::Flop2,
                CardType::Flop3,
                CardType::Turn,
                CardType::River,
            ] {
                if board.get(card_type).is_some() {
                    let card_id = match card_type {
                        CardType::Flop1 => schedule.flop_card_id(0),
                        CardType::Flop2 => schedule.flop_card_id(1),
                        CardType::Flop3 => schedule.flop_card_id(2),
                        CardType::Turn => schedule.turn_card_id(),
                        CardType::River => schedule.river_card_id(),
                        CardType::Hole => unreachable!(),
                    };
                    schedule.mark_dealt(&RevealRequest {
                        player_id: -1,
                        card_id,
                        card_type,
                    });
                }
            }
            self.board = board;
        }
        self.schedule = Some(schedule);
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), DealerError> {
        loop {
            match self.tick().await {
                Ok(GameState::SettlementComplete) => {
                    tracing::info!(target: LOG_TARGET, "hand settled, dealer done");
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    tracing::warn!(target: LOG_TARGET, error = %e, "transient error, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// One poll-decide-publish iteration. Returns the state observed at the
    /// start of the iteration.
    pub async fn tick(&mut self) -> Result<GameState, DealerError> {
        let state = self
            .store
            .game_state(&self.table_fqn, self.start_block)
            .await?;
        tracing::debug!(target: LOG_TARGET, %state, "dealer tick");

        match state {
            GameState::TableStarted => self.poll_joins().await?,
            GameState::PlayersJoined => self.check_player_shuffles().await?,
            GameState::DeckShufflingP => self.shuffle_deck().await?,
            GameState::DeckShufflingD => {} // cashier's move
            GameState::DeckShufflingB => self.start_dealing().await?,
            GameState::RevealCard => self.poll_reveal().await?,
            GameState::RoundBetting => self.handle_round_betting().await?,
            GameState::Showdown => self.publish_settlement().await?,
            GameState::SettlementPending | GameState::SettlementComplete => {}
            GameState::Zeroized
            | GameState::TableActive
            | GameState::RevealCardPDone => {}
        }
        Ok(state)
    }

    // ------------------------------------------------------------------
    // Joins
    // ------------------------------------------------------------------

    async fn roster(&self) -> Result<PlayerRoster, DealerError> {
        let roster = self
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
        Ok(roster)
    }

    async fn refresh_roster(&mut self) -> Result<(), DealerError> {
        self.players = self.roster().await?.entries();
        Ok(())
    }

    /// Poll candidate identities for join requests whose payin landed at the
    /// cashier at or after `start_block`, and seat the valid ones.
    async fn poll_joins(&mut self) -> Result<(), DealerError> {
        let chain = self.store.chain().clone();
        let cashier_address = chain.get_identity_address(&self.cashier_fqn).await?;
        let cashier_txids = chain
            .get_address_txids(&cashier_address, self.start_block)
            .await?;

        let mut roster = self.roster().await?;
        let mut seated = 0;

        for candidate in self.config.player_candidates.clone() {
            let candidate_fqn = self.store.namespace().qualify(&candidate);
            if !chain.identity_exists(&candidate_fqn).await? {
                continue;
            }
            let Some(request) = self
                .store
                .read_latest(&candidate_fqn, keys::P_JOIN_REQUEST, None, 0)
                .await?
                .and_then(|v| serde_json::from_value::<crate::game::types::JoinRequest>(v).ok())
            else {
                continue;
            };
            if request.dealer_id != self.config.dealer_id
                || request.table_id != self.config.table_id
            {
                continue;
            }
            if !cashier_txids.contains(&request.payin_tx) {
                tracing::warn!(
                    target: LOG_TARGET,
                    player = %candidate,
                    payin_tx = %request.payin_tx,
                    "payin not found at cashier"
                );
                continue;
            }
            let tx = chain.get_raw_transaction(&request.payin_tx).await?;
            match tx.height {
                Some(height) if height >= self.start_block => {}
                _ => continue, // unconfirmed or stale payin from an old hand
            }
            // One seat per verus id; a second request is not added.
            if roster.contains_pid(&candidate_fqn) {
                continue;
            }
            if roster.num_players >= self.config.max_players {
                break;
            }
            let amount = tx.amount_to(&cashier_address);
            if amount < self.config.min_stake || amount > self.config.max_stake {
                tracing::warn!(
                    target: LOG_TARGET,
                    player = %candidate,
                    amount,
                    "payin outside stake range"
                );
                continue;
            }

            roster.push(&candidate_fqn, &request.payin_tx, amount);
            seated += 1;
            tracing::info!(
                target: LOG_TARGET,
                player = %candidate_fqn,
                amount,
                slot = roster.num_players - 1,
                "player seated"
            );
        }

        if seated > 0 {
            self.store
                .append_json(
                    &self.table_fqn,
                    keys::T_PLAYER_INFO,
                    Some(&self.game_id.clone()),
                    &serde_json::to_value(&roster).expect("roster serializes"),
                )
                .await?;
            self.push_seats(&roster);
        }

        if roster.num_players >= self.config.max_players {
            self.players = roster.entries();
            self.store
                .append_game_state(
                    &self.table_fqn,
                    &self.game_id.clone(),
                    GameState::PlayersJoined,
                    None,
                )
                .await?;
        }
        Ok(())
    }

    fn push_seats(&self, roster: &PlayerRoster) {
        let Some(gui) = &self.gui else { return };
        let seats = roster
            .entries()
            .iter()
            .map(|entry| crate::gui::SeatView {
                seat_name: entry.verus_pid.clone(),
                seat: entry.slot,
                chips: roster.payin_amounts.get(entry.slot).copied().unwrap_or(0.0),
                empty: false,
                playing: true,
            })
            .collect();
        gui.push(GuiPush::Seats { seats });
    }

    /// Advance once every seated player reports `DECK_SHUFFLING_P` on its
    /// own identity.
    async fn check_player_shuffles(&mut self) -> Result<(), DealerError> {
        self.refresh_roster().await?;
        for entry in &self.players {
            let state = self
                .store
                .game_state(&entry.verus_pid, self.start_block)
                .await?;
            if state != GameState::DeckShufflingP {
                tracing::debug!(
                    target: LOG_TARGET,
                    player = %entry.verus_pid,
                    %state,
                    "waiting for player shuffle"
                );
                return Ok(());
            }
        }
        self.store
            .append_game_state(
                &self.table_fqn,
                &self.game_id.clone(),
                GameState::DeckShufflingP,
                None,
            )
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase D
    // ------------------------------------------------------------------

    /// Read each player's published deck points and merge chunked entries.
    async fn player_deck_points(
        &self,
        player_fqn: &str,
    ) -> Result<Vec<crate::crypto::Point>, DealerError> {
        let entries = self
            .store
            .read_entries(
                player_fqn,
                keys::PLAYER_DECK,
                Some(&self.game_id),
                self.start_block,
            )
            .await?;
        let mut cardinfo = Vec::new();
        for entry in entries {
            let deck: PlayerDeckEntry = serde_json::from_value(entry)
                .map_err(|_| DealerError::BadEntry(keys::PLAYER_DECK))?;
            cardinfo.extend(deck.cardinfo);
        }
        if cardinfo.len() != self.deck_config.num_cards {
            return Err(DealerError::Deck(DeckError::DeckSize {
                expected: self.deck_config.num_cards,
                got: cardinfo.len(),
            }));
        }
        cardinfo
            .iter()
            .map(|hex| point_from_hex(hex).map_err(DealerError::Deck))
            .collect()
    }

    async fn shuffle_deck(&mut self) -> Result<(), DealerError> {
        self.refresh_roster().await?;
        let deck = match self.deck.take() {
            Some(deck) => deck,
            None => DealerDeck::generate(self.deck_config.num_cards, &mut self.rng),
        };
        self.cache.save_dealer_deck(&self.game_id, &deck).await?;

        let game_id = self.game_id.clone();
        for entry in self.players.clone() {
            let points = self.player_deck_points(&entry.verus_pid).await?;
            let (cards, ghash) = deck.blind_player_deck(&points)?;
            let payload = deck.entry_for(&cards, &ghash);
            tracing::info!(
                target: LOG_TARGET,
                slot = entry.slot,
                "publishing dealer-blinded deck"
            );
            self.append_deck_entry(
                &keys::t_d_p_deck(entry.slot),
                &game_id,
                &serde_json::to_value(&payload).expect("deck entry serializes"),
            )
            .await?;
        }

        let points: Vec<JsonValue> = deck
            .public_points_hex()
            .into_iter()
            .map(JsonValue::String)
            .collect();
        self.store
            .append_json_chunked(&self.table_fqn, keys::T_D_DECK, Some(&game_id), &points)
            .await?;

        self.deck = Some(deck);
        self.store
            .append_game_state(&self.table_fqn, &game_id, GameState::DeckShufflingD, None)
            .await?;
        Ok(())
    }

    /// Deck entries can exceed a single update for large decks; split the
    /// card/ghash vectors into aligned chunks.
    async fn append_deck_entry(
        &self,
        key: &str,
        game_id: &str,
        payload: &JsonValue,
    ) -> Result<(), DealerError> {
        let entry: DealerDeckEntry = serde_json::from_value(payload.clone())
            .map_err(|_| DealerError::BadEntry("dealer deck entry"))?;
        let chunk = crate::vdxf::store::CMM_CHUNK_ENTRIES;
        let mut index = 0;
        while index < entry.cards.len() {
            let end = (index + chunk).min(entry.cards.len());
            let piece = DealerDeckEntry {
                cards: entry.cards[index..end].to_vec(),
                ghash: entry.ghash[index..end].to_vec(),
            };
            self.store
                .append_json(
                    &self.table_fqn,
                    key,
                    Some(game_id),
                    &serde_json::to_value(&piece).expect("deck chunk serializes"),
                )
                .await?;
            index = end;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Dealing and reveals
    // ------------------------------------------------------------------

    async fn start_dealing(&mut self) -> Result<(), DealerError> {
        self.refresh_roster().await?;
        let roster = self.roster().await?;
        let mut vars = HandVars::new(
            &roster.payin_amounts,
            self.config.big_blind / 2.0,
            self.config.big_blind,
            0,
        );
        vars.start_turn(self.clock.now(), self.store.chain().get_block_count().await?);
        self.vars = Some(vars);
        self.schedule = Some(DealSchedule::new(self.players.len()));
        self.board = BoardCards::default();
        self.deal_next_card().await
    }

    async fn deal_next_card(&mut self) -> Result<(), DealerError> {
        let Some(request) = self.schedule.as_ref().and_then(DealSchedule::next_request) else {
            return self.to_showdown().await;
        };
        tracing::info!(
            target: LOG_TARGET,
            player_id = request.player_id,
            card_id = request.card_id,
            card_type = ?request.card_type,
            "dealing next card"
        );
        self.store
            .append_game_state(
                &self.table_fqn,
                &self.game_id.clone(),
                GameState::RevealCard,
                Some(serde_json::to_value(request).expect("reveal request serializes")),
            )
            .await?;
        self.pending_reveal = Some(PendingReveal {
            request,
            started_time: self.clock.now(),
            started_block: self.store.chain().get_block_count().await?,
            echoed: HashSet::new(),
        });
        Ok(())
    }

    /// Seats expected to echo the pending reveal.
    fn reveal_targets(&self, request: &RevealRequest) -> Vec<Slot> {
        let vars = self.vars.as_ref();
        if request.player_id >= 0 {
            vec![request.player_id as usize]
        } else {
            (0..self.players.len())
                .filter(|&slot| vars.map(|v| !v.has_folded(slot)).unwrap_or(true))
                .collect()
        }
    }

    async fn poll_reveal(&mut self) -> Result<(), DealerError> {
        let Some(pending) = self.pending_reveal.take() else {
            // Restarted mid-reveal: rebuild the pending record from chain.
            let Some(info) = self
                .store
                .game_state_info(&self.table_fqn, self.start_block)
                .await?
            else {
                return Ok(());
            };
            let request: RevealRequest = serde_json::from_value(info)
                .map_err(|_| DealerError::BadEntry(keys::T_GAME_INFO))?;
            self.pending_reveal = Some(PendingReveal {
                request,
                started_time: self.clock.now(),
                started_block: self.store.chain().get_block_count().await?,
                echoed: HashSet::new(),
            });
            return Ok(());
        };
        let mut pending = pending;
        let targets = self.reveal_targets(&pending.request);

        for slot in &targets {
            if pending.echoed.contains(slot) {
                continue;
            }
            let Some(entry) = self.players.get(*slot) else { continue };
            let state = self
                .store
                .game_state(&entry.verus_pid, self.start_block)
                .await?;
            if state != GameState::RevealCardPDone {
                continue;
            }
            let echo = self
                .store
                .game_state_info(&entry.verus_pid, self.start_block)
                .await?
                .and_then(|v| serde_json::from_value::<RevealRequest>(v).ok());
            if echo.map(|e| e.card_id == pending.request.card_id).unwrap_or(false) {
                pending.echoed.insert(*slot);
            }
        }

        let outstanding: Vec<Slot> = targets
            .iter()
            .copied()
            .filter(|slot| !pending.echoed.contains(slot))
            .collect();

        if outstanding.is_empty() {
            let request = pending.request;
            self.receive_card(request).await?;
            return Ok(());
        }

        let height = self.store.chain().get_block_count().await?;
        let now = self.clock.now();
        let timed_out = (now - pending.started_time) >= crate::game::types::TURN_TIMEOUT_SECS
            && height.saturating_sub(pending.started_block)
                >= crate::game::types::TURN_TIMEOUT_BLOCKS;
        if timed_out {
            for slot in &outstanding {
                tracing::warn!(
                    target: LOG_TARGET,
                    slot,
                    card_id = pending.request.card_id,
                    "reveal timeout, seat folded"
                );
                if let Some(vars) = self.vars.as_mut() {
                    vars.fold_all_rounds(*slot);
                }
            }
            let request = pending.request;
            self.receive_card(request).await?;
            return Ok(());
        }

        self.pending_reveal = Some(pending);
        Ok(())
    }

    async fn receive_card(&mut self, request: RevealRequest) -> Result<(), DealerError> {
        if request.card_type.is_community() {
            // Community values must agree across every live seat before the
            // board advances.
            if !self.confirm_community_card(&request).await? {
                // Keep waiting; players are still reporting.
                self.pending_reveal = Some(PendingReveal {
                    request,
                    started_time: self.clock.now(),
                    started_block: self.store.chain().get_block_count().await?,
                    echoed: HashSet::new(),
                });
                return Ok(());
            }
        }

        let schedule = self.schedule.as_mut().expect("dealing without schedule");
        schedule.mark_dealt(&request);
        let street_closed = schedule.street_closed(request.card_type);
        let river_done = schedule.river_dealt();

        if !street_closed {
            return self.deal_next_card().await;
        }
        if river_done {
            return self.to_showdown().await;
        }
        self.begin_betting_round().await
    }

    /// Poll every live seat's decoded value for this community card.
    /// Ok(true) once all agree; an explicit mismatch aborts the hand.
    async fn confirm_community_card(&mut self, request: &RevealRequest) -> Result<bool, DealerError> {
        let mut values = Vec::new();
        let live: Vec<&RosterEntry> = self
            .players
            .iter()
            .filter(|entry| {
                self.vars
                    .as_ref()
                    .map(|v| !v.has_folded(entry.slot))
                    .unwrap_or(true)
            })
            .collect();

        for entry in &live {
            let report = self
                .store
                .read_latest(
                    &entry.verus_pid,
                    keys::P_DECODED_CARD,
                    Some(&self.game_id),
                    self.start_block,
                )
                .await?
                .and_then(|v| serde_json::from_value::<crate::game::types::DecodedCardReport>(v).ok());
            match report {
                Some(report) if report.card_id == request.card_id => values.push(report.card_value),
                _ => return Ok(false),
            }
        }

        if values.windows(2).any(|pair| pair[0] != pair[1]) {
            return Err(DealerError::CardConsensus {
                card_id: request.card_id,
                values,
            });
        }
        let Some(&value) = values.first() else {
            return Ok(false);
        };

        self.board.set(request.card_type, value);
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_BOARD_CARDS,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&self.board).expect("board serializes"),
            )
            .await?;
        tracing::info!(
            target: LOG_TARGET,
            card_id = request.card_id,
            value,
            "community card confirmed"
        );
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Betting
    // ------------------------------------------------------------------

    async fn begin_betting_round(&mut self) -> Result<(), DealerError> {
        let (round, turn) = {
            let vars = self.vars.as_mut().expect("betting without vars");
            vars.last_turn = vars.dealer_seat;
            vars.turn = vars.dealer_seat % vars.num_players;
            (vars.round, vars.turn)
        };
        self.current_action = if round == 0 {
            BetAction::SmallBlind
        } else {
            BetAction::RoundBetting
        };

        let info = serde_json::json!({
            "method": "betting",
            "action": self.current_action,
            "playerid": turn,
            "round": round,
        });
        self.store
            .append_game_state(
                &self.table_fqn,
                &self.game_id.clone(),
                GameState::RoundBetting,
                Some(info),
            )
            .await?;
        self.write_betting_state().await
    }

    async fn write_betting_state(&mut self) -> Result<(), DealerError> {
        let now = self.clock.now();
        let height = self.store.chain().get_block_count().await?;
        let state = {
            let vars = self.vars.as_mut().expect("betting without vars");
            vars.start_turn(now, height);
            vars.betting_state(self.current_action)
        };
        tracing::info!(
            target: LOG_TARGET,
            turn = state.current_turn,
            round = state.round,
            pot = state.pot,
            action = ?state.action,
            "writing betting state"
        );
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_BETTING_STATE,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&state).expect("betting state serializes"),
            )
            .await?;
        if let Some(gui) = &self.gui {
            gui.push(GuiPush::Betting { state });
        }
        Ok(())
    }

    async fn poll_player_action(
        &self,
        slot: Slot,
        expected_round: usize,
        expected_turn_block: u64,
    ) -> Result<Option<PlayerBetAction>, DealerError> {
        let Some(entry) = self.players.get(slot) else {
            return Ok(None);
        };
        let action = self
            .store
            .read_latest(
                &entry.verus_pid,
                keys::P_BETTING_ACTION,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<PlayerBetAction>(v).ok())
            .filter(|action| {
                action.round == expected_round && action.turn_start_block == expected_turn_block
            });
        Ok(action)
    }

    async fn handle_round_betting(&mut self) -> Result<(), DealerError> {
        let (turn, round, turn_block) = {
            let vars = self.vars.as_ref().expect("betting without vars");
            (vars.turn, vars.round, vars.turn_start_block)
        };

        let mut action = self.poll_player_action(turn, round, turn_block).await?;
        if action.is_none() {
            let now = self.clock.now();
            let height = self.store.chain().get_block_count().await?;
            let vars = self.vars.as_ref().expect("betting without vars");
            if vars.turn_timed_out(now, height) {
                tracing::warn!(
                    target: LOG_TARGET,
                    slot = turn,
                    round,
                    "betting timeout, auto-folding"
                );
                action = Some(PlayerBetAction {
                    action: BetAction::Fold,
                    amount: 0.0,
                    round,
                    turn_start_block: turn_block,
                    auto_fold: true,
                });
            } else {
                return Ok(());
            }
        }
        let action = action.expect("checked above");

        let next = {
            let vars = self.vars.as_mut().expect("betting without vars");
            vars.process_action(turn, &action)?;
            vars.next_turn()
        };

        match next {
            Some(next_slot) => {
                let round_now = {
                    let vars = self.vars.as_mut().expect("betting without vars");
                    vars.last_turn = vars.turn;
                    vars.turn = next_slot;
                    vars.round
                };
                self.current_action = if round_now == 0
                    && self
                        .vars
                        .as_ref()
                        .map(|v| {
                            v.action(next_slot, 0) == BetAction::None
                                && next_slot == (v.dealer_seat + 1) % v.num_players
                        })
                        .unwrap_or(false)
                {
                    BetAction::BigBlind
                } else {
                    BetAction::RoundBetting
                };
                self.write_betting_state().await
            }
            None => self.close_round().await,
        }
    }

    async fn close_round(&mut self) -> Result<(), DealerError> {
        let (players_left, round) = {
            let vars = self.vars.as_mut().expect("betting without vars");
            vars.advance_round()?;
            (vars.players_left(), vars.round)
        };
        tracing::info!(
            target: LOG_TARGET,
            round,
            players_left,
            "betting round complete"
        );
        if round >= MAX_ROUNDS || players_left < 2 {
            return self.to_showdown().await;
        }
        self.deal_next_card().await
    }

    // ------------------------------------------------------------------
    // Showdown & settlement
    // ------------------------------------------------------------------

    async fn to_showdown(&mut self) -> Result<(), DealerError> {
        self.store
            .append_game_state(
                &self.table_fqn,
                &self.game_id.clone(),
                GameState::Showdown,
                None,
            )
            .await?;
        self.publish_settlement().await
    }

    async fn publish_settlement(&mut self) -> Result<(), DealerError> {
        let vars = self.vars.as_ref().expect("settlement without vars");
        let live = vars.live_slots();
        let board = [
            self.board.flop[0],
            self.board.flop[1],
            self.board.flop[2],
            self.board.turn,
            self.board.river,
        ];
        let payouts = self
            .winner
            .distribute(vars.pot, &live, &board, &vec![Vec::new(); vars.num_players]);

        let commission = self.config.commission_pct / 100.0;
        let mut settle_amounts = vec![0.0; vars.num_players];
        for (slot, payout) in live.iter().zip(payouts) {
            settle_amounts[*slot] = payout * (1.0 - commission);
        }

        let info = SettlementInfo {
            player_ids: self.players.iter().map(|e| e.verus_pid.clone()).collect(),
            settle_amounts,
            status: SettlementStatus::Pending,
            payout_txs: Vec::new(),
        };
        tracing::info!(
            target: LOG_TARGET,
            pot = vars.pot,
            winners = ?live,
            "publishing settlement"
        );
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_SETTLEMENT_INFO,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&info).expect("settlement serializes"),
            )
            .await?;
        self.store
            .append_game_state(
                &self.table_fqn,
                &self.game_id.clone(),
                GameState::SettlementPending,
                None,
            )
            .await?;
        if let Some(gui) = &self.gui {
            gui.push(GuiPush::FinalInfo { settlement: info });
        }
        Ok(())
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }
}

impl DealerError {
    /// Transient errors keep the loop alive; everything else aborts the hand.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DealerError::Chain(ChainError::Transport(_))
                | DealerError::Chain(ChainError::Rpc { .. })
                | DealerError::Vdxf(VdxfError::Chain(ChainError::Transport(_)))
                | DealerError::Vdxf(VdxfError::UpdateExhausted { .. })
        )
    }
}
