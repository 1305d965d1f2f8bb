//! Cashier: custodies funds, runs Phase B of the shuffle, reveals blinding
//! scalars on card-draw requests, executes settlement payouts and resolves
//! disputes.
//!
//! The cashier runs two cooperative polls: the game loop follows the table
//! identity's state, and the dispute loop scans candidate player identities.
//! The two touch disjoint keys.

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::chain::{ChainError, OperationStatus};
use crate::config::CashierConfig;
use crate::crypto::curve::{scalar_from_hex, scalar_to_hex};
use crate::crypto::{seal, CashierSecrets, DeckError};
use crate::game::clock::Clock;
use crate::game::types::{
    BlindedDeckEntry, CardBv, Chips, DealerDeckEntry, DeckConfig, DisputeRequest, DisputeResult,
    DisputeStatus, GameHistory, GameState, PlayerDeckEntry, PlayerRoster, RevealRequest,
    RosterEntry, SettlementInfo, SettlementStatus, TableInfo, DISPUTE_SCAN_BACK_BLOCKS,
    DISPUTE_TIMEOUT_BLOCKS,
};
use crate::gui::{GuiHandle, GuiPush};
use crate::storage::{Cache, StorageError};
use crate::vdxf::{keys, IdentityStore, VdxfError};

const LOG_TARGET: &str = "cashier";

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Short name of the cashier registry identity.
pub const CASHIERS_ID: &str = "cashiers";

#[derive(Error, Debug)]
pub enum CashierError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    Vdxf(#[from] VdxfError),

    #[error(transparent)]
    Deck(#[from] DeckError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("malformed entry under {0}")]
    BadEntry(&'static str),

    #[error("payout operation failed: {0}")]
    PayoutFailed(String),
}

pub struct Cashier {
    store: Arc<IdentityStore>,
    cache: Arc<Cache>,
    config: CashierConfig,
    gui: Option<GuiHandle>,
    pub clock: Arc<Clock>,
    rng: StdRng,

    cashier_fqn: String,
    table_fqn: String,

    game_id: String,
    start_block: u64,
    players: Vec<RosterEntry>,
    secrets: Option<CashierSecrets>,
    game_id_mirrored: bool,
}

impl Cashier {
    pub fn new(
        store: Arc<IdentityStore>,
        cache: Arc<Cache>,
        config: CashierConfig,
        gui: Option<GuiHandle>,
    ) -> Self {
        let namespace = store.namespace().clone();
        let cashier_fqn = namespace.qualify(&config.cashier_id);
        let table_fqn = namespace.qualify(&config.table_id);
        Self {
            store,
            cache,
            config,
            gui,
            clock: Arc::new(Clock::new()),
            rng: StdRng::from_entropy(),
            cashier_fqn,
            table_fqn,
            game_id: String::new(),
            start_block: 0,
            players: Vec::new(),
            secrets: None,
            game_id_mirrored: false,
        }
    }

    pub fn cashier_fqn(&self) -> &str {
        &self.cashier_fqn
    }

    /// Advertise this node in the cashier registry.
    pub async fn register_ip(&self, ip: &str) -> Result<(), CashierError> {
        let registry_fqn = self.store.namespace().qualify(CASHIERS_ID);
        let mut ips: Vec<String> = self
            .store
            .read_latest(&registry_fqn, keys::CASHIERS, None, 0)
            .await?
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default();
        if ips.iter().any(|existing| existing == ip) {
            return Ok(());
        }
        ips.push(ip.to_string());
        self.store
            .append_json(
                &registry_fqn,
                keys::CASHIERS,
                None,
                &serde_json::to_value(&ips).expect("registry serializes"),
            )
            .await?;
        tracing::info!(target: LOG_TARGET, %ip, "cashier registered");
        Ok(())
    }

    pub async fn run(&mut self) -> Result<(), CashierError> {
        loop {
            if let Err(e) = self.tick().await {
                tracing::warn!(target: LOG_TARGET, error = %e, "game loop error");
            }
            if let Err(e) = self.poll_disputes().await {
                tracing::warn!(target: LOG_TARGET, error = %e, "dispute loop error");
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Refresh the hand context from the table identity.
    async fn refresh(&mut self) -> Result<GameState, CashierError> {
        let Some(game_id) = self.store.game_id(&self.table_fqn, 0).await? else {
            return Ok(GameState::Zeroized);
        };
        if game_id != self.game_id {
            // New hand: drop the previous hand's secrets.
            self.game_id = game_id;
            self.secrets = None;
            self.game_id_mirrored = false;
            self.players.clear();
        }
        if let Some(info) = self
            .store
            .read_latest(&self.table_fqn, keys::T_TABLE_INFO, Some(&self.game_id), 0)
            .await?
            .and_then(|v| serde_json::from_value::<TableInfo>(v).ok())
        {
            self.start_block = info.start_block;
        }
        let state = self
            .store
            .game_state(&self.table_fqn, self.start_block)
            .await?;
        Ok(state)
    }

    pub async fn tick(&mut self) -> Result<GameState, CashierError> {
        let state = self.refresh().await?;
        tracing::debug!(target: LOG_TARGET, %state, "cashier tick");
        match state {
            GameState::DeckShufflingD => self.shuffle_deck().await?,
            GameState::RevealCard => self.reveal_bv().await?,
            GameState::SettlementPending => self.process_settlement().await?,
            _ => {}
        }
        Ok(state)
    }

    async fn roster(&mut self) -> Result<(), CashierError> {
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
        self.players = roster.entries();
        Ok(())
    }

    /// `t_game_id` mirror on the cashier's own identity, once per hand.
    async fn ensure_game_id_mirrored(&mut self) -> Result<(), CashierError> {
        if self.game_id_mirrored {
            return Ok(());
        }
        self.store
            .append_hex(&self.cashier_fqn, keys::T_GAME_ID, &self.game_id.clone())
            .await?;
        self.game_id_mirrored = true;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase B
    // ------------------------------------------------------------------

    async fn player_sealing_keys(
        &self,
    ) -> Result<Vec<crypto_box::PublicKey>, CashierError> {
        let mut sealing = Vec::with_capacity(self.players.len());
        for entry in &self.players {
            let deck: PlayerDeckEntry = self
                .store
                .read_entries(
                    &entry.verus_pid,
                    keys::PLAYER_DECK,
                    Some(&self.game_id),
                    self.start_block,
                )
                .await?
                .into_iter()
                .next()
                .and_then(|v| serde_json::from_value(v).ok())
                .ok_or(CashierError::BadEntry(keys::PLAYER_DECK))?;
            sealing.push(seal::public_key_from_hex(&deck.sealing_key)?);
        }
        Ok(sealing)
    }

    async fn dealer_deck_cards(
        &self,
        slot: usize,
    ) -> Result<Vec<crate::crypto::Scalar>, CashierError> {
        let entries = self
            .store
            .read_entries(
                &self.table_fqn,
                &keys::t_d_p_deck(slot),
                Some(&self.game_id),
                self.start_block,
            )
            .await?;
        let mut cards = Vec::new();
        for entry in entries {
            let piece: DealerDeckEntry = serde_json::from_value(entry)
                .map_err(|_| CashierError::BadEntry("dealer deck"))?;
            for hex in piece.cards {
                cards.push(scalar_from_hex(&hex)?);
            }
        }
        Ok(cards)
    }

    async fn shuffle_deck(&mut self) -> Result<(), CashierError> {
        self.ensure_game_id_mirrored().await?;
        self.roster().await?;
        let num_cards = DeckConfig::default().num_cards;
        let secrets = match self.secrets.take() {
            Some(secrets) => secrets,
            None => CashierSecrets::generate(self.players.len(), num_cards, &mut self.rng),
        };

        let sealing_keys = self.player_sealing_keys().await?;
        let game_id = self.game_id.clone();

        for entry in self.players.clone() {
            let dealer_cards = self.dealer_deck_cards(entry.slot).await?;
            let blinded =
                secrets.blind_player_deck(entry.slot, &dealer_cards, &sealing_keys, &mut self.rng)?;
            tracing::info!(
                target: LOG_TARGET,
                slot = entry.slot,
                "publishing cashier-blinded deck"
            );
            self.append_blinded_entry(&keys::t_b_p_deck(entry.slot), &game_id, blinded)
                .await?;
            if let Some(secrets_hex) = secrets.secrets_hex(entry.slot) {
                self.cache
                    .save_cashier_deck(
                        &game_id,
                        entry.slot as i32,
                        &secrets.perm_csv(),
                        &secrets_hex,
                    )
                    .await?;
            }
        }

        self.secrets = Some(secrets);
        self.store
            .append_game_state(&self.table_fqn, &game_id, GameState::DeckShufflingB, None)
            .await?;
        Ok(())
    }

    async fn append_blinded_entry(
        &self,
        key: &str,
        game_id: &str,
        entry: BlindedDeckEntry,
    ) -> Result<(), CashierError> {
        let chunk = crate::vdxf::store::CMM_CHUNK_ENTRIES;
        let mut index = 0;
        while index < entry.cards.len() {
            let end = (index + chunk).min(entry.cards.len());
            let piece = BlindedDeckEntry {
                cards: entry.cards[index..end].to_vec(),
                shares: entry.shares[index..end].to_vec(),
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
    // Blinding reveals
    // ------------------------------------------------------------------

    async fn reveal_bv(&mut self) -> Result<(), CashierError> {
        let Some(request) = self
            .store
            .game_state_info(&self.table_fqn, self.start_block)
            .await?
            .and_then(|v| serde_json::from_value::<RevealRequest>(v).ok())
        else {
            return Ok(());
        };

        // Already answered this request?
        let published = self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_CARD_BV,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<CardBv>(v).ok())
            .map(|bv| bv.card_id == request.card_id && bv.player_id == request.player_id)
            .unwrap_or(false);
        if published {
            return Ok(());
        }

        if self.secrets.is_none() {
            // Restarted mid-hand; per-seat blindings come back from the cache.
            self.roster().await?;
            self.restore_secrets().await?;
        }
        let Some(secrets) = self.secrets.as_ref() else {
            return Err(CashierError::BadEntry("cashier deck cache"));
        };

        let bv: Vec<String> = if request.player_id == -1 {
            (0..self.players.len())
                .map(|slot| {
                    secrets
                        .blinding(slot, request.card_id)
                        .map(scalar_to_hex)
                        .ok_or(CashierError::BadEntry("blinding index"))
                })
                .collect::<Result<_, _>>()?
        } else {
            vec![secrets
                .blinding(request.player_id as usize, request.card_id)
                .map(scalar_to_hex)
                .ok_or(CashierError::BadEntry("blinding index"))?]
        };

        let card_bv = CardBv {
            player_id: request.player_id,
            card_id: request.card_id,
            bv,
        };
        tracing::info!(
            target: LOG_TARGET,
            player_id = request.player_id,
            card_id = request.card_id,
            "revealing blinding value"
        );
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_CARD_BV,
                Some(&self.game_id.clone()),
                &serde_json::to_value(&card_bv).expect("card bv serializes"),
            )
            .await?;
        Ok(())
    }

    async fn restore_secrets(&mut self) -> Result<(), CashierError> {
        let mut blindings = Vec::with_capacity(self.players.len());
        let mut perm_csv = String::new();
        for entry in &self.players {
            let Some((perm, secrets_hex)) = self
                .cache
                .load_cashier_deck(&self.game_id, entry.slot as i32)
                .await?
            else {
                return Ok(());
            };
            perm_csv = perm;
            let bytes = hex::decode(&secrets_hex)
                .map_err(|_| CashierError::BadEntry("cashier deck cache"))?;
            let scalars = bytes
                .chunks(32)
                .map(crate::crypto::curve::scalar_from_bytes)
                .collect::<Result<Vec<_>, _>>()?;
            blindings.push(scalars);
        }
        if blindings.is_empty() {
            return Ok(());
        }
        let perm = perm_csv
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| CashierError::BadEntry("perm")))
            .collect::<Result<Vec<usize>, _>>()?;
        let (sealing_secret, _) = seal::generate_keypair(&mut self.rng);
        self.secrets = Some(CashierSecrets {
            perm,
            blindings,
            sealing_secret,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // Settlement
    // ------------------------------------------------------------------

    async fn send_and_confirm(
        &self,
        to: &str,
        amount: Chips,
        data: JsonValue,
    ) -> Result<String, CashierError> {
        let chain = self.store.chain();
        let opid = chain
            .send_currency(&self.cashier_fqn, to, amount, Some(data))
            .await?;
        loop {
            match chain.get_operation_status(&opid).await? {
                OperationStatus::Executing => tokio::time::sleep(Duration::from_secs(1)).await,
                OperationStatus::Success { txid } => return Ok(txid),
                OperationStatus::Failed { reason } => {
                    return Err(CashierError::PayoutFailed(reason))
                }
            }
        }
    }

    async fn process_settlement(&mut self) -> Result<(), CashierError> {
        let Some(mut settlement) = self
            .store
            .read_latest(
                &self.table_fqn,
                keys::T_SETTLEMENT_INFO,
                Some(&self.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value::<SettlementInfo>(v).ok())
        else {
            tracing::warn!(target: LOG_TARGET, "settlement pending without settlement info");
            return Ok(());
        };
        if settlement.status != SettlementStatus::Pending {
            return Ok(());
        }

        self.ensure_game_id_mirrored().await?;
        let game_id = self.game_id.clone();
        let mut payout_txs = Vec::with_capacity(settlement.player_ids.len());
        for (slot, (player_id, amount)) in settlement
            .player_ids
            .iter()
            .zip(&settlement.settle_amounts)
            .enumerate()
        {
            if *amount <= 0.0 {
                payout_txs.push(String::new());
                continue;
            }
            let data = serde_json::json!({
                "type": "game_settlement",
                "game_id": game_id,
                "table_id": self.config.table_id,
                "player_slot": slot,
            });
            match self.send_and_confirm(player_id, *amount, data).await {
                Ok(txid) => {
                    tracing::info!(
                        target: LOG_TARGET,
                        player = %player_id,
                        amount,
                        %txid,
                        "settlement payout sent"
                    );
                    payout_txs.push(txid);
                }
                Err(e) => {
                    tracing::error!(
                        target: LOG_TARGET,
                        player = %player_id,
                        error = %e,
                        "settlement payout failed"
                    );
                    payout_txs.push("failed".to_string());
                }
            }
        }

        settlement.status = SettlementStatus::Completed;
        settlement.payout_txs = payout_txs;
        self.store
            .append_json(
                &self.table_fqn,
                keys::T_SETTLEMENT_INFO,
                Some(&game_id),
                &serde_json::to_value(&settlement).expect("settlement serializes"),
            )
            .await?;
        self.store
            .append_game_state(&self.table_fqn, &game_id, GameState::SettlementComplete, None)
            .await?;
        if let Some(gui) = &self.gui {
            gui.push(GuiPush::FinalInfo {
                settlement,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Disputes
    // ------------------------------------------------------------------

    /// Scan candidate player identities for unanswered dispute requests.
    /// Game ids come from each player's own `t_game_id` mirror, so aborted
    /// hands are found without a table read.
    pub async fn poll_disputes(&mut self) -> Result<usize, CashierError> {
        let chain = self.store.chain().clone();
        let scan_start = chain
            .get_block_count()
            .await?
            .saturating_sub(DISPUTE_SCAN_BACK_BLOCKS);
        let mut resolved = 0;

        for candidate in self.config.player_candidates.clone() {
            let player_fqn = self.store.namespace().qualify(&candidate);
            if !chain.identity_exists(&player_fqn).await? {
                continue;
            }
            let Some(game_id) = self.store.game_id(&player_fqn, scan_start).await? else {
                continue;
            };
            let Some(request) = self
                .store
                .read_latest(
                    &player_fqn,
                    keys::P_DISPUTE_REQUEST,
                    Some(&game_id),
                    scan_start,
                )
                .await?
                .and_then(|v| serde_json::from_value::<DisputeRequest>(v).ok())
            else {
                continue;
            };

            let suffix = format!("{}.{}", request.game_id, player_fqn);
            let answered = self
                .store
                .read_latest(&self.cashier_fqn, keys::C_DISPUTE_RESULT, Some(&suffix), 0)
                .await?
                .is_some();
            if answered {
                continue;
            }

            self.resolve_dispute(&player_fqn, &request).await?;
            resolved += 1;
        }
        Ok(resolved)
    }

    /// The four-step dispute decision. The payin UTXO test is the
    /// serialization boundary: a spent payin can never be refunded again.
    async fn resolve_dispute(
        &mut self,
        player_fqn: &str,
        request: &DisputeRequest,
    ) -> Result<(), CashierError> {
        let chain = self.store.chain().clone();
        tracing::info!(
            target: LOG_TARGET,
            player = %player_fqn,
            game_id = %request.game_id,
            reason = %request.reason,
            "resolving dispute"
        );

        let (status, reason, payout_tx) = if !self.payin_unspent(&request.payin_tx).await? {
            (DisputeStatus::Rejected, "payin_tx_already_spent", String::new())
        } else {
            let table_fqn = self.store.namespace().qualify(&request.table_id);
            let current_game = self.store.game_id(&table_fqn, 0).await?;
            let state = if current_game.as_deref() == Some(request.game_id.as_str()) {
                self.store.game_state(&table_fqn, self.start_block).await?
            } else {
                GameState::Zeroized
            };

            match state {
                GameState::SettlementComplete => {
                    (DisputeStatus::Rejected, "game_already_settled", String::new())
                }
                GameState::SettlementPending => {
                    self.settle_disputed_player(player_fqn, request).await?
                }
                _ => {
                    let history: Option<GameHistory> = self
                        .store
                        .read_latest(
                            player_fqn,
                            keys::P_GAME_HISTORY,
                            Some(&request.game_id),
                            0,
                        )
                        .await?
                        .and_then(|v| serde_json::from_value(v).ok());
                    let height = chain.get_block_count().await?;
                    let join_block = history.as_ref().map(|h| h.join_block).unwrap_or(0);
                    let payin_age = height.saturating_sub(join_block);

                    if payin_age < DISPUTE_TIMEOUT_BLOCKS && state != GameState::Zeroized {
                        (DisputeStatus::Rejected, "game_still_active", String::new())
                    } else {
                        let amount = history.map(|h| h.amount).unwrap_or(0.0);
                        if amount > 0.0 {
                            let data = serde_json::json!({
                                "type": "dispute_refund",
                                "game_id": request.game_id,
                                "reason": "game_aborted",
                            });
                            match self.send_and_confirm(player_fqn, amount, data).await {
                                Ok(txid) => {
                                    (DisputeStatus::Refunded, "game_aborted_refund", txid)
                                }
                                Err(_) => {
                                    (DisputeStatus::Rejected, "refund_failed", String::new())
                                }
                            }
                        } else {
                            (DisputeStatus::Rejected, "no_amount_to_refund", String::new())
                        }
                    }
                }
            }
        };

        let result = DisputeResult {
            player_id: player_fqn.to_string(),
            game_id: request.game_id.clone(),
            status,
            payout_tx,
            reason: reason.to_string(),
            resolved_block: chain.get_block_count().await?,
        };
        let suffix = format!("{}.{}", request.game_id, player_fqn);
        self.store
            .append_json(
                &self.cashier_fqn,
                keys::C_DISPUTE_RESULT,
                Some(&suffix),
                &serde_json::to_value(&result).expect("dispute result serializes"),
            )
            .await?;
        tracing::info!(
            target: LOG_TARGET,
            player = %player_fqn,
            status = ?result.status,
            reason = %result.reason,
            "dispute resolved"
        );
        Ok(())
    }

    /// Settlement is pending but unexecuted; pay this player their share now.
    async fn settle_disputed_player(
        &self,
        player_fqn: &str,
        request: &DisputeRequest,
    ) -> Result<(DisputeStatus, &'static str, String), CashierError> {
        let table_fqn = self.store.namespace().qualify(&request.table_id);
        let settlement: Option<SettlementInfo> = self
            .store
            .read_latest(
                &table_fqn,
                keys::T_SETTLEMENT_INFO,
                Some(&request.game_id),
                self.start_block,
            )
            .await?
            .and_then(|v| serde_json::from_value(v).ok());
        let Some(settlement) = settlement else {
            return Ok((DisputeStatus::Rejected, "no_settlement_info", String::new()));
        };

        let Some(index) = settlement
            .player_ids
            .iter()
            .position(|id| id == player_fqn)
        else {
            return Ok((DisputeStatus::Rejected, "no_settlement_info", String::new()));
        };
        let amount = settlement.settle_amounts[index];
        if amount <= 0.0 {
            return Ok((DisputeStatus::Paid, "zero_amount_due", String::new()));
        }

        let data = serde_json::json!({
            "type": "dispute_settlement",
            "game_id": request.game_id,
        });
        match self.send_and_confirm(player_fqn, amount, data).await {
            Ok(txid) => Ok((DisputeStatus::Paid, "settlement_processed", txid)),
            Err(_) => Ok((DisputeStatus::Rejected, "payout_failed", String::new())),
        }
    }

    /// True while any cashier-addressed output of the payin is unspent.
    async fn payin_unspent(&self, payin_tx: &str) -> Result<bool, CashierError> {
        let chain = self.store.chain();
        let tx = match chain.get_raw_transaction(payin_tx).await {
            Ok(tx) => tx,
            Err(ChainError::TxNotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let address = chain.get_identity_address(&self.cashier_fqn).await?;
        for vout in tx.vouts_to(&address) {
            if chain.get_tx_out(payin_tx, vout).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
