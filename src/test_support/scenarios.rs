#![cfg(test)]
//! End-to-end hand scenarios over the in-memory chain: dealer, players and
//! cashier run their real loops, the tests only sequence the ticks.

use std::sync::Arc;

use crate::cashier::Cashier;
use crate::chain::rpc::RpcConfig;
use crate::chain::ChainClient;
use crate::config::{CashierConfig, DealerConfig, NodeConfig, PlayerConfig};
use crate::dealer::{registry, Dealer, DealerError};
use crate::game::settle::WinnerSelector;
use crate::game::types::{
    Chips, DisputeStatus, GameState, SettlementInfo, SettlementStatus, Slot,
    DISPUTE_TIMEOUT_BLOCKS, TURN_TIMEOUT_BLOCKS, TURN_TIMEOUT_SECS,
};
use crate::player::{Player, PlayerError};
use crate::storage::Cache;
use crate::vdxf::{keys, IdentityStore, Namespace};

use super::MemoryChain;

/// Test selector: the named slot takes the whole pot when still live.
struct FixedWinner(Slot);

impl WinnerSelector for FixedWinner {
    fn distribute(
        &self,
        pot: Chips,
        live_slots: &[Slot],
        _board: &[i32],
        _hole_cards: &[Vec<i32>],
    ) -> Vec<Chips> {
        if live_slots.contains(&self.0) {
            live_slots
                .iter()
                .map(|&slot| if slot == self.0 { pot } else { 0.0 })
                .collect()
        } else {
            let share = pot / live_slots.len() as Chips;
            live_slots.iter().map(|_| share).collect()
        }
    }
}

struct Harness {
    chain: Arc<MemoryChain>,
    store: Arc<IdentityStore>,
    dealer: Dealer,
    players: Vec<Player>,
    player_caches: Vec<Arc<Cache>>,
    cashier: Cashier,
    table_fqn: String,
}

fn node_config() -> NodeConfig {
    NodeConfig {
        rpc: RpcConfig::default(),
        org: "pangea".to_string(),
        cache_path: String::new(),
    }
}

fn dealer_config(max_players: usize) -> DealerConfig {
    DealerConfig {
        node: node_config(),
        max_players,
        big_blind: 0.02,
        min_stake: 0.5,
        max_stake: 2.0,
        dealer_id: "dealer1".to_string(),
        cashier_id: "cashier".to_string(),
        table_id: "table1".to_string(),
        gui_ws_port: 0,
        commission_pct: 0.0,
        player_candidates: (1..=9).map(|i| format!("p{i}")).collect(),
    }
}

fn player_config(name: &str) -> PlayerConfig {
    PlayerConfig {
        node: node_config(),
        dealer_id: "dealer1".to_string(),
        table_id: "table1".to_string(),
        wallet_addr: String::new(),
        player_id: name.to_string(),
        ws_port: 0,
        max_allowed_dcv_commission: 5.0,
        auto_betting: true,
    }
}

fn cashier_config() -> CashierConfig {
    CashierConfig {
        node: node_config(),
        cashier_id: "cashier".to_string(),
        table_id: "table1".to_string(),
        gui_ws_port: 0,
        peers: Vec::new(),
        player_candidates: (1..=9).map(|i| format!("p{i}")).collect(),
    }
}

impl Harness {
    /// Bring up a table with `num_players` joined, decks published through
    /// Phase B, winner fixed to seat 0.
    async fn new(num_players: usize) -> Self {
        Self::new_with_winner(num_players, Arc::new(FixedWinner(0))).await
    }

    async fn new_with_winner(num_players: usize, winner: Arc<dyn WinnerSelector>) -> Self {
        let chain = MemoryChain::new();
        let namespace = Namespace::new("pangea");
        for short in ["dealers", "cashiers", "dealer1", "table1", "cashier"] {
            chain.register_identity(&namespace.qualify(short));
        }
        for i in 1..=9 {
            chain.register_identity(&namespace.qualify(&format!("p{i}")));
        }

        let chain_client: Arc<dyn crate::chain::ChainClient> = chain.clone();
        let store = Arc::new(IdentityStore::new(chain_client, namespace.clone()));
        registry::add_dealer(&store, "dealer1").await.unwrap();

        let dealer_cache = Arc::new(Cache::open_in_memory().await.unwrap());
        let dealer = Dealer::init(
            store.clone(),
            dealer_cache,
            dealer_config(num_players),
            winner,
            None,
        )
        .await
        .unwrap();

        let mut players = Vec::new();
        let mut player_caches = Vec::new();
        for i in 1..=num_players {
            let cache = Arc::new(Cache::open_in_memory().await.unwrap());
            let player = Player::new(
                store.clone(),
                cache.clone(),
                player_config(&format!("p{i}")),
                None,
            );
            players.push(player);
            player_caches.push(cache);
        }

        let cashier_cache = Arc::new(Cache::open_in_memory().await.unwrap());
        let cashier = Cashier::new(store.clone(), cashier_cache, cashier_config(), None);

        let table_fqn = namespace.qualify("table1");
        Self {
            chain,
            store,
            dealer,
            players,
            player_caches,
            cashier,
            table_fqn,
        }
    }

    async fn table_state(&self) -> GameState {
        self.store.game_state(&self.table_fqn, 0).await.unwrap()
    }

    /// All players join and are seated; decks run through Phases P, D, B.
    async fn join_and_shuffle(&mut self) {
        for player in &mut self.players {
            player.find_table().await.unwrap();
            player.join_table().await.unwrap();
        }
        self.dealer.tick().await.unwrap(); // seats everyone
        for player in &mut self.players {
            let slot = player.try_seat().await.unwrap();
            assert!(slot.is_some());
            player.prepare_deck().await.unwrap();
            player.record_game_history().await.unwrap();
        }
        self.dealer.tick().await.unwrap(); // observes player shuffles
        assert_eq!(self.table_state().await, GameState::DeckShufflingP);
        self.dealer.tick().await.unwrap(); // Phase D
        assert_eq!(self.table_state().await, GameState::DeckShufflingD);
        self.cashier.tick().await.unwrap(); // Phase B
        assert_eq!(self.table_state().await, GameState::DeckShufflingB);
    }

    /// One combined round of everyone's poll loops.
    async fn step(&mut self) {
        self.cashier.tick().await.unwrap();
        for player in &mut self.players {
            player.tick().await.unwrap();
        }
        self.dealer.tick().await.unwrap();
    }

    /// Step until the table reaches `target` or the iteration bound trips.
    async fn drive_to(&mut self, target: GameState) {
        for _ in 0..200 {
            if self.table_state().await == target {
                return;
            }
            self.step().await;
        }
        panic!(
            "table never reached {target}, stuck at {}",
            self.table_state().await
        );
    }

    async fn settlement(&self) -> Option<SettlementInfo> {
        let game_id = self.store.game_id(&self.table_fqn, 0).await.unwrap()?;
        self.store
            .read_latest(&self.table_fqn, keys::T_SETTLEMENT_INFO, Some(&game_id), 0)
            .await
            .unwrap()
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

// ---------------------------------------------------------------------------
// Scenario 1: happy path, two-player hand
// ---------------------------------------------------------------------------

#[tokio::test]
async fn happy_path_two_player_hand_settles() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;
    harness.drive_to(GameState::SettlementComplete).await;

    let settlement = harness.settlement().await.expect("settlement published");
    assert_eq!(settlement.status, SettlementStatus::Completed);

    // Blinds and the small-blind call: 0.01 + 0.02 + 0.01.
    let pot: Chips = settlement.settle_amounts.iter().sum();
    assert!((pot - 0.04).abs() < 1e-9, "pot was {pot}");
    // Winner fixed to seat 0: one payout, one empty marker.
    assert!((settlement.settle_amounts[0] - 0.04).abs() < 1e-9);
    assert!(settlement.settle_amounts[1].abs() < 1e-12);
    assert!(!settlement.payout_txs[0].is_empty());
    assert!(settlement.payout_txs[1].is_empty());

    // Every decoded card is a valid deck value, and both players agree on
    // the board.
    let boards: Vec<Vec<i32>> = {
        let mut boards = Vec::new();
        for cache in &harness.player_caches {
            let game_id = harness
                .store
                .game_id(&harness.table_fqn, 0)
                .await
                .unwrap()
                .unwrap();
            let local = cache
                .load_player_local_state(&game_id)
                .await
                .unwrap()
                .unwrap();
            assert!(local.decoded_cards.iter().all(|&c| c >= 0 && c < 14));
            boards.push(local.decoded_cards[2..].to_vec());
        }
        boards
    };
    assert_eq!(boards[0], boards[1]);

    // No dispute verdict exists for either player.
    for player in &harness.players {
        assert!(player.dispute_result().await.unwrap().is_none());
    }
}

// ---------------------------------------------------------------------------
// Scenario 2: betting timeout auto-fold
// ---------------------------------------------------------------------------

#[tokio::test]
async fn betting_timeout_auto_folds_and_awards_pot() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;

    // Deal hole cards and post the small blind; seat 1 then goes dark.
    harness.drive_to(GameState::RoundBetting).await;
    harness.cashier.tick().await.unwrap();
    harness.players[0].tick().await.unwrap(); // posts small blind
    harness.dealer.tick().await.unwrap(); // turn moves to seat 1

    // Neither clock alone is enough to trip the timeout.
    harness.dealer.clock.advance(TURN_TIMEOUT_SECS + 1);
    harness.dealer.tick().await.unwrap();
    let roster_state = harness.table_state().await;
    assert_eq!(roster_state, GameState::RoundBetting, "folded on time alone");

    harness.chain.advance_blocks(TURN_TIMEOUT_BLOCKS);
    harness.dealer.tick().await.unwrap(); // synthesizes the fold

    harness.drive_to(GameState::SettlementComplete).await;
    let settlement = harness.settlement().await.unwrap();
    // Seat 1 never posted; only the small blind is in the pot and seat 0
    // takes it.
    assert!((settlement.settle_amounts[0] - 0.01).abs() < 1e-9);
    assert!(settlement.settle_amounts[1].abs() < 1e-12);
}

// ---------------------------------------------------------------------------
// Scenario 3: dealer aborts, player recovers the stake by dispute
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dispute_refund_after_dealer_abort() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;
    // Dealer advances into Phase D territory and then stops for good.
    assert!(harness.table_state().await >= GameState::DeckShufflingD);

    // Too early: the game still looks active.
    harness.players[0].raise_dispute("game_aborted").await.unwrap();
    harness.cashier.poll_disputes().await.unwrap();
    let verdict = harness.players[0].dispute_result().await.unwrap().unwrap();
    assert_eq!(verdict.status, DisputeStatus::Rejected);
    assert_eq!(verdict.reason, "game_still_active");

    // After the dispute window the stake comes back in full.
    harness.chain.advance_blocks(DISPUTE_TIMEOUT_BLOCKS);
    harness.players[1].raise_dispute("game_aborted").await.unwrap();
    harness.cashier.poll_disputes().await.unwrap();

    let verdict = harness.players[1].dispute_result().await.unwrap().unwrap();
    assert_eq!(verdict.status, DisputeStatus::Refunded);
    assert_eq!(verdict.reason, "game_aborted_refund");
    assert!(!verdict.payout_tx.is_empty());

    let refund = harness
        .chain
        .get_raw_transaction(&verdict.payout_tx)
        .await
        .unwrap();
    assert!((refund.vout[0].value - 0.5).abs() < 1e-9);

    // The verdict is final: polling again resolves nothing new.
    assert_eq!(harness.cashier.poll_disputes().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Scenario 4: duplicate join is not seated twice
// ---------------------------------------------------------------------------

#[tokio::test]
async fn duplicate_join_request_keeps_one_seat() {
    let mut harness = Harness::new(2).await;

    harness.players[0].find_table().await.unwrap();
    let first_payin = harness.players[0].join_table().await.unwrap();
    harness.dealer.tick().await.unwrap();
    assert!(harness.players[0].try_seat().await.unwrap().is_some());

    // Second join request from the same identity with a fresh payin.
    let second_payin = harness.players[0].join_table().await.unwrap();
    assert_ne!(first_payin, second_payin);
    harness.dealer.tick().await.unwrap();

    let game_id = harness
        .store
        .game_id(&harness.table_fqn, 0)
        .await
        .unwrap()
        .unwrap();
    let roster: crate::game::types::PlayerRoster = harness
        .store
        .read_latest(&harness.table_fqn, keys::T_PLAYER_INFO, Some(&game_id), 0)
        .await
        .unwrap()
        .map(|v| serde_json::from_value(v).unwrap())
        .unwrap();
    assert_eq!(roster.num_players, 1);
    assert_eq!(roster.payin_amounts.len(), 1);
    assert_eq!(roster.player_info.len(), 1);
    // The seat is bound to the first payin.
    assert!(roster.player_info[0].contains(&first_payin));
}

// ---------------------------------------------------------------------------
// Scenario 5: rejoin mid-hand from the local cache
// ---------------------------------------------------------------------------

#[tokio::test]
async fn rejoin_mid_hand_restores_deck_without_republishing() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;

    let game_id = harness
        .store
        .game_id(&harness.table_fqn, 0)
        .await
        .unwrap()
        .unwrap();
    let p1_fqn = harness.players[0].player_fqn().to_string();

    // Restart player 1 with the same cache after Phase B.
    let cache = harness.player_caches[0].clone();
    let mut restarted = Player::new(harness.store.clone(), cache, player_config("p1"), None);
    restarted.find_table().await.unwrap();
    assert!(restarted.try_seat().await.unwrap().is_some());
    restarted.prepare_deck().await.unwrap();
    harness.players[0] = restarted;

    // The hand still completes, and the deck commitment was published
    // exactly once for this hand.
    harness.drive_to(GameState::SettlementComplete).await;
    let deck_entries = harness
        .store
        .read_entries(&p1_fqn, keys::PLAYER_DECK, Some(&game_id), 0)
        .await
        .unwrap();
    assert_eq!(deck_entries.len(), 1);
}

#[tokio::test]
async fn rejoin_without_cache_cannot_resume() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;

    let empty_cache = Arc::new(Cache::open_in_memory().await.unwrap());
    let mut restarted = Player::new(
        harness.store.clone(),
        empty_cache,
        player_config("p1"),
        None,
    );
    restarted.find_table().await.unwrap();
    assert!(restarted.try_seat().await.unwrap().is_some());

    // Advance past Phase B so a fresh deck would violate the commitments.
    harness.dealer.tick().await.unwrap();
    let err = restarted.prepare_deck().await.unwrap_err();
    assert!(matches!(err, PlayerError::GameAlreadyStarted));
}

// ---------------------------------------------------------------------------
// Scenario 6: community-card disagreement aborts the hand
// ---------------------------------------------------------------------------

#[tokio::test]
async fn community_card_disagreement_aborts_without_board_update() {
    let mut harness = Harness::new(2).await;
    harness.join_and_shuffle().await;
    harness.drive_to(GameState::RoundBetting).await;

    // Play out the blinds and the call so the flop gets dealt.
    for _ in 0..20 {
        if harness.table_state().await != GameState::RoundBetting {
            break;
        }
        harness.step().await;
    }
    assert_eq!(harness.table_state().await, GameState::RevealCard);

    // Player 1 decodes honestly; then its decoded-card claim is overwritten
    // with a lie before the dealer checks consensus.
    harness.cashier.tick().await.unwrap();
    for player in &mut harness.players {
        player.tick().await.unwrap();
    }
    let game_id = harness
        .store
        .game_id(&harness.table_fqn, 0)
        .await
        .unwrap()
        .unwrap();
    let p1_fqn = harness.players[0].player_fqn().to_string();
    let request: crate::game::types::RevealRequest = serde_json::from_value(
        harness
            .store
            .game_state_info(&harness.table_fqn, 0)
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    let lie = crate::game::types::DecodedCardReport {
        card_id: request.card_id,
        card_type: request.card_type,
        card_value: 99,
    };
    harness
        .store
        .append_json(
            &p1_fqn,
            keys::P_DECODED_CARD,
            Some(&game_id),
            &serde_json::to_value(lie).unwrap(),
        )
        .await
        .unwrap();

    let err = harness.dealer.tick().await.unwrap_err();
    assert!(matches!(err, DealerError::CardConsensus { .. }));

    // The board never advanced.
    let board = harness
        .store
        .read_latest(&harness.table_fqn, keys::T_BOARD_CARDS, Some(&game_id), 0)
        .await
        .unwrap();
    assert!(board.is_none());

    // Stakes are recoverable through the dispute path once the hand stalls.
    harness.chain.advance_blocks(DISPUTE_TIMEOUT_BLOCKS);
    harness.players[1].raise_dispute("game_aborted").await.unwrap();
    harness.cashier.poll_disputes().await.unwrap();
    let verdict = harness.players[1].dispute_result().await.unwrap().unwrap();
    assert_eq!(verdict.status, DisputeStatus::Refunded);
}
