use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use pangea_poker::cashier::Cashier;
use pangea_poker::chain::rpc::RpcClient;
use pangea_poker::chain::ChainClient;
use pangea_poker::config::{
    CashierConfig, DealerConfig, NodeConfig, PlayerConfig,
};
use pangea_poker::dealer::{registry, Dealer};
use pangea_poker::game::settle::FoldWinner;
use pangea_poker::game::types::DEFAULT_TX_FEE;
use pangea_poker::gui;
use pangea_poker::gui::{GuiCommand, GuiPush};
use pangea_poker::player::Player;
use pangea_poker::storage::Cache;
use pangea_poker::vdxf::{IdentityStore, Namespace};

const LOG_TARGET: &str = "bin::pangea_poker";

#[derive(Debug, Parser)]
#[command(name = "pangea-poker")]
#[command(about = "Decentralized mental-poker node: dealer, player or cashier", long_about = None)]
struct Cli {
    /// Configuration file; role subcommands may override with their own.
    #[arg(long, env = "PANGEA_CONFIG", default_value = "pangea_config.ini")]
    config: String,

    /// Toggle structured (JSON) logs.
    #[arg(long, env = "PANGEA_LOG_JSON", default_value_t = false)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Host a table and drive the hand state machine.
    Dealer {
        #[arg(long, default_value = "dealer_config.ini")]
        config: String,
    },
    /// Join a table and play a hand.
    Player {
        #[arg(long, default_value = "player_config.ini")]
        config: String,
    },
    /// Custody funds: blind the deck, reveal cards, settle and resolve disputes.
    Cashier {
        #[arg(long, default_value = "cashier_config.ini")]
        config: String,
        /// Advertise this IP in the cashier registry.
        #[arg(long)]
        ip: Option<String>,
    },
    /// Register a dealer identity in the dealers registry.
    AddDealer { dealer_id: String },
    /// List registered dealers.
    ListDealers,
    /// List tables advertised by registered dealers.
    ListTables,
    /// Withdraw funds to an address (`all` for the whole balance).
    Withdraw { amount: String, address: String },
    /// List spendable outputs.
    Spendable,
    /// Show locally recorded hands.
    Scan,
    /// Decode the data payload of a transaction.
    ExtractTxData { txid: String },
    /// Print the entries under a logical key of an identity.
    Print { id: String, key: String },
    /// Clear the content multimap of an identity.
    ResetId { id: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Unknown commands and bad usage print help and exit cleanly.
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };
    init_tracing(cli.json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(target: LOG_TARGET, error = %format!("{e:#}"), "fatal");
            ExitCode::FAILURE
        }
    }
}

fn load_dotenv() {
    let manifest_env = env!("CARGO_MANIFEST_DIR");
    let manifest_env_path = PathBuf::from(manifest_env).join(".env");
    dotenv::from_filename(manifest_env_path).ok();
    dotenv::dotenv().ok();
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }
}

fn open_store(node: &NodeConfig) -> Arc<IdentityStore> {
    let chain: Arc<dyn ChainClient> = Arc::new(RpcClient::new(node.rpc.clone()));
    Arc::new(IdentityStore::new(chain, Namespace::new(&node.org)))
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Dealer { config } => {
            let config = DealerConfig::load(&config)?;
            let store = open_store(&config.node);
            let cache = Arc::new(Cache::open(&config.node.cache_path).await?);
            let (gui, _commands, _server) = gui::start(config.gui_ws_port).await?;
            gui.push(GuiPush::BackendStatus { ready: true });

            let mut dealer = Dealer::init(
                store,
                cache,
                config,
                Arc::new(FoldWinner),
                Some(gui),
            )
            .await?;
            dealer.run().await?;
            Ok(())
        }

        Command::Player { config } => {
            let config = PlayerConfig::load(&config)?;
            let store = open_store(&config.node);
            let cache = Arc::new(Cache::open(&config.node.cache_path).await?);
            let (gui, commands, _server) = gui::start(config.ws_port).await?;
            gui.push(GuiPush::BackendStatus { ready: true });

            let mut player = Player::new(store, cache, config, Some(gui));
            player.find_table().await?;
            if player.try_seat().await?.is_none() {
                player.join_table().await?;
                player.await_seat().await?;
            }
            player.prepare_deck().await?;
            player.record_game_history().await?;
            run_player(player, commands).await
        }

        Command::Cashier { config, ip } => {
            let config = CashierConfig::load(&config)?;
            let store = open_store(&config.node);
            let cache = Arc::new(Cache::open(&config.node.cache_path).await?);
            let (gui, _commands, _server) = gui::start(config.gui_ws_port).await?;
            gui.push(GuiPush::BackendStatus { ready: true });

            let mut cashier = Cashier::new(store, cache, config, Some(gui));
            if let Some(ip) = ip {
                cashier.register_ip(&ip).await?;
            }
            cashier.run().await?;
            Ok(())
        }

        Command::AddDealer { dealer_id } => {
            let node = NodeConfig::load(&cli.config)?;
            let store = open_store(&node);
            registry::add_dealer(&store, &dealer_id).await?;
            println!("dealer {dealer_id} registered");
            Ok(())
        }

        Command::ListDealers => {
            let node = NodeConfig::load(&cli.config)?;
            let store = open_store(&node);
            let dealers = registry::list_dealers(&store).await?;
            println!("{}", serde_json::to_string_pretty(&dealers)?);
            Ok(())
        }

        Command::ListTables => {
            let node = NodeConfig::load(&cli.config)?;
            let store = open_store(&node);
            let tables = registry::list_tables(&store).await?;
            println!("{}", serde_json::to_string_pretty(&tables)?);
            Ok(())
        }

        Command::Withdraw { amount, address } => {
            let node = NodeConfig::load(&cli.config)?;
            let rpc = RpcClient::new(node.rpc.clone());
            let amount = if amount == "all" {
                rpc.get_balance().await? - DEFAULT_TX_FEE
            } else {
                amount.parse().context("invalid withdraw amount")?
            };
            let opid = rpc.send_currency("*", &address, amount, None).await?;
            println!("withdraw submitted: {opid}");
            Ok(())
        }

        Command::Spendable => {
            let node = NodeConfig::load(&cli.config)?;
            let rpc = RpcClient::new(node.rpc.clone());
            let unspent = rpc.list_unspent().await?;
            println!("{}", serde_json::to_string_pretty(&unspent)?);
            Ok(())
        }

        Command::Scan => {
            let node = NodeConfig::load(&cli.config)?;
            let cache = Cache::open(&node.cache_path).await?;
            for game in cache.list_games().await? {
                println!(
                    "{}  table={}  payin={}  status={}",
                    game.game_id, game.table_id, game.payin_tx, game.status
                );
            }
            Ok(())
        }

        Command::ExtractTxData { txid } => {
            let node = NodeConfig::load(&cli.config)?;
            let rpc = RpcClient::new(node.rpc.clone());
            let tx = rpc.get_raw_transaction(&txid).await?;
            println!("{}", serde_json::to_string_pretty(&tx)?);
            Ok(())
        }

        Command::Print { id, key } => {
            let node = NodeConfig::load(&cli.config)?;
            let store = open_store(&node);
            let identity = store.namespace().qualify(&id);
            let entries = store.read_entries(&identity, &key, None, 0).await?;
            for entry in entries {
                println!("{}", serde_json::to_string_pretty(&entry)?);
            }
            Ok(())
        }

        Command::ResetId { id } => {
            let node = NodeConfig::load(&cli.config)?;
            let store = open_store(&node);
            let identity = store.namespace().qualify(&id);
            let chain = store.chain();
            if !chain.can_sign_for(&identity).await? {
                anyhow::bail!("no signing authority over {identity}");
            }
            let parent = store.namespace().parent_id.clone();
            let txid = chain
                .update_identity(&identity, &parent, &Default::default())
                .await?;
            println!("identity {identity} reset in {txid}");
            Ok(())
        }
    }
}

/// Player loop plus interactive GUI commands.
async fn run_player(
    mut player: Player,
    mut commands: tokio::sync::mpsc::UnboundedReceiver<GuiCommand>,
) -> Result<()> {
    loop {
        let state = player.tick().await?;
        if state == pangea_poker::GameState::SettlementComplete {
            tracing::info!(target: LOG_TARGET, "hand settled");
            return Ok(());
        }
        // Drain pending GUI commands between polls.
        while let Ok(command) = commands.try_recv() {
            match command {
                GuiCommand::Betting { action, amount } => {
                    player.submit_gui_action(action, amount).await?;
                }
                GuiCommand::Withdraw { .. }
                | GuiCommand::PlayerJoin
                | GuiCommand::JoinTable { .. }
                | GuiCommand::TableInfo => {}
            }
        }
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}
