//! Role configuration.
//!
//! Each role reads an ini file (`dealer_config.ini`, `player_config.ini`,
//! `cashier_config.ini`) with an `[rpc]` section shared by all roles.
//! Environment variables of the form `PANGEA_<SECTION>_<KEY>` override file
//! values, and a `.env` file is honored by the binary before parsing.

use ini::Ini;
use thiserror::Error;

use crate::chain::rpc::RpcConfig;
use crate::game::types::{
    Chips, DEFAULT_BIG_BLIND, DEFAULT_MAX_STAKE, DEFAULT_MIN_STAKE, DEFAULT_TX_FEE,
};

pub const DEFAULT_DEALER_WS_PORT: u16 = 9000;
pub const DEFAULT_PLAYER_WS_PORT: u16 = 9001;
pub const DEFAULT_CASHIER_WS_PORT: u16 = 9002;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        source: ini::Error,
    },

    #[error("missing required key [{section}] {key}")]
    Missing { section: String, key: String },

    #[error("invalid value for [{section}] {key}: {value}")]
    Invalid {
        section: String,
        key: String,
        value: String,
    },
}

fn lookup(ini: &Ini, section: &str, key: &str) -> Option<String> {
    let env_key = format!(
        "PANGEA_{}_{}",
        section.to_uppercase(),
        key.to_uppercase()
    );
    if let Ok(value) = std::env::var(env_key) {
        return Some(value);
    }
    ini.get_from(Some(section), key).map(str::to_string)
}

fn required(ini: &Ini, section: &str, key: &str) -> Result<String, ConfigError> {
    lookup(ini, section, key).ok_or_else(|| ConfigError::Missing {
        section: section.to_string(),
        key: key.to_string(),
    })
}

fn parse<T: std::str::FromStr>(
    section: &str,
    key: &str,
    value: String,
) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        section: section.to_string(),
        key: key.to_string(),
        value,
    })
}

fn optional_parsed<T: std::str::FromStr>(
    ini: &Ini,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(ini, section, key) {
        Some(value) => parse(section, key, value),
        None => Ok(default),
    }
}

/// Settings shared by every role: chain RPC endpoint, key namespace org and
/// local cache location.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    pub rpc: RpcConfig,
    pub org: String,
    pub cache_path: String,
}

impl NodeConfig {
    /// Load just the shared node settings; used by the tooling subcommands.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let ini = load_ini(path)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut rpc = RpcConfig::default();
        if let Some(url) = lookup(ini, "rpc", "url") {
            rpc.url = url;
        }
        if let Some(user) = lookup(ini, "rpc", "user") {
            rpc.user = user;
        }
        if let Some(password) = lookup(ini, "rpc", "password") {
            rpc.password = password;
        }
        rpc.tx_fee = optional_parsed(ini, "rpc", "tx_fee", DEFAULT_TX_FEE)?;

        Ok(Self {
            rpc,
            org: lookup(ini, "node", "org").unwrap_or_else(|| "pangea".to_string()),
            cache_path: lookup(ini, "node", "cache_path")
                .unwrap_or_else(|| "pangea_poker.db".to_string()),
        })
    }
}

#[derive(Clone, Debug)]
pub struct DealerConfig {
    pub node: NodeConfig,
    pub max_players: usize,
    pub big_blind: Chips,
    pub min_stake: Chips,
    pub max_stake: Chips,
    pub dealer_id: String,
    pub cashier_id: String,
    pub table_id: String,
    pub gui_ws_port: u16,
    /// Dealer commission, percent of the pot withheld at settlement.
    pub commission_pct: f64,
    /// Candidate player identities polled for join requests.
    pub player_candidates: Vec<String>,
}

impl DealerConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let ini = load_ini(path)?;
        Ok(Self {
            node: NodeConfig::from_ini(&ini)?,
            max_players: optional_parsed(&ini, "dealer", "max_players", 2)?,
            big_blind: optional_parsed(&ini, "dealer", "big_blind", DEFAULT_BIG_BLIND)?,
            min_stake: optional_parsed(&ini, "dealer", "min_stake", DEFAULT_MIN_STAKE)?,
            max_stake: optional_parsed(&ini, "dealer", "max_stake", DEFAULT_MAX_STAKE)?,
            dealer_id: required(&ini, "dealer", "dealer_id")?,
            cashier_id: required(&ini, "dealer", "cashier_id")?,
            table_id: required(&ini, "dealer", "table_id")?,
            gui_ws_port: optional_parsed(&ini, "dealer", "gui_ws_port", DEFAULT_DEALER_WS_PORT)?,
            commission_pct: optional_parsed(&ini, "dealer", "commission_pct", 0.0)?,
            player_candidates: candidate_list(&ini),
        })
    }
}

#[derive(Clone, Debug)]
pub struct PlayerConfig {
    pub node: NodeConfig,
    pub dealer_id: String,
    pub table_id: String,
    pub wallet_addr: String,
    /// The verus identity this player publishes under.
    pub player_id: String,
    pub ws_port: u16,
    pub max_allowed_dcv_commission: f64,
    /// Auto-play betting decisions instead of waiting for the GUI.
    pub auto_betting: bool,
}

impl PlayerConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let ini = load_ini(path)?;
        Ok(Self {
            node: NodeConfig::from_ini(&ini)?,
            dealer_id: required(&ini, "player", "dealer_id")?,
            table_id: required(&ini, "player", "table_id")?,
            wallet_addr: lookup(&ini, "player", "wallet_addr").unwrap_or_default(),
            player_id: required(&ini, "player", "player_id")?,
            ws_port: optional_parsed(&ini, "player", "ws_port", DEFAULT_PLAYER_WS_PORT)?,
            max_allowed_dcv_commission: optional_parsed(
                &ini,
                "player",
                "max_allowed_dcv_commission",
                5.0,
            )?,
            auto_betting: optional_parsed(&ini, "player", "auto_betting", true)?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct CashierPeer {
    pub ip: String,
    pub pubkey: String,
}

#[derive(Clone, Debug)]
pub struct CashierConfig {
    pub node: NodeConfig,
    pub cashier_id: String,
    pub table_id: String,
    pub gui_ws_port: u16,
    pub peers: Vec<CashierPeer>,
    /// Candidate player identities scanned for dispute requests.
    pub player_candidates: Vec<String>,
}

impl CashierConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let ini = load_ini(path)?;
        let peers = ini
            .section(Some("peers"))
            .map(|section| {
                section
                    .iter()
                    .map(|(ip, pubkey)| CashierPeer {
                        ip: ip.to_string(),
                        pubkey: pubkey.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            node: NodeConfig::from_ini(&ini)?,
            cashier_id: required(&ini, "cashier", "cashier_id")?,
            table_id: required(&ini, "cashier", "table_id")?,
            gui_ws_port: optional_parsed(&ini, "cashier", "gui_ws_port", DEFAULT_CASHIER_WS_PORT)?,
            peers,
            player_candidates: candidate_list(&ini),
        })
    }
}

fn load_ini(path: &str) -> Result<Ini, ConfigError> {
    if std::path::Path::new(path).exists() {
        Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })
    } else {
        // Every key can come from the environment; an absent file is not
        // fatal as long as the required keys resolve.
        Ok(Ini::new())
    }
}

/// Candidate player registry; the production registry mechanism is an open
/// question upstream, the default mirrors the historical `p1..p9` list.
fn candidate_list(ini: &Ini) -> Vec<String> {
    lookup(ini, "players", "candidates")
        .map(|csv| {
            csv.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_else(|| (1..=9).map(|i| format!("p{i}")).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn dealer_config_parses_with_defaults() {
        let file = write_config(
            "[dealer]\n\
             dealer_id = dealer1\n\
             cashier_id = cashier\n\
             table_id = table1\n\
             big_blind = 0.02\n\
             [rpc]\n\
             url = http://127.0.0.1:12776\n",
        );
        let config = DealerConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.dealer_id, "dealer1");
        assert_eq!(config.max_players, 2);
        assert!((config.big_blind - 0.02).abs() < 1e-9);
        assert_eq!(config.gui_ws_port, DEFAULT_DEALER_WS_PORT);
        assert_eq!(config.player_candidates.len(), 9);
        assert_eq!(config.player_candidates[0], "p1");
    }

    #[test]
    fn missing_required_key_is_reported() {
        let file = write_config("[player]\ntable_id = table1\n");
        let err = PlayerConfig::load(file.path().to_str().unwrap()).unwrap_err();
        match err {
            ConfigError::Missing { section, key } => {
                assert_eq!(section, "player");
                assert_eq!(key, "dealer_id");
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn candidate_override_is_honored() {
        let file = write_config(
            "[cashier]\n\
             cashier_id = cashier\n\
             table_id = table1\n\
             [players]\n\
             candidates = alice, bob\n",
        );
        let config = CashierConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.player_candidates, vec!["alice", "bob"]);
    }
}
