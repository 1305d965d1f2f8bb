use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A content multimap: vdxf id -> ordered hex-encoded byte-vector entries.
/// Appends never rewrite prior entries; readers take the last entry per key.
pub type ContentMultimap = BTreeMap<String, Vec<String>>;

/// Status of an async wallet operation (`sendcurrency` and friends).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    Executing,
    Success { txid: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TxOut {
    pub n: u32,
    pub value: f64,
    #[serde(default)]
    pub addresses: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawTransaction {
    pub txid: String,
    /// Confirmation height; `None` while in mempool.
    pub height: Option<u64>,
    pub vout: Vec<TxOut>,
}

impl RawTransaction {
    /// Total amount this transaction pays to `address`.
    pub fn amount_to(&self, address: &str) -> f64 {
        self.vout
            .iter()
            .filter(|o| o.addresses.iter().any(|a| a == address))
            .map(|o| o.value)
            .sum()
    }

    /// Outpoint indexes paying `address`.
    pub fn vouts_to(&self, address: &str) -> Vec<u32> {
        self.vout
            .iter()
            .filter(|o| o.addresses.iter().any(|a| a == address))
            .map(|o| o.n)
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UtxoStatus {
    pub value: f64,
}
