//! Chain access layer.
//!
//! Every role talks to the chain through the [`ChainClient`] trait; the
//! production implementation is the JSON-RPC [`rpc::RpcClient`]. Protocol
//! code never issues raw RPC calls directly, which keeps the dealer, player
//! and cashier loops runnable against an in-memory chain in tests.

pub mod rpc;

mod types;

pub use types::{ContentMultimap, OperationStatus, RawTransaction, TxOut, UtxoStatus};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed rpc response: {0}")]
    InvalidResponse(String),

    #[error("transaction {0} not found")]
    TxNotFound(String),

    #[error("identity {0} not found")]
    IdentityNotFound(String),

    #[error("operation {opid} failed: {reason}")]
    OperationFailed { opid: String, reason: String },
}

/// The chain surface the protocol depends on.
///
/// Amounts are CHIPS with 8 decimals, heights are block counts. Identity
/// names are fully qualified (`name.parent@`) unless noted otherwise.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_block_count(&self) -> Result<u64, ChainError>;

    /// Combined content-multimap view of an identity between `height_start`
    /// and the tip (including mempool). Entries under a key are ordered by
    /// publication.
    async fn get_identity_content(
        &self,
        identity: &str,
        height_start: u64,
    ) -> Result<ContentMultimap, ChainError>;

    /// Append entries to an identity's content multimap. Merge semantics are
    /// additive per key. Returns the update txid.
    async fn update_identity(
        &self,
        identity: &str,
        parent: &str,
        cmm: &ContentMultimap,
    ) -> Result<String, ChainError>;

    /// Resolve a hierarchical key name to its vdxf id.
    async fn get_vdxf_id(&self, key_name: &str) -> Result<String, ChainError>;

    /// Send CHIPS to an identity address, optionally carrying a data blob.
    /// Returns the operation id; completion is observed via
    /// [`ChainClient::get_operation_status`].
    async fn send_currency(
        &self,
        source: &str,
        to: &str,
        amount: f64,
        data: Option<serde_json::Value>,
    ) -> Result<String, ChainError>;

    async fn get_operation_status(&self, opid: &str) -> Result<OperationStatus, ChainError>;

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ChainError>;

    /// Txids paying an address at or after `height_start`.
    async fn get_address_txids(
        &self,
        address: &str,
        height_start: u64,
    ) -> Result<Vec<String>, ChainError>;

    /// `Some` while the outpoint is unspent, `None` once spent.
    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<UtxoStatus>, ChainError>;

    async fn get_balance(&self) -> Result<f64, ChainError>;

    async fn get_identity_address(&self, identity: &str) -> Result<String, ChainError>;

    async fn identity_exists(&self, identity: &str) -> Result<bool, ChainError>;

    /// Whether this node holds signing authority over the identity.
    async fn can_sign_for(&self, identity: &str) -> Result<bool, ChainError>;
}
