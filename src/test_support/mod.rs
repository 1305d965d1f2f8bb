//! In-memory chain used by unit and scenario tests.
//!
//! Implements [`ChainClient`] over plain maps: identity content multimaps
//! with per-entry heights, a UTXO set, address transaction indexes and
//! instantly-successful wallet operations. Every write mines a block, so
//! height-filtered reads behave like they do against a real daemon.

#[cfg(test)]
mod scenarios;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::chain::{
    ChainClient, ChainError, ContentMultimap, OperationStatus, RawTransaction, TxOut, UtxoStatus,
};

#[derive(Default)]
struct ChainInner {
    height: u64,
    /// identity -> ordered (vdxf id, hex entry, height)
    entries: HashMap<String, Vec<(String, String, u64)>>,
    identities: HashMap<String, String>,
    transactions: HashMap<String, RawTransaction>,
    address_txids: HashMap<String, Vec<(u64, String)>>,
    utxos: HashMap<(String, u32), f64>,
    operations: HashMap<String, OperationStatus>,
    balance: f64,
    tx_counter: u64,
    op_counter: u64,
}

#[derive(Default)]
pub struct MemoryChain {
    inner: Mutex<ChainInner>,
}

impl MemoryChain {
    pub fn new() -> Arc<Self> {
        let chain = Arc::new(Self::default());
        {
            let mut inner = chain.inner.lock();
            inner.height = 100;
            inner.balance = 10.0;
        }
        chain
    }

    /// Register an identity; its payment address is derived from the name.
    pub fn register_identity(&self, name: &str) {
        let mut inner = self.inner.lock();
        let address = format!("addr-{name}");
        inner.identities.insert(name.to_string(), address);
    }

    pub fn set_balance(&self, balance: f64) {
        self.inner.lock().balance = balance;
    }

    pub fn height(&self) -> u64 {
        self.inner.lock().height
    }

    pub fn advance_blocks(&self, blocks: u64) {
        self.inner.lock().height += blocks;
    }

    /// Mark an outpoint spent; the dispute path's UTXO test then fails.
    pub fn spend_utxo(&self, txid: &str, vout: u32) {
        self.inner
            .lock()
            .utxos
            .remove(&(txid.to_string(), vout));
    }

    /// Deterministic vdxf id used in place of the daemon's hash.
    pub fn vdxf_id_for(key_name: &str) -> String {
        let digest = Sha256::digest(key_name.as_bytes());
        format!("i{}", hex::encode(&digest[..16]))
    }
}

#[async_trait]
impl ChainClient for MemoryChain {
    async fn get_block_count(&self) -> Result<u64, ChainError> {
        Ok(self.inner.lock().height)
    }

    async fn get_identity_content(
        &self,
        identity: &str,
        height_start: u64,
    ) -> Result<ContentMultimap, ChainError> {
        let inner = self.inner.lock();
        let mut cmm = ContentMultimap::new();
        if let Some(entries) = inner.entries.get(identity) {
            for (vdxf_id, payload, height) in entries {
                if *height >= height_start {
                    cmm.entry(vdxf_id.clone()).or_default().push(payload.clone());
                }
            }
        }
        Ok(cmm)
    }

    async fn update_identity(
        &self,
        identity: &str,
        _parent: &str,
        cmm: &ContentMultimap,
    ) -> Result<String, ChainError> {
        let mut inner = self.inner.lock();
        if !inner.identities.contains_key(identity) {
            return Err(ChainError::IdentityNotFound(identity.to_string()));
        }
        inner.height += 1;
        let height = inner.height;
        for (vdxf_id, payloads) in cmm {
            for payload in payloads {
                inner
                    .entries
                    .entry(identity.to_string())
                    .or_default()
                    .push((vdxf_id.clone(), payload.clone(), height));
            }
        }
        inner.tx_counter += 1;
        let txid = format!("idtx{:04}", inner.tx_counter);
        inner.transactions.insert(
            txid.clone(),
            RawTransaction {
                txid: txid.clone(),
                height: Some(height),
                vout: Vec::new(),
            },
        );
        Ok(txid)
    }

    async fn get_vdxf_id(&self, key_name: &str) -> Result<String, ChainError> {
        Ok(Self::vdxf_id_for(key_name))
    }

    async fn send_currency(
        &self,
        _source: &str,
        to: &str,
        amount: f64,
        _data: Option<serde_json::Value>,
    ) -> Result<String, ChainError> {
        let mut inner = self.inner.lock();
        let address = inner
            .identities
            .get(to)
            .cloned()
            .ok_or_else(|| ChainError::IdentityNotFound(to.to_string()))?;

        inner.height += 1;
        let height = inner.height;
        inner.tx_counter += 1;
        inner.op_counter += 1;
        let txid = format!("paytx{:04}", inner.tx_counter);
        let opid = format!("opid-{:04}", inner.op_counter);

        inner.transactions.insert(
            txid.clone(),
            RawTransaction {
                txid: txid.clone(),
                height: Some(height),
                vout: vec![TxOut {
                    n: 0,
                    value: amount,
                    addresses: vec![address.clone()],
                }],
            },
        );
        inner
            .address_txids
            .entry(address)
            .or_default()
            .push((height, txid.clone()));
        inner.utxos.insert((txid.clone(), 0), amount);
        inner.balance -= amount;
        inner
            .operations
            .insert(opid.clone(), OperationStatus::Success { txid });
        Ok(opid)
    }

    async fn get_operation_status(&self, opid: &str) -> Result<OperationStatus, ChainError> {
        self.inner
            .lock()
            .operations
            .get(opid)
            .cloned()
            .ok_or_else(|| ChainError::OperationFailed {
                opid: opid.to_string(),
                reason: "unknown operation".into(),
            })
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ChainError> {
        self.inner
            .lock()
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| ChainError::TxNotFound(txid.to_string()))
    }

    async fn get_address_txids(
        &self,
        address: &str,
        height_start: u64,
    ) -> Result<Vec<String>, ChainError> {
        let inner = self.inner.lock();
        Ok(inner
            .address_txids
            .get(address)
            .map(|txids| {
                txids
                    .iter()
                    .filter(|(height, _)| *height >= height_start)
                    .map(|(_, txid)| txid.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<UtxoStatus>, ChainError> {
        Ok(self
            .inner
            .lock()
            .utxos
            .get(&(txid.to_string(), vout))
            .map(|&value| UtxoStatus { value }))
    }

    async fn get_balance(&self) -> Result<f64, ChainError> {
        Ok(self.inner.lock().balance)
    }

    async fn get_identity_address(&self, identity: &str) -> Result<String, ChainError> {
        self.inner
            .lock()
            .identities
            .get(identity)
            .cloned()
            .ok_or_else(|| ChainError::IdentityNotFound(identity.to_string()))
    }

    async fn identity_exists(&self, identity: &str) -> Result<bool, ChainError> {
        Ok(self.inner.lock().identities.contains_key(identity))
    }

    async fn can_sign_for(&self, identity: &str) -> Result<bool, ChainError> {
        Ok(self.inner.lock().identities.contains_key(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn height_filter_hides_old_entries() {
        let chain = MemoryChain::new();
        chain.register_identity("table1");

        let mut cmm = ContentMultimap::new();
        cmm.insert("key1".into(), vec!["aa".into()]);
        chain.update_identity("table1", "parent", &cmm).await.unwrap();
        let cutoff = chain.height() + 1;

        let mut cmm2 = ContentMultimap::new();
        cmm2.insert("key1".into(), vec!["bb".into()]);
        chain.update_identity("table1", "parent", &cmm2).await.unwrap();

        let all = chain.get_identity_content("table1", 0).await.unwrap();
        assert_eq!(all["key1"], vec!["aa", "bb"]);

        let recent = chain.get_identity_content("table1", cutoff).await.unwrap();
        assert_eq!(recent["key1"], vec!["bb"]);
    }

    #[tokio::test]
    async fn payments_index_by_address_and_spend() {
        let chain = MemoryChain::new();
        chain.register_identity("cashier");
        let start = chain.height();

        let opid = chain
            .send_currency("*", "cashier", 0.5, None)
            .await
            .unwrap();
        let OperationStatus::Success { txid } =
            chain.get_operation_status(&opid).await.unwrap()
        else {
            panic!("expected success");
        };

        let address = chain.get_identity_address("cashier").await.unwrap();
        let txids = chain.get_address_txids(&address, start).await.unwrap();
        assert_eq!(txids, vec![txid.clone()]);

        assert!(chain.get_tx_out(&txid, 0).await.unwrap().is_some());
        chain.spend_utxo(&txid, 0);
        assert!(chain.get_tx_out(&txid, 0).await.unwrap().is_none());
    }
}
