//! JSON-RPC client for the CHIPS/Verus daemon.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use super::{
    ChainClient, ChainError, ContentMultimap, OperationStatus, RawTransaction, UtxoStatus,
};

const LOG_TARGET: &str = "chain::rpc";

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    /// Currency name used for `sendcurrency` outputs.
    pub currency: String,
    pub tx_fee: f64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:12776".to_string(),
            user: String::new(),
            password: String::new(),
            currency: "CHIPS".to_string(),
            tx_fee: 0.0001,
        }
    }
}

pub struct RpcClient {
    http: reqwest::Client,
    config: RpcConfig,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn call(&self, method: &str, params: JsonValue) -> Result<JsonValue, ChainError> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "pangea-poker",
            "method": method,
            "params": params,
        });

        tracing::trace!(target: LOG_TARGET, %method, "rpc call");

        let mut request = self.http.post(&self.config.url).json(&body);
        if !self.config.user.is_empty() {
            request = request.basic_auth(&self.config.user, Some(&self.config.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let payload: JsonValue = response
            .json()
            .await
            .map_err(|e| ChainError::InvalidResponse(e.to_string()))?;

        if let Some(err) = payload.get("error").filter(|e| !e.is_null()) {
            let code = err.get("code").and_then(JsonValue::as_i64).unwrap_or(-1);
            let message = err
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("unknown rpc error")
                .to_string();
            return Err(ChainError::Rpc { code, message });
        }

        payload
            .get("result")
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("missing result field".into()))
    }

    // Raw transaction tooling used by the CLI subcommands; not part of the
    // ChainClient surface the game loops depend on.

    pub async fn get_block_hash(&self, height: u64) -> Result<String, ChainError> {
        let result = self.call("getblockhash", json!([height])).await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("getblockhash returned non-string".into()))
    }

    pub async fn get_block(&self, hash: &str) -> Result<JsonValue, ChainError> {
        self.call("getblock", json!([hash])).await
    }

    pub async fn list_unspent(&self) -> Result<Vec<JsonValue>, ChainError> {
        let result = self.call("listunspent", json!([])).await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("listunspent returned non-array".into()))
    }

    pub async fn get_address_utxos(&self, address: &str) -> Result<Vec<JsonValue>, ChainError> {
        let result = self
            .call("getaddressutxos", json!([{ "addresses": [address] }]))
            .await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| ChainError::InvalidResponse("getaddressutxos returned non-array".into()))
    }

    pub async fn create_raw_transaction(
        &self,
        inputs: JsonValue,
        outputs: JsonValue,
    ) -> Result<String, ChainError> {
        let result = self
            .call("createrawtransaction", json!([inputs, outputs]))
            .await?;
        result.as_str().map(str::to_string).ok_or_else(|| {
            ChainError::InvalidResponse("createrawtransaction returned non-string".into())
        })
    }

    pub async fn sign_raw_transaction(&self, hex: &str) -> Result<String, ChainError> {
        let result = self.call("signrawtransaction", json!([hex])).await?;
        result
            .get("hex")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("signrawtransaction missing hex".into()))
    }

    pub async fn send_raw_transaction(&self, hex: &str) -> Result<String, ChainError> {
        let result = self.call("sendrawtransaction", json!([hex])).await?;
        result.as_str().map(str::to_string).ok_or_else(|| {
            ChainError::InvalidResponse("sendrawtransaction returned non-string".into())
        })
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn get_block_count(&self) -> Result<u64, ChainError> {
        let result = self.call("getblockcount", json!([])).await?;
        result
            .as_u64()
            .ok_or_else(|| ChainError::InvalidResponse("getblockcount returned non-number".into()))
    }

    async fn get_identity_content(
        &self,
        identity: &str,
        height_start: u64,
    ) -> Result<ContentMultimap, ChainError> {
        let result = self
            .call(
                "getidentitycontent",
                json!([identity, height_start, -1]),
            )
            .await?;

        let cmm = result
            .get("contentmultimap")
            .or_else(|| {
                result
                    .get("identity")
                    .and_then(|id| id.get("contentmultimap"))
            })
            .cloned()
            .unwrap_or_else(|| json!({}));

        let mut out = ContentMultimap::new();
        if let Some(map) = cmm.as_object() {
            for (key, entries) in map {
                let list = match entries {
                    JsonValue::Array(values) => values
                        .iter()
                        .filter_map(|v| v.as_str().map(str::to_string))
                        .collect(),
                    JsonValue::String(single) => vec![single.clone()],
                    _ => Vec::new(),
                };
                out.insert(key.clone(), list);
            }
        }
        Ok(out)
    }

    async fn update_identity(
        &self,
        identity: &str,
        parent: &str,
        cmm: &ContentMultimap,
    ) -> Result<String, ChainError> {
        let result = self
            .call(
                "updateidentity",
                json!([{
                    "name": identity,
                    "parent": parent,
                    "contentmultimap": cmm,
                }]),
            )
            .await?;

        // The daemon returns the txid either directly or under "tx".
        if let Some(txid) = result.as_str() {
            return Ok(txid.to_string());
        }
        result
            .get("tx")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("updateidentity missing txid".into()))
    }

    async fn get_vdxf_id(&self, key_name: &str) -> Result<String, ChainError> {
        let result = self.call("getvdxfid", json!([key_name])).await?;
        result
            .get("vdxfid")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("getvdxfid missing vdxfid".into()))
    }

    async fn send_currency(
        &self,
        source: &str,
        to: &str,
        amount: f64,
        data: Option<serde_json::Value>,
    ) -> Result<String, ChainError> {
        let mut output = json!({
            "currency": self.config.currency,
            "amount": amount,
            "address": to,
        });
        if let Some(blob) = data {
            let hex_blob = hex::encode(blob.to_string().as_bytes());
            output["data"] = json!({ "hex": hex_blob });
        }

        let result = self
            .call(
                "sendcurrency",
                json!([source, [output], 1, self.config.tx_fee]),
            )
            .await?;

        if let Some(opid) = result.as_str() {
            return Ok(opid.to_string());
        }
        result
            .get("opid")
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::InvalidResponse("sendcurrency missing opid".into()))
    }

    async fn get_operation_status(&self, opid: &str) -> Result<OperationStatus, ChainError> {
        let result = self.call("z_getoperationstatus", json!([[opid]])).await?;
        let entry = result
            .get(0)
            .ok_or_else(|| ChainError::InvalidResponse("empty operation status".into()))?;

        match entry.get("status").and_then(JsonValue::as_str) {
            Some("executing") | Some("queued") => Ok(OperationStatus::Executing),
            Some("success") => {
                let txid = entry
                    .get("result")
                    .and_then(|r| r.get("txid"))
                    .and_then(JsonValue::as_str)
                    .ok_or_else(|| {
                        ChainError::InvalidResponse("operation success missing txid".into())
                    })?;
                Ok(OperationStatus::Success {
                    txid: txid.to_string(),
                })
            }
            other => Ok(OperationStatus::Failed {
                reason: entry
                    .get("error")
                    .and_then(|e| e.get("message"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or(other.unwrap_or("unknown"))
                    .to_string(),
            }),
        }
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<RawTransaction, ChainError> {
        let result = match self.call("getrawtransaction", json!([txid, 1])).await {
            Ok(v) => v,
            Err(ChainError::Rpc { code: -5, .. }) => {
                return Err(ChainError::TxNotFound(txid.to_string()))
            }
            Err(e) => return Err(e),
        };

        let height = result.get("height").and_then(JsonValue::as_u64);
        let mut vouts = Vec::new();
        if let Some(outputs) = result.get("vout").and_then(JsonValue::as_array) {
            for output in outputs {
                let n = output.get("n").and_then(JsonValue::as_u64).unwrap_or(0) as u32;
                let value = output.get("value").and_then(JsonValue::as_f64).unwrap_or(0.0);
                let addresses = output
                    .get("scriptPubKey")
                    .and_then(|s| s.get("addresses"))
                    .and_then(JsonValue::as_array)
                    .map(|list| {
                        list.iter()
                            .filter_map(|a| a.as_str().map(str::to_string))
                            .collect()
                    })
                    .unwrap_or_default();
                vouts.push(super::TxOut {
                    n,
                    value,
                    addresses,
                });
            }
        }

        Ok(RawTransaction {
            txid: txid.to_string(),
            height,
            vout: vouts,
        })
    }

    async fn get_address_txids(
        &self,
        address: &str,
        height_start: u64,
    ) -> Result<Vec<String>, ChainError> {
        let result = self
            .call(
                "getaddresstxids",
                json!([{ "addresses": [address], "start": height_start, "end": 0 }]),
            )
            .await?;
        Ok(result
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|t| t.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_tx_out(&self, txid: &str, vout: u32) -> Result<Option<UtxoStatus>, ChainError> {
        let result = self.call("gettxout", json!([txid, vout])).await?;
        if result.is_null() {
            return Ok(None);
        }
        let value = result
            .get("value")
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0);
        Ok(Some(UtxoStatus { value }))
    }

    async fn get_balance(&self) -> Result<f64, ChainError> {
        let result = self.call("getbalance", json!([])).await?;
        result
            .as_f64()
            .ok_or_else(|| ChainError::InvalidResponse("getbalance returned non-number".into()))
    }

    async fn get_identity_address(&self, identity: &str) -> Result<String, ChainError> {
        let result = self.call("getidentity", json!([identity, -1])).await?;
        result
            .get("identity")
            .and_then(|id| id.get("identityaddress"))
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ChainError::IdentityNotFound(identity.to_string()))
    }

    async fn identity_exists(&self, identity: &str) -> Result<bool, ChainError> {
        match self.call("getidentity", json!([identity, -1])).await {
            Ok(_) => Ok(true),
            Err(ChainError::Rpc { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn can_sign_for(&self, identity: &str) -> Result<bool, ChainError> {
        let result = self.call("getidentity", json!([identity, -1])).await?;
        Ok(result
            .get("cansignfor")
            .and_then(JsonValue::as_bool)
            .unwrap_or(false))
    }
}
