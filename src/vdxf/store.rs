use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use crate::chain::{ChainClient, ContentMultimap};
use crate::game::types::{GameInfoEntry, GameState};

use super::{keys, VdxfError};

const LOG_TARGET: &str = "vdxf::store";

const UPDATE_RETRIES: usize = 3;
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Deck vectors are chunked so a single identity update stays under the
/// chain's per-transaction size limit.
pub const CMM_CHUNK_ENTRIES: usize = 16;

/// Key namespace for one deployment: the key prefix all logical keys are
/// qualified with, and the parent identity new updates are anchored under.
#[derive(Clone, Debug)]
pub struct Namespace {
    /// e.g. `chips.vrsc::poker.pangea.`
    pub key_prefix: String,
    /// e.g. `poker.pangea.chips.vrsc@`
    pub parent_id: String,
}

impl Namespace {
    pub fn new(org: &str) -> Self {
        Self {
            key_prefix: format!("chips.vrsc::poker.{org}."),
            parent_id: format!("poker.{org}.chips.vrsc@"),
        }
    }

    pub fn full_key(&self, name: &str) -> String {
        format!("{}{}", self.key_prefix, name)
    }

    pub fn full_key_with_suffix(&self, name: &str, suffix: &str) -> String {
        format!("{}{}.{}", self.key_prefix, name, suffix)
    }

    /// Fully qualified identity name for a short name; names already
    /// carrying an `@` pass through unchanged.
    pub fn qualify(&self, name: &str) -> String {
        if name.contains('@') {
            name.to_string()
        } else {
            format!("{}.{}", name, self.parent_id)
        }
    }
}

/// CMM access for one namespace: vdxf id resolution (memoized), hex-JSON
/// entry encoding, height-filtered latest-entry reads, retried appends.
pub struct IdentityStore {
    chain: Arc<dyn ChainClient>,
    namespace: Namespace,
    vdxf_ids: Mutex<HashMap<String, String>>,
}

impl IdentityStore {
    pub fn new(chain: Arc<dyn ChainClient>, namespace: Namespace) -> Self {
        Self {
            chain,
            namespace,
            vdxf_ids: Mutex::new(HashMap::new()),
        }
    }

    pub fn chain(&self) -> &Arc<dyn ChainClient> {
        &self.chain
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    async fn vdxf_id(&self, full_key: &str) -> Result<String, VdxfError> {
        if let Some(hit) = self.vdxf_ids.lock().get(full_key) {
            return Ok(hit.clone());
        }
        let id = self.chain.get_vdxf_id(full_key).await?;
        self.vdxf_ids
            .lock()
            .insert(full_key.to_string(), id.clone());
        Ok(id)
    }

    async fn key_id(&self, key: &str, suffix: Option<&str>) -> Result<String, VdxfError> {
        let full = match suffix {
            Some(suffix) => self.namespace.full_key_with_suffix(key, suffix),
            None => self.namespace.full_key(key),
        };
        self.vdxf_id(&full).await
    }

    /// All decoded entries under `(key, suffix)` between `height_start` and
    /// tip, in publication order.
    pub async fn read_entries(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        height_start: u64,
    ) -> Result<Vec<JsonValue>, VdxfError> {
        let vdxf_id = self.key_id(key, suffix).await?;
        let cmm = self.chain.get_identity_content(identity, height_start).await?;
        let Some(entries) = cmm.get(&vdxf_id) else {
            return Ok(Vec::new());
        };
        entries
            .iter()
            .map(|entry| decode_entry(key, entry))
            .collect()
    }

    /// Latest entry under `(key, suffix)`, or `None`. This is the canonical
    /// read: an appended entry supersedes earlier ones without deleting them.
    pub async fn read_latest(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        height_start: u64,
    ) -> Result<Option<JsonValue>, VdxfError> {
        Ok(self
            .read_entries(identity, key, suffix, height_start)
            .await?
            .pop())
    }

    /// Concatenation of array entries under a chunked key, in publication
    /// order. Used for deck vectors that span multiple updates.
    pub async fn read_concat(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        height_start: u64,
    ) -> Result<Vec<JsonValue>, VdxfError> {
        let mut items = Vec::new();
        for entry in self.read_entries(identity, key, suffix, height_start).await? {
            match entry {
                JsonValue::Array(chunk) => items.extend(chunk),
                other => items.push(other),
            }
        }
        Ok(items)
    }

    /// Raw hex entry (no JSON layer). Used for `t_game_id`, whose byte-vector
    /// is the 32-byte game id itself.
    pub async fn read_latest_hex(
        &self,
        identity: &str,
        key: &str,
        height_start: u64,
    ) -> Result<Option<String>, VdxfError> {
        let vdxf_id = self.key_id(key, None).await?;
        let cmm = self.chain.get_identity_content(identity, height_start).await?;
        Ok(cmm
            .get(&vdxf_id)
            .and_then(|entries| entries.last())
            .cloned())
    }

    pub async fn append_json(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        value: &JsonValue,
    ) -> Result<String, VdxfError> {
        let payload = hex::encode(value.to_string().as_bytes());
        self.append_raw(identity, key, suffix, vec![payload]).await
    }

    /// Append a large array split across several entries of at most
    /// [`CMM_CHUNK_ENTRIES`] elements each.
    pub async fn append_json_chunked(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        items: &[JsonValue],
    ) -> Result<(), VdxfError> {
        for chunk in items.chunks(CMM_CHUNK_ENTRIES) {
            let value = JsonValue::Array(chunk.to_vec());
            self.append_json(identity, key, suffix, &value).await?;
        }
        Ok(())
    }

    pub async fn append_hex(
        &self,
        identity: &str,
        key: &str,
        hex_payload: &str,
    ) -> Result<String, VdxfError> {
        self.append_raw(identity, key, None, vec![hex_payload.to_string()])
            .await
    }

    async fn append_raw(
        &self,
        identity: &str,
        key: &str,
        suffix: Option<&str>,
        entries: Vec<String>,
    ) -> Result<String, VdxfError> {
        let vdxf_id = self.key_id(key, suffix).await?;
        let parent = self.vdxf_id(&self.namespace.parent_id).await?;

        let mut cmm = ContentMultimap::new();
        cmm.insert(vdxf_id, entries);

        let mut last_err = None;
        for attempt in 0..UPDATE_RETRIES {
            match self.chain.update_identity(identity, &parent, &cmm).await {
                Ok(txid) => {
                    tracing::debug!(
                        target: LOG_TARGET,
                        %identity,
                        %key,
                        %txid,
                        "identity updated"
                    );
                    return Ok(txid);
                }
                Err(e) => {
                    tracing::warn!(
                        target: LOG_TARGET,
                        %identity,
                        %key,
                        attempt,
                        error = %e,
                        "updateidentity failed, retrying"
                    );
                    last_err = Some(e);
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }

        Err(last_err.map(VdxfError::Chain).unwrap_or(
            VdxfError::UpdateExhausted {
                identity: identity.to_string(),
                key: key.to_string(),
            },
        ))
    }

    // ------------------------------------------------------------------
    // Game-level helpers shared by all three roles.
    // ------------------------------------------------------------------

    /// Game id currently set on a table identity, within the height window.
    pub async fn game_id(
        &self,
        table_id: &str,
        height_start: u64,
    ) -> Result<Option<String>, VdxfError> {
        self.read_latest_hex(table_id, keys::T_GAME_ID, height_start)
            .await
    }

    pub async fn require_game_id(
        &self,
        table_id: &str,
        height_start: u64,
    ) -> Result<String, VdxfError> {
        self.game_id(table_id, height_start)
            .await?
            .ok_or_else(|| VdxfError::GameIdMissing(table_id.to_string()))
    }

    /// Current game state of an identity. An identity with no game id (or no
    /// `t_game_info` entry) is in the zeroized state.
    pub async fn game_state(
        &self,
        identity: &str,
        height_start: u64,
    ) -> Result<GameState, VdxfError> {
        let Some(game_id) = self.game_id(identity, height_start).await? else {
            return Ok(GameState::Zeroized);
        };
        let Some(entry) = self
            .read_latest(identity, keys::T_GAME_INFO, Some(&game_id), height_start)
            .await?
        else {
            return Ok(GameState::Zeroized);
        };
        let info: GameInfoEntry = serde_json::from_value(entry)
            .map_err(|_| VdxfError::BadJson(keys::T_GAME_INFO.to_string()))?;
        Ok(info.game_state)
    }

    pub async fn game_state_info(
        &self,
        identity: &str,
        height_start: u64,
    ) -> Result<Option<JsonValue>, VdxfError> {
        let Some(game_id) = self.game_id(identity, height_start).await? else {
            return Ok(None);
        };
        let Some(entry) = self
            .read_latest(identity, keys::T_GAME_INFO, Some(&game_id), height_start)
            .await?
        else {
            return Ok(None);
        };
        Ok(entry.get("game_state_info").cloned())
    }

    /// Append a `t_game_info` transition for the identity's current game id.
    pub async fn append_game_state(
        &self,
        identity: &str,
        game_id: &str,
        state: GameState,
        info: Option<JsonValue>,
    ) -> Result<(), VdxfError> {
        let entry = GameInfoEntry {
            game_state: state,
            game_state_info: info,
        };
        let value = serde_json::to_value(&entry)
            .map_err(|_| VdxfError::BadJson(keys::T_GAME_INFO.to_string()))?;
        self.append_json(identity, keys::T_GAME_INFO, Some(game_id), &value)
            .await?;
        tracing::info!(
            target: LOG_TARGET,
            %identity,
            state = %state,
            "game state appended"
        );
        Ok(())
    }
}

fn decode_entry(key: &str, entry: &str) -> Result<JsonValue, VdxfError> {
    let bytes = hex::decode(entry).map_err(|_| VdxfError::BadHex(key.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|_| VdxfError::BadJson(key.to_string()))
}
