pub mod keys;

pub mod store;

pub use store::{IdentityStore, Namespace};

use thiserror::Error;

use crate::chain::ChainError;

#[derive(Error, Debug)]
pub enum VdxfError {
    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("identity update for {identity} key {key} failed after retries")]
    UpdateExhausted { identity: String, key: String },

    #[error("entry under {0} is not valid hex")]
    BadHex(String),

    #[error("entry under {0} is not valid json")]
    BadJson(String),

    #[error("game id not found on {0}")]
    GameIdMissing(String),
}
