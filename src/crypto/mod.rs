//! Cryptographic deck protocol.
//!
//! The deck is committed through three cascaded blinding passes (player,
//! dealer, cashier) over the curve25519 group; a card becomes readable only
//! when the cashier reveals its blinding scalar for that slot. Field and
//! group arithmetic use the arkworks curve25519 instantiation; blinding
//! composition lives in the scalar field.

pub mod curve;
pub mod deck;
pub mod seal;
pub mod shamir;

pub use curve::{Point, Scalar};
pub use deck::{CashierSecrets, DealerDeck, PlayerDeck};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeckError {
    #[error("value is not a valid hex-encoded scalar")]
    BadScalar,

    #[error("value is not a valid hex-encoded point")]
    BadPoint,

    #[error("blinding scalar is not invertible")]
    BadBlinding,

    #[error("no (card, point) pair matches the published commitments")]
    DecodeFailed,

    #[error("deck size mismatch: expected {expected}, got {got}")]
    DeckSize { expected: usize, got: usize },

    #[error("need {threshold} shares to recover, got {got}")]
    NotEnoughShares { threshold: usize, got: usize },

    #[error("share recovery failed: {0}")]
    ShareRecovery(String),

    #[error("sealed share cannot be opened")]
    OpenFailed,

    #[error("serialization failure: {0}")]
    Serialization(String),
}
