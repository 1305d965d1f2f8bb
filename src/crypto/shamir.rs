//! Byte-wise GF(256) Shamir sharing of 32-byte scalar encodings.
//!
//! The cashier splits every blinding scalar into one share per seat with
//! threshold `players/2 + 1`, so a majority of players can reconstruct a
//! blinding if the cashier disappears mid-hand.

use rand::Rng;
use sharks::{Share, Sharks};

use super::DeckError;

/// Threshold for `players` participants.
pub fn threshold(players: usize) -> usize {
    players / 2 + 1
}

pub fn split<R: Rng>(
    secret: &[u8; 32],
    players: usize,
    rng: &mut R,
) -> Result<Vec<Vec<u8>>, DeckError> {
    let m = threshold(players);
    let sharks = Sharks(m as u8);
    let dealer = sharks.dealer_rng(secret, rng);
    Ok(dealer
        .take(players)
        .map(|share| Vec::from(&share))
        .collect())
}

pub fn recover(shares: &[Vec<u8>], players: usize) -> Result<[u8; 32], DeckError> {
    let m = threshold(players);
    if shares.len() < m {
        return Err(DeckError::NotEnoughShares {
            threshold: m,
            got: shares.len(),
        });
    }
    let parsed: Vec<Share> = shares
        .iter()
        .map(|raw| Share::try_from(raw.as_slice()))
        .collect::<Result<_, _>>()
        .map_err(|e| DeckError::ShareRecovery(e.to_string()))?;

    let sharks = Sharks(m as u8);
    let secret = sharks
        .recover(parsed.iter())
        .map_err(|e| DeckError::ShareRecovery(e.to_string()))?;
    secret
        .try_into()
        .map_err(|_| DeckError::ShareRecovery("recovered secret is not 32 bytes".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn majority_recovers_the_secret() {
        let mut rng = StdRng::seed_from_u64(21);
        let mut secret = [0u8; 32];
        rng.fill(&mut secret);

        let shares = split(&secret, 5, &mut rng).unwrap();
        assert_eq!(shares.len(), 5);
        assert_eq!(threshold(5), 3);

        let recovered = recover(&shares[..3], 5).unwrap();
        assert_eq!(recovered, secret);
    }

    #[test]
    fn below_threshold_is_refused() {
        let mut rng = StdRng::seed_from_u64(22);
        let secret = [9u8; 32];
        let shares = split(&secret, 4, &mut rng).unwrap();
        let err = recover(&shares[..2], 4).unwrap_err();
        assert!(matches!(err, DeckError::NotEnoughShares { threshold: 3, .. }));
    }

    #[test]
    fn two_player_threshold_is_two() {
        let mut rng = StdRng::seed_from_u64(23);
        let secret = [5u8; 32];
        let shares = split(&secret, 2, &mut rng).unwrap();
        assert_eq!(recover(&shares, 2).unwrap(), secret);
    }
}
