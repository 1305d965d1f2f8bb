//! The three blinding passes and the card decode.
//!
//! Secrets compose multiplicatively in the scalar field: after all three
//! passes, the slot-`c` entry of a player's blinded deck is
//! `b_c · fe(h) · d` where `h = sha256(x(d · R*))`, `d` is the dealer's
//! per-card secret and `R*` one of the player's published card points.
//! Publishing `b_c` lets exactly that player walk its own `(card, point)`
//! pairs back to the dealer's public points and read off the card value.

use crypto_box::{PublicKey, SecretKey};
use rand::{CryptoRng, Rng, RngCore};
use zeroize::Zeroize;

use crate::game::types::{BlindedDeckEntry, DealerDeckEntry, PlayerDeckEntry, Slot};

use super::curve::{
    basepoint, card_hash, invert, keypair, permutation, point_from_hex, point_to_hex,
    random_scalar, scalar_from_bytes, scalar_from_hash, scalar_from_hex, scalar_to_bytes,
    scalar_to_hex,
};
use super::{seal, shamir, DeckError, Point, Scalar};

// ---------------------------------------------------------------------------
// Phase P
// ---------------------------------------------------------------------------

/// A player's deck secrets: the personal keypair, one scalar per card (the
/// scalar's index is the card value), and the sealing keypair Shamir shares
/// are addressed to.
pub struct PlayerDeck {
    pub slot: Slot,
    pub key_secret: Scalar,
    pub key_public: Point,
    pub card_secrets: Vec<Scalar>,
    /// Published card points `R*_i = r_P · r_i · G`, in value order.
    pub card_points: Vec<Point>,
    pub sealing_secret: SecretKey,
}

impl PlayerDeck {
    pub fn generate<R: Rng + CryptoRng + RngCore>(slot: Slot, num_cards: usize, rng: &mut R) -> Self {
        let (key_secret, key_public) = keypair(rng);
        let card_secrets: Vec<Scalar> = (0..num_cards).map(|_| random_scalar(rng)).collect();
        let card_points = card_secrets
            .iter()
            .map(|secret| key_public * *secret)
            .collect();
        let (sealing_secret, _) = seal::generate_keypair(rng);
        Self {
            slot,
            key_secret,
            key_public,
            card_secrets,
            card_points,
            sealing_secret,
        }
    }

    pub fn sealing_public(&self) -> PublicKey {
        self.sealing_secret.public_key()
    }

    /// `player_deck.<game_id>` publication.
    pub fn entry(&self) -> PlayerDeckEntry {
        PlayerDeckEntry {
            id: self.slot,
            pubkey: point_to_hex(&self.key_public),
            sealing_key: seal::public_key_to_hex(&self.sealing_public()),
            cardinfo: self.card_points.iter().map(point_to_hex).collect(),
        }
    }

    /// Compact secret blob for the local cache: sealing key then per-card
    /// scalars, hex-encoded.
    pub fn secrets_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(32 * (1 + self.card_secrets.len()));
        bytes.extend_from_slice(&self.sealing_secret.to_bytes());
        for secret in &self.card_secrets {
            bytes.extend_from_slice(&scalar_to_bytes(secret));
        }
        let encoded = hex::encode(&bytes);
        bytes.zeroize();
        encoded
    }

    /// Rebuild a deck from cached secrets (`key_hex` from `player_priv`,
    /// `blob_hex` from `player_deck_priv`).
    pub fn from_cache(slot: Slot, key_hex: &str, blob_hex: &str) -> Result<Self, DeckError> {
        let key_secret = scalar_from_hex(key_hex)?;
        let mut bytes = hex::decode(blob_hex).map_err(|_| DeckError::BadScalar)?;
        if bytes.len() < 32 || (bytes.len() - 32) % 32 != 0 {
            return Err(DeckError::BadScalar);
        }
        let sealing_bytes: [u8; 32] = bytes[..32].try_into().expect("checked length");
        let sealing_secret = SecretKey::from(sealing_bytes);
        let card_secrets: Vec<Scalar> = bytes[32..]
            .chunks(32)
            .map(scalar_from_bytes)
            .collect::<Result<_, _>>()?;
        bytes.zeroize();

        let key_public = basepoint() * key_secret;
        let card_points = card_secrets
            .iter()
            .map(|secret| key_public * *secret)
            .collect();
        Ok(Self {
            slot,
            key_secret,
            key_public,
            card_secrets,
            card_points,
            sealing_secret,
        })
    }
}

// ---------------------------------------------------------------------------
// Phase D
// ---------------------------------------------------------------------------

pub struct DealerDeck {
    pub secrets: Vec<Scalar>,
    /// Public points `d_i · G`, published under `t_d_deck` in secret order.
    pub points: Vec<Point>,
    pub perm: Vec<usize>,
}

impl DealerDeck {
    pub fn generate<R: Rng>(num_cards: usize, rng: &mut R) -> Self {
        let secrets: Vec<Scalar> = (0..num_cards).map(|_| random_scalar(rng)).collect();
        let points = secrets.iter().map(|d| basepoint() * *d).collect();
        let perm = permutation(rng, num_cards);
        Self {
            secrets,
            points,
            perm,
        }
    }

    /// Blind one player's published card points: pair card point `i` with
    /// dealer secret `i`, hash the shared point into a field element, bind it
    /// to the secret, then shuffle both vectors with the dealer permutation.
    pub fn blind_player_deck(
        &self,
        player_points: &[Point],
    ) -> Result<(Vec<Scalar>, Vec<[u8; 32]>), DeckError> {
        if player_points.len() != self.secrets.len() {
            return Err(DeckError::DeckSize {
                expected: self.secrets.len(),
                got: player_points.len(),
            });
        }
        let mut encoded = Vec::with_capacity(player_points.len());
        let mut hashes = Vec::with_capacity(player_points.len());
        for (secret, point) in self.secrets.iter().zip(player_points) {
            let shared = *point * *secret;
            let hash = card_hash(&shared)?;
            encoded.push(scalar_from_hash(&hash) * secret);
            hashes.push(hash);
        }
        let cards = self.perm.iter().map(|&i| encoded[i]).collect();
        let ghash = self.perm.iter().map(|&i| hashes[i]).collect();
        Ok((cards, ghash))
    }

    pub fn entry_for(&self, cards: &[Scalar], ghash: &[[u8; 32]]) -> DealerDeckEntry {
        DealerDeckEntry {
            cards: cards.iter().map(scalar_to_hex).collect(),
            ghash: ghash.iter().map(hex::encode).collect(),
        }
    }

    pub fn public_points_hex(&self) -> Vec<String> {
        self.points.iter().map(point_to_hex).collect()
    }

    pub fn secrets_hex(&self) -> String {
        let bytes: Vec<u8> = self
            .secrets
            .iter()
            .flat_map(|s| scalar_to_bytes(s))
            .collect();
        hex::encode(bytes)
    }

    pub fn perm_csv(&self) -> String {
        self.perm
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn from_cache(perm_csv: &str, secrets_hex: &str) -> Result<Self, DeckError> {
        let perm: Vec<usize> = perm_csv
            .split(',')
            .filter(|s| !s.is_empty())
            .map(|s| s.parse().map_err(|_| DeckError::BadScalar))
            .collect::<Result<_, _>>()?;
        let bytes = hex::decode(secrets_hex).map_err(|_| DeckError::BadScalar)?;
        let secrets: Vec<Scalar> = bytes
            .chunks(32)
            .map(scalar_from_bytes)
            .collect::<Result<_, _>>()?;
        if perm.len() != secrets.len() {
            return Err(DeckError::DeckSize {
                expected: perm.len(),
                got: secrets.len(),
            });
        }
        let points = secrets.iter().map(|d| basepoint() * *d).collect();
        Ok(Self {
            secrets,
            points,
            perm,
        })
    }
}

// ---------------------------------------------------------------------------
// Phase B
// ---------------------------------------------------------------------------

/// The cashier's per-hand secrets: one shared permutation and one blinding
/// scalar per (seat, card).
pub struct CashierSecrets {
    pub perm: Vec<usize>,
    pub blindings: Vec<Vec<Scalar>>,
    pub sealing_secret: SecretKey,
}

impl CashierSecrets {
    pub fn generate<R: Rng + CryptoRng + RngCore>(
        num_players: usize,
        num_cards: usize,
        rng: &mut R,
    ) -> Self {
        let perm = permutation(rng, num_cards);
        let blindings = (0..num_players)
            .map(|_| (0..num_cards).map(|_| random_scalar(rng)).collect())
            .collect();
        let (sealing_secret, _) = seal::generate_keypair(rng);
        Self {
            perm,
            blindings,
            sealing_secret,
        }
    }

    pub fn blinding(&self, slot: Slot, card_id: usize) -> Option<&Scalar> {
        self.blindings.get(slot).and_then(|cards| cards.get(card_id))
    }

    /// Blind one player's dealer-encoded deck and seal Shamir shares of each
    /// blinding to every seat's sealing key.
    pub fn blind_player_deck<R: Rng + CryptoRng + RngCore>(
        &self,
        slot: Slot,
        dealer_cards: &[Scalar],
        sealing_keys: &[PublicKey],
        rng: &mut R,
    ) -> Result<BlindedDeckEntry, DeckError> {
        let blindings = self
            .blindings
            .get(slot)
            .ok_or(DeckError::DeckSize {
                expected: self.blindings.len(),
                got: slot,
            })?;
        if dealer_cards.len() != blindings.len() {
            return Err(DeckError::DeckSize {
                expected: blindings.len(),
                got: dealer_cards.len(),
            });
        }

        let mut cards = Vec::with_capacity(dealer_cards.len());
        let mut shares = Vec::with_capacity(dealer_cards.len());
        for (card_id, blinding) in blindings.iter().enumerate() {
            cards.push(dealer_cards[self.perm[card_id]] * blinding);

            let secret = scalar_to_bytes(blinding);
            let split = shamir::split(&secret, sealing_keys.len(), rng)?;
            let sealed: Vec<String> = split
                .iter()
                .zip(sealing_keys)
                .map(|(share, key)| {
                    seal::seal(share, key, &self.sealing_secret, rng).map(hex::encode)
                })
                .collect::<Result<_, _>>()?;
            shares.push(sealed);
        }

        Ok(BlindedDeckEntry {
            cards: cards.iter().map(scalar_to_hex).collect(),
            shares,
        })
    }

    pub fn secrets_hex(&self, slot: Slot) -> Option<String> {
        let bytes: Vec<u8> = self
            .blindings
            .get(slot)?
            .iter()
            .flat_map(|s| scalar_to_bytes(s))
            .collect();
        Some(hex::encode(bytes))
    }

    pub fn perm_csv(&self) -> String {
        self.perm
            .iter()
            .map(usize::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

// ---------------------------------------------------------------------------
// Phase R
// ---------------------------------------------------------------------------

/// Decode one card addressed to `player`: strip the cashier blinding, then
/// search the player's `(card m, dealer point n)` pairs for the one whose
/// hash both appears in the published `g_hash` vector and walks the residual
/// value back to the dealer's public point. The matched card index `m` is
/// the card value.
pub fn decode_card(
    player: &PlayerDeck,
    blinded_card: &Scalar,
    bv: &Scalar,
    dealer_points: &[Point],
    ghash: &[[u8; 32]],
) -> Result<usize, DeckError> {
    let refval = *blinded_card * invert(bv)?;

    for (m, card_secret) in player.card_secrets.iter().enumerate() {
        // r_P · r_m applied once per candidate card.
        let unlock = player.key_secret * *card_secret;
        for (n, dealer_point) in dealer_points.iter().enumerate() {
            let shared = *dealer_point * unlock;
            let hash = card_hash(&shared)?;
            if !ghash.contains(&hash) {
                continue;
            }
            let fe = scalar_from_hash(&hash);
            let candidate = refval * invert(&fe)?;
            if basepoint() * candidate == dealer_points[n] {
                return Ok(m);
            }
        }
    }
    Err(DeckError::DecodeFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::seal::public_key_from_hex;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const CARDS: usize = 14;

    struct Table {
        players: Vec<PlayerDeck>,
        dealer: DealerDeck,
        cashier: CashierSecrets,
        dealer_cards: Vec<Vec<Scalar>>,
        ghash: Vec<Vec<[u8; 32]>>,
        blinded: Vec<BlindedDeckEntry>,
    }

    fn shuffle_table(num_players: usize, seed: u64) -> Table {
        let mut rng = StdRng::seed_from_u64(seed);
        let players: Vec<PlayerDeck> = (0..num_players)
            .map(|slot| PlayerDeck::generate(slot, CARDS, &mut rng))
            .collect();
        let dealer = DealerDeck::generate(CARDS, &mut rng);
        let cashier = CashierSecrets::generate(num_players, CARDS, &mut rng);
        let sealing_keys: Vec<_> = players.iter().map(|p| p.sealing_public()).collect();

        let mut dealer_cards = Vec::new();
        let mut ghash = Vec::new();
        let mut blinded = Vec::new();
        for player in &players {
            let (cards, hashes) = dealer.blind_player_deck(&player.card_points).unwrap();
            let entry = cashier
                .blind_player_deck(player.slot, &cards, &sealing_keys, &mut rng)
                .unwrap();
            dealer_cards.push(cards);
            ghash.push(hashes);
            blinded.push(entry);
        }
        Table {
            players,
            dealer,
            cashier,
            dealer_cards,
            ghash,
            blinded,
        }
    }

    fn blinded_scalar(table: &Table, slot: usize, card_id: usize) -> Scalar {
        scalar_from_hex(&table.blinded[slot].cards[card_id]).unwrap()
    }

    #[test]
    fn round_trip_recovers_the_composed_permutation() {
        let table = shuffle_table(2, 41);
        for card_id in [0, 3, 7, 13] {
            let expected = table.dealer.perm[table.cashier.perm[card_id]];
            for player in &table.players {
                let bv = table.cashier.blinding(player.slot, card_id).unwrap();
                let value = decode_card(
                    player,
                    &blinded_scalar(&table, player.slot, card_id),
                    bv,
                    &table.dealer.points,
                    &table.ghash[player.slot],
                )
                .unwrap();
                assert_eq!(value, expected);
                assert!(value < CARDS);
            }
        }
    }

    #[test]
    fn community_card_decodes_identically_for_all_seats() {
        let table = shuffle_table(3, 42);
        let card_id = 7;
        let values: Vec<usize> = table
            .players
            .iter()
            .map(|player| {
                let bv = table.cashier.blinding(player.slot, card_id).unwrap();
                decode_card(
                    player,
                    &blinded_scalar(&table, player.slot, card_id),
                    bv,
                    &table.dealer.points,
                    &table.ghash[player.slot],
                )
                .unwrap()
            })
            .collect();
        assert!(values.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn wrong_blinding_value_yields_no_match() {
        let table = shuffle_table(2, 43);
        let mut rng = StdRng::seed_from_u64(99);
        let wrong_bv = random_scalar(&mut rng);
        let err = decode_card(
            &table.players[0],
            &blinded_scalar(&table, 0, 3),
            &wrong_bv,
            &table.dealer.points,
            &table.ghash[0],
        )
        .unwrap_err();
        assert!(matches!(err, DeckError::DecodeFailed));
    }

    #[test]
    fn sealed_shares_reconstruct_the_blinding() {
        let table = shuffle_table(3, 44);
        let card_id = 2;
        let slot = 1;
        let cashier_public = public_key_from_hex(&seal::public_key_to_hex(
            &table.cashier.sealing_secret.public_key(),
        ))
        .unwrap();

        // Each player opens its own sealed share; a majority reconstructs.
        let opened: Vec<Vec<u8>> = table
            .players
            .iter()
            .map(|player| {
                let sealed = hex::decode(&table.blinded[slot].shares[card_id][player.slot]).unwrap();
                seal::open(&sealed, &cashier_public, &player.sealing_secret).unwrap()
            })
            .collect();

        let threshold = shamir::threshold(table.players.len());
        let recovered = shamir::recover(&opened[..threshold], table.players.len()).unwrap();
        let expected = scalar_to_bytes(table.cashier.blinding(slot, card_id).unwrap());
        assert_eq!(recovered, expected);
    }

    #[test]
    fn player_deck_cache_round_trip() {
        let mut rng = StdRng::seed_from_u64(45);
        let deck = PlayerDeck::generate(1, CARDS, &mut rng);
        let key_hex = scalar_to_hex(&deck.key_secret);
        let blob = deck.secrets_hex();

        let restored = PlayerDeck::from_cache(1, &key_hex, &blob).unwrap();
        assert_eq!(restored.key_public, deck.key_public);
        assert_eq!(restored.card_points, deck.card_points);
        assert_eq!(
            restored.sealing_secret.to_bytes(),
            deck.sealing_secret.to_bytes()
        );
    }

    #[test]
    fn dealer_deck_cache_round_trip() {
        let mut rng = StdRng::seed_from_u64(46);
        let deck = DealerDeck::generate(CARDS, &mut rng);
        let restored = DealerDeck::from_cache(&deck.perm_csv(), &deck.secrets_hex()).unwrap();
        assert_eq!(restored.perm, deck.perm);
        assert_eq!(restored.points, deck.points);
    }
}
