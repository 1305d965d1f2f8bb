//! NaCl-box sealing of Shamir shares to player keys.

use crypto_box::aead::generic_array::GenericArray;
use crypto_box::aead::Aead;
use crypto_box::{PublicKey, SalsaBox, SecretKey};
use rand::{CryptoRng, Rng, RngCore};

use super::DeckError;

const NONCE_LEN: usize = 24;

pub fn generate_keypair<R: CryptoRng + RngCore>(rng: &mut R) -> (SecretKey, PublicKey) {
    let secret = SecretKey::generate(rng);
    let public = secret.public_key();
    (secret, public)
}

pub fn public_key_to_hex(key: &PublicKey) -> String {
    hex::encode(key.as_bytes())
}

pub fn public_key_from_hex(text: &str) -> Result<PublicKey, DeckError> {
    let bytes: [u8; 32] = hex::decode(text)
        .map_err(|_| DeckError::BadPoint)?
        .try_into()
        .map_err(|_| DeckError::BadPoint)?;
    Ok(PublicKey::from(bytes))
}

/// Seal `plaintext` to `their_public` from `my_secret`. Output is
/// `nonce || ciphertext`.
pub fn seal<R: CryptoRng + RngCore + Rng>(
    plaintext: &[u8],
    their_public: &PublicKey,
    my_secret: &SecretKey,
    rng: &mut R,
) -> Result<Vec<u8>, DeckError> {
    let salsa_box = SalsaBox::new(their_public, my_secret);
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rng.fill_bytes(&mut nonce_bytes);
    let nonce = GenericArray::from_slice(&nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(nonce, plaintext)
        .map_err(|_| DeckError::Serialization("share sealing failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn open(
    sealed: &[u8],
    their_public: &PublicKey,
    my_secret: &SecretKey,
) -> Result<Vec<u8>, DeckError> {
    if sealed.len() <= NONCE_LEN {
        return Err(DeckError::OpenFailed);
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let nonce = GenericArray::from_slice(nonce_bytes);
    let salsa_box = SalsaBox::new(their_public, my_secret);
    salsa_box
        .decrypt(nonce, ciphertext)
        .map_err(|_| DeckError::OpenFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn seal_round_trip() {
        let mut rng = StdRng::seed_from_u64(31);
        let (cashier_secret, cashier_public) = generate_keypair(&mut rng);
        let (player_secret, player_public) = generate_keypair(&mut rng);

        let share = b"a thirty-two byte secret share!!";
        let sealed = seal(share, &player_public, &cashier_secret, &mut rng).unwrap();
        let opened = open(&sealed, &cashier_public, &player_secret).unwrap();
        assert_eq!(opened, share);
    }

    #[test]
    fn wrong_recipient_cannot_open() {
        let mut rng = StdRng::seed_from_u64(32);
        let (cashier_secret, cashier_public) = generate_keypair(&mut rng);
        let (_, player_public) = generate_keypair(&mut rng);
        let (eve_secret, _) = generate_keypair(&mut rng);

        let sealed = seal(b"secret", &player_public, &cashier_secret, &mut rng).unwrap();
        assert!(open(&sealed, &cashier_public, &eve_secret).is_err());
    }

    #[test]
    fn public_key_hex_round_trip() {
        let mut rng = StdRng::seed_from_u64(33);
        let (_, public) = generate_keypair(&mut rng);
        let hex = public_key_to_hex(&public);
        assert_eq!(public_key_from_hex(&hex).unwrap(), public);
    }
}
