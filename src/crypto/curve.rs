//! curve25519 primitives used by the deck protocol.

use ark_ec::{CurveGroup, PrimeGroup};
use ark_ff::{Field, PrimeField, UniformRand};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::DeckError;

pub use ark_curve25519::{EdwardsProjective as Point, Fr as Scalar};

pub fn basepoint() -> Point {
    Point::generator()
}

pub fn random_scalar<R: Rng>(rng: &mut R) -> Scalar {
    Scalar::rand(rng)
}

/// Random keypair `(s, s·G)`.
pub fn keypair<R: Rng>(rng: &mut R) -> (Scalar, Point) {
    let secret = random_scalar(rng);
    (secret, basepoint() * secret)
}

/// Canonical 32-byte encoding of a point's affine x coordinate.
pub fn x_bytes(point: &Point) -> Result<[u8; 32], DeckError> {
    let affine = point.into_affine();
    let mut buf = Vec::with_capacity(32);
    affine
        .x
        .serialize_compressed(&mut buf)
        .map_err(|e| DeckError::Serialization(e.to_string()))?;
    buf.try_into()
        .map_err(|_| DeckError::Serialization("x coordinate is not 32 bytes".into()))
}

/// SHA-256 of the point's x coordinate; the anchor stored in `g_hash`.
pub fn card_hash(point: &Point) -> Result<[u8; 32], DeckError> {
    let x = x_bytes(point)?;
    Ok(Sha256::digest(x).into())
}

/// Hash bytes interpreted as a scalar, reduced mod the group order.
pub fn scalar_from_hash(hash: &[u8; 32]) -> Scalar {
    Scalar::from_le_bytes_mod_order(hash)
}

pub fn scalar_to_hex(scalar: &Scalar) -> String {
    let mut buf = Vec::with_capacity(32);
    scalar
        .serialize_compressed(&mut buf)
        .expect("scalar serialization is infallible");
    hex::encode(buf)
}

pub fn scalar_from_hex(text: &str) -> Result<Scalar, DeckError> {
    let bytes = hex::decode(text).map_err(|_| DeckError::BadScalar)?;
    Scalar::deserialize_compressed(bytes.as_slice()).map_err(|_| DeckError::BadScalar)
}

pub fn point_to_hex(point: &Point) -> String {
    let mut buf = Vec::with_capacity(32);
    point
        .into_affine()
        .serialize_compressed(&mut buf)
        .expect("point serialization is infallible");
    hex::encode(buf)
}

pub fn point_from_hex(text: &str) -> Result<Point, DeckError> {
    let bytes = hex::decode(text).map_err(|_| DeckError::BadPoint)?;
    let affine = ark_curve25519::EdwardsAffine::deserialize_compressed(bytes.as_slice())
        .map_err(|_| DeckError::BadPoint)?;
    Ok(affine.into())
}

pub fn scalar_to_bytes(scalar: &Scalar) -> [u8; 32] {
    let mut buf = Vec::with_capacity(32);
    scalar
        .serialize_compressed(&mut buf)
        .expect("scalar serialization is infallible");
    buf.try_into().expect("scalar encoding is 32 bytes")
}

pub fn scalar_from_bytes(bytes: &[u8]) -> Result<Scalar, DeckError> {
    Scalar::deserialize_compressed(bytes).map_err(|_| DeckError::BadScalar)
}

pub fn invert(scalar: &Scalar) -> Result<Scalar, DeckError> {
    scalar.inverse().ok_or(DeckError::BadBlinding)
}

/// Uniform random permutation of `[0, n)`.
pub fn permutation<R: Rng>(rng: &mut R, n: usize) -> Vec<usize> {
    use rand::seq::SliceRandom;
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(rng);
    perm
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn scalar_hex_round_trip() {
        let mut rng = StdRng::seed_from_u64(7);
        let scalar = random_scalar(&mut rng);
        let hex = scalar_to_hex(&scalar);
        assert_eq!(hex.len(), 64);
        assert_eq!(scalar_from_hex(&hex).unwrap(), scalar);
    }

    #[test]
    fn point_hex_round_trip() {
        let mut rng = StdRng::seed_from_u64(8);
        let (_, point) = keypair(&mut rng);
        let hex = point_to_hex(&point);
        assert_eq!(point_from_hex(&hex).unwrap(), point);
    }

    #[test]
    fn card_hash_is_stable_across_scalar_order() {
        let mut rng = StdRng::seed_from_u64(9);
        let a = random_scalar(&mut rng);
        let b = random_scalar(&mut rng);
        // x(a·(b·G)) == x(b·(a·G))
        let left = basepoint() * b * a;
        let right = basepoint() * a * b;
        assert_eq!(card_hash(&left).unwrap(), card_hash(&right).unwrap());
    }

    #[test]
    fn permutation_is_a_bijection() {
        let mut rng = StdRng::seed_from_u64(10);
        let perm = permutation(&mut rng, 14);
        let mut seen = vec![false; 14];
        for &index in &perm {
            assert!(!seen[index]);
            seen[index] = true;
        }
    }
}
