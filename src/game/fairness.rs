use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::rngs::OsRng;
use rand::seq::index;
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{EngineError, EngineResult};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const SALT_LEN: usize = 16;

const VALUE_SEPARATOR: &str = "-";

/// Symmetric key sealing winning values between commit and reveal.
#[derive(Clone, PartialEq, Eq)]
pub struct FairnessKey([u8; KEY_LEN]);

impl FairnessKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_hex(encoded: &str) -> EngineResult<Self> {
        let bytes = hex::decode(encoded.trim())
            .map_err(|err| EngineError::Config(format!("fairness key is not valid hex: {}", err)))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            EngineError::Config(format!(
                "fairness key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

impl fmt::Debug for FairnessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FairnessKey(..)")
    }
}

/// Winning values drawn at game creation with their public commitment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commitment {
    pub winning_values: Vec<u32>,
    pub salt: String,
    pub hash_commit: String,
}

/// Commit-reveal engine for guessing games.
///
/// `commit` draws the winning values and publishes `SHA256(values + salt)`;
/// `encrypt` seals the plaintext values until the game closes, `decrypt`
/// opens them, and `verify` lets anyone audit a reveal against the hash.
#[derive(Debug, Clone)]
pub struct GameFairnessEngine {
    key: FairnessKey,
}

impl GameFairnessEngine {
    pub fn new(key: FairnessKey) -> Self {
        Self { key }
    }

    pub fn commit(&self, guess_min: u32, guess_max: u32, winners: usize) -> EngineResult<Commitment> {
        Self::commit_with(&mut OsRng, guess_min, guess_max, winners)
    }

    /// Same as `commit` with a caller-supplied secure generator.
    pub fn commit_with<R>(
        rng: &mut R,
        guess_min: u32,
        guess_max: u32,
        winners: usize,
    ) -> EngineResult<Commitment>
    where
        R: RngCore + CryptoRng + ?Sized,
    {
        if guess_min > guess_max {
            return Err(EngineError::Validation(format!(
                "guess range {}..={} is empty",
                guess_min, guess_max
            )));
        }
        let range_len = (guess_max - guess_min) as usize + 1;
        if winners > range_len {
            return Err(EngineError::Range(format!(
                "cannot draw {} distinct winners from {} values",
                winners, range_len
            )));
        }

        let winning_values: Vec<u32> = index::sample(rng, range_len, winners)
            .into_iter()
            .map(|offset| guess_min + offset as u32)
            .collect();
        let salt = generate_salt(rng);
        let hash_commit = hash_commit(&winning_values, &salt);

        Ok(Commitment {
            winning_values,
            salt,
            hash_commit,
        })
    }

    pub fn encrypt(&self, values: &[u32]) -> EngineResult<String> {
        encrypt_values(values, &self.key)
    }

    pub fn decrypt(&self, ciphertext: &str) -> EngineResult<Vec<u32>> {
        decrypt_values(ciphertext, &self.key)
    }

    pub fn verify(values: &[u32], salt: &str, expected: &str) -> bool {
        hash_commit(values, salt) == expected.trim().to_lowercase()
    }
}

pub fn join_values(values: &[u32]) -> String {
    values
        .iter()
        .map(|value| value.to_string())
        .collect::<Vec<_>>()
        .join(VALUE_SEPARATOR)
}

pub fn parse_values(joined: &str) -> Option<Vec<u32>> {
    if joined.is_empty() {
        return Some(Vec::new());
    }
    joined
        .split(VALUE_SEPARATOR)
        .map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

/// Lowercase hex SHA-256 of the joined values followed by the salt.
pub fn hash_commit(values: &[u32], salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(join_values(values).as_bytes());
    hasher.update(salt.as_bytes());
    hex::encode(hasher.finalize())
}

pub fn generate_salt<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> String {
    let mut bytes = [0u8; SALT_LEN];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Base64 of `nonce || ciphertext || tag`.
pub fn encrypt_values(values: &[u32], key: &FairnessKey) -> EngineResult<String> {
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = key
        .cipher()
        .encrypt(nonce, join_values(values).as_bytes())
        .map_err(|err| EngineError::Encrypt(err.to_string()))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(sealed))
}

pub fn decrypt_values(ciphertext: &str, key: &FairnessKey) -> EngineResult<Vec<u32>> {
    let sealed = BASE64
        .decode(ciphertext.trim())
        .map_err(|err| EngineError::Decrypt(format!("invalid base64: {}", err)))?;
    if sealed.len() <= NONCE_LEN {
        return Err(EngineError::Decrypt("ciphertext too short".to_string()));
    }

    let (nonce_bytes, body) = sealed.split_at(NONCE_LEN);
    let plaintext = key
        .cipher()
        .decrypt(Nonce::from_slice(nonce_bytes), body)
        .map_err(|_| EngineError::Decrypt("authentication failed".to_string()))?;

    let joined = String::from_utf8(plaintext)
        .map_err(|_| EngineError::Decrypt("plaintext is not utf-8".to_string()))?;
    parse_values(&joined)
        .ok_or_else(|| EngineError::Decrypt(format!("malformed winning values: {}", joined)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn engine() -> GameFairnessEngine {
        GameFairnessEngine::new(FairnessKey::from_bytes([7u8; KEY_LEN]))
    }

    #[test]
    fn commit_draws_distinct_values_in_range() {
        let commitment = engine().commit(1, 100, 3).unwrap();
        let mut values = commitment.winning_values.clone();
        values.sort_unstable();
        values.dedup();
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|value| (1..=100).contains(value)));
        assert_eq!(commitment.salt.len(), SALT_LEN * 2);
        assert!(GameFairnessEngine::verify(
            &commitment.winning_values,
            &commitment.salt,
            &commitment.hash_commit
        ));
    }

    #[test]
    fn commit_can_exhaust_the_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let commitment = GameFairnessEngine::commit_with(&mut rng, 5, 9, 5).unwrap();
        let mut values = commitment.winning_values;
        values.sort_unstable();
        assert_eq!(values, vec![5, 6, 7, 8, 9]);
    }

    #[test]
    fn too_many_winners_is_a_range_error() {
        assert!(matches!(engine().commit(1, 3, 4), Err(EngineError::Range(_))));
        assert!(matches!(engine().commit(9, 3, 1), Err(EngineError::Validation(_))));
    }

    #[test]
    fn hash_uses_dash_join() {
        let expected = hex::encode(Sha256::digest(b"4-17-92abc"));
        assert_eq!(hash_commit(&[4, 17, 92], "abc"), expected);
    }

    #[test]
    fn printed_values_rehash_to_the_commit() {
        let commitment = engine().commit(1, 500, 3).unwrap();
        let printed = join_values(&commitment.winning_values);
        let rehashed = hex::encode(Sha256::digest(format!("{}{}", printed, commitment.salt)));
        assert_eq!(rehashed, commitment.hash_commit);
        assert_eq!(parse_values(&printed), Some(commitment.winning_values));
    }

    #[test]
    fn mutated_reveal_fails_verification() {
        let commitment = engine().commit(1, 1000, 4).unwrap();
        let mut values = commitment.winning_values.clone();
        values[0] = if values[0] == 1000 { 999 } else { values[0] + 1 };
        assert!(!GameFairnessEngine::verify(&values, &commitment.salt, &commitment.hash_commit));

        let mut salt = commitment.salt.clone();
        let replacement = if salt.starts_with('0') { "1" } else { "0" };
        salt.replace_range(0..1, replacement);
        assert!(!GameFairnessEngine::verify(
            &commitment.winning_values,
            &salt,
            &commitment.hash_commit
        ));
    }

    #[test]
    fn ciphertext_round_trips() {
        let engine = engine();
        let sealed = engine.encrypt(&[3, 1, 2]).unwrap();
        assert_eq!(engine.decrypt(&sealed).unwrap(), vec![3, 1, 2]);
        assert_eq!(engine.decrypt(&engine.encrypt(&[]).unwrap()).unwrap(), Vec::<u32>::new());
    }

    #[test]
    fn wrong_key_or_tampering_fails() {
        let sealed = engine().encrypt(&[10, 20]).unwrap();
        let other = GameFairnessEngine::new(FairnessKey::from_bytes([8u8; KEY_LEN]));
        assert!(matches!(other.decrypt(&sealed), Err(EngineError::Decrypt(_))));

        let mut raw = BASE64.decode(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = BASE64.encode(raw);
        assert!(matches!(engine().decrypt(&tampered), Err(EngineError::Decrypt(_))));
        assert!(matches!(engine().decrypt("not base64!"), Err(EngineError::Decrypt(_))));
    }

    #[test]
    fn key_hex_round_trips() {
        let key = FairnessKey::generate();
        assert_eq!(FairnessKey::from_hex(&key.to_hex()).unwrap(), key);
        assert!(matches!(FairnessKey::from_hex("abcd"), Err(EngineError::Config(_))));
    }
}
