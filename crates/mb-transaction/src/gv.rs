//! The generator-verifier scheme: a symmetric per-transaction token proving
//! that whoever holds the derivation secret created the transaction.
//!
//! The author derives `K = SHA256(secret || id)` and stores
//! `AES-256-ECB-Encrypt(K, id)` on the transaction. To authorise a removal
//! or summarisation later, the author reveals `K`; the miner decrypts the
//! stored token and accepts iff it equals the id. ECB with no IV or padding
//! is deliberate: the plaintext is unique per key, and the token must be
//! reproducible from the key alone.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes256;
use sha2::{Digest, Sha256};

/// A per-transaction AES-256 key revealed in `remove`/`summarise` requests.
pub type GvKey = [u8; 32];

const BLOCK: usize = 16;

/// Derive the per-transaction key from the author's secret and the
/// transaction id.
pub fn derive_key(secret: &str, tx_id: &str) -> GvKey {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hasher.update(tx_id.as_bytes());
    hasher.finalize().into()
}

/// Encrypt a transaction id under `key`. The hex id is four AES blocks.
pub fn encrypt_id(key: &GvKey, tx_id: &str) -> Vec<u8> {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut token = Vec::with_capacity(tx_id.len());
    for chunk in tx_id.as_bytes().chunks_exact(BLOCK) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.encrypt_block(&mut block);
        token.extend_from_slice(&block);
    }
    token
}

/// Author-side convenience: derive the key and produce the token.
pub fn token(secret: &str, tx_id: &str) -> Vec<u8> {
    encrypt_id(&derive_key(secret, tx_id), tx_id)
}

/// Check a candidate key against a transaction's stored token. Returns
/// `false` for malformed tokens rather than erroring; a wrong-length token
/// can never decrypt to the id.
pub fn verify(tx_id: &str, gv_token: &[u8], key: &GvKey) -> bool {
    if gv_token.is_empty() || gv_token.len() != tx_id.len() || gv_token.len() % BLOCK != 0 {
        return false;
    }
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut plain = Vec::with_capacity(gv_token.len());
    for chunk in gv_token.chunks_exact(BLOCK) {
        let mut block = GenericArray::clone_from_slice(chunk);
        cipher.decrypt_block(&mut block);
        plain.extend_from_slice(&block);
    }
    plain == tx_id.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex_id() -> String {
        "a".repeat(64)
    }

    #[test]
    fn token_round_trips_with_derived_key() {
        let id = hex_id();
        let key = derive_key("password", &id);
        let tok = token("password", &id);
        assert!(verify(&id, &tok, &key));
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let id = hex_id();
        let tok = token("password", &id);
        let wrong = derive_key("hunter2", &id);
        assert!(!verify(&id, &tok, &wrong));
    }

    #[test]
    fn key_is_bound_to_the_id() {
        let id_a = hex_id();
        let id_b = "b".repeat(64);
        let tok_b = token("password", &id_b);
        // The key for id_a cannot authorise id_b.
        assert!(!verify(&id_b, &tok_b, &derive_key("password", &id_a)));
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        let id = hex_id();
        let key = derive_key("password", &id);
        assert!(!verify(&id, &[], &key));
        assert!(!verify(&id, &[0u8; 48], &key));
        assert!(!verify(&id, &[0u8; 63], &key));
    }

    #[test]
    fn token_is_deterministic() {
        let id = hex_id();
        assert_eq!(token("password", &id), token("password", &id));
    }
}
