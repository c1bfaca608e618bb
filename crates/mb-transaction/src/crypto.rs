use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::sha2::Sha256;
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Digest;

use crate::{error::TransactionError, transaction::Transaction};

/// RSA modulus size used by all participants.
pub const KEY_BITS: usize = 1024;

/// Lowercase-hex SHA-256 of a PEM-encoded public key; the table key the
/// miner files the key under and the `pub_key_hash` authors put on their
/// transactions.
pub fn hash_pub_key(pem: &[u8]) -> String {
    hex::encode(sha2::Sha256::digest(pem))
}

/// An author identity: RSA keypair plus the derived table hash.
pub struct Keypair {
    signing_key: SigningKey<Sha256>,
    public_pem: String,
    pub_key_hash: String,
}

impl Keypair {
    pub fn generate() -> Result<Self, TransactionError> {
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new(&mut rng, KEY_BITS)
            .map_err(|e| TransactionError::KeyGen(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        let public_pem = public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| TransactionError::KeyGen(e.to_string()))?;
        let pub_key_hash = hash_pub_key(public_pem.as_bytes());
        Ok(Self {
            signing_key: SigningKey::<Sha256>::new(private),
            public_pem,
            pub_key_hash,
        })
    }

    /// PEM form of the public key, as sent in the connection handshake.
    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn pub_key_hash(&self) -> &str {
        &self.pub_key_hash
    }

    /// Sign a transaction's preimage. The caller attaches the result with
    /// [`Transaction::set_signature`]; the GV token must already be set.
    pub fn sign(&self, tx: &Transaction) -> Vec<u8> {
        self.signing_key.sign(&tx.signing_preimage()).to_vec()
    }
}

/// Verify a transaction signature against a PEM public key from the key
/// table.
pub fn verify_signature(tx: &Transaction, pub_key_pem: &[u8]) -> Result<(), TransactionError> {
    let pem = std::str::from_utf8(pub_key_pem).map_err(|_| TransactionError::InvalidKey)?;
    let public = RsaPublicKey::from_public_key_pem(pem).map_err(|_| TransactionError::InvalidKey)?;
    let verifying_key = VerifyingKey::<Sha256>::new(public);
    let sig =
        Signature::try_from(tx.sig.as_slice()).map_err(|_| TransactionError::InvalidSignature)?;
    verifying_key
        .verify(&tx.signing_preimage(), &sig)
        .map_err(|_| TransactionError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{kind::TxKind, transaction::FIRST_PREV_ID};

    fn signed_tx(keys: &Keypair) -> Transaction {
        let mut tx = Transaction::new(
            FIRST_PREV_ID,
            "00",
            "01",
            keys.pub_key_hash(),
            TxKind::Perm,
        );
        tx.set_gv(crate::gv::token("secret", &tx.id));
        let sig = keys.sign(&tx);
        tx.set_signature(sig);
        tx
    }

    #[test]
    fn signature_round_trips() {
        let keys = Keypair::generate().unwrap();
        let tx = signed_tx(&keys);
        verify_signature(&tx, keys.public_pem().as_bytes()).unwrap();
    }

    #[test]
    fn tampered_content_fails_verification() {
        let keys = Keypair::generate().unwrap();
        let mut tx = signed_tx(&keys);
        tx.output = "02".to_owned();
        assert!(verify_signature(&tx, keys.public_pem().as_bytes()).is_err());
    }

    #[test]
    fn swapped_gv_token_fails_verification() {
        let keys = Keypair::generate().unwrap();
        let mut tx = signed_tx(&keys);
        tx.set_gv(crate::gv::token("other-secret", &tx.id));
        assert!(verify_signature(&tx, keys.public_pem().as_bytes()).is_err());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let keys = Keypair::generate().unwrap();
        let other = Keypair::generate().unwrap();
        let tx = signed_tx(&keys);
        assert!(verify_signature(&tx, other.public_pem().as_bytes()).is_err());
    }

    #[test]
    fn garbage_pem_is_rejected() {
        let keys = Keypair::generate().unwrap();
        let tx = signed_tx(&keys);
        assert!(matches!(
            verify_signature(&tx, b"not a pem"),
            Err(TransactionError::InvalidKey)
        ));
    }
}
