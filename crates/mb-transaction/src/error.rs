use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed public key")]
    InvalidKey,

    #[error("key generation failed: {0}")]
    KeyGen(String),
}
