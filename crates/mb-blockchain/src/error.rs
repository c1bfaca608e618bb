use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store error: {0}")]
    Db(#[from] sled::Error),

    #[error("serialisation error: {0}")]
    Codec(#[from] bincode::Error),
}
