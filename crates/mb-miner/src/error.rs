use thiserror::Error;

#[derive(Debug, Error)]
pub enum MinerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] mb_blockchain::StoreError),

    #[error("transaction error: {0}")]
    Transaction(#[from] mb_transaction::TransactionError),
}
