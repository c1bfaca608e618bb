use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wire error: {0}")]
    Wire(#[from] mb_wire::WireError),

    #[error("transaction error: {0}")]
    Transaction(#[from] mb_transaction::TransactionError),
}
