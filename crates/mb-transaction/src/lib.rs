pub mod crypto;
pub mod error;
pub mod gv;
pub mod kind;
pub mod transaction;

pub use crypto::{hash_pub_key, verify_signature, Keypair};
pub use error::TransactionError;
pub use kind::TxKind;
pub use transaction::{Transaction, FIRST_PREV_ID};
