pub mod block;
pub mod error;
pub mod store;

pub use block::{Block, CHAIN_ROOT};
pub use error::StoreError;
pub use store::BlockStore;
