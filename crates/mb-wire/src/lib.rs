pub mod error;
pub mod frame;

pub use error::WireError;
pub use frame::{read_pub_key, read_tx, write_pub_key, write_tx};
