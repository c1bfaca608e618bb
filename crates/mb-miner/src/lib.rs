pub mod assembly;
pub mod cleaner;
pub mod config;
pub mod error;
pub mod ingress;
pub mod miner;
pub mod state;

pub use config::MinerConfig;
pub use error::MinerError;
pub use miner::Miner;
pub use state::MinerState;
