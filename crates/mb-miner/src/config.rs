use std::path::PathBuf;
use std::time::Duration;

/// Full configuration for a [`crate::Miner`].
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Address to listen on. Defaults to `127.0.0.1:10000`; port 0 lets the
    /// OS pick (useful in tests).
    pub addr: String,

    /// Block store location.
    pub db_path: PathBuf,

    /// Transactions per block.
    pub tx_per_block: usize,

    /// Upper bound on concurrent block-assembly workers.
    pub max_workers: usize,

    /// Soft bound on the ingress queue; listeners stall reads above it
    /// rather than dropping transactions.
    pub queue_cap: usize,

    /// Chain length at which cleaning switches to a fixed interval and
    /// user-request verification switches to the recent-blocks ring.
    pub block_cap: u64,

    /// Capacity of the recent-blocks ring. A larger ring keeps the fixed
    /// cleaning interval honest for longer but costs more per scan.
    pub ring_size: usize,

    /// Initial cleaning interval.
    pub cleaning_interval: Duration,

    /// Fixed cleaning interval used once the chain exceeds `block_cap`.
    pub post_cap_interval: Duration,

    /// Chain length past which the cleaning interval starts growing.
    pub interval_growth_block_limit: u64,

    /// Seconds of interval growth per `interval_growth_block_limit` blocks.
    pub interval_growth_increment: u64,

    /// Expected transaction count for a benchmark run. `None` serves
    /// indefinitely; `Some(n)` arms the quiescence watchdog that pads the
    /// final block and exits once all bookkeeping drains.
    pub expected_txs: Option<u64>,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:10000".to_owned(),
            db_path: PathBuf::from("mb-chain"),
            tx_per_block: 10,
            max_workers: 5,
            queue_cap: 1_000_000,
            block_cap: 1_000_000,
            ring_size: 1000,
            cleaning_interval: Duration::from_secs(20),
            post_cap_interval: Duration::from_secs(10),
            interval_growth_block_limit: 10_000,
            interval_growth_increment: 20,
            expected_txs: None,
        }
    }
}

impl MinerConfig {
    /// Config rooted at a specific store path, everything else default.
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}
