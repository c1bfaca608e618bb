use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mb_miner::{Miner, MinerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Mutable blockchain miner daemon.
#[derive(Parser, Debug)]
#[command(
    name = "mb-miner",
    version,
    about = "Mutable blockchain miner",
    long_about = "Accepts signed transactions over TCP, batches them into \
                  Merkle-tree blocks, and periodically prunes or rewrites \
                  mined transactions according to their mutation policies."
)]
struct Cli {
    /// Expected number of transactions for a benchmark run. When set, the
    /// miner exits once they are mined and all cleaning has drained.
    expected_txs: Option<u64>,

    /// Address to listen on.
    #[arg(long, default_value = "127.0.0.1:10000", env = "MB_ADDR")]
    addr: String,

    /// Block store directory.
    #[arg(long, default_value = "mb-chain", env = "MB_DB")]
    db: PathBuf,

    /// Chain length after which cleaning uses a fixed interval and
    /// verification scans only the recent-blocks ring.
    #[arg(long, default_value_t = 1_000_000, env = "MB_BLOCK_CAP")]
    block_cap: u64,

    /// Capacity of the recent-blocks ring.
    #[arg(long, default_value_t = 1000, env = "MB_RING_SIZE")]
    ring_size: usize,

    /// Initial cleaning interval in seconds.
    #[arg(long, default_value_t = 20, env = "MB_CLEANING_INTERVAL")]
    cleaning_interval: u64,

    /// Fixed cleaning interval in seconds used past the block cap.
    #[arg(long, default_value_t = 10, env = "MB_POST_CAP_INTERVAL")]
    post_cap_interval: u64,

    /// Suppress log output to stderr.
    #[arg(short, long, default_value_t = false, env = "MB_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let log_filter = if cli.quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::from_default_env().add_directive("mb_miner=info".parse()?)
    };
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let config = MinerConfig {
        addr: cli.addr,
        db_path: cli.db,
        block_cap: cli.block_cap,
        ring_size: cli.ring_size,
        cleaning_interval: Duration::from_secs(cli.cleaning_interval),
        post_cap_interval: Duration::from_secs(cli.post_cap_interval),
        expected_txs: cli.expected_txs,
        ..MinerConfig::default()
    };

    let miner = Miner::bind(config).await?;
    info!(addr = %miner.local_addr()?, benchmark = ?cli.expected_txs, "miner listening");
    miner.run().await;

    Ok(())
}
