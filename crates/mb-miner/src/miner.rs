use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mb_transaction::TxKind;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::{
    assembly, cleaner, config::MinerConfig, error::MinerError, ingress, state::MinerState,
};

/// The miner service: one listener, one assembly pipeline, one cleaning
/// scheduler, all over shared [`MinerState`].
pub struct Miner {
    state: Arc<MinerState>,
    listener: TcpListener,
}

impl Miner {
    /// Bind the ingress socket and open (or create) the block store.
    pub async fn bind(config: MinerConfig) -> Result<Self, MinerError> {
        let listener = TcpListener::bind(&config.addr).await?;
        let state = MinerState::new(config)?;
        Ok(Self { state, listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, MinerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared state handle, e.g. for inspecting the chain in tests.
    pub fn state(&self) -> Arc<MinerState> {
        self.state.clone()
    }

    /// Run until killed. In benchmark mode the quiescence watchdog ends the
    /// process once the expected transactions are mined and all bookkeeping
    /// has drained.
    pub async fn run(self) {
        let Self { state, listener } = self;

        tokio::spawn(ingress::run_listener(state.clone(), listener));
        tokio::spawn(assembly::run_assembly(state.clone()));
        let cleaning = tokio::spawn(cleaner::run_cleaner(state.clone()));

        if let Some(expected) = state.config.expected_txs {
            tokio::spawn(run_watchdog(state, expected));
        }

        // The control loops never return; park on one of them.
        let _ = cleaning.await;
    }
}

/// Benchmark-mode quiescence watch: wait for the expected block count, then
/// poll until nothing is pending anywhere, padding a final partial block
/// with miner-authored filler so every received transaction gets mined.
async fn run_watchdog(state: Arc<MinerState>, expected_txs: u64) {
    let poll = Duration::from_secs(5);
    let target_blocks = expected_txs / state.config.tx_per_block as u64;

    loop {
        tokio::time::sleep(poll).await;
        if state.chain.lock().unwrap().blocks_created >= target_blocks {
            break;
        }
    }
    info!(target_blocks, "benchmark target reached, watching for quiescence");

    let mut last_len = usize::MAX;
    let mut stalls = 0u32;
    loop {
        tokio::time::sleep(poll).await;
        state.prune_tasks();

        let queue_len = state.queue_len();
        let quiet = state.to_remove.lock().unwrap().is_empty()
            && state.to_summarise.lock().unwrap().is_empty()
            && state.user_requests.lock().unwrap().is_empty()
            && !state.has_running_tasks()
            && (queue_len == 0 || stalls > 5);

        if quiet {
            if queue_len > 0 {
                pad_final_block(&state, queue_len);
                tokio::time::sleep(poll).await;
            }
            match state.first_ingress.get() {
                Some(start) => {
                    info!(total_secs = start.elapsed().as_secs_f64(), "benchmark complete")
                }
                None => info!("benchmark complete (no transactions received)"),
            }
            if let Err(e) = state.store.flush() {
                warn!(error = %e, "store flush failed on shutdown");
            }
            std::process::exit(0);
        }

        if queue_len == last_len {
            stalls += 1;
        } else {
            last_len = queue_len;
            stalls = 0;
        }
    }
}

/// Top the queue up to a whole block with filler transactions.
fn pad_final_block(state: &MinerState, queue_len: usize) {
    let per_block = state.config.tx_per_block;
    let missing = (per_block - queue_len % per_block) % per_block;
    info!(missing, "padding final block with filler transactions");
    for _ in 0..missing {
        let filler = state.author_tx("filler", "filler", TxKind::Perm);
        state.enqueue(filler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miner_binds_an_ephemeral_port() {
        let dir = tempfile::tempdir().unwrap();
        let config = MinerConfig {
            addr: "127.0.0.1:0".to_owned(),
            ..MinerConfig::at(dir.path().join("db"))
        };
        let miner = Miner::bind(config).await.unwrap();
        assert_ne!(miner.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn padding_fills_to_a_whole_block() {
        let dir = tempfile::tempdir().unwrap();
        let config = MinerConfig {
            addr: "127.0.0.1:0".to_owned(),
            ..MinerConfig::at(dir.path().join("db"))
        };
        let miner = Miner::bind(config).await.unwrap();
        let state = miner.state();

        for _ in 0..3 {
            state.enqueue(state.author_tx("a", "b", TxKind::Perm));
        }
        pad_final_block(&state, 3);
        assert_eq!(state.queue_len(), 10);
    }
}
