use std::sync::Arc;

use chrono::Utc;
use mb_blockchain::Block;
use mb_transaction::{Transaction, TxKind};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::state::{MinerState, RemovalEntry};

/// Drain the ingress queue into blocks, forever.
///
/// Each round takes as many whole batches as are queued (capped at
/// `max_workers`) and seals them on parallel blocking workers. Merkle
/// construction runs without any lock; only the seal-and-persist step is
/// serialised by the chain lock, so the order workers reach it, not batch
/// order, decides chain order. Rounds do not overlap.
pub async fn run_assembly(state: Arc<MinerState>) {
    loop {
        let batches = take_batches(&state);
        if batches.is_empty() {
            state.queue_notify.notified().await;
            continue;
        }

        let mut workers = JoinSet::new();
        for batch in batches {
            let state = state.clone();
            workers.spawn_blocking(move || seal_batch(&state, batch));
        }
        while workers.join_next().await.is_some() {}
    }
}

/// Pop the longest whole-batch prefix of the queue, preserving arrival
/// order within and across batches.
fn take_batches(state: &MinerState) -> Vec<Vec<Transaction>> {
    let per_block = state.config.tx_per_block;
    let mut queue = state.queue.lock().unwrap();
    let rounds = (queue.len() / per_block).min(state.config.max_workers);
    (0..rounds)
        .map(|_| queue.drain(..per_block).collect())
        .collect()
}

/// Build, chain, seal, persist and classify one block.
pub fn seal_batch(state: &MinerState, batch: Vec<Transaction>) {
    let now_ms = Utc::now().timestamp_millis();
    let expiring: Vec<(String, i64)> = batch
        .iter()
        .filter_map(|tx| match tx.kind {
            TxKind::Temp { ttl_secs } => Some((tx.id.clone(), now_ms + ttl_secs as i64 * 1000)),
            _ => None,
        })
        .collect();
    let summarisable: Vec<String> = batch
        .iter()
        .filter(|tx| matches!(tx.kind, TxKind::Summ))
        .map(|tx| tx.id.clone())
        .collect();

    // Merkle construction is the expensive part; keep it outside the lock.
    let mut block = Block::new(batch);

    let mut chain = state.chain.lock().unwrap();
    block.set_prev(&chain.tip_hash);
    block.seal();
    let block_hash = block.hash().to_owned();

    chain.tip_hash = block_hash.clone();
    chain.blocks_created += 1;
    chain.recent_blocks.push_back(block_hash.clone());
    while chain.recent_blocks.len() > state.config.ring_size {
        chain.recent_blocks.pop_front();
    }
    let height = chain.blocks_created;

    if let Err(e) = state.store.put_block(&block, height) {
        error!(block = %block_hash, error = %e, "failed to persist block");
    }

    if !expiring.is_empty() {
        let mut to_remove = state.to_remove.lock().unwrap();
        to_remove.extend(expiring.into_iter().map(|(tx_id, due_ms)| RemovalEntry {
            block_hash: block_hash.clone(),
            tx_id,
            due_ms,
        }));
    }
    if !summarisable.is_empty() {
        state
            .to_summarise
            .lock()
            .unwrap()
            .entry(block_hash.clone())
            .or_default()
            .extend(summarisable);
    }
    drop(chain);

    info!(block = %block_hash, height, "sealed block");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinerConfig;
    use mb_transaction::FIRST_PREV_ID;

    fn test_state() -> (Arc<MinerState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = MinerState::new(MinerConfig::at(dir.path().join("db"))).unwrap();
        (state, dir)
    }

    fn tx(n: usize, kind: TxKind) -> Transaction {
        Transaction::new(FIRST_PREV_ID, format!("i{n}"), format!("o{n}"), "ab", kind)
    }

    #[test]
    fn take_batches_pops_whole_batches_only() {
        let (state, _dir) = test_state();
        for i in 0..27 {
            state.enqueue(tx(i, TxKind::Perm));
        }

        let batches = take_batches(&state);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 10));
        assert_eq!(state.queue_len(), 7, "partial batch stays queued");
    }

    #[test]
    fn take_batches_is_capped_at_max_workers() {
        let (state, _dir) = test_state();
        for i in 0..80 {
            state.enqueue(tx(i, TxKind::Perm));
        }
        assert_eq!(take_batches(&state).len(), 5);
        assert_eq!(state.queue_len(), 30);
    }

    #[test]
    fn sealing_extends_the_chain_and_persists() {
        let (state, _dir) = test_state();
        let genesis_hash = state.chain.lock().unwrap().tip_hash.clone();

        seal_batch(&state, (0..10).map(|i| tx(i, TxKind::Perm)).collect());

        let chain = state.chain.lock().unwrap();
        assert_eq!(chain.blocks_created, 1);
        assert_ne!(chain.tip_hash, genesis_hash);
        assert_eq!(chain.recent_blocks.len(), 1);

        let block = state.store.get_block(&chain.tip_hash).unwrap().unwrap();
        assert_eq!(block.prev_block_hash, genesis_hash);
        assert_eq!(block.txs().len(), 10);
    }

    #[test]
    fn sealing_classifies_temp_and_summ_txs() {
        let (state, _dir) = test_state();
        let batch = vec![
            tx(0, TxKind::Temp { ttl_secs: 60 }),
            tx(1, TxKind::Summ),
            tx(2, TxKind::Perm),
        ];
        let temp_id = batch[0].id.clone();
        let summ_id = batch[1].id.clone();

        seal_batch(&state, batch);

        let tip = state.chain.lock().unwrap().tip_hash.clone();
        let to_remove = state.to_remove.lock().unwrap();
        assert_eq!(to_remove.len(), 1);
        assert_eq!(to_remove[0].tx_id, temp_id);
        assert_eq!(to_remove[0].block_hash, tip);
        assert!(to_remove[0].due_ms > Utc::now().timestamp_millis());

        let to_summarise = state.to_summarise.lock().unwrap();
        assert_eq!(to_summarise.get(&tip).unwrap(), &vec![summ_id]);
    }
}
