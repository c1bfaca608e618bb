use std::sync::Arc;
use std::time::Duration;

use mb_transaction::{hash_pub_key, verify_signature, Transaction, TxKind};
use mb_wire::{read_pub_key, read_tx};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::state::MinerState;

/// Pause between queue-capacity checks while the listener is stalled.
const BACKPRESSURE_PAUSE: Duration = Duration::from_millis(50);

/// Accept client connections forever, one listener task per connection.
pub async fn run_listener(state: Arc<MinerState>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!(%addr, "client connected");
                tokio::spawn(handle_conn(state.clone(), stream));
            }
            Err(e) => warn!(error = %e, "accept failed"),
        }
    }
}

/// One connection's lifetime: public-key handshake, then transaction frames
/// until the peer goes away. All errors are local; the miner never answers
/// on the wire, and an invalid transaction is simply dropped.
async fn handle_conn(state: Arc<MinerState>, mut stream: TcpStream) {
    let pem = match read_pub_key(&mut stream).await {
        Ok(pem) => pem,
        Err(e) => {
            debug!(error = %e, "handshake failed");
            return;
        }
    };
    let key_hash = hash_pub_key(&pem);
    state.pub_keys.lock().unwrap().insert(key_hash, pem);

    loop {
        // Backpressure: stall the socket rather than dropping transactions.
        while state.queue_len() >= state.config.queue_cap {
            tokio::time::sleep(BACKPRESSURE_PAUSE).await;
        }

        let tx = match read_tx(&mut stream).await {
            Ok(tx) => tx,
            Err(e) if e.is_disconnect() => {
                debug!("client disconnected");
                return;
            }
            Err(e) => {
                debug!(error = %e, "closing connection");
                return;
            }
        };

        state.first_ingress.get_or_init(std::time::Instant::now);

        if !signature_ok(&state, &tx) {
            debug!(tx = %tx.id, "dropping transaction with bad signature");
            continue;
        }
        classify(&state, tx);
    }
}

fn signature_ok(state: &MinerState, tx: &Transaction) -> bool {
    let pem = {
        let keys = state.pub_keys.lock().unwrap();
        keys.get(&tx.pub_key_hash).cloned()
    };
    match pem {
        Some(pem) => verify_signature(tx, &pem).is_ok(),
        None => false,
    }
}

/// Route a verified transaction: mineable kinds join the ingress queue,
/// user requests go to the next-cycle slot, anything else is dropped.
fn classify(state: &MinerState, tx: Transaction) {
    match tx.kind {
        TxKind::Perm | TxKind::Temp { .. } | TxKind::Summ => state.enqueue(tx),
        TxKind::Remove { .. } | TxKind::Summarise { .. } => {
            state.user_requests.lock().unwrap().push_next(tx)
        }
        // Only the miner itself mints these.
        TxKind::Summarised => debug!(tx = %tx.id, "dropping client-sent summarised tx"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MinerConfig;
    use mb_summary::SummaryTree;
    use mb_transaction::{Keypair, FIRST_PREV_ID};

    fn test_state() -> (Arc<MinerState>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let state = MinerState::new(MinerConfig::at(dir.path().join("db"))).unwrap();
        (state, dir)
    }

    fn signed(keys: &Keypair, kind: TxKind) -> Transaction {
        let mut tx = Transaction::new(FIRST_PREV_ID, "a", "b", keys.pub_key_hash(), kind);
        let sig = keys.sign(&tx);
        tx.set_signature(sig);
        tx
    }

    #[test]
    fn unknown_key_hash_fails_verification() {
        let (state, _dir) = test_state();
        let keys = Keypair::generate().unwrap();
        let tx = signed(&keys, TxKind::Perm);
        assert!(!signature_ok(&state, &tx));
    }

    #[test]
    fn known_key_verifies() {
        let (state, _dir) = test_state();
        let keys = Keypair::generate().unwrap();
        state.pub_keys.lock().unwrap().insert(
            keys.pub_key_hash().to_owned(),
            keys.public_pem().as_bytes().to_vec(),
        );
        let tx = signed(&keys, TxKind::Perm);
        assert!(signature_ok(&state, &tx));
    }

    #[test]
    fn mineable_kinds_join_the_queue() {
        let (state, _dir) = test_state();
        let keys = Keypair::generate().unwrap();
        classify(&state, signed(&keys, TxKind::Perm));
        classify(&state, signed(&keys, TxKind::Temp { ttl_secs: 5 }));
        classify(&state, signed(&keys, TxKind::Summ));
        assert_eq!(state.queue_len(), 3);
        assert!(state.user_requests.lock().unwrap().is_empty());
    }

    #[test]
    fn user_requests_go_to_the_next_slot() {
        let (state, _dir) = test_state();
        let keys = Keypair::generate().unwrap();
        classify(
            &state,
            signed(
                &keys,
                TxKind::Remove {
                    gv_list: vec![[0u8; 32]],
                    tx_tree: SummaryTree::new(&["x".repeat(64)]),
                },
            ),
        );
        assert_eq!(state.queue_len(), 0);
        assert!(!state.user_requests.lock().unwrap().is_empty());
    }

    #[test]
    fn client_summarised_is_dropped() {
        let (state, _dir) = test_state();
        let keys = Keypair::generate().unwrap();
        classify(&state, signed(&keys, TxKind::Summarised));
        assert_eq!(state.queue_len(), 0);
        assert!(state.user_requests.lock().unwrap().is_empty());
    }
}
