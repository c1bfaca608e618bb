use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Instant;

use mb_blockchain::BlockStore;
use mb_transaction::{gv, Keypair, Transaction, TxKind, FIRST_PREV_ID};
use rand::distributions::Alphanumeric;
use rand::Rng;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::{config::MinerConfig, error::MinerError};

/// Everything guarded by the chain lock: the tip, the block counter, the
/// recent-blocks ring, and the miner's own `prev_id` chain pointer. Sealing
/// a block mutates all of these in one critical section, which is the sole
/// source of chain linearity.
pub struct ChainState {
    pub tip_hash: String,
    pub blocks_created: u64,
    pub recent_blocks: VecDeque<String>,
    pub prev_tx: String,
}

/// One scheduled removal: purge `tx_id` from `block_hash` in the first
/// cleaning cycle at or after `due_ms` (Unix milliseconds; 0 = next cycle).
#[derive(Debug, Clone)]
pub struct RemovalEntry {
    pub block_hash: String,
    pub tx_id: String,
    pub due_ms: i64,
}

/// Double-buffered staging for user `remove`/`summarise` requests.
///
/// Ingress appends to `next`; each cleaning cycle consumes `current` and
/// promotes `next`. The one-cycle delay guarantees a request only gets
/// verified against a scan that started after all ingress preceding the
/// rotation was observed.
#[derive(Default)]
pub struct RequestSlots {
    current: Vec<Transaction>,
    next: Vec<Transaction>,
}

impl RequestSlots {
    pub fn push_next(&mut self, tx: Transaction) {
        self.next.push(tx);
    }

    /// Consume the current slot and promote the next one.
    pub fn rotate(&mut self) -> Vec<Transaction> {
        std::mem::replace(&mut self.current, std::mem::take(&mut self.next))
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty() && self.next.is_empty()
    }
}

/// Shared miner state. Locks follow the discipline of the concurrency
/// model: held only for in-memory mutation, never across I/O or `.await`;
/// where nested, `chain` is taken before `to_remove`/`to_summarise`.
pub struct MinerState {
    pub config: MinerConfig,
    pub store: BlockStore,

    /// Ingress queue of mineable transactions, in arrival order.
    pub queue: Mutex<VecDeque<Transaction>>,
    /// Signalled on every enqueue; the assembly loop waits on it.
    pub queue_notify: Notify,

    pub chain: Mutex<ChainState>,
    pub to_remove: Mutex<Vec<RemovalEntry>>,
    /// Miner-summarisable tx ids, grouped by the block that holds them.
    pub to_summarise: Mutex<HashMap<String, Vec<String>>>,
    pub user_requests: Mutex<RequestSlots>,
    /// Cleaning tasks currently running, pruned opportunistically.
    pub tasks: Mutex<Vec<JoinHandle<()>>>,

    /// `hex(sha256(pem)) → pem` for every key seen in a handshake.
    pub pub_keys: Mutex<HashMap<String, Vec<u8>>>,

    keys: Keypair,
    gv_secret: String,

    /// Instant of the first transaction received; benchmark timer origin.
    pub first_ingress: OnceLock<Instant>,
}

impl MinerState {
    pub fn new(config: MinerConfig) -> Result<Arc<Self>, MinerError> {
        let (store, tip_hash, blocks_created) = BlockStore::open(&config.db_path)?;
        let keys = Keypair::generate()?;

        let mut pub_keys = HashMap::new();
        pub_keys.insert(
            keys.pub_key_hash().to_owned(),
            keys.public_pem().as_bytes().to_vec(),
        );

        let gv_secret: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        Ok(Arc::new(Self {
            config,
            store,
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
            chain: Mutex::new(ChainState {
                tip_hash,
                blocks_created,
                recent_blocks: VecDeque::new(),
                prev_tx: FIRST_PREV_ID.to_owned(),
            }),
            to_remove: Mutex::new(Vec::new()),
            to_summarise: Mutex::new(HashMap::new()),
            user_requests: Mutex::new(RequestSlots::default()),
            tasks: Mutex::new(Vec::new()),
            pub_keys: Mutex::new(pub_keys),
            keys,
            gv_secret,
            first_ingress: OnceLock::new(),
        }))
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Append a mineable transaction and wake the assembly loop.
    pub fn enqueue(&self, tx: Transaction) {
        self.queue.lock().unwrap().push_back(tx);
        self.queue_notify.notify_one();
    }

    /// Create a transaction authored by the miner itself (summaries,
    /// benchmark filler), signed and GV-tagged like any client's. The
    /// miner's `prev_tx` pointer advances under the chain lock.
    pub fn author_tx(
        &self,
        input: impl Into<String>,
        output: impl Into<String>,
        kind: TxKind,
    ) -> Transaction {
        let mut chain = self.chain.lock().unwrap();
        let mut tx = Transaction::new(
            chain.prev_tx.clone(),
            input,
            output,
            self.keys.pub_key_hash(),
            kind,
        );
        tx.set_gv(gv::token(&self.gv_secret, &tx.id));
        let sig = self.keys.sign(&tx);
        tx.set_signature(sig);
        chain.prev_tx = tx.id.clone();
        tx
    }

    /// Drop finished entries from the running-task list.
    pub fn prune_tasks(&self) {
        self.tasks.lock().unwrap().retain(|task| !task.is_finished());
    }

    pub fn has_running_tasks(&self) -> bool {
        self.tasks.lock().unwrap().iter().any(|t| !t.is_finished())
    }
}
