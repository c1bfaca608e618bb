use std::path::Path;

use tracing::warn;

use crate::{block::Block, error::StoreError};

const LAST_KEY: &[u8] = b"last";

/// The persisted chain head: last block hash plus the running block counter.
type LastEntry = (String, u64);

/// Byte map over `block_hash → serialised block`, plus the single
/// [`LAST_KEY`] pointer. Atomic batches are the only durability unit: a
/// block and the updated head are written together or not at all.
pub struct BlockStore {
    db: sled::Db,
}

impl BlockStore {
    /// Open (or create) the store at `path`.
    ///
    /// An existing store yields its recovered `(tip_hash, blocks_created)`
    /// head. A fresh store is initialised with an empty genesis block whose
    /// `prev_block_hash` is the chain root sentinel.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, String, u64), StoreError> {
        let db = sled::open(path)?;
        let store = Self { db };

        if let Some(bytes) = store.db.get(LAST_KEY)? {
            let (tip_hash, blocks_created): LastEntry = bincode::deserialize(&bytes)?;
            return Ok((store, tip_hash, blocks_created));
        }

        let mut genesis = Block::new(Vec::new());
        genesis.seal();
        let tip_hash = genesis.hash().to_owned();
        store.put_block(&genesis, 0)?;
        Ok((store, tip_hash, 0))
    }

    /// Atomically write `block` and advance the head pointer.
    pub fn put_block(&self, block: &Block, blocks_created: u64) -> Result<(), StoreError> {
        let bytes = bincode::serialize(block)?;
        let last: LastEntry = (block.hash().to_owned(), blocks_created);
        let mut batch = sled::Batch::default();
        batch.insert(block.hash().as_bytes(), bytes);
        batch.insert(LAST_KEY, bincode::serialize(&last)?);
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Rewrite a mutated block in place without touching the head pointer.
    /// A failed write is retried once before the error surfaces.
    pub fn update_block(&self, block: &Block) -> Result<(), StoreError> {
        let bytes = bincode::serialize(block)?;
        if let Err(first) = self.db.insert(block.hash().as_bytes(), bytes.clone()) {
            warn!(block = block.hash(), error = %first, "block rewrite failed, retrying");
            self.db.insert(block.hash().as_bytes(), bytes)?;
        }
        Ok(())
    }

    pub fn get_block(&self, block_hash: &str) -> Result<Option<Block>, StoreError> {
        match self.db.get(block_hash.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterate every stored block, excluding the head pointer. Undecodable
    /// entries surface as errors so callers can skip them and continue.
    pub fn scan(&self) -> impl Iterator<Item = Result<(String, Block), StoreError>> + '_ {
        self.db
            .iter()
            .filter(|entry| !matches!(entry, Ok((key, _)) if key.as_ref() == LAST_KEY))
            .map(|entry| {
                let (key, value) = entry?;
                let block: Block = bincode::deserialize(&value)?;
                Ok((String::from_utf8_lossy(&key).into_owned(), block))
            })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_transaction::{Transaction, TxKind, FIRST_PREV_ID};

    fn txs(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| {
                Transaction::new(
                    FIRST_PREV_ID,
                    format!("i{i}"),
                    format!("o{i}"),
                    "feed",
                    TxKind::Perm,
                )
            })
            .collect()
    }

    fn sealed(txs: Vec<Transaction>, prev: &str) -> Block {
        let mut block = Block::new(txs);
        block.set_prev(prev);
        block.seal();
        block
    }

    #[test]
    fn fresh_store_creates_a_genesis_block() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tip, count) = BlockStore::open(dir.path()).unwrap();
        assert_eq!(count, 0);

        let genesis = store.get_block(&tip).unwrap().unwrap();
        assert_eq!(genesis.prev_block_hash, crate::CHAIN_ROOT);
        assert!(genesis.txs().is_empty());
    }

    #[test]
    fn blocks_round_trip_identically() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tip, _) = BlockStore::open(dir.path()).unwrap();

        let block = sealed(txs(5), &tip);
        store.put_block(&block, 1).unwrap();

        let reloaded = store.get_block(block.hash()).unwrap().unwrap();
        assert_eq!(reloaded.hash(), block.hash());
        assert_eq!(reloaded.root_digest(), block.root_digest());
        assert_eq!(
            reloaded.txs().into_iter().cloned().collect::<Vec<_>>(),
            block.txs().into_iter().cloned().collect::<Vec<_>>(),
        );
    }

    #[test]
    fn reopening_recovers_the_head() {
        let dir = tempfile::tempdir().unwrap();
        let block = {
            let (store, tip, _) = BlockStore::open(dir.path()).unwrap();
            let block = sealed(txs(3), &tip);
            store.put_block(&block, 7).unwrap();
            store.flush().unwrap();
            block
        };

        let (_store, tip, count) = BlockStore::open(dir.path()).unwrap();
        assert_eq!(tip, block.hash());
        assert_eq!(count, 7);
    }

    #[test]
    fn scan_excludes_the_head_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tip, _) = BlockStore::open(dir.path()).unwrap();
        store.put_block(&sealed(txs(2), &tip), 1).unwrap();

        let blocks: Vec<_> = store.scan().collect::<Result<_, _>>().unwrap();
        assert_eq!(blocks.len(), 2, "genesis plus one");
        assert!(blocks.iter().all(|(hash, block)| hash == block.hash()));
    }

    #[test]
    fn update_block_persists_pruning() {
        let dir = tempfile::tempdir().unwrap();
        let (store, tip, _) = BlockStore::open(dir.path()).unwrap();

        let mut block = sealed(txs(4), &tip);
        store.put_block(&block, 1).unwrap();

        let victim = block.ids()[0].clone();
        assert!(block.remove(&victim));
        store.update_block(&block).unwrap();

        let reloaded = store.get_block(block.hash()).unwrap().unwrap();
        assert!(!reloaded.ids().contains(&victim));
        assert_eq!(reloaded.hash(), block.hash());
    }
}
