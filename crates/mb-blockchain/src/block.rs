use chrono::Utc;
use mb_merkle::{BlockTree, OwnershipClaim};
use mb_transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// `prev_block_hash` sentinel of the genesis block.
pub const CHAIN_ROOT: &str = "root";

/// A sealed container of transactions.
///
/// `block_hash` commits to the previous block's hash, the Merkle root digest
/// at creation time, and the miner-side timestamp. Because the root digest
/// is frozen when the tree is built, later pruning of the tree does not
/// invalidate the hash chain: the block's identity deliberately survives
/// lawful content redaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Hex hash of the preceding block, or [`CHAIN_ROOT`] for genesis.
    pub prev_block_hash: String,

    /// Miner-side Unix milliseconds at creation.
    pub ts: i64,

    tree: BlockTree,

    /// Hex block hash, set once by [`Block::seal`].
    block_hash: String,
}

impl Block {
    /// Create an unsealed block over `txs`. The Merkle tree (and thus the
    /// root digest) is fixed here; chaining happens later under the chain
    /// lock via [`Block::set_prev`] and [`Block::seal`].
    pub fn new(txs: Vec<Transaction>) -> Self {
        Self {
            prev_block_hash: CHAIN_ROOT.to_owned(),
            ts: Utc::now().timestamp_millis(),
            tree: BlockTree::build(txs),
            block_hash: String::new(),
        }
    }

    pub fn set_prev(&mut self, prev_block_hash: &str) {
        self.prev_block_hash = prev_block_hash.to_owned();
    }

    /// Compute and set the block hash:
    /// `SHA256(prev_block_hash || merkle_root_digest || ts)`.
    pub fn seal(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update(self.prev_block_hash.as_bytes());
        hasher.update(self.tree.root_digest().as_bytes());
        hasher.update(self.ts.to_string().as_bytes());
        self.block_hash = hex::encode(hasher.finalize());
    }

    pub fn hash(&self) -> &str {
        &self.block_hash
    }

    /// The Merkle root digest frozen at creation.
    pub fn root_digest(&self) -> &str {
        self.tree.root_digest()
    }

    pub fn txs(&self) -> Vec<&Transaction> {
        self.tree.txs()
    }

    pub fn ids(&self) -> Vec<String> {
        self.tree.ids()
    }

    pub fn get(&self, tx_id: &str) -> Option<&Transaction> {
        self.tree.get(tx_id)
    }

    pub fn remove(&mut self, tx_id: &str) -> bool {
        self.tree.remove(tx_id)
    }

    pub fn remove_many(&mut self, tx_ids: &[String]) -> bool {
        self.tree.remove_many(tx_ids)
    }

    /// Scan this block's transactions against pending ownership claims,
    /// using this block's hash as the witness location.
    pub fn scan_claims(&self, claims: &mut [OwnershipClaim]) {
        self.tree.scan_claims(claims, &self.block_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_transaction::{TxKind, FIRST_PREV_ID};

    fn txs(n: usize) -> Vec<Transaction> {
        (0..n)
            .map(|i| {
                Transaction::new(
                    FIRST_PREV_ID,
                    format!("in-{i}"),
                    format!("out-{i}"),
                    "beef",
                    TxKind::Perm,
                )
            })
            .collect()
    }

    #[test]
    fn seal_commits_prev_root_and_timestamp() {
        let mut block = Block::new(txs(4));
        block.set_prev("aabb");
        block.seal();

        let mut hasher = Sha256::new();
        hasher.update(b"aabb");
        hasher.update(block.root_digest().as_bytes());
        hasher.update(block.ts.to_string().as_bytes());
        assert_eq!(block.hash(), hex::encode(hasher.finalize()));
    }

    #[test]
    fn empty_block_seals_over_the_sentinel_root() {
        let mut genesis = Block::new(Vec::new());
        genesis.seal();
        assert_eq!(genesis.prev_block_hash, CHAIN_ROOT);
        assert_eq!(genesis.root_digest(), "root");
        assert!(!genesis.hash().is_empty());
    }

    #[test]
    fn mutation_does_not_change_the_block_hash() {
        let input = txs(6);
        let victims: Vec<String> = input.iter().take(3).map(|t| t.id.clone()).collect();
        let mut block = Block::new(input);
        block.set_prev("cc");
        block.seal();
        let hash = block.hash().to_owned();
        let root = block.root_digest().to_owned();

        assert!(block.remove_many(&victims));
        assert_eq!(block.hash(), hash);
        assert_eq!(block.root_digest(), root);
        assert_eq!(block.txs().len(), 3);
    }
}
