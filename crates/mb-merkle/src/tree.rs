use std::collections::HashSet;

use mb_summary::EMPTY_ROOT;
use mb_transaction::Transaction;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::claim::OwnershipClaim;

/// Children of a [`TreeNode`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Children {
    /// A leaf parent holding exactly one transaction.
    Leaf(Box<Transaction>),
    Inner(Vec<TreeNode>),
    /// Cleared by removal or cleaning; contributes nothing on traversal.
    Pruned,
}

/// A node in the block tree. `data` is the digest frozen at construction:
/// the transaction id for leaf parents, the hex SHA-256 of the children's
/// concatenated `data` for internal nodes. It is never recomputed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    data: String,
    children: Children,
}

impl TreeNode {
    fn leaf_parent(tx: Transaction) -> Self {
        Self {
            data: tx.id.clone(),
            children: Children::Leaf(Box::new(tx)),
        }
    }

    fn parent(children: Vec<TreeNode>) -> Self {
        let mut hasher = Sha256::new();
        for child in &children {
            hasher.update(child.data.as_bytes());
        }
        Self {
            data: hex::encode(hasher.finalize()),
            children: Children::Inner(children),
        }
    }
}

/// The mutable Merkle tree every block carries.
///
/// Leaves can be pruned in place after the block is sealed; the per-node
/// digests stay frozen at their construction-time values so the enclosing
/// block's hash, and with it the chain, survives content redaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTree {
    root: Option<TreeNode>,
}

impl BlockTree {
    /// Build the tree over `txs` in input order: one leaf parent per
    /// transaction, adjacent pairs combined bottom-up, an unpaired
    /// rightmost node given a single-child parent.
    pub fn build(txs: Vec<Transaction>) -> Self {
        if txs.is_empty() {
            return Self { root: None };
        }
        let mut level: Vec<TreeNode> = txs.into_iter().map(TreeNode::leaf_parent).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut iter = level.into_iter();
            while let Some(left) = iter.next() {
                let children = match iter.next() {
                    Some(right) => vec![left, right],
                    None => vec![left],
                };
                next.push(TreeNode::parent(children));
            }
            level = next;
        }
        Self { root: level.pop() }
    }

    /// The frozen root digest, or the sentinel `"root"` for an empty tree.
    pub fn root_digest(&self) -> &str {
        match &self.root {
            Some(node) => &node.data,
            None => EMPTY_ROOT,
        }
    }

    /// Present transactions, left to right, skipping pruned subtrees.
    pub fn txs(&self) -> Vec<&Transaction> {
        let mut found = Vec::new();
        let mut stack: Vec<&TreeNode> = self.root.iter().collect();
        while let Some(node) = stack.pop() {
            match &node.children {
                Children::Leaf(tx) => found.push(tx.as_ref()),
                Children::Inner(children) => stack.extend(children.iter().rev()),
                Children::Pruned => {}
            }
        }
        found
    }

    /// Ids of the present transactions, left to right.
    pub fn ids(&self) -> Vec<String> {
        self.txs().into_iter().map(|tx| tx.id.clone()).collect()
    }

    pub fn get(&self, tx_id: &str) -> Option<&Transaction> {
        self.txs().into_iter().find(|tx| tx.id == tx_id)
    }

    pub fn contains(&self, tx_id: &str) -> bool {
        self.get(tx_id).is_some()
    }

    /// Prune the transaction with the given id, then collapse any subtree
    /// left with no content. Returns whether anything was removed.
    pub fn remove(&mut self, tx_id: &str) -> bool {
        self.remove_many(std::slice::from_ref(&tx_id.to_owned()))
    }

    /// Batched [`BlockTree::remove`]. The argument list is not mutated.
    pub fn remove_many(&mut self, tx_ids: &[String]) -> bool {
        let mut remaining: HashSet<&str> = tx_ids.iter().map(String::as_str).collect();
        let removed = match &mut self.root {
            Some(root) => prune_matching(root, &mut remaining),
            None => false,
        };
        if removed {
            self.clean();
        }
        removed
    }

    /// Collapse, bottom-up, every internal node whose children have all been
    /// pruned. Digests are left untouched.
    fn clean(&mut self) {
        if let Some(root) = &mut self.root {
            collapse_empty(root);
        }
    }

    /// Match each present transaction against the pending ownership claims,
    /// verifying the positional GV key and recording `(tx, block_hash)`
    /// witnesses on success. Complete claims are skipped.
    pub fn scan_claims(&self, claims: &mut [OwnershipClaim], block_hash: &str) {
        for tx in self.txs() {
            for claim in claims.iter_mut() {
                claim.witness(tx, block_hash);
            }
        }
    }
}

fn prune_matching(node: &mut TreeNode, remaining: &mut HashSet<&str>) -> bool {
    if remaining.is_empty() {
        return false;
    }
    let matched = match &node.children {
        Children::Leaf(tx) => remaining.remove(tx.id.as_str()),
        _ => false,
    };
    if matched {
        node.children = Children::Pruned;
        return true;
    }
    match &mut node.children {
        Children::Inner(children) => {
            let mut removed = false;
            for child in children {
                removed |= prune_matching(child, remaining);
                if remaining.is_empty() {
                    break;
                }
            }
            removed
        }
        _ => false,
    }
}

/// Returns whether the subtree still holds any transaction; prunes the
/// children of nodes that do not.
fn collapse_empty(node: &mut TreeNode) -> bool {
    let alive = match &mut node.children {
        Children::Leaf(_) => true,
        Children::Pruned => false,
        Children::Inner(children) => {
            let mut any = false;
            for child in children {
                any |= collapse_empty(child);
            }
            any
        }
    };
    if !alive {
        node.children = Children::Pruned;
    }
    alive
}
