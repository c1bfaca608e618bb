use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::EMPTY_ROOT;

/// A node in a [`SummaryTree`]. Leaves carry a transaction id as their
/// `data`; internal nodes carry the hex SHA-256 of their children's
/// concatenated `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryNode {
    data: String,
    children: Vec<SummaryNode>,
}

impl SummaryNode {
    fn leaf(id: String) -> Self {
        Self {
            data: id,
            children: Vec::new(),
        }
    }

    fn parent(children: Vec<SummaryNode>) -> Self {
        let mut hasher = Sha256::new();
        for child in &children {
            hasher.update(child.data.as_bytes());
        }
        Self {
            data: hex::encode(hasher.finalize()),
            children,
        }
    }
}

/// The read-only Merkle tree carried inside `remove` and `summarise`
/// requests. Its leaves are the transaction ids the author claims to own,
/// in the order the author listed them; the positional GV key list of the
/// request is aligned with [`SummaryTree::ids`].
///
/// The root digest is part of the request's signing preimage, so the tree
/// must serialise without perturbing any node `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTree {
    root: Option<SummaryNode>,
}

impl SummaryTree {
    /// Build a tree over `ids` in the given order. Adjacent pairs combine
    /// bottom-up; an unpaired rightmost node is given a single-child parent.
    pub fn new(ids: &[String]) -> Self {
        if ids.is_empty() {
            return Self { root: None };
        }

        let mut level: Vec<SummaryNode> = ids.iter().cloned().map(SummaryNode::leaf).collect();
        while level.len() > 1 {
            let mut next = Vec::with_capacity(level.len().div_ceil(2));
            let mut iter = level.into_iter();
            while let Some(left) = iter.next() {
                let children = match iter.next() {
                    Some(right) => vec![left, right],
                    None => vec![left],
                };
                next.push(SummaryNode::parent(children));
            }
            level = next;
        }
        Self {
            root: level.pop(),
        }
    }

    /// The root digest, or the sentinel `"root"` for an empty tree.
    pub fn root_digest(&self) -> &str {
        match &self.root {
            Some(node) => &node.data,
            None => EMPTY_ROOT,
        }
    }

    /// The leaf ids, left to right.
    pub fn ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        let mut stack: Vec<&SummaryNode> = self.root.iter().collect();
        while let Some(node) = stack.pop() {
            if node.children.is_empty() {
                ids.push(node.data.clone());
            } else {
                stack.extend(node.children.iter().rev());
            }
        }
        ids
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }
}
