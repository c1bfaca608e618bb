use mb_summary::SummaryTree;
use serde::{Deserialize, Serialize};

use crate::gv::GvKey;

/// The kind of a transaction, carrying only the fields that kind needs.
///
/// `Remove` and `Summarise` are authenticated mutation requests: the tree
/// leaves name the target transaction ids and `gv_list` holds the
/// positionally aligned decryption keys proving authorship of each target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxKind {
    /// Permanent record, never mutated.
    Perm,
    /// Expires `ttl_secs` after the miner seals it.
    Temp { ttl_secs: u64 },
    /// Candidate for miner-initiated summarisation.
    Summ,
    /// Result of a summarisation, authored by the miner or accepted from a
    /// verified user `Summarise` request.
    Summarised,
    /// User request: remove the transactions named in `tx_tree`.
    Remove {
        gv_list: Vec<GvKey>,
        tx_tree: SummaryTree,
    },
    /// User request: replace the transactions named in `tx_tree` with the
    /// requesting transaction itself.
    Summarise {
        gv_list: Vec<GvKey>,
        tx_tree: SummaryTree,
    },
}

impl TxKind {
    /// Stable label used in the signing preimage.
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Perm => "perm",
            TxKind::Temp { .. } => "temp",
            TxKind::Summ => "summ",
            TxKind::Summarised => "summarised",
            TxKind::Remove { .. } => "remove",
            TxKind::Summarise { .. } => "summarise",
        }
    }

    /// The key list and id tree of a `Remove`/`Summarise` request.
    pub fn request_parts(&self) -> Option<(&[GvKey], &SummaryTree)> {
        match self {
            TxKind::Remove { gv_list, tx_tree } | TxKind::Summarise { gv_list, tx_tree } => {
                Some((gv_list, tx_tree))
            }
            _ => None,
        }
    }

    pub fn is_user_request(&self) -> bool {
        matches!(self, TxKind::Remove { .. } | TxKind::Summarise { .. })
    }
}
