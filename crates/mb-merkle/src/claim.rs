use mb_transaction::{gv, gv::GvKey, Transaction};

/// Verification state for one pending `remove`/`summarise` request.
///
/// The request's SummaryMerkle declares the target ids and `gv_list` the
/// positionally aligned keys. As historical blocks are scanned, each target
/// found with a verifying key adds a `(transaction, block_hash)` witness;
/// the claim is authorised once every declared id has a witness.
#[derive(Debug, Clone)]
pub struct OwnershipClaim {
    request: Transaction,
    keys: Vec<GvKey>,
    ids: Vec<String>,
    witnesses: Vec<(Transaction, String)>,
}

impl OwnershipClaim {
    /// Build the scan state for a user request. Returns `None` when the
    /// transaction is not a `remove`/`summarise`, or when the key count
    /// disagrees with the declared id count (such requests can never
    /// complete and are dropped up front).
    pub fn from_request(request: Transaction) -> Option<Self> {
        let (keys, tree) = request.kind.request_parts()?;
        let ids = tree.ids();
        if keys.len() != ids.len() || ids.is_empty() {
            return None;
        }
        let keys = keys.to_vec();
        Some(Self {
            request,
            keys,
            ids,
            witnesses: Vec::new(),
        })
    }

    /// Try to add `tx` as a witness: it must be a declared target and its
    /// stored GV token must decrypt to its id under the positional key.
    pub fn witness(&mut self, tx: &Transaction, block_hash: &str) {
        if self.is_complete() {
            return;
        }
        if let Some(index) = self.ids.iter().position(|id| *id == tx.id) {
            if gv::verify(&tx.id, &tx.gv, &self.keys[index]) {
                self.witnesses.push((tx.clone(), block_hash.to_owned()));
            }
        }
    }

    /// Every declared id has been located and verified.
    pub fn is_complete(&self) -> bool {
        self.witnesses.len() == self.ids.len()
    }

    pub fn request(&self) -> &Transaction {
        &self.request
    }

    pub fn witnesses(&self) -> &[(Transaction, String)] {
        &self.witnesses
    }

    pub fn into_parts(self) -> (Transaction, Vec<(Transaction, String)>) {
        (self.request, self.witnesses)
    }
}
