use chrono::Utc;
use mb_summary::Summarisable;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::kind::TxKind;

/// `prev_id` sentinel for the first transaction an author sends.
pub const FIRST_PREV_ID: &str = "first";

/// A single immutable record sent to the miner.
///
/// `input` and `output` are colon-separated lists of opaque tokens whose
/// meaning is application-defined. `prev_id` is a chain-of-custody hint (the
/// id of the author's previous transaction) and is not enforced.
///
/// The `id` is a pure function of the content fields; `sig` covers the
/// canonical preimage of [`Transaction::signing_preimage`], including the GV
/// token, so the token cannot be swapped after signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Id of the author's previous transaction, or [`FIRST_PREV_ID`].
    pub prev_id: String,

    /// Colon-separated input tokens.
    pub input: String,

    /// Colon-separated output tokens.
    pub output: String,

    /// Lowercase-hex SHA-256 of the author's PEM public key; the miner's
    /// lookup key into its public-key table.
    pub pub_key_hash: String,

    /// Kind tag plus kind-specific fields.
    pub kind: TxKind,

    /// Author-side Unix milliseconds.
    pub ts: i64,

    /// Lowercase-hex SHA-256 content digest, computed at construction.
    pub id: String,

    /// RSASSA-PKCS1-v1.5 signature over the signing preimage.
    /// Empty until signed.
    pub sig: Vec<u8>,

    /// The author's generator-verifier token: the id encrypted under a key
    /// derived from the author's secret. Verified only for
    /// `Remove`/`Summarise` targets.
    pub gv: Vec<u8>,
}

impl Transaction {
    /// Create a new unsigned transaction. The id is derived from the content
    /// fields and the creation timestamp.
    pub fn new(
        prev_id: impl Into<String>,
        input: impl Into<String>,
        output: impl Into<String>,
        pub_key_hash: impl Into<String>,
        kind: TxKind,
    ) -> Self {
        let prev_id = prev_id.into();
        let input = input.into();
        let output = output.into();
        let pub_key_hash = pub_key_hash.into();
        let ts = Utc::now().timestamp_millis();
        let id = Self::calc_id(&prev_id, &input, &output, &pub_key_hash, ts);
        Self {
            prev_id,
            input,
            output,
            pub_key_hash,
            kind,
            ts,
            id,
            sig: Vec::new(),
            gv: Vec::new(),
        }
    }

    fn calc_id(prev_id: &str, input: &str, output: &str, pub_key_hash: &str, ts: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prev_id.as_bytes());
        hasher.update(input.as_bytes());
        hasher.update(output.as_bytes());
        hasher.update(pub_key_hash.as_bytes());
        hasher.update(ts.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// The canonical byte string the signature covers. The GV token must be
    /// set before signing; kind-specific fields are appended last.
    pub fn signing_preimage(&self) -> Vec<u8> {
        let mut contents = String::new();
        contents.push_str(&self.pub_key_hash);
        contents.push_str(&self.prev_id);
        contents.push_str(&self.input);
        contents.push_str(&self.output);
        contents.push_str(self.kind.label());
        contents.push_str(&hex::encode(&self.gv));
        match &self.kind {
            TxKind::Temp { ttl_secs } => contents.push_str(&ttl_secs.to_string()),
            TxKind::Remove { tx_tree, .. } | TxKind::Summarise { tx_tree, .. } => {
                contents.push_str(tx_tree.root_digest())
            }
            _ => {}
        }
        contents.into_bytes()
    }

    pub fn set_gv(&mut self, gv: Vec<u8>) {
        self.gv = gv;
    }

    pub fn set_signature(&mut self, sig: Vec<u8>) {
        self.sig = sig;
    }

    pub fn is_signed(&self) -> bool {
        !self.sig.is_empty()
    }
}

impl Summarisable for Transaction {
    fn tx_id(&self) -> &str {
        &self.id
    }
    fn input(&self) -> &str {
        &self.input
    }
    fn output(&self) -> &str {
        &self.output
    }
}
