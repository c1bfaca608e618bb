use mb_summary::{summary, SummaryTree};
use mb_transaction::{gv, Keypair, Transaction, TxKind, FIRST_PREV_ID};
use mb_wire::{write_pub_key, write_tx};
use tokio::net::{TcpStream, ToSocketAddrs};

use crate::error::ClientError;

/// A blockchain participant: owns an RSA keypair and a generator-verifier
/// secret, and speaks the miner's wire contract over one TCP stream.
///
/// The public key is sent once at connect time so the miner can verify every
/// later signature from the `pub_key_hash` alone. `last_tx` chains each
/// transaction's `prev_id` to the previously sent one.
pub struct Client {
    stream: TcpStream,
    keys: Keypair,
    gvs: String,
    last_tx: String,
}

impl Client {
    /// Connect to a miner, generate a keypair, and perform the public-key
    /// handshake. `gvs` is the secret the GV tokens are derived from; it
    /// never leaves this struct, only derived per-transaction keys do.
    pub async fn connect(addr: impl ToSocketAddrs, gvs: impl Into<String>) -> Result<Self, ClientError> {
        let mut stream = TcpStream::connect(addr).await?;
        let keys = Keypair::generate()?;
        write_pub_key(&mut stream, keys.public_pem().as_bytes()).await?;
        Ok(Self {
            stream,
            keys,
            gvs: gvs.into(),
            last_tx: FIRST_PREV_ID.to_owned(),
        })
    }

    pub fn pub_key_hash(&self) -> &str {
        self.keys.pub_key_hash()
    }

    /// Create a signed transaction with its GV token attached. The token is
    /// set before signing so the signature covers it.
    pub fn create_tx(
        &self,
        input: impl Into<String>,
        output: impl Into<String>,
        kind: TxKind,
    ) -> Transaction {
        let mut tx = Transaction::new(
            self.last_tx.clone(),
            input,
            output,
            self.keys.pub_key_hash(),
            kind,
        );
        tx.set_gv(gv::token(&self.gvs, &tx.id));
        let sig = self.keys.sign(&tx);
        tx.set_signature(sig);
        tx
    }

    /// Send a created transaction and advance the `prev_id` chain.
    pub async fn send(&mut self, tx: &Transaction) -> Result<(), ClientError> {
        write_tx(&mut self.stream, tx).await?;
        self.last_tx = tx.id.clone();
        Ok(())
    }

    /// Create and send in one step, returning the transaction for callers
    /// that track ids.
    pub async fn send_new(
        &mut self,
        input: impl Into<String>,
        output: impl Into<String>,
        kind: TxKind,
    ) -> Result<Transaction, ClientError> {
        let tx = self.create_tx(input, output, kind);
        self.send(&tx).await?;
        Ok(tx)
    }

    /// Build a `remove` request covering `tx_ids`: a SummaryMerkle over the
    /// ids plus the positionally aligned per-transaction keys that prove
    /// this client created them.
    pub fn remove_request(&self, tx_ids: &[String]) -> Transaction {
        let gv_list = tx_ids.iter().map(|id| gv::derive_key(&self.gvs, id)).collect();
        self.create_tx(
            "remove_tx",
            "remove_tx",
            TxKind::Remove {
                gv_list,
                tx_tree: SummaryTree::new(tx_ids),
            },
        )
    }

    /// Build a `summarise` request over transactions this client created:
    /// the declared input/output strings are the net token sets the miner
    /// will recompute from the located transactions.
    pub fn summarise_request(&self, txs: &[Transaction]) -> Transaction {
        let ids: Vec<String> = txs.iter().map(|tx| tx.id.clone()).collect();
        let gv_list = ids.iter().map(|id| gv::derive_key(&self.gvs, id)).collect();
        let (ins, outs) = summary(txs);
        self.create_tx(
            ins.join(":"),
            outs.join(":"),
            TxKind::Summarise {
                gv_list,
                tx_tree: SummaryTree::new(&ids),
            },
        )
    }
}
