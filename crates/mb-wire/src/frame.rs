//! Frame layout, client → miner, one TCP stream per client:
//!
//! - Handshake, once: 4 zero-padded ASCII digits (public key length), then
//!   that many bytes of PEM public key.
//! - Per transaction: 50 zero-padded ASCII digits (payload length), then
//!   that many bytes of bincode-encoded [`Transaction`].
//!
//! Short reads surface as `UnexpectedEof`; the miner terminates that
//! connection's listener task and never answers on the wire.

use mb_transaction::Transaction;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::WireError;

const KEY_HEADER_DIGITS: usize = 4;
const TX_HEADER_DIGITS: usize = 50;

/// Upper bound on a single transaction frame. Well above any legitimate
/// request; only guards allocation against garbage headers.
const MAX_TX_BYTES: usize = 16 * 1024 * 1024;

async fn read_len<R>(reader: &mut R, digits: usize) -> Result<usize, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = vec![0u8; digits];
    reader.read_exact(&mut header).await?;
    std::str::from_utf8(&header)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or(WireError::BadHeader)
}

pub async fn write_pub_key<W>(writer: &mut W, pem: &[u8]) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    if pem.len() >= 10usize.pow(KEY_HEADER_DIGITS as u32) {
        return Err(WireError::FrameTooLarge(pem.len()));
    }
    writer
        .write_all(format!("{:01$}", pem.len(), KEY_HEADER_DIGITS).as_bytes())
        .await?;
    writer.write_all(pem).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_pub_key<R>(reader: &mut R) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = read_len(reader, KEY_HEADER_DIGITS).await?;
    let mut pem = vec![0u8; len];
    reader.read_exact(&mut pem).await?;
    Ok(pem)
}

pub async fn write_tx<W>(writer: &mut W, tx: &Transaction) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let payload = bincode::serialize(tx)?;
    if payload.len() > MAX_TX_BYTES {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    writer
        .write_all(format!("{:01$}", payload.len(), TX_HEADER_DIGITS).as_bytes())
        .await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

pub async fn read_tx<R>(reader: &mut R) -> Result<Transaction, WireError>
where
    R: AsyncRead + Unpin,
{
    let len = read_len(reader, TX_HEADER_DIGITS).await?;
    if len > MAX_TX_BYTES {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(bincode::deserialize(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mb_transaction::{TxKind, FIRST_PREV_ID};

    fn sample_tx() -> Transaction {
        Transaction::new(FIRST_PREV_ID, "00", "01", "abcd", TxKind::Perm)
    }

    #[tokio::test]
    async fn pub_key_frames_round_trip() {
        let mut wire = Vec::new();
        write_pub_key(&mut wire, b"-----BEGIN PUBLIC KEY-----").await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        let pem = read_pub_key(&mut reader).await.unwrap();
        assert_eq!(pem, b"-----BEGIN PUBLIC KEY-----");
    }

    #[tokio::test]
    async fn tx_frames_round_trip() {
        let tx = sample_tx();
        let mut wire = Vec::new();
        write_tx(&mut wire, &tx).await.unwrap();

        let mut reader = std::io::Cursor::new(wire);
        assert_eq!(read_tx(&mut reader).await.unwrap(), tx);
    }

    #[tokio::test]
    async fn headers_are_zero_padded_ascii() {
        let mut wire = Vec::new();
        write_pub_key(&mut wire, b"abc").await.unwrap();
        assert_eq!(&wire[..4], b"0003");

        let tx = sample_tx();
        let mut wire = Vec::new();
        write_tx(&mut wire, &tx).await.unwrap();
        assert_eq!(wire.len(), 50 + bincode::serialize(&tx).unwrap().len());
        assert!(wire[..50].iter().all(u8::is_ascii_digit));
    }

    #[tokio::test]
    async fn truncated_frame_is_a_disconnect() {
        let tx = sample_tx();
        let mut wire = Vec::new();
        write_tx(&mut wire, &tx).await.unwrap();
        wire.truncate(wire.len() - 5);

        let mut reader = std::io::Cursor::new(wire);
        let err = read_tx(&mut reader).await.unwrap_err();
        assert!(err.is_disconnect());
    }

    #[tokio::test]
    async fn garbage_header_is_rejected() {
        let mut reader = std::io::Cursor::new(b"12ab".to_vec());
        assert!(matches!(
            read_pub_key(&mut reader).await,
            Err(WireError::BadHeader)
        ));
    }
}
