use std::io::ErrorKind;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed length header")]
    BadHeader,

    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),

    #[error("serialisation error: {0}")]
    Codec(#[from] bincode::Error),
}

impl WireError {
    /// True when the peer went away (clean close or reset), as opposed to a
    /// protocol violation. Listener tasks end quietly on these.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            WireError::Io(e) if matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::BrokenPipe
            )
        )
    }
}
