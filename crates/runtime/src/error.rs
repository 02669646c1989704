// SPDX-License-Identifier: Apache-2.0

//! Runtime failure taxonomy
//!
//! Every variant is fatal. Forwarded syscalls that fail on the host kernel are
//! not errors of the runtime: they travel back to the host as negative results.

use std::io;

use thiserror::Error;

/// A fatal runtime failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration, initializer, heap or handshake failure.
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),

    /// The peer or the runtime broke the protocol.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// The control channel failed.
    #[error("control channel failed: {0}")]
    Channel(#[source] io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::InvalidData => Error::Protocol(err.to_string()),
            _ => Error::Channel(err),
        }
    }
}

/// Result type returned by the runtime.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_classification() {
        let err = Error::from(io::Error::new(io::ErrorKind::InvalidData, "opcode 0x42"));
        assert!(matches!(err, Error::Protocol(ref msg) if msg == "opcode 0x42"));

        let err = Error::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::Channel(..)));
    }
}
