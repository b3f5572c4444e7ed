//! Core error type for APDU framing
//!
//! Transport failures keep their own taxonomy in [`TransportError`] so callers can
//! tell an ordinary user cancellation apart from a protocol failure.

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Core error type for command/response framing
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    /// Invalid command length
    #[error("Invalid command length: {0}")]
    InvalidCommandLength(usize),

    /// A response must carry at least the two status bytes
    #[error("Invalid response length: {0}")]
    InvalidResponseLength(usize),

    /// Card answered with a non-success status word
    #[error("Status error {0}: {desc}", desc = .0.description())]
    Status(StatusWord),

    /// Transport-level failure
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    /// Create a new status error
    pub const fn status(sw1: u8, sw2: u8) -> Self {
        Self::Status(StatusWord::new(sw1, sw2))
    }

    /// Whether this error is a transport condition the user caused or can ignore
    pub const fn is_ignorable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_ignorable(),
            _ => false,
        }
    }
}
