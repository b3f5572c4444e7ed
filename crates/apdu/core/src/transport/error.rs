//! Error types specific to card transport

/// Transport error type
///
/// `UserCancelled`, `SessionTimeout` and `SessionTerminated` describe a session that
/// ended for reasons the user controls, see [`TransportError::is_ignorable`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The platform has no usable NFC or reader stack
    #[error("Card reading is not available")]
    NotAvailable,

    /// Another session already owns the reader
    #[error("A card session is already in progress")]
    AlreadyInProgress,

    /// A card was detected but the connection failed
    #[error("Failed to connect to card")]
    ConnectFailed,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// The user cancelled the session
    #[error("Session cancelled by user")]
    UserCancelled,

    /// The session timed out waiting for a card
    #[error("Session timed out")]
    SessionTimeout,

    /// The session ended unexpectedly (card removed, field lost)
    #[error("Session terminated unexpectedly")]
    SessionTerminated,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }

    /// Whether the session ended for a reason the UI should not report as a failure
    pub const fn is_ignorable(&self) -> bool {
        matches!(
            self,
            Self::UserCancelled | Self::SessionTimeout | Self::SessionTerminated
        )
    }
}
