//! Error types for card commands, provisioning flows and tap verification
//!
//! Verification and replay errors never carry key material or decrypted PICC data.

use boltcard_apdu_core::TransportError;

use crate::commands::NativeStatus;
use crate::provisioner::ProvisionStep;

/// Result type for single card operations
pub type Result<T> = std::result::Result<T, CardError>;

/// AES capability failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Input must be a whole number of AES blocks
    #[error("Input length {0} is not a multiple of the AES block size")]
    UnalignedInput(usize),

    /// Key material has the wrong size
    #[error("Invalid key length")]
    InvalidKeyLength,

    /// ISO 9797-1 method 2 padding not found after decryption
    #[error("Invalid padding")]
    InvalidPadding,
}

/// File settings that cannot be encoded or would be rejected by the card
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// An SDM option is enabled but its offset is missing
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Offsets must not go backwards in the file
    #[error("{field} offset {offset} precedes {previous} offset {previous_offset}")]
    OffsetOutOfOrder {
        /// Offending field
        field: &'static str,
        /// Its offset
        offset: u32,
        /// The field laid out before it
        previous: &'static str,
        /// Offset of that field
        previous_offset: u32,
    },

    /// Mirrored data would run past the end of the file
    #[error("{field} ends at {end}, beyond file size {file_size}")]
    OffsetOutOfBounds {
        /// Offending field
        field: &'static str,
        /// One past its last byte
        end: u32,
        /// Declared file size
        file_size: u32,
    },

    /// Offsets and sizes are 24-bit on the wire
    #[error("{field} value {value} does not fit in 24 bits")]
    ValueTooLarge {
        /// Offending field
        field: &'static str,
        /// Its value
        value: u32,
    },
}

/// A single NTAG 424 command failed
#[derive(Debug, thiserror::Error)]
pub enum CardError {
    /// Transport-related errors
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// APDU framing errors
    #[error(transparent)]
    Apdu(#[from] boltcard_apdu_core::Error),

    /// The card answered with a native error status (91 XX)
    #[error("Card returned error status: {0}")]
    Status(NativeStatus),

    /// AES failure while protecting or unprotecting a message
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The response does not have the expected shape
    #[error("Invalid response: {0}")]
    InvalidResponse(&'static str),

    /// A secure messaging command was issued without authenticating first
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The card's response MAC did not verify
    #[error("Response MAC mismatch")]
    ResponseMacMismatch,

    /// File settings could not be encoded
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

impl CardError {
    /// The transport error behind this failure, if any
    pub const fn transport(&self) -> Option<&TransportError> {
        match self {
            Self::Transport(e) | Self::Apdu(boltcard_apdu_core::Error::Transport(e)) => Some(e),
            _ => None,
        }
    }

    /// Whether the failure is an ordinary cancellation or a lost session
    pub fn is_ignorable(&self) -> bool {
        self.transport().is_some_and(TransportError::is_ignorable)
    }
}

/// Terminal failure of a provisioning flow
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// The transport could not open a session
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Authentication with key 0 failed
    #[error("Could not authenticate with the card")]
    CouldNotAuthenticate {
        /// Underlying failure
        #[source]
        source: CardError,
    },

    /// No writable key slot was found in 1-4
    #[error("No usable key slot available")]
    KeySlotsUnavailable,

    /// The file settings derived for the card break the offset invariant
    #[error(transparent)]
    InvalidSettings(#[from] SettingsError),

    /// A flow step failed
    #[error("Step {step} failed")]
    Step {
        /// The step that failed
        step: ProvisionStep,
        /// Underlying failure
        #[source]
        source: CardError,
    },
}

impl ProvisionError {
    /// Create a step failure
    pub const fn step(step: ProvisionStep, source: CardError) -> Self {
        Self::Step { step, source }
    }

    /// The failed step, if the flow got past authentication
    pub const fn failed_step(&self) -> Option<ProvisionStep> {
        match self {
            Self::Step { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Whether the flow ended because the user cancelled or the card left the field
    ///
    /// Callers can filter these without inspecting messages.
    pub fn is_ignorable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_ignorable(),
            Self::CouldNotAuthenticate { source } | Self::Step { source, .. } => {
                source.is_ignorable()
            }
            Self::KeySlotsUnavailable | Self::InvalidSettings(_) => false,
        }
    }
}

/// Tap verification failures
///
/// Variants never carry key material or decrypted PICC data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// PICC data did not decrypt to a valid header
    #[error("PICC data decryption failed")]
    DecryptionFailed,

    /// The AES capability failed while computing the MAC
    #[error("CMAC calculation failed")]
    CmacCalculationFailed,

    /// The tag-supplied CMAC does not match
    #[error("CMAC mismatch")]
    CmacMismatch,

    /// Missing or non-hex query parameter
    #[error("Malformed query: {0}")]
    MalformedQuery(&'static str),
}

/// Replay guard rejections
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The counter did not move forward
    #[error("Counter {received} is not greater than last accepted counter {last}")]
    CounterNotIncreasing {
        /// Last accepted counter
        last: u32,
        /// Counter presented by this tap
        received: u32,
    },

    /// Counters are 24-bit
    #[error("Counter {0} exceeds 24 bits")]
    CounterOutOfRange(u32),
}
