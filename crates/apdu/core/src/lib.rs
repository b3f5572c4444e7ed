//! Core types for APDU (Application Protocol Data Unit) exchanges
//!
//! This crate provides the foundational types for talking to contactless cards
//! according to ISO/IEC 7816-4:
//!
//! - Creating and parsing APDU commands and responses
//! - Status word interpretation
//! - The transport boundary a host platform implements to carry raw APDUs
//!
//! Everything here is stateless and synchronous. A transport handles exactly one
//! command at a time; callers must not issue a second APDU before the previous
//! response arrived.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod error;
pub mod response;
pub mod transport;

pub use command::{ApduCommand, Command, ExpectedLength};
pub use error::Error;
pub use response::Response;
pub use response::status::StatusWord;
pub use transport::{CardTransport, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{Bytes, BytesMut, Error};

    pub use crate::Command;
    pub use crate::command::{ApduCommand, ExpectedLength};

    pub use crate::Response;
    pub use crate::response::status::{StatusWord, common as status};

    pub use crate::transport::{CardTransport, TransportError};
}
