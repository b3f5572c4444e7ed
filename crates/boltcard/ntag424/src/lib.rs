//! NTAG 424 DNA support for Bolt Cards
//!
//! - [`CardProvisioner`] writes keys and a SUN-enabled NDEF file onto a blank card,
//!   and resets it again
//! - [`HceResponder`] emulates such a card's Type 4 tag interface
//! - [`SunVerifier`] authenticates the dynamic data a tap produces, and
//!   [`CounterStore`] rejects replays
//!
//! Card I/O goes through [`boltcard_apdu_core::CardTransport`]; AES goes through
//! [`AesProvider`].
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod card;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod file;
pub mod hce;
pub mod provisioner;
pub mod replay;
pub mod session;
pub mod sun;
pub mod types;

pub use card::Ntag424;
pub use config::ProvisionerConfig;
pub use crypto::{AesKey, AesProvider, KeySet, SoftAes};
pub use error::{CardError, CryptoError, ProvisionError, ReplayError, SettingsError, VerifyError};
pub use file::{CapabilitiesContainer, CommunicationMode, FileSettings, NdefTemplate, Permission};
pub use hce::{HceResponder, SelectedFile};
pub use provisioner::{
    CardProvisioner, CardReport, KeyRotation, ProvisionStep, ResetOutcome, WriteOutcome,
    allocate_key_slot,
};
pub use replay::{CounterStore, MemoryCounterStore};
pub use session::DnaCommunicator;
pub use sun::{PiccDataInfo, SunParams, SunVerifier};
pub use types::{FileNumber, KeySlot, Uid};
