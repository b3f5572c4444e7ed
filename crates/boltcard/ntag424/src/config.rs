//! Provisioning configuration

use serde::Deserialize;

use crate::crypto::AesKey;
use crate::session::DEFAULT_CHUNK_SIZE;

/// Static URL written by the reset flow
pub const DEFAULT_RESET_URL: &str = "https://phoenix.acinq.co";

/// Knobs for [`CardProvisioner`](crate::provisioner::CardProvisioner)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ProvisionerConfig {
    /// Key a blank card ships with in every slot (hex)
    pub default_key: AesKey,
    /// URL the reset flow leaves on the card
    pub reset_url: String,
    /// Maximum bytes per ReadData exchange
    pub read_chunk: usize,
    /// Maximum plaintext bytes per WriteData exchange
    pub write_chunk: usize,
    /// Size of the NDEF file
    pub ndef_file_size: u32,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            default_key: AesKey::factory(),
            reset_url: DEFAULT_RESET_URL.to_string(),
            read_chunk: DEFAULT_CHUNK_SIZE,
            write_chunk: DEFAULT_CHUNK_SIZE,
            ndef_file_size: 256,
        }
    }
}
