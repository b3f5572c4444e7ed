//! Secure Unique NFC (SUN) tap verification
//!
//! A tap deposits `picc_data` (AES-ECB encrypted UID and read counter) and `cmac`
//! (truncated CMAC under a per-tap key derived from UID and counter) into the URL.
//! Verification is pure: it touches no card and keeps no state.

use std::fmt;

use tracing::trace;
use url::Url;
use zeroize::Zeroize;

use crate::crypto::{AesKey, AesProvider, BLOCK_SIZE, KeySet, SoftAes, truncate_mac};
use crate::error::VerifyError;
use crate::types::Uid;

/// Header byte of decrypted PICC data carrying a 7-byte UID and the read counter
pub const PICC_DATA_TAG: u8 = 0xC7;

const SESSION_MAC_PREFIX: [u8; 6] = [0x3C, 0xC3, 0x00, 0x01, 0x00, 0x80];
const CMAC_LEN: usize = 8;

/// Authenticated contents of one tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PiccDataInfo {
    /// Card UID
    pub uid: Uid,
    /// SDM read counter (24-bit)
    pub counter: u32,
}

/// The SUN values carried by a tap URL
#[derive(Clone, PartialEq, Eq)]
pub struct SunParams {
    /// Encrypted PICC data
    pub picc_data: [u8; BLOCK_SIZE],
    /// Truncated SDM MAC
    pub cmac: [u8; CMAC_LEN],
    /// Raw `enc` value, when the card mirrors encrypted file data
    pub enc: Option<String>,
}

impl fmt::Debug for SunParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SunParams")
            .field("picc_data", &hex::encode(self.picc_data))
            .field("cmac", &hex::encode(self.cmac))
            .field("enc", &self.enc)
            .finish()
    }
}

fn decode_param<const N: usize>(
    value: Option<&str>,
    name: &'static str,
) -> Result<[u8; N], VerifyError> {
    let mut out = [0u8; N];
    let value = value.ok_or(VerifyError::MalformedQuery(name))?;
    hex::decode_to_slice(value, &mut out).map_err(|_| VerifyError::MalformedQuery(name))?;
    Ok(out)
}

impl SunParams {
    /// Extract the parameters from a full tap URL
    pub fn from_url(url: &str) -> Result<Self, VerifyError> {
        let url = Url::parse(url).map_err(|_| VerifyError::MalformedQuery("url"))?;
        Self::from_query(url.query().unwrap_or_default())
    }

    /// Extract the parameters from a raw query string
    ///
    /// Values are taken verbatim. When a name repeats, the last value wins.
    pub fn from_query(query: &str) -> Result<Self, VerifyError> {
        let query = query.strip_prefix('?').unwrap_or(query);

        let (mut picc_data, mut cmac, mut enc) = (None, None, None);
        for pair in query.split('&') {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            match name {
                "picc_data" => picc_data = Some(value),
                "cmac" => cmac = Some(value),
                "enc" => enc = Some(value),
                _ => {}
            }
        }

        Ok(Self {
            picc_data: decode_param(picc_data, "picc_data")?,
            cmac: decode_param(cmac, "cmac")?,
            enc: enc.map(str::to_owned),
        })
    }
}

/// Verifies SUN taps with an injected AES capability
#[derive(Debug, Clone, Default)]
pub struct SunVerifier<A: AesProvider = SoftAes> {
    aes: A,
}

impl SunVerifier {
    /// Verifier backed by the software AES implementation
    pub const fn new() -> Self {
        Self { aes: SoftAes }
    }
}

impl<A: AesProvider> SunVerifier<A> {
    /// Verifier backed by `aes`
    pub const fn with_aes(aes: A) -> Self {
        Self { aes }
    }

    /// Decrypt `picc_data` and authenticate it against `cmac`
    pub fn verify(
        &self,
        picc_data_key: &AesKey,
        cmac_key: &AesKey,
        picc_data: &[u8],
        cmac: &[u8],
        enc: Option<&str>,
    ) -> Result<PiccDataInfo, VerifyError> {
        if picc_data.len() != BLOCK_SIZE {
            return Err(VerifyError::DecryptionFailed);
        }

        let mut plain = self
            .aes
            .ecb_decrypt(picc_data_key, picc_data)
            .map_err(|_| VerifyError::DecryptionFailed)?;
        if plain.len() != BLOCK_SIZE || plain[0] != PICC_DATA_TAG {
            plain.zeroize();
            return Err(VerifyError::DecryptionFailed);
        }

        let uid = Uid::from_slice(&plain[1..8]).ok_or(VerifyError::DecryptionFailed)?;
        let counter = u32::from_le_bytes([plain[8], plain[9], plain[10], 0]);

        // 6-byte prefix + UID + counter is exactly one block
        let mut sv = [0u8; BLOCK_SIZE];
        sv[..6].copy_from_slice(&SESSION_MAC_PREFIX);
        sv[6..].copy_from_slice(&plain[1..11]);
        plain.zeroize();

        let session_key = AesKey::new(
            self.aes
                .cmac(cmac_key, &sv)
                .map_err(|_| VerifyError::CmacCalculationFailed)?,
        );
        sv.zeroize();

        let mac_input = match enc {
            Some(enc) => format!("{}&cmac=", enc.to_ascii_uppercase()),
            None => String::new(),
        };
        let full_mac = self
            .aes
            .cmac(&session_key, mac_input.as_bytes())
            .map_err(|_| VerifyError::CmacCalculationFailed)?;
        let expected = truncate_mac(&full_mac);

        let diff = if cmac.len() == CMAC_LEN {
            expected.iter().zip(cmac).fold(0u8, |acc, (a, b)| acc | (a ^ b))
        } else {
            1
        };
        if diff != 0 {
            trace!("SUN MAC mismatch");
            return Err(VerifyError::CmacMismatch);
        }

        Ok(PiccDataInfo { uid, counter })
    }

    /// Verify parsed tap parameters with one card's keys
    pub fn verify_params(
        &self,
        keys: &KeySet,
        params: &SunParams,
    ) -> Result<PiccDataInfo, VerifyError> {
        self.verify(
            &keys.picc_data_key,
            &keys.cmac_key,
            &params.picc_data,
            &params.cmac,
            params.enc.as_deref(),
        )
    }

    /// Try several cards' keys and return the index of the first that verifies
    ///
    /// When none matches, the error of the last attempt is returned.
    pub fn verify_any<'k>(
        &self,
        key_sets: impl IntoIterator<Item = &'k KeySet>,
        params: &SunParams,
    ) -> Result<(usize, PiccDataInfo), VerifyError> {
        let mut last = VerifyError::DecryptionFailed;
        for (index, keys) in key_sets.into_iter().enumerate() {
            match self.verify_params(keys, params) {
                Ok(info) => return Ok((index, info)),
                Err(e) => last = e,
            }
        }
        Err(last)
    }
}
