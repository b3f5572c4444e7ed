//! AES capability and key material
//!
//! The card subsystem never calls a cipher directly. Everything goes through
//! [`AesProvider`], so verification and provisioning can run against deterministic
//! fixtures or a hardware-backed implementation.

use std::fmt;

use aes::Aes128;
use cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::NoPadding, generic_array::GenericArray,
};
use cmac::{Cmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Deserializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// A single AES block
pub type Block = [u8; BLOCK_SIZE];

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// AES primitives consumed by the card subsystem
///
/// All operations work on whole blocks; callers pad first.
pub trait AesProvider: fmt::Debug {
    /// AES-128-ECB encrypt
    fn ecb_encrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES-128-ECB decrypt
    fn ecb_decrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES-128-CBC encrypt without padding
    fn cbc_encrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES-128-CBC decrypt without padding
    fn cbc_decrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// AES-128-CMAC (NIST SP 800-38B)
    fn cmac(&self, key: &AesKey, data: &[u8]) -> Result<Block, CryptoError>;
}

impl<A: AesProvider + ?Sized> AesProvider for &A {
    fn ecb_encrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).ecb_encrypt(key, data)
    }

    fn ecb_decrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).ecb_decrypt(key, data)
    }

    fn cbc_encrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).cbc_encrypt(key, iv, data)
    }

    fn cbc_decrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        (**self).cbc_decrypt(key, iv, data)
    }

    fn cmac(&self, key: &AesKey, data: &[u8]) -> Result<Block, CryptoError> {
        (**self).cmac(key, data)
    }
}

/// Software AES backed by the RustCrypto block cipher crates
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftAes;

const fn check_aligned(data: &[u8]) -> Result<(), CryptoError> {
    if data.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::UnalignedInput(data.len()));
    }
    Ok(())
}

impl AesProvider for SoftAes {
    fn ecb_encrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_aligned(data)?;
        let cipher =
            Aes128::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength)?;

        let mut out = Vec::with_capacity(data.len());
        for chunk in data.chunks_exact(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.encrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    fn ecb_decrypt(&self, key: &AesKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_aligned(data)?;
        let cipher =
            Aes128::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::InvalidKeyLength)?;

        let mut out = Vec::with_capacity(data.len());
        for chunk in data.chunks_exact(BLOCK_SIZE) {
            let mut block = GenericArray::clone_from_slice(chunk);
            cipher.decrypt_block(&mut block);
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    fn cbc_encrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_aligned(data)?;
        let mut buf = data.to_vec();
        let len = buf.len();
        Aes128CbcEnc::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| CryptoError::InvalidKeyLength)?
            .encrypt_padded_mut::<NoPadding>(&mut buf, len)
            .map_err(|_| CryptoError::UnalignedInput(len))?;
        Ok(buf)
    }

    fn cbc_decrypt(&self, key: &AesKey, iv: &Block, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        check_aligned(data)?;
        let mut buf = data.to_vec();
        Aes128CbcDec::new_from_slices(key.as_bytes(), iv)
            .map_err(|_| CryptoError::InvalidKeyLength)?
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .map_err(|_| CryptoError::UnalignedInput(data.len()))?;
        Ok(buf)
    }

    fn cmac(&self, key: &AesKey, data: &[u8]) -> Result<Block, CryptoError> {
        let mut mac = <Cmac<Aes128> as KeyInit>::new_from_slice(key.as_bytes())
            .map_err(|_| CryptoError::InvalidKeyLength)?;
        mac.update(data);
        let tag = mac.finalize().into_bytes();

        let mut out = [0u8; BLOCK_SIZE];
        out.copy_from_slice(&tag);
        Ok(out)
    }
}

/// Truncate a full CMAC to the 8 odd-indexed bytes (1, 3, .., 15)
pub fn truncate_mac(mac: &Block) -> [u8; 8] {
    let mut out = [0u8; 8];
    for (dst, src) in out.iter_mut().zip(mac.iter().skip(1).step_by(2)) {
        *dst = *src;
    }
    out
}

/// Append ISO/IEC 9797-1 padding method 2 (0x80 then zeros). Always adds at least one byte.
pub fn pad_m2(data: &mut Vec<u8>) {
    data.push(0x80);
    while data.len() % BLOCK_SIZE != 0 {
        data.push(0x00);
    }
}

/// Strip ISO/IEC 9797-1 padding method 2
pub fn unpad_m2(data: &[u8]) -> Result<&[u8], CryptoError> {
    let end = data
        .iter()
        .rposition(|&b| b != 0x00)
        .ok_or(CryptoError::InvalidPadding)?;
    if data[end] != 0x80 {
        return Err(CryptoError::InvalidPadding);
    }
    Ok(&data[..end])
}

/// CRC32 as used by ChangeKey (JAMCRC: no final XOR), little-endian
pub fn jamcrc32(data: &[u8]) -> [u8; 4] {
    (!crc32fast::hash(data)).to_le_bytes()
}

/// Rotate a byte string left by one byte
pub(crate) fn rotate_left(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    if !out.is_empty() {
        out.rotate_left(1);
    }
    out
}

/// Error returned when parsing hex key material
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("AES key must be 32 hex characters")]
pub struct KeyParseError;

/// A 16-byte AES-128 key
///
/// Never printed; `Debug` is redacted and memory is wiped on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct AesKey([u8; 16]);

impl AesKey {
    /// Wrap raw key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// The all-zero key every NTAG 424 DNA ships with
    pub const fn factory() -> Self {
        Self([0u8; 16])
    }

    /// Generate a random key
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse a key from 32 hex characters
    pub fn from_hex(s: &str) -> Result<Self, KeyParseError> {
        let mut bytes = [0u8; 16];
        hex::decode_to_slice(s.trim(), &mut bytes).map_err(|_| KeyParseError)?;
        Ok(Self(bytes))
    }

    /// Hex-encode the key, for handing it to the caller's key store
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw key bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl Default for AesKey {
    fn default() -> Self {
        Self::factory()
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(..)")
    }
}

impl std::str::FromStr for AesKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl<'de> Deserialize<'de> for AesKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// The three keys bound to one card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySet {
    /// Master / authentication key (slot 0)
    pub key0: AesKey,
    /// Decrypts the PICC data mirrored into each tap
    pub picc_data_key: AesKey,
    /// Derives the per-tap session MAC key
    pub cmac_key: AesKey,
}

impl KeySet {
    /// Create a key set
    pub const fn new(key0: AesKey, picc_data_key: AesKey, cmac_key: AesKey) -> Self {
        Self {
            key0,
            picc_data_key,
            cmac_key,
        }
    }

    /// Generate a fresh random key set for a new card
    pub fn random() -> Self {
        Self::new(AesKey::random(), AesKey::random(), AesKey::random())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_ecb_fips197_vector() {
        // FIPS-197 appendix C.1
        let key = AesKey::new(hex!("000102030405060708090a0b0c0d0e0f"));
        let plain = hex!("00112233445566778899aabbccddeeff");
        let cipher = SoftAes.ecb_encrypt(&key, &plain).unwrap();
        assert_eq!(cipher, hex!("69c4e0d86a7b0430d8cdb78070b4c55a"));
        assert_eq!(SoftAes.ecb_decrypt(&key, &cipher).unwrap(), plain);
    }

    #[test]
    fn test_cbc_chains_blocks() {
        let key = AesKey::new(hex!("2b7e151628aed2a6abf7158809cf4f3c"));
        let iv = hex!("000102030405060708090a0b0c0d0e0f");
        // NIST SP 800-38A F.2.1, first two blocks
        let plain = hex!("6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51");
        let cipher = SoftAes.cbc_encrypt(&key, &iv, &plain).unwrap();
        assert_eq!(
            cipher,
            hex!("7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2")
        );
        assert_eq!(SoftAes.cbc_decrypt(&key, &iv, &cipher).unwrap(), plain);
    }

    #[test]
    fn test_cmac_rfc4493_vectors() {
        let key = AesKey::new(hex!("2b7e151628aed2a6abf7158809cf4f3c"));
        assert_eq!(
            SoftAes.cmac(&key, &[]).unwrap(),
            hex!("bb1d6929e95937287fa37d129b756746")
        );
        assert_eq!(
            SoftAes
                .cmac(&key, &hex!("6bc1bee22e409f96e93d7e117393172a"))
                .unwrap(),
            hex!("070a16b46b4d4144f79bdd9dd04a287c")
        );
    }

    #[test]
    fn test_unaligned_input_rejected() {
        let key = AesKey::factory();
        assert_eq!(
            SoftAes.ecb_decrypt(&key, &[0u8; 15]),
            Err(CryptoError::UnalignedInput(15))
        );
        assert_eq!(
            SoftAes.cbc_encrypt(&key, &[0u8; 16], &[0u8; 17]),
            Err(CryptoError::UnalignedInput(17))
        );
    }

    #[test]
    fn test_truncate_mac_takes_odd_bytes() {
        let mac: Block = core::array::from_fn(|i| i as u8);
        assert_eq!(truncate_mac(&mac), [1, 3, 5, 7, 9, 11, 13, 15]);
    }

    #[test]
    fn test_m2_padding() {
        let mut data = vec![0x01, 0x02];
        pad_m2(&mut data);
        assert_eq!(data.len(), 16);
        assert_eq!(data[2], 0x80);
        assert_eq!(unpad_m2(&data).unwrap(), &[0x01, 0x02]);

        // A full block still gets a whole padding block
        let mut full = vec![0xAA; 16];
        pad_m2(&mut full);
        assert_eq!(full.len(), 32);
        assert_eq!(unpad_m2(&full).unwrap(), &[0xAA; 16][..]);

        assert_eq!(unpad_m2(&[0u8; 16]), Err(CryptoError::InvalidPadding));
        assert_eq!(unpad_m2(&[0x01; 16]), Err(CryptoError::InvalidPadding));
    }

    #[test]
    fn test_jamcrc_is_inverted_crc32() {
        // CRC-32 of "123456789" is CBF43926, JAMCRC is its complement
        assert_eq!(jamcrc32(b"123456789"), 0x340B_C6D9u32.to_le_bytes());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = AesKey::from_hex("00112233445566778899aabbccddeeff").unwrap();
        assert_eq!(format!("{key:?}"), "AesKey(..)");
        assert!(!format!("{:?}", KeySet::new(key.clone(), key.clone(), key)).contains("0011"));
    }

    #[test]
    fn test_key_hex_parsing() {
        let key: AesKey = "00112233445566778899AABBCCDDEEFF".parse().unwrap();
        assert_eq!(key.to_hex(), "00112233445566778899aabbccddeeff");
        assert_eq!(AesKey::from_hex("0011"), Err(KeyParseError));
        assert_eq!(AesKey::from_hex("zz112233445566778899aabbccddeeff"), Err(KeyParseError));
    }
}
