//! Type 4 Tag Capability Container
//!
//! ```text
//! CCLEN:2 | version:1 | MLe:2 | MLc:2 | { T=04 L=06 fileId:2 maxSize:2 read:1 write:1 }*
//! ```
//!
//! All multi-byte fields are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::types::FileNumber;

/// Tag of an NDEF File Control TLV
pub const NDEF_FILE_CONTROL_TAG: u8 = 0x04;

const HEADER_LEN: usize = 7;
const TLV_LEN: usize = 8;
const TLV_VALUE_LEN: u8 = 6;

/// Describes one file reachable through the Capability Container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileControlTlv {
    /// TLV tag (04 for an NDEF file)
    pub tag: u8,
    /// ISO file identifier
    pub file_id: [u8; 2],
    /// Maximum file size
    pub file_size: u16,
    /// Read access byte (00 = free)
    pub read_access: u8,
    /// Write access byte (FF = denied)
    pub write_access: u8,
}

/// Capability Container file contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitiesContainer {
    /// Mapping version
    pub version: u8,
    /// Maximum R-APDU data size
    pub max_le: u16,
    /// Maximum C-APDU data size
    pub max_lc: u16,
    /// File control TLVs
    pub files: Vec<FileControlTlv>,
}

impl CapabilitiesContainer {
    /// Container served while emulating a tag: version 2.0, one read-only NDEF file
    pub fn hce_default() -> Self {
        Self {
            version: 0x20,
            max_le: 256,
            max_lc: 255,
            files: vec![FileControlTlv {
                tag: NDEF_FILE_CONTROL_TAG,
                file_id: FileNumber::Ndef.iso_file_id(),
                file_size: 512,
                read_access: 0x00,
                write_access: 0xFF,
            }],
        }
    }

    /// Encoded length, which is also the CCLEN field
    pub fn len(&self) -> usize {
        HEADER_LEN + TLV_LEN * self.files.len()
    }

    /// Whether there are no file control TLVs
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Serialize; CCLEN is derived from the TLV count
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        buf.put_u16(self.len() as u16);
        buf.put_u8(self.version);
        buf.put_u16(self.max_le);
        buf.put_u16(self.max_lc);
        for file in &self.files {
            buf.put_u8(file.tag);
            buf.put_u8(TLV_VALUE_LEN);
            buf.put_slice(&file.file_id);
            buf.put_u16(file.file_size);
            buf.put_u8(file.read_access);
            buf.put_u8(file.write_access);
        }
        buf.freeze()
    }

    /// Parse a Capability Container, bounded by its CCLEN field
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() < HEADER_LEN {
            return None;
        }

        let mut buf = data;
        let cclen = buf.get_u16() as usize;
        if cclen < HEADER_LEN || cclen > data.len() {
            return None;
        }
        let version = buf.get_u8();
        let max_le = buf.get_u16();
        let max_lc = buf.get_u16();

        let mut tlvs = &data[HEADER_LEN..cclen];
        let mut files = Vec::new();
        while tlvs.len() >= TLV_LEN {
            let tag = tlvs.get_u8();
            if tlvs.get_u8() != TLV_VALUE_LEN {
                return None;
            }
            files.push(FileControlTlv {
                tag,
                file_id: [tlvs.get_u8(), tlvs.get_u8()],
                file_size: tlvs.get_u16(),
                read_access: tlvs.get_u8(),
                write_access: tlvs.get_u8(),
            });
        }

        tlvs.is_empty().then_some(Self {
            version,
            max_le,
            max_lc,
            files,
        })
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_hce_default_bytes() {
        let cc = CapabilitiesContainer::hce_default();
        assert_eq!(
            cc.encode().as_ref(),
            hex!("000F 20 0100 00FF 04 06 E104 0200 00 FF")
        );
        assert_eq!(cc.len(), 15);
    }

    #[test]
    fn test_decode_round_trip() {
        let mut cc = CapabilitiesContainer::hce_default();
        cc.files.push(FileControlTlv {
            tag: 0x05,
            file_id: [0xE1, 0x05],
            file_size: 128,
            read_access: 0x82,
            write_access: 0x83,
        });

        let encoded = cc.encode();
        assert_eq!(&encoded[..2], &[0x00, 0x17]);
        assert_eq!(CapabilitiesContainer::decode(&encoded), Some(cc));
    }

    #[test]
    fn test_decode_rejects_malformed() {
        let encoded = CapabilitiesContainer::hce_default().encode();
        assert_eq!(CapabilitiesContainer::decode(&encoded[..6]), None);
        assert_eq!(CapabilitiesContainer::decode(&encoded[..14]), None);

        let mut bad_len = encoded.to_vec();
        bad_len[8] = 0x05;
        assert_eq!(CapabilitiesContainer::decode(&bad_len), None);
    }
}
