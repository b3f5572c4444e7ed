//! NFC Forum Type 4 Tag commands
//!
//! Decoders never fail: a buffer that does not have the right shape is simply
//! "not this command", so the same bytes can be probed against each in turn.

use boltcard_apdu_core::prelude::*;

/// DF name of the NDEF Tag Application
pub const NDEF_APPLICATION_ID: [u8; 7] = [0xD2, 0x76, 0x00, 0x00, 0x85, 0x01, 0x01];

const CLA_ISO: u8 = 0x00;
const INS_SELECT: u8 = 0xA4;
const INS_READ_BINARY: u8 = 0xB0;
const P1_SELECT_BY_NAME: u8 = 0x04;
const P1_SELECT_BY_FILE_ID: u8 = 0x00;
const P2_FIRST_NO_FCI: u8 = 0x0C;

/// A decoded SELECT by file identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectFileCommand {
    /// Requested ISO file identifier
    pub file_id: [u8; 2],
}

/// A decoded READ BINARY
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadBinaryCommand {
    /// Offset into the selected file
    pub offset: u16,
    /// Number of bytes requested (Le 00 means 256)
    pub length: usize,
}

/// SELECT of the NDEF Tag Application by DF name
pub fn encode_select_ndef_application() -> Bytes {
    Command::new_with_data_and_le(
        CLA_ISO,
        INS_SELECT,
        P1_SELECT_BY_NAME,
        0x00,
        Bytes::from_static(&NDEF_APPLICATION_ID),
        0x00,
    )
    .to_bytes()
}

/// Whether the bytes are a SELECT of the NDEF Tag Application
pub fn is_ndef_application_select(apdu: &[u8]) -> bool {
    Command::from_bytes(apdu).is_ok_and(|command| {
        command.class() == CLA_ISO
            && command.instruction() == INS_SELECT
            && command.p1() == P1_SELECT_BY_NAME
            && command.p2() == 0x00
            && command.data_or_empty() == NDEF_APPLICATION_ID
    })
}

/// SELECT of an elementary file by identifier
pub fn encode_select_file(file_id: [u8; 2]) -> Bytes {
    Command::new_with_data(
        CLA_ISO,
        INS_SELECT,
        P1_SELECT_BY_FILE_ID,
        P2_FIRST_NO_FCI,
        Bytes::copy_from_slice(&file_id),
    )
    .to_bytes()
}

/// Decode a SELECT by file identifier
pub fn decode_select_file(apdu: &[u8]) -> Option<SelectFileCommand> {
    let command = Command::from_bytes(apdu).ok()?;
    if command.class() != CLA_ISO
        || command.instruction() != INS_SELECT
        || command.p1() != P1_SELECT_BY_FILE_ID
    {
        return None;
    }

    let file_id = command.data_or_empty().try_into().ok()?;
    Some(SelectFileCommand { file_id })
}

/// READ BINARY of `length` bytes at `offset`; a length of 0 requests 256 bytes
pub fn encode_read_binary(offset: u16, length: ExpectedLength) -> Bytes {
    let [p1, p2] = offset.to_be_bytes();
    Command::new_with_le(CLA_ISO, INS_READ_BINARY, p1, p2, length).to_bytes()
}

/// Decode a READ BINARY with a short offset and an explicit Le
pub fn decode_read_binary(apdu: &[u8]) -> Option<ReadBinaryCommand> {
    let command = Command::from_bytes(apdu).ok()?;
    if command.class() != CLA_ISO
        || command.instruction() != INS_READ_BINARY
        || command.data().is_some()
    {
        return None;
    }

    let le = command.expected_length()?;
    Some(ReadBinaryCommand {
        offset: u16::from_be_bytes([command.p1(), command.p2()]),
        length: if le == 0 { 256 } else { le as usize },
    })
}

/// `90 00`
pub fn encode_ok() -> Bytes {
    Bytes::copy_from_slice(&status::SUCCESS.to_bytes())
}

/// `6A 82`
pub fn encode_error() -> Bytes {
    Bytes::copy_from_slice(&status::FILE_NOT_FOUND.to_bytes())
}

/// Commands a Type 4 tag answers, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HceCommand {
    /// SELECT of the NDEF Tag Application
    SelectNdefApplication,
    /// SELECT by file identifier
    SelectFile(SelectFileCommand),
    /// READ BINARY from the selected file
    ReadBinary(ReadBinaryCommand),
}

impl HceCommand {
    /// Classify raw bytes; the first matching decoder wins
    pub fn decode(apdu: &[u8]) -> Option<Self> {
        if is_ndef_application_select(apdu) {
            return Some(Self::SelectNdefApplication);
        }
        if let Some(select) = decode_select_file(apdu) {
            return Some(Self::SelectFile(select));
        }
        decode_read_binary(apdu).map(Self::ReadBinary)
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    #[test]
    fn test_select_ndef_application() {
        let apdu = encode_select_ndef_application();
        assert_eq!(apdu.as_ref(), hex!("00 A4 04 00 07 D2760000850101 00"));
        assert!(is_ndef_application_select(&apdu));
        // Le is optional on the wire
        assert!(is_ndef_application_select(&apdu[..apdu.len() - 1]));
        assert!(!is_ndef_application_select(&hex!("00 A4 04 00 07 D2760000850102 00")));
        assert!(!is_ndef_application_select(&hex!("00 A4")));
    }

    #[test]
    fn test_select_file() {
        let apdu = encode_select_file([0xE1, 0x03]);
        assert_eq!(apdu.as_ref(), hex!("00 A4 00 0C 02 E103"));
        assert_eq!(
            decode_select_file(&apdu),
            Some(SelectFileCommand {
                file_id: [0xE1, 0x03]
            })
        );
        // Any P2 and a trailing Le are accepted
        assert_eq!(
            decode_select_file(&hex!("00 A4 00 00 02 E104 00")),
            Some(SelectFileCommand {
                file_id: [0xE1, 0x04]
            })
        );
        assert_eq!(decode_select_file(&hex!("00 A4 00 0C 01 E1")), None);
        assert_eq!(decode_select_file(&hex!("00 A4 00")), None);
        assert_eq!(decode_select_file(&encode_select_ndef_application()), None);
    }

    #[test]
    fn test_read_binary() {
        let apdu = encode_read_binary(0x0102, 0x0F);
        assert_eq!(apdu.as_ref(), hex!("00 B0 01 02 0F"));
        assert_eq!(
            decode_read_binary(&apdu),
            Some(ReadBinaryCommand {
                offset: 0x0102,
                length: 15
            })
        );
        assert_eq!(
            decode_read_binary(&encode_read_binary(0, 0)),
            Some(ReadBinaryCommand {
                offset: 0,
                length: 256
            })
        );
        assert_eq!(decode_read_binary(&hex!("00 B0 00 00")), None);
        assert_eq!(decode_read_binary(&hex!("00 B0")), None);
    }

    #[test]
    fn test_status_words() {
        assert_eq!(encode_ok().as_ref(), [0x90, 0x00]);
        assert_eq!(encode_error().as_ref(), [0x6A, 0x82]);
    }

    #[test]
    fn test_decode_dispatch() {
        assert_eq!(
            HceCommand::decode(&encode_select_ndef_application()),
            Some(HceCommand::SelectNdefApplication)
        );
        assert!(matches!(
            HceCommand::decode(&encode_select_file([0xE1, 0x04])),
            Some(HceCommand::SelectFile(_))
        ));
        assert!(matches!(
            HceCommand::decode(&encode_read_binary(0, 15)),
            Some(HceCommand::ReadBinary(_))
        ));
        assert_eq!(HceCommand::decode(&hex!("90 60 00 00 00")), None);
        assert_eq!(HceCommand::decode(&[]), None);
    }
}
