//! NTAG 424 DNA native command set (ISO 7816-4 wrapped, CLA 90)

use boltcard_apdu_core::prelude::*;
use derive_more::Display;

/// Class byte of wrapped native commands
pub const CLA_NATIVE: u8 = 0x90;

/// SW1 of every native response
pub const SW1_NATIVE: u8 = 0x91;

/// Instruction bytes
pub mod ins {
    /// AuthenticateEV2First, part 1
    pub const AUTHENTICATE_EV2_FIRST: u8 = 0x71;
    /// Continuation frame (also AuthenticateEV2First part 2)
    pub const ADDITIONAL_FRAME: u8 = 0xAF;
    /// GetCardUID
    pub const GET_CARD_UID: u8 = 0x51;
    /// GetKeyVersion
    pub const GET_KEY_VERSION: u8 = 0x64;
    /// ChangeKey
    pub const CHANGE_KEY: u8 = 0xC4;
    /// GetFileSettings
    pub const GET_FILE_SETTINGS: u8 = 0xF5;
    /// ChangeFileSettings
    pub const CHANGE_FILE_SETTINGS: u8 = 0x5F;
    /// ReadData
    pub const READ_DATA: u8 = 0xAD;
    /// WriteData
    pub const WRITE_DATA: u8 = 0x8D;
}

/// Native status (the SW2 of a `91 XX` answer)
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeStatus {
    /// Successful operation
    #[display("operation ok")]
    Ok,
    /// More frames follow
    #[display("additional frame")]
    AdditionalFrame,
    /// Command code not supported
    #[display("illegal command")]
    IllegalCommand,
    /// CRC or MAC does not match, or invalid padding
    #[display("integrity error")]
    IntegrityError,
    /// Invalid key number
    #[display("no such key")]
    NoSuchKey,
    /// Command has wrong length
    #[display("length error")]
    LengthError,
    /// Current configuration or status does not allow the command
    #[display("permission denied")]
    PermissionDenied,
    /// Parameter value not allowed
    #[display("parameter error")]
    ParameterError,
    /// Authentication delay still active
    #[display("authentication delay")]
    AuthenticationDelay,
    /// Current authentication does not allow the command
    #[display("authentication error")]
    AuthenticationError,
    /// Read or write beyond file limits
    #[display("boundary error")]
    BoundaryError,
    /// Previous command was not fully completed
    #[display("command aborted")]
    CommandAborted,
    /// Failure when reading or writing non-volatile memory
    #[display("memory error")]
    MemoryError,
    /// Specified file does not exist
    #[display("file not found")]
    FileNotFound,
    /// Anything else
    #[display("unknown status 0x{_0:02X}")]
    Unknown(u8),
}

impl NativeStatus {
    /// Interpret an SW2 byte
    pub const fn from_sw2(sw2: u8) -> Self {
        match sw2 {
            0x00 => Self::Ok,
            0xAF => Self::AdditionalFrame,
            0x1C => Self::IllegalCommand,
            0x1E => Self::IntegrityError,
            0x40 => Self::NoSuchKey,
            0x7E => Self::LengthError,
            0x9D => Self::PermissionDenied,
            0x9E => Self::ParameterError,
            0xAD => Self::AuthenticationDelay,
            0xAE => Self::AuthenticationError,
            0xBE => Self::BoundaryError,
            0xCA => Self::CommandAborted,
            0xEE => Self::MemoryError,
            0xF0 => Self::FileNotFound,
            other => Self::Unknown(other),
        }
    }

    /// Interpret a full status word; `None` unless SW1 is `91`
    pub const fn from_status(status: StatusWord) -> Option<Self> {
        if status.sw1 == SW1_NATIVE {
            Some(Self::from_sw2(status.sw2))
        } else {
            None
        }
    }
}

/// Build a wrapped native command: `90 INS 00 00 [Lc data] 00`
pub fn native_command(ins: u8, data: impl Into<Bytes>) -> Command {
    let data = data.into();
    if data.is_empty() {
        Command::new_with_le(CLA_NATIVE, ins, 0x00, 0x00, 0x00)
    } else {
        Command::new_with_data_and_le(CLA_NATIVE, ins, 0x00, 0x00, data, 0x00)
    }
}
