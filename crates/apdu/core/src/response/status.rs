//! Status words seen on a Type 4 tag exchange
//!
//! NTAG 424 DNA answers ISO commands (`00 ..`) with ordinary ISO 7816-4 status words
//! and wrapped native commands (`90 ..`) with `91 XX`, where SW2 is the native
//! status code.

use std::fmt;

/// Status Word (SW1-SW2) from an APDU response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord {
    /// First status byte (SW1)
    pub sw1: u8,
    /// Second status byte (SW2)
    pub sw2: u8,
}

impl StatusWord {
    /// Create a new status word
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// The two raw bytes, as they trail a response
    pub const fn to_bytes(&self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    /// ISO success (90 00)
    pub const fn is_success(&self) -> bool {
        self.sw1 == 0x90 && self.sw2 == 0x00
    }

    /// Answer to a wrapped native command (91 XX)
    pub const fn is_proprietary(&self) -> bool {
        self.sw1 == 0x91
    }

    /// Short human-readable meaning
    pub const fn description(&self) -> &'static str {
        match (self.sw1, self.sw2) {
            (0x90, 0x00) => "Success",
            (0x91, 0x00) => "Native command completed",
            (0x91, 0xAF) => "Native command expects an additional frame",
            (0x91, _) => "Native command failed",
            (0x67, 0x00) => "Wrong length",
            (0x69, 0x82) => "Security status not satisfied",
            (0x69, 0x85) => "Conditions of use not satisfied",
            (0x6A, 0x80) => "Incorrect data field",
            (0x6A, 0x82) => "File or application not found",
            (0x6A, 0x86) => "Incorrect P1-P2",
            (0x6A, 0x87) => "Lc inconsistent with P1-P2",
            (0x6C, _) => "Wrong Le field",
            (0x6D, 0x00) => "Instruction not supported",
            (0x6E, 0x00) => "Class not supported",
            _ => "Unknown status word",
        }
    }
}

impl From<(u8, u8)> for StatusWord {
    fn from((sw1, sw2): (u8, u8)) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X} {:02X}", self.sw1, self.sw2)
    }
}

/// Status words a Type 4 tag emulation answers with
pub mod common {
    use super::StatusWord;

    /// Success (90 00)
    pub const SUCCESS: StatusWord = StatusWord::new(0x90, 0x00);

    /// File not found (6A 82), also the generic failure of a Type 4 tag
    pub const FILE_NOT_FOUND: StatusWord = StatusWord::new(0x6A, 0x82);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_word_kinds() {
        assert!(common::SUCCESS.is_success());
        assert!(!common::SUCCESS.is_proprietary());
        assert!(StatusWord::new(0x91, 0x00).is_proprietary());
        assert!(!StatusWord::new(0x91, 0x00).is_success());
        assert!(!common::FILE_NOT_FOUND.is_success());
        assert_eq!(StatusWord::from((0x91, 0xAF)).to_bytes(), [0x91, 0xAF]);
    }

    #[test]
    fn test_status_word_description() {
        assert_eq!(common::SUCCESS.description(), "Success");
        assert_eq!(
            common::FILE_NOT_FOUND.description(),
            "File or application not found"
        );
        assert_eq!(
            StatusWord::new(0x91, 0xAE).description(),
            "Native command failed"
        );
        assert_eq!(
            StatusWord::new(0x91, 0xAF).description(),
            "Native command expects an additional frame"
        );
        assert_eq!(common::FILE_NOT_FOUND.to_string(), "6A 82");
    }
}
