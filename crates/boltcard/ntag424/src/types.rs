//! Small value types shared across the card subsystem

use std::fmt;

use derive_more::Display;

use crate::file::Permission;

/// A 7-byte NTAG 424 DNA chip UID
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid([u8; 7]);

impl Uid {
    /// Length of a chip UID
    pub const LEN: usize = 7;

    /// Wrap raw UID bytes
    pub const fn new(bytes: [u8; 7]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, which must be exactly 7 bytes
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        bytes.try_into().ok().map(Self)
    }

    /// Raw UID bytes
    pub const fn as_bytes(&self) -> &[u8; 7] {
        &self.0
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

/// One of the five on-card AES key positions
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeySlot {
    /// Master / authentication key
    #[display("key0")]
    Key0 = 0,
    /// General purpose key 1
    #[display("key1")]
    Key1 = 1,
    /// General purpose key 2
    #[display("key2")]
    Key2 = 2,
    /// General purpose key 3
    #[display("key3")]
    Key3 = 3,
    /// General purpose key 4
    #[display("key4")]
    Key4 = 4,
}

impl KeySlot {
    /// Slot for a raw key number
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Key0),
            1 => Some(Self::Key1),
            2 => Some(Self::Key2),
            3 => Some(Self::Key3),
            4 => Some(Self::Key4),
            _ => None,
        }
    }

    /// Raw key number
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// The following slot, or `None` after slot 4
    pub const fn next(self) -> Option<Self> {
        Self::from_u8(self.number() + 1)
    }

    /// Access condition granting exactly this key
    pub const fn to_permission(self) -> Permission {
        match self {
            Self::Key0 => Permission::Key0,
            Self::Key1 => Permission::Key1,
            Self::Key2 => Permission::Key2,
            Self::Key3 => Permission::Key3,
            Self::Key4 => Permission::Key4,
        }
    }
}

/// Standard files of the NTAG 424 DNA application
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FileNumber {
    /// Capability Container (ISO file id E103)
    #[display("CC file (#1)")]
    CapabilityContainer = 1,
    /// NDEF file (ISO file id E104)
    #[display("NDEF file (#2)")]
    Ndef = 2,
    /// Proprietary file (ISO file id E105)
    #[display("proprietary file (#3)")]
    Proprietary = 3,
}

impl FileNumber {
    /// Native file number
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// ISO 7816 file identifier
    pub const fn iso_file_id(self) -> [u8; 2] {
        match self {
            Self::CapabilityContainer => [0xE1, 0x03],
            Self::Ndef => [0xE1, 0x04],
            Self::Proprietary => [0xE1, 0x05],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_slot_next() {
        assert_eq!(KeySlot::Key1.next(), Some(KeySlot::Key2));
        assert_eq!(KeySlot::Key3.next(), Some(KeySlot::Key4));
        assert_eq!(KeySlot::Key4.next(), None);
        assert_eq!(KeySlot::from_u8(5), None);
        assert_eq!(KeySlot::Key2.to_permission(), Permission::Key2);
    }

    #[test]
    fn test_uid_display() {
        let uid = Uid::new([0x04, 0xDE, 0x5F, 0x1E, 0xAC, 0xC0, 0x40]);
        assert_eq!(uid.to_string(), "04DE5F1EACC040");
        assert_eq!(Uid::from_slice(&[0u8; 6]), None);
    }
}
