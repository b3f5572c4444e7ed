//! NTAG 424 DNA file settings, including Secure Dynamic Messaging (SDM)
//!
//! Two byte layouts exist. `GetFileSettings` answers carry the file type and size;
//! the `ChangeFileSettings` payload omits both. Everything else is shared:
//!
//! ```text
//! [FileType] FileOption AR1 AR2 [FileSize:3]
//!   SDMOptions SDMAR1 SDMAR2
//!   [UIDOffset:3] [CtrOffset:3] | [PICCDataOffset:3]
//!   [MACInputOffset:3 [ENCOffset:3 ENCLength:3] MACOffset:3]
//!   [CtrLimit:3]
//! ```
//!
//! All multi-byte values are 24-bit little-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use derive_more::Display;

use crate::error::SettingsError;
use crate::file::ndef::NdefTemplate;
use crate::types::KeySlot;

const FILE_OPTION_SDM: u8 = 0b0100_0000;
const FILE_OPTION_COMM_MASK: u8 = 0b0000_0011;

const SDM_OPTION_UID: u8 = 0b1000_0000;
const SDM_OPTION_READ_COUNTER: u8 = 0b0100_0000;
const SDM_OPTION_READ_COUNTER_LIMIT: u8 = 0b0010_0000;
const SDM_OPTION_ENCRYPT_FILE_DATA: u8 = 0b0001_0000;
const SDM_OPTION_ASCII: u8 = 0b0000_0001;

const MAX_U24: u32 = 0x00FF_FFFF;

/// Access condition nibble
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    /// Key 0 required
    #[display("key0")]
    Key0,
    /// Key 1 required
    #[display("key1")]
    Key1,
    /// Key 2 required
    #[display("key2")]
    Key2,
    /// Key 3 required
    #[display("key3")]
    Key3,
    /// Key 4 required
    #[display("key4")]
    Key4,
    /// Free access
    #[display("all")]
    All,
    /// No access
    #[display("none")]
    None,
}

impl Permission {
    /// Decode an access condition nibble. Reserved values deny access.
    pub const fn from_nibble(nibble: u8) -> Self {
        match nibble & 0x0F {
            0x0 => Self::Key0,
            0x1 => Self::Key1,
            0x2 => Self::Key2,
            0x3 => Self::Key3,
            0x4 => Self::Key4,
            0xE => Self::All,
            _ => Self::None,
        }
    }

    /// Encode as an access condition nibble
    pub const fn nibble(self) -> u8 {
        match self {
            Self::Key0 => 0x0,
            Self::Key1 => 0x1,
            Self::Key2 => 0x2,
            Self::Key3 => 0x3,
            Self::Key4 => 0x4,
            Self::All => 0xE,
            Self::None => 0xF,
        }
    }

    /// The key slot this condition names, if it names one
    pub const fn key_slot(self) -> Option<KeySlot> {
        KeySlot::from_u8(self.nibble())
    }
}

/// Secure messaging mode of a file
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CommunicationMode {
    /// No protection
    #[default]
    #[display("plain")]
    Plain,
    /// Truncated CMAC on command and response
    #[display("mac")]
    Mac,
    /// Encrypted and MACed
    #[display("full")]
    Full,
}

impl CommunicationMode {
    /// Decode from the low two bits of a file option byte
    pub const fn from_bits(bits: u8) -> Self {
        match bits & FILE_OPTION_COMM_MASK {
            0b01 => Self::Mac,
            0b11 => Self::Full,
            _ => Self::Plain,
        }
    }

    /// Encode as the low two bits of a file option byte
    pub const fn bits(self) -> u8 {
        match self {
            Self::Plain => 0b00,
            Self::Mac => 0b01,
            Self::Full => 0b11,
        }
    }
}

/// Which of the two file settings layouts to produce or parse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingMode {
    /// Layout returned by GetFileSettings (with file type and size)
    GetFileSettings,
    /// Payload of ChangeFileSettings
    ChangeFileSettings,
}

/// SDM mirroring flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SdmOptions {
    /// Mirror the UID
    pub uid: bool,
    /// Mirror the read counter
    pub read_counter: bool,
    /// Enforce a read counter limit
    pub read_counter_limit: bool,
    /// Encrypt part of the file data
    pub encrypt_file_data: bool,
    /// Mirror as ASCII hex instead of binary
    pub use_ascii: bool,
}

impl SdmOptions {
    const fn to_byte(self) -> u8 {
        let mut byte = 0;
        if self.uid {
            byte |= SDM_OPTION_UID;
        }
        if self.read_counter {
            byte |= SDM_OPTION_READ_COUNTER;
        }
        if self.read_counter_limit {
            byte |= SDM_OPTION_READ_COUNTER_LIMIT;
        }
        if self.encrypt_file_data {
            byte |= SDM_OPTION_ENCRYPT_FILE_DATA;
        }
        if self.use_ascii {
            byte |= SDM_OPTION_ASCII;
        }
        byte
    }

    const fn from_byte(byte: u8) -> Self {
        Self {
            uid: byte & SDM_OPTION_UID != 0,
            read_counter: byte & SDM_OPTION_READ_COUNTER != 0,
            read_counter_limit: byte & SDM_OPTION_READ_COUNTER_LIMIT != 0,
            encrypt_file_data: byte & SDM_OPTION_ENCRYPT_FILE_DATA != 0,
            use_ascii: byte & SDM_OPTION_ASCII != 0,
        }
    }
}

/// Secure Dynamic Messaging parameters
///
/// Offsets point into the NDEF file. Which of them travel on the wire depends on
/// the options and the two read permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdmSettings {
    /// Mirroring flags
    pub options: SdmOptions,
    /// Key that may read plain UID/counter (`All`) or decrypt PICC data (a key)
    pub meta_read: Permission,
    /// Key used to derive the SDM MAC
    pub file_read: Permission,
    /// Key allowed to retrieve the SDM read counter
    pub counter_retrieval: Permission,
    /// Plain UID mirror position
    pub uid_offset: Option<u32>,
    /// Plain read counter mirror position
    pub read_counter_offset: Option<u32>,
    /// Encrypted PICC data mirror position
    pub picc_data_offset: Option<u32>,
    /// First byte covered by the SDM MAC
    pub mac_input_offset: Option<u32>,
    /// SDM MAC mirror position
    pub mac_offset: Option<u32>,
    /// Start of the encrypted file data
    pub enc_offset: Option<u32>,
    /// Length of the encrypted file data
    pub enc_length: Option<u32>,
    /// Read counter limit
    pub read_counter_limit: Option<u32>,
}

impl Default for SdmSettings {
    fn default() -> Self {
        Self {
            options: SdmOptions::default(),
            meta_read: Permission::None,
            file_read: Permission::None,
            counter_retrieval: Permission::None,
            uid_offset: None,
            read_counter_offset: None,
            picc_data_offset: None,
            mac_input_offset: None,
            mac_offset: None,
            enc_offset: None,
            enc_length: None,
            read_counter_limit: None,
        }
    }
}

/// Access control and SDM configuration of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSettings {
    /// File type (only present in GetFileSettings answers)
    pub file_type: u8,
    /// Secure messaging mode
    pub communication_mode: CommunicationMode,
    /// Read access
    pub read_permission: Permission,
    /// Write access
    pub write_permission: Permission,
    /// Read-write access
    pub read_write_permission: Permission,
    /// Access needed to change these settings
    pub change_permission: Permission,
    /// File size in bytes (only present in GetFileSettings answers)
    pub file_size: u32,
    /// SDM configuration, when enabled
    pub sdm: Option<SdmSettings>,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            file_type: 0,
            communication_mode: CommunicationMode::Plain,
            read_permission: Permission::None,
            write_permission: Permission::None,
            read_write_permission: Permission::None,
            change_permission: Permission::None,
            file_size: 0,
            sdm: None,
        }
    }
}

fn put_u24(buf: &mut BytesMut, field: &'static str, value: u32) -> Result<(), SettingsError> {
    if value > MAX_U24 {
        return Err(SettingsError::ValueTooLarge { field, value });
    }
    buf.put_uint_le(value as u64, 3);
    Ok(())
}

fn put_required(
    buf: &mut BytesMut,
    field: &'static str,
    value: Option<u32>,
) -> Result<(), SettingsError> {
    let value = value.ok_or(SettingsError::MissingField(field))?;
    put_u24(buf, field, value)
}

fn take_u8(buf: &mut &[u8]) -> Option<u8> {
    buf.has_remaining().then(|| buf.get_u8())
}

fn take_u24(buf: &mut &[u8]) -> Option<u32> {
    (buf.remaining() >= 3).then(|| buf.get_uint_le(3) as u32)
}

impl FileSettings {
    /// Factory settings of the Capability Container file
    pub fn default_cc_file() -> Self {
        Self {
            read_permission: Permission::All,
            write_permission: Permission::Key0,
            read_write_permission: Permission::Key0,
            change_permission: Permission::Key0,
            file_size: 32,
            ..Self::default()
        }
    }

    /// Factory settings of the NDEF file: free read/write, SDM off
    pub fn default_ndef_file() -> Self {
        Self {
            read_permission: Permission::All,
            write_permission: Permission::All,
            read_write_permission: Permission::All,
            change_permission: Permission::Key0,
            file_size: 256,
            ..Self::default()
        }
    }

    /// Factory settings of the proprietary file
    pub fn default_proprietary_file() -> Self {
        Self {
            communication_mode: CommunicationMode::Full,
            read_permission: Permission::Key2,
            write_permission: Permission::Key3,
            read_write_permission: Permission::Key3,
            change_permission: Permission::Key0,
            file_size: 128,
            ..Self::default()
        }
    }

    /// NDEF file settings for a Bolt Card
    ///
    /// Public read, everything else behind key 0, UID and counter mirrored as
    /// encrypted PICC data, and an SDM MAC over an empty input window placed at the
    /// template's `cmac` placeholder.
    pub fn sun_ndef_file(
        template: &NdefTemplate,
        picc_data_slot: KeySlot,
        cmac_slot: KeySlot,
        file_size: u32,
    ) -> Self {
        Self {
            communication_mode: CommunicationMode::Full,
            read_permission: Permission::All,
            write_permission: Permission::Key0,
            read_write_permission: Permission::Key0,
            change_permission: Permission::Key0,
            file_size,
            sdm: Some(SdmSettings {
                options: SdmOptions {
                    uid: true,
                    read_counter: true,
                    use_ascii: true,
                    ..SdmOptions::default()
                },
                meta_read: picc_data_slot.to_permission(),
                file_read: cmac_slot.to_permission(),
                picc_data_offset: Some(template.picc_data_offset()),
                mac_input_offset: Some(template.cmac_offset()),
                mac_offset: Some(template.cmac_offset()),
                ..SdmSettings::default()
            }),
            ..Self::default()
        }
    }

    /// Whether SDM is enabled
    pub const fn sdm_enabled(&self) -> bool {
        self.sdm.is_some()
    }

    /// Mode used for ReadData: free access is always plain
    pub fn read_mode(&self) -> CommunicationMode {
        if self.read_permission == Permission::All {
            CommunicationMode::Plain
        } else {
            self.communication_mode
        }
    }

    /// Mode used for WriteData: free access is always plain
    pub fn write_mode(&self) -> CommunicationMode {
        if self.write_permission == Permission::All {
            CommunicationMode::Plain
        } else {
            self.communication_mode
        }
    }

    /// Serialize in the requested layout
    ///
    /// Fails when an SDM option or permission requires an offset that is unset.
    pub fn encode(&self, mode: EncodingMode) -> Result<Bytes, SettingsError> {
        let mut buf = BytesMut::with_capacity(32);

        if mode == EncodingMode::GetFileSettings {
            buf.put_u8(self.file_type);
        }

        let sdm_flag = if self.sdm.is_some() { FILE_OPTION_SDM } else { 0 };
        buf.put_u8(sdm_flag | self.communication_mode.bits());

        buf.put_u8(self.read_write_permission.nibble() << 4 | self.change_permission.nibble());
        buf.put_u8(self.read_permission.nibble() << 4 | self.write_permission.nibble());

        if mode == EncodingMode::GetFileSettings {
            put_u24(&mut buf, "file size", self.file_size)?;
        }

        if let Some(sdm) = &self.sdm {
            buf.put_u8(sdm.options.to_byte());
            buf.put_u8(0xF0 | sdm.counter_retrieval.nibble());
            buf.put_u8(sdm.meta_read.nibble() << 4 | sdm.file_read.nibble());

            match sdm.meta_read {
                Permission::All => {
                    if sdm.options.uid {
                        put_required(&mut buf, "SDM UID offset", sdm.uid_offset)?;
                    }
                    if sdm.options.read_counter {
                        put_required(&mut buf, "SDM read counter offset", sdm.read_counter_offset)?;
                    }
                }
                Permission::None => {}
                _ => put_required(&mut buf, "SDM PICC data offset", sdm.picc_data_offset)?,
            }

            if sdm.file_read != Permission::None {
                put_required(&mut buf, "SDM MAC input offset", sdm.mac_input_offset)?;
                if sdm.options.encrypt_file_data {
                    put_required(&mut buf, "SDM ENC offset", sdm.enc_offset)?;
                    put_required(&mut buf, "SDM ENC length", sdm.enc_length)?;
                }
                put_required(&mut buf, "SDM MAC offset", sdm.mac_offset)?;
            }

            if sdm.options.read_counter_limit {
                put_required(&mut buf, "SDM read counter limit", sdm.read_counter_limit)?;
            }
        }

        Ok(buf.freeze())
    }

    /// Parse either layout. Short or truncated input yields `None`.
    pub fn decode(data: &[u8], mode: EncodingMode) -> Option<Self> {
        let mut buf = data;
        let mut settings = Self::default();

        if mode == EncodingMode::GetFileSettings {
            settings.file_type = take_u8(&mut buf)?;
        }

        let options = take_u8(&mut buf)?;
        settings.communication_mode = CommunicationMode::from_bits(options);

        let ar1 = take_u8(&mut buf)?;
        let ar2 = take_u8(&mut buf)?;
        settings.read_write_permission = Permission::from_nibble(ar1 >> 4);
        settings.change_permission = Permission::from_nibble(ar1);
        settings.read_permission = Permission::from_nibble(ar2 >> 4);
        settings.write_permission = Permission::from_nibble(ar2);

        if mode == EncodingMode::GetFileSettings {
            settings.file_size = take_u24(&mut buf)?;
        }

        if options & FILE_OPTION_SDM == 0 {
            return Some(settings);
        }

        let mut sdm = SdmSettings {
            options: SdmOptions::from_byte(take_u8(&mut buf)?),
            ..SdmSettings::default()
        };
        let sdm_ar1 = take_u8(&mut buf)?;
        let sdm_ar2 = take_u8(&mut buf)?;
        sdm.counter_retrieval = Permission::from_nibble(sdm_ar1);
        sdm.meta_read = Permission::from_nibble(sdm_ar2 >> 4);
        sdm.file_read = Permission::from_nibble(sdm_ar2);

        match sdm.meta_read {
            Permission::All => {
                if sdm.options.uid {
                    sdm.uid_offset = Some(take_u24(&mut buf)?);
                }
                if sdm.options.read_counter {
                    sdm.read_counter_offset = Some(take_u24(&mut buf)?);
                }
            }
            Permission::None => {}
            _ => sdm.picc_data_offset = Some(take_u24(&mut buf)?),
        }

        if sdm.file_read != Permission::None {
            sdm.mac_input_offset = Some(take_u24(&mut buf)?);
            if sdm.options.encrypt_file_data {
                sdm.enc_offset = Some(take_u24(&mut buf)?);
                sdm.enc_length = Some(take_u24(&mut buf)?);
            }
            sdm.mac_offset = Some(take_u24(&mut buf)?);
        }

        if sdm.options.read_counter_limit {
            sdm.read_counter_limit = Some(take_u24(&mut buf)?);
        }

        settings.sdm = Some(sdm);
        Some(settings)
    }

    /// Check that mirrored fields are laid out in order and fit in `file_size`
    ///
    /// `file_size` must be set; ChangeFileSettings payloads do not carry it.
    pub fn validate(&self) -> Result<(), SettingsError> {
        let Some(sdm) = &self.sdm else {
            return Ok(());
        };

        let ascii = sdm.options.use_ascii;
        let width = |binary: u32| if ascii { binary * 2 } else { binary };

        let fields = [
            ("UID", sdm.uid_offset, width(7)),
            ("read counter", sdm.read_counter_offset, width(3)),
            ("PICC data", sdm.picc_data_offset, width(16)),
            ("MAC input", sdm.mac_input_offset, 0),
            ("encrypted data", sdm.enc_offset, sdm.enc_length.unwrap_or(0)),
            ("MAC", sdm.mac_offset, width(8)),
        ];

        let mut previous: Option<(&'static str, u32)> = None;
        for (field, offset, len) in fields {
            let Some(offset) = offset else { continue };

            if let Some((previous, previous_offset)) = previous {
                if offset < previous_offset {
                    return Err(SettingsError::OffsetOutOfOrder {
                        field,
                        offset,
                        previous,
                        previous_offset,
                    });
                }
            }

            let end = offset.saturating_add(len);
            if end > self.file_size {
                return Err(SettingsError::OffsetOutOfBounds {
                    field,
                    end,
                    file_size: self.file_size,
                });
            }

            previous = Some((field, offset));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;

    use super::*;

    fn sdm_settings() -> FileSettings {
        FileSettings {
            communication_mode: CommunicationMode::Full,
            read_permission: Permission::All,
            write_permission: Permission::Key0,
            read_write_permission: Permission::Key0,
            change_permission: Permission::Key0,
            file_size: 256,
            sdm: Some(SdmSettings {
                options: SdmOptions {
                    uid: true,
                    read_counter: true,
                    use_ascii: true,
                    ..SdmOptions::default()
                },
                meta_read: Permission::Key1,
                file_read: Permission::Key2,
                picc_data_offset: Some(0x2F),
                mac_input_offset: Some(0x5A),
                mac_offset: Some(0x5A),
                ..SdmSettings::default()
            }),
            ..FileSettings::default()
        }
    }

    #[test]
    fn test_encode_change_file_settings() {
        let encoded = sdm_settings()
            .encode(EncodingMode::ChangeFileSettings)
            .unwrap();
        assert_eq!(
            encoded.as_ref(),
            hex!("43 00 E0 C1 FF 12 2F0000 5A0000 5A0000")
        );
    }

    #[test]
    fn test_encode_get_file_settings_layout() {
        let encoded = FileSettings::default_ndef_file()
            .encode(EncodingMode::GetFileSettings)
            .unwrap();
        // type, options, AR1 (RW=E, Change=0), AR2 (R=E, W=E), size 256
        assert_eq!(encoded.as_ref(), hex!("00 00 E0 EE 000100"));
    }

    #[test]
    fn test_change_file_settings_round_trip() {
        let settings = sdm_settings();
        let encoded = settings.encode(EncodingMode::ChangeFileSettings).unwrap();
        let decoded = FileSettings::decode(&encoded, EncodingMode::ChangeFileSettings).unwrap();

        // The change layout carries neither file type nor size
        assert_eq!(
            decoded,
            FileSettings {
                file_size: 0,
                ..settings
            }
        );
    }

    #[test]
    fn test_round_trip_all_optional_fields() {
        let settings = FileSettings {
            communication_mode: CommunicationMode::Mac,
            read_permission: Permission::Key3,
            write_permission: Permission::Key4,
            read_write_permission: Permission::None,
            change_permission: Permission::Key0,
            sdm: Some(SdmSettings {
                options: SdmOptions {
                    uid: true,
                    read_counter: true,
                    read_counter_limit: true,
                    encrypt_file_data: true,
                    use_ascii: false,
                },
                meta_read: Permission::All,
                file_read: Permission::Key1,
                counter_retrieval: Permission::Key2,
                uid_offset: Some(10),
                read_counter_offset: Some(20),
                mac_input_offset: Some(30),
                enc_offset: Some(40),
                enc_length: Some(32),
                mac_offset: Some(80),
                read_counter_limit: Some(0x00AB_CDEF),
                ..SdmSettings::default()
            }),
            ..FileSettings::default()
        };

        let encoded = settings.encode(EncodingMode::ChangeFileSettings).unwrap();
        assert_eq!(
            FileSettings::decode(&encoded, EncodingMode::ChangeFileSettings),
            Some(settings)
        );
    }

    #[test]
    fn test_get_file_settings_round_trip() {
        let mut settings = sdm_settings();
        settings.file_type = 0x00;
        let encoded = settings.encode(EncodingMode::GetFileSettings).unwrap();
        assert_eq!(
            FileSettings::decode(&encoded, EncodingMode::GetFileSettings),
            Some(settings)
        );
    }

    #[test]
    fn test_encode_missing_offset() {
        let mut settings = sdm_settings();
        if let Some(sdm) = settings.sdm.as_mut() {
            sdm.mac_offset = None;
        }
        assert_eq!(
            settings.encode(EncodingMode::ChangeFileSettings),
            Err(SettingsError::MissingField("SDM MAC offset"))
        );

        let mut settings = sdm_settings();
        if let Some(sdm) = settings.sdm.as_mut() {
            sdm.picc_data_offset = None;
        }
        assert_eq!(
            settings.encode(EncodingMode::ChangeFileSettings),
            Err(SettingsError::MissingField("SDM PICC data offset"))
        );
    }

    #[test]
    fn test_decode_truncated() {
        let encoded = sdm_settings()
            .encode(EncodingMode::ChangeFileSettings)
            .unwrap();
        for len in 0..encoded.len() {
            assert_eq!(
                FileSettings::decode(&encoded[..len], EncodingMode::ChangeFileSettings),
                None,
                "prefix of length {len} must not decode"
            );
        }
    }

    #[test]
    fn test_validate_offsets() {
        assert_eq!(sdm_settings().validate(), Ok(()));

        let mut backwards = sdm_settings();
        if let Some(sdm) = backwards.sdm.as_mut() {
            sdm.mac_offset = Some(0x10);
            sdm.mac_input_offset = Some(0x10);
        }
        assert!(matches!(
            backwards.validate(),
            Err(SettingsError::OffsetOutOfOrder {
                field: "MAC input",
                ..
            })
        ));

        let mut overflow = sdm_settings();
        if let Some(sdm) = overflow.sdm.as_mut() {
            sdm.mac_input_offset = Some(250);
            sdm.mac_offset = Some(250);
        }
        assert_eq!(
            overflow.validate(),
            Err(SettingsError::OffsetOutOfBounds {
                field: "MAC",
                end: 266,
                file_size: 256,
            })
        );
    }

    #[test]
    fn test_access_modes() {
        let settings = sdm_settings();
        assert_eq!(settings.read_mode(), CommunicationMode::Plain);
        assert_eq!(settings.write_mode(), CommunicationMode::Full);

        let proprietary = FileSettings::default_proprietary_file();
        assert_eq!(proprietary.read_mode(), CommunicationMode::Full);
    }

    #[test]
    fn test_permission_nibbles() {
        assert_eq!(Permission::from_nibble(0xE), Permission::All);
        assert_eq!(Permission::from_nibble(0xF), Permission::None);
        assert_eq!(Permission::from_nibble(0x7), Permission::None);
        assert_eq!(Permission::Key3.key_slot(), Some(KeySlot::Key3));
        assert_eq!(Permission::All.key_slot(), None);
    }
}
