//! Common test utilities
#![allow(dead_code)]

use boltcard_apdu_core::{Bytes, TransportError};
use boltcard_ntag424::commands::NativeStatus;
use boltcard_ntag424::file::EncodingMode;
use boltcard_ntag424::{
    AesKey, CardError, CommunicationMode, FileNumber, FileSettings, KeySlot, Ntag424, Uid,
};

type Result<T> = std::result::Result<T, CardError>;

/// In-memory NTAG 424 DNA that enforces the key rules the flows rely on
#[derive(Debug)]
pub struct SimulatedCard {
    pub uid: Uid,
    pub keys: [AesKey; 5],
    pub versions: [u8; 5],
    /// Slots whose ChangeKey is refused regardless of the old key
    pub locked_slots: Vec<KeySlot>,
    /// Every slot a ChangeKey was attempted on, in order
    pub change_attempts: Vec<KeySlot>,
    pub settings: [FileSettings; 3],
    pub files: [Vec<u8>; 3],
    pub connected: bool,
    pub authenticated: Option<KeySlot>,
    /// Fails the next WriteData with this error
    pub fail_write: Option<TransportError>,
    /// Fails connect with this error
    pub fail_connect: Option<TransportError>,
}

const fn index(file: FileNumber) -> usize {
    file.number() as usize - 1
}

impl SimulatedCard {
    /// A card as it leaves the factory
    pub fn blank() -> Self {
        let factory = AesKey::factory();
        let mut cc = vec![
            0x00, 0x17, 0x20, 0x01, 0x00, 0x00, 0xFF, 0x04, 0x06, 0xE1, 0x04, 0x01, 0x00, 0x00,
            0x00, 0x05, 0x06, 0xE1, 0x05, 0x00, 0x80, 0x82, 0x83,
        ];
        cc.resize(32, 0);

        Self {
            uid: Uid::new([0x04, 0xDE, 0x5F, 0x1E, 0xAC, 0xC0, 0x40]),
            keys: std::array::from_fn(|_| factory.clone()),
            versions: [0; 5],
            locked_slots: Vec::new(),
            change_attempts: Vec::new(),
            settings: [
                FileSettings::default_cc_file(),
                FileSettings::default_ndef_file(),
                FileSettings::default_proprietary_file(),
            ],
            files: [cc, vec![0; 256], vec![0; 128]],
            connected: false,
            authenticated: None,
            fail_write: None,
            fail_connect: None,
        }
    }

    pub fn key(&self, slot: KeySlot) -> &AesKey {
        &self.keys[slot.number() as usize]
    }

    pub fn ndef_settings(&self) -> &FileSettings {
        &self.settings[index(FileNumber::Ndef)]
    }

    pub fn ndef_data(&self) -> &[u8] {
        &self.files[index(FileNumber::Ndef)]
    }

    fn require_key0(&self) -> Result<()> {
        match self.authenticated {
            Some(KeySlot::Key0) => Ok(()),
            Some(_) => Err(CardError::Status(NativeStatus::PermissionDenied)),
            None => Err(CardError::NotAuthenticated),
        }
    }

    fn require_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(CardError::Transport(TransportError::SessionTerminated))
        }
    }

    fn fail(&mut self, status: NativeStatus) -> CardError {
        self.authenticated = None;
        CardError::Status(status)
    }
}

impl Ntag424 for SimulatedCard {
    fn connect(&mut self) -> Result<()> {
        if let Some(e) = self.fail_connect.clone() {
            return Err(e.into());
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.authenticated = None;
    }

    fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()> {
        self.require_connected()?;
        if self.key(slot) == key {
            self.authenticated = Some(slot);
            Ok(())
        } else {
            Err(self.fail(NativeStatus::AuthenticationError))
        }
    }

    fn chip_uid(&mut self) -> Result<Uid> {
        self.require_connected()?;
        if self.authenticated.is_none() {
            return Err(CardError::NotAuthenticated);
        }
        Ok(self.uid)
    }

    fn key_version(&mut self, slot: KeySlot) -> Result<u8> {
        self.require_connected()?;
        Ok(self.versions[slot.number() as usize])
    }

    fn change_key(
        &mut self,
        slot: KeySlot,
        old: &AesKey,
        new: &AesKey,
        version: u8,
    ) -> Result<()> {
        self.require_connected()?;
        self.require_key0()?;
        self.change_attempts.push(slot);

        if self.locked_slots.contains(&slot) {
            return Err(self.fail(NativeStatus::PermissionDenied));
        }
        // The card recovers the new key from new ^ old and checks its CRC
        if slot != KeySlot::Key0 && self.key(slot) != old {
            return Err(self.fail(NativeStatus::IntegrityError));
        }

        self.keys[slot.number() as usize] = new.clone();
        self.versions[slot.number() as usize] = version;
        if slot == KeySlot::Key0 {
            self.authenticated = None;
        }
        Ok(())
    }

    fn file_settings(&mut self, file: FileNumber) -> Result<FileSettings> {
        self.require_connected()?;
        Ok(self.settings[index(file)].clone())
    }

    fn change_file_settings(&mut self, file: FileNumber, settings: &FileSettings) -> Result<()> {
        self.require_connected()?;
        self.require_key0()?;
        settings.encode(EncodingMode::ChangeFileSettings)?;

        let mut settings = settings.clone();
        settings.file_size = self.settings[index(file)].file_size;
        self.settings[index(file)] = settings;
        Ok(())
    }

    fn read_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        length: usize,
        _mode: CommunicationMode,
    ) -> Result<Bytes> {
        self.require_connected()?;
        let data = &self.files[index(file)];
        let start = offset as usize;
        let end = start + length;
        if end > data.len() {
            return Err(CardError::Status(NativeStatus::BoundaryError));
        }
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    fn write_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        data: &[u8],
        _mode: CommunicationMode,
    ) -> Result<()> {
        self.require_connected()?;
        if let Some(e) = self.fail_write.take() {
            return Err(e.into());
        }
        let write_permission = self.settings[index(file)].write_permission;
        if let Some(slot) = write_permission.key_slot() {
            if self.authenticated != Some(slot) {
                return Err(CardError::Status(NativeStatus::PermissionDenied));
            }
        }

        let file = &mut self.files[index(file)];
        let start = offset as usize;
        let end = start + data.len();
        if end > file.len() {
            return Err(CardError::Status(NativeStatus::BoundaryError));
        }
        file[start..end].copy_from_slice(data);
        Ok(())
    }
}
