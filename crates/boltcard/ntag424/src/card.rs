//! NTAG 424 DNA command set used by the provisioning flows

use boltcard_apdu_core::prelude::*;
use bytes::BufMut;
use tracing::{debug, trace};
use zeroize::Zeroize;

use crate::commands::native::ins;
use crate::commands::type4::NDEF_APPLICATION_ID;
use crate::crypto::{AesKey, AesProvider, jamcrc32};
use crate::error::{CardError, Result};
use crate::file::{CommunicationMode, EncodingMode, FileSettings};
use crate::session::DnaCommunicator;
use crate::types::{FileNumber, KeySlot, Uid};

/// Operations a provisioning flow needs from a card
///
/// [`DnaCommunicator`] implements this over a real transport; tests substitute an
/// in-memory card.
pub trait Ntag424 {
    /// Open the session and select the NTAG 424 DNA application
    fn connect(&mut self) -> Result<()>;

    /// Close the session. Never fails.
    fn disconnect(&mut self);

    /// AuthenticateEV2First with `key` in `slot`
    fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()>;

    /// Read the real 7-byte UID (GetCardUID)
    fn chip_uid(&mut self) -> Result<Uid>;

    /// Version byte of the key in `slot`
    fn key_version(&mut self, slot: KeySlot) -> Result<u8>;

    /// Replace the key in `slot`; `old` is the key currently stored there
    fn change_key(&mut self, slot: KeySlot, old: &AesKey, new: &AesKey, version: u8)
    -> Result<()>;

    /// GetFileSettings
    fn file_settings(&mut self, file: FileNumber) -> Result<FileSettings>;

    /// ChangeFileSettings
    fn change_file_settings(&mut self, file: FileNumber, settings: &FileSettings) -> Result<()>;

    /// ReadData of `length` bytes starting at `offset`
    fn read_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        length: usize,
        mode: CommunicationMode,
    ) -> Result<Bytes>;

    /// WriteData of `data` starting at `offset`
    fn write_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<()>;
}

impl<C: Ntag424 + ?Sized> Ntag424 for &mut C {
    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }

    fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()> {
        (**self).authenticate(slot, key)
    }

    fn chip_uid(&mut self) -> Result<Uid> {
        (**self).chip_uid()
    }

    fn key_version(&mut self, slot: KeySlot) -> Result<u8> {
        (**self).key_version(slot)
    }

    fn change_key(
        &mut self,
        slot: KeySlot,
        old: &AesKey,
        new: &AesKey,
        version: u8,
    ) -> Result<()> {
        (**self).change_key(slot, old, new, version)
    }

    fn file_settings(&mut self, file: FileNumber) -> Result<FileSettings> {
        (**self).file_settings(file)
    }

    fn change_file_settings(&mut self, file: FileNumber, settings: &FileSettings) -> Result<()> {
        (**self).change_file_settings(file, settings)
    }

    fn read_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        length: usize,
        mode: CommunicationMode,
    ) -> Result<Bytes> {
        (**self).read_file_data(file, offset, length, mode)
    }

    fn write_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<()> {
        (**self).write_file_data(file, offset, data, mode)
    }
}

/// ReadData / WriteData header: file number, 24-bit LE offset, 24-bit LE length
fn data_header(file: FileNumber, offset: u32, length: usize) -> Vec<u8> {
    let mut header = Vec::with_capacity(7);
    header.put_u8(file.number());
    header.put_uint_le(offset as u64, 3);
    header.put_uint_le(length as u64, 3);
    header
}

/// ChangeKey data for a slot other than the authenticated one
fn change_key_payload(old: &AesKey, new: &AesKey, version: u8) -> Vec<u8> {
    let mut payload: Vec<u8> = old
        .as_bytes()
        .iter()
        .zip(new.as_bytes())
        .map(|(o, n)| o ^ n)
        .collect();
    payload.push(version);
    payload.extend_from_slice(&jamcrc32(new.as_bytes()));
    payload
}

impl<T: CardTransport, A: AesProvider> DnaCommunicator<T, A> {
    /// Mode for commands that are MACed once authenticated
    const fn mac_mode(&self) -> CommunicationMode {
        if self.is_authenticated() {
            CommunicationMode::Mac
        } else {
            CommunicationMode::Plain
        }
    }
}

impl<T: CardTransport, A: AesProvider> Ntag424 for DnaCommunicator<T, A> {
    fn connect(&mut self) -> Result<()> {
        self.end_session();
        self.transport_mut().connect()?;

        let select = Command::new_with_data_and_le(
            0x00,
            0xA4,
            0x04,
            0x00,
            Bytes::from_static(&NDEF_APPLICATION_ID),
            0x00,
        );
        self.transceive_iso(&select)?;
        debug!("Selected NTAG 424 DNA application");
        Ok(())
    }

    fn disconnect(&mut self) {
        self.end_session();
        self.transport_mut().disconnect();
    }

    fn authenticate(&mut self, slot: KeySlot, key: &AesKey) -> Result<()> {
        DnaCommunicator::authenticate(self, slot, key)
    }

    fn chip_uid(&mut self) -> Result<Uid> {
        let data = self.send(ins::GET_CARD_UID, &[], &[], CommunicationMode::Full)?;
        Uid::from_slice(&data).ok_or(CardError::InvalidResponse("UID length"))
    }

    fn key_version(&mut self, slot: KeySlot) -> Result<u8> {
        let mode = self.mac_mode();
        let data = self.send(ins::GET_KEY_VERSION, &[slot.number()], &[], mode)?;
        data.first()
            .copied()
            .ok_or(CardError::InvalidResponse("empty key version"))
    }

    fn change_key(
        &mut self,
        slot: KeySlot,
        old: &AesKey,
        new: &AesKey,
        version: u8,
    ) -> Result<()> {
        debug!(%slot, version, "Changing key");

        if self.authenticated_slot() == Some(slot) {
            let mut payload = new.as_bytes().to_vec();
            payload.push(version);
            let outcome = self.send_final(ins::CHANGE_KEY, &[slot.number()], &payload);
            payload.zeroize();
            return outcome;
        }

        let mut payload = change_key_payload(old, new, version);
        let outcome = self.send(
            ins::CHANGE_KEY,
            &[slot.number()],
            &payload,
            CommunicationMode::Full,
        );
        payload.zeroize();
        outcome.map(|_| ())
    }

    fn file_settings(&mut self, file: FileNumber) -> Result<FileSettings> {
        let mode = self.mac_mode();
        let data = self.send(ins::GET_FILE_SETTINGS, &[file.number()], &[], mode)?;
        FileSettings::decode(&data, EncodingMode::GetFileSettings)
            .ok_or(CardError::InvalidResponse("file settings"))
    }

    fn change_file_settings(&mut self, file: FileNumber, settings: &FileSettings) -> Result<()> {
        let data = settings.encode(EncodingMode::ChangeFileSettings)?;
        trace!(%file, settings = %hex::encode(&data), "Changing file settings");
        self.send(
            ins::CHANGE_FILE_SETTINGS,
            &[file.number()],
            &data,
            CommunicationMode::Full,
        )?;
        Ok(())
    }

    fn read_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        length: usize,
        mode: CommunicationMode,
    ) -> Result<Bytes> {
        let mut out = BytesMut::with_capacity(length);
        while out.len() < length {
            let chunk = (length - out.len()).min(self.read_chunk());
            let header = data_header(file, offset + out.len() as u32, chunk);
            let data = self.send(ins::READ_DATA, &header, &[], mode)?;
            if data.is_empty() {
                break;
            }
            out.extend_from_slice(&data[..data.len().min(chunk)]);
        }
        Ok(out.freeze())
    }

    fn write_file_data(
        &mut self,
        file: FileNumber,
        offset: u32,
        data: &[u8],
        mode: CommunicationMode,
    ) -> Result<()> {
        let mut position = offset;
        for chunk in data.chunks(self.write_chunk()) {
            let header = data_header(file, position, chunk.len());
            self.send(ins::WRITE_DATA, &header, chunk, mode)?;
            position += chunk.len() as u32;
        }
        debug!(%file, offset, len = data.len(), "Wrote file data");
        Ok(())
    }
}
