//! Write, reset and inspect flows for Bolt Cards
//!
//! Every flow is a strict sequence of card commands. A failure aborts the rest of
//! the flow; nothing already committed to the card is rolled back.

use boltcard_apdu_core::{Bytes, CardTransport};
use derive_more::Display;
use tracing::{debug, info, instrument, warn};

use crate::card::Ntag424;
use crate::config::ProvisionerConfig;
use crate::crypto::{AesKey, KeySet};
use crate::error::{CardError, ProvisionError};
use crate::file::{CapabilitiesContainer, FileSettings, NdefTemplate, parse_url_file, url_file};
use crate::session::DnaCommunicator;
use crate::types::{FileNumber, KeySlot, Uid};

/// Flow steps that can fail after authentication
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    /// GetCardUID
    #[display("read chip UID")]
    ReadChipUid,
    /// ChangeFileSettings on the NDEF file
    #[display("write file settings")]
    WriteFileSettings,
    /// WriteData on the NDEF file
    #[display("write file data")]
    WriteFileData,
    /// ChangeKey on slot 0
    #[display("change key0")]
    ChangeKey0,
    /// GetFileSettings
    #[display("read settings of {_0}")]
    ReadFileSettings(FileNumber),
    /// ReadData
    #[display("read data of {_0}")]
    ReadFileData(FileNumber),
}

fn at(step: ProvisionStep) -> impl FnOnce(CardError) -> ProvisionError {
    move |source| ProvisionError::step(step, source)
}

fn auth_failed(source: CardError) -> ProvisionError {
    match source {
        CardError::Transport(e) => ProvisionError::Transport(e),
        source => ProvisionError::CouldNotAuthenticate { source },
    }
}

/// Key roles for one slot search
///
/// The write flow rotates default → card key; the reset flow rotates card key →
/// default. Both authenticate with their own key 0.
#[derive(Debug, Clone, Copy)]
pub struct KeyRotation<'a> {
    /// Key 0 used to re-authenticate after a rejected slot
    pub auth_key: &'a AesKey,
    /// Key currently expected in the slot
    pub old: &'a AesKey,
    /// Key to install
    pub new: &'a AesKey,
}

fn change_slot<C: Ntag424 + ?Sized>(
    card: &mut C,
    slot: KeySlot,
    rotation: &KeyRotation<'_>,
) -> Result<(), CardError> {
    let version = card.key_version(slot)?;
    card.change_key(slot, rotation.old, rotation.new, version.wrapping_add(1))
}

/// Find the first slot, from `start` up to slot 4, that accepts the key change
///
/// A rejected slot usually drops the session, so the card is re-authenticated
/// before moving on. Slot 0 is never tried. Transport failures end the search.
pub fn allocate_key_slot<C: Ntag424 + ?Sized>(
    card: &mut C,
    start: KeySlot,
    rotation: &KeyRotation<'_>,
) -> Result<KeySlot, ProvisionError> {
    let mut next = if start == KeySlot::Key0 {
        KeySlot::Key0.next()
    } else {
        Some(start)
    };

    while let Some(slot) = next {
        match change_slot(card, slot, rotation) {
            Ok(()) => {
                debug!(%slot, "Key slot accepted");
                return Ok(slot);
            }
            Err(CardError::Transport(e)) => return Err(ProvisionError::Transport(e)),
            Err(error) => {
                warn!(%slot, %error, "Key slot rejected change, trying next");
                card.authenticate(KeySlot::Key0, rotation.auth_key)
                    .map_err(auth_failed)?;
                next = slot.next();
            }
        }
    }

    Err(ProvisionError::KeySlotsUnavailable)
}

/// Result of a successful write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// UID read from the card
    pub chip_uid: Uid,
    /// Slot now holding the PICC data key
    pub picc_data_slot: KeySlot,
    /// Slot now holding the CMAC key
    pub cmac_slot: KeySlot,
    /// Settings applied to the NDEF file
    pub file_settings: FileSettings,
}

/// Result of a successful reset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    /// UID read from the card
    pub chip_uid: Uid,
    /// Key 0 was already the factory key
    pub already_reset: bool,
}

/// Everything the inspect flow reads from a card
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardReport {
    /// UID read from the card
    pub chip_uid: Uid,
    /// Capability Container file settings
    pub cc_settings: FileSettings,
    /// Raw Capability Container contents
    pub cc_data: Bytes,
    /// Parsed Capability Container, when well-formed
    pub capabilities: Option<CapabilitiesContainer>,
    /// NDEF file settings
    pub ndef_settings: FileSettings,
    /// Raw NDEF file contents
    pub ndef_data: Bytes,
    /// URI of the NDEF record, when it holds one
    pub ndef_url: Option<String>,
    /// Proprietary file settings
    pub proprietary_settings: FileSettings,
}

/// Drives the write/reset/inspect flows against one card
#[derive(Debug)]
pub struct CardProvisioner<C> {
    card: C,
    config: ProvisionerConfig,
}

impl<T: CardTransport> CardProvisioner<DnaCommunicator<T>> {
    /// Provisioner talking to a card through `transport`
    pub fn over_transport(transport: T, config: ProvisionerConfig) -> Self {
        let card = DnaCommunicator::new(transport)
            .with_chunk_sizes(config.read_chunk, config.write_chunk);
        Self::new(card, config)
    }
}

impl<C: Ntag424> CardProvisioner<C> {
    /// Create a provisioner
    pub const fn new(card: C, config: ProvisionerConfig) -> Self {
        Self { card, config }
    }

    /// The card
    pub const fn card(&self) -> &C {
        &self.card
    }

    /// Mutable access to the card
    pub fn card_mut(&mut self) -> &mut C {
        &mut self.card
    }

    /// The configuration
    pub const fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    /// Unwrap into the card
    pub fn into_inner(self) -> C {
        self.card
    }

    fn connect(&mut self) -> Result<(), ProvisionError> {
        self.card.connect().map_err(auth_failed)
    }

    /// Turn a blank card into a Bolt Card
    ///
    /// The card must still have the factory key in slot 0. On success slot 0 holds
    /// `keys.key0` and the NDEF file mirrors SUN data into `template`.
    #[instrument(skip_all)]
    pub fn write(
        &mut self,
        keys: &KeySet,
        template: &NdefTemplate,
    ) -> Result<WriteOutcome, ProvisionError> {
        let result = self.run_write(keys, template);
        self.card.disconnect();
        result
    }

    fn run_write(
        &mut self,
        keys: &KeySet,
        template: &NdefTemplate,
    ) -> Result<WriteOutcome, ProvisionError> {
        let file_size = self.config.ndef_file_size;
        FileSettings::sun_ndef_file(template, KeySlot::Key1, KeySlot::Key2, file_size)
            .validate()?;

        self.connect()?;
        let default = self.config.default_key.clone();
        let card = &mut self.card;

        card.authenticate(KeySlot::Key0, &default)
            .map_err(auth_failed)?;

        let chip_uid = card.chip_uid().map_err(at(ProvisionStep::ReadChipUid))?;
        debug!(%chip_uid, "Read chip UID");

        let picc_data_slot = allocate_key_slot(
            card,
            KeySlot::Key1,
            &KeyRotation {
                auth_key: &default,
                old: &default,
                new: &keys.picc_data_key,
            },
        )?;
        let cmac_slot = allocate_key_slot(
            card,
            picc_data_slot
                .next()
                .ok_or(ProvisionError::KeySlotsUnavailable)?,
            &KeyRotation {
                auth_key: &default,
                old: &default,
                new: &keys.cmac_key,
            },
        )?;
        debug!(%picc_data_slot, %cmac_slot, "Installed SUN keys");

        let file_settings =
            FileSettings::sun_ndef_file(template, picc_data_slot, cmac_slot, file_size);
        card.change_file_settings(FileNumber::Ndef, &file_settings)
            .map_err(at(ProvisionStep::WriteFileSettings))?;

        card.write_file_data(
            FileNumber::Ndef,
            0,
            &template.file_data(),
            file_settings.write_mode(),
        )
        .map_err(at(ProvisionStep::WriteFileData))?;

        let version = card
            .key_version(KeySlot::Key0)
            .map_err(at(ProvisionStep::ChangeKey0))?;
        card.change_key(KeySlot::Key0, &default, &keys.key0, version.wrapping_add(1))
            .map_err(at(ProvisionStep::ChangeKey0))?;

        info!(%chip_uid, "Card written");
        Ok(WriteOutcome {
            chip_uid,
            picc_data_slot,
            cmac_slot,
            file_settings,
        })
    }

    /// Return a card to factory keys and a static, SDM-free NDEF file
    ///
    /// Running it on a card that is already reset succeeds as well.
    #[instrument(skip_all)]
    pub fn reset(&mut self, keys: &KeySet) -> Result<ResetOutcome, ProvisionError> {
        let result = self.run_reset(keys);
        self.card.disconnect();
        result
    }

    fn run_reset(&mut self, keys: &KeySet) -> Result<ResetOutcome, ProvisionError> {
        self.connect()?;
        let factory = self.config.default_key.clone();
        let reset_url = self.config.reset_url.clone();
        let card = &mut self.card;

        let already_reset = match card.authenticate(KeySlot::Key0, &keys.key0) {
            Ok(()) => false,
            Err(CardError::Transport(e)) => return Err(ProvisionError::Transport(e)),
            Err(first) => {
                debug!(error = %first, "Key0 rejected, trying the factory key");
                match card.authenticate(KeySlot::Key0, &factory) {
                    Ok(()) => true,
                    Err(CardError::Transport(e)) => return Err(ProvisionError::Transport(e)),
                    Err(_) => return Err(ProvisionError::CouldNotAuthenticate { source: first }),
                }
            }
        };
        let auth_key = if already_reset { &factory } else { &keys.key0 };

        let chip_uid = card.chip_uid().map_err(at(ProvisionStep::ReadChipUid))?;
        debug!(%chip_uid, already_reset, "Read chip UID");

        let mut start = Some(KeySlot::Key1);
        for key in [&keys.picc_data_key, &keys.cmac_key] {
            let Some(from) = start else { break };
            let rotation = KeyRotation {
                auth_key,
                old: key,
                new: &factory,
            };
            match allocate_key_slot(card, from, &rotation) {
                Ok(slot) => start = slot.next(),
                Err(ProvisionError::KeySlotsUnavailable) if already_reset => {
                    debug!("No slot holds the card key, assuming it was reset");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let file_settings = FileSettings::default_ndef_file();
        card.change_file_settings(FileNumber::Ndef, &file_settings)
            .map_err(at(ProvisionStep::WriteFileSettings))?;

        card.write_file_data(
            FileNumber::Ndef,
            0,
            &url_file(&reset_url),
            file_settings.write_mode(),
        )
        .map_err(at(ProvisionStep::WriteFileData))?;

        if !already_reset {
            let version = card
                .key_version(KeySlot::Key0)
                .map_err(at(ProvisionStep::ChangeKey0))?;
            card.change_key(KeySlot::Key0, &keys.key0, &factory, version.wrapping_add(1))
                .map_err(at(ProvisionStep::ChangeKey0))?;
        }

        info!(%chip_uid, already_reset, "Card reset");
        Ok(ResetOutcome {
            chip_uid,
            already_reset,
        })
    }

    /// Read UID, file settings and the public files of a card
    #[instrument(skip_all)]
    pub fn inspect(&mut self, key0: &AesKey) -> Result<CardReport, ProvisionError> {
        let result = self.run_inspect(key0);
        self.card.disconnect();
        result
    }

    fn run_inspect(&mut self, key0: &AesKey) -> Result<CardReport, ProvisionError> {
        self.connect()?;
        let card = &mut self.card;

        card.authenticate(KeySlot::Key0, key0)
            .map_err(auth_failed)?;
        let chip_uid = card.chip_uid().map_err(at(ProvisionStep::ReadChipUid))?;

        let mut read_file = |file: FileNumber| -> Result<(FileSettings, Bytes), ProvisionError> {
            let settings = card
                .file_settings(file)
                .map_err(at(ProvisionStep::ReadFileSettings(file)))?;
            let data = card
                .read_file_data(file, 0, settings.file_size as usize, settings.read_mode())
                .map_err(at(ProvisionStep::ReadFileData(file)))?;
            Ok((settings, data))
        };

        let (cc_settings, cc_data) = read_file(FileNumber::CapabilityContainer)?;
        let (ndef_settings, ndef_data) = read_file(FileNumber::Ndef)?;

        let proprietary_settings = card
            .file_settings(FileNumber::Proprietary)
            .map_err(at(ProvisionStep::ReadFileSettings(FileNumber::Proprietary)))?;

        Ok(CardReport {
            chip_uid,
            capabilities: CapabilitiesContainer::decode(&cc_data),
            cc_settings,
            cc_data,
            ndef_url: parse_url_file(&ndef_data),
            ndef_settings,
            ndef_data,
            proprietary_settings,
        })
    }
}
