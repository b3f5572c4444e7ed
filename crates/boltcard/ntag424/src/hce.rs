//! Software emulation of a read-only Type 4 tag
//!
//! [`HceResponder::handle`] answers one command APDU at a time. The host platform's
//! event loop owns the [`SelectedFile`] state and relays the bytes in both
//! directions.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::commands::type4::{HceCommand, ReadBinaryCommand, encode_error, encode_ok};
use crate::file::CapabilitiesContainer;
use crate::types::FileNumber;

/// File selected by the last SELECT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SelectedFile {
    /// Nothing selected, or the last selection failed
    #[default]
    None,
    /// Capability Container (E103)
    CapabilityContainer,
    /// NDEF file (E104)
    Ndef,
}

/// `file[offset .. min(offset + length, file.len())]`, or empty past the end
pub fn read_file(file: &[u8], offset: usize, length: usize) -> &[u8] {
    if offset >= file.len() {
        return &[];
    }
    let end = offset.saturating_add(length).min(file.len());
    &file[offset..end]
}

/// Answers Type 4 tag commands from a fixed CC and NDEF file
#[derive(Debug, Clone)]
pub struct HceResponder {
    cc_file: Bytes,
    ndef_file: Bytes,
}

impl HceResponder {
    /// Serve `ndef_file` behind the default emulation Capability Container
    pub fn new(ndef_file: impl Into<Bytes>) -> Self {
        Self::with_capability_container(&CapabilitiesContainer::hce_default(), ndef_file)
    }

    /// Serve `ndef_file` behind a custom Capability Container
    pub fn with_capability_container(
        cc: &CapabilitiesContainer,
        ndef_file: impl Into<Bytes>,
    ) -> Self {
        Self {
            cc_file: cc.encode(),
            ndef_file: ndef_file.into(),
        }
    }

    /// Encoded Capability Container
    pub const fn cc_file(&self) -> &Bytes {
        &self.cc_file
    }

    /// NDEF file image
    pub const fn ndef_file(&self) -> &Bytes {
        &self.ndef_file
    }

    fn read(file: &[u8], command: ReadBinaryCommand) -> Bytes {
        let data = read_file(file, command.offset as usize, command.length);
        let mut response = BytesMut::with_capacity(data.len() + 2);
        response.put_slice(data);
        response.put_slice(&encode_ok());
        response.freeze()
    }

    /// Answer one command, updating `selected`
    pub fn handle(&self, apdu: &[u8], selected: &mut SelectedFile) -> Bytes {
        let Some(command) = HceCommand::decode(apdu) else {
            debug!(apdu = %hex::encode(apdu), "Unknown command");
            return encode_error();
        };

        match command {
            HceCommand::SelectNdefApplication => {
                debug!("NDEF application selected");
                encode_ok()
            }
            HceCommand::SelectFile(select) => {
                *selected = if select.file_id == FileNumber::CapabilityContainer.iso_file_id() {
                    SelectedFile::CapabilityContainer
                } else if select.file_id == FileNumber::Ndef.iso_file_id() {
                    SelectedFile::Ndef
                } else {
                    SelectedFile::None
                };
                debug!(file_id = %hex::encode(select.file_id), ?selected, "Select file");

                if *selected == SelectedFile::None {
                    encode_error()
                } else {
                    encode_ok()
                }
            }
            HceCommand::ReadBinary(read) => {
                debug!(offset = read.offset, length = read.length, ?selected, "Read binary");
                match selected {
                    SelectedFile::CapabilityContainer => Self::read(&self.cc_file, read),
                    SelectedFile::Ndef => Self::read(&self.ndef_file, read),
                    SelectedFile::None => encode_error(),
                }
            }
        }
    }
}
