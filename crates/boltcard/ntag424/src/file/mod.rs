//! File layouts of the NTAG 424 DNA application

pub mod cc;
pub mod ndef;
pub mod settings;

pub use cc::{CapabilitiesContainer, FileControlTlv};
pub use ndef::{NdefTemplate, TemplateError, parse_url_file, text_file, url_file};
pub use settings::{
    CommunicationMode, EncodingMode, FileSettings, Permission, SdmOptions, SdmSettings,
};
