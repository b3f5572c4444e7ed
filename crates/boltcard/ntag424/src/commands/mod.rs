//! Command codec: Type 4 Tag commands and the NTAG 424 DNA native set

pub mod native;
pub mod type4;

pub use native::{CLA_NATIVE, NativeStatus, native_command};
pub use type4::{
    HceCommand, NDEF_APPLICATION_ID, ReadBinaryCommand, SelectFileCommand, decode_read_binary,
    decode_select_file, encode_error, encode_ok, encode_read_binary, encode_select_file,
    encode_select_ndef_application, is_ndef_application_select,
};
