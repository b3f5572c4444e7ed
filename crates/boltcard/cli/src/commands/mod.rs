//! Command handlers

use std::error::Error;

use boltcard_ntag424::ProvisionError;

use crate::utils::display;

mod card_operations;
mod emulate;
mod keys;
mod verify;

pub use card_operations::*;
pub use emulate::*;
pub use keys::*;
pub use verify::*;

/// Pass through a flow result, turning cancellations into a notice
///
/// A cancelled session or a card pulled off the reader is not a failure of the
/// command, so it ends with `Ok(None)`.
fn unless_cancelled<T>(result: Result<T, ProvisionError>) -> Result<Option<T>, Box<dyn Error>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_ignorable() => {
            println!("{}", display::warning(&format!("Session ended: {e}")));
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}
