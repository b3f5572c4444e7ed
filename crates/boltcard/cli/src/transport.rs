//! PC/SC transport for contactless readers

use std::ffi::CString;
use std::fmt;

use boltcard_apdu_core::{Bytes, CardTransport, TransportError};
use pcsc::{Card, Context, Disposition, Protocols, ShareMode};
use tracing::debug;

/// Largest short response: 256 data bytes plus the status word
const MAX_RESPONSE_LEN: usize = 258;

/// Map a PC/SC failure onto the transport error surface
pub fn map_pcsc_error(error: pcsc::Error) -> TransportError {
    match error {
        pcsc::Error::NoService | pcsc::Error::ServiceStopped | pcsc::Error::NoReadersAvailable => {
            TransportError::NotAvailable
        }
        pcsc::Error::SharingViolation => TransportError::AlreadyInProgress,
        pcsc::Error::NoSmartcard | pcsc::Error::UnknownReader | pcsc::Error::UnpoweredCard => {
            TransportError::ConnectFailed
        }
        pcsc::Error::RemovedCard | pcsc::Error::ResetCard | pcsc::Error::UnresponsiveCard => {
            TransportError::SessionTerminated
        }
        pcsc::Error::Timeout => TransportError::SessionTimeout,
        pcsc::Error::Cancelled => TransportError::UserCancelled,
        pcsc::Error::CommError | pcsc::Error::NotTransacted => TransportError::Transmission,
        other => TransportError::other(other.to_string()),
    }
}

/// Transport that talks to the card on one PC/SC reader
pub struct PcscTransport {
    /// PC/SC context
    context: Context,
    /// Card connection, if established
    card: Option<Card>,
    /// Reader name
    reader_name: String,
}

impl fmt::Debug for PcscTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransport")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .finish()
    }
}

impl PcscTransport {
    /// Transport for `reader_name`; nothing is connected until [`CardTransport::connect`]
    pub fn new(context: Context, reader_name: &str) -> Self {
        Self {
            context,
            card: None,
            reader_name: reader_name.to_string(),
        }
    }

    /// Reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }
}

impl CardTransport for PcscTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader = CString::new(self.reader_name.clone())
            .map_err(|_| TransportError::other(format!("Invalid reader name: {}", self.reader_name)))?;
        let card = self
            .context
            .connect(&reader, ShareMode::Exclusive, Protocols::ANY)
            .map_err(map_pcsc_error)?;

        debug!(reader = %self.reader_name, "Connected to card");
        self.card = Some(card);
        Ok(())
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let card = self.card.as_mut().ok_or(TransportError::SessionTerminated)?;

        let mut buffer = [0u8; MAX_RESPONSE_LEN];
        match card.transmit(command, &mut buffer) {
            Ok(response) => Ok(Bytes::copy_from_slice(response)),
            Err(e) => {
                // A removed or reset card cannot be talked to again in this session
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;
                }
                Err(map_pcsc_error(e))
            }
        }
    }

    fn disconnect(&mut self) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(Disposition::LeaveCard) {
                debug!(error = %e, "Disconnect failed");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.card.is_some()
    }
}

impl Drop for PcscTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            map_pcsc_error(pcsc::Error::RemovedCard),
            TransportError::SessionTerminated
        );
        assert_eq!(
            map_pcsc_error(pcsc::Error::Cancelled),
            TransportError::UserCancelled
        );
        assert_eq!(
            map_pcsc_error(pcsc::Error::NoReadersAvailable),
            TransportError::NotAvailable
        );
        assert!(map_pcsc_error(pcsc::Error::RemovedCard).is_ignorable());
        assert!(!map_pcsc_error(pcsc::Error::NoSmartcard).is_ignorable());
    }
}
