//! Transport traits for APDU communication with cards
//!
//! This module provides the boundary a host platform implements to carry raw
//! APDU bytes to a card (PC/SC reader, phone NFC stack, emulator).

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, secure messaging, or protocol details.
/// Exchanges are strictly serialized: one command, then its response.
pub trait CardTransport: fmt::Debug {
    /// Open a session with the card in the field
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Send raw APDU bytes to card and return response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode(response), "Received raw response");
            }
            Err(e) => {
                debug!(error = ?e, "Transport error during transmission");
            }
        }
        result
    }

    /// Internal implementation of transmit_raw
    /// This is the method that concrete implementations should override
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// End the session. Never fails; a dead session is already disconnected.
    fn disconnect(&mut self);

    /// Check if the transport is connected to a card
    fn is_connected(&self) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn connect(&mut self) -> Result<(), TransportError> {
        (**self).connect()
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[cfg(test)]
#[derive(Debug, Clone)]
#[allow(missing_docs, unreachable_pub)]
pub struct MockTransport {
    /// Mock responses to return
    pub responses: Vec<Bytes>,
    /// Commands that were sent
    pub commands: Vec<Bytes>,
    /// Whether the transport is connected
    pub connected: bool,
}

#[cfg(test)]
impl MockTransport {
    /// Create a new mock transport with the given responses
    pub(crate) const fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            commands: Vec::new(),
            connected: false,
        }
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        Ok(())
    }

    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.connected {
            return Err(TransportError::ConnectFailed);
        }

        self.commands.push(Bytes::copy_from_slice(command));

        if self.responses.is_empty() {
            return Err(TransportError::SessionTerminated);
        }
        Ok(self.responses.remove(0))
    }

    fn disconnect(&mut self) {
        self.connected = false;
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transport_records_commands() {
        let mut transport = MockTransport::new(vec![Bytes::from_static(&[0x90, 0x00])]);
        assert_eq!(
            transport.transmit_raw(&[0x00, 0xA4]),
            Err(TransportError::ConnectFailed)
        );

        transport.connect().unwrap();
        let response = transport.transmit_raw(&[0x00, 0xA4, 0x04, 0x00]).unwrap();
        assert_eq!(response.as_ref(), &[0x90, 0x00]);
        assert_eq!(transport.commands.len(), 1);

        // Out of scripted responses: the card left the field
        assert_eq!(
            transport.transmit_raw(&[0x00, 0xB0, 0x00, 0x00, 0x02]),
            Err(TransportError::SessionTerminated)
        );

        transport.disconnect();
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_transport_by_mutable_reference() {
        let mut transport = MockTransport::new(vec![Bytes::from_static(&[0x6A, 0x82])]);
        {
            let mut borrowed = &mut transport;
            borrowed.connect().unwrap();
            let response = borrowed.transmit_raw(&[0x00, 0xA4, 0x00, 0x0C]).unwrap();
            assert_eq!(response.as_ref(), &[0x6A, 0x82]);
        }
        assert!(transport.is_connected());
    }
}
