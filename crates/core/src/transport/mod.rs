//! Transport traits for APDU communication with cards
//!
//! [`CardTransport`] sends one APDU and receives one response. [`ReaderChannel`]
//! adds what the selection engine needs from a reader: ATR, card presence,
//! protocol and physical channel control.

pub mod error;

use std::fmt;

use bytes::Bytes;
pub use error::TransportError;
use tracing::{debug, trace};

use crate::command::{ApduCommand, Command};
use crate::response::Response;

/// Trait for basic card transports
///
/// A transport is responsible for sending and receiving raw APDU bytes.
/// It has no knowledge of command structure, sessions, or protocol details.
pub trait CardTransport: Send + fmt::Debug {
    /// Send raw APDU bytes to card and return response bytes
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode_upper(command), "Transmitting raw command");
        let result = self.do_transmit_raw(command);
        match &result {
            Ok(response) => {
                trace!(response = %hex::encode_upper(response), "Received raw response");
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

    /// Send a command and parse the response
    fn transmit(&mut self, command: &Command) -> crate::Result<Response> {
        let raw = self.transmit_raw(&command.to_bytes())?;
        Response::from_bytes(&raw)
    }

    /// Check if the transport is connected to a physical card
    fn is_connected(&self) -> bool;

    /// Reset the transport connection
    fn reset(&mut self) -> Result<(), TransportError>;
}

/// A reader able to host a card
pub trait ReaderChannel: CardTransport {
    /// Reader name
    fn name(&self) -> &str;

    /// Check whether a card is in the reader
    fn is_card_present(&self) -> bool;

    /// Answer to reset of the current card
    fn atr(&self) -> Option<&[u8]>;

    /// Name of the protocol the card communicates with, if known
    fn current_protocol(&self) -> Option<&str>;

    /// Open the physical channel to the card
    fn open_physical_channel(&mut self) -> Result<(), TransportError>;

    /// Close the physical channel to the card
    fn close_physical_channel(&mut self) -> Result<(), TransportError>;

    /// Check whether the physical channel is open
    fn is_physical_channel_open(&self) -> bool;
}

impl<T: CardTransport + ?Sized> CardTransport for Box<T> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        (**self).reset()
    }
}

impl<T: ReaderChannel + ?Sized> ReaderChannel for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn is_card_present(&self) -> bool {
        (**self).is_card_present()
    }

    fn atr(&self) -> Option<&[u8]> {
        (**self).atr()
    }

    fn current_protocol(&self) -> Option<&str> {
        (**self).current_protocol()
    }

    fn open_physical_channel(&mut self) -> Result<(), TransportError> {
        (**self).open_physical_channel()
    }

    fn close_physical_channel(&mut self) -> Result<(), TransportError> {
        (**self).close_physical_channel()
    }

    fn is_physical_channel_open(&self) -> bool {
        (**self).is_physical_channel_open()
    }
}

/// Scripted transport for unit tests
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub(crate) struct MockTransport {
    /// Responses returned in order
    pub(crate) responses: Vec<Bytes>,
    /// Commands that were sent
    pub(crate) commands: Vec<Bytes>,
    /// ATR reported by the mock reader
    pub(crate) atr: Vec<u8>,
    /// Whether the physical channel is open
    pub(crate) open: bool,
    /// Number of times the physical channel was closed
    pub(crate) closes: usize,
}

#[cfg(test)]
impl MockTransport {
    /// Create a new mock transport with the given responses
    pub(crate) fn new(responses: Vec<Bytes>) -> Self {
        Self {
            responses,
            open: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
impl CardTransport for MockTransport {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        if !self.open {
            return Err(TransportError::ChannelClosed);
        }
        self.commands.push(Bytes::copy_from_slice(command));
        if self.responses.is_empty() {
            return Err(TransportError::Transmission);
        }
        Ok(self.responses.remove(0))
    }

    fn is_connected(&self) -> bool {
        self.open
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.commands.clear();
        Ok(())
    }
}

#[cfg(test)]
impl ReaderChannel for MockTransport {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_card_present(&self) -> bool {
        true
    }

    fn atr(&self) -> Option<&[u8]> {
        Some(&self.atr)
    }

    fn current_protocol(&self) -> Option<&str> {
        None
    }

    fn open_physical_channel(&mut self) -> Result<(), TransportError> {
        self.open = true;
        Ok(())
    }

    fn close_physical_channel(&mut self) -> Result<(), TransportError> {
        self.open = false;
        self.closes += 1;
        Ok(())
    }

    fn is_physical_channel_open(&self) -> bool {
        self.open
    }
}
