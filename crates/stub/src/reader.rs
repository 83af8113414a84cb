//! Stub reader hosting a software card

use std::fmt;

use keyple_core::selection::{CardSelection, CardSelectionRequest};
use keyple_core::{Bytes, CardTransport, ReaderChannel, ReaderEvent, ReaderEventSender, TransportError};
use tracing::{debug, trace};

use crate::{Error, Result};

/// A software card answering APDUs
pub trait StubCard: Send + fmt::Debug {
    /// Answer to reset
    fn atr(&self) -> &[u8];

    /// Process one command and return the response with its status word
    fn process_apdu(&mut self, command: &[u8]) -> Vec<u8>;

    /// Called when the card is powered off: channel closed or card removed
    fn reset(&mut self) {}
}

impl<C: StubCard + ?Sized> StubCard for Box<C> {
    fn atr(&self) -> &[u8] {
        (**self).atr()
    }

    fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        (**self).process_apdu(command)
    }

    fn reset(&mut self) {
        (**self).reset();
    }
}

/// Reader emulation hosting at most one [`StubCard`]
#[derive(Debug)]
pub struct StubReader<C = Box<dyn StubCard>> {
    name: String,
    protocol: Option<String>,
    card: Option<C>,
    channel_open: bool,
    events: Option<ReaderEventSender>,
}

impl<C: StubCard> StubReader<C> {
    /// Create an empty reader
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            protocol: None,
            card: None,
            channel_open: false,
            events: None,
        }
    }

    /// Report this protocol for every inserted card
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Publish insertion and removal events on a channel
    pub fn with_event_sender(mut self, sender: ReaderEventSender) -> Self {
        self.events = Some(sender);
        self
    }

    /// Insert a card, emitting `CardInserted`
    pub fn insert_card(&mut self, card: C) -> Result<()> {
        self.place(card)?;
        self.emit(ReaderEvent::CardInserted {
            reader: self.name.clone(),
        });
        Ok(())
    }

    /// Insert a card and run a default selection on it, emitting `CardMatched`
    pub fn insert_card_with_selection<R>(&mut self, card: C, selection: &CardSelection<R>) -> Result<()>
    where
        R: CardSelectionRequest,
    {
        self.place(card)?;
        let responses = selection.transmit_selections(self)?;
        self.emit(ReaderEvent::CardMatched {
            reader: self.name.clone(),
            responses,
        });
        Ok(())
    }

    fn place(&mut self, card: C) -> Result<()> {
        if self.card.is_some() {
            return Err(Error::CardAlreadyInserted(self.name.clone()));
        }
        debug!(reader = %self.name, atr = %hex::encode_upper(card.atr()), "Card inserted");
        self.card = Some(card);
        self.channel_open = false;
        Ok(())
    }

    /// Remove the card, emitting `CardRemoved`
    pub fn remove_card(&mut self) -> Option<C> {
        let mut card = self.card.take()?;
        card.reset();
        self.channel_open = false;
        debug!(reader = %self.name, "Card removed");
        self.emit(ReaderEvent::CardRemoved {
            reader: self.name.clone(),
        });
        Some(card)
    }

    /// The card in the reader
    pub const fn card(&self) -> Option<&C> {
        self.card.as_ref()
    }

    /// The card in the reader, for inspection or tampering
    pub const fn card_mut(&mut self) -> Option<&mut C> {
        self.card.as_mut()
    }

    fn emit(&self, event: ReaderEvent) {
        if let Some(sender) = &self.events {
            // A dropped receiver only means nobody listens anymore
            if sender.send(event).is_err() {
                trace!(reader = %self.name, "Reader event dropped");
            }
        }
    }
}

impl<C: StubCard> CardTransport for StubReader<C> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
        let card = self.card.as_mut().ok_or(TransportError::CardRemoved)?;
        if !self.channel_open {
            return Err(TransportError::ChannelClosed);
        }
        Ok(Bytes::from(card.process_apdu(command)))
    }

    fn is_connected(&self) -> bool {
        self.card.is_some() && self.channel_open
    }

    fn reset(&mut self) -> std::result::Result<(), TransportError> {
        let card = self.card.as_mut().ok_or(TransportError::CardRemoved)?;
        card.reset();
        Ok(())
    }
}

impl<C: StubCard> ReaderChannel for StubReader<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_card_present(&self) -> bool {
        self.card.is_some()
    }

    fn atr(&self) -> Option<&[u8]> {
        self.card.as_ref().map(StubCard::atr)
    }

    fn current_protocol(&self) -> Option<&str> {
        self.card.as_ref().and(self.protocol.as_deref())
    }

    fn open_physical_channel(&mut self) -> std::result::Result<(), TransportError> {
        if self.card.is_none() {
            return Err(TransportError::CardRemoved);
        }
        self.channel_open = true;
        Ok(())
    }

    fn close_physical_channel(&mut self) -> std::result::Result<(), TransportError> {
        if let Some(card) = self.card.as_mut() {
            card.reset();
        }
        self.channel_open = false;
        Ok(())
    }

    fn is_physical_channel_open(&self) -> bool {
        self.channel_open
    }
}
