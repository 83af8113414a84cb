//! Selection requests and the raw outcome of one selection case

use bytes::Bytes;

use super::selector::CardSelector;
use crate::command::Command;
use crate::response::Response;

/// What the reader returned for one selection case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResponse {
    /// ATR of the card
    pub atr: Option<Bytes>,
    /// Response to the Select Application command, if one was sent
    pub fci: Option<Response>,
    /// Whether the case matched
    pub has_matched: bool,
    /// Whether the logical channel is still open after the case
    pub logical_channel_open: bool,
    /// Responses to the commands sent after a successful selection
    pub responses: Vec<Response>,
}

impl SelectionResponse {
    /// Outcome of a case that did not match
    pub fn not_matched(atr: Option<Bytes>, fci: Option<Response>) -> Self {
        Self {
            atr,
            fci,
            ..Default::default()
        }
    }

    /// FCI payload, empty if no application was selected
    pub fn fci_bytes(&self) -> &[u8] {
        self.fci.as_ref().map_or(&[][..], Response::payload)
    }

    /// ATR bytes, empty if unknown
    pub fn atr_bytes(&self) -> &[u8] {
        self.atr.as_deref().unwrap_or_default()
    }
}

/// One selection case together with the way its outcome becomes a smart card
pub trait CardSelectionRequest {
    /// Smart card built from a matching selection
    type Card;

    /// Error raised while building the card
    type Error: From<crate::Error>;

    /// Selection criteria
    fn selector(&self) -> &CardSelector;

    /// Commands sent right after a successful selection
    fn commands(&self) -> Vec<Command> {
        Vec::new()
    }

    /// Build the smart card from a matching selection response
    fn parse(&self, response: &SelectionResponse) -> Result<Self::Card, Self::Error>;
}

/// Card selected by a [`GenericSelectionRequest`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCard {
    /// ATR of the card
    pub atr: Bytes,
    /// FCI returned on selection, empty when selected by ATR
    pub fci: Bytes,
    /// Responses to the extra commands
    pub responses: Vec<Response>,
}

/// Selection request for applications without a dedicated card model
#[derive(Debug, Clone)]
pub struct GenericSelectionRequest {
    selector: CardSelector,
    commands: Vec<Command>,
}

impl GenericSelectionRequest {
    /// Create a request from its selector
    pub const fn new(selector: CardSelector) -> Self {
        Self {
            selector,
            commands: Vec::new(),
        }
    }

    /// Add a command sent after a successful selection
    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }
}

impl CardSelectionRequest for GenericSelectionRequest {
    type Card = SelectedCard;
    type Error = crate::Error;

    fn selector(&self) -> &CardSelector {
        &self.selector
    }

    fn commands(&self) -> Vec<Command> {
        self.commands.clone()
    }

    fn parse(&self, response: &SelectionResponse) -> crate::Result<SelectedCard> {
        Ok(SelectedCard {
            atr: response.atr.clone().unwrap_or_default(),
            fci: response
                .fci
                .as_ref()
                .map(|fci| Bytes::copy_from_slice(fci.payload()))
                .unwrap_or_default(),
            responses: response.responses.clone(),
        })
    }
}
