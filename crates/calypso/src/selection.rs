//! Calypso selection cases for the card selection engine

use keyple_core::selection::{AidSelector, CardSelectionRequest, CardSelector, SelectionResponse};

use crate::po::CalypsoPo;
use crate::sam::{CalypsoSam, SamSelector};
use crate::{Error, Result};

/// Status word returned when selecting an invalidated DF
const DF_INVALIDATED: u16 = 0x6283;

/// Selection of a Calypso PO application
#[derive(Debug, Clone)]
pub struct PoSelectionRequest {
    selector: CardSelector,
}

impl PoSelectionRequest {
    /// Select a PO from any card selector
    pub const fn new(selector: CardSelector) -> Self {
        Self { selector }
    }

    /// Select the PO application by AID, accepting invalidated DFs
    pub fn for_aid(aid: impl Into<keyple_core::Bytes>) -> Result<Self> {
        let aid_selector = AidSelector::new(aid)?.with_successful_status_code(DF_INVALIDATED);
        Ok(Self::new(CardSelector::new().with_aid_selector(aid_selector)))
    }

    /// Restrict the selection to a card protocol
    pub fn with_card_protocol(self, protocol: impl Into<String>) -> Self {
        Self::new(self.selector.with_card_protocol(protocol))
    }
}

impl CardSelectionRequest for PoSelectionRequest {
    type Card = CalypsoPo;
    type Error = Error;

    fn selector(&self) -> &CardSelector {
        &self.selector
    }

    fn parse(&self, response: &SelectionResponse) -> Result<CalypsoPo> {
        CalypsoPo::from_selection(response)
    }
}

/// Selection of a Calypso SAM by ATR
#[derive(Debug, Clone)]
pub struct SamSelectionRequest {
    selector: CardSelector,
}

impl SamSelectionRequest {
    /// Build the request from SAM criteria
    pub fn new(sam_selector: &SamSelector) -> Result<Self> {
        Ok(Self {
            selector: sam_selector.to_card_selector()?,
        })
    }
}

impl CardSelectionRequest for SamSelectionRequest {
    type Card = CalypsoSam;
    type Error = Error;

    fn selector(&self) -> &CardSelector {
        &self.selector
    }

    fn parse(&self, response: &SelectionResponse) -> Result<CalypsoSam> {
        CalypsoSam::from_atr(response.atr_bytes())
    }
}
