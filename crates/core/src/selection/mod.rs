//! Card selection by AID, ATR and protocol
//!
//! A [`CardSelection`] holds ordered selection cases. Each case is a
//! [`CardSelectionRequest`] which knows its [`CardSelector`] and how to turn a
//! matching [`SelectionResponse`] into a smart card.

pub mod engine;
pub mod request;
pub mod result;
pub mod selector;

pub use engine::CardSelection;
pub use request::{CardSelectionRequest, GenericSelectionRequest, SelectedCard, SelectionResponse};
pub use result::SelectionResult;
pub use selector::{AidSelector, AtrFilter, CardSelector, FileControlInformation, FileOccurrence};

/// How many cases are evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiSelectionProcessing {
    /// Stop at the first matching case
    #[default]
    FirstMatch,
    /// Evaluate every case, reopening the channel between cases
    ProcessAll,
}

/// What happens to the physical channel once the selection is done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelControl {
    /// Leave the channel open for the active case
    #[default]
    KeepOpen,
    /// Close the channel
    CloseAfter,
}
