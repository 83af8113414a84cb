//! Reader events delivered through channels
//!
//! A reader monitoring loop produces [`ReaderEvent`]s on a [`ReaderEventSender`];
//! the application consumes them from the matching receiver, in order.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};

use crate::selection::SelectionResponse;

/// Card presence events of one reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReaderEvent {
    /// A card was inserted and no default selection is configured
    CardInserted {
        /// Reader name
        reader: String,
    },
    /// A card was inserted and the default selection ran on it
    CardMatched {
        /// Reader name
        reader: String,
        /// Raw outcome of each default selection case
        responses: Vec<Option<SelectionResponse>>,
    },
    /// The card was removed
    CardRemoved {
        /// Reader name
        reader: String,
    },
    /// The reader is no longer usable
    ReaderUnavailable {
        /// Reader name
        reader: String,
    },
}

impl ReaderEvent {
    /// Name of the reader that produced the event
    pub fn reader_name(&self) -> &str {
        match self {
            Self::CardInserted { reader }
            | Self::CardMatched { reader, .. }
            | Self::CardRemoved { reader }
            | Self::ReaderUnavailable { reader } => reader,
        }
    }
}

/// Sender for reader events
pub type ReaderEventSender = Sender<ReaderEvent>;
/// Receiver for reader events
pub type ReaderEventReceiver = Receiver<ReaderEvent>;

/// Create an unbounded channel for reader events
pub fn reader_event_channel() -> (ReaderEventSender, ReaderEventReceiver) {
    unbounded()
}

/// Create a bounded channel with the specified capacity for reader events
pub fn bounded_reader_event_channel(capacity: usize) -> (ReaderEventSender, ReaderEventReceiver) {
    bounded(capacity)
}
