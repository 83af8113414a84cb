//! Core error type for all Keyple operations
//!
//! Every fallible operation of `keyple_core` returns this error. Higher level crates
//! wrap it in their own error enums through `#[from]`.

use crate::response::status::StatusWord;
use crate::transport::TransportError;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type that encompasses all possible errors in the crate
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument was out of its allowed bounds. Raised before any byte is sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The transport failed to deliver the command or to receive the response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The response could not be split into payload and status word
    #[error("Malformed response: {0}")]
    Response(&'static str),

    /// The card returned a status word outside of the accepted set
    #[error("Status error {status}: {message}")]
    Status {
        /// Status word returned by the card
        status: StatusWord,
        /// Human readable meaning taken from the command status table
        message: &'static str,
    },

    /// Selection could not be processed
    #[error("Selection error: {0}")]
    Selection(String),

    /// An ATR filter is not a valid regular expression
    #[error("Invalid ATR filter: {0}")]
    InvalidAtrFilter(#[from] regex::Error),

    /// Data returned by the card could not be decoded
    #[error("Parse error: {0}")]
    Parse(&'static str),

    /// The operation is not allowed in the current state
    #[error("Illegal state: {0}")]
    IllegalState(&'static str),
}

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new status error
    pub const fn status(status: StatusWord, message: &'static str) -> Self {
        Self::Status { status, message }
    }

    /// Create a new selection error
    pub fn selection<S: Into<String>>(message: S) -> Self {
        Self::Selection(message.into())
    }

    /// Returns true if the error came from the transport layer
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the status word carried by a status error
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
