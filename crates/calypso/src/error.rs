//! Error types for Calypso operations

use keyple_core::{StatusWord, TransportError};

/// Result type for Calypso operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by Calypso commands, card models and secure sessions
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An argument was out of its allowed bounds. No byte was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The PO or SAM transport failed
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Any other core error
    #[error(transparent)]
    Core(keyple_core::Error),

    /// A PO or SAM command returned a status word it does not accept
    #[error("{command} failed with {status}: {message}")]
    Status {
        /// Command name
        command: &'static str,
        /// Status word returned by the card
        status: StatusWord,
        /// Meaning from the command status table
        message: &'static str,
    },

    /// The session signatures did not verify; the transaction is not committed
    #[error("Secure session authentication failed ({status})")]
    SessionAuthenticationFailed {
        /// Status word of the failing verification
        status: StatusWord,
    },

    /// The modification buffer cannot hold the commands of an atomic session
    #[error("Modification buffer overflow: {required} needed, {available} available")]
    ModificationBufferOverflow {
        /// Buffer units needed by the session
        required: usize,
        /// Buffer units available
        available: usize,
    },

    /// A single command needs more than the whole modification buffer
    #[error("Command needs {cost} buffer units, buffer capacity is {capacity}")]
    CommandExceedsBuffer {
        /// Buffer units needed by the command
        cost: usize,
        /// Total buffer capacity
        capacity: usize,
    },

    /// The PO key version is not in the authorized list
    #[error("Unauthorized key version {0:#04X}")]
    UnauthorizedKvc(u8),

    /// The operation is not allowed in the current session state
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// The selection returned no FCI to build the PO from
    #[error("Missing FCI in selection response")]
    MissingFci,

    /// The SAM ATR does not carry a known application subtype
    #[error("Unknown SAM revision: {0}")]
    UnknownSamRevision(String),

    /// A response could not be decoded
    #[error("Parse error: {0}")]
    Parse(&'static str),
}

impl From<keyple_core::Error> for Error {
    fn from(error: keyple_core::Error) -> Self {
        match error {
            keyple_core::Error::InvalidArgument(message) => Self::InvalidArgument(message),
            keyple_core::Error::Transport(error) => Self::Transport(error),
            keyple_core::Error::Parse(message) | keyple_core::Error::Response(message) => {
                Self::Parse(message)
            }
            other => Self::Core(other),
        }
    }
}

impl Error {
    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a new illegal state error
    pub fn illegal_state<S: Into<String>>(message: S) -> Self {
        Self::IllegalState(message.into())
    }

    /// Returns true for transport failures
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns true when the session could not be authenticated
    pub const fn is_authentication_failure(&self) -> bool {
        matches!(self, Self::SessionAuthenticationFailed { .. })
    }

    /// Returns true for argument errors detected before sending anything
    pub const fn is_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }

    /// Status word carried by the error, if any
    pub const fn status_word(&self) -> Option<StatusWord> {
        match self {
            Self::Status { status, .. } | Self::SessionAuthenticationFailed { status } => Some(*status),
            _ => None,
        }
    }
}
