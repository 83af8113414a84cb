//! Error types specific to card transport

/// Transport error type
///
/// Any of these is fatal to a secure session in progress. Retries are never
/// attempted by the layers above the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Connection error
    #[error("Failed to connect to device")]
    Connection,

    /// Transmission error
    #[error("Failed to transmit data")]
    Transmission,

    /// Timeout error
    #[error("Operation timed out")]
    Timeout,

    /// The card left the reader field
    #[error("Card removed")]
    CardRemoved,

    /// The physical channel is closed
    #[error("Physical channel closed")]
    ChannelClosed,

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}
