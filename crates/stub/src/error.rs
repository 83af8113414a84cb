//! Errors of the stub tooling

/// Result type for stub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up stub readers and cards
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A card is already in the reader
    #[error("Reader {0} already holds a card")]
    CardAlreadyInserted(String),

    /// The card configuration is inconsistent
    #[error("Invalid card configuration: {0}")]
    InvalidConfig(&'static str),

    /// Error from the core layer
    #[error(transparent)]
    Core(#[from] keyple_core::Error),
}
