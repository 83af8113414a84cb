//! Core traits and types for smart card access
//!
//! This crate provides the foundational types of the Keyple stack:
//!
//! - APDU commands and responses according to ISO/IEC 7816-4
//! - Per-command status word interpretation
//! - Transport and reader traits over which commands are exchanged
//! - Card selection by AID, ATR and protocol, with first-match or process-all policies
//! - Reader events delivered through channels and an application-owned reader registry
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod command;
pub mod event;
pub mod registry;
pub mod response;
pub mod selection;
pub mod transport;

mod error;
pub use error::{Error, Result};

pub use command::{ApduCommand, Command};
pub use event::{ReaderEvent, ReaderEventReceiver, ReaderEventSender};
pub use registry::ReaderRegistry;
pub use response::Response;
pub use response::status::StatusWord;
pub use response::table::{StatusProperties, StatusTable};
pub use transport::{CardTransport, ReaderChannel, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        ApduCommand, Bytes, CardTransport, Command, Error, ReaderChannel, Response, Result,
        StatusTable, StatusWord,
        selection::{CardSelection, CardSelectionRequest, CardSelector, SelectionResult},
    };
}
