//! Calypso commands and secure sessions over Keyple
//!
//! This crate implements the Calypso layer on top of `keyple-core`:
//!
//! - PO and SAM command codecs with their per-family status tables
//! - Card models decoded from the PO FCI and the SAM ATR
//! - The session digest mirrored on the SAM
//! - Modification buffer accounting and session splitting
//! - The secure session state machine driving a PO and a SAM
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod buffer;
pub mod commands;
pub mod digest;
pub mod key;
pub mod po;
pub mod revision;
pub mod sam;
pub mod selection;
pub mod settings;
pub mod transaction;

mod error;
pub use error::{Error, Result};

pub use buffer::{BufferCapacity, ModificationBuffer};
pub use commands::{CalypsoApdu, CommandKind};
pub use commands::session::{CloseSessionResponse, SecureSession};
pub use digest::DigestAccumulator;
pub use key::{AccessLevel, KeyReference};
pub use po::{CalypsoPo, StartupInfo};
pub use revision::{OpenSessionVariant, PoClass, PoRevision, SamRevision};
pub use sam::{CalypsoSam, SamSelector};
pub use selection::{PoSelectionRequest, SamSelectionRequest};
pub use settings::{
    DigestUpdateMode, ModificationMode, RatificationMode, SecuritySettings, TransmissionMode,
};
pub use transaction::{PoTransaction, SessionOutcome, SessionState};

/// Prelude module containing commonly used types
pub mod prelude {
    pub use crate::{
        AccessLevel, CalypsoApdu, CalypsoPo, CalypsoSam, Error, PoTransaction, Result,
        SamRevision, SecuritySettings, SessionState,
        commands::{po, sam, session},
    };
}
