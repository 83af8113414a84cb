//! Stub reader and software Calypso cards
//!
//! Everything here runs in memory. A [`StubReader`] hosts one [`StubCard`]
//! and implements the core transport and reader traits, so the Calypso layer
//! can be driven end to end without hardware:
//!
//! - [`StubPo`] emulates a Calypso PO of revision 2.4, 3.1 or 3.2
//! - [`StubSam`] emulates the SAM computing session signatures
//! - [`ScriptedCard`] answers fixed responses to fixed commands
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

pub mod crypto;
pub mod po;
pub mod reader;
pub mod sam;
pub mod scripted;

mod error;
mod status;

pub use error::{Error, Result};
pub use po::{StubPo, StubPoConfig};
pub use reader::{StubCard, StubReader};
pub use sam::{SAM_C1_ATR, StubSam};
pub use scripted::ScriptedCard;
