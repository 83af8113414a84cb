//! Per-command status word interpretation
//!
//! Each command family owns a sparse [`StatusTable`] mapping status words to a
//! success flag and a message. 90 00 is successful unless a table overrides it; any
//! status word absent from the table is an unknown failure.

use tracing::{Level, event};

use super::Response;
use super::status::StatusWord;
use crate::{Error, Result};

/// Meaning of a status word for a given command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusProperties {
    /// Whether the status word means the command succeeded
    pub successful: bool,
    /// Human readable meaning
    pub description: &'static str,
}

impl StatusProperties {
    /// Properties of an accepted status word
    pub const fn success(description: &'static str) -> Self {
        Self {
            successful: true,
            description,
        }
    }

    /// Properties of a rejected status word
    pub const fn error(description: &'static str) -> Self {
        Self {
            successful: false,
            description,
        }
    }
}

const DEFAULT_SUCCESS: StatusProperties = StatusProperties::success("Success");

/// Status words of one command family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTable {
    name: &'static str,
    entries: &'static [(u16, StatusProperties)],
}

impl StatusTable {
    /// Table with only the default 90 00 entry
    pub const EMPTY: Self = Self::new("Generic", &[]);

    /// Create a table from its static entries
    pub const fn new(name: &'static str, entries: &'static [(u16, StatusProperties)]) -> Self {
        Self { name, entries }
    }

    /// Name of the command family
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Look up the explicit entry for a status word, ignoring the 90 00 default
    pub fn get(&self, status: StatusWord) -> Option<&StatusProperties> {
        let code = status.to_u16();
        self.entries
            .iter()
            .find_map(|(entry, properties)| (*entry == code).then_some(properties))
    }

    /// Classify a status word
    pub fn classify(&self, status: StatusWord) -> StatusProperties {
        match self.get(status) {
            Some(properties) => *properties,
            None if status.is_success() => DEFAULT_SUCCESS,
            None => StatusProperties::error(status.description()),
        }
    }

    /// Classify a status word, accepting extra codes as successful
    pub fn classify_with_alternates(&self, status: StatusWord, alternates: &[u16]) -> StatusProperties {
        let properties = self.classify(status);
        if !properties.successful && alternates.contains(&status.to_u16()) {
            return StatusProperties::success(properties.description);
        }
        properties
    }

    /// Returns true if the status word is successful for this command family
    pub fn is_successful(&self, status: StatusWord) -> bool {
        self.classify(status).successful
    }

    /// Check a response, failing with the table message if it is not successful
    pub fn check(&self, response: &Response) -> Result<()> {
        let status = response.status();
        let properties = self.classify(status);

        match status.tracing_level() {
            Level::DEBUG => event!(Level::DEBUG, command = self.name, %status, "{}", properties.description),
            Level::INFO => event!(Level::INFO, command = self.name, %status, "{}", properties.description),
            _ => event!(Level::WARN, command = self.name, %status, "{}", properties.description),
        }

        if properties.successful {
            Ok(())
        } else {
            Err(Error::status(status, properties.description))
        }
    }
}

impl Default for StatusTable {
    fn default() -> Self {
        Self::EMPTY
    }
}
