//! Application-owned registry of readers

use std::collections::BTreeMap;

use tracing::debug;

use crate::transport::ReaderChannel;
use crate::{Error, Result};

/// Readers known to the application, indexed by name
#[derive(Debug)]
pub struct ReaderRegistry<R> {
    readers: BTreeMap<String, R>,
}

impl<R> Default for ReaderRegistry<R> {
    fn default() -> Self {
        Self {
            readers: BTreeMap::new(),
        }
    }
}

impl<R: ReaderChannel> ReaderRegistry<R> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reader under its own name
    pub fn register(&mut self, reader: R) -> Result<()> {
        let name = reader.name().to_owned();
        if self.readers.contains_key(&name) {
            return Err(Error::invalid_argument(format!("reader {name} already registered")));
        }
        debug!(reader = %name, "Registered reader");
        self.readers.insert(name, reader);
        Ok(())
    }

    /// Remove a reader and hand it back
    pub fn take(&mut self, name: &str) -> Option<R> {
        let reader = self.readers.remove(name);
        if reader.is_some() {
            debug!(reader = %name, "Removed reader");
        }
        reader
    }

    /// Remove and drop a reader, returns false if it was not registered
    pub fn remove(&mut self, name: &str) -> bool {
        self.take(name).is_some()
    }

    /// Look up a reader
    pub fn reader(&self, name: &str) -> Option<&R> {
        self.readers.get(name)
    }

    /// Look up a reader for exclusive use
    pub fn reader_mut(&mut self, name: &str) -> Option<&mut R> {
        self.readers.get_mut(name)
    }

    /// Registered reader names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.readers.keys().map(String::as_str)
    }

    /// Readers currently holding a card
    pub fn readers_with_card(&self) -> impl Iterator<Item = &R> {
        self.readers.values().filter(|reader| reader.is_card_present())
    }

    /// Number of registered readers
    pub fn len(&self) -> usize {
        self.readers.len()
    }

    /// Returns true if no reader is registered
    pub fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }
}
