//! Card answering from a fixed command to response script

use std::collections::HashMap;

use crate::reader::StubCard;

/// Status returned for commands missing from the script
const INS_NOT_SUPPORTED: [u8; 2] = [0x6D, 0x00];

/// A card replaying scripted responses
#[derive(Debug, Clone, Default)]
pub struct ScriptedCard {
    atr: Vec<u8>,
    script: HashMap<Vec<u8>, Vec<u8>>,
    received: Vec<Vec<u8>>,
}

impl ScriptedCard {
    /// Create a card with the given ATR and an empty script
    pub fn new(atr: Vec<u8>) -> Self {
        Self {
            atr,
            ..Default::default()
        }
    }

    /// Answer `response` whenever `command` is received
    pub fn with_response(mut self, command: &[u8], response: &[u8]) -> Self {
        self.script.insert(command.to_vec(), response.to_vec());
        self
    }

    /// Commands received so far
    pub fn received(&self) -> &[Vec<u8>] {
        &self.received
    }
}

impl StubCard for ScriptedCard {
    fn atr(&self) -> &[u8] {
        &self.atr
    }

    fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        self.received.push(command.to_vec());
        self.script
            .get(command)
            .cloned()
            .unwrap_or_else(|| INS_NOT_SUPPORTED.to_vec())
    }
}
