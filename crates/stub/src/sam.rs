//! Reference Calypso SAM emulation
//!
//! The SAM mirrors the session digest of the PO: it derives the card key from
//! the diversifier, the session key from its own challenge and the Open Session
//! response given to Digest Init, then signs and verifies the digest of the
//! blocks received through Digest Update.

use keyple_core::{ApduCommand, Command};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::crypto::{Key, PO_SIGNATURE, SessionDigest, TERMINAL_SIGNATURE};
use crate::reader::StubCard;
use crate::status::{self, Status};

/// ATR of a SAM C1 with serial number 12345678
pub const SAM_C1_ATR: [u8; 19] = [
    0x3B, 0x3F, 0x96, 0x00, 0x80, 0x5A, 0x00, 0x80, 0xC1, 0x20, 0x00, 0x00, 0x12, 0x34, 0x56, 0x78,
    0x82, 0x90, 0x00,
];

#[derive(Debug)]
struct SamSession {
    session_key: Key,
    digest: SessionDigest,
    encrypted: Option<bool>,
    closed: bool,
}

/// Software SAM holding one master key for every KIF
#[derive(Debug)]
pub struct StubSam {
    atr: Vec<u8>,
    class: u8,
    master_key: Key,
    rng: StdRng,
    card_key: Option<Key>,
    challenge: Option<Vec<u8>>,
    session: Option<SamSession>,
}

impl StubSam {
    /// SAM C1 using `master_key`
    pub fn new(master_key: [u8; 16]) -> Self {
        Self {
            atr: SAM_C1_ATR.to_vec(),
            class: 0x80,
            master_key: Key::new(master_key),
            rng: StdRng::seed_from_u64(0x5A4D),
            card_key: None,
            challenge: None,
            session: None,
        }
    }

    /// Emulate another SAM revision: its ATR and class byte
    pub fn with_revision(mut self, atr: Vec<u8>, class: u8) -> Self {
        self.atr = atr;
        self.class = class;
        self
    }

    /// Seed the challenge generator
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of digest blocks received in the current session
    pub fn digest_blocks(&self) -> Option<usize> {
        self.session.as_ref().map(|session| session.digest.blocks())
    }

    fn dispatch(&mut self, command: &Command) -> Result<Vec<u8>, Status> {
        if command.class() != self.class {
            return Err(status::CLASS_NOT_SUPPORTED);
        }
        let data = command.data().unwrap_or_default();

        match command.instruction() {
            0x14 => self.select_diversifier(data),
            0x84 => self.get_challenge(command.expected_length()),
            0x8A => self.digest_init(command.p2(), data),
            0x8C => self.digest_update(command.p1() == 0x80, command.p2() == 0x80, data),
            0x8E => self.digest_close(command.expected_length()),
            0x82 => self.digest_authenticate(data),
            0x20 | 0x86 | 0x1A | 0x12 | 0xBE => Ok(Vec::new()),
            _ => Err(status::INS_NOT_SUPPORTED),
        }
    }

    fn select_diversifier(&mut self, diversifier: &[u8]) -> Result<Vec<u8>, Status> {
        if !matches!(diversifier.len(), 4 | 8) {
            return Err(status::WRONG_LENGTH);
        }
        self.card_key = Some(self.master_key.diversify(diversifier));
        self.session = None;
        trace!(diversifier = %hex::encode_upper(diversifier), "SAM diversified");
        Ok(Vec::new())
    }

    fn get_challenge(&mut self, length: Option<u8>) -> Result<Vec<u8>, Status> {
        let length = match length {
            Some(length @ (4 | 8)) => usize::from(length),
            _ => return Err(status::WRONG_LENGTH),
        };
        let mut challenge = vec![0u8; length];
        self.rng.fill(&mut challenge[..]);
        self.challenge = Some(challenge.clone());
        Ok(challenge)
    }

    fn digest_init(&mut self, p2: u8, data: &[u8]) -> Result<Vec<u8>, Status> {
        let card_key = self.card_key.as_ref().ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        let challenge = self.challenge.take().ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        let open_session_data = if p2 == 0xFF {
            data.get(2..).ok_or(status::WRONG_LENGTH)?
        } else {
            data
        };
        if open_session_data.is_empty() {
            return Err(status::WRONG_LENGTH);
        }

        self.session = Some(SamSession {
            session_key: card_key.session_key(&challenge, open_session_data),
            digest: SessionDigest::new(open_session_data),
            encrypted: None,
            closed: false,
        });
        debug!("SAM digest initialized");
        Ok(Vec::new())
    }

    fn digest_update(&mut self, multiple: bool, encrypted: bool, data: &[u8]) -> Result<Vec<u8>, Status> {
        let session = self
            .session
            .as_mut()
            .filter(|session| !session.closed)
            .ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        if session.encrypted.is_some_and(|flag| flag != encrypted) {
            return Err(status::CONDITIONS_NOT_SATISFIED);
        }
        session.encrypted = Some(encrypted);

        if !multiple {
            session.digest.push(data);
            return Ok(Vec::new());
        }

        let mut blocks = Vec::new();
        let mut rest = data;
        while let [length, tail @ ..] = rest {
            let length = usize::from(*length);
            let block = tail.get(..length).ok_or(status::WRONG_LENGTH)?;
            blocks.push(block);
            rest = &tail[length..];
        }
        for block in blocks {
            session.digest.push(block);
        }
        Ok(Vec::new())
    }

    fn digest_close(&mut self, length: Option<u8>) -> Result<Vec<u8>, Status> {
        let length = match length {
            Some(length @ (4 | 8)) => usize::from(length),
            _ => return Err(status::WRONG_LENGTH),
        };
        let session = self
            .session
            .as_mut()
            .filter(|session| !session.closed)
            .ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        session.closed = true;
        Ok(session.digest.signature(&session.session_key, TERMINAL_SIGNATURE, length))
    }

    fn digest_authenticate(&mut self, po_signature: &[u8]) -> Result<Vec<u8>, Status> {
        let session = self
            .session
            .take()
            .filter(|session| session.closed)
            .ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        let expected = session
            .digest
            .signature(&session.session_key, PO_SIGNATURE, po_signature.len());
        if expected != po_signature {
            debug!("SAM rejected the PO signature");
            return Err(status::INCORRECT_SIGNATURE);
        }
        Ok(Vec::new())
    }
}

impl StubCard for StubSam {
    fn atr(&self) -> &[u8] {
        &self.atr
    }

    fn process_apdu(&mut self, command: &[u8]) -> Vec<u8> {
        let result = Command::from_bytes(command)
            .map_err(|_| status::WRONG_LENGTH)
            .and_then(|command| self.dispatch(&command));
        status::respond(result)
    }

    fn reset(&mut self) {
        self.card_key = None;
        self.challenge = None;
        self.session = None;
    }
}
