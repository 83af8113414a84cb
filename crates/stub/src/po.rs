//! Calypso PO emulation
//!
//! The emulation implements what a secure session needs from a PO: application
//! selection with its FCI, records and counters, the modification buffer, the
//! three Open Session layouts and signed Close Session with rollback.

use std::collections::BTreeMap;

use keyple_core::{ApduCommand, Command};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::crypto::{Key, PO_SIGNATURE, SessionDigest, TERMINAL_SIGNATURE};
use crate::reader::StubCard;
use crate::status::{self, Status};
use crate::{Error, Result};

/// Record length of a 2.4 Open Session response
const REV24_RECORD_LENGTH: usize = 29;

/// Modifications a 2.4 PO accepts per session
const REV24_MODIFICATIONS: usize = 6;

/// KIF of the personalization, load and debit keys
const KIFS: [u8; 3] = [0x21, 0x27, 0x30];

/// Open Session layout implied by the application type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Variant {
    Rev24,
    Rev31,
    Rev32,
}

impl Variant {
    const fn from_application_type(application_type: u8) -> Self {
        if application_type & 0x80 != 0 {
            return Self::Rev31;
        }
        match application_type >> 3 {
            0x05 => Self::Rev32,
            0x04 => Self::Rev31,
            _ => Self::Rev24,
        }
    }

    const fn class(self) -> u8 {
        match self {
            Self::Rev24 => 0x94,
            Self::Rev31 | Self::Rev32 => 0x00,
        }
    }

    const fn challenge_length(self) -> usize {
        match self {
            Self::Rev24 | Self::Rev31 => 4,
            Self::Rev32 => 8,
        }
    }

    const fn random_length(self) -> usize {
        match self {
            Self::Rev24 | Self::Rev31 => 1,
            Self::Rev32 => 5,
        }
    }

    const fn signature_length(self) -> usize {
        self.challenge_length()
    }
}

/// Identity and keys of an emulated PO
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StubPoConfig {
    atr: Vec<u8>,
    df_name: Vec<u8>,
    serial_number: [u8; 8],
    startup_info: [u8; 7],
    kvc: u8,
    master_key: [u8; 16],
    transaction_counter: u32,
    df_invalidated: bool,
    seed: u64,
}

impl Default for StubPoConfig {
    fn default() -> Self {
        Self {
            atr: vec![0x3B, 0x88, 0x80, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x71, 0x81, 0x00, 0xF9],
            df_name: b"1TIC.ICA".to_vec(),
            serial_number: [0x00, 0x00, 0x00, 0x00, 0x11, 0x22, 0x33, 0x44],
            // 430 byte buffer, revision 3.1
            startup_info: [0x0A, 0x3C, 0x20, 0x05, 0x14, 0x10, 0x01],
            kvc: 0x79,
            master_key: *b"@ABCDEFGHIJKLMNO",
            transaction_counter: 0x03_D31C,
            df_invalidated: false,
            seed: 0x50,
        }
    }
}

impl StubPoConfig {
    /// Set the application serial number
    pub const fn with_serial_number(mut self, serial_number: [u8; 8]) -> Self {
        self.serial_number = serial_number;
        self
    }

    /// Set the application type, which selects the PO revision
    pub const fn with_application_type(mut self, application_type: u8) -> Self {
        self.startup_info[2] = application_type;
        self
    }

    /// Set the modification buffer size indicator (6 to 55)
    pub const fn with_buffer_size_indicator(mut self, indicator: u8) -> Self {
        self.startup_info[0] = indicator;
        self
    }

    /// Set the key version reported at Open Session
    pub const fn with_kvc(mut self, kvc: u8) -> Self {
        self.kvc = kvc;
        self
    }

    /// Set the master key the card keys are diversified from
    pub const fn with_master_key(mut self, master_key: [u8; 16]) -> Self {
        self.master_key = master_key;
        self
    }

    /// Set the transaction counter
    pub const fn with_transaction_counter(mut self, counter: u32) -> Self {
        self.transaction_counter = counter;
        self
    }

    /// Answer the selection with 6283
    pub const fn with_df_invalidated(mut self, invalidated: bool) -> Self {
        self.df_invalidated = invalidated;
        self
    }

    /// Seed the random number generator
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Application serial number
    pub const fn serial_number(&self) -> &[u8; 8] {
        &self.serial_number
    }

    /// DF name of the application
    pub fn df_name(&self) -> &[u8] {
        &self.df_name
    }

    /// FCI returned on selection
    pub fn fci(&self) -> Vec<u8> {
        let mut discretionary = vec![0xC7, 0x08];
        discretionary.extend_from_slice(&self.serial_number);
        discretionary.extend_from_slice(&[0x53, 0x07]);
        discretionary.extend_from_slice(&self.startup_info);

        let issuer = tlv(&[0xBF, 0x0C], &discretionary);
        let proprietary = tlv(&[0xA5], &issuer);
        let mut content = tlv(&[0x84], &self.df_name);
        content.extend_from_slice(&proprietary);
        tlv(&[0x6F], &content)
    }

    /// Modification buffer capacity: bytes, or commands for revision 2.4
    pub fn buffer_capacity(&self) -> usize {
        match Variant::from_application_type(self.startup_info[2]) {
            Variant::Rev24 => REV24_MODIFICATIONS,
            _ => 2f64.powf((f64::from(self.startup_info[0]) + 25.0) / 4.0).floor() as usize,
        }
    }
}

fn tlv(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let mut encoded = tag.to_vec();
    encoded.push(value.len() as u8);
    encoded.extend_from_slice(value);
    encoded
}

#[derive(Debug)]
struct PoSession {
    session_key: Key,
    digest: SessionDigest,
    snapshot: BTreeMap<u8, Vec<Vec<u8>>>,
    used: usize,
}

/// Software Calypso PO
#[derive(Debug)]
pub struct StubPo {
    config: StubPoConfig,
    variant: Variant,
    card_key: Key,
    rng: StdRng,
    files: BTreeMap<u8, Vec<Vec<u8>>>,
    current_sfi: Option<u8>,
    selected: bool,
    ratified: bool,
    transaction_counter: u32,
    session: Option<PoSession>,
    sessions_committed: usize,
    sessions_rejected: usize,
}

impl StubPo {
    /// Create a PO without files
    pub fn new(config: StubPoConfig) -> Self {
        let variant = Variant::from_application_type(config.startup_info[2]);
        let card_key = Key::new(config.master_key).diversify(&config.serial_number);
        Self {
            variant,
            card_key,
            rng: StdRng::seed_from_u64(config.seed),
            files: BTreeMap::new(),
            current_sfi: None,
            selected: false,
            ratified: true,
            transaction_counter: config.transaction_counter,
            session: None,
            sessions_committed: 0,
            sessions_rejected: 0,
            config,
        }
    }

    /// Add an elementary file holding these records, record 1 first
    pub fn with_file(mut self, sfi: u8, records: Vec<Vec<u8>>) -> Result<Self> {
        if sfi == 0 || sfi > 30 {
            return Err(Error::InvalidConfig("SFI must be in 1..=30"));
        }
        if records.is_empty() || records.iter().any(|record| record.is_empty() || record.len() > 250) {
            return Err(Error::InvalidConfig("records must hold 1 to 250 bytes"));
        }
        self.files.insert(sfi, records);
        Ok(self)
    }

    /// Add a counters file, counter 1 first
    pub fn with_counters(self, sfi: u8, values: &[u32]) -> Result<Self> {
        if values.iter().any(|&value| value > 0x00FF_FFFF) {
            return Err(Error::InvalidConfig("counter values hold 3 bytes"));
        }
        let record = values.iter().flat_map(|value| value.to_be_bytes()[1..].to_vec()).collect();
        self.with_file(sfi, vec![record])
    }

    /// Card configuration
    pub const fn config(&self) -> &StubPoConfig {
        &self.config
    }

    /// Content of a record
    pub fn record(&self, sfi: u8, record: u8) -> Option<&[u8]> {
        let index = usize::from(record).checked_sub(1)?;
        self.files.get(&sfi)?.get(index).map(Vec::as_slice)
    }

    /// Value of a counter
    pub fn counter(&self, sfi: u8, counter: u8) -> Option<u32> {
        let offset = usize::from(counter).checked_sub(1)? * 3;
        let bytes = self.record(sfi, 1)?.get(offset..offset + 3)?;
        Some(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
    }

    /// Current transaction counter
    pub const fn transaction_counter(&self) -> u32 {
        self.transaction_counter
    }

    /// Whether a secure session is open
    pub const fn is_session_open(&self) -> bool {
        self.session.is_some()
    }

    /// Whether the last session was ratified
    pub const fn is_ratified(&self) -> bool {
        self.ratified
    }

    /// Sessions closed with a valid terminal signature
    pub const fn sessions_committed(&self) -> usize {
        self.sessions_committed
    }

    /// Sessions rolled back because of a wrong terminal signature
    pub const fn sessions_rejected(&self) -> usize {
        self.sessions_rejected
    }

    fn dispatch(&mut self, command: &Command) -> std::result::Result<Vec<u8>, Status> {
        if !self.selected {
            return Err(status::CONDITIONS_NOT_SATISFIED);
        }
        if command.class() != self.variant.class() {
            return Err(status::CLASS_NOT_SUPPORTED);
        }
        let data = command.data().unwrap_or_default();

        match command.instruction() {
            0xCA if command.p2() == 0x6F => Ok(self.config.fci()),
            0x84 => self.get_challenge(command.expected_length()),
            0x8A => self.open_session(command.p1(), command.p2(), data),
            0x8E => self.close_session(command.p1(), command.data()),
            0xB2 => self.read_records(command.p1(), command.p2()),
            0xDC | 0xD2 => self.update_record(command.instruction(), command.p1(), command.p2(), data),
            0xE2 => self.append_record(command.p1(), command.p2(), data),
            0x32 | 0x30 => self.change_counter(command.instruction() == 0x32, command.p1(), command.p2(), data),
            _ => Err(status::INS_NOT_SUPPORTED),
        }
    }

    fn select(&mut self, aid: &[u8]) -> Vec<u8> {
        self.abort();
        if aid.is_empty() || !self.config.df_name.starts_with(aid) {
            self.selected = false;
            return status::FILE_NOT_FOUND.to_vec();
        }
        self.selected = true;
        let mut response = self.config.fci();
        let sw = if self.config.df_invalidated {
            status::FILE_INVALIDATED
        } else {
            status::SUCCESS
        };
        response.extend_from_slice(&sw);
        response
    }

    fn get_challenge(&mut self, length: Option<u8>) -> std::result::Result<Vec<u8>, Status> {
        if length != Some(0x08) {
            return Err(status::WRONG_LENGTH);
        }
        let mut challenge = vec![0u8; 8];
        self.rng.fill(&mut challenge[..]);
        Ok(challenge)
    }

    fn open_session(&mut self, p1: u8, p2: u8, data: &[u8]) -> std::result::Result<Vec<u8>, Status> {
        if self.session.is_some() {
            return Err(status::CONDITIONS_NOT_SATISFIED);
        }
        let variant = self.variant;
        let (record_and_key, challenge) = match variant {
            Variant::Rev24 if p1 & 0x80 != 0 && p2 & 0x07 == 0 => (p1 & 0x7F, data),
            Variant::Rev31 if p2 & 0x07 == 1 => (p1, data),
            Variant::Rev32 if p2 & 0x07 == 2 => (p1, data.get(1..).unwrap_or_default()),
            _ => return Err(status::WRONG_PARAMETERS),
        };
        if challenge.len() != variant.challenge_length() {
            return Err(status::WRONG_LENGTH);
        }
        let key_index = usize::from(record_and_key & 0x07);
        let record = record_and_key >> 3;
        let kif = *KIFS.get(key_index.wrapping_sub(1)).ok_or(status::WRONG_PARAMETERS)?;
        if self.transaction_counter == 0 {
            return Err(status::TRANSACTION_COUNTER_ZERO);
        }

        let mut record_data = if record == 0 {
            Vec::new()
        } else {
            self.read_one(p2 >> 3, record)?.to_vec()
        };
        let counter = self.transaction_counter.to_be_bytes();
        let mut random = vec![0u8; variant.random_length()];
        self.rng.fill(&mut random[..]);

        let mut payload = Vec::new();
        match variant {
            Variant::Rev24 => {
                payload.push(self.config.kvc);
                payload.extend_from_slice(&counter[1..]);
                payload.extend_from_slice(&random);
                if !self.ratified {
                    payload.extend_from_slice(&[0x00, 0x00]);
                }
                if !record_data.is_empty() {
                    record_data.resize(REV24_RECORD_LENGTH, 0x00);
                    payload.extend_from_slice(&record_data);
                }
            }
            Variant::Rev31 | Variant::Rev32 => {
                let flags = u8::from(!self.ratified) | if variant == Variant::Rev32 { 0x02 } else { 0x00 };
                payload.extend_from_slice(&counter[1..]);
                payload.extend_from_slice(&random);
                payload.extend_from_slice(&[flags, kif, self.config.kvc, record_data.len() as u8]);
                payload.extend_from_slice(&record_data);
            }
        }

        self.transaction_counter -= 1;
        self.session = Some(PoSession {
            session_key: self.card_key.session_key(challenge, &payload),
            digest: SessionDigest::new(&payload),
            snapshot: self.files.clone(),
            used: 0,
        });
        debug!(kif, record, "PO session opened");
        Ok(payload)
    }

    fn close_session(&mut self, p1: u8, signature: Option<&[u8]>) -> std::result::Result<Vec<u8>, Status> {
        let session = self.session.take().ok_or(status::CONDITIONS_NOT_SATISFIED)?;
        let Some(signature) = signature else {
            debug!("PO session aborted");
            self.files = session.snapshot;
            return Ok(Vec::new());
        };

        let length = self.variant.signature_length();
        if signature.len() != length {
            self.files = session.snapshot;
            return Err(status::WRONG_LENGTH);
        }
        let expected = session.digest.signature(&session.session_key, TERMINAL_SIGNATURE, length);
        if expected != signature {
            debug!("PO rejected the terminal signature, rolling back");
            self.files = session.snapshot;
            self.sessions_rejected += 1;
            return Err(status::INCORRECT_SIGNATURE);
        }

        self.ratified = p1 == 0x80;
        self.sessions_committed += 1;
        debug!(ratified = self.ratified, modifications = session.used, "PO session committed");
        Ok(session.digest.signature(&session.session_key, PO_SIGNATURE, length))
    }

    fn file_mut(&mut self, sfi: u8) -> std::result::Result<&mut Vec<Vec<u8>>, Status> {
        let sfi = self.resolve_sfi(sfi)?;
        self.files.get_mut(&sfi).ok_or(status::FILE_NOT_FOUND)
    }

    fn resolve_sfi(&mut self, sfi: u8) -> std::result::Result<u8, Status> {
        let sfi = if sfi == 0 {
            self.current_sfi.ok_or(status::FILE_NOT_FOUND)?
        } else {
            sfi
        };
        if !self.files.contains_key(&sfi) {
            return Err(status::FILE_NOT_FOUND);
        }
        self.current_sfi = Some(sfi);
        Ok(sfi)
    }

    fn read_one(&mut self, sfi: u8, record: u8) -> std::result::Result<&[u8], Status> {
        let index = usize::from(record).checked_sub(1).ok_or(status::WRONG_PARAMETERS)?;
        self.file_mut(sfi)?
            .get(index)
            .map(Vec::as_slice)
            .ok_or(status::RECORD_NOT_FOUND)
    }

    fn read_records(&mut self, record: u8, p2: u8) -> std::result::Result<Vec<u8>, Status> {
        if record == 0 {
            return Err(status::WRONG_PARAMETERS);
        }
        match p2 & 0x07 {
            0x04 => Ok(self.read_one(p2 >> 3, record)?.to_vec()),
            0x05 => {
                let first = usize::from(record) - 1;
                let file = self.file_mut(p2 >> 3)?;
                if first >= file.len() {
                    return Err(status::RECORD_NOT_FOUND);
                }
                let mut payload = Vec::new();
                for (offset, content) in file.iter().enumerate().skip(first) {
                    if payload.len() + 2 + content.len() > 250 {
                        break;
                    }
                    payload.push((offset + 1) as u8);
                    payload.push(content.len() as u8);
                    payload.extend_from_slice(content);
                }
                Ok(payload)
            }
            _ => Err(status::WRONG_PARAMETERS),
        }
    }

    /// Account for a modification in the session buffer
    fn consume(&mut self, data_length: usize) -> std::result::Result<(), Status> {
        let capacity = self.config.buffer_capacity();
        let cost = match self.variant {
            Variant::Rev24 => 1,
            _ => data_length + 6,
        };
        if let Some(session) = self.session.as_mut() {
            if session.used + cost > capacity {
                return Err(status::MODIFICATIONS_EXCEEDED);
            }
            session.used += cost;
        }
        Ok(())
    }

    fn update_record(&mut self, ins: u8, record: u8, p2: u8, data: &[u8]) -> std::result::Result<Vec<u8>, Status> {
        if record == 0 || p2 & 0x07 != 0x04 {
            return Err(status::WRONG_PARAMETERS);
        }
        let index = usize::from(record) - 1;
        if self.file_mut(p2 >> 3)?.get(index).is_none() {
            return Err(status::RECORD_NOT_FOUND);
        }
        self.consume(data.len())?;

        let file = self.file_mut(p2 >> 3)?;
        let content = &mut file[index];
        if ins == 0xDC {
            *content = data.to_vec();
        } else {
            if content.len() < data.len() {
                content.resize(data.len(), 0x00);
            }
            for (byte, new) in content.iter_mut().zip(data) {
                *byte |= new;
            }
        }
        Ok(Vec::new())
    }

    fn append_record(&mut self, p1: u8, p2: u8, data: &[u8]) -> std::result::Result<Vec<u8>, Status> {
        if p1 != 0 || p2 & 0x07 != 0 {
            return Err(status::WRONG_PARAMETERS);
        }
        self.file_mut(p2 >> 3)?;
        self.consume(data.len())?;

        let file = self.file_mut(p2 >> 3)?;
        file.insert(0, data.to_vec());
        file.truncate(file.len() - 1);
        Ok(Vec::new())
    }

    fn change_counter(&mut self, increase: bool, counter: u8, p2: u8, data: &[u8]) -> std::result::Result<Vec<u8>, Status> {
        let [a, b, c] = data else {
            return Err(status::WRONG_LENGTH);
        };
        let amount = u32::from_be_bytes([0, *a, *b, *c]);
        let offset = usize::from(counter).checked_sub(1).ok_or(status::WRONG_PARAMETERS)? * 3;
        let current = {
            let record = self.file_mut(p2 >> 3)?.first().ok_or(status::RECORD_NOT_FOUND)?;
            let bytes = record.get(offset..offset + 3).ok_or(status::WRONG_PARAMETERS)?;
            u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]])
        };
        let value = if increase {
            current.checked_add(amount).filter(|value| *value <= 0x00FF_FFFF)
        } else {
            current.checked_sub(amount)
        }
        .ok_or(status::WRONG_DATA)?;
        self.consume(data.len())?;

        let record = &mut self.file_mut(p2 >> 3)?[0];
        record[offset..offset + 3].copy_from_slice(&value.to_be_bytes()[1..]);
        Ok(value.to_be_bytes()[1..].to_vec())
    }

    fn abort(&mut self) {
        if let Some(session) = self.session.take() {
            debug!("PO session lost, rolling back");
            self.files = session.snapshot;
        }
    }
}

/// Bytes of a command as they enter the session digest
fn digest_bytes<'a>(raw: &'a [u8], command: &Command) -> &'a [u8] {
    if command.data().is_some() && command.expected_length().is_some() {
        &raw[..raw.len() - 1]
    } else {
        raw
    }
}

impl StubCard for StubPo {
    fn atr(&self) -> &[u8] {
        &self.config.atr
    }

    fn process_apdu(&mut self, raw: &[u8]) -> Vec<u8> {
        let Ok(command) = Command::from_bytes(raw) else {
            return status::WRONG_LENGTH.to_vec();
        };
        if command.class() == 0x00 && command.instruction() == 0xA4 && command.p1() == 0x04 {
            return self.select(command.data().unwrap_or_default());
        }
        if command.instruction() != 0x8A {
            self.ratified = true;
        }

        let response = status::respond(self.dispatch(&command));
        let in_session = !matches!(command.instruction(), 0x8A | 0x8E);
        if let Some(session) = self.session.as_mut().filter(|_| in_session) {
            session.digest.push(digest_bytes(raw, &command));
            session.digest.push(&response);
        }
        trace!(command = %hex::encode_upper(raw), response = %hex::encode_upper(&response), "PO exchange");
        response
    }

    fn reset(&mut self) {
        self.abort();
        self.selected = false;
        self.current_sfi = None;
    }
}
