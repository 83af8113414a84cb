#![allow(dead_code)]

use keyple_calypso::{PoTransaction, SamRevision, SecuritySettings};
use keyple_core::{Bytes, CardTransport, ReaderChannel, TransportError};
use keyple_stub::{StubPo, StubPoConfig, StubReader, StubSam};
use tracing_subscriber::EnvFilter;

/// Master key shared by the stub PO and the stub SAM
pub const MASTER_KEY: [u8; 16] = *b"@ABCDEFGHIJKLMNO";

/// DF name of the stub PO application
pub const AID: &[u8] = b"1TIC.ICA";

/// Cyclic file of three 29 byte records
pub const EVENT_LOG_SFI: u8 = 0x08;

/// Counters file, counter 1 = 100, counter 2 = 5
pub const COUNTERS_SFI: u8 = 0x19;

pub type PoReader = StubReader<StubPo>;
pub type SamReader = StubReader<StubSam>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn stub_po(config: StubPoConfig) -> StubPo {
    StubPo::new(config.with_master_key(MASTER_KEY))
        .with_file(EVENT_LOG_SFI, vec![vec![0x11; 29], vec![0x22; 29], vec![0x33; 29]])
        .unwrap()
        .with_counters(COUNTERS_SFI, &[100, 5])
        .unwrap()
}

pub fn po_reader(po: StubPo) -> PoReader {
    let mut reader = StubReader::new("po-reader");
    reader.insert_card(po).unwrap();
    reader.open_physical_channel().unwrap();
    reader
}

pub fn sam_reader() -> SamReader {
    let mut reader = StubReader::new("sam-reader");
    reader.insert_card(StubSam::new(MASTER_KEY)).unwrap();
    reader.open_physical_channel().unwrap();
    reader
}

/// Transaction borrowing both readers, with the PO application selected
pub fn selected_transaction<'a, P, S>(
    po: &'a mut P,
    sam: &'a mut S,
    settings: SecuritySettings,
) -> PoTransaction<&'a mut P, &'a mut S>
where
    P: CardTransport,
    S: CardTransport,
{
    let mut transaction = PoTransaction::new(po, sam, SamRevision::C1, settings).unwrap();
    transaction.select_application(AID).unwrap();
    transaction
}

/// Transport flipping the first payload byte of responses to one instruction
#[derive(Debug)]
pub struct TamperingTransport<T> {
    inner: T,
    instruction: u8,
    tampered: usize,
}

impl<T> TamperingTransport<T> {
    pub const fn new(inner: T, instruction: u8) -> Self {
        Self {
            inner,
            instruction,
            tampered: 0,
        }
    }

    pub const fn tampered(&self) -> usize {
        self.tampered
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: CardTransport> CardTransport for TamperingTransport<T> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let response = self.inner.transmit_raw(command)?;
        if command.get(1) != Some(&self.instruction) || response.len() <= 2 {
            return Ok(response);
        }
        let mut response = response.to_vec();
        response[0] ^= 0xFF;
        self.tampered += 1;
        Ok(Bytes::from(response))
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.inner.reset()
    }
}

/// Transport stretching Read Records answers to a 256 byte response
#[derive(Debug)]
pub struct OversizedReadTransport<T> {
    inner: T,
}

impl<T> OversizedReadTransport<T> {
    pub const fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: CardTransport> CardTransport for OversizedReadTransport<T> {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        let response = self.inner.transmit_raw(command)?;
        if command.get(1) != Some(&0xB2) {
            return Ok(response);
        }
        let mut stretched = vec![0xEE; 254];
        stretched.extend_from_slice(&response[response.len() - 2..]);
        Ok(Bytes::from(stretched))
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn reset(&mut self) -> Result<(), TransportError> {
        self.inner.reset()
    }
}
