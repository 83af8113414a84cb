//! APDU command definitions and traits
//!
//! This module provides the immutable [`Command`] value and the [`ApduCommand`]
//! trait used to serialize commands as `CLA INS P1 P2 [Lc data] [Le]`
//! according to ISO/IEC 7816-4 (short length form only).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Expected length type for APDU commands
pub type ExpectedLength = u8;

/// Maximum length of the data field of a short APDU
pub const MAX_DATA_LENGTH: usize = 255;

/// Core trait for APDU commands
pub trait ApduCommand {
    /// Command class (CLA)
    fn class(&self) -> u8;

    /// Instruction code (INS)
    fn instruction(&self) -> u8;

    /// First parameter (P1)
    fn p1(&self) -> u8;

    /// Second parameter (P2)
    fn p2(&self) -> u8;

    /// Command payload data (optional)
    fn data(&self) -> Option<&[u8]>;

    /// Expected response length (optional)
    fn expected_length(&self) -> Option<ExpectedLength>;

    /// Convert to raw APDU bytes
    fn to_bytes(&self) -> Bytes {
        let mut buffer = BytesMut::with_capacity(self.command_length());

        buffer.put_u8(self.class());
        buffer.put_u8(self.instruction());
        buffer.put_u8(self.p1());
        buffer.put_u8(self.p2());

        if let Some(data) = self.data() {
            buffer.put_u8(data.len() as u8);
            buffer.put_slice(data);
        }

        if let Some(le) = self.expected_length() {
            buffer.put_u8(le);
        }

        buffer.freeze()
    }

    /// Calculate length of serialized command
    fn command_length(&self) -> usize {
        4 + self.data().map_or(0, |data| 1 + data.len())
            + usize::from(self.expected_length().is_some())
    }

    /// The Lc byte, if the command carries a data field
    fn lc(&self) -> Option<u8> {
        self.data().map(|data| data.len() as u8)
    }
}

/// Generic, immutable APDU command
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Command {
    cla: u8,
    ins: u8,
    p1: u8,
    p2: u8,
    data: Option<Bytes>,
    le: Option<ExpectedLength>,
}

impl Command {
    /// Create a new command with just the header bytes
    pub const fn new(cla: u8, ins: u8, p1: u8, p2: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: None,
        }
    }

    /// Create a new command with expected response length (Le)
    pub const fn new_with_le(cla: u8, ins: u8, p1: u8, p2: u8, le: ExpectedLength) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: None,
            le: Some(le),
        }
    }

    /// Create a new command with a data field, validating its length
    pub fn new_with_data<T: Into<Bytes>>(cla: u8, ins: u8, p1: u8, p2: u8, data: T) -> Result<Self> {
        Self::new(cla, ins, p1, p2).with_data(data)
    }

    /// Create a new command with both a data field and an expected length
    pub fn new_with_data_and_le<T: Into<Bytes>>(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: T,
        le: ExpectedLength,
    ) -> Result<Self> {
        Ok(Self::new(cla, ins, p1, p2).with_data(data)?.with_le(le))
    }

    /// Set the data field
    ///
    /// Fails if the data does not fit in a short APDU. An empty data field is
    /// encoded without Lc.
    pub fn with_data<T: Into<Bytes>>(mut self, data: T) -> Result<Self> {
        let data = data.into();
        if data.len() > MAX_DATA_LENGTH {
            return Err(Error::invalid_argument(format!(
                "data field of {} bytes exceeds {} bytes",
                data.len(),
                MAX_DATA_LENGTH
            )));
        }
        self.data = (!data.is_empty()).then_some(data);
        Ok(self)
    }

    /// Set the expected length field
    pub const fn with_le(mut self, le: ExpectedLength) -> Self {
        self.le = Some(le);
        self
    }

    /// Parse a command from raw bytes
    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        let [cla, ins, p1, p2, body @ ..] = raw else {
            return Err(Error::Parse("command shorter than its 4 byte header"));
        };
        let command = Self::new(*cla, *ins, *p1, *p2);

        match body {
            [] => Ok(command),
            [le] => Ok(command.with_le(*le)),
            [lc, rest @ ..] => {
                let lc = *lc as usize;
                match rest.len() {
                    n if n == lc => command.with_data(Bytes::copy_from_slice(rest)),
                    n if n == lc + 1 => Ok(command
                        .with_data(Bytes::copy_from_slice(&rest[..lc]))?
                        .with_le(rest[lc])),
                    _ => Err(Error::Parse("Lc inconsistent with command length")),
                }
            }
        }
    }
}

impl ApduCommand for Command {
    fn class(&self) -> u8 {
        self.cla
    }

    fn instruction(&self) -> u8 {
        self.ins
    }

    fn p1(&self) -> u8 {
        self.p1
    }

    fn p2(&self) -> u8 {
        self.p2
    }

    fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    fn expected_length(&self) -> Option<ExpectedLength> {
        self.le
    }
}
