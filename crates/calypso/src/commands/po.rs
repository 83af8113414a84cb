//! PO command codecs outside the session lifecycle
//!
//! Record and counter commands address an elementary file by SFI (P2 bits 3-7).
//! SFI 0 targets the current file.

use std::collections::BTreeMap;

use keyple_core::{Bytes, Command};

use super::{CalypsoApdu, CommandKind, check_sfi_and_record};
use crate::revision::PoClass;
use crate::{Error, Result};

/// Largest value a counter holds (3 bytes)
pub const COUNTER_MAX: u32 = 0x00FF_FFFF;

/// Largest record content a PO stores and a digest block can mirror
pub const RECORD_MAX_LENGTH: usize = 250;

/// Number of records returned by Read Records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Only the requested record
    OneRecord,
    /// The requested record and the following ones, as long as they fit
    MultipleRecords,
}

/// Build PO Get Challenge: `CLA 84 00 00 08`
pub const fn get_challenge(class: PoClass) -> CalypsoApdu {
    CalypsoApdu::new(
        Command::new_with_le(class.value(), 0x84, 0x00, 0x00, 0x08),
        CommandKind::PoGetChallenge,
    )
}

/// Build Get Data for the FCI: `CLA CA 00 6F 00`
pub const fn get_data_fci(class: PoClass) -> CalypsoApdu {
    CalypsoApdu::new(
        Command::new_with_le(class.value(), 0xCA, 0x00, 0x6F, 0x00),
        CommandKind::GetDataFci,
    )
}

/// Build Read Records
pub fn read_records(
    class: PoClass,
    sfi: u8,
    record: u8,
    mode: ReadMode,
    expected_length: u8,
) -> Result<CalypsoApdu> {
    check_record(sfi, record)?;
    let p2 = sfi * 8
        + match mode {
            ReadMode::OneRecord => 0x04,
            ReadMode::MultipleRecords => 0x05,
        };
    Ok(CalypsoApdu::new(
        Command::new_with_le(class.value(), 0xB2, record, p2, expected_length),
        CommandKind::ReadRecords,
    ))
}

/// Build Update Record, replacing the record content
pub fn update_record(class: PoClass, sfi: u8, record: u8, data: impl Into<Bytes>) -> Result<CalypsoApdu> {
    record_command(class, 0xDC, CommandKind::UpdateRecord, sfi, record, data.into())
}

/// Build Write Record, OR-ing the data into the record
pub fn write_record(class: PoClass, sfi: u8, record: u8, data: impl Into<Bytes>) -> Result<CalypsoApdu> {
    record_command(class, 0xD2, CommandKind::WriteRecord, sfi, record, data.into())
}

/// Build Append Record on a cyclic file
pub fn append_record(class: PoClass, sfi: u8, data: impl Into<Bytes>) -> Result<CalypsoApdu> {
    check_sfi_and_record(sfi, 0, 0)?;
    let data = data.into();
    check_record_data(&data)?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(class.value(), 0xE2, 0x00, sfi * 8, data)?,
        CommandKind::AppendRecord,
    ))
}

/// Build Increase
pub fn increase(class: PoClass, sfi: u8, counter: u8, value: u32) -> Result<CalypsoApdu> {
    counter_command(class, 0x32, CommandKind::Increase, sfi, counter, value)
}

/// Build Decrease
pub fn decrease(class: PoClass, sfi: u8, counter: u8, value: u32) -> Result<CalypsoApdu> {
    counter_command(class, 0x30, CommandKind::Decrease, sfi, counter, value)
}

fn check_record(sfi: u8, record: u8) -> Result<()> {
    check_sfi_and_record(sfi, record, 31)?;
    if record == 0 {
        return Err(Error::invalid_argument("record number 0"));
    }
    Ok(())
}

fn check_record_data(data: &[u8]) -> Result<()> {
    match data.len() {
        0 => Err(Error::invalid_argument("empty record data")),
        length if length > RECORD_MAX_LENGTH => Err(Error::invalid_argument(format!(
            "record data of {length} bytes above {RECORD_MAX_LENGTH}"
        ))),
        _ => Ok(()),
    }
}

fn record_command(
    class: PoClass,
    ins: u8,
    kind: CommandKind,
    sfi: u8,
    record: u8,
    data: Bytes,
) -> Result<CalypsoApdu> {
    check_record(sfi, record)?;
    check_record_data(&data)?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(class.value(), ins, record, sfi * 8 + 0x04, data)?,
        kind,
    ))
}

fn counter_command(
    class: PoClass,
    ins: u8,
    kind: CommandKind,
    sfi: u8,
    counter: u8,
    value: u32,
) -> Result<CalypsoApdu> {
    check_record(sfi, counter)?;
    if value > COUNTER_MAX {
        return Err(Error::invalid_argument(format!("counter value {value} above {COUNTER_MAX}")));
    }
    let data = value.to_be_bytes();
    Ok(CalypsoApdu::new(
        Command::new_with_data_and_le(class.value(), ins, counter, sfi * 8, data[1..].to_vec(), 0x00)?,
        kind,
    ))
}

/// Decode a Read Records payload into record number and content
pub fn parse_records(mode: ReadMode, first_record: u8, payload: &[u8]) -> Result<BTreeMap<u8, Bytes>> {
    let mut records = BTreeMap::new();
    match mode {
        ReadMode::OneRecord => {
            records.insert(first_record, Bytes::copy_from_slice(payload));
        }
        ReadMode::MultipleRecords => {
            let mut rest = payload;
            while let [number, length, tail @ ..] = rest {
                let length = *length as usize;
                let data = tail
                    .get(..length)
                    .ok_or(Error::Parse("record length beyond Read Records payload"))?;
                records.insert(*number, Bytes::copy_from_slice(data));
                rest = &tail[length..];
            }
            if !rest.is_empty() {
                return Err(Error::Parse("trailing byte in Read Records payload"));
            }
        }
    }
    Ok(records)
}

/// Decode the new counter value returned by Increase or Decrease
pub fn parse_counter_value(payload: &[u8]) -> Result<u32> {
    match payload {
        [a, b, c] => Ok(u32::from_be_bytes([0, *a, *b, *c])),
        _ => Err(Error::Parse("counter value is not 3 bytes")),
    }
}

/// Decode the 8 byte PO challenge
pub fn parse_challenge(payload: &[u8]) -> Result<[u8; 8]> {
    payload
        .try_into()
        .map_err(|_| Error::Parse("PO challenge is not 8 bytes"))
}
