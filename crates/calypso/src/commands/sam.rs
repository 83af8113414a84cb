//! SAM command codecs
//!
//! The class byte comes from the [`SamRevision`]: 0x80 for C1 and S1E, 0x94 for S1D.

use keyple_core::command::MAX_DATA_LENGTH;
use keyple_core::{Bytes, Command};

use super::{CalypsoApdu, CommandKind, concat};
use crate::key::{KeyReference, UNDEFINED_KIF};
use crate::revision::SamRevision;
use crate::{Error, Result};

/// Highest event counter or ceiling index
pub const MAX_COUNTER_INDEX: u8 = 26;
/// Highest event counter or ceiling record number
pub const MAX_COUNTER_RECORD: u8 = 3;
/// Length of a PIN block
pub const PIN_LENGTH: usize = 4;

/// Single item or whole record addressing of Read Event Counter and Read Ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterTarget {
    /// One counter or ceiling, by index (0 to 26)
    Single(u8),
    /// One record of nine items, by record number (1 to 3)
    Record(u8),
}

impl CounterTarget {
    fn validate(self) -> Result<Self> {
        match self {
            Self::Single(index) if index > MAX_COUNTER_INDEX => Err(Error::invalid_argument(format!(
                "counter index {index} above {MAX_COUNTER_INDEX}"
            ))),
            Self::Record(record) if !(1..=MAX_COUNTER_RECORD).contains(&record) => Err(
                Error::invalid_argument(format!("counter record {record} outside of [1, {MAX_COUNTER_RECORD}]")),
            ),
            target => Ok(target),
        }
    }
}

fn check_length(what: &str, actual: usize, allowed: &[usize]) -> Result<()> {
    if allowed.contains(&actual) {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!(
            "{what} of {actual} bytes, expected one of {allowed:?}"
        )))
    }
}

/// Build Select Diversifier: `CLA 14 00 00 Lc diversifier`
pub fn select_diversifier(revision: SamRevision, diversifier: &[u8]) -> Result<CalypsoApdu> {
    check_length("diversifier", diversifier.len(), &[4, 8])?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x14, 0x00, 0x00, Bytes::copy_from_slice(diversifier))?,
        CommandKind::SelectDiversifier,
    ))
}

/// Build Get Challenge: `CLA 84 00 00 Le`
pub fn get_challenge(revision: SamRevision, expected_length: u8) -> Result<CalypsoApdu> {
    check_length("challenge", expected_length.into(), &[4, 8])?;
    Ok(CalypsoApdu::new(
        Command::new_with_le(revision.class_byte()?, 0x84, 0x00, 0x00, expected_length),
        CommandKind::SamGetChallenge,
    ))
}

/// Build Digest Init
///
/// With a KIF the key is referenced by KIF/KVC (P2 = FF). With the undefined KIF
/// the key is referenced by its record number in P2.
pub fn digest_init(
    revision: SamRevision,
    verification_mode: bool,
    rev3_2_mode: bool,
    key_record: u8,
    key: KeyReference,
    digest_data: &[u8],
) -> Result<CalypsoApdu> {
    if key_record == 0x00 && key.kif == 0x00 {
        return Err(Error::invalid_argument("bad key record number, kif or kvc"));
    }
    if digest_data.is_empty() {
        return Err(Error::invalid_argument("digest data is empty"));
    }

    let p1 = u8::from(verification_mode) | (u8::from(rev3_2_mode) << 1);
    let (p2, data) = if key.kif == UNDEFINED_KIF {
        (key_record, Bytes::copy_from_slice(digest_data))
    } else {
        (0xFF, concat(&[&[key.kif, key.kvc], digest_data]))
    };

    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x8A, p1, p2, data)?,
        CommandKind::DigestInit,
    ))
}

/// Build Digest Update: `CLA 8C 00 P2 Lc data`, P2 = 80 in an encrypted session
pub fn digest_update(revision: SamRevision, encrypted_session: bool, digest_data: &[u8]) -> Result<CalypsoApdu> {
    if digest_data.len() > MAX_DATA_LENGTH {
        return Err(Error::invalid_argument("digest data exceeds 255 bytes"));
    }
    let p2 = if encrypted_session { 0x80 } else { 0x00 };
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x8C, 0x00, p2, Bytes::copy_from_slice(digest_data))?,
        CommandKind::DigestUpdate,
    ))
}

/// Build Digest Update Multiple: `CLA 8C 80 P2 Lc data`
///
/// `digest_data` is a sequence of `length, bytes` blocks.
pub fn digest_update_multiple(
    revision: SamRevision,
    encrypted_session: bool,
    digest_data: &[u8],
) -> Result<CalypsoApdu> {
    if digest_data.len() > MAX_DATA_LENGTH {
        return Err(Error::invalid_argument("digest data exceeds 255 bytes"));
    }
    let p2 = if encrypted_session { 0x80 } else { 0x00 };
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x8C, 0x80, p2, Bytes::copy_from_slice(digest_data))?,
        CommandKind::DigestUpdateMultiple,
    ))
}

/// Build Digest Close: `CLA 8E 00 00 Le`, Le is 4 or 8
pub fn digest_close(revision: SamRevision, expected_length: u8) -> Result<CalypsoApdu> {
    check_length("signature", expected_length.into(), &[4, 8])?;
    Ok(CalypsoApdu::new(
        Command::new_with_le(revision.class_byte()?, 0x8E, 0x00, 0x00, expected_length),
        CommandKind::DigestClose,
    ))
}

/// Build Digest Authenticate: `CLA 82 00 00 Lc signature`
pub fn digest_authenticate(revision: SamRevision, signature: &[u8]) -> Result<CalypsoApdu> {
    check_length("signature", signature.len(), &[4, 8])?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x82, 0x00, 0x00, Bytes::copy_from_slice(signature))?,
        CommandKind::DigestAuthenticate,
    ))
}

/// Build Unlock: `CLA 20 00 00 Lc data`, data is 8 or 16 bytes
pub fn unlock(revision: SamRevision, unlock_data: &[u8]) -> Result<CalypsoApdu> {
    check_length("unlock data", unlock_data.len(), &[8, 16])?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x20, 0x00, 0x00, Bytes::copy_from_slice(unlock_data))?,
        CommandKind::Unlock,
    ))
}

/// Build Write Key: `CLA 1A P1 P2 Lc data`, data is 48 to 80 bytes
pub fn write_key(revision: SamRevision, writing_mode: u8, key_reference: u8, key_data: &[u8]) -> Result<CalypsoApdu> {
    if !(48..=80).contains(&key_data.len()) {
        return Err(Error::invalid_argument(format!(
            "key data of {} bytes outside of [48, 80]",
            key_data.len()
        )));
    }
    Ok(CalypsoApdu::new(
        Command::new_with_data(
            revision.class_byte()?,
            0x1A,
            writing_mode,
            key_reference,
            Bytes::copy_from_slice(key_data),
        )?,
        CommandKind::WriteKey,
    ))
}

/// Build Card Cipher PIN
///
/// With a new PIN the command ciphers a PIN change (P1 = 40), otherwise a PIN
/// verification (P1 = 80).
pub fn card_cipher_pin(
    revision: SamRevision,
    key: KeyReference,
    current_pin: &[u8],
    new_pin: Option<&[u8]>,
) -> Result<CalypsoApdu> {
    check_length("current PIN", current_pin.len(), &[PIN_LENGTH])?;
    if let Some(new_pin) = new_pin {
        check_length("new PIN", new_pin.len(), &[PIN_LENGTH])?;
    }

    let (p1, data) = match new_pin {
        Some(new_pin) => (0x40, concat(&[&[key.kif, key.kvc], current_pin, new_pin])),
        None => (0x80, concat(&[&[key.kif, key.kvc], current_pin])),
    };
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x12, p1, 0xFF, data)?,
        CommandKind::CardCipherPin,
    ))
}

/// Build Give Random: `CLA 86 00 00 08 random`
pub fn give_random(revision: SamRevision, random: &[u8]) -> Result<CalypsoApdu> {
    check_length("random", random.len(), &[8])?;
    Ok(CalypsoApdu::new(
        Command::new_with_data(revision.class_byte()?, 0x86, 0x00, 0x00, Bytes::copy_from_slice(random))?,
        CommandKind::GiveRandom,
    ))
}

/// Build Read Event Counter: `CLA BE 00 P2 00`
pub fn read_event_counter(revision: SamRevision, target: CounterTarget) -> Result<CalypsoApdu> {
    let p2 = match target.validate()? {
        CounterTarget::Single(index) => 0x81 + index,
        CounterTarget::Record(record) => 0xE0 + record,
    };
    Ok(CalypsoApdu::new(
        Command::new_with_le(revision.class_byte()?, 0xBE, 0x00, p2, 0x00),
        CommandKind::ReadEventCounter,
    ))
}

/// Build Read Ceilings: `CLA BE P1 P2 00`
pub fn read_ceilings(revision: SamRevision, target: CounterTarget) -> Result<CalypsoApdu> {
    let (p1, p2) = match target.validate()? {
        CounterTarget::Single(index) => (index, 0xB8),
        CounterTarget::Record(record) => (0x00, 0xB0 + record),
    };
    Ok(CalypsoApdu::new(
        Command::new_with_le(revision.class_byte()?, 0xBE, p1, p2, 0x00),
        CommandKind::ReadCeilings,
    ))
}

/// Decode a SAM challenge of the requested length
pub fn parse_challenge(payload: &[u8], expected_length: usize) -> Result<Bytes> {
    if payload.len() != expected_length {
        return Err(Error::Parse("SAM challenge length differs from Le"));
    }
    Ok(Bytes::copy_from_slice(payload))
}

/// Decode the signature returned by Digest Close
pub fn parse_signature(payload: &[u8]) -> Result<Bytes> {
    if !matches!(payload.len(), 4 | 8) {
        return Err(Error::Parse("Digest Close signature is not 4 or 8 bytes"));
    }
    Ok(Bytes::copy_from_slice(payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use keyple_core::ApduCommand;

    const ALL: [SamRevision; 3] = [SamRevision::C1, SamRevision::S1E, SamRevision::S1D];

    #[test]
    fn test_class_byte_follows_revision() {
        for revision in ALL {
            let expected = revision.class_byte().unwrap();
            let apdus = [
                select_diversifier(revision, &hex!("0102030405060708")).unwrap(),
                get_challenge(revision, 4).unwrap(),
                digest_init(revision, false, false, 1, KeyReference::new(0x30, 0x79), &hex!("0102")).unwrap(),
                digest_update(revision, false, &hex!("0102")).unwrap(),
                digest_update_multiple(revision, false, &hex!("020102")).unwrap(),
                digest_close(revision, 4).unwrap(),
                digest_authenticate(revision, &hex!("01020304")).unwrap(),
                unlock(revision, &[0u8; 8]).unwrap(),
                write_key(revision, 0x00, 0x00, &[0u8; 48]).unwrap(),
                card_cipher_pin(revision, KeyReference::new(0x56, 0x78), &hex!("31323334"), None).unwrap(),
                give_random(revision, &[0u8; 8]).unwrap(),
                read_event_counter(revision, CounterTarget::Single(0)).unwrap(),
                read_ceilings(revision, CounterTarget::Record(1)).unwrap(),
            ];
            for apdu in apdus {
                assert_eq!(apdu.command().class(), expected, "{} for {revision}", apdu.kind());
            }
        }
        assert!(digest_close(SamRevision::Auto, 4).unwrap_err().is_argument());
    }

    #[test]
    fn test_digest_close() {
        assert_eq!(digest_close(SamRevision::C1, 4).unwrap().to_bytes().as_ref(), hex!("808E000004"));
        assert_eq!(digest_close(SamRevision::S1D, 4).unwrap().to_bytes().as_ref(), hex!("948E000004"));
        assert_eq!(digest_close(SamRevision::S1E, 8).unwrap().to_bytes().as_ref(), hex!("808E000008"));
        assert!(digest_close(SamRevision::C1, 5).unwrap_err().is_argument());
    }

    #[test]
    fn test_card_cipher_pin() {
        let key = KeyReference::new(0x56, 0x78);
        let apdu = card_cipher_pin(SamRevision::C1, key, &hex!("31323334"), Some(&hex!("35363738"))).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("801240FF0A56783132333435363738"));

        let apdu = card_cipher_pin(SamRevision::C1, key, &hex!("31323334"), None).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("801280FF06567831323334"));

        assert!(card_cipher_pin(SamRevision::C1, key, &hex!("313233"), None).unwrap_err().is_argument());
        assert!(card_cipher_pin(SamRevision::C1, key, &hex!("31323334"), Some(&hex!("3536"))).is_err());
    }

    #[test]
    fn test_digest_update_multiple_length() {
        assert!(digest_update_multiple(SamRevision::C1, false, &[0u8; 255]).is_ok());
        assert!(digest_update_multiple(SamRevision::C1, false, &[0u8; 256]).unwrap_err().is_argument());

        let apdu = digest_update_multiple(SamRevision::C1, true, &hex!("020102")).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("808C808003020102"));
    }

    #[test]
    fn test_digest_update() {
        let apdu = digest_update(SamRevision::S1D, false, &hex!("00B2013C1D")).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("948C00000500B2013C1D"));
        assert!(digest_update(SamRevision::C1, false, &[0u8; 256]).unwrap_err().is_argument());
    }

    #[test]
    fn test_digest_init() {
        let key = KeyReference::new(0x30, 0x79);
        let apdu = digest_init(SamRevision::C1, false, false, 3, key, &hex!("03D31CC100307900")).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("808A00FF0A307903D31CC100307900"));

        let apdu = digest_init(SamRevision::C1, true, true, 3, key, &hex!("01")).unwrap();
        assert_eq!(apdu.command().p1(), 0x03);

        let apdu = digest_init(SamRevision::S1D, false, false, 3, KeyReference::new(UNDEFINED_KIF, 0x79), &hex!("7903D31CC1")).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("948A0003057903D31CC1"));

        assert!(digest_init(SamRevision::C1, false, false, 0, KeyReference::new(0, 0x79), &hex!("01")).is_err());
    }

    #[test]
    fn test_fixed_layouts() {
        assert_eq!(
            select_diversifier(SamRevision::C1, &hex!("0000000011223344")).unwrap().to_bytes().as_ref(),
            hex!("8014000008 0000000011223344")
        );
        assert!(select_diversifier(SamRevision::C1, &hex!("112233")).is_err());
        assert_eq!(get_challenge(SamRevision::S1D, 8).unwrap().to_bytes().as_ref(), hex!("9484000008"));
        assert!(get_challenge(SamRevision::C1, 6).is_err());
        assert!(unlock(SamRevision::C1, &[0u8; 12]).is_err());
        assert!(unlock(SamRevision::C1, &[0u8; 16]).is_ok());
        assert!(write_key(SamRevision::C1, 0, 0, &[0u8; 47]).is_err());
        assert!(write_key(SamRevision::C1, 0, 0, &[0u8; 81]).is_err());
        assert!(give_random(SamRevision::C1, &[0u8; 4]).is_err());
    }

    #[test]
    fn test_counter_targets() {
        let bytes = |apdu: CalypsoApdu| apdu.to_bytes().to_vec();
        assert_eq!(bytes(read_event_counter(SamRevision::C1, CounterTarget::Single(0)).unwrap()), hex!("80BE008100"));
        assert_eq!(bytes(read_event_counter(SamRevision::C1, CounterTarget::Single(26)).unwrap()), hex!("80BE009B00"));
        assert_eq!(bytes(read_event_counter(SamRevision::C1, CounterTarget::Record(3)).unwrap()), hex!("80BE00E300"));
        assert_eq!(bytes(read_ceilings(SamRevision::C1, CounterTarget::Single(5)).unwrap()), hex!("80BE05B800"));
        assert_eq!(bytes(read_ceilings(SamRevision::C1, CounterTarget::Record(2)).unwrap()), hex!("80BE00B200"));

        assert!(read_event_counter(SamRevision::C1, CounterTarget::Single(27)).is_err());
        assert!(read_ceilings(SamRevision::C1, CounterTarget::Record(0)).is_err());
        assert!(read_ceilings(SamRevision::C1, CounterTarget::Record(4)).is_err());
    }

    #[test]
    fn test_parse_responses() {
        assert_eq!(parse_challenge(&hex!("01020304"), 4).unwrap().as_ref(), hex!("01020304"));
        assert!(parse_challenge(&hex!("01020304"), 8).is_err());
        assert!(parse_signature(&hex!("0102030405")).is_err());
    }
}
