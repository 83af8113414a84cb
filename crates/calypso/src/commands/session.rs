//! Open Session and Close Session codecs
//!
//! The Open Session layout differs between the 2.4, 3.1 and 3.2 revisions. A
//! single decoder per [`OpenSessionVariant`] extracts the same [`SecureSession`]
//! fields whatever the layout.
//!
//! | Variant | Response payload |
//! |---|---|
//! | 2.4 | `KVC ctr(3) rnd(1) [ratification(2)] [record(29)]` |
//! | 3.1 | `ctr(3) rnd(1) ratified kif kvc len data` |
//! | 3.2 | `ctr(3) rnd(5) flags kif kvc len data` |

use keyple_core::{Bytes, Command};

use super::{CalypsoApdu, CommandKind, check_sfi_and_record, concat};
use crate::key::{AccessLevel, UNDEFINED_KIF};
use crate::revision::{OpenSessionVariant, PoClass};
use crate::{Error, Result};

/// Size of the record returned by a 2.4 Open Session
const REV24_RECORD_LENGTH: usize = 29;

/// Session data returned by Open Secure Session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureSession {
    /// Transaction counter of the PO
    pub challenge_transaction_counter: [u8; 3],
    /// PO random number (1 byte, 5 bytes in 3.2)
    pub challenge_random_number: Bytes,
    /// Whether the previous session was ratified
    pub previous_session_ratified: bool,
    /// Whether the PO authorizes session management (3.2 only)
    pub manage_secure_session_authorized: bool,
    /// Key identifier of the session key, `0xFF` when the PO does not send it
    pub kif: u8,
    /// Key version of the session key
    pub kvc: u8,
    /// Record data read at opening
    pub original_data: Bytes,
    /// Whole Open Session response payload
    pub raw_session_data: Bytes,
}

impl SecureSession {
    /// Decode an Open Session response payload
    pub fn decode(variant: OpenSessionVariant, payload: &[u8]) -> Result<Self> {
        match variant {
            OpenSessionVariant::Rev24 => Self::decode_rev24(payload),
            OpenSessionVariant::Rev31 => Self::decode_rev3(payload, 1),
            OpenSessionVariant::Rev32 => Self::decode_rev3(payload, 5),
        }
    }

    fn decode_rev24(payload: &[u8]) -> Result<Self> {
        let (ratified, data_offset) = match payload.len() {
            5 | 34 => (true, 5),
            7 | 36 => (false, 7),
            _ => return Err(Error::Parse("bad Open Session 2.4 response length")),
        };

        Ok(Self {
            challenge_transaction_counter: [payload[1], payload[2], payload[3]],
            challenge_random_number: Bytes::copy_from_slice(&payload[4..5]),
            previous_session_ratified: ratified,
            manage_secure_session_authorized: false,
            kif: UNDEFINED_KIF,
            kvc: payload[0],
            original_data: Bytes::copy_from_slice(&payload[data_offset..]),
            raw_session_data: Bytes::copy_from_slice(payload),
        })
    }

    fn decode_rev3(payload: &[u8], random_length: usize) -> Result<Self> {
        let header = 3 + random_length;
        if payload.len() < header + 4 {
            return Err(Error::Parse("Open Session response too short"));
        }
        let flags = payload[header];
        let data_length = payload[header + 3] as usize;
        let data = payload
            .get(header + 4..header + 4 + data_length)
            .filter(|data| header + 4 + data.len() == payload.len())
            .ok_or(Error::Parse("Open Session data length inconsistent"))?;

        let (ratified, manage_authorized) = if random_length == 1 {
            (flags == 0x00, false)
        } else {
            (flags & 0x01 == 0, flags & 0x02 != 0)
        };

        Ok(Self {
            challenge_transaction_counter: [payload[0], payload[1], payload[2]],
            challenge_random_number: Bytes::copy_from_slice(&payload[3..header]),
            previous_session_ratified: ratified,
            manage_secure_session_authorized: manage_authorized,
            kif: payload[header + 1],
            kvc: payload[header + 2],
            original_data: Bytes::copy_from_slice(data),
            raw_session_data: Bytes::copy_from_slice(payload),
        })
    }

    /// Encode the session as the payload a PO of the given variant would return
    pub fn encode(&self, variant: OpenSessionVariant) -> Result<Bytes> {
        if self.challenge_random_number.len() != variant.po_random_length() {
            return Err(Error::invalid_argument("random number length does not match variant"));
        }
        let counter = &self.challenge_transaction_counter;
        let random = &self.challenge_random_number;

        match variant {
            OpenSessionVariant::Rev24 => {
                if !(self.original_data.is_empty() || self.original_data.len() == REV24_RECORD_LENGTH) {
                    return Err(Error::invalid_argument("2.4 record data must be 29 bytes"));
                }
                let ratification: &[u8] = if self.previous_session_ratified { &[] } else { &[0x00, 0x00] };
                Ok(concat(&[&[self.kvc], counter, random, ratification, &self.original_data]))
            }
            OpenSessionVariant::Rev31 | OpenSessionVariant::Rev32 => {
                let data_length = u8::try_from(self.original_data.len())
                    .map_err(|_| Error::invalid_argument("record data too long"))?;
                let flags = match variant {
                    OpenSessionVariant::Rev31 => u8::from(!self.previous_session_ratified),
                    _ => {
                        u8::from(!self.previous_session_ratified)
                            | (u8::from(self.manage_secure_session_authorized) << 1)
                    }
                };
                Ok(concat(&[
                    counter,
                    random,
                    &[flags, self.kif, self.kvc, data_length],
                    &self.original_data,
                ]))
            }
        }
    }
}

/// Build Open Secure Session
///
/// `record` 0 opens without reading a record.
pub fn open_session(
    variant: OpenSessionVariant,
    access_level: AccessLevel,
    sfi: u8,
    record: u8,
    terminal_challenge: &[u8],
) -> Result<CalypsoApdu> {
    if terminal_challenge.len() != variant.terminal_challenge_length() {
        return Err(Error::invalid_argument(format!(
            "terminal challenge of {} bytes, {} expected",
            terminal_challenge.len(),
            variant.terminal_challenge_length()
        )));
    }
    let key_index = access_level.key_index();

    let command = match variant {
        OpenSessionVariant::Rev24 => {
            check_sfi_and_record(sfi, record, 15)?;
            Command::new_with_data(
                PoClass::Legacy.value(),
                0x8A,
                0x80 + record * 8 + key_index,
                sfi * 8,
                Bytes::copy_from_slice(terminal_challenge),
            )?
        }
        OpenSessionVariant::Rev31 => {
            check_sfi_and_record(sfi, record, 31)?;
            Command::new_with_data_and_le(
                PoClass::Iso.value(),
                0x8A,
                record * 8 + key_index,
                sfi * 8 + 1,
                Bytes::copy_from_slice(terminal_challenge),
                0x00,
            )?
        }
        OpenSessionVariant::Rev32 => {
            check_sfi_and_record(sfi, record, 31)?;
            Command::new_with_data_and_le(
                PoClass::Iso.value(),
                0x8A,
                record * 8 + key_index,
                sfi * 8 + 2,
                concat(&[&[0x00], terminal_challenge]),
                0x00,
            )?
        }
    };

    Ok(CalypsoApdu::new(command, CommandKind::OpenSession))
}

/// Build Close Secure Session carrying the terminal signature
pub fn close_session(class: PoClass, ratification_asked: bool, terminal_signature: &[u8]) -> Result<CalypsoApdu> {
    if !matches!(terminal_signature.len(), 4 | 8) {
        return Err(Error::invalid_argument(format!(
            "terminal signature of {} bytes, 4 or 8 expected",
            terminal_signature.len()
        )));
    }
    let p1 = if ratification_asked { 0x80 } else { 0x00 };
    let command = Command::new_with_data_and_le(
        class.value(),
        0x8E,
        p1,
        0x00,
        Bytes::copy_from_slice(terminal_signature),
        0x00,
    )?;
    Ok(CalypsoApdu::new(command, CommandKind::CloseSession))
}

/// Build the Close Secure Session that aborts the session: `CLA 8E 00 00 00`
pub const fn abort_session(class: PoClass) -> CalypsoApdu {
    CalypsoApdu::new(
        Command::new_with_le(class.value(), 0x8E, 0x00, 0x00, 0x00),
        CommandKind::CloseSession,
    )
}

/// Build the ratification command: `CLA B2 00 00 00`
pub const fn ratification(class: PoClass) -> CalypsoApdu {
    CalypsoApdu::new(
        Command::new_with_le(class.value(), 0xB2, 0x00, 0x00, 0x00),
        CommandKind::Ratification,
    )
}

/// Decoded Close Secure Session response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseSessionResponse {
    /// Postponed data (e.g. stored value data)
    pub postponed_data: Bytes,
    /// PO session signature
    pub signature: Bytes,
}

impl CloseSessionResponse {
    /// Decode the response payload: `[L postponed(L)] signature`
    pub fn decode(payload: &[u8], signature_length: usize) -> Result<Self> {
        if payload.len() == signature_length {
            return Ok(Self {
                postponed_data: Bytes::new(),
                signature: Bytes::copy_from_slice(payload),
            });
        }
        let [length, rest @ ..] = payload else {
            return Err(Error::Parse("empty Close Session response"));
        };
        let length = *length as usize;
        if rest.len() != length + signature_length {
            return Err(Error::Parse("bad Close Session response length"));
        }
        Ok(Self {
            postponed_data: Bytes::copy_from_slice(&rest[..length]),
            signature: Bytes::copy_from_slice(&rest[length..]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use keyple_core::ApduCommand;

    fn session(variant: OpenSessionVariant, ratified: bool, data: &[u8]) -> SecureSession {
        let random = vec![0xC1; variant.po_random_length()];
        SecureSession {
            challenge_transaction_counter: hex!("03D31C"),
            challenge_random_number: Bytes::from(random),
            previous_session_ratified: ratified,
            manage_secure_session_authorized: variant == OpenSessionVariant::Rev32,
            kif: if variant == OpenSessionVariant::Rev24 { UNDEFINED_KIF } else { 0x30 },
            kvc: 0x79,
            original_data: Bytes::copy_from_slice(data),
            raw_session_data: Bytes::new(),
        }
    }

    #[test]
    fn test_open_session_round_trip_every_variant() {
        let record = [0x5A; REV24_RECORD_LENGTH];
        for variant in [OpenSessionVariant::Rev24, OpenSessionVariant::Rev31, OpenSessionVariant::Rev32] {
            for ratified in [true, false] {
                for data in [&[][..], &record[..]] {
                    let original = session(variant, ratified, data);
                    let encoded = original.encode(variant).unwrap();
                    let decoded = SecureSession::decode(variant, &encoded).unwrap();

                    assert_eq!(decoded.raw_session_data, encoded);
                    assert_eq!(
                        SecureSession { raw_session_data: Bytes::new(), ..decoded },
                        original,
                        "variant {variant}, ratified {ratified}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_decode_rev31_fixture() {
        let payload = hex!("03D31C C1 00 30 79 00");
        let session = SecureSession::decode(OpenSessionVariant::Rev31, &payload).unwrap();
        assert_eq!(session.challenge_transaction_counter, hex!("03D31C"));
        assert_eq!(session.challenge_random_number.as_ref(), hex!("C1"));
        assert!(session.previous_session_ratified);
        assert_eq!((session.kif, session.kvc), (0x30, 0x79));
        assert!(session.original_data.is_empty());
    }

    #[test]
    fn test_decode_rev32_flags() {
        let payload = hex!("000001 0102030405 03 27 7A 02 AABB");
        let session = SecureSession::decode(OpenSessionVariant::Rev32, &payload).unwrap();
        assert!(!session.previous_session_ratified);
        assert!(session.manage_secure_session_authorized);
        assert_eq!(session.original_data.as_ref(), hex!("AABB"));
    }

    #[test]
    fn test_decode_bad_lengths() {
        assert!(SecureSession::decode(OpenSessionVariant::Rev24, &hex!("7903D31CC100")).is_err());
        assert!(SecureSession::decode(OpenSessionVariant::Rev31, &hex!("03D31CC1003079")).is_err());
        assert!(SecureSession::decode(OpenSessionVariant::Rev31, &hex!("03D31CC100307902AA")).is_err());
    }

    #[test]
    fn test_open_session_commands() {
        let challenge = hex!("C1C2C3C4");
        let apdu = open_session(OpenSessionVariant::Rev31, AccessLevel::Debit, 0x07, 1, &challenge).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("008A0B3904C1C2C3C400"));

        let apdu = open_session(OpenSessionVariant::Rev24, AccessLevel::Load, 0x07, 1, &challenge).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("948A8A3804C1C2C3C4"));

        let challenge = hex!("C1C2C3C4C5C6C7C8");
        let apdu = open_session(OpenSessionVariant::Rev32, AccessLevel::Personalization, 0, 0, &challenge).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("008A01020900C1C2C3C4C5C6C7C800"));

        assert!(open_session(OpenSessionVariant::Rev32, AccessLevel::Debit, 0, 0, &hex!("C1C2C3C4")).is_err());
        assert!(open_session(OpenSessionVariant::Rev24, AccessLevel::Debit, 7, 16, &hex!("C1C2C3C4")).is_err());
    }

    #[test]
    fn test_close_session_commands() {
        let apdu = close_session(PoClass::Iso, true, &hex!("11223344")).unwrap();
        assert_eq!(apdu.to_bytes().as_ref(), hex!("008E8000041122334400"));

        let apdu = close_session(PoClass::Legacy, false, &hex!("11223344")).unwrap();
        assert_eq!(apdu.command().p1(), 0x00);
        assert_eq!(apdu.command().class(), 0x94);

        assert!(close_session(PoClass::Iso, true, &hex!("112233")).unwrap_err().is_argument());
        assert_eq!(abort_session(PoClass::Iso).to_bytes().as_ref(), hex!("008E000000"));
        assert_eq!(ratification(PoClass::Legacy).to_bytes().as_ref(), hex!("94B2000000"));
    }

    #[test]
    fn test_close_session_response() {
        let response = CloseSessionResponse::decode(&hex!("A1B2C3D4"), 4).unwrap();
        assert!(response.postponed_data.is_empty());
        assert_eq!(response.signature.as_ref(), hex!("A1B2C3D4"));

        // Same length as an 8 byte signature, decoded as postponed data
        let response = CloseSessionResponse::decode(&hex!("03 010203 A1B2C3D4"), 4).unwrap();
        assert_eq!(response.postponed_data.as_ref(), hex!("010203"));
        assert_eq!(response.signature.as_ref(), hex!("A1B2C3D4"));

        let response = CloseSessionResponse::decode(&hex!("0102030405060708"), 8).unwrap();
        assert!(response.postponed_data.is_empty());

        assert!(CloseSessionResponse::decode(&hex!("05 010203 A1B2C3D4"), 4).is_err());
        assert!(CloseSessionResponse::decode(&[], 4).is_err());
    }
}
