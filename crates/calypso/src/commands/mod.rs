//! Calypso command codecs
//!
//! Every builder validates its arguments before producing bytes and returns a
//! [`CalypsoApdu`]: the command together with the family it belongs to, which
//! gives its name and status table.

pub mod po;
pub mod sam;
pub mod session;
pub mod status;

use derive_more::Display;
use keyple_core::{ApduCommand, Bytes, BytesMut, CardTransport, Command, Response, StatusTable};

use crate::{Error, Result};

/// Calypso command families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum CommandKind {
    /// Select Application
    #[display("Select Application")]
    SelectApplication,
    /// Open Secure Session
    #[display("Open Secure Session")]
    OpenSession,
    /// Close Secure Session
    #[display("Close Secure Session")]
    CloseSession,
    /// Ratification
    #[display("Ratification")]
    Ratification,
    /// PO Get Challenge
    #[display("PO Get Challenge")]
    PoGetChallenge,
    /// Read Records
    #[display("Read Records")]
    ReadRecords,
    /// Update Record
    #[display("Update Record")]
    UpdateRecord,
    /// Write Record
    #[display("Write Record")]
    WriteRecord,
    /// Append Record
    #[display("Append Record")]
    AppendRecord,
    /// Increase
    #[display("Increase")]
    Increase,
    /// Decrease
    #[display("Decrease")]
    Decrease,
    /// Get Data (FCI)
    #[display("Get Data (FCI)")]
    GetDataFci,
    /// Select Diversifier
    #[display("Select Diversifier")]
    SelectDiversifier,
    /// SAM Get Challenge
    #[display("SAM Get Challenge")]
    SamGetChallenge,
    /// Digest Init
    #[display("Digest Init")]
    DigestInit,
    /// Digest Update
    #[display("Digest Update")]
    DigestUpdate,
    /// Digest Update Multiple
    #[display("Digest Update Multiple")]
    DigestUpdateMultiple,
    /// Digest Close
    #[display("Digest Close")]
    DigestClose,
    /// Digest Authenticate
    #[display("Digest Authenticate")]
    DigestAuthenticate,
    /// Unlock
    #[display("Unlock")]
    Unlock,
    /// Write Key
    #[display("Write Key")]
    WriteKey,
    /// Card Cipher PIN
    #[display("Card Cipher PIN")]
    CardCipherPin,
    /// Give Random
    #[display("Give Random")]
    GiveRandom,
    /// Read Event Counter
    #[display("Read Event Counter")]
    ReadEventCounter,
    /// Read Ceilings
    #[display("Read Ceilings")]
    ReadCeilings,
}

impl CommandKind {
    /// Status table of the family
    pub fn status_table(self) -> &'static StatusTable {
        match self {
            Self::SelectApplication => &status::SELECT_APPLICATION,
            Self::OpenSession => &status::OPEN_SESSION,
            Self::CloseSession => &status::CLOSE_SESSION,
            Self::Ratification => &status::RATIFICATION,
            Self::PoGetChallenge => &status::PO_GET_CHALLENGE,
            Self::ReadRecords => &status::READ_RECORDS,
            Self::UpdateRecord | Self::WriteRecord => &status::UPDATE_RECORD,
            Self::AppendRecord => &status::APPEND_RECORD,
            Self::Increase | Self::Decrease => &status::COUNTER,
            Self::GetDataFci => &status::GET_DATA_FCI,
            Self::SelectDiversifier => &status::SELECT_DIVERSIFIER,
            Self::SamGetChallenge => &status::SAM_GET_CHALLENGE,
            Self::DigestInit => &status::DIGEST_INIT,
            Self::DigestUpdate => &status::DIGEST_UPDATE,
            Self::DigestUpdateMultiple => &status::DIGEST_UPDATE_MULTIPLE,
            Self::DigestClose => &status::DIGEST_CLOSE,
            Self::DigestAuthenticate => &status::DIGEST_AUTHENTICATE,
            Self::Unlock => &status::UNLOCK,
            Self::WriteKey => &status::WRITE_KEY,
            Self::CardCipherPin => &status::CARD_CIPHER_PIN,
            Self::GiveRandom => &status::GIVE_RANDOM,
            Self::ReadEventCounter => &status::READ_EVENT_COUNTER,
            Self::ReadCeilings => &status::READ_CEILINGS,
        }
    }

    /// Returns true if the command alters PO data and uses the modification buffer
    pub const fn is_modifying(self) -> bool {
        matches!(
            self,
            Self::UpdateRecord | Self::WriteRecord | Self::AppendRecord | Self::Increase | Self::Decrease
        )
    }
}

/// A Calypso command ready to be sent
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalypsoApdu {
    command: Command,
    kind: CommandKind,
}

impl CalypsoApdu {
    /// Wrap a command of the given family
    pub const fn new(command: Command, kind: CommandKind) -> Self {
        Self { command, kind }
    }

    /// The raw command
    pub const fn command(&self) -> &Command {
        &self.command
    }

    /// Family of the command
    pub const fn kind(&self) -> CommandKind {
        self.kind
    }

    /// Serialized command bytes
    pub fn to_bytes(&self) -> Bytes {
        self.command.to_bytes()
    }

    /// Bytes of the command as mirrored in the session digest
    ///
    /// The Le byte of a command carrying both data and Le is not part of the digest.
    pub fn digest_bytes(&self) -> Bytes {
        let bytes = self.command.to_bytes();
        if self.command.data().is_some() && self.command.expected_length().is_some() {
            bytes.slice(..bytes.len() - 1)
        } else {
            bytes
        }
    }

    /// Classify a response with the family status table
    pub fn check(&self, response: &Response) -> Result<()> {
        let table = self.kind.status_table();
        table.check(response).map_err(|error| match error {
            keyple_core::Error::Status { status, message } => Error::Status {
                command: table.name(),
                status,
                message,
            },
            other => other.into(),
        })
    }

    /// Send the command and check the response status
    pub fn execute<T>(&self, transport: &mut T) -> Result<Response>
    where
        T: CardTransport + ?Sized,
    {
        let response = transport.transmit(&self.command)?;
        self.check(&response)?;
        Ok(response)
    }
}

/// Concatenate slices into one buffer
pub(crate) fn concat(parts: &[&[u8]]) -> Bytes {
    let mut buffer = BytesMut::with_capacity(parts.iter().map(|part| part.len()).sum());
    for part in parts {
        buffer.extend_from_slice(part);
    }
    buffer.freeze()
}

/// Check an SFI and record number before encoding them into P1/P2
pub(crate) fn check_sfi_and_record(sfi: u8, record: u8, max_record: u8) -> Result<()> {
    if sfi > 30 {
        return Err(Error::invalid_argument(format!("SFI {sfi:#04X} above 30")));
    }
    if record > max_record {
        return Err(Error::invalid_argument(format!(
            "record number {record} above {max_record}"
        )));
    }
    Ok(())
}
