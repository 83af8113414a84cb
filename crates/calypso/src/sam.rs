//! Calypso SAM card model and ATR based SAM selection

use keyple_core::selection::CardSelector;
use keyple_core::Bytes;
use regex::Regex;
use tracing::debug;

use crate::revision::SamRevision;
use crate::{Error, Result};

/// Layout of a Calypso SAM ATR; the second group holds the identification bytes
const SAM_ATR_PATTERN: &str = "^3B(.{6}|.{10})805A(.{20})829000$";

/// A selected Calypso SAM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalypsoSam {
    atr: Bytes,
    revision: SamRevision,
    platform: u8,
    application_type: u8,
    application_subtype: u8,
    software_issuer: u8,
    software_version: u8,
    software_revision: u8,
    serial_number: [u8; 4],
}

impl CalypsoSam {
    /// Identify the SAM from its ATR
    pub fn from_atr(atr: &[u8]) -> Result<Self> {
        let pattern = Regex::new(SAM_ATR_PATTERN).map_err(keyple_core::Error::from)?;
        let atr_hex = hex::encode_upper(atr);
        let identification = pattern
            .captures(&atr_hex)
            .and_then(|captures| captures.get(2))
            .ok_or_else(|| Error::UnknownSamRevision(format!("unrecognized ATR {atr_hex}")))?;
        let bytes = hex::decode(identification.as_str())
            .map_err(|_| Error::Parse("SAM identification bytes are not hex"))?;

        let [platform, application_type, application_subtype, software_issuer, software_version, software_revision, s0, s1, s2, s3] =
            bytes[..]
        else {
            return Err(Error::Parse("SAM identification is not 10 bytes"));
        };
        let revision = SamRevision::from_application_subtype(application_subtype)?;

        debug!(%revision, serial = %hex::encode_upper([s0, s1, s2, s3]), "Calypso SAM identified");

        Ok(Self {
            atr: Bytes::copy_from_slice(atr),
            revision,
            platform,
            application_type,
            application_subtype,
            software_issuer,
            software_version,
            software_revision,
            serial_number: [s0, s1, s2, s3],
        })
    }

    /// ATR of the SAM
    pub fn atr(&self) -> &[u8] {
        &self.atr
    }

    /// SAM revision
    pub const fn revision(&self) -> SamRevision {
        self.revision
    }

    /// Class byte of commands sent to this SAM
    pub fn class_byte(&self) -> Result<u8> {
        self.revision.class_byte()
    }

    /// Chip platform
    pub const fn platform(&self) -> u8 {
        self.platform
    }

    /// Application type
    pub const fn application_type(&self) -> u8 {
        self.application_type
    }

    /// Application subtype
    pub const fn application_subtype(&self) -> u8 {
        self.application_subtype
    }

    /// Software issuer
    pub const fn software_issuer(&self) -> u8 {
        self.software_issuer
    }

    /// Software version
    pub const fn software_version(&self) -> u8 {
        self.software_version
    }

    /// Software revision
    pub const fn software_revision(&self) -> u8 {
        self.software_revision
    }

    /// SAM serial number
    pub const fn serial_number(&self) -> &[u8; 4] {
        &self.serial_number
    }
}

/// Selection criteria for a SAM, expressed as an ATR filter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamSelector {
    revision: SamRevision,
    serial_number: Option<String>,
}

impl SamSelector {
    /// Select SAMs of a revision, `Auto` accepts any
    pub const fn new(revision: SamRevision) -> Self {
        Self {
            revision,
            serial_number: None,
        }
    }

    /// Restrict the selection to serial numbers matching a regular expression
    /// over 8 upper case hex digits
    pub fn with_serial_number(mut self, serial_number: impl Into<String>) -> Self {
        self.serial_number = Some(serial_number.into());
        self
    }

    /// Expected revision
    pub const fn revision(&self) -> SamRevision {
        self.revision
    }

    /// ATR filter for these criteria
    pub fn atr_pattern(&self) -> String {
        let serial = self.serial_number.as_deref().unwrap_or(".{8}");
        format!(
            "3B(.{{6}}|.{{10}})805A..80{}20.{{4}}{}829000",
            self.revision.application_type_mask(),
            serial
        )
    }

    /// Card selector filtering on the ATR only
    pub fn to_card_selector(&self) -> Result<CardSelector> {
        Ok(CardSelector::new().with_atr_filter(&self.atr_pattern())?)
    }
}
