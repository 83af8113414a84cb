//! Card selectors: AID, ATR and protocol filters
//!
//! Selectors are immutable values validated at construction.

use std::fmt;

use bytes::Bytes;
use regex::Regex;

use crate::command::Command;
use crate::{Error, Result};

/// Minimum AID length in bytes
pub const AID_MIN_LENGTH: usize = 5;
/// Maximum AID length in bytes
pub const AID_MAX_LENGTH: usize = 16;

/// Which occurrence of a matching application to select (P2 bits 1-2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileOccurrence {
    /// First or only occurrence
    #[default]
    First,
    /// Last occurrence
    Last,
    /// Next occurrence
    Next,
    /// Previous occurrence
    Previous,
}

impl FileOccurrence {
    /// P2 bits for this occurrence
    pub const fn p2_bits(self) -> u8 {
        match self {
            Self::First => 0x00,
            Self::Last => 0x01,
            Self::Next => 0x02,
            Self::Previous => 0x03,
        }
    }
}

/// Control information template requested on selection (P2 bits 3-4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileControlInformation {
    /// File control information template
    #[default]
    Fci,
    /// File control parameters template
    Fcp,
    /// File management data template
    Fmd,
    /// No response data
    NoResponse,
}

impl FileControlInformation {
    /// P2 bits for this template
    pub const fn p2_bits(self) -> u8 {
        match self {
            Self::Fci => 0x00,
            Self::Fcp => 0x04,
            Self::Fmd => 0x08,
            Self::NoResponse => 0x0C,
        }
    }
}

/// Application selection by AID
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AidSelector {
    aid: Bytes,
    occurrence: FileOccurrence,
    control_information: FileControlInformation,
    successful_status_codes: Vec<u16>,
}

impl AidSelector {
    /// Create a selector for the given AID (5 to 16 bytes)
    pub fn new(aid: impl Into<Bytes>) -> Result<Self> {
        let aid = aid.into();
        if !(AID_MIN_LENGTH..=AID_MAX_LENGTH).contains(&aid.len()) {
            return Err(Error::invalid_argument(format!(
                "AID length {} outside of [{AID_MIN_LENGTH}, {AID_MAX_LENGTH}]",
                aid.len()
            )));
        }
        Ok(Self {
            aid,
            occurrence: FileOccurrence::default(),
            control_information: FileControlInformation::default(),
            successful_status_codes: vec![0x9000],
        })
    }

    /// Set the file occurrence
    pub const fn with_occurrence(mut self, occurrence: FileOccurrence) -> Self {
        self.occurrence = occurrence;
        self
    }

    /// Set the requested control information template
    pub const fn with_control_information(mut self, fci: FileControlInformation) -> Self {
        self.control_information = fci;
        self
    }

    /// Accept an extra status word as a successful selection
    pub fn with_successful_status_code(mut self, status: u16) -> Self {
        if !self.successful_status_codes.contains(&status) {
            self.successful_status_codes.push(status);
        }
        self
    }

    /// The AID to select
    pub fn aid(&self) -> &[u8] {
        &self.aid
    }

    /// File occurrence
    pub const fn occurrence(&self) -> FileOccurrence {
        self.occurrence
    }

    /// Requested control information template
    pub const fn control_information(&self) -> FileControlInformation {
        self.control_information
    }

    /// Status words accepted as a successful selection
    pub fn successful_status_codes(&self) -> &[u16] {
        &self.successful_status_codes
    }

    /// Build the Select Application command: `00 A4 04 P2 Lc AID 00`
    pub fn select_command(&self) -> Result<Command> {
        let p2 = self.occurrence.p2_bits() | self.control_information.p2_bits();
        Command::new_with_data_and_le(0x00, 0xA4, 0x04, p2, self.aid.clone(), 0x00)
    }
}

/// Regular expression matched against the hexadecimal ATR
///
/// The whole ATR must match. An empty filter matches any ATR.
#[derive(Clone)]
pub struct AtrFilter {
    source: String,
    regex: Option<Regex>,
}

impl AtrFilter {
    /// Compile an ATR filter
    pub fn new(pattern: &str) -> Result<Self> {
        let regex = if pattern.is_empty() {
            None
        } else {
            Some(Regex::new(&format!("^(?:{pattern})$"))?)
        };
        Ok(Self {
            source: pattern.to_owned(),
            regex,
        })
    }

    /// Filter source pattern
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check an ATR against the filter
    pub fn matches(&self, atr: &[u8]) -> bool {
        self.regex
            .as_ref()
            .is_none_or(|regex| regex.is_match(&hex::encode_upper(atr)))
    }
}

impl fmt::Debug for AtrFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtrFilter").field(&self.source).finish()
    }
}

impl PartialEq for AtrFilter {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for AtrFilter {}

/// Complete selection criteria for one selection case
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CardSelector {
    card_protocol: Option<String>,
    aid_selector: Option<AidSelector>,
    atr_filter: Option<AtrFilter>,
}

impl CardSelector {
    /// Create a selector matching any card
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the selection to a card protocol
    pub fn with_card_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.card_protocol = Some(protocol.into());
        self
    }

    /// Select an application by AID
    pub fn with_aid_selector(mut self, aid_selector: AidSelector) -> Self {
        self.aid_selector = Some(aid_selector);
        self
    }

    /// Filter cards by ATR
    pub fn with_atr_filter(mut self, pattern: &str) -> Result<Self> {
        self.atr_filter = Some(AtrFilter::new(pattern)?);
        Ok(self)
    }

    /// Required card protocol
    pub fn card_protocol(&self) -> Option<&str> {
        self.card_protocol.as_deref()
    }

    /// AID selection
    pub const fn aid_selector(&self) -> Option<&AidSelector> {
        self.aid_selector.as_ref()
    }

    /// ATR filter
    pub const fn atr_filter(&self) -> Option<&AtrFilter> {
        self.atr_filter.as_ref()
    }

    /// Check the protocol and ATR criteria against the current card
    pub fn matches_card(&self, atr: &[u8], protocol: Option<&str>) -> bool {
        let protocol_ok = self
            .card_protocol
            .as_deref()
            .is_none_or(|expected| protocol == Some(expected));
        let atr_ok = self
            .atr_filter
            .as_ref()
            .is_none_or(|filter| filter.matches(atr));
        protocol_ok && atr_ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ApduCommand;
    use hex_literal::hex;

    #[test]
    fn test_aid_length_bounds() {
        assert!(AidSelector::new(hex!("A0000004").to_vec()).is_err());
        assert!(AidSelector::new(hex!("A000000404").to_vec()).is_ok());
        assert!(AidSelector::new(vec![0xA0; 16]).is_ok());
        assert!(matches!(
            AidSelector::new(vec![0xA0; 17]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_select_command() {
        let selector = AidSelector::new(hex!("315449432E49434131").to_vec()).unwrap();
        assert_eq!(
            selector.select_command().unwrap().to_bytes().as_ref(),
            hex!("00A4040009315449432E4943413100")
        );

        let selector = selector
            .with_occurrence(FileOccurrence::Next)
            .with_control_information(FileControlInformation::Fcp);
        assert_eq!(selector.select_command().unwrap().p2(), 0x06);
    }

    #[test]
    fn test_successful_status_codes() {
        let selector = AidSelector::new(vec![0xA0; 5])
            .unwrap()
            .with_successful_status_code(0x6283)
            .with_successful_status_code(0x6283);
        assert_eq!(selector.successful_status_codes(), &[0x9000, 0x6283]);
    }

    #[test]
    fn test_atr_filter() {
        let atr = hex!("3B8F8001804F0CA000000306030001000000006A");
        assert!(AtrFilter::new("").unwrap().matches(&atr));
        assert!(AtrFilter::new("3B8F8001.*").unwrap().matches(&atr));
        // Anchored at both ends
        assert!(!AtrFilter::new("8001").unwrap().matches(&atr));
        assert!(AtrFilter::new("(").is_err());
    }

    #[test]
    fn test_card_selector_protocol() {
        let selector = CardSelector::new().with_card_protocol("ISO_14443_4");
        assert!(selector.matches_card(&[], Some("ISO_14443_4")));
        assert!(!selector.matches_card(&[], Some("ISO_7816_3")));
        assert!(!selector.matches_card(&[], None));
        assert!(CardSelector::new().matches_card(&[], None));
    }
}
