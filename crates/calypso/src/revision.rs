//! Revision tags of Calypso POs and SAMs
//!
//! Revisions are protocol version tags: codecs branch on them explicitly to pick
//! the class byte and the field layout of a command.

use derive_more::Display;

use crate::{Error, Result};

/// Class byte used by PO commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum PoClass {
    /// Calypso revision 1 and 2 class (0x94)
    #[display("LEGACY")]
    Legacy,
    /// ISO class used from revision 3 on (0x00)
    #[display("ISO")]
    Iso,
}

impl PoClass {
    /// Class byte value
    pub const fn value(self) -> u8 {
        match self {
            Self::Legacy => 0x94,
            Self::Iso => 0x00,
        }
    }
}

/// Layout of the Open Session command and response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum OpenSessionVariant {
    /// Revision 1.0 and 2.4 layout
    #[display("2.4")]
    Rev24,
    /// Revision 3.1 layout
    #[display("3.1")]
    Rev31,
    /// Revision 3.2 layout (extended challenge)
    #[display("3.2")]
    Rev32,
}

impl OpenSessionVariant {
    /// Length of the SAM challenge carried by Open Session
    pub const fn terminal_challenge_length(self) -> usize {
        match self {
            Self::Rev24 | Self::Rev31 => 4,
            Self::Rev32 => 8,
        }
    }

    /// Length of the PO random number returned by Open Session
    pub const fn po_random_length(self) -> usize {
        match self {
            Self::Rev24 | Self::Rev31 => 1,
            Self::Rev32 => 5,
        }
    }

    /// Length of the session signatures
    pub const fn signature_length(self) -> usize {
        match self {
            Self::Rev24 | Self::Rev31 => 4,
            Self::Rev32 => 8,
        }
    }
}

/// Revision of a Calypso PO
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum PoRevision {
    /// Revision 1.0
    #[display("REV1_0")]
    Rev1_0,
    /// Revision 2.4
    #[display("REV2_4")]
    Rev2_4,
    /// Revision 3.1
    #[display("REV3_1")]
    Rev3_1,
    /// Revision 3.1 CLAP
    #[display("REV3_1_CLAP")]
    Rev3_1Clap,
    /// Revision 3.2
    #[display("REV3_2")]
    Rev3_2,
}

impl PoRevision {
    /// Derive the revision from the application type byte of the startup information
    pub const fn from_application_type(application_type: u8) -> Self {
        if application_type & 0x80 != 0 {
            Self::Rev3_1Clap
        } else {
            match application_type >> 3 {
                0x05 => Self::Rev3_2,
                0x04 => Self::Rev3_1,
                _ => Self::Rev2_4,
            }
        }
    }

    /// Class byte of PO commands for this revision
    pub const fn class(self) -> PoClass {
        match self {
            Self::Rev1_0 | Self::Rev2_4 => PoClass::Legacy,
            _ => PoClass::Iso,
        }
    }

    /// Open Session layout for this revision
    pub const fn open_session_variant(self) -> OpenSessionVariant {
        match self {
            Self::Rev1_0 | Self::Rev2_4 => OpenSessionVariant::Rev24,
            Self::Rev3_1 | Self::Rev3_1Clap => OpenSessionVariant::Rev31,
            Self::Rev3_2 => OpenSessionVariant::Rev32,
        }
    }
}

/// Revision of a Calypso SAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum SamRevision {
    /// SAM C1
    #[display("C1")]
    C1,
    /// SAM S1E
    #[display("S1E")]
    S1E,
    /// SAM S1D
    #[display("S1D")]
    S1D,
    /// Any revision, only meaningful when selecting a SAM
    #[display("AUTO")]
    Auto,
}

impl SamRevision {
    /// Class byte of SAM commands for this revision
    pub fn class_byte(self) -> Result<u8> {
        match self {
            Self::C1 | Self::S1E => Ok(0x80),
            Self::S1D => Ok(0x94),
            Self::Auto => Err(Error::invalid_argument(
                "AUTO SAM revision has no class byte",
            )),
        }
    }

    /// Pattern matching the application subtype of this revision in the ATR
    pub const fn application_type_mask(self) -> &'static str {
        match self {
            Self::C1 => "C1",
            Self::S1E => "E1",
            Self::S1D => "D[012]",
            Self::Auto => "..",
        }
    }

    /// Revision from the application subtype byte of the ATR
    pub fn from_application_subtype(subtype: u8) -> Result<Self> {
        match subtype {
            0xC1 => Ok(Self::C1),
            0xD0..=0xD2 => Ok(Self::S1D),
            0xE1 => Ok(Self::S1E),
            _ => Err(Error::UnknownSamRevision(format!("{subtype:02X}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sam_class_byte() {
        assert_eq!(SamRevision::C1.class_byte().unwrap(), 0x80);
        assert_eq!(SamRevision::S1E.class_byte().unwrap(), 0x80);
        assert_eq!(SamRevision::S1D.class_byte().unwrap(), 0x94);
        assert!(SamRevision::Auto.class_byte().unwrap_err().is_argument());
    }

    #[test]
    fn test_sam_revision_from_subtype() {
        assert_eq!(SamRevision::from_application_subtype(0xC1).unwrap(), SamRevision::C1);
        assert_eq!(SamRevision::from_application_subtype(0xD1).unwrap(), SamRevision::S1D);
        assert_eq!(SamRevision::from_application_subtype(0xE1).unwrap(), SamRevision::S1E);
        assert!(matches!(
            SamRevision::from_application_subtype(0xB0),
            Err(Error::UnknownSamRevision(_))
        ));
    }

    #[test]
    fn test_po_revision_from_application_type() {
        assert_eq!(PoRevision::from_application_type(0x20), PoRevision::Rev3_1);
        assert_eq!(PoRevision::from_application_type(0x27), PoRevision::Rev3_1);
        assert_eq!(PoRevision::from_application_type(0x28), PoRevision::Rev3_2);
        assert_eq!(PoRevision::from_application_type(0x06), PoRevision::Rev2_4);
        assert_eq!(PoRevision::from_application_type(0x90), PoRevision::Rev3_1Clap);
    }

    #[test]
    fn test_po_class() {
        assert_eq!(PoRevision::Rev2_4.class().value(), 0x94);
        assert_eq!(PoRevision::Rev3_1.class().value(), 0x00);
        assert_eq!(PoRevision::Rev3_2.open_session_variant(), OpenSessionVariant::Rev32);
        assert_eq!(PoRevision::Rev3_1Clap.open_session_variant(), OpenSessionVariant::Rev31);
    }
}
