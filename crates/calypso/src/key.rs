//! Key references and session access levels

use derive_more::Display;

/// Key identifier and key version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("KIF={kif:02X} KVC={kvc:02X}")]
pub struct KeyReference {
    /// Key identifier
    pub kif: u8,
    /// Key version
    pub kvc: u8,
}

impl KeyReference {
    /// Create a key reference
    pub const fn new(kif: u8, kvc: u8) -> Self {
        Self { kif, kvc }
    }
}

/// KIF value meaning "not provided by the card"
pub const UNDEFINED_KIF: u8 = 0xFF;

/// Access level of a secure session, selecting the PO key used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum AccessLevel {
    /// Personalization key (issuer)
    #[display("PERSO")]
    Personalization,
    /// Load key
    #[display("LOAD")]
    Load,
    /// Debit key
    #[display("DEBIT")]
    Debit,
}

impl AccessLevel {
    /// Key index sent in Open Session (1 to 3)
    pub const fn key_index(self) -> u8 {
        match self {
            Self::Personalization => 0x01,
            Self::Load => 0x02,
            Self::Debit => 0x03,
        }
    }
}
