//! Security settings of a PO transaction

use derive_more::Display;

use crate::key::AccessLevel;

/// Behavior when the modification buffer cannot hold the session commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum ModificationMode {
    /// Fail the transaction, nothing is sent
    #[default]
    #[display("ATOMIC")]
    Atomic,
    /// Split the commands over several sessions
    #[display("MULTIPLE")]
    Multiple,
}

/// Ratification requested when closing a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum RatificationMode {
    /// Session ratified by the Close Session command
    #[default]
    #[display("CLOSE_RATIFIED")]
    CloseRatified,
    /// Ratification left to the next command
    #[display("CLOSE_NOT_RATIFIED")]
    CloseNotRatified,
}

/// Physical interface the PO is reached through
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum TransmissionMode {
    /// Contact interface, ratification is implicit on the next command
    #[display("CONTACTS")]
    Contacts,
    /// Contactless interface, ratification is sent explicitly
    #[default]
    #[display("CONTACTLESS")]
    Contactless,
}

/// How in-session exchanges are mirrored to the SAM
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum DigestUpdateMode {
    /// One Digest Update per command and per response
    #[default]
    #[display("SINGLE")]
    Single,
    /// Digest Update Multiple, packing several blocks per command
    #[display("MULTIPLE")]
    Multiple,
}

/// Settings governing the secure sessions of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecuritySettings {
    modification_mode: ModificationMode,
    ratification_mode: RatificationMode,
    transmission_mode: TransmissionMode,
    digest_update_mode: DigestUpdateMode,
    encrypted_session: bool,
    /// KIF per access level: personalization, load, debit
    default_kifs: [u8; 3],
    /// SAM key record per access level: personalization, load, debit
    key_records: [u8; 3],
    authorized_kvcs: Option<Vec<u8>>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl SecuritySettings {
    /// Default settings
    pub const fn new() -> Self {
        Self {
            modification_mode: ModificationMode::Atomic,
            ratification_mode: RatificationMode::CloseRatified,
            transmission_mode: TransmissionMode::Contactless,
            digest_update_mode: DigestUpdateMode::Single,
            encrypted_session: false,
            default_kifs: [0x21, 0x27, 0x30],
            key_records: [0x01, 0x02, 0x03],
            authorized_kvcs: None,
        }
    }

    /// Set the modification mode
    pub const fn with_modification_mode(mut self, mode: ModificationMode) -> Self {
        self.modification_mode = mode;
        self
    }

    /// Set the ratification mode
    pub const fn with_ratification_mode(mut self, mode: RatificationMode) -> Self {
        self.ratification_mode = mode;
        self
    }

    /// Set the transmission mode
    pub const fn with_transmission_mode(mut self, mode: TransmissionMode) -> Self {
        self.transmission_mode = mode;
        self
    }

    /// Set the digest update mode
    pub const fn with_digest_update_mode(mut self, mode: DigestUpdateMode) -> Self {
        self.digest_update_mode = mode;
        self
    }

    /// Request an encrypted session
    pub const fn with_encrypted_session(mut self, encrypted: bool) -> Self {
        self.encrypted_session = encrypted;
        self
    }

    /// KIF used when the PO does not report one
    pub const fn with_default_kif(mut self, level: AccessLevel, kif: u8) -> Self {
        self.default_kifs[level_index(level)] = kif;
        self
    }

    /// SAM work key record used for an access level
    pub const fn with_key_record(mut self, level: AccessLevel, record: u8) -> Self {
        self.key_records[level_index(level)] = record;
        self
    }

    /// Only accept these PO key versions
    pub fn with_authorized_kvcs(mut self, kvcs: impl IntoIterator<Item = u8>) -> Self {
        self.authorized_kvcs = Some(kvcs.into_iter().collect());
        self
    }

    /// Modification mode
    pub const fn modification_mode(&self) -> ModificationMode {
        self.modification_mode
    }

    /// Ratification mode
    pub const fn ratification_mode(&self) -> RatificationMode {
        self.ratification_mode
    }

    /// Transmission mode
    pub const fn transmission_mode(&self) -> TransmissionMode {
        self.transmission_mode
    }

    /// Digest update mode
    pub const fn digest_update_mode(&self) -> DigestUpdateMode {
        self.digest_update_mode
    }

    /// Whether sessions are encrypted
    pub const fn is_encrypted_session(&self) -> bool {
        self.encrypted_session
    }

    /// KIF used for an access level when the PO does not report one
    pub const fn default_kif(&self, level: AccessLevel) -> u8 {
        self.default_kifs[level_index(level)]
    }

    /// SAM work key record of an access level
    pub const fn key_record(&self, level: AccessLevel) -> u8 {
        self.key_records[level_index(level)]
    }

    /// Returns true if the key version is acceptable
    pub fn is_kvc_authorized(&self, kvc: u8) -> bool {
        self.authorized_kvcs
            .as_ref()
            .is_none_or(|kvcs| kvcs.contains(&kvc))
    }
}

const fn level_index(level: AccessLevel) -> usize {
    match level {
        AccessLevel::Personalization => 0,
        AccessLevel::Load => 1,
        AccessLevel::Debit => 2,
    }
}
