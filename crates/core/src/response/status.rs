//! Status words closing every response

use std::fmt;

use tracing::Level;

/// Fallback meaning of the status words Calypso cards answer with
///
/// Command families override these through their [`StatusTable`](super::table::StatusTable).
const DESCRIPTIONS: &[(u16, &str)] = &[
    (0x9000, "Success"),
    (0x6283, "Selected file invalidated"),
    (0x6400, "Too many modifications in session"),
    (0x6700, "Wrong length"),
    (0x6900, "Transaction counter is 0"),
    (0x6981, "Command incompatible with file structure"),
    (0x6982, "Security status not satisfied"),
    (0x6985, "Conditions of use not satisfied"),
    (0x6986, "Command not allowed"),
    (0x6988, "Incorrect signature"),
    (0x6A80, "Incorrect parameters in the data field"),
    (0x6A82, "File not found"),
    (0x6A83, "Record not found"),
    (0x6B00, "Wrong parameters P1-P2"),
    (0x6D00, "Instruction not supported"),
    (0x6E00, "Class not supported"),
    (0x6F00, "No precise diagnosis"),
];

/// SW1-SW2 of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusWord {
    /// SW1
    pub sw1: u8,
    /// SW2
    pub sw2: u8,
}

impl StatusWord {
    /// 90 00
    pub const SUCCESS: Self = Self::new(0x90, 0x00);

    /// Build from both bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self { sw1, sw2 }
    }

    /// Build from `SW1 << 8 | SW2`
    pub const fn from_u16(status: u16) -> Self {
        let [sw1, sw2] = status.to_be_bytes();
        Self { sw1, sw2 }
    }

    /// `SW1 << 8 | SW2`
    pub const fn to_u16(&self) -> u16 {
        u16::from_be_bytes([self.sw1, self.sw2])
    }

    /// Returns true for 90 00 only
    pub const fn is_success(&self) -> bool {
        self.to_u16() == 0x9000
    }

    /// Level at which an answer with this status word is logged
    ///
    /// Warnings (62xx, 63xx) are informational, any other failure is a warning.
    pub const fn tracing_level(&self) -> Level {
        match self.sw1 {
            0x90 if self.sw2 == 0x00 => Level::DEBUG,
            0x62 | 0x63 => Level::INFO,
            _ => Level::WARN,
        }
    }

    /// Meaning of the status word when no command table knows it
    pub fn description(&self) -> &'static str {
        let code = self.to_u16();
        DESCRIPTIONS
            .iter()
            .find_map(|(entry, description)| (*entry == code).then_some(*description))
            .unwrap_or("Unknown status word")
    }
}

impl From<u16> for StatusWord {
    fn from(status: u16) -> Self {
        Self::from_u16(status)
    }
}

impl From<StatusWord> for u16 {
    fn from(status: StatusWord) -> Self {
        status.to_u16()
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.to_u16())
    }
}
