//! APDU response definitions
//!
//! A [`Response`] is the payload returned by the card followed by its two status
//! bytes. Interpretation of the status word is command dependent and handled by
//! [`table::StatusTable`].

pub mod status;
pub mod table;
pub mod utils;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::Result;
use status::StatusWord;

/// APDU response: payload and status word
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Response {
    payload: Bytes,
    status: StatusWord,
}

impl Response {
    /// Create a new response with payload and status
    pub fn new(payload: impl Into<Bytes>, status: impl Into<StatusWord>) -> Self {
        Self {
            payload: payload.into(),
            status: status.into(),
        }
    }

    /// Create a success (90 00) response
    pub fn success(payload: impl Into<Bytes>) -> Self {
        Self::new(payload, StatusWord::SUCCESS)
    }

    /// Create a response carrying only a status word
    pub fn from_status(status: impl Into<StatusWord>) -> Self {
        Self::new(Bytes::new(), status)
    }

    /// Parse response from raw bytes (payload followed by SW1 SW2)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (status, payload) = utils::extract_status_and_payload(data)?;

        trace!(
            sw1 = format_args!("{:#04x}", status.sw1),
            sw2 = format_args!("{:#04x}", status.sw2),
            payload_len = payload.len(),
            "Parsed APDU response"
        );

        Ok(Self {
            payload: Bytes::copy_from_slice(payload),
            status,
        })
    }

    /// Response payload, without the status word
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Status word of the response
    pub const fn status(&self) -> StatusWord {
        self.status
    }

    /// Check if the status word is 90 00
    pub const fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Consume the response and return its payload
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Serialize back to raw bytes (payload followed by SW1 SW2)
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.payload.len() + 2);
        buf.put_slice(&self.payload);
        buf.put_u8(self.status.sw1);
        buf.put_u8(self.status.sw2);
        buf.freeze()
    }
}

impl TryFrom<&[u8]> for Response {
    type Error = crate::Error;

    fn try_from(data: &[u8]) -> Result<Self> {
        Self::from_bytes(data)
    }
}

impl From<Response> for Bytes {
    fn from(response: Response) -> Self {
        response.to_bytes()
    }
}
