//! Utility functions for APDU response handling

use tracing::debug;

use crate::response::status::StatusWord;
use crate::{Error, Result};

/// Split raw APDU response data into its payload and status word
///
/// The payload may be empty; the status word is always the last two bytes.
///
/// # Errors
/// Returns an error if the data is too short to contain a status word.
pub fn extract_status_and_payload(data: &[u8]) -> Result<(StatusWord, &[u8])> {
    let [payload @ .., sw1, sw2] = data else {
        debug!("Response too short: {} bytes", data.len());
        return Err(Error::Response("response shorter than its 2 byte status word"));
    };

    Ok((StatusWord::new(*sw1, *sw2), payload))
}
