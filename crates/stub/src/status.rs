//! Status words answered by the card emulations

/// A status word as sent on the wire
pub(crate) type Status = [u8; 2];

pub(crate) const SUCCESS: Status = [0x90, 0x00];
pub(crate) const FILE_INVALIDATED: Status = [0x62, 0x83];
pub(crate) const MODIFICATIONS_EXCEEDED: Status = [0x64, 0x00];
pub(crate) const WRONG_LENGTH: Status = [0x67, 0x00];
pub(crate) const TRANSACTION_COUNTER_ZERO: Status = [0x69, 0x00];
pub(crate) const CONDITIONS_NOT_SATISFIED: Status = [0x69, 0x85];
pub(crate) const INCORRECT_SIGNATURE: Status = [0x69, 0x88];
pub(crate) const WRONG_DATA: Status = [0x6A, 0x80];
pub(crate) const FILE_NOT_FOUND: Status = [0x6A, 0x82];
pub(crate) const RECORD_NOT_FOUND: Status = [0x6A, 0x83];
pub(crate) const WRONG_PARAMETERS: Status = [0x6B, 0x00];
pub(crate) const INS_NOT_SUPPORTED: Status = [0x6D, 0x00];
pub(crate) const CLASS_NOT_SUPPORTED: Status = [0x6E, 0x00];

/// Serialize a command outcome as `payload SW1 SW2`
pub(crate) fn respond(result: Result<Vec<u8>, Status>) -> Vec<u8> {
    match result {
        Ok(mut payload) => {
            payload.extend_from_slice(&SUCCESS);
            payload
        }
        Err(status) => status.to_vec(),
    }
}
