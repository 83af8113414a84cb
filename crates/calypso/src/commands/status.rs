//! Status tables of the Calypso command families

use keyple_core::{StatusProperties as S, StatusTable};

/// Open Session
pub static OPEN_SESSION: StatusTable = StatusTable::new(
    "Open Secure Session",
    &[
        (0x6700, S::error("Lc value not supported.")),
        (0x6900, S::error("Transaction Counter is 0")),
        (0x6981, S::error("Command forbidden (read requested and current EF is a Binary file).")),
        (0x6982, S::error("Security conditions not fulfilled (PIN code not presented, AES key forbidding the compatibility mode, encryption required).")),
        (0x6985, S::error("Access forbidden (Never access mode, Session already opened).")),
        (0x6986, S::error("Command not allowed (read requested and no current EF).")),
        (0x6A81, S::error("Wrong key index.")),
        (0x6A82, S::error("File not found.")),
        (0x6A83, S::error("Record not found (record index is above NumRec).")),
        (0x6B00, S::error("P1 or P2 value not supported (key index incorrect, wrong P2).")),
    ],
);

/// Close Session and abort
pub static CLOSE_SESSION: StatusTable = StatusTable::new(
    "Close Secure Session",
    &[
        (0x6700, S::error("Lc signatureLo not supported (e.g. Lc=4 with a Revision 3.2 mode for Open Secure Session).")),
        (0x6B00, S::error("P1 or P2 signature not supported.")),
        (0x6988, S::error("incorrect signatureLo.")),
        (0x6985, S::error("No session was opened.")),
    ],
);

/// Ratification
pub static RATIFICATION: StatusTable = StatusTable::new("Ratification", &[]);

/// PO Get Challenge
pub static PO_GET_CHALLENGE: StatusTable = StatusTable::new(
    "Get Challenge",
    &[
        (0x6700, S::error("Lc value not supported.")),
        (0x6B00, S::error("Incorrect P1 or P2.")),
    ],
);

/// Read Records
pub static READ_RECORDS: StatusTable = StatusTable::new(
    "Read Records",
    &[
        (0x6981, S::error("Command forbidden on binary files")),
        (0x6982, S::error("Security conditions not fulfilled (PIN code not presented, encryption required).")),
        (0x6985, S::error("Access forbidden (Never access mode, stored value log file and a stored value operation was done during the current session).")),
        (0x6986, S::error("Command not allowed (no current EF)")),
        (0x6A82, S::error("File not found")),
        (0x6A83, S::error("Record not found (record index is 0, or above NumRec")),
        (0x6B00, S::error("P2 value not supported")),
    ],
);

/// Update Record and Write Record
pub static UPDATE_RECORD: StatusTable = StatusTable::new(
    "Update Record",
    &[
        (0x6400, S::error("Too many modifications in session")),
        (0x6700, S::error("Lc value not supported")),
        (0x6981, S::error("Command forbidden on cyclic files when the record exists and is not record 01h and on binary files")),
        (0x6982, S::error("Security conditions not fulfilled (no session, wrong key, encryption required)")),
        (0x6985, S::error("Access forbidden (Never access mode, DF is invalidated, etc..)")),
        (0x6986, S::error("Command not allowed (no current EF)")),
        (0x6A82, S::error("File not found")),
        (0x6A83, S::error("Record is not found (record index is 0 or above NumRec)")),
        (0x6B00, S::error("P2 value not supported")),
    ],
);

/// Append Record
pub static APPEND_RECORD: StatusTable = StatusTable::new(
    "Append Record",
    &[
        (0x6B00, S::error("P1 or P2 value not supported.")),
        (0x6700, S::error("Lc value not supported.")),
        (0x6400, S::error("Too many modifications in session.")),
        (0x6981, S::error("The current EF is not a Cyclic EF.")),
        (0x6982, S::error("Security conditions not fulfilled (no session, wrong key).")),
        (0x6985, S::error("Access forbidden (Never access mode, DF is invalidated, etc..).")),
        (0x6986, S::error("Command not allowed (no current EF).")),
        (0x6A82, S::error("File not found.")),
    ],
);

/// Increase and Decrease
pub static COUNTER: StatusTable = StatusTable::new(
    "Increase/Decrease",
    &[
        (0x6400, S::error("Too many modifications in session.")),
        (0x6700, S::error("Lc value not supported.")),
        (0x6981, S::error("The current EF is not a Counters or Simulated Counter EF.")),
        (0x6982, S::error("Security conditions not fulfilled (no session, wrong key, encryption required).")),
        (0x6985, S::error("Access forbidden (Never access mode, DF is invalidated, etc..)")),
        (0x6986, S::error("Command not allowed (no current EF).")),
        (0x6A80, S::error("Overflow error.")),
        (0x6A82, S::error("File not found.")),
        (0x6B00, S::error("P1 or P2 value not supported.")),
        (0x6103, S::success("Successful execution (possible only in ISO7816 T=0).")),
    ],
);

/// Get Data (FCI)
pub static GET_DATA_FCI: StatusTable = StatusTable::new(
    "Get Data (FCI)",
    &[
        (0x6A88, S::error("Data object not found (optional mode not available).")),
        (0x6B00, S::error("P1 or P2 value not supported (<>004fh, 0062h, 006Fh, 00C0h, 00D0h, 0185h and 5F52h, according to availabl optional modes).")),
        (0x6283, S::success("Successful execution, FCI request and DF is invalidated.")),
    ],
);

/// Select Diversifier
pub static SELECT_DIVERSIFIER: StatusTable = StatusTable::new(
    "Select Diversifier",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6985, S::error("Preconditions not satisfied: the SAM is locked.")),
    ],
);

/// SAM Get Challenge
pub static SAM_GET_CHALLENGE: StatusTable = StatusTable::new(
    "Get Challenge",
    &[(0x6700, S::error("Incorrect Le."))],
);

/// Digest Init
pub static DIGEST_INIT: StatusTable = StatusTable::new(
    "Digest Init",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6900, S::error("An event counter cannot be incremented.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6A00, S::error("Incorrect P2.")),
        (0x6A83, S::error("Record not found: signing key not found.")),
    ],
);

/// Digest Update
pub static DIGEST_UPDATE: StatusTable = StatusTable::new(
    "Digest Update",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6B00, S::error("Incorrect value in the incoming data: session in Rev.3.2 mode with encryption/decryption active and not enough data (less than 5 bytes for and odd occurrence or less than 2 bytes for an even occurrence).")),
    ],
);

/// Digest Update Multiple
pub static DIGEST_UPDATE_MULTIPLE: StatusTable = StatusTable::new(
    "Digest Update Multiple",
    &[
        (0x6700, S::error("Lc value not supported.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6A80, S::error("Incorrect value in the incoming data: incorrect structure.")),
        (0x6B00, S::error("Incorrect P1.")),
    ],
);

/// Digest Close
pub static DIGEST_CLOSE: StatusTable = StatusTable::new(
    "Digest Close",
    &[
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6700, S::error("Incorrect Lc.")),
    ],
);

/// Digest Authenticate
pub static DIGEST_AUTHENTICATE: StatusTable = StatusTable::new(
    "Digest Authenticate",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6988, S::error("Incorrect signature.")),
    ],
);

/// Unlock
pub static UNLOCK: StatusTable = StatusTable::new(
    "Unlock",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6985, S::error("Preconditions not satisfied (SAM not locked?).")),
        (0x6988, S::error("Incorrect UnlockData.")),
    ],
);

/// Write Key
pub static WRITE_KEY: StatusTable = StatusTable::new(
    "Write Key",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6900, S::error("Status conditions not satisfied: the maximum number of modifications is reached.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6988, S::error("Incorrect signature.")),
        (0x6A00, S::error("P1 or P2 incorrect.")),
        (0x6A80, S::error("Incorrect plain or decrypted data.")),
        (0x6A83, S::error("Record not found: deciphering key not found.")),
        (0x6A87, S::error("Lc inconsistent with P1 or P2.")),
    ],
);

/// Card Cipher PIN
pub static CARD_CIPHER_PIN: StatusTable = StatusTable::new(
    "Card Cipher PIN",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6900, S::error("An event counter cannot be incremented.")),
        (0x6985, S::error("Preconditions not satisfied.")),
        (0x6A00, S::error("Incorrect P1 or P2")),
        (0x6A83, S::error("Record not found: ciphering key not found")),
        (0x6D00, S::error("Instruction unknown.")),
    ],
);

/// Give Random
pub static GIVE_RANDOM: StatusTable = StatusTable::new(
    "Give Random",
    &[(0x6700, S::error("Incorrect Lc."))],
);

/// Read Event Counter
pub static READ_EVENT_COUNTER: StatusTable = StatusTable::new(
    "Read Event Counter",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6A00, S::error("P2 incorrect.")),
        (0x6A83, S::error("Record not found.")),
    ],
);

/// Read Ceilings
pub static READ_CEILINGS: StatusTable = StatusTable::new(
    "Read Ceilings",
    &[
        (0x6700, S::error("Incorrect Lc.")),
        (0x6A00, S::error("P1 or P2 incorrect.")),
        (0x6A83, S::error("Record not found.")),
    ],
);

/// Select Application of a Calypso PO
pub static SELECT_APPLICATION: StatusTable = StatusTable::new(
    "Select Application",
    &[
        (0x6283, S::success("Successful execution, DF invalidated.")),
        (0x6A82, S::error("File not found.")),
        (0x6A83, S::error("Record not found.")),
    ],
);
