//! Session digest mirrored on the SAM
//!
//! The accumulator sequences the exchanges of a secure session towards the SAM:
//! Digest Init with the Open Session response, one block per in-session command
//! and response, then Digest Close. It never computes cryptography itself and
//! does not detect desynchronization; a mismatch surfaces when the signatures
//! are checked at close.

use keyple_core::{Bytes, BytesMut, CardTransport, command::MAX_DATA_LENGTH};
use tracing::{debug, trace, warn};

use crate::commands::sam;
use crate::key::KeyReference;
use crate::revision::{OpenSessionVariant, SamRevision};
use crate::settings::DigestUpdateMode;
use crate::{Error, Result};

/// Running session digest of one PO and SAM pair
#[derive(Debug, Clone)]
pub struct DigestAccumulator {
    revision: SamRevision,
    update_mode: DigestUpdateMode,
    encrypted: bool,
    seeded: bool,
    blocks: Vec<Bytes>,
    flushed: usize,
}

impl DigestAccumulator {
    /// Create an unseeded accumulator
    pub const fn new(revision: SamRevision, update_mode: DigestUpdateMode) -> Self {
        Self {
            revision,
            update_mode,
            encrypted: false,
            seeded: false,
            blocks: Vec::new(),
            flushed: 0,
        }
    }

    /// Select plain or encrypted digest updates
    ///
    /// The flag is frozen once Digest Init has been sent.
    pub fn set_encryption(&mut self, encrypted: bool) -> Result<()> {
        if self.seeded && encrypted != self.encrypted {
            return Err(Error::illegal_state(
                "session encryption cannot change after Digest Init",
            ));
        }
        self.encrypted = encrypted;
        Ok(())
    }

    /// Send Digest Init with the Open Session response payload
    pub fn seed<T>(
        &mut self,
        sam: &mut T,
        key: KeyReference,
        key_record: u8,
        variant: OpenSessionVariant,
        open_session_data: &[u8],
    ) -> Result<()>
    where
        T: CardTransport + ?Sized,
    {
        let init = sam::digest_init(
            self.revision,
            false,
            variant == OpenSessionVariant::Rev32,
            key_record,
            key,
            open_session_data,
        )?;
        init.execute(sam)?;

        self.blocks.clear();
        self.blocks.push(Bytes::copy_from_slice(open_session_data));
        self.flushed = 1;
        self.seeded = true;
        debug!(%key, encrypted = self.encrypted, "Session digest initialized");
        Ok(())
    }

    /// Append one command and its response to the digest
    pub fn update(&mut self, command: &[u8], response: &[u8]) -> Result<()> {
        if !self.seeded {
            return Err(Error::illegal_state("digest update before Digest Init"));
        }
        self.blocks.push(Bytes::copy_from_slice(command));
        self.blocks.push(Bytes::copy_from_slice(response));
        Ok(())
    }

    /// Mirror the pending blocks to the SAM, returns the number of SAM commands sent
    pub fn flush<T>(&mut self, sam: &mut T) -> Result<usize>
    where
        T: CardTransport + ?Sized,
    {
        if !self.seeded {
            return Err(Error::illegal_state("digest flush before Digest Init"));
        }
        let pending = &self.blocks[self.flushed..];
        let commands = match self.update_mode {
            DigestUpdateMode::Single => pending
                .iter()
                .map(|block| sam::digest_update(self.revision, self.encrypted, block))
                .collect::<Result<Vec<_>>>()?,
            DigestUpdateMode::Multiple => self.pack_multiple(pending)?,
        };

        for command in &commands {
            command.execute(sam)?;
        }
        trace!(blocks = pending.len(), commands = commands.len(), "Digest blocks mirrored");
        self.flushed = self.blocks.len();
        Ok(commands.len())
    }

    /// Group blocks into Digest Update Multiple commands of at most 255 bytes
    ///
    /// A block too large for a length prefixed packet goes alone in a Digest Update.
    fn pack_multiple(&self, blocks: &[Bytes]) -> Result<Vec<crate::commands::CalypsoApdu>> {
        let mut commands = Vec::new();
        let mut packet = BytesMut::new();

        for block in blocks {
            if block.len() + 1 > MAX_DATA_LENGTH {
                if !packet.is_empty() {
                    commands.push(sam::digest_update_multiple(self.revision, self.encrypted, &packet)?);
                    packet.clear();
                }
                commands.push(sam::digest_update(self.revision, self.encrypted, block)?);
                continue;
            }
            if packet.len() + 1 + block.len() > MAX_DATA_LENGTH {
                commands.push(sam::digest_update_multiple(self.revision, self.encrypted, &packet)?);
                packet.clear();
            }
            packet.extend_from_slice(&[block.len() as u8]);
            packet.extend_from_slice(block);
        }
        if !packet.is_empty() {
            commands.push(sam::digest_update_multiple(self.revision, self.encrypted, &packet)?);
        }
        Ok(commands)
    }

    /// Flush the remaining blocks and obtain the terminal session signature
    pub fn finalize<T>(&mut self, sam: &mut T, signature_length: usize) -> Result<Bytes>
    where
        T: CardTransport + ?Sized,
    {
        self.flush(sam)?;
        let expected_length = u8::try_from(signature_length)
            .map_err(|_| Error::invalid_argument("signature length above 255"))?;
        let response = sam::digest_close(self.revision, expected_length)?.execute(sam)?;
        let signature = sam::parse_signature(response.payload())?;
        self.seeded = false;
        debug!(blocks = self.blocks.len(), "Session digest closed");
        Ok(signature)
    }

    /// Have the SAM verify the PO session signature
    pub fn authenticate<T>(&self, sam: &mut T, po_signature: &[u8]) -> Result<()>
    where
        T: CardTransport + ?Sized,
    {
        let command = sam::digest_authenticate(self.revision, po_signature)?;
        let response = sam.transmit(command.command())?;
        if command.check(&response).is_err() {
            warn!(status = %response.status(), "PO session signature rejected by the SAM");
            return Err(Error::SessionAuthenticationFailed {
                status: response.status(),
            });
        }
        Ok(())
    }

    /// Drop every block, the accumulator must be seeded again
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.flushed = 0;
        self.seeded = false;
    }

    /// Whether Digest Init has been sent for the current session
    pub const fn is_seeded(&self) -> bool {
        self.seeded
    }

    /// Whether digest updates are flagged as encrypted
    pub const fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Digest update strategy
    pub const fn update_mode(&self) -> DigestUpdateMode {
        self.update_mode
    }

    /// Every block of the session, starting with the Open Session response
    pub fn blocks(&self) -> &[Bytes] {
        &self.blocks
    }

    /// Number of blocks not yet sent to the SAM
    pub fn pending(&self) -> usize {
        self.blocks.len() - self.flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use keyple_core::{ApduCommand, Command, TransportError};

    /// SAM answering 9000 to everything and recording the commands
    #[derive(Debug, Default)]
    struct RecordingSam {
        commands: Vec<Command>,
        signature: Vec<u8>,
    }

    impl CardTransport for RecordingSam {
        fn do_transmit_raw(&mut self, command: &[u8]) -> std::result::Result<Bytes, TransportError> {
            let command = Command::from_bytes(command).map_err(|e| TransportError::other(e.to_string()))?;
            let mut response = if command.instruction() == 0x8E {
                self.signature.clone()
            } else {
                Vec::new()
            };
            self.commands.push(command);
            response.extend_from_slice(&[0x90, 0x00]);
            Ok(response.into())
        }

        fn is_connected(&self) -> bool {
            true
        }

        fn reset(&mut self) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    fn seeded(mode: DigestUpdateMode, sam: &mut RecordingSam) -> DigestAccumulator {
        let mut digest = DigestAccumulator::new(SamRevision::C1, mode);
        digest
            .seed(sam, KeyReference::new(0x30, 0x79), 3, OpenSessionVariant::Rev31, &hex!("03D31CC100307900"))
            .unwrap();
        digest
    }

    #[test]
    fn test_seed_sends_digest_init() {
        let mut sam = RecordingSam::default();
        let digest = seeded(DigestUpdateMode::Single, &mut sam);

        assert_eq!(sam.commands[0].to_bytes().as_ref(), hex!("808A00FF0A307903D31CC100307900"));
        assert!(digest.is_seeded());
        assert_eq!(digest.pending(), 0);
    }

    #[test]
    fn test_single_updates_in_order() {
        let mut sam = RecordingSam::default();
        let mut digest = seeded(DigestUpdateMode::Single, &mut sam);
        digest.update(&hex!("00B2014400"), &hex!("AABB9000")).unwrap();
        digest.update(&hex!("00E2004004CCDDEEFF"), &hex!("9000")).unwrap();

        assert_eq!(digest.flush(&mut sam).unwrap(), 4);
        let sent: Vec<_> = sam.commands[1..].iter().map(|c| c.data().unwrap().to_vec()).collect();
        assert_eq!(
            sent,
            [hex!("00B2014400").to_vec(), hex!("AABB9000").to_vec(), hex!("00E2004004CCDDEEFF").to_vec(), hex!("9000").to_vec()]
        );
        assert_eq!(sam.commands[1].p1(), 0x00);
        assert_eq!(digest.pending(), 0);
    }

    #[test]
    fn test_multiple_updates_pack_blocks() {
        let mut sam = RecordingSam::default();
        let mut digest = seeded(DigestUpdateMode::Multiple, &mut sam);
        digest.update(&hex!("00B2014400"), &hex!("AABB9000")).unwrap();

        assert_eq!(digest.flush(&mut sam).unwrap(), 1);
        assert_eq!(
            sam.commands[1].to_bytes().as_ref(),
            hex!("808C80000B 0500B2014400 04AABB9000")
        );
    }

    #[test]
    fn test_multiple_updates_split_at_255_bytes() {
        let mut sam = RecordingSam::default();
        let mut digest = seeded(DigestUpdateMode::Multiple, &mut sam);
        digest.update(&[0x11; 200], &[0x22; 60]).unwrap();
        digest.update(&[0x33; 255], &hex!("9000")).unwrap();

        // 201, then 61, then the 255 byte block alone, then 3
        assert_eq!(digest.flush(&mut sam).unwrap(), 4);
        let kinds: Vec<_> = sam.commands[1..].iter().map(|c| (c.p1(), c.data().unwrap().len())).collect();
        assert_eq!(kinds, [(0x80, 201), (0x80, 61), (0x00, 255), (0x80, 3)]);
    }

    #[test]
    fn test_encryption_frozen_after_init() {
        let mut sam = RecordingSam::default();
        let mut digest = DigestAccumulator::new(SamRevision::C1, DigestUpdateMode::Single);
        digest.set_encryption(true).unwrap();
        digest
            .seed(&mut sam, KeyReference::new(0x30, 0x79), 3, OpenSessionVariant::Rev31, &hex!("0001"))
            .unwrap();

        assert!(matches!(digest.set_encryption(false), Err(Error::IllegalState(_))));
        digest.set_encryption(true).unwrap();

        digest.update(&hex!("00B2014400"), &hex!("9000")).unwrap();
        digest.flush(&mut sam).unwrap();
        assert_eq!(sam.commands[1].p2(), 0x80);
    }

    #[test]
    fn test_update_requires_seed() {
        let mut digest = DigestAccumulator::new(SamRevision::S1D, DigestUpdateMode::Single);
        assert!(matches!(digest.update(&[0x00], &[0x90, 0x00]), Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_finalize_and_authenticate() {
        let mut sam = RecordingSam {
            signature: hex!("01020304").to_vec(),
            ..Default::default()
        };
        let mut digest = seeded(DigestUpdateMode::Single, &mut sam);
        digest.update(&hex!("00B2014400"), &hex!("9000")).unwrap();

        let signature = digest.finalize(&mut sam, 4).unwrap();
        assert_eq!(signature.as_ref(), hex!("01020304"));
        assert_eq!(sam.commands.last().unwrap().to_bytes().as_ref(), hex!("808E000004"));
        assert!(!digest.is_seeded());

        digest.authenticate(&mut sam, &hex!("0A0B0C0D")).unwrap();
        assert_eq!(sam.commands.last().unwrap().to_bytes().as_ref(), hex!("80820000040A0B0C0D"));
    }
}
