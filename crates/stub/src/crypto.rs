//! Session cryptography shared by the PO and SAM emulations
//!
//! The arithmetic is 3DES based and deterministic so that both emulations
//! derive the same keys and signatures from the same exchanges:
//!
//! - card key: `3DES(master, serial) || 3DES(master, !serial)`
//! - session key: two MACs under the card key over the terminal challenge and
//!   the Open Session response
//! - signatures: MAC under the session key over an origin byte and the digest
//!   input, truncated to the session signature length

use cbc_mac::{CbcMac, Mac};
use cipher::{BlockEncrypt, KeyInit, generic_array::GenericArray};
use des::TdesEde2;
use zeroize::Zeroize;

/// Origin byte of the terminal signature
pub const TERMINAL_SIGNATURE: u8 = 0x01;
/// Origin byte of the PO signature
pub const PO_SIGNATURE: u8 = 0x02;

/// A double length 3DES key, wiped on drop
#[derive(Debug, Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
pub struct Key([u8; 16]);

impl Key {
    /// Wrap key bytes
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Key bytes
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Diversify a master key with a card serial number
    ///
    /// Serial numbers shorter than 8 bytes are left padded with zeros.
    pub fn diversify(&self, serial: &[u8]) -> Self {
        let mut block = [0u8; 8];
        let serial = &serial[serial.len().saturating_sub(8)..];
        block[8 - serial.len()..].copy_from_slice(serial);
        let inverted = block.map(|byte| !byte);

        let cipher = TdesEde2::new(GenericArray::from_slice(&self.0));
        let mut left = GenericArray::clone_from_slice(&block);
        let mut right = GenericArray::clone_from_slice(&inverted);
        cipher.encrypt_block(&mut left);
        cipher.encrypt_block(&mut right);

        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&left);
        key[8..].copy_from_slice(&right);
        Self(key)
    }

    /// Derive the session key from the terminal challenge and the Open Session response
    pub fn session_key(&self, terminal_challenge: &[u8], open_session_data: &[u8]) -> Self {
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&self.mac(&[&[0x00], terminal_challenge, open_session_data]));
        key[8..].copy_from_slice(&self.mac(&[&[0xFF], terminal_challenge, open_session_data]));
        Self(key)
    }

    /// CBC-MAC over the concatenated parts, zero padded
    pub fn mac(&self, parts: &[&[u8]]) -> [u8; 8] {
        let mut mac = <CbcMac<TdesEde2> as Mac>::new(GenericArray::from_slice(&self.0));
        for part in parts {
            mac.update(part);
        }
        mac.finalize().into_bytes().into()
    }
}

/// Input of the session digest: every block with a two byte length prefix
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionDigest {
    input: Vec<u8>,
    blocks: usize,
}

impl SessionDigest {
    /// Start a digest with the Open Session response
    pub fn new(open_session_data: &[u8]) -> Self {
        let mut digest = Self::default();
        digest.push(open_session_data);
        digest
    }

    /// Append one block
    pub fn push(&mut self, block: &[u8]) {
        self.input.extend_from_slice(&(block.len() as u16).to_be_bytes());
        self.input.extend_from_slice(block);
        self.blocks += 1;
    }

    /// Number of blocks fed so far
    pub const fn blocks(&self) -> usize {
        self.blocks
    }

    /// Signature of the given origin, truncated to `length` bytes
    pub fn signature(&self, session_key: &Key, origin: u8, length: usize) -> Vec<u8> {
        let mac = session_key.mac(&[&[origin], &self.input]);
        mac[..length.min(mac.len())].to_vec()
    }
}
