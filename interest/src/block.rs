//! Blocks and coded fragments as they arrive from the network.
//!
//! # Envelope
//!
//! The bytes of a [Fragment] are framed for transport:
//!
//! ```text
//! +-----------+------------+---------+-----------------------+
//! | version   | sequence   | payload | checksum              |
//! | (u16)     | (u64)      |         | (SHA-256, 4 bytes)    |
//! +-----------+------------+---------+-----------------------+
//! ```
//!
//! Only the payload is handed to a decoder.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Envelope version written by [Fragment::seal].
pub const VERSION: u16 = 1;

/// Size of the envelope header (version and sequence).
pub const HEADER_SIZE: usize = 2 + 8;

/// Size of the envelope trailer (truncated checksum).
pub const TRAILER_SIZE: usize = 4;

/// Errors that can occur when opening a fragment envelope.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("envelope too short: {0} bytes")]
    TooShort(usize),
    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u16),
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

fn checksum(payload: &[u8]) -> [u8; TRAILER_SIZE] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; TRAILER_SIZE];
    out.copy_from_slice(&digest[..TRAILER_SIZE]);
    out
}

/// A block addressed by its own key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plain<K> {
    pub key: K,
    pub data: Bytes,
}

/// A coded fragment of a parent object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment<K> {
    /// The key of this fragment.
    pub key: K,

    /// The key of the object this fragment reconstructs towards.
    pub parent: K,

    /// The enveloped fragment bytes.
    pub data: Bytes,
}

impl<K> Fragment<K> {
    /// Wrap a decoder payload in a transport envelope.
    pub fn seal(key: K, parent: K, sequence: u64, payload: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        buf.put_u16(VERSION);
        buf.put_u64(sequence);
        buf.put_slice(payload);
        buf.put_slice(&checksum(payload));
        Self {
            key,
            parent,
            data: buf.freeze(),
        }
    }

    /// Returns the sender-assigned sequence number.
    pub fn sequence(&self) -> Result<u64, Error> {
        self.open().map(|(sequence, _)| sequence)
    }

    /// Strip the envelope and return the decoder payload.
    pub fn payload(&self) -> Result<Bytes, Error> {
        self.open().map(|(_, payload)| payload)
    }

    fn open(&self) -> Result<(u64, Bytes), Error> {
        let len = self.data.len();
        if len < HEADER_SIZE + TRAILER_SIZE {
            return Err(Error::TooShort(len));
        }
        let mut header = &self.data[..HEADER_SIZE];
        let version = header.get_u16();
        if version != VERSION {
            return Err(Error::UnsupportedVersion(version));
        }
        let sequence = header.get_u64();

        let payload = self.data.slice(HEADER_SIZE..len - TRAILER_SIZE);
        if checksum(&payload)[..] != self.data[len - TRAILER_SIZE..] {
            return Err(Error::ChecksumMismatch);
        }
        Ok((sequence, payload))
    }
}

/// A block received from a peer: either plain or a coded fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block<K> {
    Plain(Plain<K>),
    Coded(Fragment<K>),
}

impl<K> Block<K> {
    /// Returns the key this block is reconciled against.
    ///
    /// Fragments are matched by their parent, never by their own key.
    pub fn routing_key(&self) -> &K {
        match self {
            Block::Plain(plain) => &plain.key,
            Block::Coded(fragment) => &fragment.parent,
        }
    }
}

impl<K> From<Plain<K>> for Block<K> {
    fn from(plain: Plain<K>) -> Self {
        Block::Plain(plain)
    }
}

impl<K> From<Fragment<K>> for Block<K> {
    fn from(fragment: Fragment<K>) -> Self {
        Block::Coded(fragment)
    }
}
