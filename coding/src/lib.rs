//! Incrementally decode content from linearly coded fragments.
//!
//! A coded object is split into `k` source rows. Every fragment sent over the
//! network is a linear combination of those rows, tagged with the coefficients
//! used to produce it. A receiver can reconstruct the object once it holds `k`
//! linearly independent fragments, in any order and from any mix of senders.
//!
//! The [Decoder] trait is the capability the rest of the system relies on: it
//! reports how many independent fragments have been absorbed (the rank), so a
//! caller can tell whether a freshly received fragment carried new information.
//! [Rlnc] implements it with random linear network coding over a prime field.

use std::fmt::Debug;

pub mod field;

mod rlnc;
pub use rlnc::{Config, Encoder, Error, Rlnc};

/// An incremental decoder for the fragments of one coded object.
///
/// # Guarantees
///
/// - [Decoder::rank] never decreases.
/// - A call to [Decoder::consume] that returns an error leaves the decoder unchanged.
/// - A call to [Decoder::consume] with a fragment already in the span of the absorbed
///   fragments succeeds without changing the rank.
pub trait Decoder: Send + 'static {
    /// Bounds and parameters used to construct a decoder.
    type Config: Clone + Send + Sync + 'static;

    /// The type of errors that can occur while consuming a payload.
    type Error: Debug + Send;

    /// Create an empty decoder.
    fn new(config: &Self::Config) -> Self;

    /// Returns the number of linearly independent fragments absorbed so far.
    fn rank(&self) -> usize;

    /// Absorb the payload of a fragment (with any transport framing removed).
    fn consume(&mut self, payload: &[u8]) -> Result<(), Self::Error>;

    /// Returns true once enough fragments have been absorbed to reconstruct the object.
    fn is_complete(&self) -> bool;
}
