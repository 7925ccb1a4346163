//! Mock implementations for testing.

use crate::Fragment;
use blockswap_coding::Decoder as _;
use std::{
    collections::BTreeSet,
    sync::{Arc, Barrier},
};

/// A key that can be used for testing
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Debug, Hash)]
pub struct Key(pub u8);

/// Errors returned by the mock [Decoder].
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Empty,
    OutOfRange(u8),
}

/// A decoder whose payload names a basis vector directly.
///
/// The first byte of a payload is the index of the vector, so two payloads are
/// linearly dependent exactly when they name the same index.
pub struct Decoder {
    dimension: usize,
    seen: BTreeSet<u8>,
}

impl blockswap_coding::Decoder for Decoder {
    type Config = usize;
    type Error = Error;

    fn new(config: &usize) -> Self {
        Self {
            dimension: *config,
            seen: BTreeSet::new(),
        }
    }

    fn rank(&self) -> usize {
        self.seen.len()
    }

    fn consume(&mut self, payload: &[u8]) -> Result<(), Error> {
        let index = *payload.first().ok_or(Error::Empty)?;
        if usize::from(index) >= self.dimension {
            return Err(Error::OutOfRange(index));
        }
        self.seen.insert(index);
        Ok(())
    }

    fn is_complete(&self) -> bool {
        self.seen.len() == self.dimension
    }
}

/// A [Decoder] that parks inside `consume` until released.
///
/// Every call meets the test thread at the barrier twice: once on entry and once
/// before absorbing the payload.
pub struct Gated {
    barrier: Arc<Barrier>,
    inner: Decoder,
}

impl blockswap_coding::Decoder for Gated {
    type Config = Arc<Barrier>;
    type Error = Error;

    fn new(config: &Arc<Barrier>) -> Self {
        Self {
            barrier: config.clone(),
            inner: Decoder::new(&16),
        }
    }

    fn rank(&self) -> usize {
        self.inner.rank()
    }

    fn consume(&mut self, payload: &[u8]) -> Result<(), Error> {
        self.barrier.wait();
        self.barrier.wait();
        self.inner.consume(payload)
    }

    fn is_complete(&self) -> bool {
        self.inner.is_complete()
    }
}

/// Build an enveloped fragment of `parent` naming basis vector `index`.
pub fn fragment(key: u8, parent: u8, index: u8) -> Fragment<Key> {
    Fragment::seal(Key(key), Key(parent), u64::from(key), &[index])
}

/// Install a test subscriber so `tracing` output shows up in failing tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}
