//! The decoders that gate admission of coded fragments, one per parent.

use crate::{Fragment, Key};
use blockswap_coding::Decoder;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use tracing::{debug, trace};

/// The outcome of reconciling a batch of coded fragments.
///
/// Every fragment lands in exactly one of `admitted`, `rejected` or `dropped`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Admission<K> {
    /// Fragments that raised the rank of their parent's decoder.
    pub admitted: Vec<Fragment<K>>,

    /// Fragments for a parent without a decoder, fragments that could not be opened
    /// or consumed, and fragments linearly dependent on those already absorbed.
    pub rejected: Vec<Fragment<K>>,

    /// Fragments that reached a live decoder after no session awaited fragments of
    /// their parent any more (the want ended while the fragment was in flight).
    pub dropped: Vec<Fragment<K>>,

    /// Parents whose last outstanding coded want was satisfied by this batch.
    pub satisfied: Vec<K>,
}

impl<K> Admission<K> {
    pub(crate) fn new() -> Self {
        Self {
            admitted: Vec::new(),
            rejected: Vec::new(),
            dropped: Vec::new(),
            satisfied: Vec::new(),
        }
    }
}

/// A live decoder and what it has seen.
pub struct Slot<D> {
    decoder: D,
    admitted: usize,
    redundant: usize,
}

impl<D: Decoder> Slot<D> {
    /// Feeds a payload to the decoder.
    ///
    /// Returns true if the payload raised the rank.
    pub fn offer(&mut self, payload: &[u8]) -> Result<bool, D::Error> {
        let before = self.decoder.rank();
        self.decoder.consume(payload)?;
        let after = self.decoder.rank();
        trace!(before, after, "decoder rank");
        if after > before {
            self.admitted += 1;
            Ok(true)
        } else {
            self.redundant += 1;
            Ok(false)
        }
    }

    pub fn rank(&self) -> usize {
        self.decoder.rank()
    }

    pub fn is_complete(&self) -> bool {
        self.decoder.is_complete()
    }

    pub fn admitted(&self) -> usize {
        self.admitted
    }

    pub fn redundant(&self) -> usize {
        self.redundant
    }
}

/// A shared handle to one parent's decoder.
///
/// Consuming a fragment holds only this handle's lock, so fragments of different
/// parents decode in parallel.
pub type Handle<D> = Arc<Mutex<Slot<D>>>;

/// Owns every decoder, keyed by parent.
pub struct Decoders<K: Key, D: Decoder> {
    config: D::Config,
    slots: HashMap<K, Handle<D>>,
}

impl<K: Key, D: Decoder> Decoders<K, D> {
    /// Creates an empty registry that builds decoders with `config`.
    pub fn new(config: D::Config) -> Self {
        Self {
            config,
            slots: HashMap::new(),
        }
    }

    /// Creates a fresh decoder for the parent, replacing any decoder left over from a
    /// coded want that has already ended.
    pub fn create(&mut self, parent: &K) {
        let slot = Slot {
            decoder: D::new(&self.config),
            admitted: 0,
            redundant: 0,
        };
        let replaced = self
            .slots
            .insert(parent.clone(), Arc::new(Mutex::new(slot)))
            .is_some();
        debug!(?parent, replaced, "created decoder");
    }

    /// Returns the handle to the parent's decoder, if any.
    pub fn get(&self, parent: &K) -> Option<Handle<D>> {
        self.slots.get(parent).cloned()
    }

    /// Returns true if `handle` is the parent's current decoder.
    pub fn is_current(&self, parent: &K, handle: &Handle<D>) -> bool {
        self.slots
            .get(parent)
            .is_some_and(|slot| Arc::ptr_eq(slot, handle))
    }

    /// Returns true if a decoder exists for the parent.
    pub fn contains(&self, parent: &K) -> bool {
        self.slots.contains_key(parent)
    }

    /// Destroys the decoder for the parent.
    ///
    /// Returns false if there was no decoder.
    pub fn retire(&mut self, parent: &K) -> bool {
        if self.slots.remove(parent).is_none() {
            return false;
        }
        debug!(?parent, "retired decoder");
        true
    }

    /// Destroys the parent's decoder only if it is still `handle`.
    pub fn retire_current(&mut self, parent: &K, handle: &Handle<D>) -> bool {
        if !self.is_current(parent, handle) {
            return false;
        }
        self.retire(parent)
    }

    /// Returns the number of live decoders.
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}
