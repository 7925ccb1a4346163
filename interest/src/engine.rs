use crate::{
    decoders::{Admission, Decoders, Handle},
    metrics::{Metrics, Outcome},
    table::{Released, Table},
    Block, Config, Fragment, Key, Plain, Session,
};
use blockswap_coding::Decoder;
use prometheus_client::registry::Registry;
use std::{
    collections::{BTreeSet, HashMap},
    sync::{Mutex, RwLock},
};
use tracing::debug;

/// The result of splitting a batch of arriving blocks by interest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split<K> {
    /// Plain blocks at least one session actively wants.
    pub wanted: Vec<Plain<K>>,

    /// Plain blocks and fragments nobody wants.
    pub unwanted: Vec<Block<K>>,

    /// Fragments whose parent is wanted, to be passed to
    /// [Engine::split_wanted_unwanted_coded].
    pub coded: Vec<Fragment<K>>,
}

/// Records the keys every session is interested in and reconciles arriving blocks
/// against them.
///
/// # Locking
///
/// Plain and coded interest sit behind one read/write lock (the table). Decoders sit
/// in a registry behind a separate mutex, and every decoder has its own lock, held
/// while a fragment is consumed. Decoding never holds the table or the registry, so
/// interest lookups and updates do not wait on it.
///
/// Locks are always taken in the order decoder, table, registry. The registry lock is
/// never held while waiting on another lock.
pub struct Engine<K: Key, D: Decoder> {
    table: RwLock<Table<K>>,
    decoders: Mutex<Decoders<K, D>>,
    metrics: Metrics,
}

impl<K: Key, D: Decoder> Engine<K, D> {
    /// Creates an empty engine, registering its metrics with `registry`.
    pub fn new(config: Config<D::Config>, registry: &mut Registry) -> Self {
        let metrics = Metrics::init(registry.sub_registry_with_prefix(&config.metrics_prefix));
        Self {
            table: RwLock::new(Table::new()),
            decoders: Mutex::new(Decoders::new(config.decoder)),
            metrics,
        }
    }

    /// Records that the session wants the blocks for `keys`.
    ///
    /// Called whenever the session issues new wants.
    pub fn record_session_interest(&self, session: Session, keys: &[K]) {
        let mut table = self.table.write().unwrap();
        table.record(session, keys);
        self.metrics.keys.set(table.len() as i64);
    }

    /// Records that the session needs `count` more independent fragments of `parent`.
    ///
    /// The first coded want for a parent gets a fresh decoder. A `count` of zero is
    /// ignored.
    pub fn record_session_interest_coded(&self, session: Session, parent: &K, count: usize) {
        let mut table = self.table.write().unwrap();
        let created = table.record_coded(session, parent, count);
        self.metrics.outstanding.set(table.len_outstanding() as i64);
        if !created {
            return;
        }
        let mut decoders = self.decoders.lock().unwrap();
        decoders.create(parent);
        self.metrics.decoders.set(decoders.len() as i64);
    }

    /// Removes the session from every key and parent, retiring the decoders of
    /// parents no session awaits fragments of any more.
    ///
    /// Called when the session shuts down. Returns the keys no session is interested
    /// in any more.
    pub fn remove_session(&self, session: Session) -> Vec<K> {
        let mut table = self.table.write().unwrap();
        let released = table.release_session(session);
        let keys = self.retire(&table, released);
        debug!(%session, released = keys.len(), "removed session");
        keys
    }

    /// Marks the blocks for `keys` as received by the session.
    ///
    /// The session keeps listening for messages about the keys, and coded wants are
    /// left untouched. Called when the session receives blocks.
    pub fn remove_session_wants(&self, session: Session, keys: &[K]) {
        let mut table = self.table.write().unwrap();
        table.weaken(session, keys);
    }

    /// Removes the session from the given keys only, retiring the decoders of parents
    /// no session awaits fragments of any more.
    ///
    /// Called when the session cancels a request. Returns the keys no session is
    /// interested in any more.
    pub fn remove_session_interested(&self, session: Session, keys: &[K]) -> Vec<K> {
        let mut table = self.table.write().unwrap();
        let released = table.release(session, keys);
        self.retire(&table, released)
    }

    /// Returns, for each set, the keys the session wants, listens for, or awaits
    /// fragments of.
    pub fn filter_session_interested(&self, session: Session, sets: &[&[K]]) -> Vec<Vec<K>> {
        let table = self.table.read().unwrap();
        sets.iter()
            .map(|keys| {
                keys.iter()
                    .filter(|key| table.is_interested(session, key))
                    .cloned()
                    .collect()
            })
            .collect()
    }

    /// Splits arriving blocks into wanted plain blocks, unwanted blocks, and fragments
    /// whose parent is wanted.
    ///
    /// A plain block is wanted if some session actively wants it. A fragment is
    /// classified by its parent, which is wanted if some session actively wants it
    /// or still needs fragments for it.
    pub fn split_wanted_unwanted(&self, blocks: Vec<Block<K>>) -> Split<K> {
        let table = self.table.read().unwrap();
        let mut split = Split {
            wanted: Vec::with_capacity(blocks.len()),
            unwanted: Vec::new(),
            coded: Vec::new(),
        };
        for block in blocks {
            let key = block.routing_key();
            let wanted = match block {
                Block::Plain(_) => table.is_wanted(key),
                Block::Coded(_) => table.is_wanted(key) || table.is_outstanding(key),
            };
            match block {
                Block::Plain(plain) if wanted => split.wanted.push(plain),
                Block::Coded(fragment) if wanted => split.coded.push(fragment),
                block => split.unwanted.push(block),
            }
        }
        self.metrics
            .record_blocks(Outcome::Wanted, split.wanted.len() + split.coded.len());
        self.metrics
            .record_blocks(Outcome::Unwanted, split.unwanted.len());
        split
    }

    /// Feeds fragments to their parents' decoders, admitting those that carry new
    /// information.
    ///
    /// Every admitted fragment counts once towards every session awaiting its parent.
    /// Fragments of a parent whose last coded want was satisfied earlier in the batch
    /// are dropped, and the decoders of satisfied parents are retired before
    /// returning.
    pub fn split_wanted_unwanted_coded(&self, fragments: Vec<Fragment<K>>) -> Admission<K> {
        let mut admission = Admission::new();
        let mut satisfied: Vec<(K, Handle<D>)> = Vec::new();
        for fragment in fragments {
            let handle = self.decoders.lock().unwrap().get(&fragment.parent);
            let Some(handle) = handle else {
                debug!(parent = ?fragment.parent, "no decoder for fragment");
                admission.rejected.push(fragment);
                continue;
            };

            // Held until the fragment is counted, so that fragments of one parent
            // are checked and counted one at a time
            let mut slot = handle.lock().unwrap();
            if !self.table.read().unwrap().is_outstanding(&fragment.parent) {
                debug!(parent = ?fragment.parent, "coded want expired");
                admission.dropped.push(fragment);
                continue;
            }
            let payload = match fragment.payload() {
                Ok(payload) => payload,
                Err(err) => {
                    debug!(?err, key = ?fragment.key, "malformed fragment");
                    admission.rejected.push(fragment);
                    continue;
                }
            };
            match slot.offer(&payload) {
                Ok(true) => {}
                Ok(false) => {
                    debug!(key = ?fragment.key, "linearly dependent fragment");
                    admission.rejected.push(fragment);
                    continue;
                }
                Err(err) => {
                    debug!(?err, key = ?fragment.key, "decoder refused fragment");
                    admission.rejected.push(fragment);
                    continue;
                }
            }

            let mut table = self.table.write().unwrap();
            let current = self
                .decoders
                .lock()
                .unwrap()
                .is_current(&fragment.parent, &handle);
            if !current || !table.is_outstanding(&fragment.parent) {
                debug!(parent = ?fragment.parent, "coded want ended while decoding");
                admission.dropped.push(fragment);
                continue;
            }
            if table.satisfy(&fragment.parent) {
                debug!(
                    parent = ?fragment.parent,
                    rank = slot.rank(),
                    complete = slot.is_complete(),
                    admitted = slot.admitted(),
                    redundant = slot.redundant(),
                    "coded want satisfied"
                );
                admission.satisfied.push(fragment.parent.clone());
                satisfied.push((fragment.parent.clone(), handle.clone()));
            }
            self.metrics.outstanding.set(table.len_outstanding() as i64);
            admission.admitted.push(fragment);
        }

        // A want recorded since satisfaction replaced the decoder, which is kept
        if !satisfied.is_empty() {
            let mut decoders = self.decoders.lock().unwrap();
            for (parent, handle) in &satisfied {
                decoders.retire_current(parent, handle);
            }
            self.metrics.decoders.set(decoders.len() as i64);
        }

        self.metrics
            .record_fragments(Outcome::Admitted, admission.admitted.len());
        self.metrics
            .record_fragments(Outcome::Rejected, admission.rejected.len());
        self.metrics
            .record_fragments(Outcome::Dropped, admission.dropped.len());
        admission
    }

    /// Returns every session interested in any key of an incoming message.
    ///
    /// A session is interested if it wants, listens for, or awaits fragments of a key.
    pub fn interested_sessions(
        &self,
        blocks: &[K],
        haves: &[K],
        dont_haves: &[K],
        coded: &HashMap<K, usize>,
    ) -> BTreeSet<Session> {
        let table = self.table.read().unwrap();
        blocks
            .iter()
            .chain(haves)
            .chain(dont_haves)
            .chain(coded.keys())
            .flat_map(|key| table.sessions(key))
            .collect()
    }

    /// Returns true if a decoder exists for the parent.
    pub fn has_decoder(&self, parent: &K) -> bool {
        self.decoders.lock().unwrap().contains(parent)
    }

    /// Returns true if some session still needs fragments for the parent.
    pub fn is_coded_interest(&self, parent: &K) -> bool {
        self.table.read().unwrap().is_outstanding(parent)
    }

    /// Retires the decoder of every parent whose coded want ended, and returns the
    /// keys nobody is interested in any more.
    fn retire(&self, table: &Table<K>, released: Released<K>) -> Vec<K> {
        if !released.parents.is_empty() {
            let mut decoders = self.decoders.lock().unwrap();
            for parent in &released.parents {
                decoders.retire(parent);
            }
            self.metrics.decoders.set(decoders.len() as i64);
        }
        self.metrics.keys.set(table.len() as i64);
        self.metrics.outstanding.set(table.len_outstanding() as i64);
        released.keys
    }
}
