//! Interest: which sessions want, listen for, or await fragments of which keys.

use crate::{Key, Session};
use std::collections::HashMap;
use tracing::debug;

/// Keys and parents released by a session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Released<K> {
    /// Keys no session has any interest in any more (sorted, deduplicated).
    pub keys: Vec<K>,

    /// Parents whose last outstanding coded want was removed.
    pub parents: Vec<K>,
}

/// Maps every key to the sessions interested in it.
///
/// Plain interest maps a session to `true` while it still wants the block, and to
/// `false` once it has received the block but still wants protocol messages about it
/// (peers that have the block may have other blocks the session needs).
///
/// Coded interest maps a session to the number of independent fragments of a parent
/// it still needs. Counts are always positive: a session reaching zero is removed.
///
/// A key with no interested sessions is never stored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Table<K: Key> {
    wants: HashMap<K, HashMap<Session, bool>>,
    coded: HashMap<K, HashMap<Session, usize>>,
}

impl<K: Key> Table<K> {
    /// Creates an empty table.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self {
            wants: HashMap::new(),
            coded: HashMap::new(),
        }
    }

    /// Marks every key as actively wanted by the session.
    pub fn record(&mut self, session: Session, keys: &[K]) {
        for key in keys {
            self.wants
                .entry(key.clone())
                .or_default()
                .insert(session, true);
        }
    }

    /// Adds `count` to the number of fragments the session needs for `parent`.
    ///
    /// Returns true if the parent had no outstanding coded want before. A `count` of
    /// zero is ignored.
    pub fn record_coded(&mut self, session: Session, parent: &K, count: usize) -> bool {
        if count == 0 {
            debug!(%session, ?parent, "ignoring empty coded want");
            return false;
        }
        let created = !self.coded.contains_key(parent);
        *self
            .coded
            .entry(parent.clone())
            .or_default()
            .entry(session)
            .or_insert(0) += count;
        created
    }

    /// Moves the session from wanting to listening for every key it wanted.
    ///
    /// Keys the session never recorded are ignored.
    pub fn weaken(&mut self, session: Session, keys: &[K]) {
        for key in keys {
            if let Some(wanted) = self
                .wants
                .get_mut(key)
                .and_then(|sessions| sessions.get_mut(&session))
            {
                *wanted = false;
            }
        }
    }

    /// Counts one independent fragment of `parent` towards every session awaiting it.
    ///
    /// Returns true if this satisfied the last outstanding coded want for the parent.
    pub fn satisfy(&mut self, parent: &K) -> bool {
        let Some(sessions) = self.coded.get_mut(parent) else {
            return false;
        };
        sessions.retain(|_, remaining| {
            *remaining -= 1;
            *remaining > 0
        });
        if !sessions.is_empty() {
            return false;
        }
        self.coded.remove(parent);
        true
    }

    /// Removes the session from every key and parent.
    pub fn release_session(&mut self, session: Session) -> Released<K> {
        let mut keys = Vec::new();
        self.wants.retain(|key, sessions| {
            if sessions.remove(&session).is_some() && sessions.is_empty() {
                keys.push(key.clone());
                return false;
            }
            true
        });
        let mut parents = Vec::new();
        self.coded.retain(|parent, sessions| {
            if sessions.remove(&session).is_some() && sessions.is_empty() {
                parents.push(parent.clone());
                return false;
            }
            true
        });
        self.settle(keys, parents)
    }

    /// Removes the session from the given keys and parents only.
    pub fn release(&mut self, session: Session, keys: &[K]) -> Released<K> {
        let mut emptied = Vec::new();
        let mut parents = Vec::new();
        for key in keys {
            if let Some(sessions) = self.wants.get_mut(key) {
                if sessions.remove(&session).is_some() && sessions.is_empty() {
                    self.wants.remove(key);
                    emptied.push(key.clone());
                }
            }
            if let Some(sessions) = self.coded.get_mut(key) {
                if sessions.remove(&session).is_some() && sessions.is_empty() {
                    self.coded.remove(key);
                    parents.push(key.clone());
                }
            }
        }
        self.settle(emptied, parents)
    }

    /// Keeps the emptied keys that are not still held by the other kind of interest.
    fn settle(&self, mut keys: Vec<K>, parents: Vec<K>) -> Released<K> {
        keys.extend(parents.iter().cloned());
        keys.sort();
        keys.dedup();
        keys.retain(|key| !self.contains(key));
        Released { keys, parents }
    }

    /// Returns true if the session wants, listens for, or awaits fragments of the key.
    pub fn is_interested(&self, session: Session, key: &K) -> bool {
        self.wants
            .get(key)
            .is_some_and(|sessions| sessions.contains_key(&session))
            || self
                .coded
                .get(key)
                .is_some_and(|sessions| sessions.contains_key(&session))
    }

    /// Returns true if at least one session still wants the key (not just listens).
    pub fn is_wanted(&self, key: &K) -> bool {
        self.wants
            .get(key)
            .is_some_and(|sessions| sessions.values().any(|wanted| *wanted))
    }

    /// Returns true if some session still needs fragments for the parent.
    pub fn is_outstanding(&self, parent: &K) -> bool {
        self.coded.contains_key(parent)
    }

    /// Returns true if any session has any interest in the key.
    pub fn contains(&self, key: &K) -> bool {
        self.wants.contains_key(key) || self.coded.contains_key(key)
    }

    /// Returns every session with any interest in the key.
    ///
    /// A session with both plain and coded interest is returned twice.
    pub fn sessions<'a>(&'a self, key: &K) -> impl Iterator<Item = Session> + 'a {
        let plain = self.wants.get(key).into_iter().flat_map(|s| s.keys());
        let coded = self.coded.get(key).into_iter().flat_map(|s| s.keys());
        plain.chain(coded).copied()
    }

    /// Returns the number of keys with plain interest.
    pub fn len(&self) -> usize {
        self.wants.len()
    }

    /// Returns the number of parents with outstanding coded wants.
    pub fn len_outstanding(&self) -> usize {
        self.coded.len()
    }

    /// Returns the number of fragments the session still needs for the parent.
    #[cfg(test)]
    pub fn remaining(&self, session: Session, parent: &K) -> Option<usize> {
        self.coded.get(parent)?.get(&session).copied()
    }

    /// Returns the plain state of every key the session is interested in.
    #[cfg(test)]
    pub fn entries(&self, session: Session) -> std::collections::BTreeMap<K, bool> {
        self.wants
            .iter()
            .filter_map(|(key, sessions)| sessions.get(&session).map(|w| (key.clone(), *w)))
            .collect()
    }
}
