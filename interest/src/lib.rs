//! Track which sessions want which blocks and reconcile arriving blocks against them.
//!
//! Many sessions (one per high-level fetch, such as a DAG traversal) run at once and
//! want overlapping sets of blocks. The [Engine] records, for every key, which sessions
//! still care about it, so that arriving blocks and peer notifications can be routed
//! to exactly the sessions that asked for them.
//!
//! # Plain and Coded Interest
//!
//! Plain interest names an exact block. A session either actively wants it or, once the
//! block has been received, only listens for protocol signals about it (for example, that
//! a peer has it). Listening keeps the key routable without treating the payload as wanted.
//!
//! Coded interest names a parent object delivered as interchangeable linearly coded
//! fragments. A session asks for a number of fragments, and every fragment that raises
//! the rank of the parent's decoder (see [blockswap_coding::Decoder]) counts towards all
//! sessions waiting on that parent. Fragments that do not raise the rank are rejected as
//! redundant.
//!
//! # Lifecycle
//!
//! Decoders are created by the first coded want for a parent and retired as soon as no
//! session awaits fragments of that parent, whether or not plain interest in it remains.
//! Retirement happens on the release paths ([Engine::remove_session],
//! [Engine::remove_session_interested]) and at the end of a coded admission batch that
//! satisfied the last outstanding want. A later coded want starts a fresh decoder.

use std::{fmt, hash::Hash};

pub mod block;
pub use block::{Block, Fragment, Plain};

mod config;
pub use config::Config;

mod decoders;
pub use decoders::Admission;

mod engine;
pub use engine::{Engine, Split};

mod metrics;

mod table;

#[cfg(test)]
pub mod mocks;

/// Used as the key to uniquely identify blocks and coded parents.
pub trait Key: Clone + fmt::Debug + Eq + Hash + Ord + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Eq + Hash + Ord + Send + Sync + 'static> Key for T {}

/// Identifies one logical fetch operation for its lifetime.
///
/// Sessions are allocated by the caller. The [Engine] only records and forgets
/// interest under them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Session(pub u64);

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Session({})", self.0)
    }
}

impl From<u64> for Session {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
