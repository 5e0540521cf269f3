//! Claim registry
//!
//! Tracks identifiers that may be handed out only once, such as destination
//! cells bound to a parser. Each grammar owns its own registry.

use std::collections::HashSet;
use std::hash::Hash;

#[derive(Debug, Clone, Default)]
pub struct Registry<K> {
    claimed: HashSet<K>,
}

impl<K: Eq + Hash> Registry<K> {
    pub fn new() -> Self {
        Self {
            claimed: HashSet::new(),
        }
    }

    /// Claim `key`. Returns false if it was already claimed.
    pub fn claim(&mut self, key: K) -> bool {
        self.claimed.insert(key)
    }

    /// Number of claimed keys
    pub(crate) fn len(&self) -> usize {
        self.claimed.len()
    }
}
