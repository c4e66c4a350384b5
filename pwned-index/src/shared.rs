use std::sync::{Arc, PoisonError, RwLock};

use crate::HashIndex;

/// The index currently being served, replaceable as a whole.
///
/// A reload builds a complete new index and then swaps the reference; lookups already in
/// flight keep the index they started with alive through their own `Arc`. The lock is held
/// only long enough to clone or replace the `Arc`, never during a lookup.
#[derive(Clone)]
pub struct SharedIndex {
    current: Arc<RwLock<Arc<dyn HashIndex>>>,
}

impl SharedIndex {
    pub fn new(index: Arc<dyn HashIndex>) -> Self {
        Self { current: Arc::new(RwLock::new(index)) }
    }

    pub fn from_index<I: HashIndex + 'static>(index: I) -> Self {
        Self::new(Arc::new(index))
    }

    /// Snapshot of the current index.
    pub fn current(&self) -> Arc<dyn HashIndex> {
        // The guarded value is a plain Arc; a panic elsewhere cannot leave it half-written.
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Atomically replaces the served index and returns the previous one.
    pub fn swap(&self, index: Arc<dyn HashIndex>) -> Arc<dyn HashIndex> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SortedIndex;
    use crate::digest::sha1;

    #[test]
    fn test_swap_replaces_for_new_readers_only() {
        let old = SortedIndex::from_digests([sha1(b"password")]).unwrap();
        let new = SortedIndex::from_digests([sha1(b"qwerty"), sha1(b"dragon")]).unwrap();
        let shared = SharedIndex::from_index(old);

        let snapshot = shared.current();
        let previous = shared.swap(Arc::new(new));

        // in-flight reader still sees the old index
        assert!(snapshot.contains(&sha1(b"password")).unwrap());
        assert_eq!(previous.count(), 1);

        let current = shared.current();
        assert_eq!(current.count(), 2);
        assert!(!current.contains(&sha1(b"password")).unwrap());
        assert!(current.contains(&sha1(b"qwerty")).unwrap());
    }

    #[test]
    fn test_clones_share_the_slot() {
        let shared = SharedIndex::from_index(SortedIndex::from_digests([sha1(b"a")]).unwrap());
        let clone = shared.clone();
        shared.swap(Arc::new(SortedIndex::from_digests([sha1(b"b"), sha1(b"c")]).unwrap()));

        assert_eq!(clone.current().count(), 2);
    }
}
