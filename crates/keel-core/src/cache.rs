//! In-memory cache of folded aggregate state.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use crate::aggregate::Aggregate;
use crate::stream::StreamId;

/// Concurrent map from stream id to folded state and its version.
///
/// Entries are cloned on the way in and on the way out, so callers never
/// share state. The cache only ever lowers cost: a missing or evicted entry
/// makes the pipeline fold the full stream instead.
pub struct AggregateCache<A> {
    entries: RwLock<HashMap<StreamId, (A, u64)>>,
}

impl<A: Aggregate> AggregateCache<A> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a copy of the cached state and version for `stream_id`.
    #[must_use]
    pub fn get(&self, stream_id: &StreamId) -> Option<(A, u64)> {
        let entries = self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.get(stream_id).cloned()
    }

    /// Stores a copy of `state` at `version`, unless a newer version is
    /// already cached.
    pub fn put(&self, stream_id: &StreamId, state: &A, version: u64) {
        let mut entries = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        match entries.get(stream_id) {
            Some((_, cached)) if *cached > version => {}
            _ => {
                entries.insert(stream_id.clone(), (state.clone(), version));
            }
        }
    }

    /// Drops the entry for `stream_id`.
    pub fn invalidate(&self, stream_id: &StreamId) {
        let mut entries = self.entries.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.remove(stream_id);
    }

    /// Number of cached streams.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(std::sync::PoisonError::into_inner).len()
    }

    /// Returns `true` if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<A: Aggregate> Default for AggregateCache<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A> fmt::Debug for AggregateCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateCache").finish_non_exhaustive()
    }
}
