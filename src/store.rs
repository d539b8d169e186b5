//! Precision -> index map with whole-index publication.
//!
//! Indexes are published as `Arc`s. The lock only guards cloning or swapping
//! those pointers, so readers search their own snapshot without holding it
//! and always see either the previous or the new complete index.

use crate::index::PrecisionIndex;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct BucketStore {
    indexes: RwLock<FxHashMap<u8, Arc<PrecisionIndex>>>,
}

impl BucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current index for `precision`, if one has been published.
    pub fn get(&self, precision: u8) -> Option<Arc<PrecisionIndex>> {
        self.indexes.read().get(&precision).cloned()
    }

    pub fn contains(&self, precision: u8) -> bool {
        self.indexes.read().contains_key(&precision)
    }

    /// Publish a complete index, returning the one it replaces.
    pub fn publish(&self, index: PrecisionIndex) -> Option<Arc<PrecisionIndex>> {
        let precision = index.precision();
        self.indexes.write().insert(precision, Arc::new(index))
    }

    /// Published precisions in ascending order.
    pub fn precisions(&self) -> Vec<u8> {
        let mut precisions: Vec<u8> = self.indexes.read().keys().copied().collect();
        precisions.sort_unstable();
        precisions
    }

    /// Every published index, ordered by precision.
    pub fn snapshot(&self) -> Vec<Arc<PrecisionIndex>> {
        let mut indexes: Vec<Arc<PrecisionIndex>> = self.indexes.read().values().cloned().collect();
        indexes.sort_unstable_by_key(|index| index.precision());
        indexes
    }

    pub fn len(&self) -> usize {
        self.indexes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.read().is_empty()
    }
}
