//! Per-precision spatial index over bucket centroids.
//!
//! Each cached precision is held in an immutable R*-tree that is bulk loaded
//! once and never mutated afterwards. Range queries walk the tree lazily;
//! [`PrecisionIndex::add`] builds a fresh tree and leaves the receiver as it
//! was, so readers holding the old index keep a consistent snapshot.
//!
//! ## Node profiles
//!
//! The tree's fan-out is picked from the number of entries:
//!
//! - **Compact** (2..=6 children) for small grids, where a narrow tree keeps
//!   each node scan short.
//! - **Wide** (24..=64 children) once the grid reaches tens of thousands of
//!   cells. Cache queries usually return many buckets, and a lower tree
//!   means fewer node visits per result.

use crate::codec;
use crate::error::DecodeError;
use crate::types::GeohashBucket;
use geo::Rect;
use rstar::{AABB, RStarInsertionStrategy, RTree, RTreeObject, RTreeParams};

/// A bucket together with the decoded centroid of its cell.
///
/// The bucket is only reachable by shared reference, so its key always
/// matches the indexed centroid.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedBucket {
    bucket: GeohashBucket,
    lat: f64,
    lon: f64,
}

impl IndexedBucket {
    /// Pair a bucket with the centroid decoded from its key.
    pub fn from_bucket(bucket: GeohashBucket) -> Result<Self, DecodeError> {
        let (lat, lon) = codec::decode(&bucket.key)?;
        Ok(Self { bucket, lat, lon })
    }

    pub fn bucket(&self) -> &GeohashBucket {
        &self.bucket
    }

    /// `(latitude, longitude)` of the cell centroid.
    pub fn centroid(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }

    pub fn into_bucket(self) -> GeohashBucket {
        self.bucket
    }
}

impl RTreeObject for IndexedBucket {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point([self.lon, self.lat])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeProfile {
    Compact,
    Wide,
}

impl TreeProfile {
    pub fn for_len(len: usize, wide_threshold: usize) -> Self {
        if len >= wide_threshold {
            TreeProfile::Wide
        } else {
            TreeProfile::Compact
        }
    }

    pub fn min_children(self) -> usize {
        match self {
            TreeProfile::Compact => CompactParams::MIN_SIZE,
            TreeProfile::Wide => WideParams::MIN_SIZE,
        }
    }

    pub fn max_children(self) -> usize {
        match self {
            TreeProfile::Compact => CompactParams::MAX_SIZE,
            TreeProfile::Wide => WideParams::MAX_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CompactParams;

impl RTreeParams for CompactParams {
    const MIN_SIZE: usize = 2;
    const MAX_SIZE: usize = 6;
    const REINSERTION_COUNT: usize = 2;
    type DefaultInsertionStrategy = RStarInsertionStrategy;
}

#[derive(Debug, Clone, Copy)]
pub struct WideParams;

impl RTreeParams for WideParams {
    const MIN_SIZE: usize = 24;
    const MAX_SIZE: usize = 64;
    const REINSERTION_COUNT: usize = 12;
    type DefaultInsertionStrategy = RStarInsertionStrategy;
}

#[derive(Clone)]
enum BucketTree {
    Compact(RTree<IndexedBucket, CompactParams>),
    Wide(RTree<IndexedBucket, WideParams>),
}

impl BucketTree {
    fn bulk_load(profile: TreeProfile, entries: Vec<IndexedBucket>) -> Self {
        match profile {
            TreeProfile::Compact => BucketTree::Compact(RTree::bulk_load_with_params(entries)),
            TreeProfile::Wide => BucketTree::Wide(RTree::bulk_load_with_params(entries)),
        }
    }

    fn len(&self) -> usize {
        match self {
            BucketTree::Compact(tree) => tree.size(),
            BucketTree::Wide(tree) => tree.size(),
        }
    }

    fn iter(&self) -> Box<dyn Iterator<Item = &IndexedBucket> + '_> {
        match self {
            BucketTree::Compact(tree) => Box::new(tree.iter()),
            BucketTree::Wide(tree) => Box::new(tree.iter()),
        }
    }

    fn locate(&self, envelope: AABB<[f64; 2]>) -> Box<dyn Iterator<Item = &IndexedBucket> + '_> {
        match self {
            BucketTree::Compact(tree) => Box::new(tree.locate_in_envelope_intersecting(&envelope)),
            BucketTree::Wide(tree) => Box::new(tree.locate_in_envelope_intersecting(&envelope)),
        }
    }
}

/// Immutable spatial index holding every bucket of one precision.
#[derive(Clone)]
pub struct PrecisionIndex {
    precision: u8,
    tree: BucketTree,
    profile: TreeProfile,
    doc_count: u64,
    wide_threshold: usize,
}

impl PrecisionIndex {
    /// Bulk load an index from already decoded entries.
    pub fn build(precision: u8, entries: Vec<IndexedBucket>, wide_threshold: usize) -> Self {
        let profile = TreeProfile::for_len(entries.len(), wide_threshold);
        let doc_count = entries.iter().map(|e| e.bucket.doc_count).sum();
        Self {
            precision,
            tree: BucketTree::bulk_load(profile, entries),
            profile,
            doc_count,
            wide_threshold,
        }
    }

    /// Decode and bulk load raw buckets. Fails on the first malformed key.
    pub fn from_buckets<I>(
        precision: u8,
        buckets: I,
        wide_threshold: usize,
    ) -> Result<Self, DecodeError>
    where
        I: IntoIterator<Item = GeohashBucket>,
    {
        let entries = buckets
            .into_iter()
            .map(IndexedBucket::from_bucket)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::build(precision, entries, wide_threshold))
    }

    /// New index with `entries` added; `self` is left untouched.
    pub fn add(&self, entries: Vec<IndexedBucket>) -> Self {
        let mut all: Vec<IndexedBucket> = Vec::with_capacity(self.len() + entries.len());
        all.extend(self.tree.iter().cloned());
        all.extend(entries);
        Self::build(self.precision, all, self.wide_threshold)
    }

    /// Entries whose centroid lies inside `rect` (edges included).
    ///
    /// The returned iterator is lazy; every call starts a fresh traversal.
    pub fn search(&self, rect: Rect<f64>) -> Box<dyn Iterator<Item = &IndexedBucket> + '_> {
        let (min, max) = (rect.min(), rect.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            log::warn!("Rejecting bucket search with non-finite coordinates");
            return Box::new(std::iter::empty());
        }
        self.tree
            .locate(AABB::from_corners([min.x, min.y], [max.x, max.y]))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedBucket> + '_ {
        self.tree.iter()
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn profile(&self) -> TreeProfile {
        self.profile
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sum of document counts over all buckets.
    pub fn doc_count(&self) -> u64 {
        self.doc_count
    }
}

impl std::fmt::Debug for PrecisionIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrecisionIndex")
            .field("precision", &self.precision)
            .field("buckets", &self.len())
            .field("doc_count", &self.doc_count)
            .field("profile", &self.profile)
            .finish()
    }
}
