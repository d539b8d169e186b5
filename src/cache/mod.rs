//! The aggregation cache.
//!
//! This module defines [`AggregationCache`], which owns one [`BucketStore`]
//! and wires together initialization, query service and the cacheability
//! policy implemented in its submodules.

use crate::config::Config;
use crate::error::{GridCacheError, Result};
use crate::index::TreeProfile;
use crate::store::BucketStore;

mod init;
mod policy;
mod query;

pub use policy::Rejection;
pub use query::BucketSnapshot;

/// Pre-computed geohash-grid aggregations at several precisions.
///
/// # Lifecycle
///
/// 1. Construct with [`AggregationCache::new`] or [`AggregationCache::with_config`].
/// 2. Call [`initialize`](AggregationCache::initialize) once to fetch and
///    index every configured precision. Calling it again rebuilds them all.
/// 3. Gate each incoming aggregation with
///    [`supports_query`](AggregationCache::supports_query) and answer the
///    accepted ones with [`get_buckets`](AggregationCache::get_buckets).
///
/// # Thread Safety
///
/// `AggregationCache` is `Send + Sync`. Queries may run from any number of
/// threads; each one searches an immutable snapshot of its precision's index.
/// Builds must not run concurrently with each other.
///
/// # Examples
///
/// ```rust
/// use gridcache::{AggregationCache, BoundingBox, GeohashBucket, MemorySource};
/// use gridcache::QueryCapabilityDescriptor;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MemorySource::new()
///     .with_buckets(4, vec![GeohashBucket::new("dr5r", 120), GeohashBucket::new("u09t", 80)]);
///
/// let cache = AggregationCache::new();
/// cache.initialize(&source)?;
///
/// let query = QueryCapabilityDescriptor::geohash_grid(4);
/// assert!(cache.supports_query(&query));
///
/// let new_york = BoundingBox::new(-75.0, 40.0, -73.0, 41.5);
/// let buckets = cache.get_buckets(4, &new_york)?;
/// assert_eq!(buckets.len(), 1);
/// assert_eq!(buckets[0].doc_count, 120);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AggregationCache {
    config: Config,
    store: BucketStore,
}

/// Size of one published precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrecisionStats {
    pub precision: u8,
    pub buckets: usize,
    pub documents: u64,
    pub profile: TreeProfile,
}

/// Point-in-time view of what the cache holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub precisions: Vec<PrecisionStats>,
}

impl CacheStats {
    pub fn total_buckets(&self) -> usize {
        self.precisions.iter().map(|p| p.buckets).sum()
    }

    pub fn precision(&self, precision: u8) -> Option<&PrecisionStats> {
        self.precisions.iter().find(|p| p.precision == precision)
    }
}

impl AggregationCache {
    /// Empty cache with the default configuration.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            store: BucketStore::new(),
        }
    }

    /// Empty cache with a validated configuration.
    pub fn with_config(config: Config) -> Result<Self> {
        config.validate().map_err(GridCacheError::InvalidConfig)?;
        Ok(Self {
            config,
            store: BucketStore::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Precisions that currently have a published index.
    pub fn cached_precisions(&self) -> Vec<u8> {
        self.store.precisions()
    }

    pub fn is_initialized(&self) -> bool {
        self.config
            .precisions
            .iter()
            .all(|plan| self.store.contains(plan.precision))
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            precisions: self
                .store
                .snapshot()
                .iter()
                .map(|index| PrecisionStats {
                    precision: index.precision(),
                    buckets: index.len(),
                    documents: index.doc_count(),
                    profile: index.profile(),
                })
                .collect(),
        }
    }
}

impl Default for AggregationCache {
    fn default() -> Self {
        Self::new()
    }
}
