//! Boundary to the engine that computes geohash-grid aggregations.
//!
//! The cache only talks to the source while building a precision. Anything
//! that can answer an [`AggregationRequest`] in one call can back the cache:
//! a client for a search engine, a closure wrapped with [`from_fn`], or the
//! [`MemorySource`] below. Sources can be passed by reference, boxed (also as
//! `Box<dyn AggregationSource>`) or shared behind an `Arc`.

use crate::codec;
use crate::types::{BoundingBox, GeohashBucket};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Failure reported by an aggregation source.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// One geohash-grid aggregation call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregationRequest {
    pub precision: u8,
    /// Restrict the aggregation to this region; `None` means the whole world.
    pub region: Option<BoundingBox>,
    /// Attach the nested term breakdown to every bucket.
    pub nested_terms: bool,
}

impl AggregationRequest {
    pub fn new(precision: u8) -> Self {
        Self {
            precision,
            region: None,
            nested_terms: false,
        }
    }

    pub fn with_region(mut self, region: BoundingBox) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_nested_terms(mut self, nested_terms: bool) -> Self {
        self.nested_terms = nested_terms;
        self
    }

    /// Whether a document at `(lon, lat)` falls in the requested region.
    ///
    /// Regions are half-open on their east and north edges unless that edge
    /// is the edge of the world, matching the tiles the cache generates.
    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        let Some(region) = self.region else {
            return true;
        };
        let world = BoundingBox::WORLD;
        let in_lon = lon >= region.min_lon
            && (lon < region.max_lon || (region.max_lon >= world.max_lon && lon <= region.max_lon));
        let in_lat = lat >= region.min_lat
            && (lat < region.max_lat || (region.max_lat >= world.max_lat && lat <= region.max_lat));
        in_lon && in_lat
    }
}

/// Supplier of raw geohash-grid buckets.
///
/// Every matching bucket must come back from a single call. Timeouts and
/// retries are the implementation's concern; an `Err` aborts the precision
/// being built.
pub trait AggregationSource {
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError>;
}

impl<T: AggregationSource + ?Sized> AggregationSource for &T {
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError> {
        (**self).aggregate(request)
    }
}

impl<T: AggregationSource + ?Sized> AggregationSource for Box<T> {
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError> {
        (**self).aggregate(request)
    }
}

impl<T: AggregationSource + ?Sized> AggregationSource for Arc<T> {
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError> {
        (**self).aggregate(request)
    }
}

/// Source backed by a closure. Created with [`from_fn`].
#[derive(Clone)]
pub struct FnSource<F>(F);

impl<F> std::fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}

impl<F> AggregationSource for FnSource<F>
where
    F: Fn(&AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError>,
{
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError> {
        (self.0)(request)
    }
}

/// Turn a closure into an [`AggregationSource`].
///
/// ```rust
/// use gridcache::source::{self, AggregationSource};
/// use gridcache::{AggregationRequest, GeohashBucket};
///
/// let source = source::from_fn(|request| {
///     Ok(vec![GeohashBucket::new("s000", u64::from(request.precision))])
/// });
/// assert_eq!(source.aggregate(&AggregationRequest::new(4))?.len(), 1);
/// # Ok::<(), gridcache::SourceError>(())
/// ```
pub fn from_fn<F>(f: F) -> FnSource<F>
where
    F: Fn(&AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError>,
{
    FnSource(f)
}

/// In-process source holding pre-aggregated buckets per precision.
///
/// Region requests are answered by decoding each key and keeping the buckets
/// whose centroid the request covers. Keys that do not decode are returned for
/// every request, so that corrupt data reaches the cache instead of being
/// silently dropped here.
#[derive(Debug, Default)]
pub struct MemorySource {
    buckets: RwLock<FxHashMap<u8, Vec<GeohashBucket>>>,
    calls: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_buckets(self, precision: u8, buckets: Vec<GeohashBucket>) -> Self {
        self.buckets.write().entry(precision).or_default().extend(buckets);
        self
    }

    pub fn insert(&self, precision: u8, bucket: GeohashBucket) {
        self.buckets.write().entry(precision).or_default().push(bucket);
    }

    /// Number of `aggregate` calls served so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl AggregationSource for MemorySource {
    fn aggregate(&self, request: &AggregationRequest) -> Result<Vec<GeohashBucket>, SourceError> {
        self.calls.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.read();
        let Some(stored) = buckets.get(&request.precision) else {
            return Ok(Vec::new());
        };

        Ok(stored
            .iter()
            .filter(|bucket| match codec::decode(&bucket.key) {
                Ok((lat, lon)) => request.covers(lon, lat),
                Err(_) => true,
            })
            .map(|bucket| {
                let mut bucket = bucket.clone();
                if !request.nested_terms {
                    bucket.sub_aggregations = None;
                }
                bucket
            })
            .collect())
    }
}
