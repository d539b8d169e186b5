//! Bounding-box queries against the published indexes.
//!
//! ## Antimeridian handling
//!
//! A map viewport that crosses the date line arrives either inverted
//! (`min_lon > max_lon`, e.g. `170 .. -170`) or unwrapped (`170 .. 190`).
//! Both are turned into at most two planar windows:
//!
//! - a direct span of (nearly) 360 degrees or more becomes the full circle;
//! - out-of-range longitudes are wrapped into `[-180, 180]`;
//! - a box whose both longitudes sit on the antimeridian (`180 .. -180`,
//!   `-180 .. -180`, `180 .. 180`) is the full circle rather than an empty
//!   sliver, as is an inverted box that wraps all the way around;
//! - any other inverted box is split into `[min, 180]` and `[-180, max]`.

use super::AggregationCache;
use crate::error::{GridCacheError, Result};
use crate::index::{IndexedBucket, PrecisionIndex};
use crate::types::{BoundingBox, GeohashBucket};
use geo::Rect;
use smallvec::{SmallVec, smallvec};
use std::sync::Arc;

/// Longitude slack, in degrees, when deciding that a box spans the whole circle.
const FULL_CIRCLE_EPSILON: f64 = 1e-9;

pub(crate) type QueryWindows = SmallVec<[Rect<f64>; 2]>;

fn window(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Rect<f64> {
    Rect::new(
        geo::coord! { x: min_lon, y: min_lat },
        geo::coord! { x: max_lon, y: max_lat },
    )
}

fn wrap_longitude(lon: f64) -> f64 {
    if (-180.0..=180.0).contains(&lon) {
        lon
    } else {
        (lon + 180.0).rem_euclid(360.0) - 180.0
    }
}

fn on_antimeridian(lon: f64) -> bool {
    (lon.abs() - 180.0).abs() <= FULL_CIRCLE_EPSILON
}

/// Planar search windows equivalent to `bbox` on the sphere.
pub(crate) fn query_windows(bbox: &BoundingBox) -> Result<QueryWindows> {
    if !bbox.is_finite() {
        return Err(GridCacheError::InvalidBoundingBox(format!(
            "non-finite coordinates in {bbox}"
        )));
    }

    let (mut min_lat, mut max_lat) = (bbox.min_lat, bbox.max_lat);
    if min_lat > max_lat {
        std::mem::swap(&mut min_lat, &mut max_lat);
    }
    let min_lat = min_lat.clamp(-90.0, 90.0);
    let max_lat = max_lat.clamp(-90.0, 90.0);

    let full = || -> QueryWindows { smallvec![window(-180.0, min_lat, 180.0, max_lat)] };

    if bbox.max_lon - bbox.min_lon >= 360.0 - FULL_CIRCLE_EPSILON {
        return Ok(full());
    }

    let min_lon = wrap_longitude(bbox.min_lon);
    let max_lon = wrap_longitude(bbox.max_lon);

    if on_antimeridian(min_lon) && on_antimeridian(max_lon) {
        return Ok(full());
    }

    if min_lon <= max_lon {
        return Ok(smallvec![window(min_lon, min_lat, max_lon, max_lat)]);
    }

    if max_lon + 360.0 - min_lon >= 360.0 - FULL_CIRCLE_EPSILON {
        return Ok(full());
    }

    Ok(smallvec![
        window(min_lon, min_lat, 180.0, max_lat),
        window(-180.0, min_lat, max_lon, max_lat),
    ])
}

/// Lazily searchable view of one query over a pinned index snapshot.
///
/// The snapshot is unaffected by later rebuilds of the same precision.
#[derive(Debug, Clone)]
pub struct BucketSnapshot {
    index: Arc<PrecisionIndex>,
    windows: QueryWindows,
}

impl BucketSnapshot {
    /// Matching buckets. Each call starts a fresh traversal.
    pub fn iter(&self) -> impl Iterator<Item = &GeohashBucket> + '_ {
        self.windows
            .iter()
            .flat_map(move |w| self.index.search(*w))
            .map(IndexedBucket::bucket)
    }

    pub fn precision(&self) -> u8 {
        self.index.precision()
    }

    /// Planar windows the query was split into (one or two).
    pub fn windows(&self) -> &[Rect<f64>] {
        &self.windows
    }
}

impl AggregationCache {
    /// Start a query for `bbox` at `precision` without materializing results.
    pub fn search(&self, precision: u8, bbox: &BoundingBox) -> Result<BucketSnapshot> {
        let Some(index) = self.store.get(precision) else {
            log::error!(
                "Bucket query for precision {} which is not cached; check supports_query first",
                precision
            );
            return Err(GridCacheError::PrecisionNotCached(precision));
        };
        let windows = query_windows(bbox)?;
        if windows.len() > 1 {
            log::debug!("Split antimeridian query {} into {:?}", bbox, windows);
        }
        Ok(BucketSnapshot { index, windows })
    }

    /// All cached buckets at `precision` whose centroid lies inside `bbox`.
    ///
    /// Result order is unspecified.
    pub fn get_buckets(&self, precision: u8, bbox: &BoundingBox) -> Result<Vec<GeohashBucket>> {
        let snapshot = self.search(precision, bbox)?;
        let buckets: Vec<GeohashBucket> = snapshot.iter().cloned().collect();
        log::debug!(
            "Found {} buckets at precision {} for {}",
            buckets.len(),
            precision,
            bbox
        );
        Ok(buckets)
    }

    /// Total document count over the buckets `get_buckets` would return.
    pub fn count(&self, precision: u8, bbox: &BoundingBox) -> Result<u64> {
        Ok(self.search(precision, bbox)?.iter().map(|b| b.doc_count).sum())
    }
}
