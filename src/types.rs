//! Bucket, bounding box and query descriptor types shared by the cache.
use geo::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Nested term breakdown of a bucket: term value -> document count.
pub type TermCounts = BTreeMap<String, u64>;

/// One geohash-grid aggregation cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeohashBucket {
    pub key: String,
    pub doc_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_aggregations: Option<TermCounts>,
}

impl GeohashBucket {
    pub fn new(key: impl Into<String>, doc_count: u64) -> Self {
        Self {
            key: key.into(),
            doc_count,
            sub_aggregations: None,
        }
    }

    pub fn with_terms(mut self, terms: TermCounts) -> Self {
        self.sub_aggregations = Some(terms);
        self
    }

    /// Geohash precision of this bucket, i.e. the key length.
    pub fn precision(&self) -> usize {
        self.key.len()
    }

    /// Fold the partial counts of another response for the same cell into this one.
    ///
    /// A cell that straddles a tile edge is reported by every tile it touches,
    /// each with the documents that fell inside that tile.
    pub fn merge(&mut self, other: GeohashBucket) {
        debug_assert_eq!(self.key, other.key);
        self.doc_count += other.doc_count;
        if let Some(theirs) = other.sub_aggregations {
            let mine = self.sub_aggregations.get_or_insert_with(TermCounts::new);
            for (term, count) in theirs {
                *mine.entry(term).or_insert(0) += count;
            }
        }
    }
}

/// A geographic bounding box in degrees.
///
/// `min_lon > max_lon` is allowed and denotes a box that crosses the
/// antimeridian (e.g. `170 .. -170`). Latitudes never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub const WORLD: BoundingBox = BoundingBox {
        min_lon: -180.0,
        min_lat: -90.0,
        max_lon: 180.0,
        max_lat: 90.0,
    };

    pub const fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.min_lon, self.min_lat, self.max_lon, self.max_lat]
            .iter()
            .all(|v| v.is_finite())
    }

    pub fn crosses_antimeridian(&self) -> bool {
        self.min_lon > self.max_lon
    }

    pub fn width(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.max_lon + 360.0 - self.min_lon
        } else {
            self.max_lon - self.min_lon
        }
    }

    pub fn height(&self) -> f64 {
        self.max_lat - self.min_lat
    }

    /// Closed containment test that honours antimeridian crossing.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lat < self.min_lat || lat > self.max_lat {
            return false;
        }
        if self.crosses_antimeridian() {
            lon >= self.min_lon || lon <= self.max_lon
        } else {
            lon >= self.min_lon && lon <= self.max_lon
        }
    }

    /// Planar rectangle for a box that does not cross the antimeridian.
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            geo::coord! { x: self.min_lon, y: self.min_lat },
            geo::coord! { x: self.max_lon, y: self.max_lat },
        )
    }
}

impl From<Rect<f64>> for BoundingBox {
    fn from(rect: Rect<f64>) -> Self {
        Self::new(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{},{},{},{}]",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}

/// Top-level predicate of a translated aggregation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryFilter {
    /// The trivial "match everything" predicate.
    #[default]
    MatchAll,
    /// Any caller-supplied restriction.
    Restricted,
}

/// What the query-translation layer knows about an aggregation request.
///
/// Read by [`AggregationCache::supports_query`](crate::AggregationCache::supports_query)
/// to decide whether the cache can answer it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QueryCapabilityDescriptor {
    /// Number of geohash-grid aggregations in the request.
    pub geohash_grids: usize,
    /// Precision of the geohash grid, if one was given explicitly.
    pub precision: Option<u8>,
    /// Whether another aggregation is nested under the grid.
    pub nested_aggregation: bool,
    pub filter: QueryFilter,
}

impl QueryCapabilityDescriptor {
    /// A single unfiltered geohash grid at `precision`.
    pub fn geohash_grid(precision: u8) -> Self {
        Self {
            geohash_grids: 1,
            precision: Some(precision),
            nested_aggregation: false,
            filter: QueryFilter::MatchAll,
        }
    }

    pub fn with_nested_aggregation(mut self) -> Self {
        self.nested_aggregation = true;
        self
    }

    pub fn with_filter(mut self, filter: QueryFilter) -> Self {
        self.filter = filter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_merge_sums_counts() {
        let mut terms = TermCounts::new();
        terms.insert("lte".to_string(), 3);
        let mut bucket = GeohashBucket::new("u4pr", 3).with_terms(terms);

        let mut other_terms = TermCounts::new();
        other_terms.insert("lte".to_string(), 1);
        other_terms.insert("gsm".to_string(), 2);
        bucket.merge(GeohashBucket::new("u4pr", 3).with_terms(other_terms));

        assert_eq!(bucket.doc_count, 6);
        let terms = bucket.sub_aggregations.unwrap();
        assert_eq!(terms["lte"], 4);
        assert_eq!(terms["gsm"], 2);
    }

    #[test]
    fn test_bucket_merge_without_terms() {
        let mut bucket = GeohashBucket::new("9q8y", 10);
        bucket.merge(GeohashBucket::new("9q8y", 5));
        assert_eq!(bucket.doc_count, 15);
        assert!(bucket.sub_aggregations.is_none());
    }

    #[test]
    fn test_bucket_deserializes_engine_shape() {
        let bucket: GeohashBucket =
            serde_json::from_str(r#"{"key":"dr5r","doc_count":42}"#).unwrap();
        assert_eq!(bucket.key, "dr5r");
        assert_eq!(bucket.doc_count, 42);
        assert_eq!(bucket.precision(), 4);
        assert!(bucket.sub_aggregations.is_none());
    }

    #[test]
    fn test_bbox_contains_across_antimeridian() {
        let bbox = BoundingBox::new(170.0, -10.0, -170.0, 10.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains(175.0, 0.0));
        assert!(bbox.contains(-175.0, 0.0));
        assert!(!bbox.contains(0.0, 0.0));
        assert!(!bbox.contains(175.0, 20.0));
        assert!((bbox.width() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_bbox_rect_round_trip() {
        let bbox = BoundingBox::new(-74.05, 40.68, -73.91, 40.88);
        assert_eq!(BoundingBox::from(bbox.to_rect()), bbox);
        assert_eq!(bbox.to_string(), "[-74.05,40.68,-73.91,40.88]");
    }

    #[test]
    fn test_descriptor_builder() {
        let descriptor = QueryCapabilityDescriptor::geohash_grid(5)
            .with_nested_aggregation()
            .with_filter(QueryFilter::Restricted);
        assert_eq!(descriptor.geohash_grids, 1);
        assert_eq!(descriptor.precision, Some(5));
        assert!(descriptor.nested_aggregation);
        assert_eq!(descriptor.filter, QueryFilter::Restricted);
    }
}
