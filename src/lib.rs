//! Multi-precision cache of geohash-grid aggregations.
//!
//! ## Features
//! - **Per-precision R*-tree indexes** over bucket centroids, bulk loaded and immutable
//! - **Tiled initialization** against any [`AggregationSource`], with cells
//!   spanning tile edges merged back together
//! - **Antimeridian-aware** bounding-box queries
//! - **Cacheability policy** deciding which aggregations the cache may answer
//!
//! ```rust
//! use gridcache::{AggregationCache, BoundingBox, GeohashBucket, MemorySource};
//!
//! let source = MemorySource::new().with_buckets(
//!     4,
//!     vec![GeohashBucket::new("rypx", 12), GeohashBucket::new("2n0r", 9)],
//! );
//! let cache = AggregationCache::new();
//! cache.initialize(&source)?;
//!
//! // Both cells sit on either side of the date line.
//! let pacific = BoundingBox::new(170.0, -20.0, -170.0, 0.0);
//! assert_eq!(cache.get_buckets(4, &pacific)?.len(), 2);
//! # Ok::<(), gridcache::GridCacheError>(())
//! ```

pub mod cache;
pub mod codec;
pub mod config;
pub mod error;
pub mod index;
pub mod source;
pub mod store;
pub mod tiling;
pub mod types;

pub use cache::{AggregationCache, BucketSnapshot, CacheStats, PrecisionStats, Rejection};
pub use config::{Config, PrecisionPlan, TileSize};
pub use error::{DecodeError, DecodeFailure, GridCacheError, Result};
pub use index::{IndexedBucket, PrecisionIndex, TreeProfile};
pub use source::{
    AggregationRequest, AggregationSource, FnSource, MemorySource, SourceError, from_fn,
};
pub use store::BucketStore;
pub use tiling::{Tile, TileGrid};
pub use types::{BoundingBox, GeohashBucket, QueryCapabilityDescriptor, QueryFilter, TermCounts};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports
pub mod prelude {

    pub use crate::{AggregationCache, GridCacheError, Result};

    pub use crate::{AggregationRequest, AggregationSource, MemorySource};

    pub use crate::{BoundingBox, GeohashBucket, QueryCapabilityDescriptor, QueryFilter};

    pub use crate::{Config, PrecisionPlan, TileSize};
}
