//! Cacheability policy: which aggregation requests the cache may answer.
//!
//! The cache holds aggregations over the entire indexed extent, so it can
//! only stand in for a request that asks for exactly that: a single geohash
//! grid, with no caller filter, at a precision that has been built, and with
//! a nested breakdown only where one was pre-computed.

use super::AggregationCache;
use crate::types::{QueryCapabilityDescriptor, QueryFilter};
use std::fmt;

/// Why a request has to go to the backing engine instead of the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Not exactly one geohash-grid aggregation.
    GridCount(usize),
    /// The grid has no explicit precision.
    MissingPrecision,
    /// Finer than the configured ceiling.
    AboveCeiling(u8),
    /// Within the ceiling but no index is published for it.
    NotCached(u8),
    /// The request restricts the documents being aggregated.
    Filtered,
    /// A nested breakdown finer than the nested-terms ceiling.
    NestedAboveCeiling(u8),
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::GridCount(n) => write!(f, "expected one geohash grid, found {n}"),
            Rejection::MissingPrecision => write!(f, "geohash grid has no precision"),
            Rejection::AboveCeiling(p) => write!(f, "precision {p} is above the cached ceiling"),
            Rejection::NotCached(p) => write!(f, "precision {p} has no cached index"),
            Rejection::Filtered => write!(f, "request carries a filter"),
            Rejection::NestedAboveCeiling(p) => {
                write!(f, "nested aggregation at precision {p} is not pre-computed")
            }
        }
    }
}

impl AggregationCache {
    /// Whether the request described by `descriptor` can be served from cache.
    ///
    /// `false` is not an error: the caller is expected to query the backing
    /// engine directly.
    pub fn supports_query(&self, descriptor: &QueryCapabilityDescriptor) -> bool {
        match self.rejection(descriptor) {
            None => true,
            Some(reason) => {
                log::debug!("Aggregation not served from cache: {}", reason);
                false
            }
        }
    }

    /// The first reason the cache cannot serve `descriptor`, if any.
    pub fn rejection(&self, descriptor: &QueryCapabilityDescriptor) -> Option<Rejection> {
        if descriptor.geohash_grids != 1 {
            return Some(Rejection::GridCount(descriptor.geohash_grids));
        }
        let Some(precision) = descriptor.precision else {
            return Some(Rejection::MissingPrecision);
        };
        if precision > self.config.max_cached_precision {
            return Some(Rejection::AboveCeiling(precision));
        }
        if descriptor.filter != QueryFilter::MatchAll {
            return Some(Rejection::Filtered);
        }
        if descriptor.nested_aggregation && precision > self.config.nested_terms_max_precision {
            return Some(Rejection::NestedAboveCeiling(precision));
        }
        if !self.store.contains(precision) {
            return Some(Rejection::NotCached(precision));
        }
        None
    }
}
