//! Tiled initialization of the per-precision indexes.

use super::AggregationCache;
use crate::config::PrecisionPlan;
use crate::error::{GridCacheError, Result};
use crate::index::{IndexedBucket, PrecisionIndex};
use crate::source::{AggregationRequest, AggregationSource};
use crate::tiling::TileGrid;
use crate::types::GeohashBucket;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::time::Instant;

impl AggregationCache {
    /// Fetch and index every configured precision.
    ///
    /// Precisions are built in configuration order and each one is published
    /// as soon as it is complete. The first failure stops the pass: the
    /// failing precision keeps whatever index it had before, and precisions
    /// after it are not rebuilt.
    ///
    /// Calling this again rebuilds everything from scratch. It must not run
    /// concurrently with itself or with [`rebuild_precision`](Self::rebuild_precision).
    pub fn initialize<S>(&self, source: &S) -> Result<()>
    where
        S: AggregationSource + ?Sized,
    {
        let started = Instant::now();
        for plan in &self.config.precisions {
            self.build_and_publish(source, plan)?;
        }
        log::info!(
            "Aggregation cache initialized with {} precision(s) in {:?}",
            self.config.precisions.len(),
            started.elapsed()
        );
        Ok(())
    }

    /// Rebuild a single configured precision.
    pub fn rebuild_precision<S>(&self, source: &S, precision: u8) -> Result<()>
    where
        S: AggregationSource + ?Sized,
    {
        let plan = *self
            .config
            .plan(precision)
            .ok_or(GridCacheError::PrecisionNotCached(precision))?;
        self.build_and_publish(source, &plan)
    }

    fn build_and_publish<S>(&self, source: &S, plan: &PrecisionPlan) -> Result<()>
    where
        S: AggregationSource + ?Sized,
    {
        let started = Instant::now();
        let index = self.build_precision(source, plan)?;
        log::info!(
            "Built precision {} with {} buckets ({} documents, {:?} tree) in {:?}",
            index.precision(),
            index.len(),
            index.doc_count(),
            index.profile(),
            started.elapsed()
        );
        self.store.publish(index);
        Ok(())
    }

    fn build_precision<S>(&self, source: &S, plan: &PrecisionPlan) -> Result<PrecisionIndex>
    where
        S: AggregationSource + ?Sized,
    {
        let precision = plan.precision;
        let nested_terms = self.config.wants_nested_terms(precision);
        let grid = TileGrid::world(plan.tile)?;

        let mut merged: FxHashMap<String, GeohashBucket> = FxHashMap::default();
        let mut straddling = 0usize;

        for tile in grid.tiles() {
            let request = AggregationRequest::new(precision)
                .with_region(tile.bounds)
                .with_nested_terms(nested_terms);

            let buckets = source.aggregate(&request).map_err(|err| {
                log::warn!(
                    "Aggregation source failed for precision {} tile {}: {}",
                    precision,
                    tile.bounds,
                    err
                );
                GridCacheError::SourceUnavailable {
                    precision,
                    tile: tile.bounds.to_string(),
                    source: err,
                }
            })?;

            log::debug!(
                "Precision {} tile {} ({}/{}) returned {} buckets",
                precision,
                tile.bounds,
                tile.row * grid.cols() + tile.col + 1,
                grid.len(),
                buckets.len()
            );

            for bucket in buckets {
                match merged.entry(bucket.key.clone()) {
                    Entry::Occupied(mut existing) => {
                        existing.get_mut().merge(bucket);
                        straddling += 1;
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(bucket);
                    }
                }
            }
        }

        if straddling > 0 {
            log::debug!(
                "Precision {}: merged {} partial buckets from cells spanning tile edges",
                precision,
                straddling
            );
        }

        let off_precision = count_off_precision(&merged, precision);
        if off_precision > 0 {
            log::warn!(
                "Precision {}: source returned {} of {} buckets keyed at another precision",
                precision,
                off_precision,
                merged.len()
            );
        }

        let entries = merged
            .into_values()
            .map(IndexedBucket::from_bucket)
            .collect::<std::result::Result<Vec<_>, _>>()
            .inspect_err(|e| log::warn!("Abandoning precision {}: {}", precision, e))?;

        Ok(PrecisionIndex::build(
            precision,
            entries,
            self.config.wide_tree_threshold,
        ))
    }
}

/// Buckets whose key length is not the precision they were requested at.
fn count_off_precision(merged: &FxHashMap<String, GeohashBucket>, precision: u8) -> usize {
    merged
        .keys()
        .filter(|key| key.len() != usize::from(precision))
        .count()
}
