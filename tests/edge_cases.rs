use gridcache::{
    AggregationCache, AggregationSource, BoundingBox, Config, DecodeFailure, GeohashBucket,
    GridCacheError, MemorySource, PrecisionPlan, TileSize, from_fn,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

fn single_precision(precision: u8, tile: TileSize) -> AggregationCache {
    AggregationCache::with_config(
        Config::default().with_precisions(vec![PrecisionPlan::new(precision, tile)]),
    )
    .expect("valid config")
}

/// Test 1: A malformed key anywhere in the response abandons the precision
#[test]
fn test_malformed_key_aborts_precision() {
    let source = MemorySource::new().with_buckets(
        4,
        vec![GeohashBucket::new("u09t", 3), GeohashBucket::new("u0!t", 1)],
    );
    let cache = single_precision(4, TileSize::hemisphere());

    match cache.initialize(&source) {
        Err(GridCacheError::Decode(err)) => {
            assert_eq!(err.key, "u0!t");
            assert_eq!(err.reason, DecodeFailure::InvalidCharacter('!'));
        }
        other => panic!("expected decode error, got {other:?}"),
    }
    assert!(cache.cached_precisions().is_empty());
}

/// Test 2: A failed rebuild leaves the previously published index in place
#[test]
fn test_failed_rebuild_keeps_previous_index() {
    let cache = single_precision(5, TileSize::new(90.0, 90.0));
    let good = MemorySource::new().with_buckets(
        5,
        vec![GeohashBucket::new("u09tv", 4), GeohashBucket::new("9q8yy", 6)],
    );
    cache.initialize(&good).expect("initial build");

    let calls = AtomicUsize::new(0);
    let flaky = from_fn(|request| {
        if calls.fetch_add(1, Ordering::SeqCst) == 5 {
            return Err("search engine returned 503".into());
        }
        good.aggregate(request)
    });

    let err = cache.rebuild_precision(&flaky, 5).unwrap_err();
    assert!(matches!(err, GridCacheError::SourceUnavailable { precision: 5, .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 6);

    let buckets = cache.get_buckets(5, &BoundingBox::WORLD).expect("query");
    assert_eq!(buckets.len(), 2);
}

/// Test 3: Readers racing a rebuild see either the old or the new index, never a mix
#[test]
fn test_concurrent_readers_during_rebuild() {
    let small: Vec<GeohashBucket> = ["u09t", "9q8y", "r3gx"]
        .iter()
        .map(|k| GeohashBucket::new(*k, 1))
        .collect();
    let large: Vec<GeohashBucket> = (0..400)
        .map(|i| {
            let lat = -80.0 + (i / 20) as f64 * 8.0;
            let lon = -170.0 + (i % 20) as f64 * 17.0;
            GeohashBucket::new(gridcache::codec::encode(lat, lon, 4).unwrap(), 1)
        })
        .collect();
    let large_len = large.len();

    let cache = single_precision(4, TileSize::hemisphere());
    let small_source = MemorySource::new().with_buckets(4, small);
    let large_source = MemorySource::new().with_buckets(4, large);
    cache.initialize(&small_source).expect("initial build");

    let done = AtomicBool::new(false);
    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    let n = cache.get_buckets(4, &BoundingBox::WORLD).unwrap().len();
                    assert!(n == 3 || n == large_len, "torn read: {n} buckets");
                }
            });
        }

        for round in 0..20 {
            let source = if round % 2 == 0 { &large_source } else { &small_source };
            cache.initialize(source).expect("rebuild");
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(cache.get_buckets(4, &BoundingBox::WORLD).unwrap().len(), 3);
}

/// Test 4: Queries at the poles and along the date line
#[test]
fn test_extreme_coordinates() {
    let keys = ["zzzz", "0000", "pbpb", "bpbp", "8000", "xbpb"];
    let source = MemorySource::new().with_buckets(
        4,
        keys.iter().map(|k| GeohashBucket::new(*k, 1)).collect(),
    );
    let cache = single_precision(4, TileSize::new(45.0, 45.0));
    cache.initialize(&source).expect("build");

    assert_eq!(cache.get_buckets(4, &BoundingBox::WORLD).unwrap().len(), keys.len());

    let arctic = cache
        .get_buckets(4, &BoundingBox::new(-180.0, 89.0, 180.0, 90.0))
        .unwrap();
    let mut arctic_keys: Vec<&str> = arctic.iter().map(|b| b.key.as_str()).collect();
    arctic_keys.sort_unstable();
    assert_eq!(arctic_keys, vec!["bpbp", "zzzz"]);

    // The antimeridian written as a degenerate box means the whole circle,
    // whichever sign each edge carries.
    for (west, east) in [(180.0, -180.0), (-180.0, -180.0), (180.0, 180.0)] {
        let line = BoundingBox::new(west, -90.0, east, 90.0);
        assert_eq!(cache.get_buckets(4, &line).unwrap().len(), keys.len(), "{line}");
    }
}

/// Test 5: Empty source still publishes empty indexes
#[test]
fn test_empty_source() {
    let cache = AggregationCache::new();
    cache.initialize(&MemorySource::new()).expect("build");

    assert_eq!(cache.cached_precisions(), vec![4, 5, 6]);
    for precision in [4, 5, 6] {
        assert!(cache.get_buckets(precision, &BoundingBox::WORLD).unwrap().is_empty());
        assert_eq!(cache.count(precision, &BoundingBox::WORLD).unwrap(), 0);
    }
}

/// Test 6: Invalid query boxes are reported, not silently answered
#[test]
fn test_invalid_bounding_box() {
    let cache = AggregationCache::new();
    cache.initialize(&MemorySource::new()).expect("build");

    let err = cache
        .get_buckets(4, &BoundingBox::new(0.0, f64::INFINITY, 10.0, 10.0))
        .unwrap_err();
    assert!(matches!(err, GridCacheError::InvalidBoundingBox(_)));
}
