//! Error types for the aggregation cache.

use crate::source::SourceError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GridCacheError>;

/// Why a geohash key could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    #[error("empty key")]
    Empty,
    #[error("invalid character {0:?}")]
    InvalidCharacter(char),
    #[error("length {0} exceeds the maximum of 12")]
    TooLong(usize),
    #[error("{0}")]
    Codec(String),
}

/// A malformed geohash met while decoding a bucket key.
///
/// Seeing one during a build means the source returned corrupt data, so the
/// whole precision is abandoned rather than indexed with holes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid geohash {key:?}: {reason}")]
pub struct DecodeError {
    pub key: String,
    pub reason: DecodeFailure,
}

impl DecodeError {
    pub fn new(key: impl Into<String>, reason: DecodeFailure) -> Self {
        Self {
            key: key.into(),
            reason,
        }
    }
}

#[derive(Debug, Error)]
pub enum GridCacheError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("aggregation source unavailable for precision {precision} (tile {tile}): {source}")]
    SourceUnavailable {
        precision: u8,
        tile: String,
        #[source]
        source: SourceError,
    },

    /// The caller skipped `supports_query` or asked for an unplanned precision.
    #[error("precision {0} is not cached")]
    PrecisionNotCached(u8),

    #[error("invalid bounding box: {0}")]
    InvalidBoundingBox(String),

    #[error("invalid coordinate: lat {lat}, lon {lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = DecodeError::new("u4pa", DecodeFailure::InvalidCharacter('a'));
        assert_eq!(err.to_string(), "invalid geohash \"u4pa\": invalid character 'a'");
    }

    #[test]
    fn test_source_error_keeps_cause() {
        use std::error::Error as _;

        let err = GridCacheError::SourceUnavailable {
            precision: 5,
            tile: "world".to_string(),
            source: "connection refused".into(),
        };
        assert!(err.to_string().contains("precision 5"));
        assert_eq!(err.source().unwrap().to_string(), "connection refused");
    }
}
