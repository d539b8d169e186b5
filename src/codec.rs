//! Geohash encoding and decoding.
//!
//! Thin layer over the `geohash` crate that validates keys up front so that
//! every malformed bucket key surfaces as a [`DecodeError`] naming the key.

use crate::error::{DecodeError, DecodeFailure, GridCacheError, Result};
use geo::Rect;

/// Longest geohash the codec accepts.
pub const MAX_PRECISION: usize = 12;

const ALPHABET: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

fn validate(key: &str) -> std::result::Result<(), DecodeError> {
    if key.is_empty() {
        return Err(DecodeError::new(key, DecodeFailure::Empty));
    }
    if let Some(c) = key
        .chars()
        .find(|c| !c.is_ascii() || !ALPHABET.contains(&(*c as u8)))
    {
        return Err(DecodeError::new(key, DecodeFailure::InvalidCharacter(c)));
    }
    if key.len() > MAX_PRECISION {
        return Err(DecodeError::new(key, DecodeFailure::TooLong(key.len())));
    }
    Ok(())
}

/// Decode a geohash into the `(latitude, longitude)` centroid of its cell.
pub fn decode(key: &str) -> std::result::Result<(f64, f64), DecodeError> {
    validate(key)?;
    let (coord, _, _) = geohash::decode(key)
        .map_err(|e| DecodeError::new(key, DecodeFailure::Codec(e.to_string())))?;
    Ok((coord.y, coord.x))
}

/// Decode a geohash into the exact rectangle of its cell (x = lon, y = lat).
pub fn decode_cell(key: &str) -> std::result::Result<Rect<f64>, DecodeError> {
    validate(key)?;
    geohash::decode_bbox(key)
        .map_err(|e| DecodeError::new(key, DecodeFailure::Codec(e.to_string())))
}

/// Encode a coordinate as a geohash of `precision` characters.
pub fn encode(lat: f64, lon: f64, precision: usize) -> Result<String> {
    if !(1..=MAX_PRECISION).contains(&precision) {
        return Err(GridCacheError::InvalidConfig(format!(
            "geohash precision must be between 1 and {MAX_PRECISION}, got {precision}"
        )));
    }
    geohash::encode(geohash::Coord { x: lon, y: lat }, precision)
        .map_err(|_| GridCacheError::InvalidCoordinate { lat, lon })
}
