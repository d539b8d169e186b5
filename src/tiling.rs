//! Partitioning of the world extent into initialization tiles.
//!
//! A whole-world aggregation at fine precision can exceed the backing
//! engine's result-size limit, so each precision is fetched tile by tile.
//! Tile edges sit at `min + i * step`, clamped to the extent, so the tiles
//! cover the extent exactly: no gaps, no overlaps, and a trailing partial
//! tile when the step does not divide the range.

use crate::config::TileSize;
use crate::error::{GridCacheError, Result};
use crate::types::BoundingBox;

/// Slack used when deciding whether a step divides a range evenly.
const DIVISION_EPSILON: f64 = 1e-9;

fn tile_count(range: f64, step: f64) -> usize {
    let raw = range / step;
    let rounded = raw.round();
    let count = if (raw - rounded).abs() < DIVISION_EPSILON {
        rounded
    } else {
        raw.ceil()
    };
    (count as usize).max(1)
}

/// One tile of a [`TileGrid`].
///
/// Membership is half-open (`[min, max)`) on both axes, except along the
/// extent's east and north edges which are closed, so that every point of
/// the extent belongs to exactly one tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tile {
    pub col: usize,
    pub row: usize,
    pub bounds: BoundingBox,
    closed_east: bool,
    closed_north: bool,
}

impl Tile {
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let b = &self.bounds;
        let east = lon < b.max_lon || (self.closed_east && lon <= b.max_lon);
        let north = lat < b.max_lat || (self.closed_north && lat <= b.max_lat);
        lon >= b.min_lon && east && lat >= b.min_lat && north
    }
}

/// Regular grid of tiles over an extent.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    extent: BoundingBox,
    tile: TileSize,
    cols: usize,
    rows: usize,
}

impl TileGrid {
    /// Fails when the extent is not a finite, non-inverted box, when a step
    /// is not a positive finite number, or when the grid would hold more
    /// tiles than can be counted.
    pub fn new(extent: BoundingBox, tile: TileSize) -> Result<Self> {
        if !extent.is_finite() || extent.min_lon > extent.max_lon || extent.min_lat > extent.max_lat
        {
            return Err(GridCacheError::InvalidConfig(format!(
                "tile grid extent {extent} must be finite and not inverted"
            )));
        }
        for (axis, step) in [("lon_step", tile.lon_step), ("lat_step", tile.lat_step)] {
            if !(step.is_finite() && step > 0.0) {
                return Err(GridCacheError::InvalidConfig(format!(
                    "tile {axis} must be positive and finite, got {step}"
                )));
            }
        }

        let cols = tile_count(extent.max_lon - extent.min_lon, tile.lon_step);
        let rows = tile_count(extent.max_lat - extent.min_lat, tile.lat_step);
        if cols.checked_mul(rows).is_none() {
            return Err(GridCacheError::InvalidConfig(format!(
                "tile size {}x{} yields too many tiles",
                tile.lon_step, tile.lat_step
            )));
        }
        Ok(Self {
            extent,
            tile,
            cols,
            rows,
        })
    }

    /// Grid over `[-180, 180] x [-90, 90]`.
    pub fn world(tile: TileSize) -> Result<Self> {
        Self::new(BoundingBox::WORLD, tile)
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lon_edge(&self, col: usize) -> f64 {
        if col >= self.cols {
            self.extent.max_lon
        } else {
            (self.extent.min_lon + col as f64 * self.tile.lon_step).min(self.extent.max_lon)
        }
    }

    fn lat_edge(&self, row: usize) -> f64 {
        if row >= self.rows {
            self.extent.max_lat
        } else {
            (self.extent.min_lat + row as f64 * self.tile.lat_step).min(self.extent.max_lat)
        }
    }

    /// Tile at `(col, row)`, counted from the south-west corner.
    pub fn tile(&self, col: usize, row: usize) -> Option<Tile> {
        if col >= self.cols || row >= self.rows {
            return None;
        }
        Some(Tile {
            col,
            row,
            bounds: BoundingBox::new(
                self.lon_edge(col),
                self.lat_edge(row),
                self.lon_edge(col + 1),
                self.lat_edge(row + 1),
            ),
            closed_east: col + 1 == self.cols,
            closed_north: row + 1 == self.rows,
        })
    }

    /// Tiles in row-major order, starting at the south-west corner.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        (0..self.rows)
            .flat_map(move |row| (0..self.cols).filter_map(move |col| self.tile(col, row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_exact_partition(grid: &TileGrid) {
        let tiles: Vec<Tile> = grid.tiles().collect();
        assert_eq!(tiles.len(), grid.len());

        let mut lon = -180.0;
        while lon <= 180.0 {
            let mut lat = -90.0;
            while lat <= 90.0 {
                let owners = tiles.iter().filter(|t| t.contains(lon, lat)).count();
                assert_eq!(owners, 1, "point ({lon}, {lat}) owned by {owners} tiles");
                lat += 2.5;
            }
            lon += 2.5;
        }
    }

    #[test]
    fn test_hemisphere_tiles() {
        let grid = TileGrid::world(TileSize::hemisphere()).unwrap();
        assert_eq!((grid.cols(), grid.rows()), (2, 1));
        let tiles: Vec<Tile> = grid.tiles().collect();
        assert_eq!(tiles[0].bounds, BoundingBox::new(-180.0, -90.0, 0.0, 90.0));
        assert_eq!(tiles[1].bounds, BoundingBox::new(0.0, -90.0, 180.0, 90.0));
        assert_exact_partition(&grid);
    }

    #[test]
    fn test_fine_tiles_cover_world() {
        let grid = TileGrid::world(TileSize::new(90.0, 10.0)).unwrap();
        assert_eq!((grid.cols(), grid.rows()), (4, 18));
        assert_exact_partition(&grid);
    }

    #[test]
    fn test_uneven_step_keeps_partial_tile() {
        let grid = TileGrid::world(TileSize::new(100.0, 50.0)).unwrap();
        assert_eq!((grid.cols(), grid.rows()), (4, 4));

        let last = grid.tile(3, 3).unwrap();
        assert_eq!(last.bounds, BoundingBox::new(120.0, 60.0, 180.0, 90.0));
        assert_exact_partition(&grid);
    }

    #[test]
    fn test_inexact_float_step_has_no_sliver() {
        // 360 / 0.3 is 1200.0000000000002 in floating point.
        let grid = TileGrid::world(TileSize::new(0.3, 180.0)).unwrap();
        assert_eq!(grid.cols(), 1200);
        let last = grid.tile(1199, 0).unwrap();
        assert_eq!(last.bounds.max_lon, 180.0);
        assert!(last.bounds.width() > 0.29);
    }

    #[test]
    fn test_adjacent_tiles_share_edges() {
        let grid = TileGrid::world(TileSize::new(45.0, 30.0)).unwrap();
        for row in 0..grid.rows() {
            for col in 1..grid.cols() {
                let west = grid.tile(col - 1, row).unwrap();
                let east = grid.tile(col, row).unwrap();
                assert_eq!(west.bounds.max_lon, east.bounds.min_lon);
            }
        }
        assert!(grid.tile(grid.cols(), 0).is_none());
    }

    #[test]
    fn test_degenerate_steps_are_rejected() {
        for tile in [
            TileSize::new(0.0, 10.0),
            TileSize::new(90.0, -5.0),
            TileSize::new(f64::NAN, 90.0),
            TileSize::new(90.0, f64::INFINITY),
            TileSize::new(1e-300, 1e-300),
        ] {
            let err = TileGrid::world(tile).unwrap_err();
            assert!(matches!(err, GridCacheError::InvalidConfig(_)), "{tile:?}");
        }

        let inverted = BoundingBox::new(10.0, 0.0, -10.0, 10.0);
        assert!(TileGrid::new(inverted, TileSize::hemisphere()).is_err());
    }

    #[test]
    fn test_boundary_point_owned_once() {
        let grid = TileGrid::world(TileSize::hemisphere()).unwrap();
        let owners: Vec<usize> = grid
            .tiles()
            .filter(|t| t.contains(0.0, 0.0))
            .map(|t| t.col)
            .collect();
        assert_eq!(owners, vec![1]);

        let corner: Vec<usize> = grid
            .tiles()
            .filter(|t| t.contains(180.0, 90.0))
            .map(|t| t.col)
            .collect();
        assert_eq!(corner, vec![1]);
    }
}
