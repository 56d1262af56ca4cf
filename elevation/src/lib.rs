//! Tiled 10 m elevation grid.
//!
//! Elevation samples live in 50 km × 50 km [`ElevationTile`]s, each
//! split into 25 × 25 [`Maplet`]s of 200 × 200 samples. Every maplet
//! carries a precomputed maximum so that callers marching across the
//! grid can discard whole maplets without touching their samples.
//!
//! Tiles are persisted as fixed-size blocks mirroring their in-memory
//! layout and memory-mapped back on startup. An [`ElevationMap`] places
//! up to 50 × 50 tiles relative to the dataset origin (minimum easting,
//! maximum northing) and resolves [`IntStep`] coordinates to samples.
//!
//! Northing steps grow _southward_ from the origin.

mod error;
mod map;
mod reader;
mod step;
mod tile;

pub use crate::{
    error::ElevationError,
    map::ElevationMap,
    reader::{DatasetReader, F32GridReader, RawGrid},
    step::IntStep,
    tile::{ElevationTile, Maplet, BLOCK_LEN},
};

/// Base floating point type used for coordinates and elevations.
pub type C = f64;

/// Bit representation of elevation samples, in units of [`ELEV_UNIT`].
pub type Elev = i16;

/// Meters per [`Elev`] unit.
pub const ELEV_UNIT: C = 0.1;

/// Meters between neighboring samples.
pub const UNIT: i32 = 10;

/// Samples along one side of a [`Maplet`].
pub const MAPLET_SIZE: usize = 200;

/// Maplets along one side of an [`ElevationTile`].
pub const MAPLETS_PER_TILE: usize = 25;

/// Samples along one side of an [`ElevationTile`].
pub const TILE_SIZE: usize = MAPLET_SIZE * MAPLETS_PER_TILE;

/// Samples along one side of a source grid: one tile plus the
/// overlapping first row/column of its south/east neighbors.
pub const GRID_DIM: usize = TILE_SIZE + 1;

/// Tiles along one side of an [`ElevationMap`].
pub const MAP_TILES: usize = 50;

/// Width of one tile in meters.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const TILE_METERS: i64 = TILE_SIZE as i64 * UNIT as i64;

/// Converts a raw sample to meters.
#[inline]
pub fn to_meters(elev: Elev) -> C {
    C::from(elev) * ELEV_UNIT
}

/// Converts meters to a raw sample, rounding to the nearest unit and
/// saturating at the [`Elev`] range.
#[inline]
#[allow(clippy::cast_possible_truncation)]
pub fn from_meters(meters: f32) -> Elev {
    (C::from(meters) / ELEV_UNIT).round() as Elev
}
