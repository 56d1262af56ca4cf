//! 50 km × 50 km elevation tiles.
//!
//! # Block layout
//!
//! A persisted tile is a single fixed-size block, native endian,
//! byte-for-byte the layout of the equivalent `#[repr(C)]` struct:
//!
//! | offset     | field                                          |
//! |-----------:|------------------------------------------------|
//! | 0          | `f64` min easting                              |
//! | 8          | `f64` max northing                             |
//! | 16         | `[[i16; 25]; 25]` maplet maxima                |
//! | 1266       | `[[[[i16; 200]; 200]; 25]; 25]` samples        |
//! | 50 001 266 | zero padding up to the struct's 8 byte alignment |

use crate::{
    error::ElevationError, from_meters, reader::DatasetReader, Elev, RawGrid, C, GRID_DIM,
    MAPLETS_PER_TILE, MAPLET_SIZE, TILE_SIZE,
};
use byteorder::{NativeEndian as NE, ReadBytesExt, WriteBytesExt};
use geo::geometry::Coord;
use log::{debug, info, warn};
use memmap2::Mmap;
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    mem::{align_of, size_of},
    ops::Index,
    path::{Path, PathBuf},
    time::SystemTime,
};

const MAPLET_LEN: usize = MAPLET_SIZE * MAPLET_SIZE;
const MAXIMA_LEN: usize = MAPLETS_PER_TILE * MAPLETS_PER_TILE;
const SAMPLES_LEN: usize = TILE_SIZE * TILE_SIZE;

const MAXIMA_OFFSET: usize = 2 * size_of::<C>();
const SAMPLES_OFFSET: usize = MAXIMA_OFFSET + MAXIMA_LEN * size_of::<Elev>();
const PAYLOAD_LEN: usize = SAMPLES_OFFSET + SAMPLES_LEN * size_of::<Elev>();

/// Length in bytes of a persisted tile block.
pub const BLOCK_LEN: usize = (PAYLOAD_LEN + align_of::<C>() - 1) / align_of::<C>() * align_of::<C>();

pub struct ElevationTile {
    /// Easting of the westernmost sample column.
    min_easting: C,

    /// Northing of the northernmost sample row.
    max_northing: C,

    /// Maplet maxima and samples.
    store: TileStore,
}

enum TileStore {
    InMem {
        maxima: Box<[Elev]>,
        samples: Box<[Elev]>,
    },
    /// A validated block, see [`ElevationTile::open`].
    MemMap(Mmap),
}

impl TileStore {
    fn maxima(&self) -> &[Elev] {
        match self {
            Self::InMem { maxima, .. } => maxima,
            // Length and alignment are checked before a block is
            // wrapped, so this cast can't fail.
            Self::MemMap(raw) => bytemuck::cast_slice(&raw[MAXIMA_OFFSET..SAMPLES_OFFSET]),
        }
    }

    fn samples(&self) -> &[Elev] {
        match self {
            Self::InMem { samples, .. } => samples,
            Self::MemMap(raw) => bytemuck::cast_slice(&raw[SAMPLES_OFFSET..PAYLOAD_LEN]),
        }
    }
}

impl ElevationTile {
    /// Returns an in-memory tile with samples `f(row, col)` in
    /// meters, where rows run north to south.
    ///
    /// `f` is evaluated over the full [`GRID_DIM`] × [`GRID_DIM`]
    /// source grid; the last row and column only contribute to
    /// maplet maxima.
    pub fn from_fn<F>(min_easting: C, max_northing: C, f: F) -> Self
    where
        F: Fn(usize, usize) -> f32,
    {
        let mut samples = vec![0; SAMPLES_LEN].into_boxed_slice();
        let mut maxima = vec![Elev::MIN; MAXIMA_LEN].into_boxed_slice();
        let col_windows: Vec<[Option<usize>; 2]> = (0..GRID_DIM).map(windows).collect();

        for row in 0..GRID_DIM {
            let row_windows = windows(row);
            for (col, covering_cols) in col_windows.iter().enumerate() {
                let elev = from_meters(f(row, col));
                if row < TILE_SIZE && col < TILE_SIZE {
                    samples[linear_index(row, col)] = elev;
                }
                for mr in row_windows.iter().flatten() {
                    for mc in covering_cols.iter().flatten() {
                        let max = &mut maxima[mr * MAPLETS_PER_TILE + mc];
                        *max = (*max).max(elev);
                    }
                }
            }
        }

        Self {
            min_easting,
            max_northing,
            store: TileStore::InMem { maxima, samples },
        }
    }

    /// Returns an in-memory tile built from a source grid.
    pub fn from_grid(grid: &RawGrid) -> Result<Self, ElevationError> {
        let expected = GRID_DIM * GRID_DIM;
        if grid.samples.len() != expected {
            return Err(ElevationError::GridLen(grid.samples.len(), expected));
        }
        Ok(Self::from_fn(grid.min_easting, grid.max_northing, |row, col| {
            grid.get(row, col)
        }))
    }

    /// Returns a tile backed by the memory-mapped block at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ElevationError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len != BLOCK_LEN as u64 {
            return Err(ElevationError::BlockLen(len, path.to_owned()));
        }

        // SAFETY: blocks are written under a temporary name and
        // renamed into place, a block is never modified once it is
        // visible under its final name.
        let raw = unsafe { Mmap::map(&file)? };
        if raw.len() != BLOCK_LEN {
            return Err(ElevationError::BlockLen(raw.len() as u64, path.to_owned()));
        }
        if bytemuck::try_cast_slice::<u8, Elev>(&raw[MAXIMA_OFFSET..PAYLOAD_LEN]).is_err() {
            return Err(ElevationError::BlockAlign(path.to_owned()));
        }

        let (min_easting, max_northing) = {
            let header = &mut &raw[..MAXIMA_OFFSET];
            (header.read_f64::<NE>()?, header.read_f64::<NE>()?)
        };

        Ok(Self {
            min_easting,
            max_northing,
            store: TileStore::MemMap(raw),
        })
    }

    /// Writes this tile as a block to `path`.
    ///
    /// The block is written next to `path` and renamed into place once
    /// complete.
    pub fn persist<P: AsRef<Path>>(&self, path: P) -> Result<(), ElevationError> {
        let path = path.as_ref();
        let tmp_path = {
            let mut p = path.to_owned();
            p.set_extension("tmp");
            p
        };

        let mut wtr = BufWriter::new(File::create(&tmp_path)?);
        wtr.write_f64::<NE>(self.min_easting)?;
        wtr.write_f64::<NE>(self.max_northing)?;
        wtr.write_all(bytemuck::cast_slice(self.store.maxima()))?;
        wtr.write_all(bytemuck::cast_slice(self.store.samples()))?;
        wtr.write_all(&[0; BLOCK_LEN - PAYLOAD_LEN])?;
        wtr.flush()?;
        drop(wtr);

        fs::rename(tmp_path, path)?;
        Ok(())
    }

    /// Returns the tile for `source`, mapping its cached block from
    /// `cache_dir`.
    ///
    /// The block is regenerated through `reader` when it is missing,
    /// older than `source`, or of the wrong size.
    pub fn load_cached<R>(reader: &R, source: &Path, cache_dir: &Path) -> Result<Self, ElevationError>
    where
        R: DatasetReader + ?Sized,
    {
        let block_path = block_path(source, cache_dir)?;
        let source_mtime = fs::metadata(source)?.modified()?;

        match CacheState::check(&block_path, source_mtime) {
            CacheState::Fresh => debug!("reusing {block_path:?}"),
            state => {
                match state {
                    CacheState::Missing => debug!("generating {block_path:?}"),
                    CacheState::Stale => info!("regenerating stale {block_path:?}"),
                    _ => warn!("regenerating corrupt {block_path:?}"),
                }
                let grid = reader.read(source)?;
                Self::from_grid(&grid)?.persist(&block_path)?;
            }
        }

        Self::open(&block_path)
    }

    /// Easting of the westernmost sample column.
    pub fn min_easting(&self) -> C {
        self.min_easting
    }

    /// Northing of the northernmost sample row.
    pub fn max_northing(&self) -> C {
        self.max_northing
    }

    /// Northwest corner of this tile.
    pub fn origin(&self) -> Coord<C> {
        Coord {
            x: self.min_easting,
            y: self.max_northing,
        }
    }

    /// Returns `true` if this tile is backed by a mapped block.
    pub fn is_mapped(&self) -> bool {
        matches!(self.store, TileStore::MemMap(_))
    }

    /// Returns the maplet at maplet row `mr` (north to south) and
    /// maplet column `mc` (west to east).
    ///
    /// # Panics
    ///
    /// Panics if either index is not below [`MAPLETS_PER_TILE`].
    #[inline]
    pub fn maplet(&self, mr: usize, mc: usize) -> Maplet<'_> {
        let start = (mr * MAPLETS_PER_TILE + mc) * MAPLET_LEN;
        Maplet(&self.store.samples()[start..start + MAPLET_LEN])
    }

    /// Returns the highest sample of the maplet at (`mr`, `mc`),
    /// including the first row and column of its south and east
    /// neighbors.
    #[inline]
    pub fn max_elevation(&self, mr: usize, mc: usize) -> Elev {
        self.store.maxima()[mr * MAPLETS_PER_TILE + mc]
    }

    /// Returns the sample at tile-local (`row`, `col`).
    pub fn sample(&self, row: usize, col: usize) -> Elev {
        self.store.samples()[linear_index(row, col)]
    }
}

/// A 200 × 200 block of samples, indexed by (row, col).
#[derive(Clone, Copy)]
pub struct Maplet<'a>(&'a [Elev]);

impl<'a> Maplet<'a> {
    /// Returns the samples of `row`, west to east.
    pub fn row(&self, row: usize) -> &'a [Elev] {
        &self.0[row * MAPLET_SIZE..(row + 1) * MAPLET_SIZE]
    }

    /// Returns the highest sample in this maplet alone.
    pub fn max(&self) -> Elev {
        self.0.iter().copied().max().unwrap_or(Elev::MIN)
    }

    /// Returns `true` if both views refer to the same storage.
    pub fn same(&self, other: &Maplet<'_>) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Index<(usize, usize)> for Maplet<'_> {
    type Output = Elev;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &Self::Output {
        &self.0[row * MAPLET_SIZE + col]
    }
}

/// Freshness of a persisted block relative to its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CacheState {
    Fresh,
    Missing,
    Stale,
    Corrupt,
}

impl CacheState {
    fn check(block_path: &Path, source_mtime: SystemTime) -> Self {
        let Ok(meta) = fs::metadata(block_path) else {
            return Self::Missing;
        };
        if meta.len() != BLOCK_LEN as u64 {
            return Self::Corrupt;
        }
        match meta.modified() {
            Ok(block_mtime) if block_mtime >= source_mtime => Self::Fresh,
            _ => Self::Stale,
        }
    }
}

/// Returns the path of the cached block for `source`.
fn block_path(source: &Path, cache_dir: &Path) -> Result<PathBuf, ElevationError> {
    let name = source
        .file_name()
        .and_then(std::ffi::OsStr::to_str)
        .ok_or_else(|| ElevationError::SourceName(source.to_owned()))?;
    Ok(cache_dir.join(format!("{name}.mmap")))
}

/// Index into the flattened (maplet-row, maplet-col, row, col) array.
#[inline]
fn linear_index(row: usize, col: usize) -> usize {
    let (mr, r) = (row / MAPLET_SIZE, row % MAPLET_SIZE);
    let (mc, c) = (col / MAPLET_SIZE, col % MAPLET_SIZE);
    ((mr * MAPLETS_PER_TILE + mc) * MAPLET_SIZE + r) * MAPLET_SIZE + c
}

/// Maplet rows (or columns) whose maximum covers source row (or
/// column) `idx`.
///
/// Maplet `i` covers `[200 i, 200 i + 200]`, so the first row of a
/// maplet also belongs to the one before it.
fn windows(idx: usize) -> [Option<usize>; 2] {
    let own = idx / MAPLET_SIZE;
    let prev = (idx % MAPLET_SIZE == 0 && own > 0).then(|| own - 1);
    [(own < MAPLETS_PER_TILE).then_some(own), prev]
}

#[cfg(test)]
impl ElevationTile {
    /// Returns a tile where every sample is `elev`.
    pub(crate) fn filled(min_easting: C, max_northing: C, elev: Elev) -> Self {
        Self {
            min_easting,
            max_northing,
            store: TileStore::InMem {
                maxima: vec![elev; MAXIMA_LEN].into_boxed_slice(),
                samples: vec![elev; SAMPLES_LEN].into_boxed_slice(),
            },
        }
    }
}
