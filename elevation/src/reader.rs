use crate::{error::ElevationError, C, GRID_DIM};
use byteorder::{LittleEndian as LE, ReadBytesExt};
use std::{
    fs::File,
    io::BufReader,
    mem::size_of,
    path::{Path, PathBuf},
};

/// A source elevation grid as handed over by a [`DatasetReader`].
pub struct RawGrid {
    /// Easting of the westernmost column.
    pub min_easting: C,

    /// Northing of the northernmost row.
    pub max_northing: C,

    /// [`GRID_DIM`] × [`GRID_DIM`] samples in meters, row-major with
    /// rows running north to south.
    pub samples: Vec<f32>,
}

impl RawGrid {
    /// Returns a grid with samples `f(row, col)`.
    pub fn from_fn<F>(min_easting: C, max_northing: C, f: F) -> Self
    where
        F: Fn(usize, usize) -> f32,
    {
        let samples = (0..GRID_DIM * GRID_DIM)
            .map(|idx| f(idx / GRID_DIM, idx % GRID_DIM))
            .collect();
        Self {
            min_easting,
            max_northing,
            samples,
        }
    }

    /// Returns the sample at (`row`, `col`).
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.samples[row * GRID_DIM + col]
    }
}

/// Decodes source datasets into [`RawGrid`]s.
///
/// Readers are invoked concurrently, one call per source.
pub trait DatasetReader: Sync {
    fn read(&self, source: &Path) -> Result<RawGrid, ElevationError>;
}

impl<F> DatasetReader for F
where
    F: Fn(&Path) -> Result<RawGrid, ElevationError> + Sync,
{
    fn read(&self, source: &Path) -> Result<RawGrid, ElevationError> {
        self(source)
    }
}

/// Reads bare little-endian `f32` grids.
///
/// A source named `<min_easting>_<max_northing>.f32` holds exactly
/// [`GRID_DIM`] × [`GRID_DIM`] samples in meters, north to south.
#[derive(Debug, Clone, Copy, Default)]
pub struct F32GridReader;

impl F32GridReader {
    pub const EXTENSION: &'static str = "f32";

    /// Returns the file name of the source whose northwest corner is
    /// at (`min_easting`, `max_northing`).
    pub fn source_name(min_easting: i64, max_northing: i64) -> String {
        format!("{min_easting}_{max_northing}.{}", Self::EXTENSION)
    }

    /// Returns `true` if `path` looks like a source this reader
    /// understands.
    pub fn is_source(path: &Path) -> bool {
        path.extension().and_then(std::ffi::OsStr::to_str) == Some(Self::EXTENSION)
            && parse_origin(path).is_ok()
    }
}

impl DatasetReader for F32GridReader {
    fn read(&self, source: &Path) -> Result<RawGrid, ElevationError> {
        let (min_easting, max_northing) = parse_origin(source)?;
        check_len(source)?;
        let mut rdr = BufReader::new(File::open(source)?);
        let mut samples = vec![0_f32; GRID_DIM * GRID_DIM];
        rdr.read_f32_into::<LE>(&mut samples)?;
        Ok(RawGrid {
            min_easting,
            max_northing,
            samples,
        })
    }
}

fn check_len(path: &Path) -> Result<(), ElevationError> {
    const GRID_LEN: u64 = (GRID_DIM * GRID_DIM * size_of::<f32>()) as u64;
    match path.metadata().map(|m| m.len())? {
        GRID_LEN => Ok(()),
        invalid_len => Err(ElevationError::SourceLen(invalid_len, path.to_owned())),
    }
}

#[allow(clippy::cast_precision_loss)]
fn parse_origin(path: &Path) -> Result<(C, C), ElevationError> {
    let mk_err = || ElevationError::SourceName(PathBuf::from(path));
    let name = path
        .file_stem()
        .and_then(std::ffi::OsStr::to_str)
        .ok_or_else(mk_err)?;
    let (easting, northing) = name.split_once('_').ok_or_else(mk_err)?;
    let easting = easting.parse::<i64>().map_err(|_| mk_err())?;
    let northing = northing.parse::<i64>().map_err(|_| mk_err())?;
    Ok((easting as C, northing as C))
}
