use crate::{
    error::ElevationError, reader::DatasetReader, step::IntStep, tile::ElevationTile, to_meters,
    Elev, Maplet, C, MAP_TILES, TILE_METERS,
};
use geo::geometry::Coord;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{fs, path::Path};

/// Up to [`MAP_TILES`] × [`MAP_TILES`] tiles placed relative to the
/// dataset origin.
///
/// The origin is the minimum easting and maximum northing over all
/// loaded tiles. Lookups take [`IntStep`] coordinates relative to it,
/// with northing steps growing southward.
pub struct ElevationMap {
    min_easting: C,
    max_northing: C,
    /// Indexed `[easting tile * MAP_TILES + northing tile]`.
    tiles: Box<[Option<ElevationTile>]>,
}

impl ElevationMap {
    /// Loads `sources` through their cached blocks in `cache_dir`,
    /// creating the directory if needed.
    ///
    /// Sources that fail to load are logged and skipped.
    pub fn load<R, P>(reader: &R, cache_dir: &Path, sources: &[P]) -> Result<Self, ElevationError>
    where
        R: DatasetReader,
        P: AsRef<Path> + Sync,
    {
        prepare_cache_dir(cache_dir)?;

        let tiles: Vec<ElevationTile> = sources
            .par_iter()
            .filter_map(|source| {
                let source = source.as_ref();
                match ElevationTile::load_cached(reader, source, cache_dir) {
                    Ok(tile) => {
                        debug!("loaded {source:?}");
                        Some(tile)
                    }
                    Err(e) => {
                        warn!("skipping {source:?}: {e}");
                        None
                    }
                }
            })
            .collect();

        let map = Self::from_tiles(tiles)?;
        info!(
            "loaded {} of {} elevation tiles, origin {:?}",
            map.tile_count(),
            sources.len(),
            map.offsets()
        );
        debug!("coverage:\n{}", map.coverage());
        Ok(map)
    }

    /// Places already loaded tiles.
    ///
    /// Tiles falling outside the grid or onto an occupied slot are
    /// logged and dropped.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_tiles(tiles: Vec<ElevationTile>) -> Result<Self, ElevationError> {
        if tiles.is_empty() {
            return Err(ElevationError::NoTiles);
        }

        let min_easting = tiles
            .iter()
            .map(ElevationTile::min_easting)
            .fold(C::INFINITY, C::min);
        let max_northing = tiles
            .iter()
            .map(ElevationTile::max_northing)
            .fold(C::NEG_INFINITY, C::max);

        let mut slots: Vec<Option<ElevationTile>> =
            (0..MAP_TILES * MAP_TILES).map(|_| None).collect();
        for tile in tiles {
            let x = (tile.min_easting() as i64 - min_easting as i64) / TILE_METERS;
            let y = (max_northing as i64 - tile.max_northing() as i64) / TILE_METERS;
            if x >= MAP_TILES as i64 || y >= MAP_TILES as i64 {
                warn!("dropping tile at {:?}: outside map", tile.origin());
                continue;
            }
            let slot = &mut slots[x as usize * MAP_TILES + y as usize];
            if slot.is_some() {
                warn!("dropping tile at {:?}: slot ({x}, {y}) taken", tile.origin());
                continue;
            }
            *slot = Some(tile);
        }

        Ok(Self {
            min_easting,
            max_northing,
            tiles: slots.into_boxed_slice(),
        })
    }

    /// Returns the dataset origin `(min_easting, max_northing)`.
    pub fn offsets(&self) -> (C, C) {
        (self.min_easting, self.max_northing)
    }

    /// Returns the step coordinates nearest to an absolute position.
    pub fn to_steps(&self, coord: Coord<C>) -> (IntStep, IntStep) {
        (
            IntStep::from_meters(coord.x - self.min_easting),
            IntStep::from_meters(self.max_northing - coord.y),
        )
    }

    /// Returns the absolute position of a pair of step coordinates.
    pub fn to_coord(&self, e: IntStep, n: IntStep) -> Coord<C> {
        Coord {
            x: self.min_easting + e.meters(),
            y: self.max_northing - n.meters(),
        }
    }

    /// Number of placed tiles.
    pub fn tile_count(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_some()).count()
    }

    #[inline]
    #[allow(clippy::cast_sign_loss)]
    fn tile(&self, e: IntStep, n: IntStep) -> Option<&ElevationTile> {
        let (x, y) = (e.tile_index(), n.tile_index());
        let range = 0..MAP_TILES as i32;
        if !range.contains(&x) || !range.contains(&y) {
            return None;
        }
        self.tiles[x as usize * MAP_TILES + y as usize].as_ref()
    }

    /// Returns the maplet containing (`e`, `n`).
    #[inline]
    pub fn lookup_maplet(&self, e: IntStep, n: IntStep) -> Option<Maplet<'_>> {
        self.tile(e, n)
            .map(|tile| tile.maplet(n.maplet_index(), e.maplet_index()))
    }

    /// Returns the upper bound, in meters, of the maplet containing
    /// (`e`, `n`).
    #[inline]
    pub fn max_elevation(&self, e: IntStep, n: IntStep) -> Option<C> {
        self.tile(e, n)
            .map(|tile| to_meters(tile.max_elevation(n.maplet_index(), e.maplet_index())))
    }

    /// Returns the raw sample at (`e`, `n`).
    #[inline]
    pub fn sample(&self, e: IntStep, n: IntStep) -> Option<Elev> {
        self.lookup_maplet(e, n)
            .map(|maplet| maplet[(n.maplet_offset(), e.maplet_offset())])
    }

    /// Returns the elevation in meters at (`e`, `n`).
    #[inline]
    pub fn elevation(&self, e: IntStep, n: IntStep) -> Option<C> {
        self.sample(e, n).map(to_meters)
    }

    /// Renders tile presence with one line per northing tile, north
    /// first, `X` for a loaded tile and `-` for a hole.
    pub fn coverage(&self) -> String {
        let mut out = String::with_capacity(MAP_TILES * (MAP_TILES + 1));
        for y in 0..MAP_TILES {
            for x in 0..MAP_TILES {
                out.push(if self.tiles[x * MAP_TILES + y].is_some() {
                    'X'
                } else {
                    '-'
                });
            }
            out.push('\n');
        }
        out
    }
}

fn prepare_cache_dir(cache_dir: &Path) -> Result<(), ElevationError> {
    if !cache_dir.exists() {
        fs::create_dir_all(cache_dir)?;
    } else if !cache_dir.is_dir() {
        return Err(ElevationError::CacheDir(cache_dir.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ElevationMap;
    use crate::{
        from_meters, ElevationError, ElevationTile, IntStep, RawGrid, MAPLET_SIZE, TILE_SIZE,
    };
    use geo::geometry::Coord;
    use std::{fs, path::Path};

    const E0: f64 = 500_000.0;
    const N0: f64 = 7_000_000.0;

    fn three_tiles() -> ElevationMap {
        ElevationMap::from_tiles(vec![
            ElevationTile::filled(E0 + 50_000.0, N0, 20),
            ElevationTile::filled(E0, N0 - 50_000.0, 30),
            ElevationTile::filled(E0, N0, 10),
        ])
        .unwrap()
    }

    #[test]
    fn test_placement() {
        let map = three_tiles();
        assert_eq!(map.offsets(), (E0, N0));
        assert_eq!(map.tile_count(), 3);

        let t = TILE_SIZE as i32;
        assert_eq!(map.elevation(IntStep(0), IntStep(0)), Some(1.0));
        assert_eq!(map.elevation(IntStep(t - 1), IntStep(t - 1)), Some(1.0));
        assert_eq!(map.elevation(IntStep(t), IntStep(0)), Some(2.0));
        assert_eq!(map.elevation(IntStep(0), IntStep(t)), Some(3.0));
        assert_eq!(map.max_elevation(IntStep(t), IntStep(17)), Some(2.0));
        assert_eq!(map.elevation(IntStep(t), IntStep(t)), None);

        let coverage = map.coverage();
        let lines: Vec<&str> = coverage.lines().collect();
        assert_eq!(lines.len(), 50);
        assert!(lines[0].starts_with("XX-"));
        assert!(lines[1].starts_with("X--"));
        assert!(lines[2].chars().all(|c| c == '-'));
    }

    #[test]
    fn test_outside_is_absent() {
        let map = three_tiles();
        assert_eq!(map.sample(IntStep(-1), IntStep(0)), None);
        assert_eq!(map.sample(IntStep(0), IntStep(-1)), None);
        assert_eq!(map.sample(IntStep(250_000), IntStep(0)), None);
        assert!(map.lookup_maplet(IntStep(0), IntStep(250_000)).is_none());
        assert!(map.lookup_maplet(IntStep(0), IntStep(0)).is_some());
    }

    #[test]
    fn test_drops_out_of_grid_and_duplicates() {
        let map = ElevationMap::from_tiles(vec![
            ElevationTile::filled(E0, N0, 10),
            ElevationTile::filled(E0 + 2_500_000.0, N0, 20),
            ElevationTile::filled(E0, N0, 30),
        ])
        .unwrap();
        assert_eq!(map.tile_count(), 1);
        assert_eq!(map.elevation(IntStep(0), IntStep(0)), Some(1.0));
    }

    #[test]
    fn test_no_tiles() {
        assert!(matches!(
            ElevationMap::from_tiles(Vec::new()),
            Err(ElevationError::NoTiles)
        ));
    }

    #[test]
    fn test_maplet_lookup_matches_sample() {
        let f = |row: usize, col: usize| ((row * 31 + col * 17) % 3_000) as f32 * 0.1;
        let map = ElevationMap::from_tiles(vec![ElevationTile::from_fn(E0, N0, f)]).unwrap();
        for (row, col) in [(0, 0), (199, 200), (1_001, 4_999), (4_321, 77)] {
            let (e, n) = (IntStep(col as i32), IntStep(row as i32));
            let maplet = map.lookup_maplet(e, n).unwrap();
            let sample = maplet[(n.maplet_offset(), e.maplet_offset())];
            assert_eq!(sample, from_meters(f(row, col)));
            assert_eq!(map.sample(e, n), Some(sample));
            assert!(map.max_elevation(e, n).unwrap() >= crate::to_meters(sample));
        }
        assert!(map
            .lookup_maplet(IntStep(0), IntStep(0))
            .unwrap()
            .same(&map.lookup_maplet(IntStep(199), IntStep(199)).unwrap()));
        assert!(!map
            .lookup_maplet(IntStep(0), IntStep(0))
            .unwrap()
            .same(&map.lookup_maplet(IntStep(MAPLET_SIZE as i32), IntStep(0)).unwrap()));
    }

    #[test]
    fn test_coordinate_conversion() {
        let map = three_tiles();
        let (e, n) = map.to_steps(Coord {
            x: E0 + 1_234.0,
            y: N0 - 5_678.0,
        });
        assert_eq!((e, n), (IntStep(123), IntStep(568)));
        let coord = map.to_coord(e, n);
        assert_eq!(coord, Coord { x: E0 + 1_230.0, y: N0 - 5_680.0 });
    }

    #[test]
    fn test_load_skips_failed_sources() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join("nested").join("cache");
        let sources: Vec<_> = ["500000_7000000", "550000_7000000", "bad"]
            .iter()
            .map(|name| {
                let path = dir.path().join(name);
                fs::write(&path, b"").unwrap();
                path
            })
            .collect();

        let reader = |path: &Path| -> Result<RawGrid, ElevationError> {
            match path.file_name().and_then(|n| n.to_str()) {
                Some("500000_7000000") => Ok(RawGrid::from_fn(E0, N0, |_, _| 1.0)),
                Some("550000_7000000") => Ok(RawGrid::from_fn(E0 + 50_000.0, N0, |_, _| 2.0)),
                _ => Err(ElevationError::SourceName(path.to_owned())),
            }
        };

        let map = ElevationMap::load(&reader, &cache_dir, &sources).unwrap();
        assert_eq!(map.tile_count(), 2);
        assert_eq!(map.offsets(), (E0, N0));
        assert_eq!(map.elevation(IntStep(5_000), IntStep(10)), Some(2.0));
        assert!(cache_dir.join("500000_7000000.mmap").exists());
        assert!(!cache_dir.join("bad.mmap").exists());
    }

    #[test]
    fn test_load_rejects_file_as_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let not_a_dir = dir.path().join("cache");
        fs::write(&not_a_dir, b"").unwrap();
        let sources: [&Path; 0] = [];
        let reader = |path: &Path| -> Result<RawGrid, ElevationError> {
            Err(ElevationError::SourceName(path.to_owned()))
        };
        assert!(matches!(
            ElevationMap::load(&reader, &not_a_dir, &sources),
            Err(ElevationError::CacheDir(_))
        ));
    }

    #[test]
    fn test_load_with_nothing_loadable() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("bad");
        fs::write(&source, b"").unwrap();
        let reader = |path: &Path| -> Result<RawGrid, ElevationError> {
            Err(ElevationError::SourceName(path.to_owned()))
        };
        assert!(matches!(
            ElevationMap::load(&reader, dir.path(), &[source]),
            Err(ElevationError::NoTiles)
        ));
    }
}
