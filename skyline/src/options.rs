use anyhow::{anyhow, Error as AnyError};
use clap::{Parser, Subcommand};
use geo::geometry::Coord;
use std::{path::PathBuf, str::FromStr};

/// Trace terrain horizons from a point.
#[derive(Parser, Debug, Clone)]
pub struct Cli {
    /// Directory of `<min_easting>_<max_northing>.f32` elevation grids.
    #[arg(short, long)]
    pub source_dir: PathBuf,

    /// Directory for memory-mapped tile blocks [default:
    /// <SOURCE_DIR>/cache].
    #[arg(short, long)]
    pub cache_dir: Option<PathBuf>,

    /// Observer "easting,northing", in meters.
    #[arg(long)]
    pub origin: EastNorth,

    /// Observer height above ground, in meters.
    #[arg(long, default_value_t = 9.0)]
    pub eye_height: f64,

    /// Number of angular buckets (image rows) per column.
    #[arg(short, long, default_value_t = 500)]
    pub buckets: usize,

    /// Angle of the bottom of the image, in radians.
    #[arg(long, default_value_t = -0.06, allow_negative_numbers = true)]
    pub bottom_angle: f64,

    /// Angle covered by the image, in radians.
    #[arg(long, default_value_t = 0.08)]
    pub angle_span: f64,

    /// Maximum trace distance, in meters.
    #[arg(long, default_value_t = 200_000.0)]
    pub max_distance: f64,

    /// Step through every sample instead of skipping hidden maplets.
    #[arg(long, default_value_t = false)]
    pub no_skip: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Clone, Debug, Copy, PartialEq)]
pub struct EastNorth(pub Coord<f64>);

impl FromStr for EastNorth {
    type Err = AnyError;
    fn from_str(s: &str) -> Result<Self, AnyError> {
        let (easting, northing) = s
            .split_once(',')
            .ok_or_else(|| anyhow!("not a valid easting,northing"))?;
        let x = f64::from_str(easting.trim())?;
        let y = f64::from_str(northing.trim())?;
        Ok(Self(Coord { x, y }))
    }
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one column of pixels as JSON.
    Trace {
        /// Degrees clockwise from north.
        #[arg(long, allow_negative_numbers = true)]
        bearing: f64,
    },

    /// Print the ground point seen at an image row as JSON.
    Locate {
        /// Degrees clockwise from north.
        #[arg(long, allow_negative_numbers = true)]
        bearing: f64,

        /// Image row, 0 being the top.
        #[arg(long)]
        row: usize,
    },

    /// Trace evenly spaced columns and print a JSON summary per
    /// column.
    Sweep {
        /// First bearing, degrees clockwise from north.
        #[arg(long, allow_negative_numbers = true)]
        from: f64,

        /// Last bearing, degrees clockwise from north.
        #[arg(long, allow_negative_numbers = true)]
        to: f64,

        /// Number of columns.
        #[arg(long, default_value_t = 360)]
        columns: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command, EastNorth};
    use clap::Parser;
    use geo::geometry::Coord;

    #[test]
    fn test_parse_east_north() {
        assert_eq!(
            "500000,7000000".parse::<EastNorth>().unwrap(),
            EastNorth(Coord {
                x: 500_000.0,
                y: 7_000_000.0
            })
        );
        assert_eq!(
            " 1.5, -2 ".parse::<EastNorth>().unwrap(),
            EastNorth(Coord { x: 1.5, y: -2.0 })
        );
        assert!("500000".parse::<EastNorth>().is_err());
        assert!("a,b".parse::<EastNorth>().is_err());
    }

    #[test]
    fn test_parse_cli() {
        let cli = Cli::try_parse_from([
            "skyline",
            "--source-dir",
            "grids",
            "--origin",
            "500000,7000000",
            "--bottom-angle",
            "-0.1",
            "locate",
            "--bearing",
            "-45",
            "--row",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.bottom_angle, -0.1);
        assert_eq!(cli.buckets, 500);
        assert!(cli.cache_dir.is_none());
        assert!(matches!(cli.cmd, Command::Locate { row: 3, bearing } if bearing == -45.0));
    }
}
