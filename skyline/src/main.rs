mod options;

use anyhow::{anyhow, Result};
use clap::Parser;
use elevation::{ElevationMap, F32GridReader};
use horizon::{elevation_angle, CurvatureTable, GeoPixel, HorizonTracer, Termination, EARTH_RADIUS};
use log::info;
use options::{Cli, Command};
use rayon::prelude::*;
use serde::Serialize;
use std::{
    fs,
    path::{Path, PathBuf},
};

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();

    let sources = find_sources(&cli.source_dir)?;
    let cache_dir = cli
        .cache_dir
        .clone()
        .unwrap_or_else(|| cli.source_dir.join("cache"));
    let map = ElevationMap::load(&F32GridReader, &cache_dir, &sources)?;
    let curvature = CurvatureTable::new(cli.max_distance);
    let tracer = HorizonTracer::builder()
        .origin(cli.origin.0)
        .buckets(cli.buckets)
        .eye_height(cli.eye_height)
        .bottom_angle(cli.bottom_angle)
        .angle_span(cli.angle_span)
        .max_distance(cli.max_distance)
        .maplet_skip(!cli.no_skip)
        .build(&map, &curvature)?;

    match cli.cmd {
        Command::Trace { bearing } => print_trace(&tracer, bearing),
        Command::Locate { bearing, row } => print_locate(&map, &tracer, bearing, row),
        Command::Sweep { from, to, columns } => print_sweep(&tracer, from, to, columns),
    }
}

/// Returns every grid in `dir` the reader understands, sorted by name.
fn find_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut sources = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && F32GridReader::is_source(&path) {
            sources.push(path);
        }
    }
    if sources.is_empty() {
        return Err(anyhow!("no elevation grids in {}", dir.display()));
    }
    sources.sort();
    info!("found {} elevation grids in {}", sources.len(), dir.display());
    Ok(sources)
}

fn radians(degrees: f64) -> Result<f64> {
    if degrees.is_finite() {
        Ok(degrees.to_radians())
    } else {
        Err(anyhow!("invalid bearing {degrees}"))
    }
}

/// `columns` bearings from `from` to `to` inclusive, in degrees.
#[allow(clippy::cast_precision_loss)]
fn spread(from: f64, to: f64, columns: usize) -> Vec<f64> {
    match columns {
        0 => Vec::new(),
        1 => vec![from],
        n => (0..n)
            .map(|k| from + (to - from) * k as f64 / (n - 1) as f64)
            .collect(),
    }
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum JsonTermination {
    MaxDistance,
    EdgeOfData,
    BucketsFilled,
}

impl From<Termination> for JsonTermination {
    fn from(other: Termination) -> Self {
        match other {
            Termination::MaxDistance => Self::MaxDistance,
            Termination::EdgeOfData => Self::EdgeOfData,
            Termination::BucketsFilled => Self::BucketsFilled,
        }
    }
}

#[derive(Serialize)]
struct JsonPixel {
    distance: f64,
    incline: f64,
}

impl From<&GeoPixel> for JsonPixel {
    fn from(other: &GeoPixel) -> Self {
        Self {
            distance: other.distance,
            incline: other.incline,
        }
    }
}

fn print_trace(tracer: &HorizonTracer<'_>, bearing: f64) -> Result<()> {
    #[derive(Serialize)]
    struct JsonTrace {
        origin: [f64; 2],
        bearing: f64,
        termination: JsonTermination,
        pixels: Vec<JsonPixel>,
    }

    let (pixels, termination) = tracer.trace(radians(bearing)?);
    let origin = tracer.origin();
    let json = serde_json::to_string(&JsonTrace {
        origin: [origin.x, origin.y],
        bearing,
        termination: termination.into(),
        pixels: pixels.iter().map(JsonPixel::from).collect(),
    })?;
    println!("{json}");
    Ok(())
}

fn print_locate(map: &ElevationMap, tracer: &HorizonTracer<'_>, bearing: f64, row: usize) -> Result<()> {
    #[derive(Serialize)]
    struct JsonLocation {
        location: [f64; 2],
        distance: f64,
        elevation: Option<f64>,
        angle: Option<f64>,
    }

    let (pixels, _) = tracer.trace(radians(bearing)?);
    let coord = tracer.locate_in(&pixels, radians(bearing)?, row)?;
    let origin = tracer.origin();
    let distance = (coord.x - origin.x).hypot(coord.y - origin.y);

    let (e, n) = map.to_steps(coord);
    let elevation = map.elevation(e, n);
    let angle = match (tracer.ground_elevation(), elevation) {
        (Some(ground), Some(target)) if distance > 0.0 => Some(elevation_angle(
            ground + tracer.eye_height(),
            distance,
            target,
            EARTH_RADIUS,
        )),
        _ => None,
    };

    let json = serde_json::to_string(&JsonLocation {
        location: [coord.x, coord.y],
        distance,
        elevation,
        angle,
    })?;
    println!("{json}");
    Ok(())
}

fn print_sweep(tracer: &HorizonTracer<'_>, from: f64, to: f64, columns: usize) -> Result<()> {
    #[derive(Serialize)]
    struct JsonColumn {
        bearing: f64,
        pixels: usize,
        farthest: Option<f64>,
        termination: JsonTermination,
    }

    let bearings = spread(from, to, columns);
    for bearing in &bearings {
        radians(*bearing)?;
    }
    let summaries: Vec<JsonColumn> = bearings
        .par_iter()
        .map(|&bearing| {
            let (pixels, termination) = tracer.trace(bearing.to_radians());
            JsonColumn {
                bearing,
                pixels: pixels.len(),
                farthest: pixels.last().map(|p| p.distance),
                termination: termination.into(),
            }
        })
        .collect();

    for summary in &summaries {
        println!("{}", serde_json::to_string(summary)?);
    }
    Ok(())
}
