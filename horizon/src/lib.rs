//! Horizon tracing over an [`elevation::ElevationMap`].
//!
//! A [`HorizonTracer`] marches outward from an observer along a bearing
//! and reports, for each angular bucket of a vertical image column, the
//! first terrain that rises above it as a [`GeoPixel`].

mod curvature;
mod error;
mod math;
mod stepper;
mod tracer;

pub use crate::{
    curvature::CurvatureTable,
    error::HorizonError,
    math::elevation_angle,
    tracer::{GeoPixel, HorizonTracer, HorizonTracerBuilder, Termination},
};

/// Mean radius of the (spherical) earth in meters.
pub const EARTH_RADIUS: f64 = 6_371_000.0;
