use crate::{
    curvature::CurvatureTable,
    error::HorizonError,
    stepper::{self, Axis, EastWest, FloatStepper, IntStepper, Major, NorthSouth},
};
use elevation::{ElevationMap, Elev, IntStep, Maplet, C, ELEV_UNIT, MAPLET_SIZE, UNIT};
use geo::geometry::Coord;
use log::debug;
use std::f64::consts::FRAC_PI_2;

/// How far below the visibility threshold a maplet's maximum must lie
/// before the maplet is skipped, in meters.
const SKIP_MARGIN: C = 1e-3;

/// Previous cursor offsets before the first step.
const NO_OFFSET: usize = 10_000;

/// Terrain seen through one angular bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPixel {
    /// Distance along the ground from the observer in meters.
    pub distance: C,

    /// Terrain slope at this point along the bearing, meters of rise
    /// per 10 m.
    pub incline: C,
}

/// Why a trace stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Reached the configured maximum distance.
    MaxDistance,

    /// Ran off the loaded elevation data (or started outside it).
    EdgeOfData,

    /// Every bucket holds a pixel.
    BucketsFilled,
}

/// Traces horizons from a fixed observer.
///
/// A tracer only reads from its map and curvature table; one instance
/// can serve concurrent traces.
pub struct HorizonTracer<'a> {
    map: &'a ElevationMap,
    curvature: &'a CurvatureTable,

    /// Observer position snapped to the grid.
    origin: Coord<C>,
    e0: IntStep,
    n0: IntStep,

    eye_height: C,
    max_distance: C,
    maplet_skip: bool,

    /// Tangent of the lower bound of each bucket, bottom first.
    thresholds: Box<[C]>,
}

impl<'a> HorizonTracer<'a> {
    pub fn builder() -> HorizonTracerBuilder {
        HorizonTracerBuilder {
            origin: None,
            buckets: None,
            eye_height: 9.0,
            bottom_angle: -0.06,
            angle_span: 0.08,
            max_distance: 200_000.0,
            maplet_skip: true,
        }
    }

    /// Observer position, snapped to the nearest grid point.
    pub fn origin(&self) -> Coord<C> {
        self.origin
    }

    pub fn buckets(&self) -> usize {
        self.thresholds.len()
    }

    pub fn eye_height(&self) -> C {
        self.eye_height
    }

    /// Ground elevation under the observer, if it is on loaded data.
    pub fn ground_elevation(&self) -> Option<C> {
        self.map.elevation(self.e0, self.n0)
    }

    /// Traces `bearing` (radians clockwise from north) into a new
    /// buffer.
    pub fn trace(&self, bearing: C) -> (Vec<GeoPixel>, Termination) {
        let mut pixels = Vec::with_capacity(self.buckets());
        let termination = self.trace_into(bearing, &mut pixels);
        (pixels, termination)
    }

    /// Traces `bearing` (radians clockwise from north), replacing the
    /// contents of `pixels`.
    ///
    /// Pixel `k` is the nearest terrain rising above the lower bound of
    /// bucket `k`. Fewer pixels than buckets mean the rest of the
    /// column is sky, or unknown if the trace hit the edge of data.
    pub fn trace_into(&self, bearing: C, pixels: &mut Vec<GeoPixel>) -> Termination {
        pixels.clear();
        let Some(ground) = self.ground_elevation() else {
            return Termination::EdgeOfData;
        };
        let (major, front, side, step_len) = stepper::for_bearing(self.e0, self.n0, bearing);
        match major {
            Major::EastWest => self.march::<EastWest>(ground, front, side, step_len, pixels),
            Major::NorthSouth => self.march::<NorthSouth>(ground, front, side, step_len, pixels),
        }
    }

    /// Returns the ground position seen at image `row` (0 is the top
    /// bucket) along `bearing`.
    pub fn locate(&self, bearing: C, row: usize) -> Result<Coord<C>, HorizonError> {
        let (pixels, _) = self.trace(bearing);
        self.locate_in(&pixels, bearing, row)
    }

    /// Like [`locate`](Self::locate), for `pixels` already traced along
    /// `bearing` by this tracer.
    pub fn locate_in(
        &self,
        pixels: &[GeoPixel],
        bearing: C,
        row: usize,
    ) -> Result<Coord<C>, HorizonError> {
        let buckets = self.buckets();
        if row >= buckets {
            return Err(HorizonError::RowOutOfRange { row, buckets });
        }
        let pixel = pixels
            .get(buckets - 1 - row)
            .ok_or(HorizonError::NoTerrain(row))?;
        let (sin, cos) = bearing.sin_cos();
        Ok(Coord {
            x: self.origin.x + sin * pixel.distance,
            y: self.origin.y + cos * pixel.distance,
        })
    }

    #[allow(clippy::cast_possible_truncation)]
    fn march<A: Axis>(
        &self,
        ground: C,
        front: IntStepper,
        side: FloatStepper,
        step_len: C,
        pixels: &mut Vec<GeoPixel>,
    ) -> Termination {
        let eye = ground + self.eye_height;
        let buckets = self.buckets();
        let total_steps = (self.max_distance / step_len) as i32;

        let mut prev = Cursor {
            front: NO_OFFSET,
            side: NO_OFFSET,
            side2: NO_OFFSET,
        };
        let mut sq0: Option<Maplet<'_>> = None;
        let mut sq1: Option<Maplet<'_>> = None;
        // Relative to eye level; the first step is measured against the
        // observer's own ground sample.
        let mut prev_elev = -self.eye_height;
        let mut prev_stale = false;

        let mut i = 1;
        while i <= total_steps {
            let f = front.at(i);
            let side_f = side.at(i);
            let side_floor = side_f.floor();
            let s = IntStep(side_floor as i32);
            let cur = Cursor::new(f, s);

            if crosses(prev.front, cur.front) {
                if self.maplet_skip {
                    let threshold = self.thresholds[pixels.len()];
                    if let Some(span) = self.skip_span::<A>(&front, &side, i, eye, step_len, threshold) {
                        i += span;
                        prev = Cursor::new(front.at(i - 1), IntStep(side.at(i - 1).floor() as i32));
                        prev_stale = true;
                        continue;
                    }
                }
                sq0 = lookup::<A>(self.map, f, s);
                sq1 = if cur.side2 == 0 {
                    lookup::<A>(self.map, f, s + 1)
                } else {
                    sq0
                };
            } else {
                if crosses(prev.side, cur.side) {
                    sq0 = if cur.side == 0 {
                        sq1
                    } else {
                        lookup::<A>(self.map, f, s)
                    };
                }
                if crosses(prev.side2, cur.side2) {
                    sq1 = if cur.side2 == 0 {
                        lookup::<A>(self.map, f, s + 1)
                    } else {
                        sq0
                    };
                }
            }
            let (Some(m0), Some(m1)) = (sq0, sq1) else {
                return Termination::EdgeOfData;
            };

            if prev_stale {
                match self.elevation_at::<A>(&front, &side, i - 1) {
                    Some(elev) => prev_elev = elev - eye,
                    None => return Termination::EdgeOfData,
                }
                prev_stale = false;
            }

            let elev = weight(
                m0[A::row_col(cur.front, cur.side)],
                m1[A::row_col(cur.front, cur.side2)],
                side_f - side_floor,
            ) - eye;
            let distance = step_len * C::from(i);
            let tan_x = (elev - self.curvature.decline(distance)) / distance;

            if tan_x > self.thresholds[pixels.len()] {
                let pixel = GeoPixel {
                    distance,
                    incline: (elev - prev_elev) * C::from(UNIT) / step_len,
                };
                while pixels.len() < buckets && tan_x > self.thresholds[pixels.len()] {
                    pixels.push(pixel);
                }
                if pixels.len() == buckets {
                    return Termination::BucketsFilled;
                }
            }

            prev_elev = elev;
            prev = cur;
            i += 1;
        }

        Termination::MaxDistance
    }

    /// Returns the number of steps, starting at step `i`, left in the
    /// current along-track maplet if none of them can rise above
    /// `threshold`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn skip_span<A: Axis>(
        &self,
        front: &IntStepper,
        side: &FloatStepper,
        i: i32,
        eye: C,
        step_len: C,
        threshold: C,
    ) -> Option<i32> {
        let f = front.at(i);
        let offset = f.maplet_offset();
        let span = (if front.step() > 0 {
            MAPLET_SIZE - offset
        } else {
            offset + 1
        }) as i32;
        let last = i + span - 1;

        // Curvature only grows with distance and `threshold · d` is
        // linear, so the bound holds for every step in between.
        let d_first = step_len * C::from(i);
        let d_last = step_len * C::from(last);
        let limit = eye + self.curvature.decline(d_first)
            + (threshold * d_first).min(threshold * d_last)
            - SKIP_MARGIN;

        let (a, b) = (side.at(i), side.at(last));
        let lo = a.min(b).floor() as i32;
        let hi = b.max(a).floor() as i32 + 1;
        let m = MAPLET_SIZE as i32;
        for k in lo.div_euclid(m)..=hi.div_euclid(m) {
            let (e, n) = A::en(f, IntStep(k * m));
            match self.map.max_elevation(e, n) {
                Some(max) if max < limit => {}
                _ => return None,
            }
        }
        Some(span)
    }

    /// Interpolated elevation at step `i`, read straight from the map.
    #[allow(clippy::cast_possible_truncation)]
    fn elevation_at<A: Axis>(&self, front: &IntStepper, side: &FloatStepper, i: i32) -> Option<C> {
        let f = front.at(i);
        let side_f = side.at(i);
        let side_floor = side_f.floor();
        let s = IntStep(side_floor as i32);
        let (e1, n1) = A::en(f, s);
        let (e2, n2) = A::en(f, s + 1);
        Some(weight(
            self.map.sample(e1, n1)?,
            self.map.sample(e2, n2)?,
            side_f - side_floor,
        ))
    }
}

pub struct HorizonTracerBuilder {
    origin: Option<Coord<C>>,
    buckets: Option<usize>,

    /// Observer height above the ground sample (meters).
    eye_height: C,

    /// Lower bound of the bottom bucket (radians).
    bottom_angle: C,

    /// Angle covered by all buckets together (radians).
    angle_span: C,

    /// Trace limit (meters).
    max_distance: C,

    /// Skip maplets that can't rise into view.
    maplet_skip: bool,
}

impl HorizonTracerBuilder {
    /// Observer easting/northing in meters.
    #[must_use]
    pub fn origin(mut self, coord: Coord<C>) -> Self {
        self.origin = Some(coord);
        self
    }

    #[must_use]
    pub fn buckets(mut self, buckets: usize) -> Self {
        self.buckets = Some(buckets);
        self
    }

    #[must_use]
    pub fn eye_height(mut self, meters: C) -> Self {
        self.eye_height = meters;
        self
    }

    #[must_use]
    pub fn bottom_angle(mut self, radians: C) -> Self {
        self.bottom_angle = radians;
        self
    }

    #[must_use]
    pub fn angle_span(mut self, radians: C) -> Self {
        self.angle_span = radians;
        self
    }

    #[must_use]
    pub fn max_distance(mut self, meters: C) -> Self {
        self.max_distance = meters;
        self
    }

    #[must_use]
    pub fn maplet_skip(mut self, skip: bool) -> Self {
        self.maplet_skip = skip;
        self
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn build<'a>(
        &self,
        map: &'a ElevationMap,
        curvature: &'a CurvatureTable,
    ) -> Result<HorizonTracer<'a>, HorizonError> {
        let origin = self.origin.ok_or(HorizonError::Builder("origin"))?;
        let buckets = self.buckets.ok_or(HorizonError::Builder("buckets"))?;

        if !(origin.x.is_finite() && origin.y.is_finite()) {
            return Err(HorizonError::Param("origin"));
        }
        if buckets == 0 {
            return Err(HorizonError::Param("buckets"));
        }
        if !self.eye_height.is_finite() {
            return Err(HorizonError::Param("eye_height"));
        }
        if !(self.bottom_angle.is_finite() && self.bottom_angle > -FRAC_PI_2) {
            return Err(HorizonError::Param("bottom_angle"));
        }
        if !(self.angle_span > 0.0 && self.bottom_angle + self.angle_span < FRAC_PI_2) {
            return Err(HorizonError::Param("angle_span"));
        }
        if !(self.max_distance > 0.0 && self.max_distance <= curvature.max_distance()) {
            return Err(HorizonError::Param("max_distance"));
        }

        let (e0, n0) = map.to_steps(origin);
        let width = self.angle_span / buckets as C;
        let thresholds = (0..buckets)
            .map(|k| (self.bottom_angle + k as C * width).tan())
            .collect();

        let tracer = HorizonTracer {
            map,
            curvature,
            origin: map.to_coord(e0, n0),
            e0,
            n0,
            eye_height: self.eye_height,
            max_distance: self.max_distance,
            maplet_skip: self.maplet_skip,
            thresholds,
        };
        debug!(
            "tracer; origin: {:?}, buckets: {}, eye: {}, skip: {}",
            tracer.origin, buckets, tracer.eye_height, tracer.maplet_skip
        );
        Ok(tracer)
    }
}

/// Maplet-local offsets of a step and of its cross-track neighbor.
#[derive(Debug, Clone, Copy)]
struct Cursor {
    front: usize,
    side: usize,
    side2: usize,
}

impl Cursor {
    fn new(front: IntStep, side: IntStep) -> Self {
        Self {
            front: front.maplet_offset(),
            side: side.maplet_offset(),
            side2: (side + 1).maplet_offset(),
        }
    }
}

/// `true` unless `a` and `b` are the same or neighboring offsets of
/// one maplet.
#[inline]
fn crosses(a: usize, b: usize) -> bool {
    a.abs_diff(b) > 1
}

#[inline]
fn lookup<A: Axis>(map: &ElevationMap, front: IntStep, side: IntStep) -> Option<Maplet<'_>> {
    let (e, n) = A::en(front, side);
    map.lookup_maplet(e, n)
}

/// Blends two neighboring samples, `w` being the weight of `e2`, into
/// meters.
#[inline]
fn weight(e1: Elev, e2: Elev, w: C) -> C {
    (C::from(e2) * w + C::from(e1) * (1.0 - w)) * ELEV_UNIT
}
