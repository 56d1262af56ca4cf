use elevation::{IntStep, C};

/// Along-track position: moves exactly one grid step per iteration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IntStepper {
    start: i32,
    step: i32,
}

impl IntStepper {
    pub(crate) fn new(start: IntStep, step: i32) -> Self {
        debug_assert!(step == 1 || step == -1);
        Self {
            start: start.0,
            step,
        }
    }

    #[inline]
    pub(crate) fn at(&self, i: i32) -> IntStep {
        IntStep(self.start + self.step * i)
    }

    pub(crate) fn step(&self) -> i32 {
        self.step
    }
}

/// Cross-track position in fractional grid steps; moves at most one
/// step per iteration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FloatStepper {
    start: C,
    step: C,
}

impl FloatStepper {
    pub(crate) fn new(start: IntStep, step: C) -> Self {
        Self {
            start: C::from(start.0),
            step,
        }
    }

    #[inline]
    pub(crate) fn at(&self, i: i32) -> C {
        self.start + self.step * C::from(i)
    }
}

/// Maps along-track/cross-track pairs onto easting/northing.
pub(crate) trait Axis {
    /// Returns `(easting, northing)`.
    fn en<T>(front: T, side: T) -> (T, T);

    /// Returns the maplet `(row, col)` of an along-track and a
    /// cross-track offset.
    #[inline]
    fn row_col(front: usize, side: usize) -> (usize, usize) {
        let (col, row) = Self::en(front, side);
        (row, col)
    }
}

/// Steps along easting; northing is cross-track.
pub(crate) struct EastWest;

impl Axis for EastWest {
    #[inline]
    fn en<T>(front: T, side: T) -> (T, T) {
        (front, side)
    }
}

/// Steps along northing; easting is cross-track.
pub(crate) struct NorthSouth;

impl Axis for NorthSouth {
    #[inline]
    fn en<T>(front: T, side: T) -> (T, T) {
        (side, front)
    }
}

/// Returns the steppers, their axis, and the length in meters of one
/// step for `bearing` (radians clockwise from north).
pub(crate) fn for_bearing(e0: IntStep, n0: IntStep, bearing: C) -> (Major, IntStepper, FloatStepper, C) {
    let (sin, cos) = bearing.sin_cos();
    if sin.abs() > cos.abs() {
        (
            Major::EastWest,
            IntStepper::new(e0, if sin < 0.0 { -1 } else { 1 }),
            FloatStepper::new(n0, -cos / sin.abs()),
            C::from(elevation::UNIT) / sin.abs(),
        )
    } else {
        (
            Major::NorthSouth,
            // Northing steps grow southward.
            IntStepper::new(n0, if cos < 0.0 { 1 } else { -1 }),
            FloatStepper::new(e0, sin / cos.abs()),
            C::from(elevation::UNIT) / cos.abs(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Major {
    EastWest,
    NorthSouth,
}

#[cfg(test)]
mod tests {
    use super::{for_bearing, Axis, EastWest, Major, NorthSouth};
    use elevation::IntStep;
    use std::f64::consts::{FRAC_PI_2, PI, TAU};

    #[test]
    fn test_axis_mapping() {
        assert_eq!(EastWest::en(1, 2), (1, 2));
        assert_eq!(NorthSouth::en(1, 2), (2, 1));
        assert_eq!(EastWest::row_col(1, 2), (2, 1));
        assert_eq!(NorthSouth::row_col(1, 2), (1, 2));
    }

    #[test]
    fn test_cardinal_bearings() {
        let (e0, n0) = (IntStep(100), IntStep(200));
        let (major, front, side, len) = for_bearing(e0, n0, 0.0);
        assert_eq!(major, Major::NorthSouth);
        assert_eq!(front.at(3), IntStep(197));
        assert_eq!(side.at(3), 100.0);
        assert_eq!(len, 10.0);

        let (major, front, _, _) = for_bearing(e0, n0, FRAC_PI_2);
        assert_eq!(major, Major::EastWest);
        assert_eq!(front.at(3), IntStep(103));

        let (major, front, _, _) = for_bearing(e0, n0, PI);
        assert_eq!(major, Major::NorthSouth);
        assert_eq!(front.at(3), IntStep(203));

        let (major, front, _, _) = for_bearing(e0, n0, 3.0 * FRAC_PI_2);
        assert_eq!(major, Major::EastWest);
        assert_eq!(front.at(3), IntStep(97));
    }

    #[test]
    fn test_never_skips_a_unit() {
        for k in 0..720 {
            let bearing = TAU * f64::from(k) / 720.0;
            let (_, front, side, len) = for_bearing(IntStep(0), IntStep(0), bearing);
            assert!((10.0..=10.0 * 2.0_f64.sqrt() + 1e-9).contains(&len));
            for i in 1..500 {
                assert_eq!((front.at(i) - front.at(i - 1)).abs(), 1);
                assert!((side.at(i) - side.at(i - 1)).abs() <= 1.0 + 1e-12);
            }
            // One step covers `len` meters on the ground.
            let along = 10.0_f64;
            let across = (side.at(1) - side.at(0)) * 10.0;
            assert!((along.hypot(across) - len).abs() < 1e-9, "bearing {bearing}");
        }
    }
}
