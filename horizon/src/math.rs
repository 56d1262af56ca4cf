use num_traits::{Float, FloatConst};

/// Returns the up/down angle (in radians) from a point at
/// `start_elev_m` to a point at `end_elev_m`, `distance_m` apart, on a
/// sphere of radius `earth_radius`.
pub fn elevation_angle<T>(start_elev_m: T, distance_m: T, end_elev_m: T, earth_radius: T) -> T
where
    T: Float + FloatConst,
{
    let two = T::one() + T::one();
    let a = distance_m;
    let b = start_elev_m + earth_radius;
    let c = end_elev_m + earth_radius;
    let inner = ((a.powi(2) + b.powi(2) - c.powi(2)) / (two * a * b))
        .max(-T::one())
        .min(T::one());
    inner.acos() - T::FRAC_PI_2()
}

#[cfg(test)]
mod tests {
    use super::elevation_angle;
    use crate::EARTH_RADIUS;
    use approx::assert_relative_eq;

    #[test]
    fn test_elevation_angle() {
        assert_relative_eq!(
            0.100_167_342_359_641_42,
            elevation_angle(1.0, 1.0, 1.1, EARTH_RADIUS),
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_level_target_dips_below_horizontal() {
        // Same height 10 km out: the earth curves away by about
        // d / 2R radians.
        let angle = elevation_angle(0.0_f64, 10_000.0, 0.0, EARTH_RADIUS);
        assert_relative_eq!(angle, -10_000.0 / (2.0 * EARTH_RADIUS), epsilon = 1e-7);
    }
}
