use crate::EARTH_RADIUS;
use elevation::{C, MAPLET_SIZE, UNIT};

/// Elevation lost to earth curvature, by distance.
///
/// Entry `i` holds the drop at `i × 10 m` multiplied out so a tracer
/// can subtract it from a terrain elevation directly.
#[derive(Debug, Clone)]
pub struct CurvatureTable {
    table: Box<[C]>,
}

impl CurvatureTable {
    /// Returns a table covering `[0, max_distance]` meters plus two
    /// maplets of look-ahead.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn new(max_distance: C) -> Self {
        let covered = (max_distance.max(0.0) / C::from(UNIT)).ceil() as usize;
        let table = (0..=covered + 2 * MAPLET_SIZE)
            .map(|i| decline_at(i as C * C::from(UNIT)))
            .collect();
        Self { table }
    }

    /// Returns the curvature drop in meters at `distance`, quantized
    /// down to a 10 m step.
    #[inline]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn decline(&self, distance: C) -> C {
        let idx = (distance / C::from(UNIT)) as usize;
        match self.table.get(idx) {
            Some(decline) => *decline,
            None => decline_at(idx as C * C::from(UNIT)),
        }
    }

    /// Largest trace distance this table was built for.
    #[allow(clippy::cast_precision_loss)]
    pub fn max_distance(&self) -> C {
        (self.table.len() - 1 - 2 * MAPLET_SIZE) as C * C::from(UNIT)
    }
}

impl Default for CurvatureTable {
    fn default() -> Self {
        Self::new(200_000.0)
    }
}

fn decline_at(distance: C) -> C {
    distance * (distance / 2.0).atan2(EARTH_RADIUS)
}

#[cfg(test)]
mod tests {
    use super::CurvatureTable;
    use approx::assert_relative_eq;

    #[test]
    fn test_monotonic() {
        let curvature = CurvatureTable::default();
        assert_eq!(curvature.decline(0.0), 0.0);
        assert_eq!(curvature.max_distance(), 200_000.0);
        let mut prev = 0.0;
        for i in 0..curvature.table.len() {
            let decline = curvature.table[i];
            assert!(decline >= prev, "entry {i}");
            prev = decline;
        }
    }

    #[test]
    fn test_decline() {
        let curvature = CurvatureTable::new(50_000.0);
        // 10 km: d² / 2R
        assert_relative_eq!(curvature.decline(10_000.0), 7.848, epsilon = 1e-3);
        assert_eq!(curvature.decline(10_009.9), curvature.decline(10_000.0));
        assert_eq!(curvature.decline(-5.0), 0.0);
        // Past the table the closed form takes over.
        assert_relative_eq!(
            curvature.decline(100_000.0),
            CurvatureTable::default().decline(100_000.0)
        );
    }

    #[test]
    fn test_coverage_rounds_up() {
        assert_eq!(CurvatureTable::new(12_345.0).max_distance(), 12_350.0);
        assert_eq!(CurvatureTable::new(0.0).max_distance(), 0.0);
    }
}
