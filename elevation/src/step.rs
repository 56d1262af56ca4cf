use crate::{C, MAPLETS_PER_TILE, MAPLET_SIZE, TILE_SIZE, UNIT};
use std::ops::{Add, Sub};

/// Integer grid coordinate: meters relative to the dataset origin
/// divided by [`UNIT`].
///
/// Kept distinct from raw meters so the two can't be mixed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IntStep(pub i32);

impl IntStep {
    /// Returns the step nearest to `meters` (relative to the origin).
    #[allow(clippy::cast_possible_truncation)]
    pub fn from_meters(meters: C) -> Self {
        Self((meters / C::from(UNIT)).round() as i32)
    }

    /// Meters from the origin.
    pub fn meters(self) -> C {
        C::from(self.0) * C::from(UNIT)
    }

    /// Row/column of this step inside its maplet.
    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn maplet_offset(self) -> usize {
        self.0.rem_euclid(MAPLET_SIZE as i32) as usize
    }

    /// Maplet row/column of this step inside its tile.
    #[inline]
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_wrap)]
    pub fn maplet_index(self) -> usize {
        (self.0.div_euclid(MAPLET_SIZE as i32)).rem_euclid(MAPLETS_PER_TILE as i32) as usize
    }

    /// Tile row/column of this step inside the map.
    ///
    /// Negative for steps before the origin.
    #[inline]
    #[allow(clippy::cast_possible_wrap)]
    pub fn tile_index(self) -> i32 {
        self.0.div_euclid(TILE_SIZE as i32)
    }
}

impl Add<i32> for IntStep {
    type Output = Self;

    fn add(self, rhs: i32) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub<i32> for IntStep {
    type Output = Self;

    fn sub(self, rhs: i32) -> Self {
        Self(self.0 - rhs)
    }
}

impl Sub for IntStep {
    type Output = i32;

    fn sub(self, rhs: Self) -> i32 {
        self.0 - rhs.0
    }
}
