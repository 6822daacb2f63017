//! Grid coordinates for territory cells.

use serde::{Deserialize, Serialize};

/// A fixed-size territory cell on the world grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellPos {
    pub x: i32,
    pub z: i32,
}

impl CellPos {
    pub const ORIGIN: Self = Self { x: 0, z: 0 };

    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Grid-box distance: the larger of the two axis offsets.
    pub fn chebyshev(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.z - other.z).abs())
    }

    pub fn distance_squared(&self, other: &Self) -> f64 {
        let dx = (self.x - other.x) as f64;
        let dz = (self.z - other.z) as f64;
        dx * dx + dz * dz
    }

    pub fn distance(&self, other: &Self) -> f64 {
        self.distance_squared(other).sqrt()
    }

    /// True if this cell lies inside the square of `radius` around `center`.
    pub fn within_box(&self, center: &Self, radius: i32) -> bool {
        self.chebyshev(center) <= radius
    }
}

impl std::fmt::Display for CellPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.x, self.z)
    }
}

/// Every cell in the square of `radius` around `center`, x-major, ascending.
///
/// A negative radius yields nothing.
pub fn cells_in_box(center: CellPos, radius: i32) -> impl Iterator<Item = CellPos> {
    let span = if radius < 0 { None } else { Some(radius) };
    span.into_iter().flat_map(move |r| {
        (center.x - r..=center.x + r)
            .flat_map(move |x| (center.z - r..=center.z + r).map(move |z| CellPos::new(x, z)))
    })
}
