//! Grid geometry: positions, Manhattan distance, and centroids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A cell coordinate on the device grid.
///
/// `x` grows rightward, `y` grows downward; both are zero-based.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub struct Position {
    /// Column index.
    pub x: u32,
    /// Row index.
    pub y: u32,
}

impl Position {
    /// Creates a position from column and row indices.
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Offsets the position by a signed delta, returning `None` if either
    /// coordinate would become negative.
    pub fn offset(self, dx: i64, dy: i64) -> Option<Position> {
        let x = i64::from(self.x) + dx;
        let y = i64::from(self.y) + dy;
        if x < 0 || y < 0 {
            return None;
        }
        Some(Position::new(x as u32, y as u32))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Manhattan distance between two grid positions.
pub fn manhattan_distance(a: Position, b: Position) -> u64 {
    u64::from(a.x.abs_diff(b.x)) + u64::from(a.y.abs_diff(b.y))
}

/// Rounds to the nearest integer with ties broken toward the lower value.
fn round_half_down(v: f64) -> u32 {
    let floor = v.floor();
    if v - floor > 0.5 {
        floor as u32 + 1
    } else {
        floor as u32
    }
}

/// Computes the integer centroid of a cell set, or `None` if it is empty.
///
/// Each axis is the rounded mean of the coordinates; ties break toward the
/// lower coordinate.
pub fn centroid<'a, I>(cells: I) -> Option<Position>
where
    I: IntoIterator<Item = &'a Position>,
{
    let mut sum_x = 0u64;
    let mut sum_y = 0u64;
    let mut count = 0u64;
    for cell in cells {
        sum_x += u64::from(cell.x);
        sum_y += u64::from(cell.y);
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(Position::new(
        round_half_down(sum_x as f64 / count as f64),
        round_half_down(sum_y as f64 / count as f64),
    ))
}
