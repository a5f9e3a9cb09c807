//! Hex coordinate system using axial coordinates (q, r).
//!
//! Every tile on a Kavatar map is identified by a `HexCoord`. We use axial
//! coordinates because neighbor and distance calculations stay integer-only,
//! and because map tables are authored in the same notation.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The six directions from a hex to its neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    East,
    NorthEast,
    NorthWest,
    West,
    SouthWest,
    SouthEast,
}

impl Direction {
    /// All directions in counter-clockwise order starting from East
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::NorthEast,
        Direction::NorthWest,
        Direction::West,
        Direction::SouthWest,
        Direction::SouthEast,
    ];

    /// Axial offset `(dq, dr)` for one step in this direction
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::East => (1, 0),
            Direction::NorthEast => (1, -1),
            Direction::NorthWest => (0, -1),
            Direction::West => (-1, 0),
            Direction::SouthWest => (-1, 1),
            Direction::SouthEast => (0, 1),
        }
    }
}

/// Axial coordinate for hex grid.
///
/// In axial coordinates:
/// - `q` increases going east (right)
/// - `r` increases going southeast
/// - The third coordinate `s` (not stored) satisfies: q + r + s = 0
///
/// Coordinates order by row first (`r`, then `q`), which is the reading
/// order used to number tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct HexCoord {
    /// Column (increases going east)
    pub q: i32,
    /// Row (increases going southeast)
    pub r: i32,
}

impl PartialOrd for HexCoord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HexCoord {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.r, self.q).cmp(&(other.r, other.q))
    }
}

impl HexCoord {
    /// Create a new hex coordinate
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// The implicit third coordinate (s = -q - r)
    pub const fn s(&self) -> i32 {
        -self.q - self.r
    }

    /// The six neighboring hexes in counter-clockwise order starting from East.
    ///
    /// These are raw coordinates; whether they exist on a map is the grid's call.
    pub fn neighbors(&self) -> [HexCoord; 6] {
        Direction::ALL.map(|dir| self.neighbor(dir))
    }

    /// Get the neighbor in a specific direction
    pub fn neighbor(&self, direction: Direction) -> HexCoord {
        let (dq, dr) = direction.offset();
        HexCoord::new(self.q + dq, self.r + dr)
    }

    /// Distance to another hex (in hex steps)
    ///
    /// `(|dq| + |dq + dr| + |dr|) / 2`; the sum is always even.
    pub fn distance_to(&self, other: &HexCoord) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        ((dq.abs() + (dq + dr).abs() + dr.abs()) / 2) as u32
    }

    /// Whether `other` is exactly one step away
    pub fn is_adjacent(&self, other: &HexCoord) -> bool {
        self.distance_to(other) == 1
    }

    /// All coordinates within `radius` steps of this hex, including itself
    pub fn within(&self, radius: i32) -> Vec<HexCoord> {
        let mut coords = Vec::new();
        for dq in -radius..=radius {
            let r_min = (-radius).max(-dq - radius);
            let r_max = radius.min(-dq + radius);
            for dr in r_min..=r_max {
                coords.push(HexCoord::new(self.q + dq, self.r + dr));
            }
        }
        coords
    }
}

impl std::fmt::Display for HexCoord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_hex_neighbors() {
        let center = HexCoord::new(0, 0);
        let neighbors = center.neighbors();

        // Should have 6 unique neighbors
        let unique: HashSet<_> = neighbors.iter().collect();
        assert_eq!(unique.len(), 6);

        // Each neighbor should be distance 1 away
        for neighbor in &neighbors {
            assert_eq!(center.distance_to(neighbor), 1);
            assert!(center.is_adjacent(neighbor));
        }
    }

    #[test]
    fn test_hex_distance() {
        let a = HexCoord::new(0, 0);
        let b = HexCoord::new(2, -1);
        assert_eq!(a.distance_to(&b), 2);

        let c = HexCoord::new(-3, 3);
        assert_eq!(a.distance_to(&c), 3);

        // Symmetric, and zero to itself
        assert_eq!(c.distance_to(&a), 3);
        assert_eq!(b.distance_to(&b), 0);
    }

    #[test]
    fn test_distance_off_origin() {
        let a = HexCoord::new(-9, 7);
        let b = HexCoord::new(5, -1);
        // dq = -14, dr = 8, dq + dr = -6 => (14 + 6 + 8) / 2
        assert_eq!(a.distance_to(&b), 14);
    }

    #[test]
    fn test_within_counts() {
        let origin = HexCoord::new(0, 0);
        assert_eq!(origin.within(0), vec![origin]);
        assert_eq!(origin.within(1).len(), 7);
        assert_eq!(origin.within(6).len(), 127);

        for coord in HexCoord::new(2, -1).within(2) {
            assert!(coord.distance_to(&HexCoord::new(2, -1)) <= 2);
        }
    }

    #[test]
    fn test_reading_order() {
        let mut coords = vec![
            HexCoord::new(1, 0),
            HexCoord::new(-3, 1),
            HexCoord::new(2, -1),
            HexCoord::new(0, 0),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                HexCoord::new(2, -1),
                HexCoord::new(0, 0),
                HexCoord::new(1, 0),
                HexCoord::new(-3, 1),
            ]
        );
    }
}
