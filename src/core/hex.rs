//! Axial hex geometry
//!
//! Coordinates use the axial (q, r) system. Facing is expressed in degrees
//! (multiples of 60) where 180 means "local forward is +q".

use serde::{Deserialize, Deserializer, Serialize};
use smallvec::SmallVec;
use std::fmt;

/// Axial directions in index order (used for direction indices 0..6)
pub const AXIAL_DIRECTIONS: [HexCoord; 6] = [
    HexCoord { q: 1, r: 0 },
    HexCoord { q: 1, r: -1 },
    HexCoord { q: 0, r: -1 },
    HexCoord { q: -1, r: 0 },
    HexCoord { q: -1, r: 1 },
    HexCoord { q: 0, r: 1 },
];

/// An axial hex coordinate
///
/// Deserialization accepts fractional input and rounds to the nearest
/// integer, so equality is always by rounded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct HexCoord {
    #[serde(deserialize_with = "deserialize_rounded")]
    pub q: i32,
    #[serde(deserialize_with = "deserialize_rounded")]
    pub r: i32,
}

fn deserialize_rounded<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() {
        return Err(serde::de::Error::custom("coordinate must be finite"));
    }
    Ok(value.round() as i32)
}

impl HexCoord {
    pub const fn new(q: i32, r: i32) -> Self {
        HexCoord { q, r }
    }

    pub fn offset(self, delta: HexCoord) -> Self {
        HexCoord::new(self.q + delta.q, self.r + delta.r)
    }

    pub fn delta_to(self, other: HexCoord) -> Self {
        HexCoord::new(other.q - self.q, other.r - self.r)
    }

    pub fn scale(self, factor: i32) -> Self {
        HexCoord::new(self.q * factor, self.r * factor)
    }

    pub fn invert(self) -> Self {
        HexCoord::new(-self.q, -self.r)
    }

    /// Rotate one step (60 degrees) clockwise
    pub fn rotate_cw(self) -> Self {
        HexCoord::new(-self.r, self.q + self.r)
    }

    /// Rotate by `steps` clockwise steps (negative steps wrap)
    pub fn rotate(self, steps: i32) -> Self {
        let mut rotated = self;
        for _ in 0..steps.rem_euclid(6) {
            rotated = rotated.rotate_cw();
        }
        rotated
    }

    /// Cube distance between two hexes
    pub fn distance(self, other: HexCoord) -> i32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        let ds = (self.q + self.r) - (other.q + other.r);
        (dq.abs() + dr.abs() + ds.abs()) / 2
    }

    /// The hex plus its six neighbours, centre first
    pub fn touching(self) -> SmallVec<[HexCoord; 7]> {
        let mut hexes = SmallVec::new();
        hexes.push(self);
        for direction in AXIAL_DIRECTIONS {
            hexes.push(self.offset(direction));
        }
        hexes
    }
}

impl fmt::Display for HexCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.q, self.r)
    }
}

/// Local (facing-relative) step directions used by action paths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LocalDirection {
    F,
    B,
    L,
    R,
    BL,
    BR,
}

impl LocalDirection {
    pub fn vector(self) -> HexCoord {
        match self {
            LocalDirection::F => HexCoord::new(1, 0),
            LocalDirection::B => HexCoord::new(-1, 0),
            LocalDirection::L => HexCoord::new(1, -1),
            LocalDirection::R => HexCoord::new(0, 1),
            LocalDirection::BL => HexCoord::new(-1, 1),
            LocalDirection::BR => HexCoord::new(0, -1),
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "F" => Some(LocalDirection::F),
            "B" => Some(LocalDirection::B),
            "L" => Some(LocalDirection::L),
            "R" => Some(LocalDirection::R),
            "BL" => Some(LocalDirection::BL),
            "BR" => Some(LocalDirection::BR),
            _ => None,
        }
    }
}

/// Normalize degrees into [0, 360)
pub fn normalize_degrees(value: i32) -> i32 {
    value.rem_euclid(360)
}

/// Number of clockwise steps that map local forward onto the given facing
pub fn facing_rotation_steps(facing: i32) -> i32 {
    let offset = (normalize_degrees(facing) - 180) as f64 / 60.0;
    (offset.round() as i32).rem_euclid(6)
}

/// Rotate a local vector into world space for the given facing
pub fn apply_facing(vector: HexCoord, facing: i32) -> HexCoord {
    vector.rotate(facing_rotation_steps(facing))
}

/// World-space forward vector for a facing
pub fn forward_vector(facing: i32) -> HexCoord {
    apply_facing(LocalDirection::F.vector(), facing)
}

/// Index of the axial direction whose positive integer multiple equals `delta`
pub fn direction_index(delta: HexCoord) -> Option<usize> {
    AXIAL_DIRECTIONS.iter().position(|dir| {
        let scale = if dir.q != 0 {
            if delta.q % dir.q != 0 {
                return false;
            }
            delta.q / dir.q
        } else {
            if delta.q != 0 || delta.r % dir.r != 0 {
                return false;
            }
            delta.r / dir.r
        };
        scale > 0 && dir.scale(scale) == delta
    })
}

/// Degrees encoded by a rotation label ("0", "R1", "L2", "3", ...)
pub fn parse_rotation_degrees(rotation: &str) -> i32 {
    let trimmed = rotation.trim().to_ascii_uppercase();
    if trimmed.is_empty() {
        return 0;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return match trimmed.parse::<i32>() {
            Ok(steps) if steps <= 5 => steps * 60,
            Ok(steps) => steps,
            Err(_) => 0,
        };
    }
    let direction = if trimmed.starts_with('L') {
        -1
    } else if trimmed.starts_with('R') {
        1
    } else {
        return 0;
    };
    let digits: String = trimmed
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse::<i32>().map(|steps| direction * steps * 60).unwrap_or(0)
}

/// Number of 60-degree steps in a rotation label regardless of direction
pub fn rotation_magnitude(rotation: &str) -> Option<i32> {
    let trimmed = rotation.trim().to_ascii_uppercase();
    match trimmed.as_str() {
        "" => None,
        "0" => Some(0),
        "3" => Some(3),
        label if label.starts_with('L') || label.starts_with('R') => label[1..].parse().ok(),
        _ => None,
    }
}

/// The land-hex set of a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Land {
    tiles: Vec<HexCoord>,
}

const DEFAULT_LAND_ROWS: [(i32, i32, i32); 3] = [(0, -2, 2), (1, -2, 1), (-1, -1, 2)];

impl Land {
    pub fn new(tiles: Vec<HexCoord>) -> Self {
        Land { tiles }
    }

    pub fn tiles(&self) -> &[HexCoord] {
        &self.tiles
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, coord: HexCoord) -> bool {
        self.tiles.contains(&coord)
    }

    /// Minimum distance to any land tile (`None` when there is no land)
    pub fn distance_to_land(&self, coord: HexCoord) -> Option<i32> {
        self.tiles.iter().map(|tile| coord.distance(*tile)).min()
    }

    /// Tile closest to the average of all land tiles
    pub fn center(&self) -> HexCoord {
        if self.tiles.is_empty() {
            return HexCoord::default();
        }
        let count = self.tiles.len() as f64;
        let q = self.tiles.iter().map(|t| t.q as f64).sum::<f64>() / count;
        let r = self.tiles.iter().map(|t| t.r as f64).sum::<f64>() / count;
        HexCoord::new(q.round() as i32, r.round() as i32)
    }
}

impl Default for Land {
    fn default() -> Self {
        let mut tiles = Vec::new();
        for (r, q_min, q_max) in DEFAULT_LAND_ROWS {
            for q in q_min..=q_max {
                tiles.push(HexCoord::new(q, r));
            }
        }
        Land { tiles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_facing_steps() {
        assert_eq!(facing_rotation_steps(180), 0);
        assert_eq!(facing_rotation_steps(0), 3);
        assert_eq!(facing_rotation_steps(240), 1);
        assert_eq!(facing_rotation_steps(-60), 2);
    }

    #[test]
    fn test_forward_vector_follows_facing() {
        assert_eq!(forward_vector(180), HexCoord::new(1, 0));
        assert_eq!(forward_vector(0), HexCoord::new(-1, 0));
        assert_eq!(forward_vector(240), HexCoord::new(0, 1));
    }

    #[test]
    fn test_direction_index() {
        assert_eq!(direction_index(HexCoord::new(3, 0)), Some(0));
        assert_eq!(direction_index(HexCoord::new(-2, 2)), Some(4));
        assert_eq!(direction_index(HexCoord::new(0, -1)), Some(2));
        assert_eq!(direction_index(HexCoord::new(2, 1)), None);
        assert_eq!(direction_index(HexCoord::new(0, 0)), None);
    }

    #[test]
    fn test_distance() {
        let origin = HexCoord::new(0, 0);
        assert_eq!(origin.distance(HexCoord::new(2, -1)), 2);
        assert_eq!(origin.distance(HexCoord::new(-3, 3)), 3);
    }

    #[test]
    fn test_rotation_labels() {
        assert_eq!(parse_rotation_degrees("R1"), 60);
        assert_eq!(parse_rotation_degrees("L2"), -120);
        assert_eq!(parse_rotation_degrees("3"), 180);
        assert_eq!(parse_rotation_degrees("90"), 90);
        assert_eq!(parse_rotation_degrees(""), 0);
        assert_eq!(rotation_magnitude("L2"), Some(2));
        assert_eq!(rotation_magnitude("3"), Some(3));
        assert_eq!(rotation_magnitude("X"), None);
    }

    #[test]
    fn test_default_land() {
        let land = Land::default();
        assert_eq!(land.tiles().len(), 13);
        assert!(land.contains(HexCoord::new(2, 0)));
        assert!(!land.contains(HexCoord::new(2, 1)));
        assert_eq!(land.distance_to_land(HexCoord::new(5, 0)), Some(3));
    }

    #[test]
    fn test_coord_rounds_on_deserialize() {
        let coord: HexCoord = serde_json::from_str(r#"{"q": 1.2, "r": -0.6}"#).unwrap();
        assert_eq!(coord, HexCoord::new(1, -1));
    }
}
