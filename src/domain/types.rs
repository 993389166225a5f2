//! Shared types for the tour navigation core

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use std::sync::Arc;

/// World-space point or vector (y is up)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    #[inline]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    #[inline]
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    #[inline]
    pub fn distance(self, other: Vec3) -> f32 {
        (other - self).length()
    }

    #[inline]
    pub fn distance_squared(self, other: Vec3) -> f32 {
        (other - self).length_squared()
    }

    /// Move toward `target` by at most `max_step`, landing exactly on it when close enough
    pub fn move_towards(self, target: Vec3, max_step: f32) -> Vec3 {
        let delta = target - self;
        let dist = delta.length();
        if dist <= max_step || dist <= f32::EPSILON {
            return target;
        }
        self + delta * (max_step / dist)
    }

    #[inline]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    #[inline]
    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Vec3;

    #[inline]
    fn sub(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Vec3;

    #[inline]
    fn mul(self, rhs: f32) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f32; 3]> for Vec3 {
    fn from(v: [f32; 3]) -> Self {
        Vec3::new(v[0], v[1], v[2])
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Axis-aligned trigger volume around an area
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerVolume {
    pub center: Vec3,
    pub half_extents: Vec3,
}

impl TriggerVolume {
    pub fn new(center: Vec3, half_extents: Vec3) -> Self {
        Self { center, half_extents }
    }

    /// A volume with zero or negative extents can never be entered
    pub fn is_usable(&self) -> bool {
        self.center.is_finite()
            && self.half_extents.is_finite()
            && self.half_extents.x > 0.0
            && self.half_extents.y > 0.0
            && self.half_extents.z > 0.0
    }

    pub fn contains(&self, p: Vec3) -> bool {
        (p.x - self.center.x).abs() <= self.half_extents.x
            && (p.y - self.center.y).abs() <= self.half_extents.y
            && (p.z - self.center.z).abs() <= self.half_extents.z
    }
}

/// Newtype wrapper for area identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(pub String);

impl AreaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AreaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Static description of a point of interest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaDefinition {
    pub id: AreaId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Image/audio/video references resolved by the display layer
    #[serde(default)]
    pub media: Vec<String>,
    /// Whether the display layer must show an informational pause on entry
    #[serde(default)]
    pub info_pause: bool,
}

impl AreaDefinition {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: AreaId::new(id),
            name: name.to_string(),
            description: String::new(),
            media: Vec::new(),
            info_pause: false,
        }
    }

    pub fn with_info_pause(mut self, info_pause: bool) -> Self {
        self.info_pause = info_pause;
        self
    }

    /// True when there is something to show before moving on
    pub fn has_info(&self) -> bool {
        self.info_pause || !self.description.is_empty() || !self.media.is_empty()
    }
}

/// One level of the building: an ordered area sequence plus its loadable content
#[derive(Debug, Clone, Serialize)]
pub struct FloorDefinition {
    pub name: String,
    /// Area-set identifier handed to the loader
    pub area_set: String,
    /// Text shown while walking to the next floor
    pub transition_text: String,
    pub areas: Vec<Arc<AreaDefinition>>,
}

impl FloorDefinition {
    pub fn area_count(&self) -> usize {
        self.areas.len()
    }
}

/// A complete guided walk
#[derive(Debug, Clone, Serialize)]
pub struct TourDefinition {
    pub id: String,
    pub name: String,
    pub floors: Vec<Arc<FloorDefinition>>,
}

impl TourDefinition {
    /// Sum of area counts over all floors
    pub fn total_areas(&self) -> usize {
        self.floors.iter().map(|f| f.area_count()).sum()
    }
}

/// Normalized progress, 0 when nothing is countable
#[inline]
pub fn progress_ratio(visited: usize, total: usize) -> f32 {
    if total == 0 {
        0.0
    } else {
        visited as f32 / total as f32
    }
}
