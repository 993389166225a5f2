//! Walkable surface and path-graph queries
//!
//! Positioning clamps raw positions onto the walkable surface; the path
//! planner samples both ends of a route on it and asks the path graph for a
//! traversable route. Area-sets provide the concrete surface (`GridNavMesh`).

mod grid;

pub use grid::GridNavMesh;

use crate::domain::types::Vec3;

/// Point queries against the walkable surface
pub trait WalkableSurface {
    /// Nearest walkable point within `max_distance` of `p`, if any
    fn sample_position(&self, p: Vec3, max_distance: f32) -> Option<Vec3>;
}

/// Route queries between two points already on the walkable surface
pub trait PathGraph {
    /// Ordered waypoints from `from` to `to`, or `None` if no traversable path exists
    fn find_path(&self, from: Vec3, to: Vec3) -> Option<Vec<Vec3>>;
}

/// Everything a floor needs from its navigation data
pub trait NavSurface: WalkableSurface + PathGraph + Send + Sync {}

impl<T: WalkableSurface + PathGraph + Send + Sync> NavSurface for T {}

/// Expanding-radius search parameters for clamping positions to the surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClampSearch {
    pub start_radius: f32,
    pub growth: f32,
    pub max_radius: f32,
}

impl Default for ClampSearch {
    fn default() -> Self {
        Self { start_radius: 0.5, growth: 2.0, max_radius: 8.0 }
    }
}

/// Clamp `p` to the nearest walkable point, widening the search radius by
/// `growth` until `max_radius` is reached.
pub fn clamp_to_surface<S: WalkableSurface + ?Sized>(
    surface: &S,
    p: Vec3,
    search: &ClampSearch,
) -> Option<Vec3> {
    let max_radius = search.max_radius.max(search.start_radius);
    let mut radius = search.start_radius.max(f32::EPSILON);

    loop {
        if let Some(hit) = surface.sample_position(p, radius) {
            return Some(hit);
        }
        if radius >= max_radius {
            return None;
        }
        let next = radius * search.growth;
        // A growth factor <= 1 would never terminate; jump straight to the cap
        radius = if next <= radius { max_radius } else { next.min(max_radius) };
    }
}
