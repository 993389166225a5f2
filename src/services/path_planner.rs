//! Path planner - walkable route from the walker to the current target area
//!
//! Routes are recomputed, never patched, and only when the walker or the
//! target moved further than the recompute threshold since the last query.

use crate::domain::events::{FloorEvent, Route};
use crate::domain::types::Vec3;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::nav::NavSurface;
use crate::services::area_set::AreaObject;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Planner tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathConfig {
    /// Displacement (meters) that triggers a recompute
    pub recompute_distance: f32,
    /// Fixed radius used to find the walkable surface near either endpoint
    pub sample_radius: f32,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self { recompute_distance: 0.5, sample_radius: 2.0 }
    }
}

impl PathConfig {
    pub fn from_config(config: &Config) -> Self {
        Self { recompute_distance: config.recompute_distance(), sample_radius: config.sample_radius() }
    }
}

pub struct PathPlanner {
    config: PathConfig,
    target: Option<Vec3>,
    last_walker: Option<Vec3>,
    last_target: Option<Vec3>,
    route: Option<Route>,
    paused: bool,
    force_recompute: bool,
    metrics: Option<Arc<Metrics>>,
}

impl PathPlanner {
    pub fn new(config: PathConfig) -> Self {
        Self {
            config,
            target: None,
            last_walker: None,
            last_target: None,
            route: None,
            paused: false,
            force_recompute: false,
            metrics: None,
        }
    }

    /// Create a planner with metrics recording
    pub fn with_metrics(config: PathConfig, metrics: Arc<Metrics>) -> Self {
        Self { metrics: Some(metrics), ..Self::new(config) }
    }

    /// Aim at the center of `object`'s trigger volume
    ///
    /// Returns false (and keeps the previous target) when the object has no
    /// usable trigger volume.
    pub fn set_target(&mut self, object: &AreaObject) -> bool {
        let Some(trigger) = object.usable_trigger() else {
            warn!(area = ?object.definition, "path_target_without_trigger");
            return false;
        };

        debug!(target = %trigger.center, "path_target_set");
        self.target = Some(trigger.center);
        self.force_recompute = true;
        true
    }

    /// Drop the target and route; returns the resulting empty update
    pub fn clear_target(&mut self) -> FloorEvent {
        self.target = None;
        self.route = None;
        self.last_target = None;
        self.force_recompute = false;
        FloorEvent::PathUpdated(None)
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn target(&self) -> Option<Vec3> {
        self.target
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    /// Current route length, 0 without a route
    pub fn distance(&self) -> f32 {
        self.route.as_ref().map_or(0.0, |r| r.length)
    }

    fn needs_recompute(&self, walker: Vec3, target: Vec3) -> bool {
        if self.force_recompute {
            return true;
        }
        let threshold_sq = self.config.recompute_distance * self.config.recompute_distance;
        let walker_moved =
            self.last_walker.map_or(true, |last| last.distance_squared(walker) > threshold_sq);
        let target_moved =
            self.last_target.map_or(true, |last| last.distance_squared(target) > threshold_sq);
        walker_moved || target_moved
    }

    /// Per-tick evaluation; returns `PathUpdated` when a recompute happened
    pub fn tick<S: NavSurface + ?Sized>(&mut self, walker: Vec3, surface: &S) -> Option<FloorEvent> {
        if self.paused {
            return None;
        }
        let target = self.target?;
        if !self.needs_recompute(walker, target) {
            return None;
        }

        self.force_recompute = false;
        self.last_walker = Some(walker);
        self.last_target = Some(target);
        self.route = Self::compute(walker, target, surface, self.config.sample_radius);

        if let Some(ref metrics) = self.metrics {
            metrics.record_path_recompute(self.route.is_some());
        }

        match &self.route {
            Some(route) => trace!(
                waypoints = %route.waypoints.len(),
                length = %route.length,
                "path_recomputed"
            ),
            None => debug!(walker = %walker, target = %target, "path_unavailable"),
        }

        Some(FloorEvent::PathUpdated(self.route.clone()))
    }

    fn compute<S: NavSurface + ?Sized>(
        walker: Vec3,
        target: Vec3,
        surface: &S,
        sample_radius: f32,
    ) -> Option<Route> {
        let from = surface.sample_position(walker, sample_radius)?;
        let to = surface.sample_position(target, sample_radius)?;
        let waypoints = surface.find_path(from, to)?;
        Some(Route::new(waypoints))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::TriggerVolume;
    use crate::nav::GridNavMesh;

    fn mesh() -> GridNavMesh {
        GridNavMesh::open([0.0, 0.0], 1.0, 0.0, 10, 10)
    }

    fn area_at(x: f32, z: f32) -> AreaObject {
        AreaObject::bound("a", TriggerVolume::new(Vec3::new(x, 0.0, z), Vec3::new(0.5, 1.0, 0.5)))
    }

    fn route_of(event: Option<FloorEvent>) -> Option<Route> {
        match event {
            Some(FloorEvent::PathUpdated(route)) => route,
            other => panic!("expected PathUpdated, got {other:?}"),
        }
    }

    #[test]
    fn test_no_target_no_update() {
        let mut planner = PathPlanner::new(PathConfig::default());
        assert!(planner.tick(Vec3::new(1.0, 0.0, 1.0), &mesh()).is_none());
    }

    #[test]
    fn test_recompute_on_target_set() {
        let mut planner = PathPlanner::new(PathConfig::default());
        assert!(planner.set_target(&area_at(4.5, 0.5)));

        let route = route_of(planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh())).unwrap();

        assert!((route.length - 4.0).abs() < 1e-4);
        assert!((planner.distance() - 4.0).abs() < 1e-4);
    }

    #[test]
    fn test_stationary_walker_does_not_recompute() {
        let mut planner = PathPlanner::new(PathConfig::default());
        planner.set_target(&area_at(4.5, 0.5));
        let mesh = mesh();

        assert!(planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh).is_some());
        assert!(planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh).is_none());
        // Below threshold
        assert!(planner.tick(Vec3::new(0.7, 0.0, 0.5), &mesh).is_none());
        // Beyond threshold
        assert!(planner.tick(Vec3::new(1.5, 0.0, 0.5), &mesh).is_some());
    }

    #[test]
    fn test_target_without_trigger_rejected() {
        let mut planner = PathPlanner::new(PathConfig::default());
        let object = AreaObject::new(None, None);
        assert!(!planner.set_target(&object));
        assert!(planner.target().is_none());
    }

    #[test]
    fn test_clear_target_reports_empty_route() {
        let mut planner = PathPlanner::new(PathConfig::default());
        planner.set_target(&area_at(4.5, 0.5));
        planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh());

        assert_eq!(planner.clear_target(), FloorEvent::PathUpdated(None));
        assert_eq!(planner.distance(), 0.0);
        assert!(planner.tick(Vec3::new(3.0, 0.0, 3.0), &mesh()).is_none());
    }

    #[test]
    fn test_off_surface_walker_reports_absent_route() {
        let mut planner = PathPlanner::new(PathConfig { recompute_distance: 0.5, sample_radius: 1.0 });
        planner.set_target(&area_at(4.5, 0.5));

        assert_eq!(route_of(planner.tick(Vec3::new(50.0, 0.0, 50.0), &mesh())), None);
        assert_eq!(planner.distance(), 0.0);
    }

    #[test]
    fn test_paused_planner_is_silent() {
        let mut planner = PathPlanner::new(PathConfig::default());
        planner.set_target(&area_at(4.5, 0.5));
        planner.pause();
        assert!(planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh()).is_none());

        planner.resume();
        assert!(planner.tick(Vec3::new(0.5, 0.0, 0.5), &mesh()).is_some());
    }
}
