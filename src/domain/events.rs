//! Commands accepted from and events raised to the display layer

use crate::domain::types::{AreaDefinition, FloorDefinition, Vec3};
use serde::Serialize;
use std::sync::Arc;

/// A walkable route between the walker and the current target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Route {
    pub waypoints: Vec<Vec3>,
    /// Total length in meters
    pub length: f32,
}

impl Route {
    pub fn new(waypoints: Vec<Vec3>) -> Self {
        let length = route_length(&waypoints);
        Self { waypoints, length }
    }
}

/// Sum of consecutive waypoint distances; 0 for fewer than 2 waypoints
pub fn route_length(waypoints: &[Vec3]) -> f32 {
    waypoints.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Connection state transition reported by positioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionChange {
    Lost,
    Restored,
}

impl ConnectionChange {
    pub fn connected(self) -> bool {
        matches!(self, ConnectionChange::Restored)
    }
}

/// Events raised by a single floor's progression state machine
#[derive(Debug, Clone, PartialEq)]
pub enum FloorEvent {
    AreaConfirmed(Arc<AreaDefinition>),
    GuidingToNext(Arc<AreaDefinition>),
    PathUpdated(Option<Route>),
    FloorCompleted,
}

/// Tour-wide events delivered to the display layer
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "t", rename_all = "snake_case")]
pub enum TourEvent {
    FloorLoaded {
        floor: Arc<FloorDefinition>,
        floor_index: usize,
        /// Effective number of resolvable areas on this floor
        area_count: usize,
        visited: usize,
        total: usize,
    },
    FloorUnloaded {
        floor: Arc<FloorDefinition>,
    },
    FloorFailed {
        floor_index: usize,
        reason: String,
    },
    AreaConfirmed {
        area: Arc<AreaDefinition>,
    },
    GuidingToNext {
        area: Arc<AreaDefinition>,
    },
    PathUpdated {
        route: Option<Route>,
    },
    ProgressChanged {
        visited: usize,
        total: usize,
        progress: f32,
    },
    TourCompleted {
        visited: usize,
        total: usize,
    },
    TourStopped {
        return_home: bool,
    },
    ConnectionChanged {
        connected: bool,
    },
}

impl TourEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TourEvent::FloorLoaded { .. } => "floor_loaded",
            TourEvent::FloorUnloaded { .. } => "floor_unloaded",
            TourEvent::FloorFailed { .. } => "floor_failed",
            TourEvent::AreaConfirmed { .. } => "area_confirmed",
            TourEvent::GuidingToNext { .. } => "guiding_to_next",
            TourEvent::PathUpdated { .. } => "path_updated",
            TourEvent::ProgressChanged { .. } => "progress_changed",
            TourEvent::TourCompleted { .. } => "tour_completed",
            TourEvent::TourStopped { .. } => "tour_stopped",
            TourEvent::ConnectionChanged { .. } => "connection_changed",
        }
    }
}

/// Commands accepted from the display layer
#[derive(Debug, Clone, PartialEq)]
pub enum TourCommand {
    SelectTour(String),
    BeginTour,
    UserReady,
    RequestNext,
    ContinueToNextFloor,
    /// Dev/test override of the sensor connection state
    SetConnection(bool),
    StopTour { return_home: bool },
    /// Direction input for keyboard positioning (x, z), each in -1..=1
    Steer { x: f32, z: f32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_length_three_four_five() {
        let route = Route::new(vec![Vec3::new(0.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 4.0)]);
        assert_eq!(route.length, 5.0);
    }

    #[test]
    fn test_route_length_degenerate() {
        assert_eq!(route_length(&[]), 0.0);
        assert_eq!(route_length(&[Vec3::new(1.0, 2.0, 3.0)]), 0.0);
    }

    #[test]
    fn test_route_length_multi_segment() {
        let waypoints =
            [Vec3::new(0.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 4.0), Vec3::new(3.0, 0.0, 10.0)];
        assert_eq!(route_length(&waypoints), 11.0);
    }

    #[test]
    fn test_tour_event_serializes_with_tag() {
        let event = TourEvent::ProgressChanged { visited: 1, total: 4, progress: 0.25 };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""t":"progress_changed""#));
        assert_eq!(event.as_str(), "progress_changed");
    }
}
