//! Positioning - drives the walker from an external position feed
//!
//! Two interchangeable strategies implement [`Positioning`]:
//! - `sensor` - polls a [`PositionSource`] (indoor positioning hardware or a
//!   recording), debounces signal loss and clamps samples to the walkable surface
//! - `keyboard` - integrates a local steering direction, for testing without hardware
//!
//! The strategy is chosen at runtime from configuration; the floor progression
//! logic only ever sees the walker position.

mod keyboard;
mod sensor;

pub use keyboard::{KeyboardConfig, KeyboardPositioning};
pub use sensor::{SensorConfig, SensorPositioning};

use crate::domain::events::ConnectionChange;
use crate::domain::types::Vec3;
use crate::infra::config::{Config, PositioningMode};
use crate::infra::metrics::Metrics;
use crate::nav::NavSurface;
use std::sync::Arc;
use std::time::Instant;

/// External supplier of raw walker coordinates
///
/// Each poll either yields a position or fails; polling is O(1) and never queued.
pub trait PositionSource: Send {
    fn poll(&mut self) -> Option<Vec3>;
}

impl PositionSource for Box<dyn PositionSource> {
    fn poll(&mut self) -> Option<Vec3> {
        (**self).poll()
    }
}

/// The body being guided through the floor
#[derive(Debug, Clone, PartialEq)]
pub struct Walker {
    position: Vec3,
    movement_enabled: bool,
}

impl Walker {
    pub fn new(spawn: Vec3) -> Self {
        Self { position: spawn, movement_enabled: false }
    }

    #[inline]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    #[inline]
    pub fn movement_enabled(&self) -> bool {
        self.movement_enabled
    }

    pub fn set_movement_enabled(&mut self, enabled: bool) {
        self.movement_enabled = enabled;
    }

    /// Move to `p` if movement is enabled; returns whether the walker moved
    pub fn move_to(&mut self, p: Vec3) -> bool {
        if !self.movement_enabled {
            return false;
        }
        self.position = p;
        true
    }
}

/// Common contract of the sensor and keyboard strategies
pub trait Positioning: Send {
    /// Begin polling; idempotent
    fn start_tracking(&mut self);

    /// Stop polling; idempotent and safe during teardown
    fn stop_tracking(&mut self);

    fn is_tracking(&self) -> bool;

    fn is_connected(&self) -> bool;

    /// Dev/test override of the connection state
    fn set_connected(&mut self, connected: bool) -> Option<ConnectionChange>;

    /// Steering input (x, z); ignored by strategies that do not use it
    fn steer(&mut self, _x: f32, _z: f32) {}

    /// Advance one logical frame, moving `walker` toward the latest position.
    ///
    /// Returns a connection change when one happened this tick.
    fn tick(
        &mut self,
        now: Instant,
        surface: Option<&dyn NavSurface>,
        walker: &mut Walker,
    ) -> Option<ConnectionChange>;
}

/// Build the configured strategy.
///
/// Sensor mode without a source falls back to keyboard positioning.
pub fn from_config(
    config: &Config,
    source: Option<Box<dyn PositionSource>>,
    metrics: Arc<Metrics>,
) -> Box<dyn Positioning> {
    match (config.positioning_mode(), source) {
        (PositioningMode::Sensor, Some(source)) => Box::new(SensorPositioning::with_metrics(
            source,
            SensorConfig::from_config(config),
            metrics,
        )),
        (PositioningMode::Sensor, None) => {
            tracing::warn!("positioning_sensor_without_source_using_keyboard");
            Box::new(KeyboardPositioning::new(KeyboardConfig::from_config(config)))
        }
        (PositioningMode::Keyboard, _) => {
            Box::new(KeyboardPositioning::new(KeyboardConfig::from_config(config)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_walker_respects_movement_flag() {
        let mut walker = Walker::new(Vec3::ZERO);
        assert!(!walker.move_to(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(walker.position(), Vec3::ZERO);

        walker.set_movement_enabled(true);
        assert!(walker.move_to(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(walker.position(), Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_from_config_selects_strategy() {
        let metrics = Arc::new(Metrics::new());
        let keyboard = from_config(&Config::default(), None, metrics);
        // Keyboard positioning is always connected
        assert!(keyboard.is_connected());
    }
}
