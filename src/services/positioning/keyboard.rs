//! Keyboard positioning - integrates a local steering direction

use super::{Positioning, Walker};
use crate::domain::events::ConnectionChange;
use crate::domain::types::Vec3;
use crate::infra::config::Config;
use crate::nav::{clamp_to_surface, ClampSearch, NavSurface};
use std::time::Instant;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardConfig {
    /// Walking speed (m/s) at full steer
    pub speed: f32,
    pub clamp: ClampSearch,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self { speed: 1.4, clamp: ClampSearch::default() }
    }
}

impl KeyboardConfig {
    pub fn from_config(config: &Config) -> Self {
        Self { speed: config.keyboard_speed(), clamp: config.clamp_search() }
    }
}

pub struct KeyboardPositioning {
    config: KeyboardConfig,
    tracking: bool,
    connected: bool,
    direction: (f32, f32),
    last_tick: Option<Instant>,
}

impl KeyboardPositioning {
    pub fn new(config: KeyboardConfig) -> Self {
        Self { config, tracking: false, connected: true, direction: (0.0, 0.0), last_tick: None }
    }

    pub fn direction(&self) -> (f32, f32) {
        self.direction
    }
}

impl Positioning for KeyboardPositioning {
    fn start_tracking(&mut self) {
        if self.tracking {
            return;
        }
        self.tracking = true;
        self.last_tick = None;
        info!(speed = %self.config.speed, "positioning_tracking_started");
    }

    fn stop_tracking(&mut self) {
        if !self.tracking {
            return;
        }
        self.tracking = false;
        self.direction = (0.0, 0.0);
        info!("positioning_tracking_stopped");
    }

    fn is_tracking(&self) -> bool {
        self.tracking
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_connected(&mut self, connected: bool) -> Option<ConnectionChange> {
        if self.connected == connected {
            return None;
        }
        self.connected = connected;
        info!(connected = %connected, "positioning_connection_overridden");
        Some(if connected { ConnectionChange::Restored } else { ConnectionChange::Lost })
    }

    /// Direction components are clamped to [-1, 1]; diagonal input is normalized
    fn steer(&mut self, x: f32, z: f32) {
        let x = if x.is_finite() { x.clamp(-1.0, 1.0) } else { 0.0 };
        let z = if z.is_finite() { z.clamp(-1.0, 1.0) } else { 0.0 };
        let len = (x * x + z * z).sqrt();
        self.direction = if len > 1.0 { (x / len, z / len) } else { (x, z) };
    }

    fn tick(
        &mut self,
        now: Instant,
        surface: Option<&dyn NavSurface>,
        walker: &mut Walker,
    ) -> Option<ConnectionChange> {
        if !self.tracking {
            return None;
        }

        let dt = self.last_tick.map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_tick = Some(now);

        let (dx, dz) = self.direction;
        if dt <= 0.0 || (dx == 0.0 && dz == 0.0) {
            return None;
        }

        let step = self.config.speed * dt;
        let proposed = walker.position() + Vec3::new(dx * step, 0.0, dz * step);
        let next = match surface {
            Some(surface) => match clamp_to_surface(surface, proposed, &self.config.clamp) {
                Some(p) => p,
                None => {
                    debug!(proposed = %proposed, "keyboard_step_off_surface");
                    return None;
                }
            },
            None => proposed,
        };
        walker.move_to(next);
        None
    }
}
