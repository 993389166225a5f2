//! Sensor-driven positioning with debounced signal loss
//!
//! Loss is declared only after `loss_threshold` consecutive failed polls,
//! recovery on the first good sample after that.

use super::{PositionSource, Positioning, Walker};
use crate::domain::events::ConnectionChange;
use crate::domain::types::Vec3;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::nav::{clamp_to_surface, ClampSearch, NavSurface};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, trace, warn};

/// Sensor strategy tuning
#[derive(Debug, Clone, PartialEq)]
pub struct SensorConfig {
    /// Time between polls; zero polls every tick
    pub poll_interval: Duration,
    /// Consecutive failed polls before loss is declared
    pub loss_threshold: u32,
    pub clamp: ClampSearch,
    pub smoothing: bool,
    /// Max walker speed (m/s) while smoothing
    pub smoothing_speed: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::ZERO,
            loss_threshold: 50,
            clamp: ClampSearch::default(),
            smoothing: false,
            smoothing_speed: 1.5,
        }
    }
}

impl SensorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms()),
            loss_threshold: config.loss_threshold(),
            clamp: config.clamp_search(),
            smoothing: config.smoothing_enabled(),
            smoothing_speed: config.smoothing_speed(),
        }
    }
}

pub struct SensorPositioning<S: PositionSource> {
    source: S,
    config: SensorConfig,
    tracking: bool,
    connected: bool,
    consecutive_failures: u32,
    loss_reported: bool,
    last_poll: Option<Instant>,
    last_tick: Option<Instant>,
    /// Latest clamped sample the walker is heading to
    goal: Option<Vec3>,
    metrics: Option<Arc<Metrics>>,
}

impl<S: PositionSource> SensorPositioning<S> {
    pub fn new(source: S, config: SensorConfig) -> Self {
        Self {
            source,
            config,
            tracking: false,
            connected: false,
            consecutive_failures: 0,
            loss_reported: false,
            last_poll: None,
            last_tick: None,
            goal: None,
            metrics: None,
        }
    }

    /// Create a sensor strategy with metrics recording
    pub fn with_metrics(source: S, config: SensorConfig, metrics: Arc<Metrics>) -> Self {
        Self { metrics: Some(metrics), ..Self::new(source, config) }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn goal(&self) -> Option<Vec3> {
        self.goal
    }

    fn poll_due(&self, now: Instant) -> bool {
        if self.config.poll_interval.is_zero() {
            return true;
        }
        self.last_poll.map_or(true, |last| now.duration_since(last) >= self.config.poll_interval)
    }

    fn record_failure(&mut self) -> Option<ConnectionChange> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if let Some(ref metrics) = self.metrics {
            metrics.record_poll(false);
        }

        if self.consecutive_failures >= self.config.loss_threshold.max(1) && !self.loss_reported {
            self.loss_reported = true;
            self.connected = false;
            warn!(failures = %self.consecutive_failures, "positioning_connection_lost");
            if let Some(ref metrics) = self.metrics {
                metrics.record_connection_change(false);
            }
            return Some(ConnectionChange::Lost);
        }
        None
    }

    fn record_success(&mut self) -> Option<ConnectionChange> {
        self.consecutive_failures = 0;
        if let Some(ref metrics) = self.metrics {
            metrics.record_poll(true);
        }

        if self.loss_reported || !self.connected {
            self.loss_reported = false;
            self.connected = true;
            info!("positioning_connection_restored");
            if let Some(ref metrics) = self.metrics {
                metrics.record_connection_change(true);
            }
            return Some(ConnectionChange::Restored);
        }
        None
    }

    fn clamp(&self, raw: Vec3, surface: Option<&dyn NavSurface>) -> Vec3 {
        let Some(surface) = surface else {
            return raw;
        };
        match clamp_to_surface(surface, raw, &self.config.clamp) {
            Some(clamped) => clamped,
            None => {
                warn!(
                    raw = %raw,
                    max_radius = %self.config.clamp.max_radius,
                    "positioning_clamp_failed_using_raw"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.record_clamp_fallback();
                }
                raw
            }
        }
    }
}

impl<S: PositionSource> Positioning for SensorPositioning<S> {
    fn start_tracking(&mut self) {
        if self.tracking {
            return;
        }
        self.tracking = true;
        self.last_poll = None;
        self.last_tick = None;
        info!(
            poll_interval_ms = %self.config.poll_interval.as_millis(),
            loss_threshold = %self.config.loss_threshold,
            smoothing = %self.config.smoothing,
            "positioning_tracking_started"
        );
    }

    fn stop_tracking(&mut self) {
        if !self.tracking {
            return;
        }
        self.tracking = false;
        self.goal = None;
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
        self.loss_reported = !connected;
        self.consecutive_failures = 0;
        info!(connected = %connected, "positioning_connection_overridden");
        Some(if connected { ConnectionChange::Restored } else { ConnectionChange::Lost })
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

        let mut change = None;
        if self.poll_due(now) {
            self.last_poll = Some(now);
            match self.source.poll() {
                Some(raw) => {
                    change = self.record_success();
                    let goal = self.clamp(raw, surface);
                    self.goal = Some(goal);
                    if !self.config.smoothing {
                        walker.move_to(goal);
                    }
                    trace!(raw = %raw, goal = %goal, "positioning_sample");
                }
                None => {
                    change = self.record_failure();
                }
            }
        }

        if self.config.smoothing {
            if let Some(goal) = self.goal {
                let step = self.config.smoothing_speed * dt;
                walker.move_to(walker.position().move_towards(goal, step));
            }
        }

        change
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::GridNavMesh;
    use std::collections::VecDeque;

    /// Source replaying a fixed script; exhausted scripts keep failing
    struct ScriptedSource(VecDeque<Option<Vec3>>);

    impl ScriptedSource {
        fn new(samples: impl IntoIterator<Item = Option<Vec3>>) -> Self {
            Self(samples.into_iter().collect())
        }
    }

    impl PositionSource for ScriptedSource {
        fn poll(&mut self) -> Option<Vec3> {
            self.0.pop_front().flatten()
        }
    }

    fn walker() -> Walker {
        let mut walker = Walker::new(Vec3::ZERO);
        walker.set_movement_enabled(true);
        walker
    }

    fn ms(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    fn tracking(source: ScriptedSource, config: SensorConfig) -> SensorPositioning<ScriptedSource> {
        let mut positioning = SensorPositioning::new(source, config);
        positioning.start_tracking();
        positioning
    }

    #[test]
    fn test_first_success_declares_connected() {
        let mut p = tracking(ScriptedSource::new([Some(Vec3::new(1.0, 0.0, 1.0))]), SensorConfig::default());
        let mut w = walker();

        assert_eq!(p.tick(Instant::now(), None, &mut w), Some(ConnectionChange::Restored));
        assert!(p.is_connected());
        assert_eq!(w.position(), Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_loss_is_debounced() {
        let threshold = 5;
        let mut samples = vec![Some(Vec3::ZERO)];
        samples.extend(std::iter::repeat(None).take(10));
        let config = SensorConfig { loss_threshold: threshold, ..SensorConfig::default() };
        let mut p = tracking(ScriptedSource::new(samples), config);
        let mut w = walker();
        let base = Instant::now();

        assert_eq!(p.tick(base, None, &mut w), Some(ConnectionChange::Restored));

        let mut changes = Vec::new();
        for i in 1..=10u64 {
            if let Some(change) = p.tick(ms(base, i), None, &mut w) {
                changes.push((i, change));
            }
        }

        // Exactly one loss, on the threshold-th consecutive failure
        assert_eq!(changes, vec![(threshold as u64, ConnectionChange::Lost)]);
        assert!(!p.is_connected());
    }

    #[test]
    fn test_single_success_recovers() {
        let mut samples: Vec<Option<Vec3>> = vec![None, None, None];
        samples.push(Some(Vec3::new(2.0, 0.0, 0.0)));
        samples.push(Some(Vec3::new(2.5, 0.0, 0.0)));
        let config = SensorConfig { loss_threshold: 3, ..SensorConfig::default() };
        let mut p = tracking(ScriptedSource::new(samples), config);
        let mut w = walker();
        let base = Instant::now();

        assert_eq!(p.tick(ms(base, 0), None, &mut w), None);
        assert_eq!(p.tick(ms(base, 1), None, &mut w), None);
        assert_eq!(p.tick(ms(base, 2), None, &mut w), Some(ConnectionChange::Lost));
        assert_eq!(p.tick(ms(base, 3), None, &mut w), Some(ConnectionChange::Restored));
        assert_eq!(p.tick(ms(base, 4), None, &mut w), None);
        assert_eq!(p.consecutive_failures(), 0);
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let samples = [None, None, Some(Vec3::ZERO), None, None];
        let config = SensorConfig { loss_threshold: 3, ..SensorConfig::default() };
        let mut p = tracking(ScriptedSource::new(samples), config);
        let mut w = walker();
        let base = Instant::now();

        let changes: Vec<_> = (0..5).filter_map(|i| p.tick(ms(base, i), None, &mut w)).collect();

        // Never three in a row, so only the initial connect is reported
        assert_eq!(changes, vec![ConnectionChange::Restored]);
        assert_eq!(p.consecutive_failures(), 2);
    }

    #[test]
    fn test_poll_interval_respected() {
        let samples = [Some(Vec3::new(1.0, 0.0, 0.0)), Some(Vec3::new(2.0, 0.0, 0.0))];
        let config = SensorConfig { poll_interval: Duration::from_millis(100), ..SensorConfig::default() };
        let mut p = tracking(ScriptedSource::new(samples), config);
        let mut w = walker();
        let base = Instant::now();

        p.tick(base, None, &mut w);
        p.tick(ms(base, 50), None, &mut w);
        assert_eq!(w.position(), Vec3::new(1.0, 0.0, 0.0));

        p.tick(ms(base, 100), None, &mut w);
        assert_eq!(w.position(), Vec3::new(2.0, 0.0, 0.0));
    }

    #[test]
    fn test_samples_clamped_to_surface() {
        let mesh = GridNavMesh::open([0.0, 0.0], 1.0, 0.0, 4, 4);
        // 1m beyond the +x edge of the floor
        let mut p = tracking(ScriptedSource::new([Some(Vec3::new(5.0, 0.0, 2.0))]), SensorConfig::default());
        let mut w = walker();

        p.tick(Instant::now(), Some(&mesh), &mut w);

        assert_eq!(w.position(), Vec3::new(4.0, 0.0, 2.0));
    }

    #[test]
    fn test_unclampable_sample_uses_raw() {
        let mesh = GridNavMesh::open([0.0, 0.0], 1.0, 0.0, 4, 4);
        let far = Vec3::new(100.0, 0.0, 100.0);
        let mut p = tracking(ScriptedSource::new([Some(far)]), SensorConfig::default());
        let mut w = walker();

        p.tick(Instant::now(), Some(&mesh), &mut w);

        assert_eq!(w.position(), far);
    }

    #[test]
    fn test_smoothing_bounds_speed() {
        let samples = [Some(Vec3::new(10.0, 0.0, 0.0)), Some(Vec3::new(10.0, 0.0, 0.0))];
        let config = SensorConfig { smoothing: true, smoothing_speed: 2.0, ..SensorConfig::default() };
        let mut p = tracking(ScriptedSource::new(samples), config);
        let mut w = walker();
        let base = Instant::now();

        // First tick has no elapsed time, so no movement yet
        p.tick(base, None, &mut w);
        assert_eq!(w.position(), Vec3::ZERO);

        p.tick(ms(base, 500), None, &mut w);
        assert!((w.position().x - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_movement_disabled_keeps_walker() {
        let mut p = tracking(ScriptedSource::new([Some(Vec3::new(3.0, 0.0, 0.0))]), SensorConfig::default());
        let mut w = Walker::new(Vec3::ZERO);

        p.tick(Instant::now(), None, &mut w);

        assert_eq!(w.position(), Vec3::ZERO);
        assert_eq!(p.goal(), Some(Vec3::new(3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_start_stop_idempotent() {
        let mut p = SensorPositioning::new(ScriptedSource::new([]), SensorConfig::default());
        p.stop_tracking();
        assert!(!p.is_tracking());
        p.start_tracking();
        p.start_tracking();
        assert!(p.is_tracking());
        p.stop_tracking();
        p.stop_tracking();
        assert!(!p.is_tracking());
        assert_eq!(p.tick(Instant::now(), None, &mut walker()), None);
    }

    #[test]
    fn test_set_connected_override() {
        let mut p = tracking(ScriptedSource::new([]), SensorConfig::default());
        assert_eq!(p.set_connected(true), Some(ConnectionChange::Restored));
        assert_eq!(p.set_connected(true), None);
        assert_eq!(p.set_connected(false), Some(ConnectionChange::Lost));
        assert!(!p.is_connected());
    }
}
