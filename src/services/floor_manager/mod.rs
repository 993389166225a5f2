//! Floor progression - sequences one floor's areas with dwell confirmation
//!
//! A `FloorManager` owns everything that lives only as long as its floor:
//! the loaded area-set, the registry resolved against it, the path planner
//! and the walker. Progression events go out on a subscription channel the
//! orchestrator drains after every command and tick.
//!
//! Lifecycle of a floor:
//! - `user_ready` enables movement and confirms the first area (no dwell)
//! - each confirmed area waits for `next`, which guides to the following one
//! - the walker dwelling inside the active area confirms it
//! - `next` past the last area completes the floor (exactly once)


use crate::domain::events::FloorEvent;
use crate::domain::types::{AreaDefinition, AreaId, FloorDefinition, Vec3};
use crate::infra::metrics::Metrics;
use crate::nav::NavSurface;
use crate::services::area_set::{AreaHandle, AreaSet};
use crate::services::path_planner::PathPlanner;
use crate::services::positioning::Walker;
use crate::services::registry::AreaRegistry;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Why a floor could not be initialized
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FloorError {
    #[error("area-set {area_set} has no walkable surface")]
    NoSurface { area_set: String },

    #[error("area-set {area_set} has no walker spawn point")]
    NoSpawn { area_set: String },

    #[error("floor {floor} has no resolvable areas")]
    EmptySequence { floor: String },

    #[error("area-set load failed: {0}")]
    Load(String),
}

/// Observable progression state of a floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloorPhase {
    /// Constructed, waiting for the user to be ready
    NotStarted,
    /// Guiding toward the active area
    Approaching,
    /// Walker inside an unconfirmed area, dwell timer running
    Dwelling,
    /// An area was just confirmed; waiting for `next`
    AwaitingNext,
    Complete,
    /// Being torn down; every command is ignored
    Closing,
}

impl FloorPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloorPhase::NotStarted => "not_started",
            FloorPhase::Approaching => "approaching",
            FloorPhase::Dwelling => "dwelling",
            FloorPhase::AwaitingNext => "awaiting_next",
            FloorPhase::Complete => "complete",
            FloorPhase::Closing => "closing",
        }
    }
}

/// Per-floor area sequencing state machine
pub struct FloorManager {
    floor: Arc<FloorDefinition>,
    area_set: AreaSet,
    registry: AreaRegistry,
    planner: PathPlanner,
    walker: Walker,
    surface: Arc<dyn NavSurface>,
    /// Resolvable areas in floor order
    sequence: Vec<(Arc<AreaDefinition>, AreaHandle)>,
    confirmed: FxHashSet<AreaId>,
    /// Active area objects the walker is currently inside
    inside: SmallVec<[AreaHandle; 4]>,
    /// Single area under dwell evaluation, with the time it was entered
    candidate: Option<(AreaHandle, Instant)>,
    /// Sequence index of the last confirmed or currently guided area
    cursor: Option<usize>,
    dwell_threshold: Duration,
    started: bool,
    awaiting_next: bool,
    completed: bool,
    closing: bool,
    /// Tour-wide counts seeded by the orchestrator
    visited_before: usize,
    tour_total: usize,
    events: Option<mpsc::UnboundedSender<FloorEvent>>,
    metrics: Option<Arc<Metrics>>,
}

impl FloorManager {
    /// Bind a floor definition to its loaded content
    ///
    /// Fails when the content lacks a walkable surface or spawn point, or when
    /// none of the floor's areas resolve through the registry.
    pub fn new(
        floor: Arc<FloorDefinition>,
        mut area_set: AreaSet,
        registry: AreaRegistry,
        planner: PathPlanner,
        dwell_threshold: Duration,
    ) -> Result<Self, FloorError> {
        let surface = area_set
            .surface()
            .cloned()
            .ok_or_else(|| FloorError::NoSurface { area_set: area_set.name().to_string() })?;
        let spawn =
            area_set.spawn().ok_or_else(|| FloorError::NoSpawn { area_set: area_set.name().to_string() })?;

        let mut seen = FxHashSet::default();
        let mut sequence = Vec::with_capacity(floor.area_count());
        for (def, handle) in registry.for_floor(&floor) {
            if !seen.insert(def.id.clone()) {
                warn!(floor = %floor.name, area = %def.id, "area_listed_twice");
                continue;
            }
            sequence.push((def, handle));
        }
        if sequence.is_empty() {
            return Err(FloorError::EmptySequence { floor: floor.name.clone() });
        }

        // Nothing is live until the user is ready
        area_set.deactivate_all();

        debug!(
            floor = %floor.name,
            area_set = %area_set.name(),
            areas = %sequence.len(),
            defined = %floor.area_count(),
            "floor_manager_created"
        );

        Ok(Self {
            floor,
            area_set,
            registry,
            planner,
            walker: Walker::new(spawn),
            surface,
            sequence,
            confirmed: FxHashSet::default(),
            inside: SmallVec::new(),
            candidate: None,
            cursor: None,
            dwell_threshold,
            started: false,
            awaiting_next: false,
            completed: false,
            closing: false,
            visited_before: 0,
            tour_total: 0,
            events: None,
            metrics: None,
        })
    }

    /// Attach metrics recording
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Seed tour-wide visited/total counts
    pub fn seed_progress(&mut self, visited: usize, total: usize) {
        self.visited_before = visited;
        self.tour_total = total;
    }

    /// Tour-wide (visited, total) including this floor's confirmations
    pub fn tour_progress(&self) -> (usize, usize) {
        (self.visited_before + self.confirmed.len(), self.tour_total)
    }

    /// Open a new event subscription, replacing any previous one
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<FloorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    /// Drop the event sender; later events are discarded
    pub fn unsubscribe(&mut self) {
        self.events = None;
    }

    fn emit(&self, event: FloorEvent) {
        match self.events {
            Some(ref tx) => {
                if tx.send(event).is_err() {
                    trace!(floor = %self.floor.name, "floor_event_receiver_gone");
                }
            }
            None => trace!(floor = %self.floor.name, "floor_event_unsubscribed"),
        }
    }

    pub fn floor(&self) -> &Arc<FloorDefinition> {
        &self.floor
    }

    pub fn area_set(&self) -> &AreaSet {
        &self.area_set
    }

    pub fn registry(&self) -> &AreaRegistry {
        &self.registry
    }

    pub fn planner(&self) -> &PathPlanner {
        &self.planner
    }

    pub fn walker(&self) -> &Walker {
        &self.walker
    }

    pub fn walker_mut(&mut self) -> &mut Walker {
        &mut self.walker
    }

    pub fn surface(&self) -> &Arc<dyn NavSurface> {
        &self.surface
    }

    /// Effective number of areas on this floor
    pub fn area_count(&self) -> usize {
        self.sequence.len()
    }

    pub fn confirmed_count(&self) -> usize {
        self.confirmed.len()
    }

    pub fn is_confirmed(&self, id: &AreaId) -> bool {
        self.confirmed.contains(id)
    }

    pub fn candidate(&self) -> Option<AreaHandle> {
        self.candidate.map(|(handle, _)| handle)
    }

    /// Definition at the cursor
    pub fn current_area(&self) -> Option<&Arc<AreaDefinition>> {
        self.cursor.and_then(|i| self.sequence.get(i)).map(|(def, _)| def)
    }

    /// Live handle of the area with `id`, if it is part of this floor
    pub fn handle_of(&self, id: &AreaId) -> Option<AreaHandle> {
        self.sequence.iter().find(|(def, _)| &def.id == id).map(|(_, handle)| *handle)
    }

    pub fn phase(&self) -> FloorPhase {
        if self.closing {
            FloorPhase::Closing
        } else if self.completed {
            FloorPhase::Complete
        } else if !self.started {
            FloorPhase::NotStarted
        } else if self.awaiting_next {
            FloorPhase::AwaitingNext
        } else if self.candidate.is_some() {
            FloorPhase::Dwelling
        } else {
            FloorPhase::Approaching
        }
    }

    /// Make `index` the only live area of the floor
    fn activate(&mut self, index: usize) {
        if let Some(&(_, handle)) = self.sequence.get(index) {
            self.area_set.activate_only(handle);
            trace!(floor = %self.floor.name, index = %index, handle = %handle, "area_activated");
        }
    }

    /// Start the floor: enable movement and confirm the starting area
    ///
    /// Only the first call per floor has any effect.
    pub fn user_ready(&mut self) -> bool {
        if self.closing || self.started {
            debug!(floor = %self.floor.name, phase = %self.phase().as_str(), "user_ready_ignored");
            return false;
        }

        self.started = true;
        self.walker.set_movement_enabled(true);
        info!(floor = %self.floor.name, areas = %self.sequence.len(), "floor_started");

        self.activate(0);
        let first = self.sequence[0].1;
        self.confirm_area(first);
        true
    }

    /// Mark the area behind `handle` visited
    ///
    /// Ignored when the area was already confirmed or is not part of this
    /// floor's sequence. `AreaConfirmed` is raised before the following area
    /// is activated.
    pub fn confirm_area(&mut self, handle: AreaHandle) -> bool {
        if self.closing || !self.started || self.completed {
            return false;
        }

        let Some(index) = self.sequence.iter().position(|(_, h)| *h == handle) else {
            warn!(floor = %self.floor.name, handle = %handle, "confirm_area_not_in_sequence");
            return false;
        };
        let def = self.sequence[index].0.clone();
        if self.confirmed.contains(&def.id) {
            debug!(floor = %self.floor.name, area = %def.id, "area_already_confirmed");
            return false;
        }

        self.confirmed.insert(def.id.clone());
        self.cursor = Some(index);
        self.awaiting_next = true;
        if self.candidate.is_some_and(|(h, _)| h == handle) {
            self.candidate = None;
        }

        self.planner.pause();
        let cleared = self.planner.clear_target();
        self.emit(cleared);
        self.area_set.set_active(handle, false);

        let (visited, total) = self.tour_progress();
        info!(
            floor = %self.floor.name,
            area = %def.id,
            index = %index,
            confirmed = %self.confirmed.len(),
            areas = %self.sequence.len(),
            visited = %visited,
            total = %total,
            "area_confirmed"
        );
        if let Some(ref metrics) = self.metrics {
            metrics.record_area_confirmed();
        }
        self.emit(FloorEvent::AreaConfirmed(def));

        if index + 1 < self.sequence.len() {
            self.activate(index + 1);
        }
        true
    }

    /// Continue after a confirmation: guide to the next area or complete the floor
    pub fn next(&mut self) -> bool {
        if self.closing || !self.awaiting_next || self.completed {
            debug!(floor = %self.floor.name, phase = %self.phase().as_str(), "next_ignored");
            return false;
        }
        self.awaiting_next = false;

        let index = self.cursor.map_or(0, |c| c + 1);
        let Some((def, handle)) = self.sequence.get(index).cloned() else {
            self.complete();
            return true;
        };

        self.cursor = Some(index);
        self.activate(index);
        info!(floor = %self.floor.name, area = %def.id, index = %index, "guiding_to_next");
        self.emit(FloorEvent::GuidingToNext(def));

        if let Some(object) = self.area_set.object(handle) {
            self.planner.set_target(object);
        }
        self.planner.resume();
        true
    }

    fn complete(&mut self) {
        self.completed = true;
        self.candidate = None;
        self.walker.set_movement_enabled(false);
        self.area_set.deactivate_all();
        let cleared = self.planner.clear_target();
        self.emit(cleared);

        info!(floor = %self.floor.name, confirmed = %self.confirmed.len(), "floor_completed");
        if let Some(ref metrics) = self.metrics {
            metrics.record_floor_completed();
        }
        self.emit(FloorEvent::FloorCompleted);
    }

    /// Evaluate trigger volumes, the dwell candidate and the route
    pub fn tick(&mut self, now: Instant) {
        if self.closing || !self.started || self.completed {
            return;
        }

        let position = self.walker.position();
        self.update_inside(position, now);

        if let Some((handle, entered_at)) = self.candidate {
            if !self.inside.contains(&handle) {
                self.candidate = None;
                debug!(floor = %self.floor.name, handle = %handle, "area_candidate_cleared");
            } else if now.saturating_duration_since(entered_at) >= self.dwell_threshold {
                self.candidate = None;
                self.confirm_area(handle);
            }
        }

        if let Some(event) = self.planner.tick(position, self.surface.as_ref()) {
            self.emit(event);
        }
    }

    /// Refresh the inside set; the first unconfirmed entry becomes the candidate
    fn update_inside(&mut self, position: Vec3, now: Instant) {
        let current: SmallVec<[AreaHandle; 4]> = self
            .area_set
            .objects()
            .filter(|(_, object)| object.triggers_at(position))
            .map(|(handle, _)| handle)
            .collect();

        for &handle in &current {
            if self.inside.contains(&handle) {
                continue;
            }
            trace!(floor = %self.floor.name, handle = %handle, "area_entered");

            if self.candidate.is_some() {
                continue;
            }
            let Some((def, _)) = self.sequence.iter().find(|(_, h)| *h == handle) else {
                continue;
            };
            if self.confirmed.contains(&def.id) {
                continue;
            }
            debug!(floor = %self.floor.name, area = %def.id, "area_candidate");
            self.candidate = Some((handle, now));
        }

        self.inside = current;
    }

    /// Enter teardown; every later command is a no-op
    pub fn begin_teardown(&mut self) {
        if self.closing {
            return;
        }
        self.closing = true;
        self.candidate = None;
        self.inside.clear();
        self.walker.set_movement_enabled(false);
        self.planner.pause();
        debug!(floor = %self.floor.name, "floor_teardown");
    }

    /// Hand the loaded content back for unloading
    pub fn into_area_set(self) -> AreaSet {
        self.area_set
    }
}
