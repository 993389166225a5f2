//! Floor lifecycle handlers for the TourOrchestrator

use super::{ActiveFloor, TourOrchestrator, TourProgress};
use crate::domain::events::{FloorEvent, TourEvent};
use crate::infra::config::RenderMode;
use crate::services::area_set::{AreaSet, OutputSurfaces};
use crate::services::floor_manager::{FloorError, FloorManager};
use crate::services::path_planner::{PathConfig, PathPlanner};
use crate::services::registry::AreaRegistry;
use tracing::{debug, error, info};

impl TourOrchestrator {
    /// Load floor `index`, bind a FloorManager to it and raise `FloorLoaded`
    ///
    /// Any failure disables the floor: `FloorFailed` is raised, content is
    /// released and the tour moves past it.
    pub(crate) async fn load_floor(&mut self, index: usize) {
        let Some(floor) = self.tour.as_ref().and_then(|t| t.floors.get(index)).cloned() else {
            debug!(floor_index = %index, "load_floor_out_of_range");
            return;
        };
        self.progress.floor_index = index;

        debug!(floor = %floor.name, area_set = %floor.area_set, "floor_loading");
        let area_set = match self.loader.load(&floor.area_set).await {
            Ok(set) => set,
            Err(e) => {
                self.fail_floor(index, FloorError::Load(format!("{e:#}")), None).await;
                return;
            }
        };
        let area_set = self.enforce_output_ownership(area_set);

        let registry = AreaRegistry::from_area_set(&area_set);
        let planner =
            PathPlanner::with_metrics(PathConfig::from_config(&self.config), self.metrics.clone());
        let manager = match FloorManager::new(
            floor.clone(),
            area_set.clone(),
            registry,
            planner,
            self.config.dwell_threshold(),
        ) {
            Ok(manager) => manager,
            Err(e) => {
                self.fail_floor(index, e, Some(area_set)).await;
                return;
            }
        };

        let mut manager = manager.with_metrics(self.metrics.clone());
        manager.seed_progress(self.progress.visited, self.progress.total);
        let events = manager.subscribe();
        let area_count = manager.area_count();
        self.active = Some(ActiveFloor { index, manager, events });
        self.positioning.start_tracking();

        info!(
            floor = %floor.name,
            floor_index = %index,
            areas = %area_count,
            visited = %self.progress.visited,
            total = %self.progress.total,
            "floor_loaded"
        );
        self.events.send(TourEvent::FloorLoaded {
            floor,
            floor_index: index,
            area_count,
            visited: self.progress.visited,
            total: self.progress.total,
        });
    }

    /// Exactly one camera and one listener may be live tour-wide
    fn enforce_output_ownership(&self, mut area_set: AreaSet) -> AreaSet {
        let outputs = match self.config.render_mode() {
            RenderMode::Standard => OutputSurfaces { camera: true, listener: true },
            RenderMode::Overlay => OutputSurfaces { camera: false, listener: false },
        };
        area_set.set_outputs(outputs);
        debug!(
            area_set = %area_set.name(),
            camera = %outputs.camera,
            listener = %outputs.listener,
            "output_ownership_applied"
        );
        area_set
    }

    async fn fail_floor(&mut self, index: usize, reason: FloorError, area_set: Option<AreaSet>) {
        error!(floor_index = %index, error = %reason, "floor_disabled");
        self.metrics.record_floor_failed();
        self.events.send(TourEvent::FloorFailed { floor_index: index, reason: reason.to_string() });

        if let Some(set) = area_set {
            self.loader.unload(set).await;
        }
        self.advance_past_floor(index);
    }

    /// Drain the active floor's events and react to them in order
    pub(crate) async fn process_floor_events(&mut self) {
        let Some(ref mut active) = self.active else {
            return;
        };
        let mut pending = Vec::new();
        while let Ok(event) = active.events.try_recv() {
            pending.push(event);
        }

        for event in pending {
            if self.handle_floor_event(event).await {
                // Floor is gone; anything after completion is stale
                break;
            }
        }
    }

    /// Returns true when the event ended the floor
    async fn handle_floor_event(&mut self, event: FloorEvent) -> bool {
        match event {
            FloorEvent::AreaConfirmed(area) => {
                self.progress.visited += 1;
                let progress = self.progress.ratio();
                self.events.send(TourEvent::AreaConfirmed { area });
                self.events.send(TourEvent::ProgressChanged {
                    visited: self.progress.visited,
                    total: self.progress.total,
                    progress,
                });
                false
            }
            FloorEvent::GuidingToNext(area) => {
                self.events.send(TourEvent::GuidingToNext { area });
                false
            }
            FloorEvent::PathUpdated(route) => {
                self.events.send(TourEvent::PathUpdated { route });
                false
            }
            FloorEvent::FloorCompleted => {
                self.finish_floor().await;
                true
            }
        }
    }

    /// Detach the active floor, raise `FloorUnloaded`, then release its content
    ///
    /// Returns the index of the floor that was unloaded.
    async fn unload_active(&mut self) -> Option<usize> {
        let mut active = self.active.take()?;
        active.manager.unsubscribe();
        active.manager.begin_teardown();
        drop(active.events);

        let floor = active.manager.floor().clone();
        info!(floor = %floor.name, floor_index = %active.index, "floor_unloaded");
        self.events.send(TourEvent::FloorUnloaded { floor });

        self.loader.unload(active.manager.into_area_set()).await;
        Some(active.index)
    }

    async fn finish_floor(&mut self) {
        if let Some(index) = self.unload_active().await {
            self.advance_past_floor(index);
        }
    }

    fn advance_past_floor(&mut self, index: usize) {
        let floors = self.tour.as_ref().map_or(0, |t| t.floors.len());
        self.progress.floor_index = index + 1;

        if self.progress.floor_index >= floors {
            self.complete_tour();
        } else {
            self.progress.waiting_for_continue = true;
            info!(next_floor = %self.progress.floor_index, "waiting_for_continue");
        }
    }

    fn complete_tour(&mut self) {
        self.progress.waiting_for_continue = false;
        self.progress.completed = true;
        self.positioning.stop_tracking();

        info!(
            tour = %self.tour.as_ref().map_or("", |t| t.id.as_str()),
            visited = %self.progress.visited,
            total = %self.progress.total,
            "tour_completed"
        );
        self.events.send(TourEvent::TourCompleted {
            visited: self.progress.visited,
            total: self.progress.total,
        });

        // Run is over; the final counts stay readable until the next selection
        self.tour = None;
        self.progress = TourProgress {
            visited: self.progress.visited,
            total: self.progress.total,
            completed: true,
            ..TourProgress::default()
        };
    }

    /// Abort the tour from any state; repeated calls are no-ops
    pub async fn stop_tour(&mut self, return_home: bool) {
        if self.tour.is_none() && self.active.is_none() {
            debug!("stop_tour_without_tour");
            return;
        }

        self.progress.stopping = true;
        self.unload_active().await;
        self.positioning.stop_tracking();

        info!(
            return_home = %return_home,
            visited = %self.progress.visited,
            total = %self.progress.total,
            "tour_stopped"
        );
        self.tour = None;
        self.progress = TourProgress::default();
        self.events.send(TourEvent::TourStopped { return_home });
    }
}
