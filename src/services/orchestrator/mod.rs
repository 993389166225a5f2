//! Tour lifecycle and event orchestration
//!
//! The TourOrchestrator is the root of the navigation core. It coordinates:
//! - Tour selection and global visited/total progress
//! - Floor content loading/unloading through an `AreaSetLoader`
//! - One `FloorManager` per loaded floor, whose events it drains and forwards
//! - The positioning strategy that drives the active floor's walker
//!
//! All state lives on the single task running `run`; the only suspension
//! points are area-set loads and unloads.

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::catalog::TourCatalog;
use crate::domain::events::{FloorEvent, TourCommand, TourEvent};
use crate::domain::types::{progress_ratio, TourDefinition};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::event_channel::EventSender;
use crate::services::area_set::AreaSetLoader;
use crate::services::floor_manager::FloorManager;
use crate::services::positioning::Positioning;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::time::interval;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tour-wide progress counters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TourProgress {
    /// Floor being shown, or the next one to load while waiting
    pub floor_index: usize,
    pub visited: usize,
    /// Sum of defined areas over all floors
    pub total: usize,
    pub started: bool,
    pub waiting_for_continue: bool,
    pub completed: bool,
    pub stopping: bool,
}

impl TourProgress {
    pub fn ratio(&self) -> f32 {
        progress_ratio(self.visited, self.total)
    }
}

/// The loaded floor and its event subscription
pub(crate) struct ActiveFloor {
    pub(crate) index: usize,
    pub(crate) manager: FloorManager,
    pub(crate) events: mpsc::UnboundedReceiver<FloorEvent>,
}

/// Root of the navigation core: runs one tour, floor by floor
pub struct TourOrchestrator {
    /// Tours available for selection
    pub(crate) catalog: TourCatalog,
    /// Floor content source
    pub(crate) loader: Arc<dyn AreaSetLoader>,
    /// Active positioning strategy (sensor or keyboard)
    pub(crate) positioning: Box<dyn Positioning>,
    pub(crate) config: Config,
    pub(crate) metrics: Arc<Metrics>,
    /// Outbound tour events
    pub(crate) events: EventSender,
    pub(crate) tour: Option<Arc<TourDefinition>>,
    pub(crate) progress: TourProgress,
    pub(crate) active: Option<ActiveFloor>,
}

impl TourOrchestrator {
    pub fn new(
        catalog: TourCatalog,
        loader: Arc<dyn AreaSetLoader>,
        positioning: Box<dyn Positioning>,
        config: Config,
        metrics: Arc<Metrics>,
        events: EventSender,
    ) -> Self {
        Self {
            catalog,
            loader,
            positioning,
            config,
            metrics,
            events,
            tour: None,
            progress: TourProgress::default(),
            active: None,
        }
    }

    /// Run the command loop until the command channel closes or shutdown is signaled
    pub async fn run(
        &mut self,
        mut cmd_rx: mpsc::Receiver<TourCommand>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut tick_interval = interval(self.config.tick_interval());
        info!(tick_ms = %self.config.tick_interval().as_millis(), "orchestrator_started");

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.process_command(cmd).await,
                        None => break, // Channel closed
                    }
                }
                _ = tick_interval.tick() => {
                    self.tick(Instant::now()).await;
                }
                _ = shutdown.changed() => {
                    info!("orchestrator_shutdown");
                    break;
                }
            }
        }

        if self.tour.is_some() {
            self.stop_tour(false).await;
        }
    }

    /// Dispatch one display-layer command
    pub async fn process_command(&mut self, cmd: TourCommand) {
        debug!(cmd = ?cmd, "tour_command");
        match cmd {
            TourCommand::SelectTour(id) => {
                self.select_tour_by_id(&id);
            }
            TourCommand::BeginTour => self.begin_tour().await,
            TourCommand::UserReady => self.user_ready().await,
            TourCommand::RequestNext => self.request_next().await,
            TourCommand::ContinueToNextFloor => {
                self.continue_to_next_floor().await;
            }
            TourCommand::SetConnection(connected) => self.set_connection(connected),
            TourCommand::StopTour { return_home } => self.stop_tour(return_home).await,
            TourCommand::Steer { x, z } => self.positioning.steer(x, z),
        }
    }

    /// Select a tour and reset progress; nothing is loaded yet
    pub fn select_tour(&mut self, tour: Arc<TourDefinition>) -> bool {
        if self.active.is_some() {
            warn!(tour = %tour.id, "select_tour_while_floor_active");
            return false;
        }

        let run_id = self.events.begin_run();
        self.progress =
            TourProgress { total: tour.total_areas(), ..TourProgress::default() };
        info!(
            tour = %tour.id,
            run_id = %run_id,
            floors = %tour.floors.len(),
            total = %self.progress.total,
            "tour_selected"
        );
        self.tour = Some(tour);
        true
    }

    pub fn select_tour_by_id(&mut self, id: &str) -> bool {
        match self.catalog.get(id) {
            Some(tour) => self.select_tour(tour),
            None => {
                warn!(tour = %id, "tour_unknown");
                false
            }
        }
    }

    /// Load the first floor of the selected tour
    pub async fn begin_tour(&mut self) {
        let Some(tour) = self.tour.clone() else {
            warn!("begin_tour_without_selection");
            return;
        };
        if tour.floors.is_empty() {
            warn!(tour = %tour.id, "begin_tour_without_floors");
            return;
        }
        if self.progress.started {
            debug!(tour = %tour.id, "begin_tour_already_started");
            return;
        }

        self.progress.started = true;
        self.progress.floor_index = 0;
        info!(tour = %tour.id, "tour_started");
        self.load_floor(0).await;
    }

    /// Load the next floor once the user chose to continue
    pub async fn continue_to_next_floor(&mut self) -> bool {
        if !self.progress.waiting_for_continue {
            debug!("continue_ignored_not_waiting");
            return false;
        }
        self.progress.waiting_for_continue = false;
        let index = self.progress.floor_index;
        self.load_floor(index).await;
        true
    }

    pub async fn user_ready(&mut self) {
        match self.active {
            Some(ref mut active) => {
                active.manager.user_ready();
            }
            None => debug!("user_ready_without_floor"),
        }
        self.process_floor_events().await;
    }

    pub async fn request_next(&mut self) {
        match self.active {
            Some(ref mut active) => {
                active.manager.next();
            }
            None => debug!("request_next_without_floor"),
        }
        self.process_floor_events().await;
    }

    /// Dev/test override of the positioning connection state
    pub fn set_connection(&mut self, connected: bool) {
        if let Some(change) = self.positioning.set_connected(connected) {
            self.events.send(TourEvent::ConnectionChanged { connected: change.connected() });
        }
    }

    /// Advance positioning and the active floor by one logical frame
    pub async fn tick(&mut self, now: Instant) {
        let Some(ref mut active) = self.active else {
            return;
        };
        let start = Instant::now();

        let surface = active.manager.surface().clone();
        let change = self.positioning.tick(now, Some(surface.as_ref()), active.manager.walker_mut());
        active.manager.tick(now);

        if let Some(change) = change {
            info!(connected = %change.connected(), "connection_changed");
            self.events.send(TourEvent::ConnectionChanged { connected: change.connected() });
        }
        self.process_floor_events().await;

        self.metrics.record_tick(start.elapsed().as_micros() as u64);
    }

    pub fn progress(&self) -> &TourProgress {
        &self.progress
    }

    pub fn tour(&self) -> Option<&Arc<TourDefinition>> {
        self.tour.as_ref()
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.events.run_id()
    }

    pub fn catalog(&self) -> &TourCatalog {
        &self.catalog
    }

    pub fn positioning(&self) -> &dyn Positioning {
        self.positioning.as_ref()
    }

    pub fn active_floor(&self) -> Option<&FloorManager> {
        self.active.as_ref().map(|a| &a.manager)
    }

    pub fn active_floor_mut(&mut self) -> Option<&mut FloorManager> {
        self.active.as_mut().map(|a| &mut a.manager)
    }

    pub fn active_floor_index(&self) -> Option<usize> {
        self.active.as_ref().map(|a| a.index)
    }
}
