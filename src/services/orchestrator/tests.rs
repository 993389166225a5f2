//! Tests for the TourOrchestrator module

use super::*;
use crate::domain::types::{AreaDefinition, FloorDefinition, TriggerVolume, Vec3};
use crate::infra::config::RenderMode;
use crate::io::event_channel::{create_event_channel, EventEnvelope};
use crate::nav::GridNavMesh;
use crate::services::area_set::{AreaObject, AreaSet, InMemoryAreaSetLoader, OutputSurfaces};
use crate::services::positioning::{
    KeyboardConfig, KeyboardPositioning, PositionSource, SensorConfig, SensorPositioning,
};
use std::time::Duration;

const DWELL: Duration = Duration::from_millis(750);

fn at(x: f32) -> Vec3 {
    Vec3::new(x, 0.0, 2.0)
}

/// 16m x 4m corridor with one area every 4m starting at x = 1
fn corridor(name: &str, ids: &[&str]) -> AreaSet {
    let mut set = AreaSet::new(name)
        .with_spawn(at(1.0))
        .with_surface(Arc::new(GridNavMesh::open([0.0, 0.0], 1.0, 0.0, 16, 4)));
    for (i, id) in ids.iter().enumerate() {
        let x = 1.0 + 4.0 * i as f32;
        set = set.with_object(AreaObject::bound(id, TriggerVolume::new(at(x), Vec3::new(0.5, 1.0, 0.5))));
    }
    set
}

fn floor(name: &str, area_set: &str, ids: &[&str]) -> Arc<FloorDefinition> {
    Arc::new(FloorDefinition {
        name: name.to_string(),
        area_set: area_set.to_string(),
        transition_text: format!("Take the stairs to {name}"),
        areas: ids.iter().map(|id| Arc::new(AreaDefinition::new(id, id))).collect(),
    })
}

fn tour(id: &str, floors: Vec<Arc<FloorDefinition>>) -> Arc<TourDefinition> {
    Arc::new(TourDefinition { id: id.to_string(), name: id.to_string(), floors })
}

fn museum() -> Arc<TourDefinition> {
    tour(
        "museum",
        vec![floor("ground", "ground", &["a", "b", "c"]), floor("upper", "upper", &["d", "e"])],
    )
}

/// Test harness that keeps the event receiver alive so events are delivered
struct TestOrchestrator {
    orchestrator: TourOrchestrator,
    rx: mpsc::UnboundedReceiver<EventEnvelope>,
    loader: Arc<InMemoryAreaSetLoader>,
    metrics: Arc<Metrics>,
}

impl std::ops::Deref for TestOrchestrator {
    type Target = TourOrchestrator;
    fn deref(&self) -> &Self::Target {
        &self.orchestrator
    }
}

impl std::ops::DerefMut for TestOrchestrator {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.orchestrator
    }
}

impl TestOrchestrator {
    fn drain(&mut self) -> Vec<TourEvent> {
        let mut events = Vec::new();
        while let Ok(envelope) = self.rx.try_recv() {
            events.push(envelope.event);
        }
        events
    }

    fn walk_to(&mut self, x: f32) {
        self.active_floor_mut().unwrap().walker_mut().move_to(at(x));
    }

    /// Guide to the area at `x`, walk in and dwell until confirmed
    async fn visit(&mut self, x: f32, t: Instant) {
        self.request_next().await;
        self.walk_to(x);
        self.tick(t).await;
        self.tick(t + DWELL).await;
    }
}

fn create_test_orchestrator(
    catalog: Vec<Arc<TourDefinition>>,
    loader: InMemoryAreaSetLoader,
    positioning: Box<dyn Positioning>,
    config: Config,
) -> TestOrchestrator {
    let loader = Arc::new(loader);
    let metrics = Arc::new(Metrics::new());
    let (sender, rx) = create_event_channel(metrics.clone());
    let orchestrator = TourOrchestrator::new(
        TourCatalog::new(catalog),
        loader.clone(),
        positioning,
        config,
        metrics.clone(),
        sender,
    );
    TestOrchestrator { orchestrator, rx, loader, metrics }
}

fn keyboard() -> Box<dyn Positioning> {
    Box::new(KeyboardPositioning::new(KeyboardConfig::default()))
}

fn museum_loader() -> InMemoryAreaSetLoader {
    InMemoryAreaSetLoader::new()
        .with_set(corridor("ground", &["a", "b", "c"]))
        .with_set(corridor("upper", &["d", "e"]))
}

fn create_museum() -> TestOrchestrator {
    create_test_orchestrator(vec![museum()], museum_loader(), keyboard(), Config::default())
}

#[tokio::test]
async fn test_select_tour_sets_total() {
    let mut t = create_museum();

    assert!(t.select_tour_by_id("museum"));

    assert_eq!(t.progress().total, 5);
    assert_eq!(t.progress().visited, 0);
    assert!(t.run_id().is_some());
    // Selection alone loads nothing
    assert!(t.loader.log().is_empty());
    assert!(t.drain().is_empty());
}

#[tokio::test]
async fn test_select_unknown_tour_is_noop() {
    let mut t = create_museum();
    assert!(!t.select_tour_by_id("nope"));
    assert!(t.tour().is_none());
}

#[tokio::test]
async fn test_begin_without_selection_is_noop() {
    let mut t = create_museum();
    t.begin_tour().await;
    assert!(t.loader.log().is_empty());
    assert!(t.drain().is_empty());
}

#[tokio::test]
async fn test_begin_tour_loads_first_floor() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");

    t.begin_tour().await;

    let events = t.drain();
    assert!(matches!(
        events.as_slice(),
        [TourEvent::FloorLoaded { floor_index: 0, area_count: 3, visited: 0, total: 5, .. }]
    ));
    assert_eq!(t.loader.log(), vec!["load:ground"]);
    assert!(t.positioning().is_tracking());
    assert_eq!(t.active_floor().unwrap().tour_progress(), (0, 5));
}

#[tokio::test]
async fn test_two_floor_tour_scenario() {
    let mut t = create_museum();
    let t0 = Instant::now();
    t.select_tour_by_id("museum");
    t.begin_tour().await;
    t.user_ready().await;
    t.visit(5.0, t0).await;
    t.visit(9.0, t0 + Duration::from_secs(5)).await;
    t.drain();

    // Third confirmation followed by next completes the floor
    t.request_next().await;
    let events = t.drain();
    assert!(matches!(events.last(), Some(TourEvent::FloorUnloaded { floor }) if floor.name == "ground"));
    assert!(t.progress().waiting_for_continue);
    assert_eq!(t.progress().visited, 3);
    assert!(t.active_floor().is_none());

    assert!(t.continue_to_next_floor().await);
    let events = t.drain();
    assert!(matches!(
        events.as_slice(),
        [TourEvent::FloorLoaded { floor_index: 1, area_count: 2, visited: 3, total: 5, .. }]
    ));

    t.user_ready().await;
    t.visit(5.0, t0 + Duration::from_secs(10)).await;
    t.request_next().await;

    let events = t.drain();
    assert!(matches!(events.last(), Some(TourEvent::TourCompleted { visited: 5, total: 5 })));
    assert!(t.progress().completed);
    assert!(!t.positioning().is_tracking());
    assert_eq!(
        t.loader.log(),
        vec!["load:ground", "unload:ground", "load:upper", "unload:upper"]
    );
    assert_eq!(t.metrics.areas_confirmed(), 5);
    assert_eq!(t.metrics.floors_completed(), 2);
}

#[tokio::test]
async fn test_area_confirmed_raises_progress() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");
    t.begin_tour().await;
    t.drain();

    t.user_ready().await;

    let events = t.drain();
    let confirmed = events.iter().position(|e| matches!(e, TourEvent::AreaConfirmed { .. })).unwrap();
    match &events[confirmed + 1] {
        TourEvent::ProgressChanged { visited, total, progress } => {
            assert_eq!((*visited, *total), (1, 5));
            assert!((progress - 0.2).abs() < 1e-6);
        }
        other => panic!("expected progress, got {other:?}"),
    }
}

#[tokio::test]
async fn test_floor_unloaded_precedes_tour_completed() {
    let single = tour("short", vec![floor("ground", "ground", &["a"])]);
    let mut t = create_test_orchestrator(vec![single], museum_loader(), keyboard(), Config::default());
    t.select_tour_by_id("short");
    t.begin_tour().await;
    t.user_ready().await;
    t.drain();

    t.request_next().await;

    let kinds: Vec<_> = t.drain().iter().map(|e| e.as_str()).collect();
    assert_eq!(kinds, vec!["path_updated", "floor_unloaded", "tour_completed"]);
}

#[tokio::test]
async fn test_completed_tour_can_run_again() {
    let single = tour("short", vec![floor("ground", "ground", &["a"])]);
    let mut t = create_test_orchestrator(vec![single], museum_loader(), keyboard(), Config::default());
    t.select_tour_by_id("short");
    t.begin_tour().await;
    t.user_ready().await;
    t.request_next().await;
    t.drain();

    assert!(t.tour().is_none());
    assert!(t.progress().completed);
    assert!(!t.progress().started);
    assert_eq!((t.progress().visited, t.progress().total), (1, 1));

    // Nothing left to stop or unload
    t.stop_tour(true).await;
    assert!(t.drain().is_empty());
    assert_eq!(t.loader.log(), vec!["load:ground", "unload:ground"]);

    assert!(t.select_tour_by_id("short"));
    assert!(!t.progress().completed);
    t.begin_tour().await;
    assert!(matches!(
        t.drain().as_slice(),
        [TourEvent::FloorLoaded { floor_index: 0, visited: 0, total: 1, .. }]
    ));
    assert_eq!(t.active_floor_index(), Some(0));
}

#[tokio::test]
async fn test_continue_ignored_unless_waiting() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");
    t.begin_tour().await;

    assert!(!t.continue_to_next_floor().await);
    assert_eq!(t.loader.log(), vec!["load:ground"]);
}

#[tokio::test]
async fn test_stop_mid_floor() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");
    t.begin_tour().await;
    t.user_ready().await;
    t.request_next().await;
    t.drain();

    t.stop_tour(true).await;

    let events = t.drain();
    assert!(matches!(
        events.as_slice(),
        [TourEvent::FloorUnloaded { .. }, TourEvent::TourStopped { return_home: true }]
    ));
    assert_eq!(t.loader.log(), vec!["load:ground", "unload:ground"]);
    assert_eq!(*t.progress(), TourProgress::default());
    assert!(!t.positioning().is_tracking());

    // Repeated stop and late commands are harmless
    t.stop_tour(false).await;
    t.user_ready().await;
    t.request_next().await;
    t.tick(Instant::now()).await;
    assert!(t.drain().is_empty());
}

#[tokio::test]
async fn test_stop_while_waiting_for_continue() {
    let single_then_more = tour(
        "two",
        vec![floor("ground", "ground", &["a"]), floor("upper", "upper", &["d"])],
    );
    let mut t =
        create_test_orchestrator(vec![single_then_more], museum_loader(), keyboard(), Config::default());
    t.select_tour_by_id("two");
    t.begin_tour().await;
    t.user_ready().await;
    t.request_next().await;
    assert!(t.progress().waiting_for_continue);
    t.drain();

    t.stop_tour(false).await;

    assert!(matches!(t.drain().as_slice(), [TourEvent::TourStopped { return_home: false }]));
    assert!(!t.continue_to_next_floor().await);
}

#[tokio::test]
async fn test_load_failure_skips_floor() {
    let broken = tour(
        "broken",
        vec![floor("basement", "flooded", &["a"]), floor("upper", "upper", &["d", "e"])],
    );
    let mut t = create_test_orchestrator(vec![broken], museum_loader(), keyboard(), Config::default());
    t.select_tour_by_id("broken");

    t.begin_tour().await;

    let events = t.drain();
    assert!(matches!(events.as_slice(), [TourEvent::FloorFailed { floor_index: 0, .. }]));
    assert!(t.progress().waiting_for_continue);
    assert_eq!(t.metrics.floors_failed(), 1);

    t.continue_to_next_floor().await;
    assert!(matches!(t.drain().as_slice(), [TourEvent::FloorLoaded { floor_index: 1, .. }]));
}

#[tokio::test]
async fn test_init_failure_on_last_floor_completes_tour() {
    let loader = InMemoryAreaSetLoader::new()
        .with_set(AreaSet::new("bare").with_object(AreaObject::bound(
            "a",
            TriggerVolume::new(at(1.0), Vec3::new(0.5, 1.0, 0.5)),
        )));
    let bare = tour("bare", vec![floor("attic", "bare", &["a"])]);
    let mut t = create_test_orchestrator(vec![bare], loader, keyboard(), Config::default());
    t.select_tour_by_id("bare");

    t.begin_tour().await;

    let kinds: Vec<_> = t.drain().iter().map(|e| e.as_str()).collect();
    assert_eq!(kinds, vec!["floor_failed", "tour_completed"]);
    // Content was released even though the floor never started
    assert_eq!(t.loader.log(), vec!["load:bare", "unload:bare"]);
}

#[tokio::test]
async fn test_overlay_mode_disables_area_set_outputs() {
    let config = Config::default().with_render_mode(RenderMode::Overlay);
    let mut t = create_test_orchestrator(vec![museum()], museum_loader(), keyboard(), config);
    t.select_tour_by_id("museum");
    t.begin_tour().await;

    let outputs = t.active_floor().unwrap().area_set().outputs();
    assert_eq!(outputs, OutputSurfaces { camera: false, listener: false });
}

#[tokio::test]
async fn test_standard_mode_keeps_area_set_outputs() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");
    t.begin_tour().await;

    assert_eq!(t.active_floor().unwrap().area_set().outputs(), OutputSurfaces::default());
}

#[tokio::test]
async fn test_set_connection_override() {
    let mut t = create_museum();

    t.set_connection(false);
    t.set_connection(false);
    t.set_connection(true);

    let events = t.drain();
    assert!(matches!(
        events.as_slice(),
        [
            TourEvent::ConnectionChanged { connected: false },
            TourEvent::ConnectionChanged { connected: true }
        ]
    ));
}

/// Source that never yields a position
struct DeadSource;

impl PositionSource for DeadSource {
    fn poll(&mut self) -> Option<Vec3> {
        None
    }
}

#[tokio::test]
async fn test_sensor_loss_surfaces_once() {
    let sensor = SensorPositioning::new(DeadSource, SensorConfig { loss_threshold: 3, ..SensorConfig::default() });
    let mut t = create_test_orchestrator(vec![museum()], museum_loader(), Box::new(sensor), Config::default());
    t.select_tour_by_id("museum");
    t.begin_tour().await;
    t.drain();
    // Mark connected first so loss is a real transition
    t.set_connection(true);
    t.drain();

    let t0 = Instant::now();
    for i in 0..10 {
        t.tick(t0 + Duration::from_millis(20 * i)).await;
    }

    let losses = t
        .drain()
        .into_iter()
        .filter(|e| matches!(e, TourEvent::ConnectionChanged { connected: false }))
        .count();
    assert_eq!(losses, 1);
}

#[tokio::test]
async fn test_tick_without_floor_is_noop() {
    let mut t = create_museum();
    t.tick(Instant::now()).await;
    assert!(t.drain().is_empty());
    assert_eq!(t.metrics.ticks_total(), 0);
}

#[tokio::test]
async fn test_select_rejected_while_floor_active() {
    let mut t = create_museum();
    t.select_tour_by_id("museum");
    t.begin_tour().await;

    assert!(!t.select_tour(museum()));
}

#[tokio::test]
async fn test_progress_ratio_zero_total() {
    assert_eq!(TourProgress::default().ratio(), 0.0);
    let progress = TourProgress { visited: 2, total: 8, ..TourProgress::default() };
    assert_eq!(progress.ratio(), 0.25);
}

#[tokio::test]
async fn test_run_loop_processes_commands_until_shutdown() {
    let mut t = create_museum();
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    cmd_tx.send(TourCommand::SelectTour("museum".to_string())).await.unwrap();
    cmd_tx.send(TourCommand::BeginTour).await.unwrap();
    cmd_tx.send(TourCommand::UserReady).await.unwrap();
    drop(cmd_tx);

    // Channel closes after the queued commands; the loop stops the tour on exit
    t.run(cmd_rx, shutdown_rx).await;
    drop(shutdown_tx);

    let kinds: Vec<_> = t.drain().iter().map(|e| e.as_str()).collect();
    assert_eq!(kinds.first(), Some(&"floor_loaded"));
    assert!(kinds.contains(&"area_confirmed"));
    assert_eq!(kinds.last(), Some(&"tour_stopped"));
}

#[tokio::test]
async fn test_continue_command_loads_next_floor() {
    let mut t = create_museum();
    let t0 = Instant::now();
    t.process_command(TourCommand::SelectTour("museum".to_string())).await;
    t.process_command(TourCommand::BeginTour).await;
    t.process_command(TourCommand::UserReady).await;
    t.visit(5.0, t0).await;
    t.visit(9.0, t0 + Duration::from_secs(5)).await;
    t.process_command(TourCommand::RequestNext).await;
    assert!(t.progress().waiting_for_continue);
    t.drain();

    t.process_command(TourCommand::ContinueToNextFloor).await;

    assert!(matches!(t.drain().as_slice(), [TourEvent::FloorLoaded { floor_index: 1, .. }]));
    assert_eq!(t.active_floor_index(), Some(1));
    assert!(!t.progress().waiting_for_continue);
}
