//! tour-nav - guided multi-floor indoor tour runner
//!
//! Runs the navigation core headless: tour events go to the log and the JSONL
//! egress file, and a minimal display stand-in answers the prompts a kiosk
//! UI would show (ready, info pauses, floor transitions).
//!
//! Module structure:
//! - `domain/` - Tour definitions, geometry and events
//! - `nav/` - Walkable surfaces and grid path search
//! - `io/` - External interfaces (area-set files, replay feed, keyboard, egress)
//! - `services/` - Orchestrator, FloorManager, registry, planner, positioning
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tour_nav::domain::{TourCatalog, TourCommand, TourEvent};
use tour_nav::infra::{Config, Metrics, PositioningMode};
use tour_nav::io::keyboard_input::run_keyboard_input;
use tour_nav::io::{create_event_channel, Egress, EventEnvelope, FileAreaSetLoader, ReplaySource};
use tour_nav::services::positioning::{self, PositionSource};
use tour_nav::services::TourOrchestrator;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// tour-nav - guided indoor tour navigation core
#[derive(Parser, Debug)]
#[command(name = "tour-nav", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Tour to run (defaults to tours.default_tour, then the first catalog entry)
    #[arg(short, long)]
    tour: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "tour-nav starting");

    let args = Args::parse();
    let config = match args.config {
        Some(ref path) => Config::load_from_path(path),
        None => Config::load(&[]),
    };

    info!(
        config_file = %config.config_file(),
        site = %config.site_id(),
        catalog = %config.tours_catalog(),
        area_set_dir = %config.area_set_dir(),
        positioning = ?config.positioning_mode(),
        render_mode = ?config.render_mode(),
        dwell_threshold_ms = %config.dwell_threshold().as_millis(),
        "config_loaded"
    );

    let catalog = TourCatalog::from_file(config.tours_catalog())?;
    let tour_id = args
        .tour
        .clone()
        .or_else(|| config.default_tour().map(str::to_string))
        .or_else(|| catalog.tours().first().map(|t| t.id.clone()))
        .ok_or("tour catalog is empty")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let metrics = Arc::new(Metrics::new());

    // Position feed: recorded samples stand in for sensor hardware
    let source: Option<Box<dyn PositionSource>> = match config.replay_file() {
        Some(path) => match ReplaySource::from_file(path, false) {
            Ok(replay) => Some(Box::new(replay)),
            Err(e) => {
                warn!(file = %path, error = %format!("{e:#}"), "replay_load_failed");
                None
            }
        },
        None => None,
    };
    let positioning = positioning::from_config(&config, source, metrics.clone());

    let (event_sender, event_rx) = create_event_channel(metrics.clone());
    let (cmd_tx, cmd_rx) = mpsc::channel::<TourCommand>(64);

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    // Start display stand-in: egress + automatic prompt answers
    let egress = Egress::new(config.egress_file(), config.site_id());
    let display_cmd_tx = cmd_tx.clone();
    let display_shutdown = shutdown_tx.clone();
    let info_pause = config.info_pause();
    tokio::spawn(async move {
        run_display(event_rx, egress, display_cmd_tx, display_shutdown, info_pause).await;
    });

    // Keyboard steering when running without a sensor
    if config.positioning_mode() == PositioningMode::Keyboard {
        let key_tx = cmd_tx.clone();
        let key_shutdown = shutdown_tx.clone();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = run_keyboard_input(key_tx, key_shutdown) {
                error!(error = %e, "keyboard_input_failed");
            }
        });
    }

    // Handle shutdown on Ctrl+C
    let shutdown_signal = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_signal.send(true);
    });

    cmd_tx.send(TourCommand::SelectTour(tour_id)).await?;
    cmd_tx.send(TourCommand::BeginTour).await?;

    let loader = Arc::new(FileAreaSetLoader::new(config.area_set_dir()));
    let mut orchestrator =
        TourOrchestrator::new(catalog, loader, positioning, config, metrics.clone(), event_sender);
    info!("orchestrator_starting");

    // Run orchestrator until shutdown
    orchestrator.run(cmd_rx, shutdown_rx).await;

    metrics.report().log();
    info!("tour-nav shutdown complete");
    Ok(())
}

/// Write every event to egress and answer the prompts a kiosk UI would show
async fn run_display(
    mut event_rx: mpsc::UnboundedReceiver<EventEnvelope>,
    egress: Egress,
    cmd_tx: mpsc::Sender<TourCommand>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    info_pause: Duration,
) {
    while let Some(envelope) = event_rx.recv().await {
        egress.write_event(&envelope);

        let reply = match &envelope.event {
            TourEvent::FloorLoaded { floor, visited, total, .. } => {
                info!(floor = %floor.name, visited = %visited, total = %total, "display_floor_intro");
                Some((TourCommand::UserReady, Duration::ZERO))
            }
            TourEvent::AreaConfirmed { area } => {
                info!(area = %area.name, "display_area_reached");
                // Areas with content hold the walker for a while before moving on
                let pause = if area.has_info() { info_pause } else { Duration::ZERO };
                Some((TourCommand::RequestNext, pause))
            }
            TourEvent::GuidingToNext { area } => {
                info!(area = %area.name, "display_guiding");
                None
            }
            TourEvent::FloorUnloaded { floor } => {
                if !floor.transition_text.is_empty() {
                    info!(text = %floor.transition_text, "display_floor_transition");
                }
                Some((TourCommand::ContinueToNextFloor, Duration::ZERO))
            }
            TourEvent::FloorFailed { floor_index, reason } => {
                warn!(floor_index = %floor_index, reason = %reason, "display_floor_skipped");
                Some((TourCommand::ContinueToNextFloor, Duration::ZERO))
            }
            TourEvent::TourCompleted { visited, total } => {
                info!(visited = %visited, total = %total, "display_tour_completed");
                let _ = shutdown_tx.send(true);
                None
            }
            TourEvent::TourStopped { return_home } => {
                info!(return_home = %return_home, "display_tour_stopped");
                let _ = shutdown_tx.send(true);
                None
            }
            TourEvent::ConnectionChanged { connected } => {
                info!(connected = %connected, "display_connection");
                None
            }
            TourEvent::PathUpdated { .. } | TourEvent::ProgressChanged { .. } => None,
        };

        if let Some((cmd, delay)) = reply {
            let tx = cmd_tx.clone();
            tokio::spawn(async move {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let _ = tx.send(cmd).await;
            });
        }
    }
}
