//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::nav::ClampSearch;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Which positioning strategy drives the walker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositioningMode {
    #[default]
    Sensor,
    Keyboard,
}

/// Who owns the rendering surface and audio destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    /// The loaded area-set's camera and listener are the active ones
    #[default]
    Standard,
    /// An external overlay renders; area-set camera and listener are disabled
    Overlay,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Unique site identifier (e.g., "museum-north")
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "tour-nav".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToursConfig {
    /// Tour catalog file (TOML)
    #[serde(default = "default_catalog")]
    pub catalog: String,
    /// Directory holding `<area_set>.toml` files
    #[serde(default = "default_area_set_dir")]
    pub area_set_dir: String,
    /// Tour selected at startup; first catalog entry when absent
    #[serde(default)]
    pub default_tour: Option<String>,
}

impl Default for ToursConfig {
    fn default() -> Self {
        Self { catalog: default_catalog(), area_set_dir: default_area_set_dir(), default_tour: None }
    }
}

fn default_catalog() -> String {
    "config/tours.toml".to_string()
}

fn default_area_set_dir() -> String {
    "config/area_sets".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressionConfig {
    /// Time the walker must stay inside an area before it is confirmed
    #[serde(default = "default_dwell_threshold_ms")]
    pub dwell_threshold_ms: u64,
    /// Update loop period
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            dwell_threshold_ms: default_dwell_threshold_ms(),
            tick_interval_ms: default_tick_interval_ms(),
        }
    }
}

fn default_dwell_threshold_ms() -> u64 {
    750
}

fn default_tick_interval_ms() -> u64 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathSection {
    /// Walker/target displacement (meters) that triggers a route recompute
    #[serde(default = "default_recompute_distance")]
    pub recompute_distance: f32,
    /// Radius used to find the walkable surface near route endpoints
    #[serde(default = "default_sample_radius")]
    pub sample_radius: f32,
}

impl Default for PathSection {
    fn default() -> Self {
        Self { recompute_distance: default_recompute_distance(), sample_radius: default_sample_radius() }
    }
}

fn default_recompute_distance() -> f32 {
    0.5
}

fn default_sample_radius() -> f32 {
    2.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositioningSection {
    #[serde(default)]
    pub mode: PositioningMode,
    /// Sensor poll period; 0 polls every tick
    #[serde(default)]
    pub poll_interval_ms: u64,
    /// Consecutive failed polls before the connection is reported lost
    #[serde(default = "default_loss_threshold")]
    pub loss_threshold: u32,
    #[serde(default = "default_clamp_start_radius")]
    pub clamp_start_radius: f32,
    #[serde(default = "default_clamp_growth")]
    pub clamp_growth: f32,
    #[serde(default = "default_clamp_max_radius")]
    pub clamp_max_radius: f32,
    #[serde(default)]
    pub smoothing: bool,
    #[serde(default = "default_smoothing_speed")]
    pub smoothing_speed: f32,
    #[serde(default = "default_keyboard_speed")]
    pub keyboard_speed: f32,
    /// JSONL recording of sensor samples; sensor mode reads from it
    #[serde(default)]
    pub replay_file: Option<String>,
}

impl Default for PositioningSection {
    fn default() -> Self {
        Self {
            mode: PositioningMode::default(),
            poll_interval_ms: 0,
            loss_threshold: default_loss_threshold(),
            clamp_start_radius: default_clamp_start_radius(),
            clamp_growth: default_clamp_growth(),
            clamp_max_radius: default_clamp_max_radius(),
            smoothing: false,
            smoothing_speed: default_smoothing_speed(),
            keyboard_speed: default_keyboard_speed(),
            replay_file: None,
        }
    }
}

fn default_loss_threshold() -> u32 {
    50
}

fn default_clamp_start_radius() -> f32 {
    0.5
}

fn default_clamp_growth() -> f32 {
    2.0
}

fn default_clamp_max_radius() -> f32 {
    8.0
}

fn default_smoothing_speed() -> f32 {
    1.5
}

fn default_keyboard_speed() -> f32 {
    1.4
}

#[derive(Debug, Clone, Deserialize)]
pub struct DisplayConfig {
    #[serde(default)]
    pub render_mode: RenderMode,
    /// How long an informational area is shown before guidance resumes
    #[serde(default = "default_info_pause_ms")]
    pub info_pause_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { render_mode: RenderMode::default(), info_pause_ms: default_info_pause_ms() }
    }
}

fn default_info_pause_ms() -> u64 {
    3000
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for tour event egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "tour_events.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub tours: ToursConfig,
    #[serde(default)]
    pub progression: ProgressionConfig,
    #[serde(default)]
    pub path: PathSection,
    #[serde(default)]
    pub positioning: PositioningSection,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    tours_catalog: String,
    area_set_dir: String,
    default_tour: Option<String>,
    dwell_threshold_ms: u64,
    tick_interval_ms: u64,
    recompute_distance: f32,
    sample_radius: f32,
    positioning_mode: PositioningMode,
    poll_interval_ms: u64,
    loss_threshold: u32,
    clamp: ClampSearch,
    smoothing: bool,
    smoothing_speed: f32,
    keyboard_speed: f32,
    replay_file: Option<String>,
    render_mode: RenderMode,
    info_pause_ms: u64,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default".to_string())
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: String) -> Self {
        let positioning = toml_config.positioning;
        Self {
            site_id: toml_config.site.id,
            tours_catalog: toml_config.tours.catalog,
            area_set_dir: toml_config.tours.area_set_dir,
            default_tour: toml_config.tours.default_tour,
            dwell_threshold_ms: toml_config.progression.dwell_threshold_ms,
            tick_interval_ms: toml_config.progression.tick_interval_ms,
            recompute_distance: toml_config.path.recompute_distance,
            sample_radius: toml_config.path.sample_radius,
            positioning_mode: positioning.mode,
            poll_interval_ms: positioning.poll_interval_ms,
            loss_threshold: positioning.loss_threshold,
            clamp: ClampSearch {
                start_radius: positioning.clamp_start_radius,
                growth: positioning.clamp_growth,
                max_radius: positioning.clamp_max_radius,
            },
            smoothing: positioning.smoothing,
            smoothing_speed: positioning.smoothing_speed,
            keyboard_speed: positioning.keyboard_speed,
            replay_file: positioning.replay_file,
            render_mode: toml_config.display.render_mode,
            info_pause_ms: toml_config.display.info_pause_ms,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file,
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let toml_config: TomlConfig = toml::from_str(content).context("Failed to parse config")?;
        Ok(Self::from_toml(toml_config, "inline".to_string()))
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, path.display().to_string()))
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn tours_catalog(&self) -> &str {
        &self.tours_catalog
    }

    pub fn area_set_dir(&self) -> &str {
        &self.area_set_dir
    }

    pub fn default_tour(&self) -> Option<&str> {
        self.default_tour.as_deref()
    }

    pub fn dwell_threshold(&self) -> Duration {
        Duration::from_millis(self.dwell_threshold_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn recompute_distance(&self) -> f32 {
        self.recompute_distance
    }

    pub fn sample_radius(&self) -> f32 {
        self.sample_radius
    }

    pub fn positioning_mode(&self) -> PositioningMode {
        self.positioning_mode
    }

    pub fn poll_interval_ms(&self) -> u64 {
        self.poll_interval_ms
    }

    pub fn loss_threshold(&self) -> u32 {
        self.loss_threshold
    }

    pub fn clamp_search(&self) -> ClampSearch {
        self.clamp
    }

    pub fn smoothing_enabled(&self) -> bool {
        self.smoothing
    }

    pub fn smoothing_speed(&self) -> f32 {
        self.smoothing_speed
    }

    pub fn keyboard_speed(&self) -> f32 {
        self.keyboard_speed
    }

    pub fn replay_file(&self) -> Option<&str> {
        self.replay_file.as_deref()
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn info_pause(&self) -> Duration {
        Duration::from_millis(self.info_pause_ms)
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs.max(1)
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the dwell threshold
    pub fn with_dwell_threshold_ms(mut self, ms: u64) -> Self {
        self.dwell_threshold_ms = ms;
        self
    }

    /// Builder method for tests to select the positioning strategy
    pub fn with_positioning_mode(mut self, mode: PositioningMode) -> Self {
        self.positioning_mode = mode;
        self
    }

    /// Builder method for tests to select the render mode
    pub fn with_render_mode(mut self, mode: RenderMode) -> Self {
        self.render_mode = mode;
        self
    }
}
