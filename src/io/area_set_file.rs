//! Area-set description files
//!
//! Each floor's content lives in `<area_set_dir>/<area_set>.toml`:
//!
//! ```toml
//! spawn = [1.0, 0.0, 2.0]
//! camera = true
//! listener = true
//!
//! [surface]
//! origin = [0.0, 0.0]
//! cell_size = 0.5
//! rows = ["........", "..##....", "........"]
//!
//! [[areas]]
//! id = "lobby"
//! center = [1.0, 0.0, 1.0]
//! half_extents = [0.75, 1.5, 0.75]
//! ```

use crate::domain::types::{AreaId, TriggerVolume, Vec3};
use crate::nav::GridNavMesh;
use crate::services::area_set::{AreaObject, AreaSet, AreaSetLoader, OutputSurfaces};
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct TomlAreaSet {
    #[serde(default)]
    spawn: Option<[f32; 3]>,
    #[serde(default = "default_true")]
    camera: bool,
    #[serde(default = "default_true")]
    listener: bool,
    #[serde(default)]
    surface: Option<TomlSurface>,
    #[serde(default)]
    areas: Vec<TomlArea>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct TomlSurface {
    #[serde(default)]
    origin: [f32; 2],
    cell_size: f32,
    #[serde(default)]
    height: f32,
    rows: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TomlArea {
    /// Unbound objects are loaded but never sequenced
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    center: Option<[f32; 3]>,
    #[serde(default)]
    half_extents: Option<[f32; 3]>,
}

/// Parse area-set TOML into loaded content named `name`
pub fn parse_area_set(name: &str, content: &str) -> anyhow::Result<AreaSet> {
    let toml_set: TomlAreaSet = toml::from_str(content).context("Failed to parse area-set")?;

    let mut set = AreaSet::new(name).with_outputs(OutputSurfaces {
        camera: toml_set.camera,
        listener: toml_set.listener,
    });
    if let Some(spawn) = toml_set.spawn {
        set = set.with_spawn(Vec3::from(spawn));
    }
    if let Some(surface) = toml_set.surface {
        let mesh = GridNavMesh::from_rows(surface.origin, surface.cell_size, surface.height, &surface.rows)
            .with_context(|| format!("Invalid walkable surface in area-set {name}"))?;
        set = set.with_surface(Arc::new(mesh));
    }

    for area in toml_set.areas {
        let trigger = match (area.center, area.half_extents) {
            (Some(center), Some(half)) => Some(TriggerVolume::new(Vec3::from(center), Vec3::from(half))),
            _ => None,
        };
        if trigger.as_ref().is_some_and(|t| !t.is_usable()) {
            warn!(area_set = %name, area = ?area.id, "area_trigger_degenerate");
        }
        set = set.with_object(AreaObject::new(area.id.map(AreaId::new), trigger));
    }

    Ok(set)
}

/// Loads area-sets from TOML files in a directory
pub struct FileAreaSetLoader {
    dir: PathBuf,
}

impl FileAreaSetLoader {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        info!(dir = %dir.display(), "area_set_loader_initialized");
        Self { dir }
    }

    fn path_for(&self, area_set: &str) -> PathBuf {
        self.dir.join(format!("{area_set}.toml"))
    }
}

#[async_trait]
impl AreaSetLoader for FileAreaSetLoader {
    async fn load(&self, area_set: &str) -> anyhow::Result<AreaSet> {
        let path = self.path_for(area_set);
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read area-set {}", path.display()))?;
        let set = parse_area_set(area_set, &content)
            .with_context(|| format!("Failed to load area-set {}", path.display()))?;

        info!(
            area_set = %area_set,
            objects = %set.len(),
            has_surface = %set.surface().is_some(),
            "area_set_loaded"
        );
        Ok(set)
    }

    async fn unload(&self, area_set: AreaSet) {
        debug!(area_set = %area_set.name(), "area_set_unloaded");
    }
}
