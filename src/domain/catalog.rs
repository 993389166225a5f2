//! Tour catalog loading from TOML
//!
//! Areas are declared once and referenced by id from each floor, so the same
//! `Arc<AreaDefinition>` is shared wherever it appears.

use crate::domain::types::{AreaDefinition, AreaId, FloorDefinition, TourDefinition};
use anyhow::Context;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct TomlCatalog {
    #[serde(default)]
    areas: Vec<AreaDefinition>,
    #[serde(default)]
    tours: Vec<TomlTour>,
}

#[derive(Debug, Deserialize)]
struct TomlTour {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    floors: Vec<TomlFloor>,
}

#[derive(Debug, Deserialize)]
struct TomlFloor {
    name: String,
    area_set: String,
    #[serde(default)]
    transition_text: String,
    #[serde(default)]
    areas: Vec<String>,
}

/// All tours known to this installation
#[derive(Debug, Default)]
pub struct TourCatalog {
    tours: Vec<Arc<TourDefinition>>,
}

impl TourCatalog {
    pub fn new(tours: Vec<Arc<TourDefinition>>) -> Self {
        Self { tours }
    }

    /// Load a catalog from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read tour catalog {}", path.display()))?;
        let catalog = Self::parse(&content)
            .with_context(|| format!("Failed to parse tour catalog {}", path.display()))?;
        info!(
            file = %path.display(),
            tours = %catalog.tours.len(),
            "tour_catalog_loaded"
        );
        Ok(catalog)
    }

    /// Parse catalog TOML, resolving floor area references
    ///
    /// Authoring mistakes (duplicate area ids, references to unknown areas)
    /// are logged and skipped rather than rejected.
    pub fn parse(content: &str) -> anyhow::Result<Self> {
        let raw: TomlCatalog = toml::from_str(content)?;

        let mut areas: FxHashMap<AreaId, Arc<AreaDefinition>> = FxHashMap::default();
        for area in raw.areas {
            if areas.contains_key(&area.id) {
                warn!(area = %area.id, "catalog_duplicate_area_ignored");
                continue;
            }
            areas.insert(area.id.clone(), Arc::new(area));
        }

        let mut tours = Vec::with_capacity(raw.tours.len());
        for tour in raw.tours {
            let floors = tour
                .floors
                .into_iter()
                .map(|floor| {
                    let resolved = floor
                        .areas
                        .iter()
                        .filter_map(|id| {
                            let found = areas.get(&AreaId::new(id.as_str())).cloned();
                            if found.is_none() {
                                warn!(
                                    tour = %tour.id,
                                    floor = %floor.name,
                                    area = %id,
                                    "catalog_unknown_area_reference"
                                );
                            }
                            found
                        })
                        .collect();
                    Arc::new(FloorDefinition {
                        name: floor.name,
                        area_set: floor.area_set,
                        transition_text: floor.transition_text,
                        areas: resolved,
                    })
                })
                .collect();

            tours.push(Arc::new(TourDefinition {
                name: tour.name.unwrap_or_else(|| tour.id.clone()),
                id: tour.id,
                floors,
            }));
        }

        Ok(Self { tours })
    }

    pub fn get(&self, tour_id: &str) -> Option<Arc<TourDefinition>> {
        self.tours.iter().find(|t| t.id == tour_id).cloned()
    }

    pub fn tours(&self) -> &[Arc<TourDefinition>] {
        &self.tours
    }

    pub fn is_empty(&self) -> bool {
        self.tours.is_empty()
    }
}
