//! Domain models - tour definitions, geometry primitives and events
//!
//! This module contains the canonical data types used throughout the system:
//! - `TourDefinition` / `FloorDefinition` / `AreaDefinition` - immutable reference data
//! - `Vec3` / `TriggerVolume` - world-space geometry
//! - `TourEvent` / `FloorEvent` / `TourCommand` - the display-layer contract
//! - `TourCatalog` - tour definitions loaded from TOML

pub mod catalog;
pub mod events;
pub mod types;

// Re-export commonly used types at module level
pub use catalog::TourCatalog;
pub use events::{ConnectionChange, FloorEvent, Route, TourCommand, TourEvent};
pub use types::{AreaDefinition, AreaId, FloorDefinition, TourDefinition, TriggerVolume, Vec3};
