//! Services - business logic and state management
//!
//! This module contains the core navigation services:
//! - `orchestrator` - Tour lifecycle, floor loading and event forwarding
//! - `floor_manager` - Per-floor area sequence, dwell confirmation and guidance
//! - `registry` - Binding of area definitions to loaded area objects
//! - `path_planner` - Shortest walkable route to the next area
//! - `positioning` - Sensor and keyboard strategies driving the walker
//! - `area_set` - Loaded floor content and the loader interface

pub mod area_set;
pub mod floor_manager;
pub mod orchestrator;
pub mod path_planner;
pub mod positioning;
pub mod registry;

// Re-export commonly used types
pub use area_set::{AreaSet, AreaSetLoader, InMemoryAreaSetLoader};
pub use floor_manager::{FloorError, FloorManager, FloorPhase};
pub use orchestrator::{TourOrchestrator, TourProgress};
pub use path_planner::{PathConfig, PathPlanner};
pub use positioning::{Positioning, PositionSource, Walker};
pub use registry::AreaRegistry;
