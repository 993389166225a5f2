//! IO modules - external system interfaces
//!
//! This module contains all external IO operations:
//! - `event_channel` - Typed channel carrying tour events to the display layer
//! - `egress` - Tour event output to file (JSONL format)
//! - `area_set_file` - Floor content loading from TOML area-set files
//! - `replay` - Recorded position feed standing in for sensor hardware
//! - `keyboard_input` - Terminal keys mapped to steering and tour commands

pub mod area_set_file;
pub mod egress;
pub mod event_channel;
pub mod keyboard_input;
pub mod replay;

// Re-export commonly used types
pub use area_set_file::FileAreaSetLoader;
pub use egress::Egress;
pub use event_channel::{create_event_channel, EventEnvelope, EventSender};
pub use replay::ReplaySource;
