//! Tour event egress - writes tour events to file
//!
//! Events are written in JSONL format (one JSON object per line)
//! to the file specified in config.

use crate::io::event_channel::EventEnvelope;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{debug, error, info};

/// Envelope plus the site it was recorded at
#[derive(Serialize)]
struct EgressRecord<'a> {
    site: &'a str,
    #[serde(flatten)]
    envelope: &'a EventEnvelope,
}

/// Egress writer for tour events
pub struct Egress {
    file_path: String,
    site_id: String,
}

impl Egress {
    pub fn new(file_path: &str, site_id: &str) -> Self {
        info!(file_path = %file_path, site = %site_id, "egress_initialized");
        Self { file_path: file_path.to_string(), site_id: site_id.to_string() }
    }

    /// Write an event to the egress file
    /// Returns true if successful, false otherwise
    pub fn write_event(&self, envelope: &EventEnvelope) -> bool {
        let record = EgressRecord { site: &self.site_id, envelope };
        let json = match serde_json::to_string(&record) {
            Ok(json) => json,
            Err(e) => {
                error!(event = %envelope.event.as_str(), error = %e, "event_serialize_failed");
                return false;
            }
        };

        match self.append_line(&json) {
            Ok(()) => {
                debug!(event = %envelope.event.as_str(), "event_egressed");
                true
            }
            Err(e) => {
                error!(event = %envelope.event.as_str(), error = %e, "event_egress_failed");
                false
            }
        }
    }

    /// Append a line to the egress file
    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let path = Path::new(&self.file_path);

        // Create parent directories if they don't exist
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;

        writeln!(file, "{}", line)?;
        debug!(file = %self.file_path, bytes = %line.len(), "egress_written");

        Ok(())
    }
}
