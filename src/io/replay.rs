//! Recorded sensor feed for offline runs
//!
//! One JSON value per line: `{"x":1.0,"y":0.0,"z":2.5}` is a successful poll,
//! `null` a failed one. Blank lines are skipped. When the recording runs out
//! every further poll fails, which exercises signal-loss handling.

use crate::domain::types::Vec3;
use crate::services::positioning::PositionSource;
use anyhow::Context;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use tracing::info;

pub struct ReplaySource {
    samples: VecDeque<Option<Vec3>>,
    looping: bool,
    recording: Vec<Option<Vec3>>,
}

impl ReplaySource {
    pub fn new(samples: Vec<Option<Vec3>>, looping: bool) -> Self {
        Self { samples: samples.iter().copied().collect(), looping, recording: samples }
    }

    pub fn parse(content: &str, looping: bool) -> anyhow::Result<Self> {
        let mut samples = Vec::new();
        for (i, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let sample: Option<Vec3> = serde_json::from_str(line)
                .with_context(|| format!("Invalid position sample on line {}", i + 1))?;
            samples.push(sample);
        }
        Ok(Self::new(samples, looping))
    }

    pub fn from_file<P: AsRef<Path>>(path: P, looping: bool) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let source = Self::parse(&content, looping)
            .with_context(|| format!("Failed to parse replay file {}", path.display()))?;
        info!(
            file = %path.display(),
            samples = %source.recording.len(),
            failures = %source.recording.iter().filter(|s| s.is_none()).count(),
            looping = %looping,
            "replay_loaded"
        );
        Ok(source)
    }

    pub fn remaining(&self) -> usize {
        self.samples.len()
    }
}

impl PositionSource for ReplaySource {
    fn poll(&mut self) -> Option<Vec3> {
        if self.samples.is_empty() && self.looping && !self.recording.is_empty() {
            self.samples.extend(self.recording.iter().copied());
        }
        self.samples.pop_front().flatten()
    }
}
