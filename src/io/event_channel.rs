//! Typed channel for tour events
//!
//! Provides a non-blocking way to hand events to the display layer and the
//! egress writer. The channel is unbounded: the display drives the tour off
//! lifecycle events, so none may be lost to a slow consumer. Events are only
//! dropped (and counted) once the receiver is gone.

use crate::domain::events::TourEvent;
use crate::infra::metrics::Metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// A tour event stamped with the tour run it belongs to
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Tour run (minted on tour selection); absent before any selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    #[serde(flatten)]
    pub event: TourEvent,
}

/// Sending half owned by the orchestrator
pub struct EventSender {
    tx: mpsc::UnboundedSender<EventEnvelope>,
    run_id: Option<Uuid>,
    metrics: Option<Arc<Metrics>>,
}

impl EventSender {
    pub fn new(tx: mpsc::UnboundedSender<EventEnvelope>) -> Self {
        Self { tx, run_id: None, metrics: None }
    }

    /// Create a sender that counts dropped events
    pub fn with_metrics(tx: mpsc::UnboundedSender<EventEnvelope>, metrics: Arc<Metrics>) -> Self {
        Self { metrics: Some(metrics), ..Self::new(tx) }
    }

    /// Start a new tour run; later events carry the returned id
    pub fn begin_run(&mut self) -> Uuid {
        let run_id = Uuid::now_v7();
        self.run_id = Some(run_id);
        run_id
    }

    pub fn run_id(&self) -> Option<Uuid> {
        self.run_id
    }

    /// Queue an event in order; dropped only when the receiver is gone
    pub fn send(&self, event: TourEvent) {
        let kind = event.as_str();
        let envelope = EventEnvelope { run_id: self.run_id, ts: Utc::now(), event };

        if self.tx.send(envelope).is_err() {
            debug!(event = %kind, "tour_event_dropped_no_receiver");
            if let Some(ref metrics) = self.metrics {
                metrics.record_event_dropped();
            }
        }
    }
}

/// Create a new event channel pair
pub fn create_event_channel(
    metrics: Arc<Metrics>,
) -> (EventSender, mpsc::UnboundedReceiver<EventEnvelope>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender::with_metrics(tx, metrics), rx)
}
