//! Progress event bus
//!
//! Fire-and-forget progress reporting over a tokio broadcast channel.
//! Emission never blocks the pipeline: with no subscribers the event is
//! dropped, and a slow subscriber lags (losing oldest events) rather than
//! applying backpressure.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::StageKind;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_024;

/// One progress event from a workflow run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Run this event belongs to
    pub run_id: String,

    /// Stage in progress, if the event is stage-scoped
    pub stage: Option<StageKind>,

    /// Units finished so far within the stage
    pub units_completed: usize,

    /// Total units in the stage
    pub units_total: usize,

    /// Human-readable current action
    pub message: String,

    /// Emission time
    pub at: DateTime<Utc>,
}

/// Central progress bus; components emit, listeners subscribe
pub struct ProgressBus {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers
    ///
    /// Fire-and-forget: no subscribers is fine, full channels drop the
    /// oldest events on the lagging receiver's side.
    pub fn emit(&self, event: ProgressEvent) {
        debug!(run_id = %event.run_id, message = %event.message, "ProgressBus::emit");
        let _ = self.tx.send(event);
    }

    /// Subscribe to receive events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    /// Create an emitter handle bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> ProgressEmitter {
        ProgressEmitter {
            tx: self.tx.clone(),
            run_id: run_id.into(),
        }
    }

    /// Number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

/// Handle for emitting events without owning the bus
///
/// Cheap to clone; pre-binds the run id.
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: broadcast::Sender<ProgressEvent>,
    run_id: String,
}

impl ProgressEmitter {
    /// The run this emitter is bound to
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn emit(&self, stage: Option<StageKind>, completed: usize, total: usize, message: String) {
        let _ = self.tx.send(ProgressEvent {
            run_id: self.run_id.clone(),
            stage,
            units_completed: completed,
            units_total: total,
            message,
            at: Utc::now(),
        });
    }

    pub fn run_started(&self) {
        self.emit(None, 0, 0, "run started".to_string());
    }

    pub fn stage_started(&self, stage: StageKind, units_total: usize) {
        self.emit(Some(stage), 0, units_total, format!("stage {} started", stage));
    }

    pub fn unit_finished(&self, stage: StageKind, completed: usize, total: usize, parent_title: &str) {
        self.emit(
            Some(stage),
            completed,
            total,
            format!("generated {} children for '{}'", stage, parent_title),
        );
    }

    pub fn stage_completed(&self, stage: StageKind, units_total: usize) {
        self.emit(
            Some(stage),
            units_total,
            units_total,
            format!("stage {} completed", stage),
        );
    }

    pub fn stage_skipped(&self, stage: StageKind) {
        self.emit(Some(stage), 0, 0, format!("stage {} skipped (no parents)", stage));
    }

    pub fn remediation_applied(&self, nodes_added: usize) {
        self.emit(None, 0, 0, format!("remediation added {} artifacts", nodes_added));
    }

    pub fn run_completed(&self, coverage: f64) {
        self.emit(None, 0, 0, format!("run completed, coverage {:.0}%", coverage * 100.0));
    }
}
