//! WorkflowRun domain type
//!
//! One end-to-end execution of the generation pipeline. Owned exclusively
//! by the pipeline for its lifetime; immutable once terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::generate_id;
use super::stage::StageKind;

/// Run status in the pipeline state machine
///
/// `Failed` is reachable only from a configuration error detected before
/// any stage starts; once stages begin, per-unit fallback guarantees the
/// run reaches `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created, not yet started
    #[default]
    Queued,
    /// Stages executing
    Running,
    /// All stages done, completeness report produced
    Completed,
    /// Unrecoverable configuration error before any stage started
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One end-to-end execution of the generation pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    /// Unique identifier (e.g., "f3a9c1-run-online-store")
    pub id: String,

    /// The product vision text driving generation
    pub vision: String,

    /// Current status in the state machine
    pub status: RunStatus,

    /// Stage currently executing, if any
    pub current_stage: Option<StageKind>,

    /// Run start time
    pub started_at: Option<DateTime<Utc>>,

    /// Run finish time (terminal states only)
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowRun {
    /// Create a new queued run for a vision
    pub fn new(vision: impl Into<String>) -> Self {
        let vision = vision.into();
        let title: String = vision.chars().take(40).collect();
        Self {
            id: generate_id("run", &title),
            vision,
            status: RunStatus::Queued,
            current_stage: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Transition to Running
    pub fn start(&mut self) {
        self.status = RunStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record the stage currently executing
    pub fn enter_stage(&mut self, stage: StageKind) {
        self.current_stage = Some(stage);
    }

    /// Transition to a terminal state
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.current_stage = None;
        self.finished_at = Some(Utc::now());
    }

    /// Check if the run is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, RunStatus::Completed | RunStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_new() {
        let run = WorkflowRun::new("Build an online plant store");
        assert!(run.id.contains("-run-"));
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.started_at.is_none());
        assert!(!run.is_terminal());
    }

    #[test]
    fn test_run_lifecycle() {
        let mut run = WorkflowRun::new("vision");
        run.start();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.started_at.is_some());

        run.enter_stage(StageKind::Epic);
        assert_eq!(run.current_stage, Some(StageKind::Epic));

        run.finish(RunStatus::Completed);
        assert!(run.is_terminal());
        assert!(run.current_stage.is_none());
        assert!(run.finished_at.is_some());
    }

    #[test]
    fn test_run_serde() {
        let run = WorkflowRun::new("vision");
        let json = serde_json::to_string(&run).unwrap();
        let back: WorkflowRun = serde_json::from_str(&json).unwrap();
        assert_eq!(run.id, back.id);
        assert_eq!(back.status, RunStatus::Queued);
    }
}
