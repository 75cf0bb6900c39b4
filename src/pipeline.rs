//! Pipeline orchestration
//!
//! Drives a run through the stage sequence: epic first, then one
//! generation unit per parent for every later stage, each stage waiting
//! for the previous one to finish completely. Configuration problems are
//! the only fatal errors; once stages start, fallback synthesis keeps the
//! run moving to completion. After the last stage (or a cancellation) the
//! completeness pass validates the tree and remediates any gaps.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::completeness::{CompletenessReport, CompletenessRules, remediate, validate};
use crate::config::Config;
use crate::dispatch::{Dispatcher, GenerationUnit, UnitOutcome, UnitResult};
use crate::domain::{
    ArtifactDraft, ArtifactFields, ArtifactNode, Provenance, RunStatus, STAGE_ORDER, StageKind, WorkflowRun,
};
use crate::generation::GenerationClient;
use crate::progress::{ProgressBus, ProgressEmitter, ProgressEvent};
use crate::tree::ArtifactTree;

/// Fatal pipeline errors
///
/// Everything past configuration validation degrades instead of failing,
/// so this is a single-variant enum on purpose.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {reason}")]
    ConfigurationInvalid { reason: String, run: Box<WorkflowRun> },
}

/// Per-stage outcome counts for the run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTally {
    pub stage: StageKind,
    pub units: usize,
    pub succeeded: usize,
    pub fell_back: usize,
    pub attempts: u32,
}

/// Everything a finished run produces
#[derive(Debug)]
pub struct RunOutcome {
    pub run: WorkflowRun,
    pub tree: ArtifactTree,
    pub report: CompletenessReport,
    pub tallies: Vec<StageTally>,
}

/// Stage-sequencing orchestrator
///
/// Owns the progress bus and a cancellation flag; `run` may be called
/// repeatedly, each call producing an independent tree.
pub struct Pipeline {
    config: Config,
    client: Arc<dyn GenerationClient>,
    bus: ProgressBus,
    cancel_tx: watch::Sender<bool>,
}

impl Pipeline {
    pub fn new(config: Config, client: Arc<dyn GenerationClient>) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            config,
            client,
            bus: ProgressBus::default(),
            cancel_tx,
        }
    }

    /// Subscribe to progress events for all runs on this pipeline
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.bus.subscribe()
    }

    /// Request cancellation: remaining stages are skipped, the work already
    /// attached is kept, and the run still finishes through remediation.
    ///
    /// `send_replace` stores the flag even with no run subscribed yet, so
    /// cancelling before `run` starts still takes effect.
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    /// Execute one full run for a vision
    pub async fn run(&self, vision: &str) -> Result<RunOutcome, PipelineError> {
        let mut run = WorkflowRun::new(vision);

        if vision.trim().is_empty() {
            run.finish(RunStatus::Failed);
            warn!(run_id = %run.id, "run: empty vision text");
            return Err(PipelineError::ConfigurationInvalid {
                reason: "vision text is empty".to_string(),
                run: Box::new(run),
            });
        }

        if let Err(e) = self.config.validate() {
            run.finish(RunStatus::Failed);
            warn!(run_id = %run.id, error = %e, "run: configuration invalid");
            return Err(PipelineError::ConfigurationInvalid {
                reason: e.to_string(),
                run: Box::new(run),
            });
        }

        let emitter = self.bus.emitter_for(run.id.clone());
        let cancel = self.cancel_tx.subscribe();

        run.start();
        emitter.run_started();
        info!(run_id = %run.id, "run: started");

        let tree = ArtifactTree::new();
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.client),
            self.config.dispatch.clone(),
            Duration::from_millis(self.config.generator.timeout_ms),
        );

        let mut tallies = Vec::new();
        for stage in STAGE_ORDER {
            if *cancel.borrow() {
                info!(run_id = %run.id, %stage, "run: cancelled, skipping remaining stages");
                break;
            }
            run.enter_stage(stage);

            let tally = match stage {
                StageKind::Epic => self.run_epic_stage(&dispatcher, &tree, vision, &emitter).await,
                _ => self.run_fan_out_stage(&dispatcher, &tree, stage, &emitter).await,
            };
            tallies.push(tally);
        }

        let rules = CompletenessRules::from(&self.config.completeness);
        let mut report = validate(&tree, &rules);
        if !report.is_complete() {
            let (refreshed, added) = remediate(&tree, &report, &rules);
            report = refreshed;
            emitter.remediation_applied(added);
        }

        run.finish(RunStatus::Completed);
        emitter.run_completed(report.overall_ratio);
        info!(run_id = %run.id, artifacts = tree.len(), coverage = report.overall_ratio, "run: completed");

        Ok(RunOutcome {
            run,
            tree,
            report,
            tallies,
        })
    }

    /// The root stage: a single unit, its first record becomes the root
    async fn run_epic_stage(
        &self,
        dispatcher: &Dispatcher,
        tree: &ArtifactTree,
        vision: &str,
        emitter: &ProgressEmitter,
    ) -> StageTally {
        emitter.stage_started(StageKind::Epic, 1);

        let unit = GenerationUnit {
            parent_id: None,
            parent_title: vision.to_string(),
            stage: StageKind::Epic,
            prompt: epic_prompt(vision),
            expected_records: 1,
        };
        let mut results = dispatcher.run_stage(vec![unit], emitter).await;
        let tally = tally_for(StageKind::Epic, &results);

        if let Some(result) = results.pop() {
            let provenance = provenance_for(result.outcome);
            let draft = result.records.into_iter().next().unwrap_or_else(|| {
                ArtifactDraft::new(
                    vision.to_string(),
                    ArtifactFields::Epic {
                        objective: vision.to_string(),
                    },
                )
            });
            if let Err(e) = tree.set_root(draft, provenance) {
                warn!(error = %e, "run_epic_stage: root insertion failed");
            }
        }

        emitter.stage_completed(StageKind::Epic, 1);
        tally
    }

    /// One unit per parent artifact, executed through the dispatcher
    async fn run_fan_out_stage(
        &self,
        dispatcher: &Dispatcher,
        tree: &ArtifactTree,
        stage: StageKind,
        emitter: &ProgressEmitter,
    ) -> StageTally {
        let parent_kind = match stage.parent_kind() {
            Some(kind) => kind,
            None => return tally_for(stage, &[]),
        };

        let parents: Vec<ArtifactNode> = tree
            .ids_of_kind(parent_kind)
            .iter()
            .filter_map(|id| tree.get(id))
            .collect();

        if parents.is_empty() {
            debug!(%stage, "run_fan_out_stage: no parents, skipping");
            emitter.stage_skipped(stage);
            return tally_for(stage, &[]);
        }

        let expected = self.config.stages.records_for(stage);
        let units: Vec<GenerationUnit> = parents
            .iter()
            .map(|parent| GenerationUnit {
                parent_id: Some(parent.id.clone()),
                parent_title: parent.title.clone(),
                stage,
                prompt: fan_out_prompt(stage, parent, expected),
                expected_records: expected,
            })
            .collect();

        let total = units.len();
        emitter.stage_started(stage, total);

        let results = dispatcher.run_stage(units, emitter).await;
        let tally = tally_for(stage, &results);

        for result in results {
            let provenance = provenance_for(result.outcome);
            if let Some(parent_id) = &result.parent_id
                && let Err(e) = tree.attach(parent_id, result.records, provenance)
            {
                // Parents come from this tree, so this only fires on a bug
                warn!(%stage, error = %e, "run_fan_out_stage: attachment failed");
            }
        }

        emitter.stage_completed(stage, total);
        tally
    }
}

fn provenance_for(outcome: UnitOutcome) -> Provenance {
    match outcome {
        UnitOutcome::Succeeded => Provenance::Generated,
        UnitOutcome::Pending | UnitOutcome::FellBack => Provenance::Fallback,
    }
}

fn tally_for(stage: StageKind, results: &[UnitResult]) -> StageTally {
    StageTally {
        stage,
        units: results.len(),
        succeeded: results.iter().filter(|r| r.outcome == UnitOutcome::Succeeded).count(),
        fell_back: results.iter().filter(|r| r.outcome == UnitOutcome::FellBack).count(),
        attempts: results.iter().map(|r| r.attempts).sum(),
    }
}

fn epic_prompt(vision: &str) -> String {
    format!(
        "You are planning a software project. From the product vision below, \
         produce exactly one epic as a JSON array with one object containing \
         \"title\" and \"objective\" fields. Respond with JSON only.\n\n\
         Vision:\n{vision}"
    )
}

fn fan_out_prompt(stage: StageKind, parent: &ArtifactNode, expected: usize) -> String {
    let (child_noun, fields) = match stage {
        StageKind::Epic => ("epic", "\"title\" and \"objective\""),
        StageKind::Feature => ("features", "\"title\" and \"description\""),
        StageKind::Story => (
            "user stories",
            "\"title\", \"description\", and \"acceptance_criteria\" (array of strings)",
        ),
        StageKind::Task => ("implementation tasks", "\"title\" and \"description\""),
        StageKind::TestCase => (
            "test cases",
            "\"title\", \"description\", and \"category\" (\"functional\" or \"boundary\")",
        ),
    };
    format!(
        "You are planning a software project. For the {} titled \"{}\", \
         produce up to {} {} as a JSON array of objects, each with {} fields. \
         Respond with JSON only.",
        parent.kind(),
        parent.title,
        expected,
        child_noun,
        fields,
    )
}
