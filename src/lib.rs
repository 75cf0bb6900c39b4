//! StoryForge - Vision-to-Backlog Generation Pipeline Orchestrator
//!
//! StoryForge turns a short natural-language product vision into a
//! hierarchical backlog (Epic -> Feature -> Story -> Task/TestCase) by
//! driving a text-generation provider stage by stage. Generator output is
//! unreliable by nature, so the pipeline extracts structured records
//! tolerantly, substitutes deterministic fallback content when generation
//! or extraction fails, and validates/remediates the finished tree.
//!
//! # Core Concepts
//!
//! - **Forward Progress Always**: bounded retries plus a total fallback
//!   synthesizer mean a run with valid configuration always completes
//! - **Staged Fan-Out**: stages run strictly in dependency order; within a
//!   stage, one generation unit per parent runs through a bounded worker
//!   pool under a sliding-window rate limit
//! - **Provenance Tracking**: every artifact records whether it was
//!   generated, synthesized as fallback, or added by remediation
//!
//! # Modules
//!
//! - [`generation`] - Provider client trait, typed errors, HTTP client
//! - [`extract`] - Structured record extraction from raw generator text
//! - [`fallback`] - Deterministic fallback content synthesis
//! - [`dispatch`] - Bounded parallel dispatch with rate limiting
//! - [`pipeline`] - Stage sequencing and run lifecycle
//! - [`tree`] - Concurrent artifact tree assembly
//! - [`completeness`] - Coverage validation and remediation
//! - [`progress`] - Fire-and-forget progress event bus
//! - [`config`] - Configuration types and loading

pub mod completeness;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod extract;
pub mod fallback;
pub mod generation;
pub mod pipeline;
pub mod progress;
pub mod tracker;
pub mod tree;

// Re-export commonly used types
pub use completeness::{CompletenessReport, CompletenessRules, RuleCoverage, remediate, validate};
pub use config::{CompletenessConfig, Config, DispatchConfig, GeneratorConfig, StageLimits};
pub use dispatch::{Dispatcher, GenerationUnit, RateLimiter, UnitOutcome, UnitResult};
pub use domain::{
    ArtifactDraft, ArtifactFields, ArtifactKind, ArtifactNode, Provenance, RunStatus, StageKind, TestCategory,
    WorkflowRun, generate_id,
};
pub use extract::extract_records;
pub use fallback::synthesize;
pub use generation::{GenerationClient, GenerationError, HttpGenerationClient};
pub use pipeline::{Pipeline, PipelineError, RunOutcome, StageTally};
pub use progress::{ProgressBus, ProgressEmitter, ProgressEvent};
pub use tracker::{IssueTracker, export_tree};
pub use tree::{ArtifactTree, TreeError};
