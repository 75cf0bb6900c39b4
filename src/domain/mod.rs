//! Domain types for StoryForge
//!
//! Artifact records, the workflow run, the static stage list, and id
//! generation. These are plain values; all mutation happens through the
//! pipeline and the artifact tree.

mod artifact;
mod id;
mod run;
mod stage;

pub use artifact::{ArtifactDraft, ArtifactFields, ArtifactKind, ArtifactNode, Provenance, TestCategory};
pub use id::generate_id;
pub use run::{RunStatus, WorkflowRun};
pub use stage::{STAGE_ORDER, StageKind};
