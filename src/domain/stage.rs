//! Stage definitions
//!
//! Stages are static configuration: a named step with a declared parent
//! stage and the artifact kind it produces. The pipeline walks
//! [`STAGE_ORDER`] strictly in sequence.

use serde::{Deserialize, Serialize};

use super::artifact::ArtifactKind;

/// One level of the artifact hierarchy processed as a unit of pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Epic,
    Feature,
    Story,
    Task,
    TestCase,
}

/// Dependency-ordered stage list
///
/// Task and TestCase are separate stages sharing the story parent; each
/// runs after all stories have attached.
pub const STAGE_ORDER: [StageKind; 5] = [
    StageKind::Epic,
    StageKind::Feature,
    StageKind::Story,
    StageKind::Task,
    StageKind::TestCase,
];

impl StageKind {
    /// The stage whose artifacts are the parents for this stage's units
    pub fn parent(&self) -> Option<StageKind> {
        match self {
            Self::Epic => None,
            Self::Feature => Some(Self::Epic),
            Self::Story => Some(Self::Feature),
            Self::Task | Self::TestCase => Some(Self::Story),
        }
    }

    /// The artifact kind units at this stage produce
    pub fn child_kind(&self) -> ArtifactKind {
        match self {
            Self::Epic => ArtifactKind::Epic,
            Self::Feature => ArtifactKind::Feature,
            Self::Story => ArtifactKind::Story,
            Self::Task => ArtifactKind::Task,
            Self::TestCase => ArtifactKind::TestCase,
        }
    }

    /// The artifact kind of this stage's parents
    pub fn parent_kind(&self) -> Option<ArtifactKind> {
        self.parent().map(|s| s.child_kind())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "epic",
            Self::Feature => "feature",
            Self::Story => "story",
            Self::Task => "task",
            Self::TestCase => "test_case",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
