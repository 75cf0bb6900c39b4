//! Artifact records and tree nodes
//!
//! Generator output is dynamic, shape-varying JSON; it is parsed at the
//! boundary into this closed set of tagged variants, with missing fields
//! resolved to explicit defaults.

use serde::{Deserialize, Serialize};

/// The artifact hierarchy levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Epic,
    Feature,
    Story,
    Task,
    TestCase,
}

impl ArtifactKind {
    /// Short name used in ids and progress messages
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

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Where an artifact came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Extracted from generator output
    #[default]
    Generated,
    /// Synthesized after generation or extraction failed
    Fallback,
    /// Added post-hoc to satisfy completeness rules
    Remediated,
}

/// Test case category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TestCategory {
    #[default]
    Functional,
    Boundary,
}

/// Kind-specific artifact fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactFields {
    Epic {
        objective: String,
    },
    Feature {
        description: String,
    },
    Story {
        description: String,
        acceptance_criteria: Vec<String>,
    },
    Task {
        description: String,
    },
    TestCase {
        description: String,
        category: TestCategory,
    },
}

impl ArtifactFields {
    /// The kind these fields belong to
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Self::Epic { .. } => ArtifactKind::Epic,
            Self::Feature { .. } => ArtifactKind::Feature,
            Self::Story { .. } => ArtifactKind::Story,
            Self::Task { .. } => ArtifactKind::Task,
            Self::TestCase { .. } => ArtifactKind::TestCase,
        }
    }

    /// The free-text body, regardless of variant
    pub fn description(&self) -> &str {
        match self {
            Self::Epic { objective } => objective,
            Self::Feature { description }
            | Self::Story { description, .. }
            | Self::Task { description }
            | Self::TestCase { description, .. } => description,
        }
    }
}

/// A record extracted or synthesized but not yet attached to the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactDraft {
    pub title: String,
    pub fields: ArtifactFields,
}

impl ArtifactDraft {
    pub fn new(title: impl Into<String>, fields: ArtifactFields) -> Self {
        Self {
            title: title.into(),
            fields,
        }
    }

    pub fn kind(&self) -> ArtifactKind {
        self.fields.kind()
    }
}

/// A node in the artifact tree
///
/// Never mutated after insertion except to append children; never deleted
/// during a run. Child order is insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactNode {
    /// Stable id (e.g., "f3a9c1-story-checkout-flow")
    pub id: String,

    /// Human-readable title
    pub title: String,

    /// Kind-specific fields
    pub fields: ArtifactFields,

    /// Parent id; None only for the root epic
    pub parent: Option<String>,

    /// Ordered child ids
    pub children: Vec<String>,

    /// How this node was produced
    pub provenance: Provenance,
}

impl ArtifactNode {
    pub fn kind(&self) -> ArtifactKind {
        self.fields.kind()
    }
}
