//! Completeness validation and remediation
//!
//! Declarative minimums per parent/child relationship, checked over the
//! finished (or partially finished) tree. Validation only reads and only
//! produces a fresh report; remediation synthesizes the shortfall directly
//! through the fallback synthesizer, bypassing the generator entirely, and
//! is idempotent by construction: a satisfied parent is never touched.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CompletenessConfig;
use crate::domain::{ArtifactKind, Provenance, StageKind};
use crate::fallback::synthesize;
use crate::tree::ArtifactTree;

/// Minimum child counts per relationship
#[derive(Debug, Clone)]
pub struct CompletenessRules {
    pub min_features_per_epic: usize,
    pub min_stories_per_feature: usize,
    pub min_tasks_per_story: usize,
    pub min_test_cases_per_story: usize,
    /// Overall ratio at which a run is acceptable without full remediation
    pub acceptable_ratio: f64,
}

impl From<&CompletenessConfig> for CompletenessRules {
    fn from(config: &CompletenessConfig) -> Self {
        Self {
            // A childless epic is always a gap; the knob set covers the
            // levels where the proper minimum is domain-dependent.
            min_features_per_epic: 1,
            min_stories_per_feature: config.min_stories_per_feature,
            min_tasks_per_story: config.min_tasks_per_story,
            min_test_cases_per_story: config.min_test_cases_per_story,
            acceptable_ratio: config.acceptable_ratio,
        }
    }
}

impl CompletenessRules {
    fn relationships(&self) -> Vec<(ArtifactKind, ArtifactKind, usize)> {
        vec![
            (ArtifactKind::Epic, ArtifactKind::Feature, self.min_features_per_epic),
            (ArtifactKind::Feature, ArtifactKind::Story, self.min_stories_per_feature),
            (ArtifactKind::Story, ArtifactKind::Task, self.min_tasks_per_story),
            (ArtifactKind::Story, ArtifactKind::TestCase, self.min_test_cases_per_story),
        ]
    }
}

/// Coverage of one rule across the tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleCoverage {
    /// e.g. "every story has >= 2 test_cases"
    pub name: String,
    pub parent_kind: ArtifactKind,
    pub child_kind: ArtifactKind,
    pub minimum: usize,
    /// Parents meeting the minimum
    pub satisfied: usize,
    /// All parents of this kind
    pub total: usize,
    /// Ids of parents below the minimum
    pub unsatisfied: Vec<String>,
}

impl RuleCoverage {
    /// Fraction of satisfying parents; a rule with no parents is trivially satisfied
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.satisfied as f64 / self.total as f64
        }
    }
}

/// Per-run completeness snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessReport {
    pub rules: Vec<RuleCoverage>,
    /// Satisfying parents over all parents, across every rule
    pub overall_ratio: f64,
    /// Whether the overall ratio meets the configured threshold
    pub acceptable: bool,
    /// Nodes added by remediation to reach this state
    #[serde(default)]
    pub remediated: usize,
}

impl CompletenessReport {
    /// True when every rule is fully satisfied
    pub fn is_complete(&self) -> bool {
        self.rules.iter().all(|rule| rule.unsatisfied.is_empty())
    }

    /// All gaps, as (parent id, child kind, shortfall minimum) for display
    pub fn gaps(&self) -> Vec<(String, ArtifactKind, usize)> {
        self.rules
            .iter()
            .flat_map(|rule| {
                rule.unsatisfied
                    .iter()
                    .map(|id| (id.clone(), rule.child_kind, rule.minimum))
            })
            .collect()
    }
}

/// Compute coverage ratios and gaps for the whole tree
///
/// Recomputed from scratch on every call; never mutates the tree.
pub fn validate(tree: &ArtifactTree, rules: &CompletenessRules) -> CompletenessReport {
    let nodes = tree.snapshot();

    let mut coverages = Vec::new();
    let mut satisfied_sum = 0usize;
    let mut total_sum = 0usize;

    for (parent_kind, child_kind, minimum) in rules.relationships() {
        let mut coverage = RuleCoverage {
            name: format!("every {} has >= {} {}", parent_kind, minimum, child_kind),
            parent_kind,
            child_kind,
            minimum,
            satisfied: 0,
            total: 0,
            unsatisfied: Vec::new(),
        };

        for node in nodes.values().filter(|n| n.kind() == parent_kind) {
            coverage.total += 1;
            let child_count = node
                .children
                .iter()
                .filter(|id| nodes.get(*id).map(|c| c.kind() == child_kind).unwrap_or(false))
                .count();
            if child_count >= minimum {
                coverage.satisfied += 1;
            } else {
                coverage.unsatisfied.push(node.id.clone());
            }
        }

        satisfied_sum += coverage.satisfied;
        total_sum += coverage.total;
        debug!(rule = %coverage.name, satisfied = coverage.satisfied, total = coverage.total, "validate: rule checked");
        coverages.push(coverage);
    }

    let overall_ratio = if total_sum == 0 {
        1.0
    } else {
        satisfied_sum as f64 / total_sum as f64
    };

    CompletenessReport {
        rules: coverages,
        overall_ratio,
        acceptable: overall_ratio >= rules.acceptable_ratio,
        remediated: 0,
    }
}

/// Synthesize missing children until every rule is satisfied
///
/// Works directly from the fallback synthesizer (no generator involved);
/// new nodes are tagged [`Provenance::Remediated`]. A remediated parent
/// can itself start below minimum (a synthesized story has no tasks yet),
/// so filling repeats against a fresh report until validation is clean;
/// each pass adds children one level down, bounding the loop by the
/// hierarchy depth. Returns the refreshed report and the number of nodes
/// added. Running on an already complete tree adds nothing.
pub fn remediate(tree: &ArtifactTree, report: &CompletenessReport, rules: &CompletenessRules) -> (CompletenessReport, usize) {
    let mut added = 0usize;
    let mut current = report.clone();

    loop {
        let pass = fill_gaps(tree, &current);
        added += pass;
        current = validate(tree, rules);
        if pass == 0 || current.is_complete() {
            break;
        }
    }

    if added > 0 {
        info!(added, "remediate: synthesized missing artifacts");
    }
    current.remediated = added;
    (current, added)
}

/// One filling pass over a report's gaps; returns the nodes added
fn fill_gaps(tree: &ArtifactTree, report: &CompletenessReport) -> usize {
    let mut added = 0usize;

    for rule in &report.rules {
        let stage = stage_producing(rule.child_kind);
        for parent_id in &rule.unsatisfied {
            let Some(parent) = tree.get(parent_id) else {
                continue;
            };
            let existing = tree
                .children_of(parent_id)
                .iter()
                .filter(|c| c.kind() == rule.child_kind)
                .count();
            let shortfall = rule.minimum.saturating_sub(existing);
            if shortfall == 0 {
                continue;
            }

            let drafts = synthesize(&parent.title, stage, shortfall);
            // Parent came from this tree; attach cannot miss it
            if let Ok(ids) = tree.attach(parent_id, drafts, Provenance::Remediated) {
                added += ids.len();
            }
        }
    }

    added
}

fn stage_producing(kind: ArtifactKind) -> StageKind {
    match kind {
        ArtifactKind::Epic => StageKind::Epic,
        ArtifactKind::Feature => StageKind::Feature,
        ArtifactKind::Story => StageKind::Story,
        ArtifactKind::Task => StageKind::Task,
        ArtifactKind::TestCase => StageKind::TestCase,
    }
}
