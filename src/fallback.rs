//! Fallback content synthesis
//!
//! The guaranteed backstop for failed generation units: deterministic,
//! total, no I/O. Output is generically worded but structurally valid, so
//! a single misbehaving provider call can never abort a run or leave the
//! tree malformed. Callers tag the result with fallback or remediated
//! provenance depending on which path invoked it.

use crate::domain::{ArtifactDraft, ArtifactFields, StageKind, TestCategory};

/// Synthesize `count` structurally valid drafts for one parent at one stage
///
/// Deterministic for a given (parent_title, stage, count). Always returns
/// exactly `count` records (minimum 1). Test cases alternate functional
/// and boundary so every story gets at least one of each when two or more
/// are requested.
pub fn synthesize(parent_title: &str, stage: StageKind, count: usize) -> Vec<ArtifactDraft> {
    let count = count.max(1);
    (1..=count).map(|n| synthesize_one(parent_title, stage, n)).collect()
}

fn synthesize_one(parent_title: &str, stage: StageKind, n: usize) -> ArtifactDraft {
    match stage {
        StageKind::Epic => ArtifactDraft::new(
            format!("Deliver: {}", truncate(parent_title, 60)),
            ArtifactFields::Epic {
                objective: format!("Realize the product vision: {}", truncate(parent_title, 200)),
            },
        ),
        StageKind::Feature => ArtifactDraft::new(
            format!("Core capability {} for {}", n, truncate(parent_title, 40)),
            ArtifactFields::Feature {
                description: format!(
                    "Placeholder feature {} supporting \"{}\". Refine with domain detail.",
                    n,
                    truncate(parent_title, 80)
                ),
            },
        ),
        StageKind::Story => ArtifactDraft::new(
            format!("User can use {} (scenario {})", truncate(parent_title, 40), n),
            ArtifactFields::Story {
                description: format!(
                    "As a user, I can exercise \"{}\" end to end (scenario {}).",
                    truncate(parent_title, 80),
                    n
                ),
                acceptance_criteria: vec![
                    "The primary flow completes without error".to_string(),
                    "The result is visible to the user".to_string(),
                ],
            },
        ),
        StageKind::Task => ArtifactDraft::new(
            format!("Implement step {} of {}", n, truncate(parent_title, 40)),
            ArtifactFields::Task {
                description: format!(
                    "Implementation step {} for \"{}\". Break down further during planning.",
                    n,
                    truncate(parent_title, 80)
                ),
            },
        ),
        StageKind::TestCase => {
            // Odd positions are functional, even are boundary
            let category = if n % 2 == 1 {
                TestCategory::Functional
            } else {
                TestCategory::Boundary
            };
            let label = match category {
                TestCategory::Functional => "happy path",
                TestCategory::Boundary => "boundary conditions",
            };
            ArtifactDraft::new(
                format!("Verify {} of {}", label, truncate(parent_title, 40)),
                ArtifactFields::TestCase {
                    description: format!("Exercise the {} for \"{}\".", label, truncate(parent_title, 80)),
                    category,
                },
            )
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic() {
        let a = synthesize("Checkout flow", StageKind::Task, 3);
        let b = synthesize("Checkout flow", StageKind::Task, 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_always_returns_requested_count() {
        for stage in crate::domain::STAGE_ORDER {
            for count in [1, 2, 5] {
                let records = synthesize("Anything", stage, count);
                assert_eq!(records.len(), count);
                for record in &records {
                    assert!(!record.title.is_empty());
                    assert_eq!(record.kind(), stage.child_kind());
                }
            }
        }
    }

    #[test]
    fn test_zero_count_still_yields_one() {
        assert_eq!(synthesize("X", StageKind::Story, 0).len(), 1);
    }

    #[test]
    fn test_test_cases_cover_functional_and_boundary() {
        let records = synthesize("Login story", StageKind::TestCase, 2);
        let categories: Vec<_> = records
            .iter()
            .map(|r| match &r.fields {
                ArtifactFields::TestCase { category, .. } => *category,
                other => panic!("expected test case, got {:?}", other),
            })
            .collect();
        assert!(categories.contains(&TestCategory::Functional));
        assert!(categories.contains(&TestCategory::Boundary));
    }

    #[test]
    fn test_titles_distinct_within_batch() {
        let records = synthesize("Search", StageKind::Feature, 4);
        let mut titles: Vec<_> = records.iter().map(|r| r.title.clone()).collect();
        titles.dedup();
        assert_eq!(titles.len(), 4);
    }

    #[test]
    fn test_long_parent_title_truncated() {
        let long = "x".repeat(500);
        let records = synthesize(&long, StageKind::Feature, 1);
        assert!(records[0].title.len() < 120);
    }
}
