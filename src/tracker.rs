//! Issue tracker export
//!
//! Walks a finished tree top-down and mirrors it into an external tracker
//! through the [`IssueTracker`] trait. Parents are always created before
//! their children so the tracker-side hierarchy can be built in one pass.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use eyre::Result;
use tracing::{debug, info};

use crate::domain::ArtifactKind;
use crate::tree::ArtifactTree;

/// External tracker integration point
///
/// Implementations wrap one tracker's API. `create_item` returns the
/// tracker-assigned id so child items can reference their parent.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn create_item(
        &self,
        kind: ArtifactKind,
        title: &str,
        description: &str,
        parent_external_id: Option<&str>,
    ) -> Result<String>;
}

/// Export the whole tree, returning the internal-to-external id mapping
///
/// Breadth-first from the root, preserving each parent's child order. An
/// empty tree exports nothing. Tracker errors abort the export; items
/// already created stay in the tracker, and the caller may retry from the
/// returned error with the same tree (the tracker's idempotency is its
/// own concern).
pub async fn export_tree(tracker: &dyn IssueTracker, tree: &ArtifactTree) -> Result<HashMap<String, String>> {
    let mut external_ids = HashMap::new();

    let Some(root_id) = tree.root_id() else {
        debug!("export_tree: empty tree, nothing to export");
        return Ok(external_ids);
    };

    let mut queue = VecDeque::from([root_id]);
    while let Some(id) = queue.pop_front() {
        let Some(node) = tree.get(&id) else {
            continue;
        };

        let parent_external = node
            .parent
            .as_ref()
            .and_then(|pid| external_ids.get(pid))
            .map(String::as_str);

        let external = tracker
            .create_item(node.kind(), &node.title, node.fields.description(), parent_external)
            .await?;
        debug!(internal = %node.id, external = %external, "export_tree: item created");
        external_ids.insert(node.id, external);

        queue.extend(node.children);
    }

    info!(exported = external_ids.len(), "export_tree: done");
    Ok(external_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactDraft, ArtifactFields, Provenance};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTracker {
        calls: Mutex<Vec<(ArtifactKind, String, Option<String>)>>,
    }

    #[async_trait]
    impl IssueTracker for RecordingTracker {
        async fn create_item(
            &self,
            kind: ArtifactKind,
            title: &str,
            _description: &str,
            parent_external_id: Option<&str>,
        ) -> Result<String> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((kind, title.to_string(), parent_external_id.map(String::from)));
            Ok(format!("EXT-{}", calls.len()))
        }
    }

    struct FlakyTracker;

    #[async_trait]
    impl IssueTracker for FlakyTracker {
        async fn create_item(
            &self,
            kind: ArtifactKind,
            _title: &str,
            _description: &str,
            _parent_external_id: Option<&str>,
        ) -> Result<String> {
            if kind == ArtifactKind::Story {
                eyre::bail!("tracker rejected the item");
            }
            Ok("EXT".to_string())
        }
    }

    fn sample_tree() -> ArtifactTree {
        let tree = ArtifactTree::new();
        let epic = tree
            .set_root(
                ArtifactDraft::new("Store", ArtifactFields::Epic { objective: "Sell".into() }),
                Provenance::Generated,
            )
            .unwrap();
        let features = tree
            .attach(
                &epic,
                vec![
                    ArtifactDraft::new("Catalog", ArtifactFields::Feature { description: String::new() }),
                    ArtifactDraft::new("Checkout", ArtifactFields::Feature { description: String::new() }),
                ],
                Provenance::Generated,
            )
            .unwrap();
        tree.attach(
            &features[0],
            vec![ArtifactDraft::new(
                "Browse plants",
                ArtifactFields::Story {
                    description: String::new(),
                    acceptance_criteria: vec![],
                },
            )],
            Provenance::Generated,
        )
        .unwrap();
        tree
    }

    #[tokio::test]
    async fn test_export_parents_before_children() {
        let tracker = RecordingTracker::default();
        let tree = sample_tree();

        let mapping = export_tree(&tracker, &tree).await.unwrap();
        assert_eq!(mapping.len(), 4);

        let calls = tracker.calls.lock().unwrap();
        assert_eq!(calls[0].0, ArtifactKind::Epic);
        assert_eq!(calls[0].2, None);

        // Features follow the epic, in attachment order
        assert_eq!(calls[1].1, "Catalog");
        assert_eq!(calls[2].1, "Checkout");
        assert_eq!(calls[1].2.as_deref(), Some("EXT-1"));

        // The story references its feature's external id
        assert_eq!(calls[3].0, ArtifactKind::Story);
        assert_eq!(calls[3].2.as_deref(), Some("EXT-2"));
    }

    #[tokio::test]
    async fn test_export_empty_tree() {
        let tracker = RecordingTracker::default();
        let tree = ArtifactTree::new();

        let mapping = export_tree(&tracker, &tree).await.unwrap();
        assert!(mapping.is_empty());
        assert!(tracker.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_aborts_on_tracker_error() {
        let tree = sample_tree();
        assert!(export_tree(&FlakyTracker, &tree).await.is_err());
    }
}
