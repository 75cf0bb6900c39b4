//! Artifact tree assembly
//!
//! The tree is the only structure mutated by concurrent workers. Each unit
//! attaches under its own parent, so contention is limited to the shared
//! node map lock around id allocation and the parent's child-list append.
//! Nodes are append-only: children may be added, nothing is ever removed
//! during a run.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::debug;

use crate::domain::{ArtifactDraft, ArtifactKind, ArtifactNode, Provenance, generate_id};

/// Errors from tree mutation
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Parent '{0}' not found in tree")]
    UnknownParent(String),

    #[error("Tree already has a root")]
    RootExists,
}

#[derive(Debug, Default)]
struct TreeInner {
    nodes: HashMap<String, ArtifactNode>,
    root: Option<String>,
}

/// Thread-safe artifact tree shared across a stage's workers
#[derive(Debug, Default)]
pub struct ArtifactTree {
    inner: Mutex<TreeInner>,
}

impl ArtifactTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the root artifact; fails if one exists
    pub fn set_root(&self, draft: ArtifactDraft, provenance: Provenance) -> Result<String, TreeError> {
        let mut inner = self.lock();
        if inner.root.is_some() {
            return Err(TreeError::RootExists);
        }

        let id = generate_id(draft.kind().as_str(), &draft.title);
        debug!(%id, "set_root: inserting root artifact");
        inner.nodes.insert(
            id.clone(),
            ArtifactNode {
                id: id.clone(),
                title: draft.title,
                fields: draft.fields,
                parent: None,
                children: Vec::new(),
                provenance,
            },
        );
        inner.root = Some(id.clone());
        Ok(id)
    }

    /// Attach records under an existing parent, preserving record order
    ///
    /// Validates the parent before allocating ids; assigns each draft a
    /// fresh stable id and appends to the parent's child list.
    pub fn attach(
        &self,
        parent_id: &str,
        drafts: Vec<ArtifactDraft>,
        provenance: Provenance,
    ) -> Result<Vec<String>, TreeError> {
        let mut inner = self.lock();
        if !inner.nodes.contains_key(parent_id) {
            return Err(TreeError::UnknownParent(parent_id.to_string()));
        }

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let id = Self::fresh_id(&inner, &draft);
            inner.nodes.insert(
                id.clone(),
                ArtifactNode {
                    id: id.clone(),
                    title: draft.title,
                    fields: draft.fields,
                    parent: Some(parent_id.to_string()),
                    children: Vec::new(),
                    provenance,
                },
            );
            ids.push(id);
        }

        let parent = inner
            .nodes
            .get_mut(parent_id)
            .expect("parent checked above");
        parent.children.extend(ids.iter().cloned());

        debug!(%parent_id, count = ids.len(), "attach: records attached");
        Ok(ids)
    }

    /// Allocate an id not yet present in the node map
    ///
    /// Id generation is random-suffixed, so a collision is already rare;
    /// re-rolling under the lock makes duplicate-titled records safe
    /// unconditionally — an insert must never overwrite an earlier node.
    fn fresh_id(inner: &TreeInner, draft: &ArtifactDraft) -> String {
        loop {
            let id = generate_id(draft.kind().as_str(), &draft.title);
            if !inner.nodes.contains_key(&id) {
                return id;
            }
        }
    }

    /// The root artifact id, if set
    pub fn root_id(&self) -> Option<String> {
        self.lock().root.clone()
    }

    /// Clone of one node
    pub fn get(&self, id: &str) -> Option<ArtifactNode> {
        self.lock().nodes.get(id).cloned()
    }

    /// Clones of a node's children, in insertion order
    pub fn children_of(&self, id: &str) -> Vec<ArtifactNode> {
        let inner = self.lock();
        inner
            .nodes
            .get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child_id| inner.nodes.get(child_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All node ids of one kind
    pub fn ids_of_kind(&self, kind: ArtifactKind) -> Vec<String> {
        self.lock()
            .nodes
            .values()
            .filter(|node| node.kind() == kind)
            .map(|node| node.id.clone())
            .collect()
    }

    /// Count of nodes of one kind
    pub fn count_by_kind(&self, kind: ArtifactKind) -> usize {
        self.lock().nodes.values().filter(|node| node.kind() == kind).count()
    }

    /// Total node count
    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().nodes.is_empty()
    }

    /// Clone of the whole node map for validation and export
    pub fn snapshot(&self) -> HashMap<String, ArtifactNode> {
        self.lock().nodes.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeInner> {
        // Attach never panics while holding the lock, so poisoning only
        // follows a bug; propagating the inner state is still safe.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ArtifactFields;
    use std::sync::Arc;

    fn epic_draft() -> ArtifactDraft {
        ArtifactDraft::new(
            "Online store",
            ArtifactFields::Epic {
                objective: "Sell plants".to_string(),
            },
        )
    }

    fn feature_draft(title: &str) -> ArtifactDraft {
        ArtifactDraft::new(
            title,
            ArtifactFields::Feature {
                description: String::new(),
            },
        )
    }

    #[test]
    fn test_set_root_once() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();

        assert_eq!(tree.root_id(), Some(root_id.clone()));
        assert!(matches!(
            tree.set_root(epic_draft(), Provenance::Generated),
            Err(TreeError::RootExists)
        ));
        assert_eq!(tree.get(&root_id).unwrap().parent, None);
    }

    #[test]
    fn test_attach_preserves_order() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();

        let ids = tree
            .attach(
                &root_id,
                vec![feature_draft("First"), feature_draft("Second"), feature_draft("Third")],
                Provenance::Generated,
            )
            .unwrap();

        let children = tree.children_of(&root_id);
        assert_eq!(children.len(), 3);
        assert_eq!(children[0].title, "First");
        assert_eq!(children[2].title, "Third");
        assert_eq!(children.iter().map(|c| c.id.clone()).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn test_attach_unknown_parent() {
        let tree = ArtifactTree::new();
        tree.set_root(epic_draft(), Provenance::Generated).unwrap();

        let result = tree.attach("no-such-id", vec![feature_draft("X")], Provenance::Generated);
        assert!(matches!(result, Err(TreeError::UnknownParent(_))));
        // Failed attach must not leak nodes
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_parent_child_invariant() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();
        tree.attach(&root_id, vec![feature_draft("A"), feature_draft("B")], Provenance::Fallback)
            .unwrap();

        let nodes = tree.snapshot();
        for node in nodes.values() {
            match &node.parent {
                None => assert_eq!(node.id, root_id),
                Some(parent_id) => {
                    let parent = nodes.get(parent_id).expect("parent must exist");
                    let occurrences = parent.children.iter().filter(|c| **c == node.id).count();
                    assert_eq!(occurrences, 1, "child appears exactly once in parent list");
                }
            }
        }
    }

    #[test]
    fn test_same_title_children_under_distinct_parents() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();
        let features = tree
            .attach(&root_id, vec![feature_draft("Catalog"), feature_draft("Search")], Provenance::Generated)
            .unwrap();

        // Generators repeat titles across parents; both nodes must survive
        let story = || {
            ArtifactDraft::new(
                "Browse plants",
                ArtifactFields::Story {
                    description: String::new(),
                    acceptance_criteria: vec![],
                },
            )
        };
        let a = tree.attach(&features[0], vec![story()], Provenance::Generated).unwrap();
        let b = tree.attach(&features[1], vec![story()], Provenance::Generated).unwrap();

        assert_ne!(a[0], b[0]);
        assert_eq!(tree.count_by_kind(ArtifactKind::Story), 2);
        assert_eq!(tree.get(&a[0]).unwrap().parent.as_deref(), Some(features[0].as_str()));
        assert_eq!(tree.get(&b[0]).unwrap().parent.as_deref(), Some(features[1].as_str()));
    }

    #[test]
    fn test_duplicate_titles_in_one_batch() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();

        let ids = tree
            .attach(&root_id, vec![feature_draft("Search"), feature_draft("Search")], Provenance::Generated)
            .unwrap();

        assert_ne!(ids[0], ids[1]);
        assert_eq!(tree.children_of(&root_id).len(), 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_provenance_recorded() {
        let tree = ArtifactTree::new();
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();
        let ids = tree
            .attach(&root_id, vec![feature_draft("F")], Provenance::Remediated)
            .unwrap();

        assert_eq!(tree.get(&ids[0]).unwrap().provenance, Provenance::Remediated);
    }

    #[tokio::test]
    async fn test_concurrent_attachment_to_distinct_parents() {
        let tree = Arc::new(ArtifactTree::new());
        let root_id = tree.set_root(epic_draft(), Provenance::Generated).unwrap();

        let feature_ids = tree
            .attach(
                &root_id,
                (0..8).map(|i| feature_draft(&format!("Feature {}", i))).collect(),
                Provenance::Generated,
            )
            .unwrap();

        let mut handles = Vec::new();
        for feature_id in feature_ids.clone() {
            let tree = Arc::clone(&tree);
            handles.push(tokio::spawn(async move {
                let drafts = (0..3)
                    .map(|i| {
                        ArtifactDraft::new(
                            format!("Story {}", i),
                            ArtifactFields::Story {
                                description: String::new(),
                                acceptance_criteria: vec![],
                            },
                        )
                    })
                    .collect();
                tree.attach(&feature_id, drafts, Provenance::Generated).unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(tree.count_by_kind(ArtifactKind::Story), 24);
        for feature_id in &feature_ids {
            assert_eq!(tree.children_of(feature_id).len(), 3);
        }
    }
}
