use canopy_core::{ChildSpec, NodeId, PathStep, TreeError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Index;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeIndex(pub usize);

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub declared_child_count: Option<u32>,

    // Hierarchy
    pub children: Vec<NodeIndex>,
    pub parent: Option<NodeIndex>,
    pub depth: u32,
}

impl TreeNode {
    pub fn is_expanded(&self) -> bool {
        !self.children.is_empty()
    }

    /// True when the server announced more children than are materialized.
    pub fn has_more(&self) -> bool {
        self.declared_child_count
            .is_some_and(|declared| (declared as usize) > self.children.len())
    }
}

/// Outcome of a single `expand_node` merge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub target_found: bool,
    pub added: Vec<NodeId>,
    pub rejected: Vec<TreeError>,
}

impl MergeReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.rejected.is_empty()
    }
}

/// The partially materialized tree.
///
/// Nodes live in an arena addressed by `NodeIndex`; `node_map` gives O(1)
/// lookup by id. Every non-root node is owned by exactly one parent, and
/// collapsing a node frees its whole descendant subtree.
#[derive(Debug, Clone)]
pub struct TreeModel {
    nodes: Vec<Option<TreeNode>>,
    free: Vec<usize>,
    node_map: HashMap<NodeId, NodeIndex>,
    root: NodeIndex,
    revision: u64,
}

impl TreeModel {
    pub fn new(root: ChildSpec) -> Self {
        let root_node = TreeNode {
            id: root.id.clone(),
            name: root.name,
            declared_child_count: root.declared_child_count,
            children: Vec::new(),
            parent: None,
            depth: 0,
        };
        let mut node_map = HashMap::new();
        node_map.insert(root.id, NodeIndex(0));
        Self {
            nodes: vec![Some(root_node)],
            free: Vec::new(),
            node_map,
            root: NodeIndex(0),
            revision: 0,
        }
    }

    fn alloc(&mut self, node: TreeNode) -> NodeIndex {
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeIndex(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeIndex(self.nodes.len() - 1)
            }
        }
    }

    fn node_mut(&mut self, index: NodeIndex) -> &mut TreeNode {
        match self.nodes.get_mut(index.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => unreachable!("node index {index} is not live"),
        }
    }

    pub fn root_index(&self) -> NodeIndex {
        self.root
    }

    pub fn root(&self) -> &TreeNode {
        &self[self.root]
    }

    pub fn root_id(&self) -> &NodeId {
        &self.root().id
    }

    /// Bumped on every change that affects layout or projection.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn node_count(&self) -> usize {
        self.node_map.len()
    }

    pub fn index_of(&self, id: &str) -> Option<NodeIndex> {
        self.node_map.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&TreeNode> {
        self.index_of(id).map(|idx| &self[idx])
    }

    pub fn node_at(&self, index: NodeIndex) -> Option<&TreeNode> {
        self.nodes.get(index.0).and_then(Option::as_ref)
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.node(id).is_some_and(TreeNode::is_expanded)
    }

    pub fn child_count_materialized(&self, id: &str) -> usize {
        self.node(id).map_or(0, |node| node.children.len())
    }

    pub fn declared_child_count(&self, id: &str) -> Option<u32> {
        self.node(id).and_then(|node| node.declared_child_count)
    }

    pub fn has_more(&self, id: &str) -> bool {
        self.node(id).is_some_and(TreeNode::has_more)
    }

    pub fn depth(&self, id: &str) -> Option<u32> {
        self.node(id).map(|node| node.depth)
    }

    pub fn parent(&self, id: &str) -> Option<&NodeId> {
        self.node(id)
            .and_then(|node| node.parent)
            .map(|parent| &self[parent].id)
    }

    /// Materialized children of `id` in arrival order; empty for unknown ids.
    pub fn children<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a TreeNode> + use<'a> {
        self.node(id)
            .into_iter()
            .flat_map(move |node| node.children.iter().map(move |&child| &self[child]))
    }

    /// Depth-first pre-order over every materialized node, root first.
    pub fn preorder(&self) -> Vec<NodeIndex> {
        let mut order = Vec::with_capacity(self.node_count());
        let mut stack = vec![self.root];
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self[idx].children.iter().rev().copied());
        }
        order
    }

    /// Merge `candidates` into the children of `node_id`.
    ///
    /// Only ids not already present are appended, in candidate order.
    /// Existing children are never removed or reordered. Unknown targets
    /// are a silent no-op.
    pub fn expand_node(
        &mut self,
        node_id: &str,
        candidates: impl IntoIterator<Item = ChildSpec>,
    ) -> MergeReport {
        let Some(target) = self.index_of(node_id) else {
            tracing::debug!("Ignoring expansion of unknown node {}", node_id);
            return MergeReport::default();
        };

        let mut report = MergeReport {
            target_found: true,
            ..MergeReport::default()
        };
        let mut seen: HashSet<NodeId> = HashSet::new();
        let mut changed = false;
        let child_depth = self[target].depth + 1;

        for spec in candidates {
            if spec.id.is_empty() {
                tracing::warn!("Skipping child with empty id under {}", node_id);
                continue;
            }
            if !seen.insert(spec.id.clone()) {
                continue;
            }

            if let Some(existing) = self.index_of(spec.id.as_str()) {
                let owner = self[existing].parent;
                if owner == Some(target) {
                    let child = self.node_mut(existing);
                    if child.declared_child_count.is_none() && spec.declared_child_count.is_some() {
                        child.declared_child_count = spec.declared_child_count;
                        changed = true;
                    }
                    continue;
                }

                let owner = owner.map(|parent| self[parent].id.clone());
                tracing::warn!(
                    "Rejecting child {} under {}: already materialized under {:?}",
                    spec.id,
                    node_id,
                    owner
                );
                report.rejected.push(TreeError::OwnershipConflict {
                    child_id: spec.id,
                    parent_id: self[target].id.clone(),
                    owner,
                });
                continue;
            }

            let child = self.alloc(TreeNode {
                id: spec.id.clone(),
                name: spec.name,
                declared_child_count: spec.declared_child_count,
                children: Vec::new(),
                parent: Some(target),
                depth: child_depth,
            });
            self.node_map.insert(spec.id.clone(), child);
            self.node_mut(target).children.push(child);
            report.added.push(spec.id);
            changed = true;
        }

        if changed {
            self.revision += 1;
        }
        tracing::debug!(
            "Expanded {}: {} added, {} rejected",
            node_id,
            report.added.len(),
            report.rejected.len()
        );
        report
    }

    /// Record the provider's total child count for `node_id`.
    pub fn record_child_total(&mut self, node_id: &str, total: u32) -> bool {
        let Some(idx) = self.index_of(node_id) else {
            return false;
        };
        let node = self.node_mut(idx);
        if node.declared_child_count == Some(total) {
            return true;
        }
        node.declared_child_count = Some(total);
        self.revision += 1;
        true
    }

    /// Drop the materialized subtree below `node_id`, keeping its declared
    /// child count. Returns the number of nodes dropped.
    pub fn collapse_node(&mut self, node_id: &str) -> usize {
        let Some(target) = self.index_of(node_id) else {
            return 0;
        };

        let mut stack = std::mem::take(&mut self.node_mut(target).children);
        let mut dropped = 0;
        while let Some(idx) = stack.pop() {
            if let Some(node) = self.nodes[idx.0].take() {
                self.node_map.remove(&node.id);
                stack.extend(node.children);
                self.free.push(idx.0);
                dropped += 1;
            }
        }

        if dropped > 0 {
            self.revision += 1;
        }
        tracing::debug!("Collapsed {}: {} nodes dropped", node_id, dropped);
        dropped
    }

    /// Materialize a walk down the tree, one edge per step.
    ///
    /// Terminal steps (empty `child_id`) are skipped. Every other step must
    /// start at a node that is already materialized. Nodes added here have
    /// an unknown declared child count, so `has_more` is false for them
    /// until `record_child_total` or a child fetch fills it in.
    pub fn expand_path(&mut self, path: &[PathStep]) -> Result<usize, TreeError> {
        let mut added = 0;
        for (step_no, step) in path.iter().enumerate() {
            if step.is_terminal() {
                continue;
            }
            if !self.contains(step.parent_id.as_str()) {
                tracing::error!(
                    "Path step {} starts at {} which is not materialized",
                    step_no,
                    step.parent_id
                );
                return Err(TreeError::MalformedPath {
                    step: step_no,
                    parent_id: step.parent_id.clone(),
                });
            }

            let report = self.expand_node(
                step.parent_id.as_str(),
                [ChildSpec::new(step.child_id.clone(), step.child_name.clone())],
            );
            if let Some(err) = report.rejected.into_iter().next() {
                return Err(err);
            }
            added += report.added.len();
        }
        Ok(added)
    }
}

impl Index<NodeIndex> for TreeModel {
    type Output = TreeNode;
    fn index(&self, index: NodeIndex) -> &Self::Output {
        match self.node_at(index) {
            Some(node) => node,
            None => panic!("node index {index} is not live"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn specs(ids: &[&str]) -> Vec<ChildSpec> {
        ids.iter()
            .map(|id| ChildSpec::new(*id, id.to_uppercase()))
            .collect()
    }

    fn child_ids(model: &TreeModel, id: &str) -> Vec<String> {
        model.children(id).map(|node| node.id.0.clone()).collect()
    }

    fn model() -> TreeModel {
        TreeModel::new(ChildSpec::new("root", "Root"))
    }

    #[test]
    fn test_expand_twice_does_not_duplicate() {
        let mut model = model();
        model.expand_node("root", specs(&["a", "b"]));
        let second = model.expand_node("root", specs(&["a", "b"]));

        assert!(second.target_found);
        assert!(second.is_noop());
        assert_eq!(child_ids(&model, "root"), vec!["a", "b"]);
        assert_eq!(model.node_count(), 3);
    }

    #[test]
    fn test_expand_merges_as_ordered_union() {
        let mut model = model();
        model.expand_node("root", specs(&["a", "b"]));
        let report = model.expand_node("root", specs(&["b", "c"]));

        assert_eq!(report.added, vec![NodeId::from("c")]);
        assert_eq!(child_ids(&model, "root"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_expand_unknown_node_is_noop() {
        let mut model = model();
        let revision = model.revision();
        let report = model.expand_node("ghost", specs(&["a"]));

        assert!(!report.target_found);
        assert!(report.is_noop());
        assert_eq!(model.node_count(), 1);
        assert_eq!(model.revision(), revision);
    }

    #[test]
    fn test_expand_with_empty_candidates_is_noop() {
        let mut model = model();
        let report = model.expand_node("root", Vec::new());
        assert!(report.target_found);
        assert!(!model.is_expanded("root"));
        assert_eq!(model.revision(), 0);
    }

    #[test]
    fn test_duplicate_ids_within_one_batch_keep_first() {
        let mut model = model();
        model.expand_node(
            "root",
            vec![
                ChildSpec::new("a", "first"),
                ChildSpec::new("b", "B"),
                ChildSpec::new("a", "second"),
            ],
        );
        assert_eq!(child_ids(&model, "root"), vec!["a", "b"]);
        assert_eq!(model.node("a").map(|n| n.name.as_str()), Some("first"));
    }

    #[test]
    fn test_collapse_clears_subtree_but_keeps_node() {
        let mut model = model();
        model.expand_node("root", specs(&["a"]));
        model.expand_node("a", specs(&["x", "y"]));
        model.expand_node("x", specs(&["x1"]));

        let dropped = model.collapse_node("a");

        assert_eq!(dropped, 3);
        assert!(!model.is_expanded("a"));
        assert_eq!(model.child_count_materialized("a"), 0);
        assert!(model.contains("a"));
        assert_eq!(child_ids(&model, "root"), vec!["a"]);
        assert!(!model.contains("x"));
        assert!(!model.contains("x1"));
        assert_eq!(model.node_count(), 2);
    }

    #[test]
    fn test_collapse_preserves_declared_count_and_allows_reexpansion() {
        let mut model = model();
        model.expand_node("root", vec![ChildSpec::new("a", "A").with_declared_child_count(2)]);
        model.expand_node("a", specs(&["x", "y"]));
        model.collapse_node("a");

        assert_eq!(model.declared_child_count("a"), Some(2));
        assert!(model.has_more("a"));

        model.expand_node("a", specs(&["y", "x"]));
        assert_eq!(child_ids(&model, "a"), vec!["y", "x"]);
        assert!(!model.has_more("a"));
        assert_eq!(model.depth("x"), Some(2));
    }

    #[test]
    fn test_collapse_unknown_node_is_noop() {
        let mut model = model();
        assert_eq!(model.collapse_node("ghost"), 0);
        assert_eq!(model.revision(), 0);
    }

    #[test]
    fn test_queries_on_missing_ids_return_empty() {
        let model = model();
        assert!(!model.is_expanded("ghost"));
        assert_eq!(model.child_count_materialized("ghost"), 0);
        assert!(!model.has_more("ghost"));
        assert_eq!(model.parent("ghost"), None);
        assert_eq!(model.children("ghost").count(), 0);
    }

    #[test]
    fn test_child_owned_elsewhere_is_rejected() {
        let mut model = model();
        model.expand_node("root", specs(&["a", "b"]));
        model.expand_node("a", specs(&["shared"]));

        let report = model.expand_node("b", specs(&["shared", "own"]));

        assert_eq!(report.added, vec![NodeId::from("own")]);
        assert_eq!(
            report.rejected,
            vec![TreeError::OwnershipConflict {
                child_id: NodeId::from("shared"),
                parent_id: NodeId::from("b"),
                owner: Some(NodeId::from("a")),
            }]
        );
        assert_eq!(model.parent("shared"), Some(&NodeId::from("a")));
    }

    #[test]
    fn test_root_cannot_become_a_child() {
        let mut model = model();
        model.expand_node("root", specs(&["a"]));
        let report = model.expand_node("a", specs(&["root"]));
        assert_eq!(report.rejected.len(), 1);
        assert!(model.parent("root").is_none());
    }

    #[test]
    fn test_existing_child_learns_declared_count() {
        let mut model = model();
        model.expand_node("root", specs(&["a"]));
        let before = model.revision();
        model.expand_node("root", vec![ChildSpec::new("a", "A").with_declared_child_count(4)]);

        assert_eq!(model.declared_child_count("a"), Some(4));
        assert!(model.has_more("a"));
        assert!(model.revision() > before);
    }

    #[test]
    fn test_expand_path_materializes_walk() {
        let mut model = TreeModel::new(ChildSpec::new("r", "R"));
        let added = model
            .expand_path(&[
                PathStep::new("r", "c1", "C1"),
                PathStep::new("c1", "c2", "C2"),
                PathStep::terminal("c2"),
            ])
            .expect("valid walk");

        assert_eq!(added, 2);
        assert!(model.is_expanded("r"));
        assert!(model.is_expanded("c1"));
        assert!(!model.is_expanded("c2"));
        assert_eq!(model.parent("c2"), Some(&NodeId::from("c1")));
        assert_eq!(model.parent("c1"), Some(&NodeId::from("r")));
    }

    #[test]
    fn test_expand_path_leaves_siblings_alone() {
        let mut model = TreeModel::new(ChildSpec::new("r", "R"));
        model.expand_node("r", specs(&["a", "b"]));
        model.expand_node("b", specs(&["b1"]));

        model
            .expand_path(&[PathStep::new("r", "a", "A"), PathStep::new("a", "a1", "A1")])
            .expect("valid walk");

        assert_eq!(child_ids(&model, "r"), vec!["a", "b"]);
        assert_eq!(child_ids(&model, "b"), vec!["b1"]);
        assert_eq!(child_ids(&model, "a"), vec!["a1"]);
    }

    #[test]
    fn test_expand_path_with_unmaterialized_parent_fails() {
        let mut model = TreeModel::new(ChildSpec::new("r", "R"));
        let err = model
            .expand_path(&[PathStep::new("r", "c1", "C1"), PathStep::new("zz", "c2", "C2")])
            .expect_err("broken walk");

        assert_eq!(
            err,
            TreeError::MalformedPath {
                step: 1,
                parent_id: NodeId::from("zz"),
            }
        );
        assert!(model.contains("c1"));
        assert!(!model.contains("c2"));
    }

    #[test]
    fn test_preorder_is_depth_first_in_arrival_order() {
        let mut model = model();
        model.expand_node("root", specs(&["a", "b"]));
        model.expand_node("a", specs(&["a1", "a2"]));
        model.expand_node("b", specs(&["b1"]));

        let order: Vec<&str> = model
            .preorder()
            .into_iter()
            .map(|idx| model[idx].id.as_str())
            .collect();
        assert_eq!(order, vec!["root", "a", "a1", "a2", "b", "b1"]);
    }

    #[test]
    fn test_freed_slots_are_reused() {
        let mut model = model();
        model.expand_node("root", specs(&["a", "b"]));
        model.collapse_node("root");
        model.expand_node("root", specs(&["c", "d"]));

        assert_eq!(model.node_count(), 3);
        assert!(model.preorder().iter().all(|idx| idx.0 < 3));
    }

    fn numbered(ids: &[u8]) -> Vec<ChildSpec> {
        ids.iter()
            .map(|n| ChildSpec::new(format!("n{n}"), format!("N{n}")))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_expansion_is_idempotent(ids in prop::collection::vec(0u8..30, 0..20)) {
            let mut once = model();
            once.expand_node("root", numbered(&ids));
            let mut twice = model();
            twice.expand_node("root", numbered(&ids));
            twice.expand_node("root", numbered(&ids));

            prop_assert_eq!(child_ids(&once, "root"), child_ids(&twice, "root"));
        }

        #[test]
        fn prop_expansion_is_ordered_union(
            first in prop::collection::vec(0u8..20, 0..15),
            second in prop::collection::vec(0u8..20, 0..15),
        ) {
            let mut model = model();
            model.expand_node("root", numbered(&first));
            model.expand_node("root", numbered(&second));

            let mut expected: Vec<String> = Vec::new();
            for n in first.iter().chain(second.iter()) {
                let id = format!("n{n}");
                if !expected.contains(&id) {
                    expected.push(id);
                }
            }
            prop_assert_eq!(child_ids(&model, "root"), expected);
        }
    }
}
