use crate::layout::PositionedNode;
use crate::tree::{TreeModel, Vec2};
use canopy_core::{NodeId, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Renderer-facing node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectedNode {
    pub id: NodeId,
    pub label: String,
    pub is_expanded: bool,
    pub has_more: bool,
    /// Lets the node decide which sides its edge handles attach to.
    pub orientation: Orientation,
    pub position: Vec2,
    pub size: Vec2,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectedEdge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Projection {
    pub orientation: Orientation,
    pub nodes: Vec<ProjectedNode>,
    pub edges: Vec<ProjectedEdge>,
}

impl Projection {
    pub fn node(&self, id: &str) -> Option<&ProjectedNode> {
        self.nodes.iter().find(|node| node.id.as_str() == id)
    }

    pub fn edge_ids(&self) -> Vec<&str> {
        self.edges.iter().map(|edge| edge.id.as_str()).collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TreeProjector;

impl TreeProjector {
    pub fn new() -> Self {
        Self
    }

    pub fn edge_id(parent: &NodeId, child: &NodeId) -> String {
        format!("{parent}-{child}")
    }

    /// Flatten the positioned tree into node and edge lists, in depth-first
    /// pre-order so an unchanged tree always yields the same sequence.
    pub fn project(
        &self,
        model: &TreeModel,
        positions: &HashMap<NodeId, PositionedNode>,
        orientation: Orientation,
    ) -> Projection {
        let order = model.preorder();
        let mut nodes = Vec::with_capacity(order.len());
        let mut edges = Vec::with_capacity(order.len().saturating_sub(1));

        for idx in order {
            let node = &model[idx];
            let (position, size) = match positions.get(&node.id) {
                Some(placed) => (placed.position(), placed.size()),
                None => {
                    tracing::warn!("No layout position for node {}", node.id);
                    (Vec2::default(), Vec2::default())
                }
            };

            if let Some(parent) = node.parent {
                let parent_id = &model[parent].id;
                edges.push(ProjectedEdge {
                    id: Self::edge_id(parent_id, &node.id),
                    source: parent_id.clone(),
                    target: node.id.clone(),
                });
            }

            nodes.push(ProjectedNode {
                id: node.id.clone(),
                label: node.name.clone(),
                is_expanded: node.is_expanded(),
                has_more: node.has_more(),
                orientation,
                position,
                size,
            });
        }

        Projection {
            orientation,
            nodes,
            edges,
        }
    }
}
