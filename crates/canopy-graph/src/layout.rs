use crate::tree::{NodeIndex, TreeModel, Vec2};
use canopy_core::{BoxSize, NodeId, Orientation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Absolute placement of one materialized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionedNode {
    pub id: NodeId,
    pub x: f32,
    pub y: f32,
    pub box_width: f32,
    pub box_height: f32,
}

impl PositionedNode {
    pub fn position(&self) -> Vec2 {
        Vec2::new(self.x, self.y)
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.box_width, self.box_height)
    }
}

pub trait Layouter {
    fn execute(&self, model: &TreeModel) -> HashMap<NodeId, PositionedNode>;
}

/// Scratch state for one node during the tidy tree walks.
#[derive(Debug, Clone)]
struct WalkNode {
    parent: Option<usize>,
    children: Vec<usize>,
    /// Position among its siblings.
    number: usize,
    prelim: f32,
    modifier: f32,
    change: f32,
    shift: f32,
    thread: Option<usize>,
    ancestor: usize,
    default_ancestor: Option<usize>,
}

/// Buchheim's linear-time variant of the Walker tidy tree.
///
/// Nodes are addressed by their pre-order position, so the root is 0.
struct Walk {
    nodes: Vec<WalkNode>,
}

impl Walk {
    fn new(model: &TreeModel, order: &[NodeIndex]) -> Self {
        let local: HashMap<NodeIndex, usize> =
            order.iter().enumerate().map(|(pos, &idx)| (idx, pos)).collect();
        let mut nodes: Vec<WalkNode> = order
            .iter()
            .enumerate()
            .map(|(pos, &idx)| {
                let node = &model[idx];
                WalkNode {
                    parent: node.parent.and_then(|parent| local.get(&parent).copied()),
                    children: node
                        .children
                        .iter()
                        .filter_map(|child| local.get(child).copied())
                        .collect(),
                    number: 0,
                    prelim: 0.0,
                    modifier: 0.0,
                    change: 0.0,
                    shift: 0.0,
                    thread: None,
                    ancestor: pos,
                    default_ancestor: None,
                }
            })
            .collect();
        for v in 0..nodes.len() {
            for i in 0..nodes[v].children.len() {
                let child = nodes[v].children[i];
                nodes[child].number = i;
            }
        }
        Self { nodes }
    }

    fn next_left(&self, v: usize) -> Option<usize> {
        self.nodes[v].children.first().copied().or(self.nodes[v].thread)
    }

    fn next_right(&self, v: usize) -> Option<usize> {
        self.nodes[v].children.last().copied().or(self.nodes[v].thread)
    }

    fn left_sibling(&self, v: usize) -> Option<usize> {
        let number = self.nodes[v].number.checked_sub(1)?;
        let parent = self.nodes[v].parent?;
        self.nodes[parent].children.get(number).copied()
    }

    fn separation(&self, a: usize, b: usize) -> f32 {
        if self.nodes[a].parent == self.nodes[b].parent {
            TidyTreeLayouter::SIBLING_SEPARATION
        } else {
            TidyTreeLayouter::SUBTREE_SEPARATION
        }
    }

    /// Children before parents, siblings left to right.
    fn postorder(&self) -> Vec<usize> {
        let mut out = Vec::with_capacity(self.nodes.len());
        if self.nodes.is_empty() {
            return out;
        }
        let mut stack = vec![(0, false)];
        while let Some((v, done)) = stack.pop() {
            if done {
                out.push(v);
                continue;
            }
            stack.push((v, true));
            stack.extend(self.nodes[v].children.iter().rev().map(|&c| (c, false)));
        }
        out
    }

    fn first_walk(&mut self, v: usize) {
        let left = self.left_sibling(v);
        let first = self.nodes[v].children.first().copied();
        let last = self.nodes[v].children.last().copied();

        if let (Some(first), Some(last)) = (first, last) {
            self.execute_shifts(v);
            let midpoint = (self.nodes[first].prelim + self.nodes[last].prelim) / 2.0;
            match left {
                Some(w) => {
                    self.nodes[v].prelim = self.nodes[w].prelim + self.separation(v, w);
                    self.nodes[v].modifier = self.nodes[v].prelim - midpoint;
                }
                None => self.nodes[v].prelim = midpoint,
            }
        } else if let Some(w) = left {
            self.nodes[v].prelim = self.nodes[w].prelim + self.separation(v, w);
        }

        if let Some(parent) = self.nodes[v].parent {
            let default = self.nodes[parent]
                .default_ancestor
                .or_else(|| self.nodes[parent].children.first().copied())
                .unwrap_or(v);
            let ancestor = self.apportion(v, left, default);
            self.nodes[parent].default_ancestor = Some(ancestor);
        }
    }

    /// Push `v` right until its left contour clears every subtree to its
    /// left, recording the move so the siblings in between can be spread.
    fn apportion(&mut self, v: usize, left: Option<usize>, mut ancestor: usize) -> usize {
        let Some(w) = left else {
            return ancestor;
        };
        let (mut vip, mut vop, mut vim) = (v, v, w);
        let mut vom = self.nodes[v]
            .parent
            .and_then(|parent| self.nodes[parent].children.first().copied())
            .unwrap_or(v);
        let mut sip = self.nodes[vip].modifier;
        let mut sop = self.nodes[vop].modifier;
        let mut sim = self.nodes[vim].modifier;
        let mut som = self.nodes[vom].modifier;

        let (next_im, next_ip) = loop {
            let (Some(im), Some(ip)) = (self.next_right(vim), self.next_left(vip)) else {
                break (self.next_right(vim), self.next_left(vip));
            };
            vim = im;
            vip = ip;
            vom = self.next_left(vom).unwrap_or(vom);
            vop = self.next_right(vop).unwrap_or(vop);
            self.nodes[vop].ancestor = v;

            let shift = self.nodes[vim].prelim + sim - self.nodes[vip].prelim - sip
                + self.separation(vim, vip);
            if shift > 0.0 {
                let wm = self.next_ancestor(vim, v, ancestor);
                self.move_subtree(wm, v, shift);
                sip += shift;
                sop += shift;
            }
            sim += self.nodes[vim].modifier;
            sip += self.nodes[vip].modifier;
            som += self.nodes[vom].modifier;
            sop += self.nodes[vop].modifier;
        };

        if next_im.is_some() && self.next_right(vop).is_none() {
            self.nodes[vop].thread = next_im;
            self.nodes[vop].modifier += sim - sop;
        }
        if next_ip.is_some() && self.next_left(vom).is_none() {
            self.nodes[vom].thread = next_ip;
            self.nodes[vom].modifier += sip - som;
            ancestor = v;
        }
        ancestor
    }

    fn next_ancestor(&self, vim: usize, v: usize, ancestor: usize) -> usize {
        let candidate = self.nodes[vim].ancestor;
        if self.nodes[candidate].parent == self.nodes[v].parent {
            candidate
        } else {
            ancestor
        }
    }

    fn move_subtree(&mut self, wm: usize, wp: usize, shift: f32) {
        let subtrees = self.nodes[wp].number.saturating_sub(self.nodes[wm].number).max(1);
        let change = shift / subtrees as f32;
        self.nodes[wp].change -= change;
        self.nodes[wp].shift += shift;
        self.nodes[wm].change += change;
        self.nodes[wp].prelim += shift;
        self.nodes[wp].modifier += shift;
    }

    /// Spread accumulated moves over the children of `v`.
    fn execute_shifts(&mut self, v: usize) {
        let (mut shift, mut change) = (0.0, 0.0);
        for i in (0..self.nodes[v].children.len()).rev() {
            let w = self.nodes[v].children[i];
            self.nodes[w].prelim += shift;
            self.nodes[w].modifier += shift;
            change += self.nodes[w].change;
            shift += self.nodes[w].shift + change;
        }
    }

    /// Absolute cross offsets in sibling units, root at 0.
    fn run(mut self) -> Vec<f32> {
        for v in self.postorder() {
            self.first_walk(v);
        }

        let mut offsets = vec![0.0; self.nodes.len()];
        let Some(root) = self.nodes.first() else {
            return offsets;
        };
        let root_shift = -root.prelim;
        // Pre-order positions put every parent before its children.
        for v in 0..self.nodes.len() {
            let parent_modifier = match self.nodes[v].parent {
                Some(parent) => self.nodes[parent].modifier,
                None => root_shift,
            };
            offsets[v] = self.nodes[v].prelim + parent_modifier;
            self.nodes[v].modifier += parent_modifier;
        }
        offsets
    }
}

/// Reingold-Tilford style tidy tree.
///
/// Subtrees are packed left to right by comparing contours level by level,
/// smaller subtrees caught between larger ones are spread evenly, and every
/// parent is centered over its first and last child. Offsets are
/// computed in sibling units and scaled by `cross_size + spacing`; depth is
/// scaled by `main_size + 3 * spacing`. The root sits at `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TidyTreeLayouter {
    pub orientation: Orientation,
    pub node_size: BoxSize,
    pub spacing: f32,
}

impl TidyTreeLayouter {
    /// Gap between adjacent siblings, in sibling units.
    pub const SIBLING_SEPARATION: f32 = 1.0;
    /// Gap between adjacent nodes with different parents.
    pub const SUBTREE_SEPARATION: f32 = 2.0;
    /// Depth gap multiplier applied to `spacing`.
    pub const DEPTH_SPACING_FACTOR: f32 = 3.0;

    pub fn new(orientation: Orientation, node_size: BoxSize, spacing: f32) -> Self {
        Self {
            orientation,
            node_size,
            spacing,
        }
    }

    pub fn with_orientation(self, orientation: Orientation) -> Self {
        Self {
            orientation,
            ..self
        }
    }

    /// Distance between sibling centers.
    pub fn cross_step(&self) -> f32 {
        self.node_size.cross(self.orientation) + self.spacing
    }

    /// Distance between consecutive depth levels.
    pub fn main_step(&self) -> f32 {
        self.node_size.main(self.orientation) + Self::DEPTH_SPACING_FACTOR * self.spacing
    }
}

impl Layouter for TidyTreeLayouter {
    fn execute(&self, model: &TreeModel) -> HashMap<NodeId, PositionedNode> {
        let order = model.preorder();
        let offsets = Walk::new(model, &order).run();
        let cross_step = self.cross_step();
        let main_step = self.main_step();

        let positions: HashMap<NodeId, PositionedNode> = order
            .iter()
            .zip(&offsets)
            .map(|(idx, offset)| {
                let node = &model[*idx];
                let cross = offset * cross_step;
                let main = node.depth as f32 * main_step;
                let (x, y) = match self.orientation {
                    Orientation::Vertical => (cross, main),
                    Orientation::Horizontal => (main, cross),
                };
                (
                    node.id.clone(),
                    PositionedNode {
                        id: node.id.clone(),
                        x,
                        y,
                        box_width: self.node_size.width,
                        box_height: self.node_size.height,
                    },
                )
            })
            .collect();

        tracing::debug!(
            "Tidy tree layout placed {} nodes ({})",
            positions.len(),
            self.orientation
        );
        positions
    }
}

/// Pure layout entry point: same tree and parameters, same coordinates.
pub fn compute_layout(
    model: &TreeModel,
    orientation: Orientation,
    node_size: BoxSize,
    spacing: f32,
) -> HashMap<NodeId, PositionedNode> {
    TidyTreeLayouter::new(orientation, node_size, spacing).execute(model)
}
