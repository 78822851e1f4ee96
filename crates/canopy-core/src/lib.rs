use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

pub mod error;

pub use error::{ProviderError, TreeError};

/// Opaque node identifier, unique across the whole remote tree.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Lets id-keyed maps be queried with a plain `&str`.
impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A child as announced by the provider, before it is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSpec {
    pub id: NodeId,
    pub name: String,
    /// Total children on the server; `None` until the node is probed.
    pub declared_child_count: Option<u32>,
}

impl ChildSpec {
    pub fn new(id: impl Into<NodeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            declared_child_count: None,
        }
    }

    pub fn with_declared_child_count(mut self, count: u32) -> Self {
        self.declared_child_count = Some(count);
        self
    }
}

/// One edge of a server-resolved walk down the tree.
///
/// An empty `child_id` marks the terminal step ("no further descent").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathStep {
    pub parent_id: NodeId,
    pub child_id: NodeId,
    pub child_name: String,
}

impl PathStep {
    pub fn new(
        parent_id: impl Into<NodeId>,
        child_id: impl Into<NodeId>,
        child_name: impl Into<String>,
    ) -> Self {
        Self {
            parent_id: parent_id.into(),
            child_id: child_id.into(),
            child_name: child_name.into(),
        }
    }

    pub fn terminal(parent_id: impl Into<NodeId>) -> Self {
        Self::new(parent_id, NodeId::default(), String::new())
    }

    pub fn is_terminal(&self) -> bool {
        self.child_id.is_empty()
    }
}

/// A page of children returned by `fetchChildren`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ChildPage {
    pub children: Vec<ChildSpec>,
    pub total_child_count: u32,
}

/// The walk returned by `fetchPath`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodePath {
    pub steps: Vec<PathStep>,
}

impl NodePath {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Root at the top, depth grows downward.
    Vertical,
    /// Root at the left, depth grows rightward.
    #[default]
    Horizontal,
}

impl Orientation {
    pub fn toggled(self) -> Self {
        match self {
            Orientation::Vertical => Orientation::Horizontal,
            Orientation::Horizontal => Orientation::Vertical,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Vertical => "vertical",
            Orientation::Horizontal => "horizontal",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size of a rendered node box in layout units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxSize {
    pub width: f32,
    pub height: f32,
}

impl BoxSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Extent along the axis that separates siblings.
    pub fn cross(&self, orientation: Orientation) -> f32 {
        match orientation {
            Orientation::Vertical => self.width,
            Orientation::Horizontal => self.height,
        }
    }

    /// Extent along the axis that tracks depth.
    pub fn main(&self, orientation: Orientation) -> f32 {
        match orientation {
            Orientation::Vertical => self.height,
            Orientation::Horizontal => self.width,
        }
    }
}

impl Default for BoxSize {
    fn default() -> Self {
        Self::new(120.0, 40.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn node_id_map_lookup_by_str() {
        let mut map = HashMap::new();
        map.insert(NodeId::from("alpha"), 1);
        assert_eq!(map.get("alpha"), Some(&1));
        assert_eq!(map.get("beta"), None);
    }

    #[test]
    fn orientation_serializes_lowercase() {
        let v = serde_json::to_value(Orientation::Vertical).expect("serialize");
        assert_eq!(v, "vertical");
        let parsed: Orientation = serde_json::from_str("\"horizontal\"").expect("parse");
        assert_eq!(parsed, Orientation::Horizontal);
        assert_eq!(Orientation::Vertical.toggled(), Orientation::Horizontal);
    }

    #[test]
    fn box_size_axes_follow_orientation() {
        let size = BoxSize::new(120.0, 40.0);
        assert_eq!(size.cross(Orientation::Vertical), 120.0);
        assert_eq!(size.main(Orientation::Vertical), 40.0);
        assert_eq!(size.cross(Orientation::Horizontal), 40.0);
        assert_eq!(size.main(Orientation::Horizontal), 120.0);
    }

    #[test]
    fn terminal_path_step_has_empty_child() {
        let step = PathStep::terminal("leaf");
        assert!(step.is_terminal());
        assert!(!PathStep::new("a", "b", "B").is_terminal());
    }
}
