use crate::ids::NodeId;
use crate::types::Orientation;
use canopy_core as core;
use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct ChildNodeRequest {
    pub node_id: NodeId,
    /// `None` fetches every child.
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ChildNodeDto {
    pub id: NodeId,
    pub name: String,
    pub sequence_no: u32,
    pub level: u32,
    pub has_children: bool,
    /// Exact child count when the provider knows it.
    #[serde(default)]
    pub child_count: Option<u32>,
}

impl ChildNodeDto {
    pub fn to_spec(&self) -> core::ChildSpec {
        let declared_child_count = match (self.child_count, self.has_children) {
            (Some(count), _) => Some(count),
            (None, false) => Some(0),
            (None, true) => None,
        };
        core::ChildSpec {
            id: core::NodeId::new(self.id.0.clone()),
            name: self.name.clone(),
            declared_child_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ChildNodeResponse {
    pub search_id: NodeId,
    #[serde(default)]
    pub parent: Option<ChildNodeDto>,
    pub children: Vec<ChildNodeDto>,
    /// Total children of `search_id` on the server, not the page size.
    pub count_children: u32,
}

impl From<ChildNodeResponse> for core::ChildPage {
    fn from(value: ChildNodeResponse) -> Self {
        Self {
            children: value.children.iter().map(ChildNodeDto::to_spec).collect(),
            total_child_count: value.count_children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct RootNodeResponse {
    pub root_nodes: Vec<NodeId>,
    pub message: String,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct NodePathRequest {
    pub from_id: NodeId,
    pub to_id: NodeId,
}

/// One step of a resolved path; an empty `child_id` ends the walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct PathStepDto {
    pub id: NodeId,
    #[serde(default)]
    pub child_id: NodeId,
    #[serde(default)]
    pub child_name: String,
}

impl From<&core::PathStep> for PathStepDto {
    fn from(value: &core::PathStep) -> Self {
        Self {
            id: NodeId::from(&value.parent_id),
            child_id: NodeId::from(&value.child_id),
            child_name: value.child_name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct NodePathResponse {
    pub path: Vec<PathStepDto>,
    pub length: u32,
}

impl From<&core::NodePath> for NodePathResponse {
    fn from(value: &core::NodePath) -> Self {
        let path: Vec<PathStepDto> = value.steps.iter().map(PathStepDto::from).collect();
        Self {
            length: u32::try_from(path.len()).unwrap_or(u32::MAX),
            path,
        }
    }
}

impl From<NodePathResponse> for core::NodePath {
    fn from(value: NodePathResponse) -> Self {
        Self {
            steps: value
                .path
                .into_iter()
                .map(|step| core::PathStep {
                    parent_id: core::NodeId::new(step.id.0),
                    child_id: core::NodeId::new(step.child_id.0),
                    child_name: step.child_name,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
#[serde(rename_all = "camelCase")]
pub struct RenderNodeDto {
    pub id: NodeId,
    pub label: String,
    pub is_expanded: bool,
    pub has_more: bool,
    pub orientation: Orientation,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct RenderEdgeDto {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Type)]
pub struct RenderGraphResponse {
    pub orientation: Orientation,
    pub nodes: Vec<RenderNodeDto>,
    pub edges: Vec<RenderEdgeDto>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn child(id: &str, has_children: bool, child_count: Option<u32>) -> ChildNodeDto {
        ChildNodeDto {
            id: NodeId::from(id),
            name: id.to_string(),
            sequence_no: 1,
            level: 1,
            has_children,
            child_count,
        }
    }

    #[test]
    fn test_child_response_converts_to_page() {
        let response = ChildNodeResponse {
            search_id: NodeId::from("r1"),
            parent: None,
            children: vec![child("a", false, None), child("b", true, None), child("c", true, Some(7))],
            count_children: 5,
        };

        let page = core::ChildPage::from(response);

        assert_eq!(page.total_child_count, 5);
        let counts: Vec<Option<u32>> = page
            .children
            .iter()
            .map(|c| c.declared_child_count)
            .collect();
        assert_eq!(counts, vec![Some(0), None, Some(7)]);
    }

    #[test]
    fn test_path_step_uses_camel_case_and_defaults_terminal() {
        let step: PathStepDto =
            serde_json::from_str(r#"{"id":"c2"}"#).expect("terminal step parses");
        assert_eq!(step.child_id.0, "");

        let v = serde_json::to_value(PathStepDto {
            id: NodeId::from("r"),
            child_id: NodeId::from("c1"),
            child_name: "C1".to_string(),
        })
        .expect("serialize");
        assert_eq!(v["childId"], "c1");
        assert_eq!(v["childName"], "C1");
    }

    #[test]
    fn test_path_response_converts_to_core() {
        let response = NodePathResponse {
            path: vec![
                PathStepDto {
                    id: NodeId::from("r"),
                    child_id: NodeId::from("c1"),
                    child_name: "C1".to_string(),
                },
                PathStepDto {
                    id: NodeId::from("c1"),
                    child_id: NodeId::from(""),
                    child_name: String::new(),
                },
            ],
            length: 2,
        };
        let path = core::NodePath::from(response);
        assert_eq!(path.len(), 2);
        assert!(path.steps[1].is_terminal());
        assert_eq!(NodePathResponse::from(&path).length, 2);
    }

    #[test]
    fn test_render_node_serializes_camel_case() {
        let node = RenderNodeDto {
            id: NodeId::from("a"),
            label: "A".to_string(),
            is_expanded: true,
            has_more: false,
            orientation: Orientation::Vertical,
            x: 1.0,
            y: 2.0,
            width: 120.0,
            height: 40.0,
        };
        let v = serde_json::to_value(node).expect("serialize");
        assert_eq!(v["isExpanded"], true);
        assert_eq!(v["hasMore"], false);
        assert_eq!(v["orientation"], "vertical");
    }
}
