use crate::ids::NodeId;
use crate::types::Orientation;
use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(tag = "type", content = "data")]
pub enum AppEventPayload {
    ViewOpened {
        root_id: NodeId,
    },
    NodeExpanded {
        node_id: NodeId,
        added: u32,
        materialized: u32,
        total: u32,
    },
    NodeCollapsed {
        node_id: NodeId,
        dropped: u32,
    },
    MergeRejected {
        node_id: NodeId,
        child_ids: Vec<NodeId>,
    },
    FetchFailed {
        node_id: NodeId,
        error: String,
    },
    StaleResponseDiscarded {
        node_id: NodeId,
    },
    PathRevealed {
        target_id: NodeId,
        added: u32,
    },
    OrientationChanged {
        orientation: Orientation,
    },
}
