use crate::NodeId;
use thiserror::Error;

/// Structural faults raised by tree mutations.
///
/// Unknown node ids are not errors: mutations on them are silent no-ops.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("path step {step} references parent {parent_id} which is not materialized")]
    MalformedPath { step: usize, parent_id: NodeId },
    #[error("node {child_id} is already materialized elsewhere and cannot be attached under {parent_id}")]
    OwnershipConflict {
        child_id: NodeId,
        parent_id: NodeId,
        /// Current parent of the conflicting node, `None` when it is the root.
        owner: Option<NodeId>,
    },
}

/// Failures reported by a remote node provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("node not found: {0}")]
    NotFound(NodeId),
    #[error("provider rejected the credentials")]
    Unauthorized,
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}
