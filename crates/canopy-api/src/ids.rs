use crate::errors::ApiError;
use canopy_core as core;
use serde::{Deserialize, Serialize};
use specta::Type;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type, Default)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn to_core(&self) -> Result<core::NodeId, ApiError> {
        let raw = self.0.trim();
        if raw.is_empty() {
            return Err(ApiError::invalid_argument("Invalid NodeId: empty"));
        }
        Ok(core::NodeId::new(raw))
    }
}

impl From<core::NodeId> for NodeId {
    fn from(value: core::NodeId) -> Self {
        Self(value.0)
    }
}

impl From<&core::NodeId> for NodeId {
    fn from(value: &core::NodeId) -> Self {
        Self(value.0.clone())
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
