use canopy_core::{ProviderError, TreeError};
use serde::{Deserialize, Serialize};
use specta::Type;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Type)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new("invalid_argument", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("unauthorized", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("unavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<ProviderError> for ApiError {
    fn from(value: ProviderError) -> Self {
        match &value {
            ProviderError::NotFound(_) => Self::not_found(value.to_string()),
            ProviderError::Unauthorized => Self::unauthorized(value.to_string()),
            ProviderError::Transport(_) => Self::unavailable(value.to_string()),
            ProviderError::InvalidResponse(_) => Self::internal(value.to_string()),
        }
    }
}

impl From<TreeError> for ApiError {
    fn from(value: TreeError) -> Self {
        match &value {
            TreeError::MalformedPath { .. } => Self::invalid_argument(value.to_string()),
            TreeError::OwnershipConflict { .. } => Self::conflict(value.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_errors_map_to_codes() {
        let err = ApiError::from(ProviderError::NotFound(canopy_core::NodeId::from("x")));
        assert_eq!(err.code, "not_found");
        assert_eq!(err.message, "node not found: x");

        let err = ApiError::from(ProviderError::Transport("timeout".to_string()));
        assert_eq!(err.code, "unavailable");
        assert_eq!(ApiError::from(ProviderError::Unauthorized).code, "unauthorized");
    }

    #[test]
    fn test_tree_errors_map_to_codes() {
        let err = ApiError::from(TreeError::MalformedPath {
            step: 1,
            parent_id: canopy_core::NodeId::from("p"),
        });
        assert_eq!(err.code, "invalid_argument");

        let err = ApiError::from(TreeError::OwnershipConflict {
            child_id: canopy_core::NodeId::from("c"),
            parent_id: canopy_core::NodeId::from("p"),
            owner: None,
        });
        assert_eq!(err.code, "conflict");
    }
}
