mod dto;
mod errors;
mod events;
mod ids;
mod types;

pub use dto::{
    ChildNodeDto, ChildNodeRequest, ChildNodeResponse, NodePathRequest, NodePathResponse,
    PathStepDto, RenderEdgeDto, RenderGraphResponse, RenderNodeDto, RootNodeResponse,
};
pub use errors::ApiError;
pub use events::AppEventPayload;
pub use ids::NodeId;
pub use types::Orientation;
