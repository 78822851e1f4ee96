pub mod layout;
pub mod projector;
pub mod tree;
pub mod view;

pub use layout::{Layouter, PositionedNode, TidyTreeLayouter, compute_layout};
pub use projector::{ProjectedEdge, ProjectedNode, Projection, TreeProjector};
pub use tree::{MergeReport, NodeIndex, TreeModel, TreeNode, Vec2};
pub use view::TreeView;
