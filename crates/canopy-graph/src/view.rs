use crate::layout::{Layouter, TidyTreeLayouter};
use crate::projector::{Projection, TreeProjector};
use crate::tree::{MergeReport, TreeModel};
use canopy_core::{BoxSize, ChildSpec, Orientation, PathStep, TreeError};

struct CachedProjection {
    revision: u64,
    orientation: Orientation,
    projection: Projection,
}

/// A tree model paired with its layout settings and a cached projection.
///
/// The cache is keyed by the model revision and the orientation, so any
/// structural mutation or orientation switch recomputes on the next read.
pub struct TreeView {
    model: TreeModel,
    layouter: TidyTreeLayouter,
    projector: TreeProjector,
    cached: Option<CachedProjection>,
}

impl TreeView {
    pub fn new(root: ChildSpec, orientation: Orientation, node_size: BoxSize, spacing: f32) -> Self {
        Self {
            model: TreeModel::new(root),
            layouter: TidyTreeLayouter::new(orientation, node_size, spacing),
            projector: TreeProjector::new(),
            cached: None,
        }
    }

    pub fn model(&self) -> &TreeModel {
        &self.model
    }

    pub fn orientation(&self) -> Orientation {
        self.layouter.orientation
    }

    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.layouter = self.layouter.with_orientation(orientation);
    }

    pub fn expand_node(
        &mut self,
        node_id: &str,
        candidates: impl IntoIterator<Item = ChildSpec>,
    ) -> MergeReport {
        self.model.expand_node(node_id, candidates)
    }

    pub fn collapse_node(&mut self, node_id: &str) -> usize {
        self.model.collapse_node(node_id)
    }

    pub fn expand_path(&mut self, path: &[PathStep]) -> Result<usize, TreeError> {
        self.model.expand_path(path)
    }

    pub fn record_child_total(&mut self, node_id: &str, total: u32) -> bool {
        self.model.record_child_total(node_id, total)
    }

    /// True when the next `projection()` call is served from cache.
    pub fn is_layout_current(&self) -> bool {
        self.cached.as_ref().is_some_and(|cached| {
            cached.revision == self.model.revision()
                && cached.orientation == self.layouter.orientation
        })
    }

    pub fn projection(&mut self) -> &Projection {
        if !self.is_layout_current() {
            self.cached = None;
        }
        let (model, layouter, projector) = (&self.model, &self.layouter, &self.projector);
        &self
            .cached
            .get_or_insert_with(|| {
                let positions = layouter.execute(model);
                CachedProjection {
                    revision: model.revision(),
                    orientation: layouter.orientation,
                    projection: projector.project(model, &positions, layouter.orientation),
                }
            })
            .projection
    }
}
