pub mod dataset;
pub mod render;
pub mod settings;

pub use dataset::{Relationship, RelationshipStore, parse_csv_text};
pub use render::render_graph;
pub use settings::ViewSettings;

use canopy_api::{ApiError, AppEventPayload, NodeId as ApiNodeId, RenderGraphResponse};
use canopy_core::{ChildPage, ChildSpec, NodeId, NodePath, Orientation, ProviderError, TreeError};
use canopy_graph::{MergeReport, TreeView};
use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Remote source of tree nodes.
pub trait NodeProvider: Send + Sync {
    fn list_roots(&self) -> Result<Vec<NodeId>, ProviderError>;

    /// `page_limit = None` fetches every child.
    fn fetch_children(
        &self,
        node_id: &NodeId,
        page_limit: Option<u32>,
    ) -> Result<ChildPage, ProviderError>;

    fn fetch_path(&self, from: &NodeId, to: &NodeId) -> Result<NodePath, ProviderError>;

    /// Total children of `node_id` on the provider, without materializing any.
    fn child_total(&self, node_id: &NodeId) -> Result<u32, ProviderError> {
        self.fetch_children(node_id, Some(0))
            .map(|page| page.total_child_count)
    }
}

/// Handle for one outstanding child fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub node_id: NodeId,
    pub token: u64,
    pub page_limit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied(MergeReport),
    /// A newer fetch was issued for the node, or it was collapsed meanwhile.
    Stale,
    Failed(ApiError),
    /// The node is no longer materialized.
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Collapsed { dropped: usize },
    Expanded(FetchOutcome),
}

fn no_view_error() -> ApiError {
    ApiError::invalid_argument("No view open. Call open_view first.")
}

fn clamp_usize_to_u32(v: usize) -> u32 {
    u32::try_from(v).unwrap_or(u32::MAX)
}

fn parse_id(raw: &str) -> Result<NodeId, ApiError> {
    ApiNodeId::from(raw).to_core()
}

struct ViewState {
    view: TreeView,
    /// Latest token issued per node; anything older is discarded on arrival.
    pending: HashMap<NodeId, u64>,
    /// Page limit of the last applied fetch per node.
    page_limits: HashMap<NodeId, Option<u32>>,
}

struct ControllerState {
    view: Option<ViewState>,
    next_token: u64,
}

/// Headless orchestrator for one tree view.
///
/// Owns the view state, talks to the `NodeProvider` outside the state lock
/// and reports every change as an `AppEventPayload`.
#[derive(Clone)]
pub struct TreeController {
    provider: Arc<dyn NodeProvider>,
    settings: ViewSettings,
    state: Arc<Mutex<ControllerState>>,
    events_tx: Sender<AppEventPayload>,
    events_rx: Receiver<AppEventPayload>,
}

impl TreeController {
    pub fn new(provider: Arc<dyn NodeProvider>, settings: ViewSettings) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            provider,
            settings,
            state: Arc::new(Mutex::new(ControllerState {
                view: None,
                next_token: 0,
            })),
            events_tx,
            events_rx,
        }
    }

    pub fn events(&self) -> Receiver<AppEventPayload> {
        self.events_rx.clone()
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    fn emit(&self, event: AppEventPayload) {
        let _ = self.events_tx.send(event);
    }

    fn with_view<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> Result<R, ApiError> {
        let mut state = self.state.lock();
        let view = state.view.as_mut().ok_or_else(no_view_error)?;
        Ok(f(view))
    }

    /// Replace the current view with a fresh one rooted at `root_id` and
    /// fetch its first page of children.
    pub fn open_view(&self, root_id: &str) -> Result<FetchOutcome, ApiError> {
        let root = parse_id(root_id)?;
        let view = TreeView::new(
            ChildSpec::new(root.clone(), root.as_str()),
            self.settings.orientation,
            self.settings.node_size(),
            self.settings.spacing,
        );
        self.state.lock().view = Some(ViewState {
            view,
            pending: HashMap::new(),
            page_limits: HashMap::new(),
        });
        tracing::info!("Opened view rooted at {}", root);
        self.emit(AppEventPayload::ViewOpened {
            root_id: ApiNodeId::from(&root),
        });

        self.expand_node(root.as_str(), self.settings.page_limit)
    }

    /// Open a view on the first root the provider lists.
    pub fn open_first_root(&self) -> Result<NodeId, ApiError> {
        let roots = self.provider.list_roots().map_err(ApiError::from)?;
        let Some(root) = roots.into_iter().next() else {
            return Err(ApiError::not_found("Provider listed no root nodes"));
        };
        self.open_view(root.as_str())?;
        Ok(root)
    }

    /// Register an outstanding fetch for `node_id`. Returns `None` when the
    /// node is not materialized.
    pub fn begin_fetch(
        &self,
        node_id: &str,
        page_limit: Option<u32>,
    ) -> Result<Option<FetchTicket>, ApiError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let view = state.view.as_mut().ok_or_else(no_view_error)?;
        let Some(node) = view.view.model().node(node_id) else {
            return Ok(None);
        };
        let node_id = node.id.clone();

        state.next_token += 1;
        let token = state.next_token;
        if view.pending.insert(node_id.clone(), token).is_some() {
            tracing::debug!("Superseding in-flight fetch for {}", node_id);
        }
        Ok(Some(FetchTicket {
            node_id,
            token,
            page_limit,
        }))
    }

    /// Apply a fetch result if its ticket is still the latest for the node.
    /// A failed fetch leaves the tree untouched.
    pub fn complete_fetch(
        &self,
        ticket: &FetchTicket,
        result: Result<ChildPage, ProviderError>,
    ) -> Result<FetchOutcome, ApiError> {
        let mut state = self.state.lock();
        let view = state.view.as_mut().ok_or_else(no_view_error)?;
        let node_api_id = ApiNodeId::from(&ticket.node_id);

        if view.pending.get(&ticket.node_id) != Some(&ticket.token) {
            tracing::debug!(
                "Discarding stale response for {} (token {})",
                ticket.node_id,
                ticket.token
            );
            self.emit(AppEventPayload::StaleResponseDiscarded {
                node_id: node_api_id,
            });
            return Ok(FetchOutcome::Stale);
        }
        view.pending.remove(&ticket.node_id);

        let page = match result {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!("Fetching children of {} failed: {}", ticket.node_id, err);
                let err = ApiError::from(err);
                self.emit(AppEventPayload::FetchFailed {
                    node_id: node_api_id,
                    error: err.message.clone(),
                });
                return Ok(FetchOutcome::Failed(err));
            }
        };

        let node_id = ticket.node_id.as_str();
        if !view.view.model().contains(node_id) {
            return Ok(FetchOutcome::Missing);
        }
        let report = view.view.expand_node(node_id, page.children);
        view.view.record_child_total(node_id, page.total_child_count);
        view.page_limits.insert(ticket.node_id.clone(), ticket.page_limit);

        if !report.rejected.is_empty() {
            let child_ids = report
                .rejected
                .iter()
                .filter_map(|err| match err {
                    TreeError::OwnershipConflict { child_id, .. } => {
                        Some(ApiNodeId::from(child_id))
                    }
                    TreeError::MalformedPath { .. } => None,
                })
                .collect();
            self.emit(AppEventPayload::MergeRejected {
                node_id: node_api_id.clone(),
                child_ids,
            });
        }
        self.emit(AppEventPayload::NodeExpanded {
            node_id: node_api_id,
            added: clamp_usize_to_u32(report.added.len()),
            materialized: clamp_usize_to_u32(view.view.model().child_count_materialized(node_id)),
            total: page.total_child_count,
        });
        Ok(FetchOutcome::Applied(report))
    }

    pub fn is_in_flight(&self, node_id: &str) -> bool {
        self.with_view(|view| view.pending.contains_key(node_id))
            .unwrap_or(false)
    }

    /// Run the provider call for `ticket` and apply its result.
    pub fn fetch_and_apply(&self, ticket: &FetchTicket) -> Result<FetchOutcome, ApiError> {
        let result = self
            .provider
            .fetch_children(&ticket.node_id, ticket.page_limit);
        self.complete_fetch(ticket, result)
    }

    pub fn expand_node(
        &self,
        node_id: &str,
        page_limit: Option<u32>,
    ) -> Result<FetchOutcome, ApiError> {
        match self.begin_fetch(node_id, page_limit)? {
            Some(ticket) => self.fetch_and_apply(&ticket),
            None => Ok(FetchOutcome::Missing),
        }
    }

    /// Collapse an expanded node, otherwise fetch its first page.
    pub fn toggle_node(&self, node_id: &str) -> Result<ToggleOutcome, ApiError> {
        let expanded = self.with_view(|view| view.view.model().is_expanded(node_id))?;
        if expanded {
            let dropped = self.collapse_node(node_id)?;
            Ok(ToggleOutcome::Collapsed { dropped })
        } else {
            let outcome = self.expand_node(node_id, self.settings.page_limit)?;
            Ok(ToggleOutcome::Expanded(outcome))
        }
    }

    /// Drop the subtree below `node_id` and revoke fetches that target it
    /// or any node it contained.
    pub fn collapse_node(&self, node_id: &str) -> Result<usize, ApiError> {
        let dropped = self.with_view(|state| {
            let dropped = state.view.collapse_node(node_id);
            let model = state.view.model();
            state
                .pending
                .retain(|id, _| id.as_str() != node_id && model.contains(id.as_str()));
            state
                .page_limits
                .retain(|id, _| id.as_str() != node_id && model.contains(id.as_str()));
            dropped
        })?;

        if dropped > 0 {
            self.emit(AppEventPayload::NodeCollapsed {
                node_id: ApiNodeId::from(node_id),
                dropped: clamp_usize_to_u32(dropped),
            });
        }
        Ok(dropped)
    }

    /// Expand every unexpanded node above `depth`, one level at a time.
    /// Returns the number of nodes added.
    pub fn expand_to_depth(&self, depth: u32) -> Result<usize, ApiError> {
        let mut added = 0;
        for level in 0..depth {
            let frontier: Vec<NodeId> = self.with_view(|state| {
                let model = state.view.model();
                model
                    .preorder()
                    .into_iter()
                    .map(|idx| &model[idx])
                    .filter(|node| {
                        node.depth == level
                            && !node.is_expanded()
                            && node.declared_child_count != Some(0)
                    })
                    .map(|node| node.id.clone())
                    .collect()
            })?;

            for node_id in frontier {
                match self.expand_node(node_id.as_str(), self.settings.page_limit)? {
                    FetchOutcome::Applied(report) => added += report.added.len(),
                    FetchOutcome::Failed(err) => return Err(err),
                    FetchOutcome::Stale | FetchOutcome::Missing => {}
                }
            }
        }
        Ok(added)
    }

    /// Re-fetch `node_id` with a larger page: the previous limit plus the
    /// children already materialized.
    pub fn load_more(&self, node_id: &str) -> Result<FetchOutcome, ApiError> {
        let next_limit = self.with_view(|state| {
            let model = state.view.model();
            let node = model.node(node_id)?;
            let materialized = clamp_usize_to_u32(node.children.len());
            let previous = state
                .page_limits
                .get(node_id)
                .copied()
                .unwrap_or(self.settings.page_limit);
            Some(previous.map(|limit| limit.saturating_add(materialized)))
        })?;

        match next_limit {
            Some(limit) => {
                tracing::debug!("Loading more children of {} (limit {:?})", node_id, limit);
                self.expand_node(node_id, limit)
            }
            None => Ok(FetchOutcome::Missing),
        }
    }

    /// Materialize the path from the view root down to `target_id`.
    pub fn reveal(&self, target_id: &str) -> Result<usize, ApiError> {
        let target = parse_id(target_id)?;
        let root = self.with_view(|state| state.view.model().root_id().clone())?;

        let path = match self.provider.fetch_path(&root, &target) {
            Ok(path) => path,
            Err(err) => {
                let err = ApiError::from(err);
                self.emit(AppEventPayload::FetchFailed {
                    node_id: ApiNodeId::from(&target),
                    error: err.message.clone(),
                });
                return Err(err);
            }
        };

        let added = self
            .with_view(|state| state.view.expand_path(&path.steps))?
            .map_err(ApiError::from)?;
        self.fill_path_counts(&path);
        tracing::info!("Revealed {} ({} nodes added)", target, added);
        self.emit(AppEventPayload::PathRevealed {
            target_id: ApiNodeId::from(&target),
            added: clamp_usize_to_u32(added),
        });
        Ok(added)
    }

    /// Path steps carry no child counts; ask the provider for the ones the
    /// view does not know yet so `has_more` is right along the path.
    fn fill_path_counts(&self, path: &NodePath) {
        let unknown: Vec<NodeId> = self
            .with_view(|state| {
                let model = state.view.model();
                let mut seen = HashSet::new();
                path.steps
                    .iter()
                    .flat_map(|step| [&step.parent_id, &step.child_id])
                    .filter(|id| !id.is_empty() && seen.insert(id.as_str()))
                    .filter(|id| {
                        model.contains(id.as_str())
                            && model.declared_child_count(id.as_str()).is_none()
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        for node_id in unknown {
            match self.provider.child_total(&node_id) {
                Ok(total) => {
                    let _ = self.with_view(|state| {
                        state.view.record_child_total(node_id.as_str(), total)
                    });
                }
                Err(err) => {
                    tracing::warn!("Could not count children of {}: {}", node_id, err);
                }
            }
        }
    }

    pub fn orientation(&self) -> Result<Orientation, ApiError> {
        self.with_view(|state| state.view.orientation())
    }

    pub fn set_orientation(&self, orientation: Orientation) -> Result<(), ApiError> {
        let changed = self.with_view(|state| {
            let changed = state.view.orientation() != orientation;
            state.view.set_orientation(orientation);
            changed
        })?;
        if changed {
            self.emit(AppEventPayload::OrientationChanged {
                orientation: orientation.into(),
            });
        }
        Ok(())
    }

    pub fn toggle_orientation(&self) -> Result<Orientation, ApiError> {
        let next = self.orientation()?.toggled();
        self.set_orientation(next)?;
        Ok(next)
    }

    /// Positioned nodes and edges for the renderer.
    pub fn render(&self) -> Result<RenderGraphResponse, ApiError> {
        self.with_view(|state| render_graph(state.view.projection()))
    }

    pub fn is_expanded(&self, node_id: &str) -> bool {
        self.with_view(|state| state.view.model().is_expanded(node_id))
            .unwrap_or(false)
    }

    pub fn has_more(&self, node_id: &str) -> bool {
        self.with_view(|state| state.view.model().has_more(node_id))
            .unwrap_or(false)
    }

    pub fn node_count(&self) -> usize {
        self.with_view(|state| state.view.model().node_count())
            .unwrap_or(0)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.with_view(|state| state.view.model().contains(node_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATASET: &str = "parent_item,child_item,sequence_no,level\n\
        r1,a,1,1\n\
        r1,b,2,1\n\
        r1,c,3,1\n\
        a,a1,1,2\n\
        a1,a11,1,3\n\
        r2,z,1,1\n";

    fn controller(page_limit: Option<u32>) -> TreeController {
        let store = RelationshipStore::from_csv_text(DATASET).expect("dataset");
        let settings = ViewSettings {
            page_limit,
            orientation: Orientation::Vertical,
            ..ViewSettings::default()
        };
        TreeController::new(Arc::new(store), settings)
    }

    struct FailingProvider;

    impl NodeProvider for FailingProvider {
        fn list_roots(&self) -> Result<Vec<NodeId>, ProviderError> {
            Ok(vec![NodeId::from("r")])
        }

        fn fetch_children(&self, _: &NodeId, _: Option<u32>) -> Result<ChildPage, ProviderError> {
            Err(ProviderError::Transport("connection reset".to_string()))
        }

        fn fetch_path(&self, _: &NodeId, to: &NodeId) -> Result<NodePath, ProviderError> {
            Err(ProviderError::NotFound(to.clone()))
        }
    }

    fn applied(outcome: FetchOutcome) -> MergeReport {
        match outcome {
            FetchOutcome::Applied(report) => report,
            other => panic!("expected applied fetch, got {other:?}"),
        }
    }

    #[test]
    fn test_paged_expansion_then_load_more() {
        let controller = controller(Some(2));
        let report = applied(controller.open_view("r1").expect("open"));
        assert_eq!(report.added, vec![NodeId::from("a"), NodeId::from("b")]);
        assert!(controller.has_more("r1"));

        let report = applied(controller.load_more("r1").expect("load more"));
        assert_eq!(report.added, vec![NodeId::from("c")]);
        assert!(!controller.has_more("r1"));

        let graph = controller.render().expect("render");
        assert_eq!(graph.nodes.len(), 4);
        assert_eq!(graph.edges.len(), 3);
        let edge_ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(edge_ids, vec!["r1-a", "r1-b", "r1-c"]);
    }

    #[test]
    fn test_load_more_uses_previous_limit_plus_materialized() {
        let store = Arc::new(RelationshipStore::from_csv_text(DATASET).expect("dataset"));
        let controller = TreeController::new(
            store,
            ViewSettings {
                page_limit: Some(1),
                ..ViewSettings::default()
            },
        );
        controller.open_view("r1").expect("open");
        assert_eq!(controller.node_count(), 2);

        // 1 + 1 materialized
        controller.load_more("r1").expect("load more");
        assert_eq!(controller.node_count(), 3);

        // 2 + 2 materialized covers the rest
        controller.load_more("r1").expect("load more");
        assert_eq!(controller.node_count(), 4);
        assert!(!controller.has_more("r1"));
    }

    #[test]
    fn test_superseded_fetch_is_discarded() {
        let controller = controller(None);
        controller.open_view("r1").expect("open");

        let first = controller
            .begin_fetch("a", None)
            .expect("view open")
            .expect("a is materialized");
        let second = controller
            .begin_fetch("a", None)
            .expect("view open")
            .expect("a is materialized");
        assert!(second.token > first.token);
        assert!(controller.is_in_flight("a"));

        let outcome = controller
            .fetch_and_apply(&first)
            .expect("complete first");
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(!controller.is_expanded("a"));

        applied(controller.fetch_and_apply(&second).expect("complete second"));
        assert!(controller.is_expanded("a"));
        assert!(!controller.is_in_flight("a"));
    }

    #[test]
    fn test_collapse_revokes_outstanding_fetches() {
        let controller = controller(None);
        controller.open_view("r1").expect("open");
        let ticket = controller
            .begin_fetch("a", None)
            .expect("view open")
            .expect("a is materialized");

        let dropped = controller.collapse_node("r1").expect("collapse");
        assert_eq!(dropped, 3);
        assert!(!controller.is_in_flight("a"));

        let result = Ok(ChildPage {
            children: vec![ChildSpec::new("a1", "a1")],
            total_child_count: 1,
        });
        let outcome = controller.complete_fetch(&ticket, result).expect("complete");
        assert_eq!(outcome, FetchOutcome::Stale);
        assert!(!controller.contains("a1"));
    }

    #[test]
    fn test_toggle_collapses_then_expands() {
        let controller = controller(None);
        controller.open_view("r1").expect("open");

        let outcome = controller.toggle_node("r1").expect("toggle");
        assert_eq!(outcome, ToggleOutcome::Collapsed { dropped: 3 });
        assert!(!controller.is_expanded("r1"));

        let outcome = controller.toggle_node("r1").expect("toggle");
        assert!(matches!(outcome, ToggleOutcome::Expanded(FetchOutcome::Applied(_))));
        assert_eq!(controller.node_count(), 4);
    }

    #[test]
    fn test_provider_failure_leaves_tree_untouched() {
        let controller = TreeController::new(Arc::new(FailingProvider), ViewSettings::default());
        let events = controller.events();

        let root = controller.open_first_root().expect("open");
        assert_eq!(root, NodeId::from("r"));
        assert_eq!(controller.node_count(), 1);
        assert!(!controller.is_in_flight("r"));

        let received: Vec<AppEventPayload> = events.try_iter().collect();
        assert!(matches!(received[0], AppEventPayload::ViewOpened { .. }));
        match &received[1] {
            AppEventPayload::FetchFailed { node_id, error } => {
                assert_eq!(node_id.0, "r");
                assert!(error.contains("connection reset"));
            }
            other => panic!("unexpected event {other:?}"),
        }

        let err = controller.reveal("x").expect_err("path lookup fails");
        assert_eq!(err.code, "not_found");
    }

    #[test]
    fn test_reveal_materializes_path() {
        let controller = controller(Some(1));
        controller.open_view("r1").expect("open");

        let added = controller.reveal("a11").expect("reveal");
        assert_eq!(added, 2);
        assert!(controller.is_expanded("a1"));

        let graph = controller.render().expect("render");
        let edge_ids: Vec<&str> = graph.edges.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(edge_ids, vec!["r1-a", "a-a1", "a1-a11"]);

        let err = controller.reveal("z").expect_err("z lives under another root");
        assert_eq!(err.code, "not_found");
    }

    #[test]
    fn test_reveal_fills_child_counts_along_path() {
        let store = RelationshipStore::from_csv_text(
            "parent_item,child_item,sequence_no,level\n\
             r,p,1,1\n\
             p,q,1,2\n\
             q,t,1,3\n\
             q,u,2,3\n\
             t,v,1,4\n",
        )
        .expect("dataset");
        let controller = TreeController::new(Arc::new(store), ViewSettings::default());
        controller.open_view("r").expect("open");

        assert_eq!(controller.reveal("v").expect("reveal"), 3);
        assert!(controller.has_more("q"));
        assert!(!controller.has_more("t"));

        let graph = controller.render().expect("render");
        let q = graph.nodes.iter().find(|n| n.id.0 == "q").expect("q rendered");
        assert!(q.has_more);

        let report = applied(controller.load_more("q").expect("load more"));
        assert_eq!(report.added, vec![NodeId::from("u")]);
    }

    #[test]
    fn test_orientation_switch_keeps_shape() {
        let controller = controller(None);
        controller.open_view("r1").expect("open");
        let events = controller.events();
        let vertical = controller.render().expect("render");

        assert_eq!(
            controller.toggle_orientation().expect("toggle"),
            Orientation::Horizontal
        );
        let horizontal = controller.render().expect("render");

        assert_eq!(vertical.edges, horizontal.edges);
        let ids = |graph: &RenderGraphResponse| -> Vec<String> {
            graph.nodes.iter().map(|n| n.id.0.clone()).collect()
        };
        assert_eq!(ids(&vertical), ids(&horizontal));
        // Depth runs down in vertical mode and right in horizontal mode.
        assert!(vertical.nodes[1].y > 0.0 && vertical.nodes[1].x < 0.0);
        assert!(horizontal.nodes[1].x > 0.0 && horizontal.nodes[1].y < 0.0);
        assert!(
            events
                .try_iter()
                .any(|e| matches!(e, AppEventPayload::OrientationChanged { .. }))
        );
    }

    #[test]
    fn test_expand_to_depth_skips_known_leaves() {
        let controller = controller(None);
        controller.open_view("r1").expect("open");

        let added = controller.expand_to_depth(3).expect("expand");
        assert_eq!(added, 2);
        assert!(controller.contains("a11"));
        assert!(!controller.is_expanded("b"));
        assert!(!controller.is_in_flight("b"));
    }

    #[test]
    fn test_gestures_without_view_are_rejected() {
        let controller = controller(None);
        assert_eq!(
            controller.render().expect_err("no view").code,
            "invalid_argument"
        );
        assert!(!controller.has_more("r1"));
        assert_eq!(controller.open_view("  ").expect_err("empty id").code, "invalid_argument");
        assert_eq!(controller.expand_node("nope", None).ok(), None);
    }
}
