use canopy_api::{NodeId, RenderEdgeDto, RenderGraphResponse, RenderNodeDto};
use canopy_graph::{ProjectedEdge, ProjectedNode, Projection};

fn node_dto(node: &ProjectedNode) -> RenderNodeDto {
    RenderNodeDto {
        id: NodeId::from(&node.id),
        label: node.label.clone(),
        is_expanded: node.is_expanded,
        has_more: node.has_more,
        orientation: node.orientation.into(),
        x: node.position.x,
        y: node.position.y,
        width: node.size.x,
        height: node.size.y,
    }
}

fn edge_dto(edge: &ProjectedEdge) -> RenderEdgeDto {
    RenderEdgeDto {
        id: edge.id.clone(),
        source: NodeId::from(&edge.source),
        target: NodeId::from(&edge.target),
    }
}

pub fn render_graph(projection: &Projection) -> RenderGraphResponse {
    RenderGraphResponse {
        orientation: projection.orientation.into(),
        nodes: projection.nodes.iter().map(node_dto).collect(),
        edges: projection.edges.iter().map(edge_dto).collect(),
    }
}
