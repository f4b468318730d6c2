//! Small uncertain graphs reused across clustering and CLI tests.

use probcluster_core::graph::{UncertainGraph, UncertainGraphBuilder, VertexId};

/// A single triangle with certain (probability `1.0`) edges between every
/// pair of vertices. Labels are `"A"`, `"B"`, `"C"`.
#[must_use]
pub fn triangle_graph() -> UncertainGraph {
    let mut builder = UncertainGraphBuilder::new();
    let a = builder.vertex("A");
    let b = builder.vertex("B");
    let c = builder.vertex("C");
    builder.edge(a, b, 1.0).expect("valid probability");
    builder.edge(b, c, 1.0).expect("valid probability");
    builder.edge(a, c, 1.0).expect("valid probability");
    builder.build()
}

/// Two disjoint, certain-edge pairs: `A-B` and `C-D`. Useful for exercising
/// the `target_k < components` rejection path and multi-component coverage.
#[must_use]
pub fn two_components_graph() -> UncertainGraph {
    let mut builder = UncertainGraphBuilder::new();
    let a = builder.vertex("A");
    let b = builder.vertex("B");
    let c = builder.vertex("C");
    let d = builder.vertex("D");
    builder.edge(a, b, 1.0).expect("valid probability");
    builder.edge(c, d, 1.0).expect("valid probability");
    builder.build()
}

/// A path `A-B-C-D-E` with uniform edge probability `probability`, useful for
/// exercising threshold search over a graph with no certain long-range
/// connections.
#[must_use]
pub fn path_graph(probability: f64) -> UncertainGraph {
    let mut builder = UncertainGraphBuilder::new();
    let labels = ["A", "B", "C", "D", "E"];
    let ids: Vec<VertexId> = labels.iter().map(|label| builder.vertex(label)).collect();
    for pair in ids.windows(2) {
        builder
            .edge(pair[0], pair[1], probability)
            .expect("valid probability");
    }
    builder.build()
}

/// Three disjoint triangles, optionally bridged into a single component by
/// connecting each triangle's first vertex to the next triangle's first
/// vertex with a certain edge. Useful for shrink-pass and outer-AVPR tests.
#[must_use]
pub fn three_triangles_graph(bridged: bool) -> UncertainGraph {
    let mut builder = UncertainGraphBuilder::new();
    let mut anchors = Vec::new();
    for group in 0..3 {
        let a = builder.vertex(&format!("{group}-a"));
        let b = builder.vertex(&format!("{group}-b"));
        let c = builder.vertex(&format!("{group}-c"));
        builder.edge(a, b, 1.0).expect("valid probability");
        builder.edge(b, c, 1.0).expect("valid probability");
        builder.edge(a, c, 1.0).expect("valid probability");
        anchors.push(a);
    }
    if bridged {
        builder
            .edge(anchors[0], anchors[1], 1.0)
            .expect("valid probability");
        builder
            .edge(anchors[1], anchors[2], 1.0)
            .expect("valid probability");
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_graph_has_three_vertices_and_edges() {
        let graph = triangle_graph();
        assert_eq!(graph.vertex_count(), 3);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn two_components_graph_has_two_components() {
        let graph = two_components_graph();
        assert_eq!(graph.connected_component_count(), 2);
    }

    #[test]
    fn path_graph_has_four_edges_over_five_vertices() {
        let graph = path_graph(0.5);
        assert_eq!(graph.vertex_count(), 5);
        assert_eq!(graph.edge_count(), 4);
    }

    #[test]
    fn three_triangles_graph_bridged_is_one_component() {
        let graph = three_triangles_graph(true);
        assert_eq!(graph.connected_component_count(), 1);
    }

    #[test]
    fn three_triangles_graph_unbridged_is_three_components() {
        let graph = three_triangles_graph(false);
        assert_eq!(graph.connected_component_count(), 3);
    }
}
