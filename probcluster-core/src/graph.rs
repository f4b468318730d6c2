//! In-memory uncertain graph model: vertices with labels, edges with
//! existence probabilities and stable indices.

/// A vertex identifier. Vertices are contiguous integers in `[0, n)`.
pub type VertexId = u32;

/// A stable, 0-based index identifying an edge within a graph.
pub type EdgeId = u32;

/// A single edge in an [`UncertainGraph`]: its endpoints and existence
/// probability.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    /// One endpoint of the edge.
    pub left: VertexId,
    /// The other endpoint of the edge.
    pub right: VertexId,
    /// Existence probability in `(0, 1]`.
    pub probability: f64,
}

/// An undirected, simple, uncertain graph: vertices `[0, n)` each with an
/// opaque string label, and edges each carrying an existence probability and
/// a stable index.
///
/// # Examples
/// ```
/// use probcluster_core::graph::UncertainGraphBuilder;
///
/// let mut builder = UncertainGraphBuilder::new();
/// let a = builder.vertex("A");
/// let b = builder.vertex("B");
/// builder.edge(a, b, 0.5).expect("valid probability");
/// let graph = builder.build();
/// assert_eq!(graph.vertex_count(), 2);
/// assert_eq!(graph.edge_count(), 1);
/// ```
#[derive(Clone, Debug)]
pub struct UncertainGraph {
    labels: Vec<String>,
    edges: Vec<Edge>,
    adjacency: Vec<Vec<EdgeId>>,
}

impl UncertainGraph {
    /// Number of vertices in the graph.
    #[must_use]
    pub fn vertex_count(&self) -> usize {
        self.labels.len()
    }

    /// Number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// The label attached to `vertex`, if it exists.
    #[must_use]
    pub fn label(&self, vertex: VertexId) -> Option<&str> {
        self.labels.get(vertex as usize).map(String::as_str)
    }

    /// All edges, in stable index order.
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The edges incident to `vertex`, as stable edge indices.
    #[must_use]
    pub fn incident_edges(&self, vertex: VertexId) -> &[EdgeId] {
        match self.adjacency.get(vertex as usize) {
            Some(ids) => ids,
            None => &[],
        }
    }

    /// The edge at `id`.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Edge {
        self.edges[id as usize]
    }

    /// Returns the number of connected components of the underlying
    /// deterministic graph (every edge present), used to validate that a
    /// target cluster count is achievable.
    #[must_use]
    pub fn connected_component_count(&self) -> usize {
        let mut parent: Vec<usize> = (0..self.vertex_count()).collect();

        fn find(parent: &mut [usize], mut node: usize) -> usize {
            while parent[node] != node {
                parent[node] = parent[parent[node]];
                node = parent[node];
            }
            node
        }

        for edge in &self.edges {
            let a = find(&mut parent, edge.left as usize);
            let b = find(&mut parent, edge.right as usize);
            if a != b {
                parent[a] = b;
            }
        }

        let mut roots = std::collections::HashSet::new();
        for v in 0..self.vertex_count() {
            roots.insert(find(&mut parent, v));
        }
        roots.len()
    }
}

/// Incrementally constructs an [`UncertainGraph`], assigning vertex ids in
/// first-seen order and deduplicating undirected edges.
#[derive(Debug, Default)]
pub struct UncertainGraphBuilder {
    ids: std::collections::HashMap<String, VertexId>,
    labels: Vec<String>,
    edges: Vec<Edge>,
    seen_pairs: std::collections::HashSet<(VertexId, VertexId)>,
}

impl UncertainGraphBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `label`, assigning a fresh one in first-seen order
    /// if this is the first time `label` has been mentioned.
    pub fn vertex(&mut self, label: &str) -> VertexId {
        if let Some(&id) = self.ids.get(label) {
            return id;
        }
        let id = u32::try_from(self.labels.len()).expect("vertex count fits in u32");
        self.labels.push(label.to_owned());
        self.ids.insert(label.to_owned(), id);
        id
    }

    /// Adds an edge between `left` and `right` with the given existence
    /// `probability`. Duplicate undirected edges are silently dropped
    /// (first occurrence wins); self-edges are accepted but never affect
    /// connectivity.
    ///
    /// # Errors
    /// Returns an error message if `probability` is not in `(0, 1]`.
    pub fn edge(&mut self, left: VertexId, right: VertexId, probability: f64) -> Result<(), f64> {
        if !(probability > 0.0 && probability <= 1.0) {
            return Err(probability);
        }
        let key = if left <= right {
            (left, right)
        } else {
            (right, left)
        };
        if !self.seen_pairs.insert(key) {
            return Ok(());
        }
        self.edges.push(Edge {
            left,
            right,
            probability,
        });
        Ok(())
    }

    /// Finalises the builder into an [`UncertainGraph`], building the
    /// adjacency index.
    #[must_use]
    pub fn build(self) -> UncertainGraph {
        let mut adjacency = vec![Vec::new(); self.labels.len()];
        for (index, edge) in self.edges.iter().enumerate() {
            let edge_id = u32::try_from(index).expect("edge count fits in u32");
            adjacency[edge.left as usize].push(edge_id);
            if edge.right != edge.left {
                adjacency[edge.right as usize].push(edge_id);
            }
        }
        UncertainGraph {
            labels: self.labels,
            edges: self.edges,
            adjacency,
        }
    }
}
