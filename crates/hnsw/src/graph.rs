//! HNSW graph structure.
//!
//! Node `i` of the graph is internal id `i` of the index's point store, so
//! the graph holds topology only and never vectors.

use needle_core::InternalId;

/// Adjacency of one point across the layers it appears in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HnswNode {
    /// Highest layer this node appears in.
    pub level: usize,

    /// `neighbors[layer]` for `layer` in `0..=level`.
    pub neighbors: Vec<Vec<InternalId>>,
}

impl HnswNode {
    pub fn new(level: usize) -> Self {
        Self {
            level,
            neighbors: vec![Vec::new(); level + 1],
        }
    }

    pub fn neighbors(&self, layer: usize) -> &[InternalId] {
        self.neighbors.get(layer).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Layered adjacency lists plus the entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HnswGraph {
    nodes: Vec<HnswNode>,
    entry_point: Option<InternalId>,
    max_layer: usize,
}

impl HnswGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Reassemble a graph. Callers validate the parts first.
    pub(crate) fn from_parts(
        nodes: Vec<HnswNode>,
        entry_point: Option<InternalId>,
        max_layer: usize,
    ) -> Self {
        Self {
            nodes,
            entry_point,
            max_layer,
        }
    }

    /// Append a node with no edges, returning its id.
    pub fn push_node(&mut self, level: usize) -> InternalId {
        let id = self.nodes.len() as InternalId;
        self.nodes.push(HnswNode::new(level));
        id
    }

    pub fn nodes(&self) -> &[HnswNode] {
        &self.nodes
    }

    pub fn level(&self, id: InternalId) -> usize {
        self.nodes[id as usize].level
    }

    #[inline]
    pub fn neighbors(&self, id: InternalId, layer: usize) -> &[InternalId] {
        self.nodes
            .get(id as usize)
            .map(|n| n.neighbors(layer))
            .unwrap_or(&[])
    }

    pub fn set_neighbors(&mut self, id: InternalId, layer: usize, neighbors: Vec<InternalId>) {
        if let Some(list) = self
            .nodes
            .get_mut(id as usize)
            .and_then(|n| n.neighbors.get_mut(layer))
        {
            *list = neighbors;
        }
    }

    /// Add a directed edge unless it is a self-loop or already present.
    /// Returns the new length of the list.
    pub fn add_neighbor(&mut self, id: InternalId, layer: usize, neighbor: InternalId) -> usize {
        match self
            .nodes
            .get_mut(id as usize)
            .and_then(|n| n.neighbors.get_mut(layer))
        {
            Some(list) => {
                if neighbor != id && !list.contains(&neighbor) {
                    list.push(neighbor);
                }
                list.len()
            }
            None => 0,
        }
    }

    pub fn entry_point(&self) -> Option<InternalId> {
        self.entry_point
    }

    pub fn max_layer(&self) -> usize {
        self.max_layer
    }

    /// Make `id` the entry point and its level the top layer.
    pub fn set_entry_point(&mut self, id: InternalId) {
        self.max_layer = self.level(id);
        self.entry_point = Some(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn stats(&self) -> GraphStats {
        if self.nodes.is_empty() {
            return GraphStats::default();
        }

        let mut edges_per_layer = vec![0; self.max_layer + 1];
        let mut nodes_per_layer = vec![0; self.max_layer + 1];
        for node in &self.nodes {
            for (layer, neighbors) in node.neighbors.iter().enumerate() {
                if layer < edges_per_layer.len() {
                    edges_per_layer[layer] += neighbors.len();
                    nodes_per_layer[layer] += 1;
                }
            }
        }
        let total_edges: usize = edges_per_layer.iter().sum();

        GraphStats {
            num_nodes: self.nodes.len(),
            max_layer: self.max_layer,
            total_edges,
            avg_degree_layer0: edges_per_layer[0] as f64 / self.nodes.len() as f64,
            nodes_per_layer,
            edges_per_layer,
        }
    }
}

/// Graph statistics. Edges are directed, so a mutual link counts twice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphStats {
    pub num_nodes: usize,
    pub max_layer: usize,
    pub total_edges: usize,
    pub avg_degree_layer0: f64,
    pub nodes_per_layer: Vec<usize>,
    pub edges_per_layer: Vec<usize>,
}
