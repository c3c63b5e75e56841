//! Temporary assembly graph used during bubble and super-bubble removal.
//!
//! Linear chains of live marker-graph edges are collapsed into single
//! edges carrying the chain's marker-edge list and its average coverage.
//! The graph is rebuilt from scratch for each simplification iteration and
//! dropped afterwards; it never owns persistent storage.

use crate::core::ids::{EdgeId, VertexId};
use crate::graph::marker_graph::MarkerGraph;
use ahash::AHashMap;

/// An assembly-graph edge: one linear chain of marker-graph edges.
#[derive(Debug, Clone)]
pub struct AssemblyEdge {
    pub source: usize,
    pub target: usize,
    pub average_coverage: u32,
    /// The marker-graph edges of the chain, in path order.
    pub marker_edges: Vec<EdgeId>,
}

impl AssemblyEdge {
    /// Chain length in marker-graph edges.
    pub fn len(&self) -> usize {
        self.marker_edges.len()
    }
}

pub struct AssemblyGraph {
    /// Marker-graph vertex of each assembly-graph vertex.
    pub vertices: Vec<VertexId>,
    pub edges: Vec<AssemblyEdge>,
    pub edges_by_source: Vec<Vec<usize>>,
    pub edges_by_target: Vec<Vec<usize>>,
    pub reverse_complement_vertex: Vec<usize>,
    pub reverse_complement_edge: Vec<usize>,
}

impl AssemblyGraph {
    /// Collapse the live subgraph (edges with `was_removed()` false) of the
    /// marker graph into linear chains.
    pub fn build(graph: &MarkerGraph) -> Self {
        let vertex_count = graph.vertex_count() as usize;
        let edge_count = graph.edge_count() as usize;

        // Degrees in the live subgraph decide where chains break.
        let mut in_degree = vec![0u32; vertex_count];
        let mut out_degree = vec![0u32; vertex_count];
        for edge in graph.edges.iter() {
            if edge.was_removed() {
                continue;
            }
            out_degree[edge.source_id() as usize] += 1;
            in_degree[edge.target_id() as usize] += 1;
        }
        let is_chain_internal =
            |v: VertexId| in_degree[v as usize] == 1 && out_degree[v as usize] == 1;

        let live_in_edge = |v: VertexId| {
            graph
                .in_edges(v)
                .find(|&e| !graph.edge(e).was_removed())
                .expect("vertex with in-degree 1 has a live in-edge")
        };
        let live_out_edge = |v: VertexId| {
            graph
                .out_edges(v)
                .find(|&e| !graph.edge(e).was_removed())
                .expect("vertex with out-degree 1 has a live out-edge")
        };

        let unassigned = usize::MAX;
        let mut chain_of_edge = vec![unassigned; edge_count];
        let mut vertex_map: AHashMap<VertexId, usize> = AHashMap::new();
        let mut vertices: Vec<VertexId> = Vec::new();
        let mut edges: Vec<AssemblyEdge> = Vec::new();

        let mut assembly_vertex = |marker_vertex: VertexId,
                                   vertices: &mut Vec<VertexId>|
         -> usize {
            *vertex_map.entry(marker_vertex).or_insert_with(|| {
                vertices.push(marker_vertex);
                vertices.len() - 1
            })
        };

        for start in 0..edge_count as u64 {
            if graph.edge(start).was_removed() || chain_of_edge[start as usize] != unassigned {
                continue;
            }

            // Walk back to the first edge of the chain, guarding against
            // closed loops.
            let mut first = start;
            loop {
                let v = graph.edge(first).source_id();
                if !is_chain_internal(v) {
                    break;
                }
                let previous = live_in_edge(v);
                if previous == start {
                    break; // closed a cycle
                }
                first = previous;
            }

            // Walk forward collecting the chain.
            let mut chain = vec![first];
            let mut current = first;
            loop {
                let v = graph.edge(current).target_id();
                if !is_chain_internal(v) {
                    break;
                }
                let next = live_out_edge(v);
                if next == first {
                    break; // cycle closure
                }
                chain.push(next);
                current = next;
            }

            let chain_id = edges.len();
            let mut coverage_sum = 0u64;
            for &edge_id in &chain {
                chain_of_edge[edge_id as usize] = chain_id;
                coverage_sum += u64::from(graph.edge(edge_id).coverage);
            }
            let source = assembly_vertex(graph.edge(first).source_id(), &mut vertices);
            let target = assembly_vertex(graph.edge(current).target_id(), &mut vertices);
            edges.push(AssemblyEdge {
                source,
                target,
                average_coverage: (coverage_sum / chain.len() as u64) as u32,
                marker_edges: chain,
            });
        }

        // Adjacency.
        let mut edges_by_source = vec![Vec::new(); vertices.len()];
        let mut edges_by_target = vec![Vec::new(); vertices.len()];
        for (edge_id, edge) in edges.iter().enumerate() {
            edges_by_source[edge.source].push(edge_id);
            edges_by_target[edge.target].push(edge_id);
        }

        // Reverse complement maps, inherited from the marker graph. Strand
        // symmetry of the live flags guarantees both lookups succeed.
        let reverse_complement_vertex: Vec<usize> = vertices
            .iter()
            .map(|&marker_vertex| vertex_map[&graph.rc_vertex(marker_vertex)])
            .collect();
        let reverse_complement_edge: Vec<usize> = edges
            .iter()
            .map(|edge| {
                let last = *edge.marker_edges.last().unwrap();
                chain_of_edge[graph.rc_edge(last) as usize]
            })
            .collect();

        AssemblyGraph {
            vertices,
            edges,
            edges_by_source,
            edges_by_target,
            reverse_complement_vertex,
            reverse_complement_edge,
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }
}
