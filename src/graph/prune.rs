//! Leaf pruning of the strong subgraph.
//!
//! The strong subgraph consists of edges with neither the transitive
//! reduction flag nor the pruned flag set. Each iteration marks every edge
//! hanging off a leaf; flag application is deferred to the end of the
//! iteration so that all leaves at the same depth are pruned together.

use crate::core::ids::VertexId;
use crate::graph::marker_graph::MarkerGraph;
use crate::storage::MappedVec;
use crate::Result;
use tracing::info;

pub fn prune_strong_subgraph(graph: &mut MarkerGraph, iteration_count: usize) -> Result<()> {
    let edge_count = graph.edge_count() as usize;

    let mut to_prune: MappedVec<u8> = MappedVec::create(graph.storage_dir(), "tmp-PruneFlags")?;
    to_prune.reserve_and_resize(edge_count)?;
    to_prune.fill(0);

    for edge in graph.edges.as_mut_slice() {
        edge.set_pruned(false);
    }

    for iteration in 0..iteration_count {
        // Find the edges to prune in this layer.
        for edge_id in 0..edge_count {
            let edge = graph.edge(edge_id as u64);
            if edge.was_removed_by_transitive_reduction() || edge.was_pruned() {
                continue;
            }
            if is_forward_leaf(graph, edge.target_id()) || is_backward_leaf(graph, edge.source_id())
            {
                to_prune[edge_id] = 1;
            }
        }

        // Apply the flags found in this iteration.
        let mut count = 0usize;
        for edge_id in 0..edge_count {
            if to_prune[edge_id] != 0 {
                graph.edges[edge_id].set_pruned(true);
                to_prune[edge_id] = 0; // for the next iteration
                count += 1;
            }
        }
        info!(iteration, pruned = count, "prune iteration");
    }

    to_prune.remove()?;

    let surviving = graph
        .edges
        .iter()
        .filter(|e| !e.was_removed_by_transitive_reduction() && !e.was_pruned())
        .count();
    info!(
        edges = edge_count,
        surviving, "leaf pruning of the strong subgraph complete"
    );
    Ok(())
}

/// A forward leaf has no strong outgoing edge.
fn is_forward_leaf(graph: &MarkerGraph, vertex_id: VertexId) -> bool {
    !graph.out_edges(vertex_id).any(|e| {
        let edge = graph.edge(e);
        !edge.was_removed_by_transitive_reduction() && !edge.was_pruned()
    })
}

/// A backward leaf has no strong incoming edge.
fn is_backward_leaf(graph: &MarkerGraph, vertex_id: VertexId) -> bool {
    !graph.in_edges(vertex_id).any(|e| {
        let edge = graph.edge(e);
        !edge.was_removed_by_transitive_reduction() && !edge.was_pruned()
    })
}
