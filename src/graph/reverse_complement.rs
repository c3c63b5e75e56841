//! Reverse-complement maps for vertices and edges, and the strand-symmetry
//! check that every refinement pass must preserve.

use crate::core::ids::{EdgeId, MarkerInterval, VertexId, INVALID_VERTEX_ID};
use crate::core::markers::MarkerStore;
use crate::graph::marker_graph::MarkerGraph;
use crate::utils::{run_workers, LoadBalancer};
use crate::Result;
use anyhow::ensure;
use tracing::info;

const BATCH: u64 = 10_000;

/// Map every vertex to its reverse-complement vertex, via the rc of its
/// first marker, and verify the mapping is a consistent involution.
pub fn find_reverse_complement_vertices(
    graph: &mut MarkerGraph,
    markers: &MarkerStore,
    thread_count: usize,
) -> Result<()> {
    let vertex_count = graph.vertex_count();
    info!(vertex_count, "finding reverse complement vertices");
    graph
        .reverse_complement_vertex
        .reserve_and_resize(vertex_count as usize)?;

    {
        let rc_table = &graph.reverse_complement_vertex;
        let graph_ref = &*graph;
        let balancer = LoadBalancer::new(vertex_count, BATCH);
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for vertex_id in batch {
                    let vertex_markers = graph_ref.vertex_markers(vertex_id);
                    debug_assert!(!vertex_markers.is_empty());
                    let first_rc = markers.reverse_complement(vertex_markers[0]);
                    let rc_vertex = graph_ref.vertex_of_marker(first_rc);
                    ensure!(
                        rc_vertex != INVALID_VERTEX_ID,
                        "reverse complement marker of vertex {vertex_id} has no vertex"
                    );
                    // All markers of the vertex must map to the same rc vertex.
                    for &marker_id in vertex_markers {
                        let marker_rc = markers.reverse_complement(marker_id);
                        ensure!(
                            graph_ref.vertex_of_marker(marker_rc) == rc_vertex,
                            "markers of vertex {vertex_id} disagree on its reverse complement"
                        );
                    }
                    // Writes are disjoint per vertex.
                    unsafe { rc_table.write_shared(vertex_id as usize, rc_vertex) };
                }
            }
            Ok(())
        })?;
    }

    // rc(rc(v)) must be v.
    let balancer = LoadBalancer::new(vertex_count, BATCH);
    let graph_ref = &*graph;
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            for vertex_id in batch {
                let rc = graph_ref.rc_vertex(vertex_id);
                ensure!(
                    graph_ref.rc_vertex(rc) == vertex_id,
                    "reverse complement involution violated at vertex {vertex_id}"
                );
            }
        }
        Ok(())
    })
}

/// Map every edge to its reverse-complement edge by content: among the out
/// edges of `rc(target)` with target `rc(source)`, the one whose reverse
/// complemented marker intervals match exactly. A missing match is fatal.
pub fn find_reverse_complement_edges(
    graph: &mut MarkerGraph,
    markers: &MarkerStore,
    thread_count: usize,
) -> Result<()> {
    let edge_count = graph.edge_count();
    info!(edge_count, "finding reverse complement edges");
    graph
        .reverse_complement_edge
        .reserve_and_resize(edge_count as usize)?;

    {
        let rc_table = &graph.reverse_complement_edge;
        let graph_ref = &*graph;
        let balancer = LoadBalancer::new(edge_count, BATCH);
        run_workers(thread_count, |_| {
            let mut resorted: Vec<MarkerInterval> = Vec::new();
            while let Some(batch) = balancer.next_batch() {
                for edge_id in batch {
                    let rc_edge_id =
                        locate_rc_edge(graph_ref, markers, edge_id, &mut resorted)?;
                    unsafe { rc_table.write_shared(edge_id as usize, rc_edge_id) };
                }
            }
            Ok(())
        })?;
    }

    // rc(rc(e)) must be e.
    let balancer = LoadBalancer::new(edge_count, BATCH);
    let graph_ref = &*graph;
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            for edge_id in batch {
                let rc = graph_ref.rc_edge(edge_id);
                ensure!(
                    graph_ref.rc_edge(rc) == edge_id,
                    "reverse complement edge check failed at edge {edge_id}: \
                     rc {rc}, rc(rc) {}",
                    graph_ref.rc_edge(rc)
                );
            }
        }
        Ok(())
    })
}

fn locate_rc_edge(
    graph: &MarkerGraph,
    markers: &MarkerStore,
    edge_id: EdgeId,
    resorted: &mut Vec<MarkerInterval>,
) -> Result<EdgeId> {
    let edge = graph.edge(edge_id);
    let v0 = edge.source_id();
    let v1 = edge.target_id();
    let v0_rc = graph.rc_vertex(v0);
    let v1_rc = graph.rc_vertex(v1);
    let intervals = graph.edge_intervals(edge_id);

    // Content-based matching is resilient to parallel edges and to vertices
    // with duplicate markers on one oriented read.
    for candidate_id in graph.out_edges(v1_rc) {
        let candidate = graph.edge(candidate_id);
        debug_assert_eq!(candidate.source_id(), v1_rc);
        if candidate.target_id() != v0_rc {
            continue;
        }
        resorted.clear();
        for interval in graph.edge_intervals(candidate_id) {
            let marker_count = markers.count(interval.oriented_read) as u32;
            let flipped = interval.oriented_read.flipped();
            // Mirror the ordinals about the read and swap them, so the
            // interval reads forward on the opposite strand.
            resorted.push(MarkerInterval::new(
                flipped,
                marker_count - 1 - interval.ordinals[1],
                marker_count - 1 - interval.ordinals[0],
            ));
        }
        resorted.sort_unstable();
        if resorted.as_slice() == intervals {
            return Ok(candidate_id);
        }
    }
    anyhow::bail!("unable to locate reverse complement of marker graph edge {edge_id} {v0}->{v1}")
}

/// Assert strand symmetry of the whole graph: involutions, marker-level
/// vertex correspondence, and equal coverage and flags across edge pairs.
pub fn check_strand_symmetry(
    graph: &MarkerGraph,
    markers: &MarkerStore,
    thread_count: usize,
) -> Result<()> {
    let vertex_count = graph.vertex_count();
    let balancer = LoadBalancer::new(vertex_count, BATCH);
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            for v0 in batch {
                let v1 = graph.rc_vertex(v0);
                ensure!(
                    graph.rc_vertex(v1) == v0,
                    "strand symmetry: rc involution violated at vertex {v0}"
                );
                let markers0 = graph.vertex_markers(v0);
                let markers1 = graph.vertex_markers(v1);
                ensure!(
                    markers0.len() == markers1.len(),
                    "strand symmetry: vertices {v0} and {v1} differ in coverage"
                );
                for &marker_id in markers0 {
                    let marker_rc = markers.reverse_complement(marker_id);
                    ensure!(
                        graph.vertex_of_marker(marker_id) == v0
                            && graph.vertex_of_marker(marker_rc) == v1,
                        "strand symmetry: marker {marker_id} of vertex {v0} misassigned"
                    );
                }
            }
        }
        Ok(())
    })?;

    let edge_count = graph.edge_count();
    let balancer = LoadBalancer::new(edge_count, BATCH);
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            for e0 in batch {
                let e1 = graph.rc_edge(e0);
                ensure!(
                    graph.rc_edge(e1) == e0,
                    "strand symmetry: rc involution violated at edge {e0}"
                );
                ensure!(e1 != e0, "strand symmetry: edge {e0} is its own reverse complement");
                let edge0 = graph.edge(e0);
                let edge1 = graph.edge(e1);
                ensure!(
                    edge0.coverage == edge1.coverage,
                    "strand symmetry: edges {e0} and {e1} differ in coverage"
                );
                ensure!(
                    edge0.flag_bits() == edge1.flag_bits(),
                    "strand symmetry: edges {e0} and {e1} differ in flags"
                );
            }
        }
        Ok(())
    })
}
