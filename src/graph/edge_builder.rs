//! Edge formation: transitions between successive vertex-assigned markers
//! within each oriented read, grouped per source/target vertex pair.

use crate::core::ids::{MarkerInterval, Uint40, VertexId, INVALID_VERTEX_ID};
use crate::core::markers::MarkerStore;
use crate::graph::marker_graph::{Edge, MarkerGraph};
use crate::utils::{run_workers, LoadBalancer};
use crate::Result;
use anyhow::ensure;
use parking_lot::Mutex;
use tracing::info;

const EMIT_BATCH: u64 = 100;
const ADJACENCY_BATCH: u64 = 100_000;

#[derive(Default)]
struct ThreadEdges {
    edges: Vec<Edge>,
    intervals: Vec<Vec<MarkerInterval>>,
}

/// Build `edges`, `edge_marker_intervals`, and the source/target adjacency
/// tables. Requires the vertex table and vertices.
pub fn create_edges(
    graph: &mut MarkerGraph,
    markers: &MarkerStore,
    thread_count: usize,
) -> Result<()> {
    let vertex_count = graph.vertex_count();
    info!(vertex_count, "creating marker graph edges");

    // Each thread stores the edges it finds separately; they are
    // concatenated in thread order afterwards.
    let outputs: Vec<Mutex<ThreadEdges>> =
        (0..thread_count).map(|_| Mutex::new(ThreadEdges::default())).collect();
    {
        let balancer = LoadBalancer::new(vertex_count, EMIT_BATCH);
        let graph = &*graph;
        run_workers(thread_count, |thread_id| {
            let mut output = outputs[thread_id].lock();
            let mut work_area: Vec<(VertexId, MarkerInterval)> = Vec::new();
            while let Some(batch) = balancer.next_batch() {
                for vertex0 in batch {
                    emit_vertex_edges(graph, markers, vertex0, &mut work_area, &mut output);
                }
            }
            Ok(())
        })?;
    }

    for output in outputs {
        let output = output.into_inner();
        debug_assert_eq!(output.edges.len(), output.intervals.len());
        for (edge, intervals) in output.edges.into_iter().zip(output.intervals) {
            graph.edges.push(edge)?;
            graph.edge_marker_intervals.append_vector();
            for interval in intervals {
                graph.edge_marker_intervals.append(interval)?;
            }
        }
    }
    graph.edges.unreserve()?;
    graph.edge_marker_intervals.unreserve()?;
    ensure!(
        graph.edges.len() == graph.edge_marker_intervals.len(),
        "edge and marker interval tables disagree"
    );
    info!(
        edge_count = graph.edges.len(),
        vertex_count, "marker graph edges created"
    );

    create_adjacency(graph, thread_count)
}

/// Scan forward from every marker of `vertex0` to the first marker assigned
/// to a vertex; each maximal run of candidates with the same target becomes
/// one edge.
fn emit_vertex_edges(
    graph: &MarkerGraph,
    markers: &MarkerStore,
    vertex0: VertexId,
    work_area: &mut Vec<(VertexId, MarkerInterval)>,
    output: &mut ThreadEdges,
) {
    work_area.clear();
    for &marker_id in graph.vertex_markers(vertex0) {
        let (oriented_read, ordinal0) = markers.find(marker_id);
        let marker_count = markers.count(oriented_read) as u32;
        for ordinal1 in ordinal0 + 1..marker_count {
            let child = graph.vertex_of_marker(markers.marker_id(oriented_read, ordinal1));
            if child != INVALID_VERTEX_ID {
                work_area.push((
                    child,
                    MarkerInterval::new(oriented_read, ordinal0, ordinal1),
                ));
                break;
            }
        }
    }
    work_area.sort_unstable();

    let mut begin = 0;
    while begin != work_area.len() {
        let target = work_area[begin].0;
        let mut end = begin + 1;
        while end != work_area.len() && work_area[end].0 == target {
            end += 1;
        }
        output.edges.push(Edge::new(vertex0, target, end - begin));
        output
            .intervals
            .push(work_area[begin..end].iter().map(|&(_, m)| m).collect());
        begin = end;
    }
}

/// Count-then-store bucketing of edge ids by source and by target.
fn create_adjacency(graph: &mut MarkerGraph, thread_count: usize) -> Result<()> {
    let vertex_count = graph.vertex_count() as usize;
    let edge_count = graph.edges.len() as u64;

    graph.edges_by_source.begin_pass1(vertex_count);
    graph.edges_by_target.begin_pass1(vertex_count);
    {
        let edges = graph.edges.as_slice();
        let by_source = &graph.edges_by_source;
        let by_target = &graph.edges_by_target;
        let balancer = LoadBalancer::new(edge_count, ADJACENCY_BATCH);
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for edge_id in batch {
                    let edge = &edges[edge_id as usize];
                    by_source.increment_count_multithreaded(edge.source_id() as usize);
                    by_target.increment_count_multithreaded(edge.target_id() as usize);
                }
            }
            Ok(())
        })?;
    }
    graph.edges_by_source.begin_pass2()?;
    graph.edges_by_target.begin_pass2()?;
    {
        let edges = graph.edges.as_slice();
        let by_source = &graph.edges_by_source;
        let by_target = &graph.edges_by_target;
        let balancer = LoadBalancer::new(edge_count, ADJACENCY_BATCH);
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for edge_id in batch {
                    let edge = &edges[edge_id as usize];
                    by_source.store_multithreaded(edge.source_id() as usize, Uint40::new(edge_id));
                    by_target.store_multithreaded(edge.target_id() as usize, Uint40::new(edge_id));
                }
            }
            Ok(())
        })?;
    }
    graph.edges_by_source.end_pass2()?;
    graph.edges_by_target.end_pass2()
}
