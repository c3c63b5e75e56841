//! Approximate transitive reduction of the marker graph, forward and
//! reverse.
//!
//! Edges are processed in order of increasing coverage. For each candidate
//! edge a bounded BFS over still-strong edges looks for an alternative path;
//! if one exists the edge is redundant and is flagged, together with its
//! reverse complement so the graph stays strand symmetric. Work is halved by
//! only walking the representative of each rc pair (the edge whose id is the
//! smaller); flags are always applied to both.

use crate::core::ids::{EdgeId, VertexId};
use crate::graph::marker_graph::MarkerGraph;
use crate::storage::{MappedVec, RaggedArray};
use crate::Result;
use anyhow::ensure;
use std::collections::VecDeque;
use tracing::info;

/// Forward pass: remove an edge when its target is reachable from its
/// source without it.
pub fn transitive_reduction(
    graph: &mut MarkerGraph,
    low_coverage_threshold: usize,
    high_coverage_threshold: usize,
    max_distance: usize,
    marker_skip_threshold: u32,
) -> Result<()> {
    info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "transitive reduction begins"
    );

    // Start from a clean slate; the later refinement flags are set
    // downstream of this pass.
    for edge in graph.edges.as_mut_slice() {
        edge.set_removed_by_transitive_reduction(false);
        edge.set_pruned(false);
        edge.set_super_bubble_edge(false);
    }

    let edges_by_coverage = gather_edges_by_coverage(graph, |coverage| {
        coverage < high_coverage_threshold
    })?;
    ensure!(
        edges_by_coverage.bucket(0).is_empty(),
        "marker graph contains edges with coverage 0"
    );

    let mut scratch = BfsScratch::create(graph)?;

    // Cull everything at or below the low coverage threshold.
    for coverage in 1..=low_coverage_threshold.min(edges_by_coverage.len() - 1) {
        let bucket = edges_by_coverage.bucket(coverage);
        if !bucket.is_empty() {
            info!(
                coverage,
                flagged = 2 * bucket.len(),
                "flagging low coverage edges as weak"
            );
        }
        for &edge_id in bucket {
            flag_edge_pair(graph, edge_id);
        }
    }

    // Cull coverage-1 edges whose single marker interval skips too far.
    let mut high_skip_count = 0usize;
    if edges_by_coverage.len() > 1 {
        for &edge_id in edges_by_coverage.bucket(1) {
            let intervals = graph.edge_intervals(edge_id);
            if intervals.len() != 1 {
                continue;
            }
            if intervals[0].skip() > marker_skip_threshold
                && !graph.edge(edge_id).was_removed_by_transitive_reduction()
            {
                flag_edge_pair(graph, edge_id);
                high_skip_count += 2;
            }
        }
    }
    info!(
        flagged = high_skip_count,
        marker_skip_threshold, "flagged coverage-1 edges with high marker skip"
    );

    // Intermediate coverage: remove an edge if a bounded BFS finds another
    // path from its source to its target.
    for coverage in low_coverage_threshold + 1..high_coverage_threshold {
        if coverage >= edges_by_coverage.len() {
            break;
        }
        let bucket: Vec<EdgeId> = edges_by_coverage.bucket(coverage).to_vec();
        let mut count = 0usize;
        for edge_id in bucket {
            let edge = graph.edge(edge_id);
            if edge.was_removed_by_transitive_reduction() {
                continue;
            }
            let source = edge.source_id();
            let target = edge.target_id();
            if scratch.reaches(graph, source, target, edge_id, max_distance) {
                flag_edge_pair(graph, edge_id);
                count += 2;
            }
        }
        if count != 0 {
            info!(coverage, flagged = count, "transitive reduction pass");
        }
    }

    scratch.remove()?;
    edges_by_coverage.remove()?;

    let weak = graph.edge_count() - graph.live_edge_count();
    info!(
        removed = weak,
        remaining = graph.live_edge_count(),
        "transitive reduction ends"
    );
    Ok(())
}

/// Reverse pass: remove local back-edges, i.e. edges whose source is
/// reachable from their target. Only the intermediate coverage range is
/// processed.
pub fn reverse_transitive_reduction(
    graph: &mut MarkerGraph,
    low_coverage_threshold: usize,
    high_coverage_threshold: usize,
    max_distance: usize,
) -> Result<()> {
    info!(
        vertices = graph.vertex_count(),
        edges = graph.edge_count(),
        "reverse transitive reduction begins"
    );

    let edges_by_coverage = gather_edges_by_coverage(graph, |coverage| {
        coverage > low_coverage_threshold && coverage < high_coverage_threshold
    })?;
    let mut scratch = BfsScratch::create(graph)?;

    let mut removed_count = 0usize;
    for coverage in low_coverage_threshold + 1..high_coverage_threshold {
        if coverage >= edges_by_coverage.len() {
            break;
        }
        let bucket: Vec<EdgeId> = edges_by_coverage.bucket(coverage).to_vec();
        let mut count = 0usize;
        for edge_id in bucket {
            let edge = graph.edge(edge_id);
            if edge.was_removed_by_transitive_reduction() {
                continue;
            }
            // Walk forward from the target, looking for the source.
            let source = edge.target_id();
            let goal = edge.source_id();
            if scratch.reaches(graph, source, goal, edge_id, max_distance) {
                flag_edge_pair(graph, edge_id);
                count += 2;
            }
        }
        if count != 0 {
            info!(coverage, removed = count, "reverse transitive reduction pass");
        }
        removed_count += count;
    }

    scratch.remove()?;
    edges_by_coverage.remove()?;
    info!(removed = removed_count, "reverse transitive reduction ends");
    Ok(())
}

fn flag_edge_pair(graph: &mut MarkerGraph, edge_id: EdgeId) {
    let rc = graph.rc_edge(edge_id);
    graph.edges[edge_id as usize].set_removed_by_transitive_reduction(true);
    graph.edges[rc as usize].set_removed_by_transitive_reduction(true);
}

/// Bucket representative edges (smaller id of each rc pair) by coverage.
fn gather_edges_by_coverage(
    graph: &MarkerGraph,
    keep: impl Fn(usize) -> bool,
) -> Result<RaggedArray<u64>> {
    let bucket_count = 257usize; // coverage is a saturated u8
    let mut by_coverage: RaggedArray<u64> =
        RaggedArray::create(graph.storage_dir(), "tmp-TransitiveReduction-EdgesByCoverage")?;
    by_coverage.begin_pass1(bucket_count);
    for edge_id in 0..graph.edge_count() {
        if graph.rc_edge(edge_id) < edge_id {
            continue;
        }
        let coverage = graph.edge(edge_id).coverage as usize;
        if keep(coverage) {
            by_coverage.increment_count(coverage);
        }
    }
    by_coverage.begin_pass2()?;
    for edge_id in 0..graph.edge_count() {
        if graph.rc_edge(edge_id) < edge_id {
            continue;
        }
        let coverage = graph.edge(edge_id).coverage as usize;
        if keep(coverage) {
            by_coverage.store(coverage, edge_id);
        }
    }
    by_coverage.end_pass2()?;
    Ok(by_coverage)
}

/// Reusable BFS state: per-vertex distances reset by touching only the
/// vertices each search visited.
struct BfsScratch {
    distances: MappedVec<i32>,
    queue: VecDeque<VertexId>,
    touched: Vec<VertexId>,
}

impl BfsScratch {
    fn create(graph: &MarkerGraph) -> Result<Self> {
        let mut distances: MappedVec<i32> =
            MappedVec::create(graph.storage_dir(), "tmp-TransitiveReduction-VertexDistances")?;
        distances.reserve_and_resize(graph.vertex_count() as usize)?;
        distances.fill(-1);
        Ok(BfsScratch {
            distances,
            queue: VecDeque::new(),
            touched: Vec::new(),
        })
    }

    /// Forward BFS from `start` over strong edges, excluding
    /// `excluded_edge`, up to `max_distance`. True if `goal` is reached.
    fn reaches(
        &mut self,
        graph: &MarkerGraph,
        start: VertexId,
        goal: VertexId,
        excluded_edge: EdgeId,
        max_distance: usize,
    ) -> bool {
        self.queue.push_back(start);
        self.distances[start as usize] = 0;
        self.touched.push(start);
        let mut found = false;

        'search: while let Some(v0) = self.queue.pop_front() {
            let distance1 = self.distances[v0 as usize] + 1;
            for edge_id in graph.out_edges(v0) {
                if edge_id == excluded_edge {
                    continue;
                }
                let edge = graph.edge(edge_id);
                if edge.was_removed_by_transitive_reduction() {
                    continue;
                }
                let v1 = edge.target_id();
                if self.distances[v1 as usize] >= 0 {
                    continue; // already encountered
                }
                if v1 == goal {
                    found = true;
                    break 'search;
                }
                self.distances[v1 as usize] = distance1;
                self.touched.push(v1);
                if (distance1 as usize) < max_distance {
                    self.queue.push_back(v1);
                }
            }
        }

        self.queue.clear();
        for &v in &self.touched {
            self.distances[v as usize] = -1;
        }
        self.touched.clear();
        found
    }

    fn remove(self) -> Result<()> {
        self.distances.remove()
    }
}
