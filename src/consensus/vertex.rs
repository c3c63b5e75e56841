//! Per-vertex consensus: base and repeat count at each of the k marker
//! positions, from the coverage of all markers in the vertex.
//!
//! Only meaningful when reads are stored in run-length encoded form; the
//! bases of all markers of a vertex are identical by construction (they
//! share a k-mer), so only the repeat counts carry information.

use crate::consensus::caller::ConsensusCaller;
use crate::consensus::coverage::{AlignedBase, Coverage, PositionedCoverageData};
use crate::core::ids::VertexId;
use crate::core::markers::MarkerStore;
use crate::core::reads::{Base, ReadRepresentation, ReadStore};
use crate::graph::marker_graph::MarkerGraph;
use crate::utils::{run_workers, LoadBalancer};
use crate::Result;
use anyhow::ensure;
use tracing::info;

const BATCH: u64 = 100_000;

/// Consensus sequence and repeat counts for one vertex.
pub fn compute_vertex_consensus(
    graph: &MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    vertex_id: VertexId,
    sequence: &mut Vec<Base>,
    repeat_counts: &mut Vec<u32>,
) -> Result<()> {
    compute_vertex_consensus_impl(
        graph,
        reads,
        markers,
        caller,
        vertex_id,
        sequence,
        repeat_counts,
        None,
    )
}

#[allow(clippy::too_many_arguments)]
fn compute_vertex_consensus_impl(
    graph: &MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    vertex_id: VertexId,
    sequence: &mut Vec<Base>,
    repeat_counts: &mut Vec<u32>,
    mut coverage_data: Option<&mut Vec<PositionedCoverageData>>,
) -> Result<()> {
    let vertex_markers = graph.vertex_markers(vertex_id);
    ensure!(!vertex_markers.is_empty(), "vertex {vertex_id} has no markers");
    let k = markers.k();

    let marker_infos: Vec<_> = vertex_markers
        .iter()
        .map(|&marker_id| {
            let (oriented_read, _) = markers.find(marker_id);
            (oriented_read, markers.marker(marker_id).position)
        })
        .collect();

    sequence.clear();
    repeat_counts.clear();
    if let Some(data) = coverage_data.as_deref_mut() {
        data.clear();
    }
    for position in 0..k as u32 {
        let mut coverage = Coverage::new();
        for &(oriented_read, marker_position) in &marker_infos {
            let (base, repeat_count) =
                reads.base_and_repeat_count(oriented_read, marker_position + position);
            coverage.add_read(
                AlignedBase::from_base(base),
                oriented_read.strand(),
                u64::from(repeat_count),
            );
        }

        // All markers share a k-mer, so the bases must agree.
        let data = coverage.read_coverage_data();
        let first = data[0].base;
        ensure!(
            data.iter().all(|d| d.base == first),
            "base disagreement at position {position} of vertex {vertex_id}"
        );

        let consensus = caller.consensus(&coverage);
        ensure!(
            !consensus.base.is_gap(),
            "gap consensus at position {position} of vertex {vertex_id}"
        );
        sequence.push(consensus.base.to_base().unwrap());
        repeat_counts.push(consensus.repeat_count as u32);

        if let Some(out) = coverage_data.as_deref_mut() {
            for compressed in coverage.compress() {
                out.push(PositionedCoverageData {
                    position,
                    data: compressed,
                });
            }
        }
    }
    Ok(())
}

/// Compute consensus repeat counts for every vertex into
/// `MarkerGraphVertexRepeatCounts` (k bytes per vertex).
pub fn assemble_vertices(
    graph: &mut MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    thread_count: usize,
) -> Result<()> {
    ensure!(
        reads.representation() == ReadRepresentation::RunLength,
        "vertex consensus requires run-length encoded reads"
    );
    let vertex_count = graph.vertex_count();
    let k = markers.k();
    info!(vertex_count, "assembling marker graph vertices");

    graph
        .vertex_repeat_counts
        .reserve_and_resize(k * vertex_count as usize)?;

    let repeat_counts_table = &graph.vertex_repeat_counts;
    let graph_ref = &*graph;
    let balancer = LoadBalancer::new(vertex_count, BATCH);
    run_workers(thread_count, |_| {
        let mut sequence = Vec::new();
        let mut repeat_counts = Vec::new();
        while let Some(batch) = balancer.next_batch() {
            for vertex_id in batch {
                compute_vertex_consensus(
                    graph_ref,
                    reads,
                    markers,
                    caller,
                    vertex_id,
                    &mut sequence,
                    &mut repeat_counts,
                )?;
                debug_assert_eq!(repeat_counts.len(), k);
                // Each vertex owns a disjoint k-byte range.
                for (i, &count) in repeat_counts.iter().enumerate() {
                    unsafe {
                        repeat_counts_table
                            .write_shared(vertex_id as usize * k + i, count.min(255) as u8)
                    };
                }
            }
        }
        Ok(())
    })?;
    info!("marker graph vertex consensus complete");
    Ok(())
}

/// Per-vertex coverage data, stored only when requested.
pub fn compute_vertex_coverage_data(
    graph: &MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    vertex_id: VertexId,
    coverage_data: &mut Vec<PositionedCoverageData>,
) -> Result<()> {
    let mut sequence = Vec::new();
    let mut repeat_counts = Vec::new();
    compute_vertex_consensus_impl(
        graph,
        reads,
        markers,
        caller,
        vertex_id,
        &mut sequence,
        &mut repeat_counts,
        Some(coverage_data),
    )
}
