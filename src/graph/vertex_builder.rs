//! Vertex formation: massively parallel union-find over aligned marker
//! pairs, followed by coverage gating, bad-set filtering, and renumbering.
//!
//! Read-graph edges come in reverse-complement pairs and are processed as a
//! unit: every `unite(a, b)` is paired with `unite(rc(a), rc(b))`, so the
//! resulting disjoint sets come in rc pairs (or are self-rc) and the marker
//! graph stays invariant under strand swap.

use crate::config::MarkerGraphConfig;
use crate::core::alignments::AlignmentStore;
use crate::core::ids::{Uint40, INVALID_VERTEX_ID};
use crate::core::markers::MarkerStore;
use crate::core::reads::ReadStore;
use crate::graph::disjoint_sets::DisjointSets;
use crate::graph::marker_graph::MarkerGraph;
use crate::storage::{MappedVec, RaggedArray};
use crate::utils::{find_coverage_cutoff, resolve_thread_count, run_workers, LoadBalancer};
use crate::Result;
use anyhow::{bail, ensure};
use std::io::Write;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

/// Fatal cap on disjoint-set convergence passes. Convergence normally takes
/// two or three passes even on wide machines.
const MAX_CONVERGENCE_PASSES: u64 = 10;

/// Fallback when automatic min-coverage selection finds no usable cutoff.
const MIN_COVERAGE_FALLBACK: usize = 5;

const UNITE_BATCH: u64 = 10_000;
const SCAN_BATCH: u64 = 10_000;

/// What vertex formation decided and produced, for reporting.
#[derive(Debug, Clone, Copy)]
pub struct VertexBuildOutcome {
    pub min_coverage_used: usize,
    pub vertex_count: u64,
    pub bad_set_count: u64,
}

pub fn create_vertices(
    graph: &mut MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    alignments: &AlignmentStore,
    config: &MarkerGraphConfig,
) -> Result<VertexBuildOutcome> {
    config.validate()?;
    let thread_count = resolve_thread_count(config.thread_count);
    let marker_count = markers.total_count();
    info!(
        marker_count,
        thread_count, "begin computing marker graph vertices"
    );

    // The disjoint-set buffer: 128 bits per marker while uniting, compacted
    // to 64 afterwards.
    let mut disjoint_set_table: MappedVec<u64> =
        MappedVec::create(graph.storage_dir(), "tmp-DisjointSetTable")?;
    disjoint_set_table.reserve_and_resize(2 * marker_count as usize)?;

    {
        let sets = DisjointSets::new(disjoint_set_table.as_atomic_slice(), marker_count);

        unite_aligned_markers(&sets, reads, markers, alignments, thread_count)?;
        converge_and_verify(&sets, marker_count, thread_count)?;
    }

    // Only the parent halves are needed from here on; compact 2N -> N.
    disjoint_set_table.compact_pairs()?;
    info!("disjoint set table compacted");

    // Count the markers in each disjoint set.
    let mut work_area: MappedVec<u64> = MappedVec::create(graph.storage_dir(), "tmp-WorkArea")?;
    work_area.reserve_and_resize(marker_count as usize)?;
    work_area.fill(0);
    {
        let counts = work_area.as_atomic_slice();
        let table = disjoint_set_table.as_slice();
        let balancer = LoadBalancer::new(marker_count, SCAN_BATCH);
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for marker_id in batch {
                    let set = table[marker_id as usize];
                    counts[set as usize].fetch_add(1, Ordering::Relaxed);
                }
            }
            Ok(())
        })?;
    }

    // Histogram of set sizes; drives automatic min-coverage selection.
    let mut histogram: Vec<u64> = Vec::new();
    for &size in work_area.iter() {
        if size == 0 {
            continue;
        }
        if size as usize >= histogram.len() {
            histogram.resize(size as usize + 1, 0);
        }
        histogram[size as usize] += 1;
    }
    if config.debug_output {
        write_histogram_csv(graph, &histogram)?;
    }

    let min_coverage = if config.min_coverage == 0 {
        match find_coverage_cutoff(
            &histogram,
            config.peak_finder_min_area_fraction,
            config.peak_finder_area_start_index,
        ) {
            Ok(cutoff) => {
                info!(cutoff, "automatically selected min vertex coverage");
                cutoff
            }
            Err(error) => {
                warn!(
                    %error,
                    fallback = MIN_COVERAGE_FALLBACK,
                    "unable to select min vertex coverage from the disjoint set size \
                     distribution, using fallback"
                );
                MIN_COVERAGE_FALLBACK
            }
        }
    } else {
        config.min_coverage
    };

    // First renumbering: dense ids for sets whose size is in range. Not yet
    // the final vertex numbering; bad sets are removed below.
    let mut set_count = 0u64;
    for slot in work_area.as_mut_slice() {
        let size = *slot as usize;
        if size < min_coverage || size > config.max_coverage {
            *slot = INVALID_VERTEX_ID;
        } else {
            *slot = set_count;
            set_count += 1;
        }
    }
    info!(
        set_count,
        min_coverage, "kept disjoint sets with coverage in the requested range"
    );

    // Reassign markers to the renumbered sets.
    for marker_id in 0..marker_count as usize {
        let old = disjoint_set_table[marker_id];
        disjoint_set_table[marker_id] = work_area[old as usize];
    }
    work_area.remove()?;

    // Gather the markers of each disjoint set, then sort each bucket so
    // markers of one set are ordered by (oriented read, ordinal).
    let mut set_markers: RaggedArray<u64> =
        RaggedArray::create(graph.storage_dir(), "tmp-DisjointSetMarkers")?;
    set_markers.begin_pass1(set_count as usize);
    {
        let table = disjoint_set_table.as_slice();
        let balancer = LoadBalancer::new(marker_count, SCAN_BATCH);
        let set_markers = &set_markers;
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for marker_id in batch {
                    let set = table[marker_id as usize];
                    if set != INVALID_VERTEX_ID {
                        set_markers.increment_count_multithreaded(set as usize);
                    }
                }
            }
            Ok(())
        })?;
    }
    set_markers.begin_pass2()?;
    {
        let table = disjoint_set_table.as_slice();
        let balancer = LoadBalancer::new(marker_count, SCAN_BATCH);
        let set_markers = &set_markers;
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for marker_id in batch {
                    let set = table[marker_id as usize];
                    if set != INVALID_VERTEX_ID {
                        set_markers.store_multithreaded(set as usize, marker_id);
                    }
                }
            }
            Ok(())
        })?;
    }
    set_markers.end_pass2()?;
    {
        let balancer = LoadBalancer::new(set_count, SCAN_BATCH);
        let set_markers = &set_markers;
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for set in batch {
                    // Buckets are disjoint across threads.
                    let bucket = unsafe { set_markers.bucket_mut_unsynchronized(set as usize) };
                    bucket.sort_unstable();
                }
            }
            Ok(())
        })?;
    }

    // Flag bad sets: duplicate read among consecutive sorted markers (unless
    // duplicates are allowed), or insufficient coverage on either strand.
    let mut is_bad: MappedVec<u8> = MappedVec::create(graph.storage_dir(), "tmp-IsBadDisjointSet")?;
    is_bad.reserve_and_resize(set_count as usize)?;
    {
        let balancer = LoadBalancer::new(set_count, SCAN_BATCH);
        let is_bad = &is_bad;
        let set_markers = &set_markers;
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for set in batch {
                    let bucket = set_markers.bucket(set as usize);
                    let bad = is_bad_set(bucket, markers, config);
                    unsafe { is_bad.write_shared(set as usize, u8::from(bad)) };
                }
            }
            Ok(())
        })?;
    }
    let bad_set_count = is_bad.iter().filter(|&&b| b != 0).count() as u64;
    info!(
        bad_set_count,
        min_coverage_per_strand = config.min_coverage_per_strand,
        "flagged bad disjoint sets"
    );

    // Final renumbering, skipping the bad sets.
    let mut final_ids: MappedVec<u64> = MappedVec::create(graph.storage_dir(), "tmp-WorkArea")?;
    final_ids.reserve_and_resize(set_count as usize)?;
    let mut vertex_count = 0u64;
    for set in 0..set_count as usize {
        if is_bad[set] != 0 {
            final_ids[set] = INVALID_VERTEX_ID;
        } else {
            final_ids[set] = vertex_count;
            vertex_count += 1;
        }
    }
    ensure!(
        vertex_count + bad_set_count == set_count,
        "final renumbering lost disjoint sets"
    );

    // The final set id of each marker becomes its vertex id.
    graph
        .vertex_table
        .reserve_and_resize(marker_count as usize)?;
    for marker_id in 0..marker_count as usize {
        let set = disjoint_set_table[marker_id];
        graph.vertex_table[marker_id] = if set == INVALID_VERTEX_ID {
            Uint40::INVALID
        } else {
            Uint40::new(final_ids[set as usize])
        };
    }
    final_ids.remove()?;
    disjoint_set_table.remove()?;

    // Store the surviving sets as the marker graph vertices.
    for set in 0..set_count as usize {
        if is_bad[set] != 0 {
            continue;
        }
        graph.vertices.append_vector();
        for &marker_id in set_markers.bucket(set) {
            graph.vertices.append(marker_id)?;
        }
    }
    graph.vertices.unreserve()?;
    is_bad.remove()?;
    set_markers.remove()?;

    info!(vertex_count, "marker graph vertices computed");
    Ok(VertexBuildOutcome {
        min_coverage_used: min_coverage,
        vertex_count,
        bad_set_count,
    })
}

/// Phase 1: merge aligned marker pairs, and their reverse complements, for
/// every retained alignment in the read graph.
fn unite_aligned_markers(
    sets: &DisjointSets,
    reads: &ReadStore,
    markers: &MarkerStore,
    alignments: &AlignmentStore,
    thread_count: usize,
) -> Result<()> {
    let edges = alignments.read_graph_edges();
    ensure!(
        edges.len() % 2 == 0,
        "read graph edges must come in reverse-complement pairs"
    );
    info!(read_graph_edges = edges.len(), "disjoint set computation begins");

    let balancer = LoadBalancer::new(edges.len() as u64, UNITE_BATCH);
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            // Pairs are never split across batches.
            debug_assert!(batch.start % 2 == 0 && batch.end % 2 == 0);
            let mut i = batch.start as usize;
            while i != batch.end as usize {
                let edge = &edges[i];
                let next = &edges[i + 1];
                i += 2;

                // The odd edge must be the strand-flipped copy of the even one.
                ensure!(
                    next.oriented_reads[0].flipped() == edge.oriented_reads[0]
                        && next.oriented_reads[1].flipped() == edge.oriented_reads[1],
                    "read graph edge {} is not the reverse complement of its partner",
                    i - 1
                );

                if edge.crosses_strands || edge.has_inconsistent_alignment {
                    continue;
                }
                let [o0, o1] = edge.oriented_reads;
                ensure!(o0 < o1, "read graph edge endpoints out of order");
                if reads.flags(o0.read_id()).is_chimeric || reads.flags(o1.read_id()).is_chimeric {
                    continue;
                }

                let ordinal_pairs = alignments.decompress(edge.alignment_id)?;
                for [ordinal0, ordinal1] in ordinal_pairs {
                    let marker0 = markers.marker_id(o0, ordinal0);
                    let marker1 = markers.marker_id(o1, ordinal1);
                    ensure!(
                        markers.marker(marker0).kmer_id == markers.marker(marker1).kmer_id,
                        "alignment {} pairs markers {marker0} and {marker1} with different k-mers",
                        edge.alignment_id
                    );
                    sets.unite(marker0, marker1);
                    // Also merge the reverse complemented markers, keeping
                    // the graph invariant under strand swap.
                    sets.unite(
                        markers.reverse_complement(marker0),
                        markers.reverse_complement(marker1),
                    );
                }
            }
        }
        Ok(())
    })
}

/// Phase 2: compress parent chains until a full pass changes nothing, then
/// verify that every parent is a root.
fn converge_and_verify(sets: &DisjointSets, marker_count: u64, thread_count: usize) -> Result<()> {
    let mut pass = 1u64;
    loop {
        sets.reset_update_counter();
        let balancer = LoadBalancer::new(marker_count, SCAN_BATCH);
        run_workers(thread_count, |_| {
            while let Some(batch) = balancer.next_batch() {
                for marker_id in batch {
                    sets.find_and_compress(marker_id);
                }
            }
            Ok(())
        })?;
        let updated = sets.updates_since_reset();
        info!(pass, updated, "disjoint set convergence pass");
        if updated == 0 {
            break;
        }
        pass += 1;
        if pass > MAX_CONVERGENCE_PASSES {
            // Convergence takes 2-3 passes even with 128 threads; not
            // converging indicates an algorithmic error.
            bail!(
                "disjoint set parent information did not converge in {MAX_CONVERGENCE_PASSES} passes"
            );
        }
    }

    let balancer = LoadBalancer::new(marker_count, SCAN_BATCH);
    run_workers(thread_count, |_| {
        while let Some(batch) = balancer.next_batch() {
            for marker_id in batch {
                ensure!(
                    sets.parent(marker_id) == sets.find(marker_id),
                    "disjoint set parent of marker {marker_id} is not its root after convergence"
                );
            }
        }
        Ok(())
    })
}

/// A set is bad when it has two markers on the same read (and duplicates are
/// not allowed) or too few markers on either strand. The bucket is sorted,
/// so same-read markers are consecutive.
fn is_bad_set(bucket: &[u64], markers: &MarkerStore, config: &MarkerGraphConfig) -> bool {
    debug_assert!(!bucket.is_empty());
    if bucket.len() == 1 {
        return config.min_coverage_per_strand > 1;
    }
    let mut count_by_strand = [0u64; 2];
    let mut previous_read_id = None;
    for &marker_id in bucket {
        let (oriented_read, _) = markers.find(marker_id);
        count_by_strand[oriented_read.strand() as usize] += 1;
        if !config.allow_duplicate_markers {
            if previous_read_id == Some(oriented_read.read_id()) {
                return true;
            }
            previous_read_id = Some(oriented_read.read_id());
        }
    }
    count_by_strand[0] < config.min_coverage_per_strand as u64
        || count_by_strand[1] < config.min_coverage_per_strand as u64
}

fn write_histogram_csv(graph: &MarkerGraph, histogram: &[u64]) -> Result<()> {
    let path = graph.storage_dir().join("DisjointSetsHistogram.csv");
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "Coverage,Frequency")?;
    for (coverage, &frequency) in histogram.iter().enumerate() {
        if frequency != 0 {
            writeln!(file, "{coverage},{frequency}")?;
        }
    }
    Ok(())
}
