//! Per-edge consensus: the sequence between the two flanking markers of an
//! edge, from a multiple sequence alignment of its marker intervals.
//!
//! Pathological edges (very long marker intervals) short-circuit to the
//! sequence of the shortest interval; the aligner would otherwise be
//! prohibitive in memory and compute. Otherwise an assembly mode is picked
//! by majority: mode 1 when most intervals have adjacent or overlapping
//! markers (the consensus is empty and only an overlap count is produced),
//! mode 2 when most have intervening sequence (the sequences go through the
//! partial-order aligner and a consensus is called per alignment column).

use crate::config::ConsensusConfig;
use crate::consensus::caller::ConsensusCaller;
use crate::consensus::coverage::{AlignedBase, Coverage, PositionedCoverageData};
use crate::consensus::poa::{MsaEngine, MsaEngineFactory};
use crate::core::ids::EdgeId;
use crate::core::markers::MarkerStore;
use crate::core::reads::{Base, ReadRepresentation, ReadStore};
use crate::graph::marker_graph::{ConsensusBase, MarkerGraph};
use crate::utils::{run_workers, LoadBalancer};
use crate::Result;
use anyhow::ensure;
use parking_lot::Mutex;
use tracing::{error, info};

const EDGE_CONSENSUS_BATCH: u64 = 10;

/// Serializes aligner failure reports across worker threads.
static ALIGNER_FAILURE_LOG: Mutex<()> = Mutex::new(());

/// Debug and visualization detail of one edge consensus computation.
#[derive(Default, Debug)]
pub struct EdgeConsensusDetail {
    pub has_long_marker_interval: bool,
    /// Index of the shortest marker interval; meaningful for the
    /// short-circuit path.
    pub shortest_interval_index: usize,
    /// 1 or 2 after a non-short-circuit computation.
    pub assembly_mode: u8,
    /// For each distinct sequence, the marker interval indexes carrying it.
    pub distinct_sequence_occurrences: Vec<Vec<usize>>,
    /// Alignment row of each marker interval, -1 for discarded intervals.
    pub alignment_row: Vec<i32>,
    pub msa: Vec<String>,
    pub aligned_consensus: Vec<AlignedBase>,
    pub aligned_repeat_counts: Vec<u8>,
}

/// Consensus sequence, repeat counts, and overlapping base count for one
/// edge. Aligner failures are logged with the edge id and propagated.
#[allow(clippy::too_many_arguments)]
pub fn compute_edge_consensus(
    graph: &MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    engine: &mut dyn MsaEngine,
    edge_id: EdgeId,
    config: &ConsensusConfig,
    sequence: &mut Vec<Base>,
    repeat_counts: &mut Vec<u32>,
    overlapping_base_count: &mut u8,
    detail: &mut EdgeConsensusDetail,
    mut coverage_data: Option<&mut Vec<PositionedCoverageData>>,
) -> Result<()> {
    let k = markers.k() as u32;
    let intervals = graph.edge_intervals(edge_id);
    let interval_count = intervals.len();
    ensure!(interval_count > 0, "edge {edge_id} has no marker intervals");

    let rle = reads.representation() == ReadRepresentation::RunLength;

    sequence.clear();
    repeat_counts.clear();
    *overlapping_base_count = 0;
    *detail = EdgeConsensusDetail::default();
    if let Some(data) = coverage_data.as_deref_mut() {
        data.clear();
    }

    // Marker positions of every interval, fetched once.
    let positions: Vec<(u32, u32)> = intervals
        .iter()
        .map(|interval| {
            let list = markers.markers(interval.oriented_read);
            (
                list[interval.ordinals[0] as usize].position,
                list[interval.ordinals[1] as usize].position,
            )
        })
        .collect();

    // Detect pathological intervals: too many markers skipped, or too much
    // sequence between the flanking markers.
    for (i, interval) in intervals.iter().enumerate() {
        let (position0, position1) = positions[i];
        if interval.skip() > config.edge_length_threshold
            || position1 - position0 > config.long_interval_base_threshold
        {
            detail.has_long_marker_interval = true;
            break;
        }
    }

    if detail.has_long_marker_interval {
        // The consensus becomes the sequence of the shortest interval.
        let shortest = intervals
            .iter()
            .enumerate()
            .min_by_key(|(_, interval)| interval.skip())
            .map(|(i, _)| i)
            .unwrap();
        detail.shortest_interval_index = shortest;
        let interval = &intervals[shortest];
        let (position0, position1) = positions[shortest];

        if position1 > position0 + k {
            for position in position0 + k..position1 {
                if rle {
                    let (base, repeat_count) =
                        reads.base_and_repeat_count(interval.oriented_read, position);
                    sequence.push(base);
                    repeat_counts.push(u32::from(repeat_count));
                    if let Some(out) = coverage_data.as_deref_mut() {
                        let mut coverage = Coverage::new();
                        coverage.add_read(
                            AlignedBase::from_base(base),
                            interval.oriented_read.strand(),
                            u64::from(repeat_count),
                        );
                        for compressed in coverage.compress() {
                            out.push(PositionedCoverageData {
                                position: position - (position0 + k),
                                data: compressed,
                            });
                        }
                    }
                } else {
                    sequence.push(reads.base(interval.oriented_read, position));
                }
            }
            *overlapping_base_count = 0;
        } else {
            *overlapping_base_count = (position0 + k - position1).min(255) as u8;
        }
        return Ok(());
    }

    // Pick the assembly mode by majority of marker offsets.
    let mode1_count = positions.iter().filter(|&&(p0, p1)| p1 - p0 <= k).count();
    let mode2_count = interval_count - mode1_count;

    if mode1_count >= mode2_count {
        // Mode 1: markers adjacent or overlapping. The consensus sequence is
        // empty; report the overlap implied by the most frequent offset.
        detail.assembly_mode = 1;
        let mut offset_histogram = vec![0u32; k as usize + 1];
        for &(position0, position1) in &positions {
            let offset = position1 - position0;
            if offset <= k {
                offset_histogram[offset as usize] += 1;
            }
        }
        let best_offset = offset_histogram
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.cmp(b.1).then(b.0.cmp(&a.0)))
            .map(|(offset, _)| offset as u32)
            .unwrap();
        *overlapping_base_count = (k - best_offset) as u8;
        return Ok(());
    }

    // Mode 2: align the distinct intervening sequences.
    detail.assembly_mode = 2;

    let mut distinct_sequences: Vec<Vec<Base>> = Vec::new();
    let mut intervening_repeat_counts: Vec<Vec<u8>> = vec![Vec::new(); interval_count];
    let mut intervening = Vec::new();
    for (i, interval) in intervals.iter().enumerate() {
        let (position0, position1) = positions[i];
        if position1 - position0 <= k {
            continue; // interval supports the losing mode; discard
        }

        intervening.clear();
        for position in position0 + k..position1 {
            if rle {
                let (base, repeat_count) =
                    reads.base_and_repeat_count(interval.oriented_read, position);
                intervening.push(base);
                intervening_repeat_counts[i].push(repeat_count);
            } else {
                intervening.push(reads.base(interval.oriented_read, position));
            }
        }

        match distinct_sequences.iter().position(|s| *s == intervening) {
            Some(index) => detail.distinct_sequence_occurrences[index].push(i),
            None => {
                distinct_sequences.push(intervening.clone());
                detail.distinct_sequence_occurrences.push(vec![i]);
            }
        }
    }

    // Present the distinct sequences in order of decreasing frequency; the
    // aligner's result depends on insertion order, and this makes it
    // deterministic for a given input set.
    let mut table: Vec<usize> = (0..distinct_sequences.len()).collect();
    table.sort_by_key(|&index| {
        std::cmp::Reverse(detail.distinct_sequence_occurrences[index].len())
    });

    detail.alignment_row = vec![-1; interval_count];
    for (row, &index) in table.iter().enumerate() {
        for &i in &detail.distinct_sequence_occurrences[index] {
            detail.alignment_row[i] = row as i32;
        }
    }

    let msa_result = (|| -> Result<()> {
        engine.clear();
        for &index in &table {
            engine.add_sequence(&distinct_sequences[index])?;
        }
        engine.generate_msa(&mut detail.msa)
    })();
    if let Err(aligner_error) = msa_result {
        // Serialize the report; workers share the output stream.
        let _guard = ALIGNER_FAILURE_LOG.lock();
        error!(edge_id, %aligner_error, "partial order aligner failed");
        return Err(aligner_error);
    }
    let alignment_length = detail.msa.first().map_or(0, |row| row.len());

    // Walk the alignment columns, calling a consensus at each.
    let mut cursors = vec![0usize; interval_count];
    for column in 0..alignment_length {
        let mut coverage = Coverage::new();
        for (row, &index) in table.iter().enumerate() {
            let aligned_base = AlignedBase::from_char(
                detail.msa[row].as_bytes()[column] as char,
            )
            .expect("alignment rows contain bases and gaps only");
            for &i in &detail.distinct_sequence_occurrences[index] {
                let strand = intervals[i].oriented_read.strand();
                if aligned_base.is_gap() {
                    coverage.add_read(aligned_base, strand, 0);
                } else {
                    let repeat_count = if rle {
                        u64::from(intervening_repeat_counts[i][cursors[i]])
                    } else {
                        1
                    };
                    coverage.add_read(aligned_base, strand, repeat_count);
                    cursors[i] += 1;
                }
            }
        }

        let consensus = caller.consensus(&coverage);
        if !consensus.base.is_gap() {
            sequence.push(consensus.base.to_base().unwrap());
            ensure!(
                consensus.repeat_count > 0,
                "consensus repeat count 0 at column {column} of edge {edge_id}"
            );
            repeat_counts.push(consensus.repeat_count as u32);
            if let Some(out) = coverage_data.as_deref_mut() {
                for compressed in coverage.compress() {
                    out.push(PositionedCoverageData {
                        position: (sequence.len() - 1) as u32,
                        data: compressed,
                    });
                }
            }
        }

        detail.aligned_consensus.push(consensus.base);
        detail.aligned_repeat_counts.push(if consensus.base.is_gap() {
            0
        } else {
            consensus.repeat_count.min(255) as u8
        });
    }
    Ok(())
}

#[derive(Default)]
struct ThreadConsensus {
    edge_ids: Vec<EdgeId>,
    consensus: Vec<Vec<ConsensusBase>>,
    overlapping: Vec<u8>,
    coverage_data: Vec<Vec<PositionedCoverageData>>,
}

/// Assemble consensus for the edges of the graph: live edges only, or all
/// edges on request. Results land in `MarkerGraphEdgesConsensus` and
/// `MarkerGraphEdgesConsensusOverlappingBaseCount`, in edge order.
#[allow(clippy::too_many_arguments)]
pub fn assemble_edges(
    graph: &mut MarkerGraph,
    reads: &ReadStore,
    markers: &MarkerStore,
    caller: &dyn ConsensusCaller,
    factory: &dyn MsaEngineFactory,
    config: &ConsensusConfig,
    assemble_all_edges: bool,
    thread_count: usize,
) -> Result<()> {
    config.validate()?;
    let edge_count = graph.edge_count();
    info!(edge_count, assemble_all_edges, "assembling marker graph edges");

    let outputs: Vec<Mutex<ThreadConsensus>> = (0..thread_count)
        .map(|_| Mutex::new(ThreadConsensus::default()))
        .collect();
    {
        let graph_ref = &*graph;
        // Edge consensus cost is wildly uneven; small batches keep the
        // workers balanced.
        let balancer = LoadBalancer::new(edge_count, EDGE_CONSENSUS_BATCH);
        run_workers(thread_count, |thread_id| {
            let mut output = outputs[thread_id].lock();
            let mut engine = factory.create_engine(
                config.match_score,
                config.mismatch_score,
                config.gap_score,
            );
            let mut sequence = Vec::new();
            let mut repeat_counts = Vec::new();
            let mut detail = EdgeConsensusDetail::default();
            let mut coverage_data = Vec::new();
            while let Some(batch) = balancer.next_batch() {
                for edge_id in batch {
                    if !assemble_all_edges && graph_ref.edge(edge_id).was_removed() {
                        continue;
                    }
                    let mut overlapping = 0u8;
                    compute_edge_consensus(
                        graph_ref,
                        reads,
                        markers,
                        caller,
                        engine.as_mut(),
                        edge_id,
                        config,
                        &mut sequence,
                        &mut repeat_counts,
                        &mut overlapping,
                        &mut detail,
                        config.store_coverage_data.then_some(&mut coverage_data),
                    )?;
                    output.edge_ids.push(edge_id);
                    output.consensus.push(
                        sequence
                            .iter()
                            .zip(&repeat_counts)
                            .map(|(&base, &repeat_count)| ConsensusBase {
                                base: base.value(),
                                repeat_count: repeat_count.min(255) as u8,
                            })
                            .collect(),
                    );
                    output.overlapping.push(overlapping);
                    if config.store_coverage_data {
                        output.coverage_data.push(std::mem::take(&mut coverage_data));
                    }
                }
            }
            Ok(())
        })?;
    }

    // Locate each edge's result, then gather in edge order.
    let invalid = usize::MAX;
    let mut edge_table = vec![(invalid, invalid); edge_count as usize];
    let outputs: Vec<ThreadConsensus> = outputs.into_iter().map(Mutex::into_inner).collect();
    for (thread_id, output) in outputs.iter().enumerate() {
        for (i, &edge_id) in output.edge_ids.iter().enumerate() {
            edge_table[edge_id as usize] = (thread_id, i);
        }
    }

    graph
        .edge_consensus_overlapping_base_count
        .reserve_and_resize(edge_count as usize)?;
    for edge_id in 0..edge_count as usize {
        graph.edge_consensus.append_vector();
        if config.store_coverage_data {
            graph.edge_coverage_data.append_vector();
        }
        let (thread_id, i) = edge_table[edge_id];
        if thread_id == invalid {
            // Edge was not selected for assembly.
            graph.edge_consensus_overlapping_base_count[edge_id] = 0;
            continue;
        }
        let output = &outputs[thread_id];
        for &entry in &output.consensus[i] {
            graph.edge_consensus.append(entry)?;
        }
        graph.edge_consensus_overlapping_base_count[edge_id] = output.overlapping[i];
        if config.store_coverage_data {
            for &entry in &output.coverage_data[i] {
                graph.edge_coverage_data.append(entry)?;
            }
        }
        graph.edges[edge_id].set_assembled(true);
    }
    graph.edge_consensus.unreserve()?;

    info!("marker graph edge consensus complete");
    Ok(())
}
