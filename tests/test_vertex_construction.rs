//! End-to-end vertex and edge construction over small read sets, with the
//! structural invariants checked on the result.

mod common;

use common::{add_identity_alignment, stores_with_all_markers};
use helix_forge::config::{ConsensusConfig, MarkerGraphConfig, RefinementConfig};
use helix_forge::consensus::{PoaEngineFactory, SimpleConsensusCaller};
use helix_forge::core::alignments::AlignmentStore;
use helix_forge::core::ids::{OrientedReadId, INVALID_VERTEX_ID};
use helix_forge::core::reads::ReadRepresentation;
use helix_forge::pipeline::Assembler;
use tempfile::TempDir;

fn assembler_with(
    sequences: &[&str],
    k: usize,
    representation: ReadRepresentation,
    config: MarkerGraphConfig,
    aligned_pairs: &[(OrientedReadId, OrientedReadId)],
    dir: &TempDir,
) -> Assembler {
    let (reads, markers) = stores_with_all_markers(sequences, k, representation);
    let mut alignments = AlignmentStore::new();
    for &(o0, o1) in aligned_pairs {
        add_identity_alignment(&mut alignments, &markers, o0, o1);
    }
    Assembler::new(
        reads,
        markers,
        alignments,
        dir.path(),
        config,
        RefinementConfig::default(),
        ConsensusConfig::default(),
    )
    .unwrap()
}

/// Every marker interval's endpoints must map to the edge's vertices, with
/// nothing assigned strictly in between; all markers of a vertex share one
/// k-mer.
fn check_structural_invariants(assembler: &Assembler) {
    let graph = assembler.graph();
    let markers = assembler.markers();

    for vertex_id in 0..graph.vertex_count() {
        let kmer = markers.marker(graph.vertex_markers(vertex_id)[0]).kmer_id;
        for &marker_id in graph.vertex_markers(vertex_id) {
            assert_eq!(markers.marker(marker_id).kmer_id, kmer);
        }
    }
    graph.check_vertex_coherence().unwrap();

    for edge_id in 0..graph.edge_count() {
        let edge = graph.edge(edge_id);
        for interval in graph.edge_intervals(edge_id) {
            let m0 = markers.marker_id(interval.oriented_read, interval.ordinals[0]);
            let m1 = markers.marker_id(interval.oriented_read, interval.ordinals[1]);
            assert_eq!(graph.vertex_of_marker(m0), edge.source_id());
            assert_eq!(graph.vertex_of_marker(m1), edge.target_id());
            for ordinal in interval.ordinals[0] + 1..interval.ordinals[1] {
                let m = markers.marker_id(interval.oriented_read, ordinal);
                assert_eq!(graph.vertex_of_marker(m), INVALID_VERTEX_ID);
            }
        }
    }
}

#[test]
fn two_reads_one_alignment_make_a_linear_chain() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = MarkerGraphConfig {
        min_coverage: 2,
        max_coverage: 100,
        min_coverage_per_strand: 1,
        thread_count: 2,
        ..Default::default()
    };
    // Both reads are the same self-complementary sequence; the alignment
    // joins strand 0 of the first to strand 1 of the second, so every
    // vertex gets one marker on each strand.
    let mut assembler = assembler_with(
        &["ACGTACGT", "ACGTACGT"],
        4,
        ReadRepresentation::Raw,
        config,
        &[(OrientedReadId::new(0, 0), OrientedReadId::new(1, 1))],
        &dir,
    );
    assembler.create_vertices().unwrap();
    assembler.find_reverse_complement_vertices().unwrap();
    assembler.create_edges().unwrap();
    assembler.find_reverse_complement_edges().unwrap();
    assembler.check_strand_symmetry().unwrap();

    let graph = assembler.graph();
    let markers_per_strand: u64 = 8 - 4 + 1;
    // One vertex per marker position and strand family.
    assert_eq!(graph.vertex_count(), 2 * markers_per_strand);
    for vertex_id in 0..graph.vertex_count() {
        assert_eq!(graph.vertex_coverage(vertex_id), 2);
        let strands: Vec<_> = graph
            .vertex_markers(vertex_id)
            .iter()
            .map(|&m| assembler.markers().find(m).0.strand())
            .collect();
        assert!(strands.contains(&0) && strands.contains(&1));
        // No vertex is its own reverse complement here.
        assert_ne!(graph.rc_vertex(vertex_id), vertex_id);
        assert_eq!(graph.rc_vertex(graph.rc_vertex(vertex_id)), vertex_id);
    }

    // A linear chain in each strand family.
    assert_eq!(graph.edge_count(), 2 * (markers_per_strand - 1));
    for edge_id in 0..graph.edge_count() {
        assert_eq!(graph.edge(edge_id).coverage, 2);
    }
    let chain_starts = (0..graph.vertex_count())
        .filter(|&v| graph.in_edges(v).count() == 0)
        .count();
    let chain_ends = (0..graph.vertex_count())
        .filter(|&v| graph.out_edges(v).count() == 0)
        .count();
    assert_eq!(chain_starts, 2);
    assert_eq!(chain_ends, 2);

    check_structural_invariants(&assembler);
    assert_eq!(assembler.stats().min_coverage_used, 2);

    // Refinement finds nothing to remove in two clean linear chains.
    assembler.transitive_reduction().unwrap();
    assembler.reverse_transitive_reduction().unwrap();
    assembler.simplify().unwrap();
    assert_eq!(assembler.graph().live_edge_count(), 8);
    assembler.check_strand_symmetry().unwrap();

    // Consecutive markers overlap by k - 1 bases: every edge assembles in
    // mode 1 with an empty consensus.
    assembler
        .assemble_edges(&SimpleConsensusCaller, &PoaEngineFactory, false)
        .unwrap();
    let graph = assembler.graph();
    for edge_id in 0..graph.edge_count() {
        assert!(graph.edge_consensus.bucket(edge_id as usize).is_empty());
        assert_eq!(
            graph.edge_consensus_overlapping_base_count[edge_id as usize],
            3
        );
        assert!(graph.edge(edge_id).was_assembled());
    }
}

#[test]
fn rle_pipeline_computes_vertex_repeat_counts() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = MarkerGraphConfig {
        min_coverage: 2,
        max_coverage: 100,
        min_coverage_per_strand: 1,
        thread_count: 2,
        ..Default::default()
    };
    // Run-length encoding leaves this sequence unchanged, so marker
    // positions match the raw test; every repeat count is 1.
    let mut assembler = assembler_with(
        &["ACGTACGT", "ACGTACGT"],
        4,
        ReadRepresentation::RunLength,
        config,
        &[(OrientedReadId::new(0, 0), OrientedReadId::new(1, 1))],
        &dir,
    );
    assembler.create_vertices().unwrap();
    assembler.find_reverse_complement_vertices().unwrap();
    assembler.create_edges().unwrap();
    assembler.find_reverse_complement_edges().unwrap();
    assembler.assemble_vertices(&SimpleConsensusCaller).unwrap();

    let graph = assembler.graph();
    assert_eq!(
        graph.vertex_repeat_counts.len(),
        4 * graph.vertex_count() as usize
    );
    assert!(graph.vertex_repeat_counts.iter().all(|&count| count == 1));
}

#[test]
fn reverse_complement_identity_on_a_self_complementary_read() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = MarkerGraphConfig {
        min_coverage: 2,
        max_coverage: 100,
        min_coverage_per_strand: 1,
        // Both markers of each vertex come from the same read.
        allow_duplicate_markers: true,
        thread_count: 2,
        ..Default::default()
    };
    // One self-complementary read aligned against its own opposite strand.
    let mut assembler = assembler_with(
        &["ACGTACGT"],
        4,
        ReadRepresentation::Raw,
        config,
        &[(OrientedReadId::new(0, 0), OrientedReadId::new(0, 1))],
        &dir,
    );
    assembler.create_vertices().unwrap();
    assembler.find_reverse_complement_vertices().unwrap();

    let graph = assembler.graph();
    let markers = assembler.markers();
    assert_eq!(graph.vertex_count(), 5);
    let mut self_rc_count = 0;
    for vertex_id in 0..graph.vertex_count() {
        let rc = graph.rc_vertex(vertex_id);
        assert_eq!(graph.rc_vertex(rc), vertex_id);
        // rc(v) = v exactly when the first marker rc-maps into the same
        // vertex.
        let first = graph.vertex_markers(vertex_id)[0];
        let first_rc_vertex = graph.vertex_of_marker(markers.reverse_complement(first));
        assert_eq!(rc == vertex_id, first_rc_vertex == vertex_id);
        if rc == vertex_id {
            self_rc_count += 1;
        }
    }
    // The middle position of ACGTACGT sits on a palindromic k-mer.
    assert_eq!(self_rc_count, 1);
}

#[test]
fn single_marker_vertex_fails_per_strand_coverage() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = MarkerGraphConfig {
        min_coverage: 1,
        max_coverage: 100,
        min_coverage_per_strand: 2,
        thread_count: 1,
        ..Default::default()
    };
    // No alignments at all: every marker is a singleton set.
    let mut assembler = assembler_with(
        &["ACGTACGT"],
        4,
        ReadRepresentation::Raw,
        config,
        &[],
        &dir,
    );
    assembler.create_vertices().unwrap();
    assert_eq!(assembler.graph().vertex_count(), 0);
    assert_eq!(assembler.stats().bad_set_count, 10);
}

#[test]
fn coverage_gating_rejects_out_of_range_sets() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let config = MarkerGraphConfig {
        min_coverage: 3,
        max_coverage: 100,
        min_coverage_per_strand: 0,
        thread_count: 1,
        ..Default::default()
    };
    let mut assembler = assembler_with(
        &["ACGTACGT", "ACGTACGT"],
        4,
        ReadRepresentation::Raw,
        config,
        &[(OrientedReadId::new(0, 0), OrientedReadId::new(1, 1))],
        &dir,
    );
    // Coverage-2 sets fall below min_coverage = 3.
    assembler.create_vertices().unwrap();
    assert_eq!(assembler.graph().vertex_count(), 0);
}
