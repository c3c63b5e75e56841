//! Shared fixtures: in-memory stores built from ASCII sequences, and
//! hand-built marker graphs for refinement tests.

#![allow(dead_code)]

use helix_forge::core::alignments::AlignmentStore;
use helix_forge::core::ids::{KmerId, OrientedReadId, Uint40};
use helix_forge::core::markers::MarkerStore;
use helix_forge::core::reads::{ReadRepresentation, ReadStore};
use helix_forge::graph::marker_graph::{Edge, MarkerGraph};
use std::path::Path;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Route phase logs through the test harness; `RUST_LOG` filters apply.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

/// Reads plus markers at every k-mer position.
pub fn stores_with_all_markers(
    sequences: &[&str],
    k: usize,
    representation: ReadRepresentation,
) -> (ReadStore, MarkerStore) {
    let mut reads = ReadStore::new(representation);
    for sequence in sequences {
        reads.add_read(sequence).unwrap();
    }
    let markers = MarkerStore::build(&reads, k, |_| true);
    (reads, markers)
}

/// Reads plus markers restricted to a k-mer id set (closed under reverse
/// complement by the caller).
pub fn stores_with_marker_kmers(
    sequences: &[&str],
    k: usize,
    representation: ReadRepresentation,
    marker_kmers: &[KmerId],
) -> (ReadStore, MarkerStore) {
    let mut reads = ReadStore::new(representation);
    for sequence in sequences {
        reads.add_read(sequence).unwrap();
    }
    let markers = MarkerStore::build(&reads, k, |kmer| marker_kmers.contains(&kmer));
    (reads, markers)
}

/// A perfect ordinal-identity alignment between two oriented reads with the
/// same marker content.
pub fn identity_alignment(markers: &MarkerStore, o0: OrientedReadId, o1: OrientedReadId) -> Vec<[u32; 2]> {
    assert_eq!(markers.count(o0), markers.count(o1));
    (0..markers.count(o0) as u32)
        .map(|ordinal| {
            let m0 = markers.marker(markers.marker_id(o0, ordinal));
            let m1 = markers.marker(markers.marker_id(o1, ordinal));
            assert_eq!(m0.kmer_id, m1.kmer_id, "fixture alignment pairs unequal k-mers");
            [ordinal, ordinal]
        })
        .collect()
}

/// Store one alignment and its read-graph edge pair.
pub fn add_identity_alignment(
    alignments: &mut AlignmentStore,
    markers: &MarkerStore,
    o0: OrientedReadId,
    o1: OrientedReadId,
) {
    let pairs = identity_alignment(markers, o0, o1);
    let id = alignments.add_alignment(&pairs);
    alignments.add_read_graph_edge_pair(id, [o0, o1], false, false);
}

/// Build a marker graph with hand-specified topology: `vertex_count`
/// vertices with no markers, the given `(source, target, coverage)` edges,
/// and explicit reverse-complement maps. Adjacency is derived.
pub fn synthetic_graph(
    dir: &Path,
    vertex_count: u64,
    edges: &[(u64, u64, u8)],
    rc_vertex: &[u64],
    rc_edge: &[u64],
) -> MarkerGraph {
    assert_eq!(rc_vertex.len() as u64, vertex_count);
    assert_eq!(rc_edge.len(), edges.len());
    let mut graph = MarkerGraph::create(dir).unwrap();

    for _ in 0..vertex_count {
        graph.vertices.append_vector();
    }

    for &(source, target, coverage) in edges {
        graph.edges.push(Edge::new(source, target, coverage as usize)).unwrap();
        graph.edge_marker_intervals.append_vector();
    }

    graph
        .reverse_complement_vertex
        .reserve_and_resize(vertex_count as usize)
        .unwrap();
    for (v, &rc) in rc_vertex.iter().enumerate() {
        graph.reverse_complement_vertex[v] = rc;
        assert_eq!(rc_vertex[rc as usize], v as u64, "rc vertex map is not an involution");
    }
    graph
        .reverse_complement_edge
        .reserve_and_resize(edges.len())
        .unwrap();
    for (e, &rc) in rc_edge.iter().enumerate() {
        graph.reverse_complement_edge[e] = rc;
        assert_eq!(rc_edge[rc as usize], e as u64, "rc edge map is not an involution");
        let (source, target, coverage) = edges[e];
        let (rc_source, rc_target, rc_coverage) = edges[rc as usize];
        assert_eq!(coverage, rc_coverage, "rc edges must have equal coverage");
        assert_eq!(rc_vertex[source as usize], rc_target, "rc edge endpoints inconsistent");
        assert_eq!(rc_vertex[target as usize], rc_source, "rc edge endpoints inconsistent");
    }

    // Adjacency, serial count-then-store.
    graph.edges_by_source.begin_pass1(vertex_count as usize);
    graph.edges_by_target.begin_pass1(vertex_count as usize);
    for &(source, target, _) in edges {
        graph.edges_by_source.increment_count(source as usize);
        graph.edges_by_target.increment_count(target as usize);
    }
    graph.edges_by_source.begin_pass2().unwrap();
    graph.edges_by_target.begin_pass2().unwrap();
    for (edge_id, &(source, target, _)) in edges.iter().enumerate() {
        graph.edges_by_source.store(source as usize, Uint40::new(edge_id as u64));
        graph.edges_by_target.store(target as usize, Uint40::new(edge_id as u64));
    }
    graph.edges_by_source.end_pass2().unwrap();
    graph.edges_by_target.end_pass2().unwrap();

    graph
}

/// An empty marker store; enough for refinement passes on synthetic graphs.
pub fn empty_marker_store(k: usize) -> MarkerStore {
    MarkerStore::from_markers(k, Vec::new())
}
