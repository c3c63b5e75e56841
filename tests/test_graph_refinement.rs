//! Refinement passes over hand-built strand-symmetric graphs: transitive
//! reduction, pruning, bubble removal, and super-bubble removal.

mod common;

use common::{empty_marker_store, synthetic_graph};
use helix_forge::graph::prune::prune_strong_subgraph;
use helix_forge::graph::simplify::{remove_bubbles, remove_super_bubbles};
use helix_forge::graph::transitive_reduction::{
    reverse_transitive_reduction, transitive_reduction,
};
use tempfile::TempDir;

/// A triangle A->B->C with shortcut A->C, plus its reverse complement.
/// Vertices: A=0 B=1 C=2, rc: Arc=3 Brc=4 Crc=5.
fn triangle(dir: &TempDir) -> helix_forge::graph::marker_graph::MarkerGraph {
    synthetic_graph(
        dir.path(),
        6,
        &[
            (0, 1, 3), // 0: A->B
            (1, 2, 3), // 1: B->C
            (0, 2, 2), // 2: A->C shortcut
            (4, 3, 3), // 3: rc of A->B (Brc->Arc)
            (5, 4, 3), // 4: rc of B->C
            (5, 3, 2), // 5: rc of A->C
        ],
        &[3, 4, 5, 0, 1, 2],
        &[3, 4, 5, 0, 1, 2],
    )
}

#[test]
fn transitive_reduction_removes_the_shortcut() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    let mut graph = triangle(&dir);
    transitive_reduction(&mut graph, 1, 5, 2, 100).unwrap();

    assert!(graph.edge(2).was_removed_by_transitive_reduction());
    assert!(graph.edge(5).was_removed_by_transitive_reduction());
    for edge_id in [0, 1, 3, 4] {
        assert!(!graph.edge(edge_id).was_removed_by_transitive_reduction());
    }
    // Flags are equal across every rc pair.
    for edge_id in 0..graph.edge_count() {
        let rc = graph.rc_edge(edge_id);
        assert_eq!(graph.edge(edge_id).flag_bits(), graph.edge(rc).flag_bits());
    }
}

#[test]
fn transitive_reduction_low_coverage_cull() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // Two parallel paths, one of coverage 1.
    let mut graph = synthetic_graph(
        dir.path(),
        4,
        &[
            (0, 1, 5), // 0
            (0, 1, 1), // 1: low coverage
            (3, 2, 5), // 2: rc of 0
            (3, 2, 1), // 3: rc of 1
        ],
        &[2, 3, 0, 1],
        &[2, 3, 0, 1],
    );
    transitive_reduction(&mut graph, 1, 5, 2, 100).unwrap();
    assert!(graph.edge(1).was_removed_by_transitive_reduction());
    assert!(graph.edge(3).was_removed_by_transitive_reduction());
    assert!(!graph.edge(0).was_removed_by_transitive_reduction());
    assert_eq!(graph.live_edge_count(), 2);
}

#[test]
fn reverse_transitive_reduction_removes_back_edges() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // A->B->C strong, plus a back edge C->A of coverage 2.
    // rc: Crc->Brc->Arc with back edge Arc->Crc.
    let mut graph = synthetic_graph(
        dir.path(),
        6,
        &[
            (0, 1, 10), // 0: A->B
            (1, 2, 10), // 1: B->C
            (2, 0, 2),  // 2: C->A back edge
            (4, 3, 10), // 3: rc of 0
            (5, 4, 10), // 4: rc of 1
            (3, 5, 2),  // 5: rc of 2
        ],
        &[3, 4, 5, 0, 1, 2],
        &[3, 4, 5, 0, 1, 2],
    );
    // Forward reduction finds nothing (coverage 10 edges are above the
    // high threshold; the back edge has no forward alternative).
    transitive_reduction(&mut graph, 1, 5, 3, 100).unwrap();
    assert_eq!(graph.live_edge_count(), 6);
    // The reverse pass walks forward from A looking for C and removes the
    // back edge.
    reverse_transitive_reduction(&mut graph, 1, 5, 3).unwrap();
    assert!(graph.edge(2).was_removed_by_transitive_reduction());
    assert!(graph.edge(5).was_removed_by_transitive_reduction());
    assert_eq!(graph.live_edge_count(), 4);
}

#[test]
fn prune_removes_leaves_layer_by_layer_and_is_idempotent() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // A cycle with a dangling tail: cycle A->B->C->A, tail C->D->E.
    // rc graph mirrors it.
    let mut graph = synthetic_graph(
        dir.path(),
        10,
        &[
            (0, 1, 5), // 0: A->B
            (1, 2, 5), // 1: B->C
            (2, 0, 5), // 2: C->A
            (2, 3, 5), // 3: C->D  tail
            (3, 4, 5), // 4: D->E  tail
            (6, 5, 5), // 5: rc of 0
            (7, 6, 5), // 6: rc of 1
            (5, 7, 5), // 7: rc of 2
            (8, 7, 5), // 8: rc of 3
            (9, 8, 5), // 9: rc of 4
        ],
        &[5, 6, 7, 8, 9, 0, 1, 2, 3, 4],
        &[5, 6, 7, 8, 9, 0, 1, 2, 3, 4],
    );
    prune_strong_subgraph(&mut graph, 3).unwrap();

    // The tail is pruned from the leaf inward; the cycle survives.
    assert!(graph.edge(4).was_pruned());
    assert!(graph.edge(3).was_pruned());
    assert!(graph.edge(9).was_pruned());
    assert!(graph.edge(8).was_pruned());
    for edge_id in [0, 1, 2, 5, 6, 7] {
        assert!(!graph.edge(edge_id).was_pruned(), "edge {edge_id} wrongly pruned");
    }

    // A second prune of the fully-pruned graph flips no additional flag.
    let flags_before: Vec<u8> = graph.edges.iter().map(|e| e.flag_bits()).collect();
    prune_strong_subgraph(&mut graph, 3).unwrap();
    let flags_after: Vec<u8> = graph.edges.iter().map(|e| e.flag_bits()).collect();
    assert_eq!(flags_before, flags_after);
}

/// Two parallel three-edge chains between the same endpoints, coverage 10
/// and 3, plus the reverse complement copies.
#[test]
fn bubble_removal_keeps_the_high_coverage_branch() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // S=0 T=1 a1=2 a2=3 b1=4 b2=5; rc: Src=6 Trc=7 a1rc=8 a2rc=9 b1rc=10 b2rc=11.
    let mut graph = synthetic_graph(
        dir.path(),
        12,
        &[
            (0, 2, 10), // 0: S->a1
            (2, 3, 10), // 1: a1->a2
            (3, 1, 10), // 2: a2->T
            (0, 4, 3),  // 3: S->b1
            (4, 5, 3),  // 4: b1->b2
            (5, 1, 3),  // 5: b2->T
            (7, 9, 10), // 6: rc of 2
            (9, 8, 10), // 7: rc of 1
            (8, 6, 10), // 8: rc of 0
            (7, 11, 3), // 9: rc of 5
            (11, 10, 3), // 10: rc of 4
            (10, 6, 3), // 11: rc of 3
        ],
        &[6, 7, 8, 9, 10, 11, 0, 1, 2, 3, 4, 5],
        &[8, 7, 6, 11, 10, 9, 2, 1, 0, 5, 4, 3],
    );
    remove_bubbles(&mut graph, 0, 3, false).unwrap();

    for edge_id in [3u64, 4, 5, 9, 10, 11] {
        assert!(
            graph.edge(edge_id).is_super_bubble_edge(),
            "low coverage branch edge {edge_id} should be flagged"
        );
    }
    for edge_id in [0u64, 1, 2, 6, 7, 8] {
        assert!(
            !graph.edge(edge_id).is_super_bubble_edge(),
            "high coverage branch edge {edge_id} should survive"
        );
    }
}

/// A super-bubble between an entry and an exit, with internal branching
/// that plain bubble removal cannot see: the shortest-path walk keeps the
/// high-coverage path.
#[test]
fn super_bubble_removal_keeps_the_best_path() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // P=0 E=1 a=2 b=3 X=4 Q=5, rc 6..=11; long-chain interiors 12..=16
    // (P..E), 17..=21 (X..Q), 22..=26 (Erc..Prc), 27..=31 (Qrc..Xrc).
    let edges: Vec<(u64, u64, u8)> = vec![
        // long chain P -> E (6 edges)
        (0, 12, 5),  // 0
        (12, 13, 5), // 1
        (13, 14, 5), // 2
        (14, 15, 5), // 3
        (15, 16, 5), // 4
        (16, 1, 5),  // 5
        // the super-bubble
        (1, 2, 4),  // 6: E->a
        (2, 4, 4),  // 7: a->X
        (1, 3, 10), // 8: E->b
        (3, 4, 10), // 9: b->X
        (2, 3, 1),  // 10: a->b cross edge
        // long chain X -> Q
        (4, 17, 5),  // 11
        (17, 18, 5), // 12
        (18, 19, 5), // 13
        (19, 20, 5), // 14
        (20, 21, 5), // 15
        (21, 5, 5),  // 16
        // rc long chain Erc -> Prc
        (7, 22, 5),  // 17
        (22, 23, 5), // 18
        (23, 24, 5), // 19
        (24, 25, 5), // 20
        (25, 26, 5), // 21
        (26, 6, 5),  // 22
        // rc super-bubble
        (8, 7, 4),   // 23: rc of 6
        (10, 8, 4),  // 24: rc of 7
        (9, 7, 10),  // 25: rc of 8
        (10, 9, 10), // 26: rc of 9
        (9, 8, 1),   // 27: rc of 10
        // rc long chain Qrc -> Xrc
        (11, 27, 5), // 28
        (27, 28, 5), // 29
        (28, 29, 5), // 30
        (29, 30, 5), // 31
        (30, 31, 5), // 32
        (31, 10, 5), // 33
    ];
    let rc_vertex = vec![
        6, 7, 8, 9, 10, 11, 0, 1, 2, 3, 4, 5, // named vertices
        26, 25, 24, 23, 22, // 12..=16
        31, 30, 29, 28, 27, // 17..=21
        16, 15, 14, 13, 12, // 22..=26
        21, 20, 19, 18, 17, // 27..=31
    ];
    let rc_edge = vec![
        22, 21, 20, 19, 18, 17, // 0..=5
        23, 24, 25, 26, 27, // 6..=10
        33, 32, 31, 30, 29, 28, // 11..=16
        5, 4, 3, 2, 1, 0, // 17..=22
        6, 7, 8, 9, 10, // 23..=27
        16, 15, 14, 13, 12, 11, // 28..=33
    ];
    let mut graph = synthetic_graph(dir.path(), 32, &edges, &rc_vertex, &rc_edge);
    remove_super_bubbles(&mut graph, 0, 5, false).unwrap();

    // The high coverage path E->b->X and its rc survive.
    for edge_id in [8u64, 9, 25, 26] {
        assert!(
            !graph.edge(edge_id).is_super_bubble_edge(),
            "edge {edge_id} on the best path should survive"
        );
    }
    // The alternative path and the cross edge are flagged.
    for edge_id in [6u64, 7, 10, 23, 24, 27] {
        assert!(
            graph.edge(edge_id).is_super_bubble_edge(),
            "edge {edge_id} should be flagged"
        );
    }
    // Long chains are never touched.
    for edge_id in (0u64..6).chain(11..17).chain(17..23).chain(28..34) {
        assert!(!graph.edge(edge_id).is_super_bubble_edge());
    }
    // Strand symmetry of the flags.
    for edge_id in 0..graph.edge_count() {
        let rc = graph.rc_edge(edge_id);
        assert_eq!(graph.edge(edge_id).flag_bits(), graph.edge(rc).flag_bits());
    }
}

#[test]
fn self_complementary_component_is_left_untouched() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // With rc(v0) = v1, an edge v0->v1 reverse complements to another
    // v0->v1 edge, so the component is its own reverse complement.
    let mut graph = synthetic_graph(
        dir.path(),
        2,
        &[
            (0, 1, 5), // 0
            (0, 1, 5), // 1: rc of 0
        ],
        &[1, 0],
        &[1, 0],
    );
    remove_super_bubbles(&mut graph, 0, 10, false).unwrap();
    // Deliberately untouched: all internal edges of a self-complementary
    // component are retained.
    for edge_id in 0..graph.edge_count() {
        assert!(!graph.edge(edge_id).is_super_bubble_edge());
    }
}

#[test]
fn bubble_removal_skips_reverse_complement_targets() {
    common::init_tracing();
    let dir = TempDir::new().unwrap();
    // Parallel edges from v0 straight to rc(v0): part 1 must leave them
    // alone even though their coverages differ (handled by the
    // super-bubble logic instead).
    let mut graph = synthetic_graph(
        dir.path(),
        2,
        &[
            (0, 1, 9), // 0
            (0, 1, 9), // 1: rc of 0
            (0, 1, 2), // 2
            (0, 1, 2), // 3: rc of 2
        ],
        &[1, 0],
        &[1, 0, 3, 2],
    );
    remove_bubbles(&mut graph, 0, 10, false).unwrap();
    for edge_id in 0..graph.edge_count() {
        assert!(!graph.edge(edge_id).is_super_bubble_edge());
    }
}
