//! Bubble and super-bubble removal.
//!
//! Each iteration of the schedule builds a temporary assembly graph (linear
//! chains of live marker-graph edges), removes simple bubbles by keeping
//! only the highest-coverage edge of each parallel group, then removes
//! super-bubbles: within each connected component of short edges, only the
//! edges on the best entry-to-exit paths survive, where path length is the
//! inverse of average coverage. All flag changes are applied to both edges
//! of every reverse-complement pair.

use crate::core::ids::EdgeId;
use crate::core::markers::MarkerStore;
use crate::graph::assembly_graph::AssemblyGraph;
use crate::graph::marker_graph::MarkerGraph;
use crate::graph::reverse_complement::check_strand_symmetry;
use crate::Result;
use anyhow::{bail, ensure};
use petgraph::unionfind::UnionFind;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, BTreeMap};
use std::io::Write;
use tracing::info;

/// Run the simplification schedule: one bubble pass and one super-bubble
/// pass per `max_length` value, with strand symmetry verified between
/// passes.
pub fn simplify(
    graph: &mut MarkerGraph,
    markers: &MarkerStore,
    max_lengths: &[usize],
    thread_count: usize,
    debug: bool,
) -> Result<()> {
    for edge in graph.edges.as_mut_slice() {
        edge.set_super_bubble_edge(false);
    }

    for (iteration, &max_length) in max_lengths.iter().enumerate() {
        info!(iteration, max_length, "begin simplification iteration");
        check_strand_symmetry(graph, markers, thread_count)?;
        remove_bubbles(graph, iteration, max_length, debug)?;
        check_strand_symmetry(graph, markers, thread_count)?;
        remove_super_bubbles(graph, iteration, max_length, debug)?;
    }
    check_strand_symmetry(graph, markers, thread_count)?;
    Ok(())
}

/// Part 1: bubbles. For each group of parallel assembly-graph edges that are
/// all short enough, keep only the edge with the highest average coverage.
pub fn remove_bubbles(
    graph: &mut MarkerGraph,
    iteration: usize,
    max_length: usize,
    debug: bool,
) -> Result<()> {
    let assembly = AssemblyGraph::build(graph);
    info!(
        vertices = assembly.vertex_count(),
        edges = assembly.edge_count(),
        "assembly graph for bubble removal"
    );

    let mut keep = vec![true; assembly.edge_count()];
    for v0 in 0..assembly.vertex_count() {
        let out_edges = &assembly.edges_by_source[v0];

        // A long out-edge disqualifies the whole vertex.
        if out_edges
            .iter()
            .any(|&e| assembly.edges[e].len() > max_length)
        {
            continue;
        }

        // Group the out-edges by target; deterministic order.
        let mut edge_table: BTreeMap<usize, Vec<(usize, u32)>> = BTreeMap::new();
        for &edge_id in out_edges {
            let edge = &assembly.edges[edge_id];
            edge_table
                .entry(edge.target)
                .or_default()
                .push((edge_id, edge.average_coverage));
        }

        for (v1, mut group) in edge_table {
            if v1 == assembly.reverse_complement_vertex[v0] {
                // v0 and v1 are reverse complements of each other; handled
                // by the super-bubble pass.
                continue;
            }
            if group.len() < 2 {
                continue;
            }
            group.sort_by(|a, b| b.1.cmp(&a.1));
            for &(loser, _) in &group[1..] {
                keep[loser] = false;
            }
        }
    }

    flag_unkept_edges(graph, &assembly, &keep, true);

    if debug {
        write_debug_csv(
            graph,
            &assembly,
            &keep,
            &format!("AssemblyGraph-BubbleRemoval-Iteration-{iteration}.csv"),
        )?;
    }
    Ok(())
}

/// Part 2: super-bubbles.
pub fn remove_super_bubbles(
    graph: &mut MarkerGraph,
    iteration: usize,
    max_length: usize,
    debug: bool,
) -> Result<()> {
    let assembly = AssemblyGraph::build(graph);
    let n = assembly.vertex_count();
    info!(
        vertices = n,
        edges = assembly.edge_count(),
        "assembly graph for super-bubble removal"
    );

    // Connected components over short edges only.
    let mut components: UnionFind<usize> = UnionFind::new(n);
    for edge in &assembly.edges {
        if edge.len() <= max_length {
            components.union(edge.source, edge.target);
        }
    }

    // Edges between components, and long edges, are always kept.
    let mut keep = vec![false; assembly.edge_count()];
    for (edge_id, edge) in assembly.edges.iter().enumerate() {
        if components.find(edge.source) != components.find(edge.target)
            || edge.len() > max_length
        {
            keep[edge_id] = true;
        }
    }

    // Gather the vertices of each component; vertex ids in each list are
    // sorted by construction.
    let mut component_table: Vec<Vec<usize>> = vec![Vec::new(); n];
    for v in 0..n {
        component_table[components.find(v)].push(v);
    }

    // Components come in reverse-complement pairs, or are self-complementary.
    let mut rc_component = vec![0usize; n];
    for component_id in 0..n {
        let component = &component_table[component_id];
        if component.is_empty() {
            continue;
        }
        let v_rc = assembly.reverse_complement_vertex[component[0]];
        rc_component[component_id] = components.find(v_rc);
    }
    for component_id in 0..n {
        if component_table[component_id].is_empty() {
            continue;
        }
        let rc = rc_component[component_id];
        ensure!(
            rc_component[rc] == component_id,
            "component reverse complement pairing is not an involution"
        );
    }

    // Entries have an in-edge from another component or a long in-edge;
    // exits are symmetric.
    let mut is_entry = vec![false; n];
    let mut is_exit = vec![false; n];
    for v0 in 0..n {
        let component0 = components.find(v0);
        for &edge_id in &assembly.edges_by_target[v0] {
            let edge = &assembly.edges[edge_id];
            if edge.len() > max_length || components.find(edge.source) != component0 {
                is_entry[v0] = true;
                break;
            }
        }
        for &edge_id in &assembly.edges_by_source[v0] {
            let edge = &assembly.edges[edge_id];
            if edge.len() > max_length || components.find(edge.target) != component0 {
                is_exit[v0] = true;
                break;
            }
        }
    }

    // Process one component of each reverse-complement pair.
    for component_id in 0..n {
        let component = &component_table[component_id];
        if component.is_empty() {
            continue;
        }

        // Self-complementary components are left untouched.
        if rc_component[component_id] == component_id {
            info!(
                vertices = component.len(),
                "skipped a self-complementary component"
            );
            keep_internal_edges(&assembly, &components, component, &mut keep, false);
            continue;
        }
        if rc_component[component_id] < component_id {
            continue; // the partner component was already processed
        }

        let entries: Vec<usize> = component.iter().copied().filter(|&v| is_entry[v]).collect();
        let exits: Vec<usize> = component.iter().copied().filter(|&v| is_exit[v]).collect();

        // A component with no entries or no exits is a whole connected
        // component of the full graph; keep it intact.
        if entries.is_empty() || exits.is_empty() {
            keep_internal_edges(&assembly, &components, component, &mut keep, true);
            continue;
        }

        process_component(&assembly, component, &entries, &exits, max_length, &mut keep)?;
    }

    flag_unkept_edges(graph, &assembly, &keep, false);

    if debug {
        write_debug_csv(
            graph,
            &assembly,
            &keep,
            &format!("AssemblyGraph-SuperBubbleRemoval-Iteration-{iteration}.csv"),
        )?;
    }
    Ok(())
}

/// Keep every edge internal to the component, optionally together with its
/// reverse complement.
fn keep_internal_edges(
    assembly: &AssemblyGraph,
    components: &UnionFind<usize>,
    component: &[usize],
    keep: &mut [bool],
    also_rc: bool,
) {
    for &v0 in component {
        let component0 = components.find(v0);
        for &edge_id in &assembly.edges_by_source[v0] {
            let edge = &assembly.edges[edge_id];
            if components.find(edge.target) == component0 {
                keep[edge_id] = true;
                if also_rc {
                    keep[assembly.reverse_complement_edge[edge_id]] = true;
                }
            }
        }
    }
}

/// Retain, for every entry, the shortest (highest-coverage) path to every
/// reachable exit.
fn process_component(
    assembly: &AssemblyGraph,
    component: &[usize],
    entries: &[usize],
    exits: &[usize],
    max_length: usize,
    keep: &mut [bool],
) -> Result<()> {
    debug_assert!(component.windows(2).all(|w| w[0] < w[1]));
    let local = |v: usize| component.binary_search(&v).ok();

    // Local weighted adjacency; edge weight is the inverse of average
    // coverage so the shortest path prefers high coverage.
    let mut adjacency: Vec<Vec<(usize, f64)>> = vec![Vec::new(); component.len()];
    for (local0, &vertex0) in component.iter().enumerate() {
        for &edge_id in &assembly.edges_by_source[vertex0] {
            let edge = &assembly.edges[edge_id];
            if edge.len() > max_length {
                continue; // long edges are not internal to the component
            }
            let Some(local1) = local(edge.target) else {
                continue; // leaves the component
            };
            adjacency[local0].push((local1, 1.0 / f64::from(edge.average_coverage.max(1))));
        }
    }

    for &entry in entries {
        let entry_local = local(entry).unwrap();
        let predecessor = dijkstra_predecessors(&adjacency, entry_local);

        for &exit in exits {
            if exit == entry {
                continue;
            }
            let exit_local = local(exit).unwrap();
            if predecessor[exit_local] == exit_local {
                continue; // not reachable from this entry
            }

            // Walk the predecessor chain backward, retaining on each hop the
            // highest-coverage assembly edge between the two vertices.
            let mut v1 = exit_local;
            loop {
                let v0 = predecessor[v1];
                let mut best_coverage = 0u32;
                let mut best_edge: Option<usize> = None;
                for &edge_id in &assembly.edges_by_source[component[v0]] {
                    let edge = &assembly.edges[edge_id];
                    if edge.target != component[v1] || edge.len() > max_length {
                        continue;
                    }
                    if edge.average_coverage > best_coverage {
                        best_coverage = edge.average_coverage;
                        best_edge = Some(edge_id);
                    }
                }
                let Some(best_edge) = best_edge else {
                    bail!(
                        "no usable assembly graph edge on shortest path hop {}->{}",
                        component[v0],
                        component[v1]
                    );
                };
                keep[best_edge] = true;
                keep[assembly.reverse_complement_edge[best_edge]] = true;

                if v0 == entry_local {
                    break;
                }
                v1 = v0;
            }
        }
    }
    Ok(())
}

/// Dijkstra over the local adjacency, returning the predecessor tree.
/// Unreached vertices keep themselves as predecessor.
fn dijkstra_predecessors(adjacency: &[Vec<(usize, f64)>], source: usize) -> Vec<usize> {
    let n = adjacency.len();
    let mut distance = vec![f64::INFINITY; n];
    let mut predecessor: Vec<usize> = (0..n).collect();
    let mut heap: BinaryHeap<Reverse<(OrderedF64, usize)>> = BinaryHeap::new();
    distance[source] = 0.0;
    heap.push(Reverse((OrderedF64(0.0), source)));

    while let Some(Reverse((OrderedF64(d), u))) = heap.pop() {
        if d > distance[u] {
            continue; // stale entry
        }
        for &(v, weight) in &adjacency[u] {
            let candidate = d + weight;
            if candidate < distance[v] {
                distance[v] = candidate;
                predecessor[v] = u;
                heap.push(Reverse((OrderedF64(candidate), v)));
            }
        }
    }
    predecessor
}

/// f64 wrapper ordered by total order; weights are finite by construction.
#[derive(PartialEq, Copy, Clone)]
struct OrderedF64(f64);

impl Eq for OrderedF64 {}

impl PartialOrd for OrderedF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Flag the marker-graph edges of every assembly edge that was not kept.
/// The bubble pass flags the rc partner explicitly; the super-bubble pass
/// relies on the keep flags themselves being strand symmetric.
fn flag_unkept_edges(
    graph: &mut MarkerGraph,
    assembly: &AssemblyGraph,
    keep: &[bool],
    flag_rc: bool,
) {
    for (edge_id, edge) in assembly.edges.iter().enumerate() {
        if keep[edge_id] {
            continue;
        }
        for &marker_edge in &edge.marker_edges {
            graph.edges[marker_edge as usize].set_super_bubble_edge(true);
            if flag_rc {
                let rc: EdgeId = graph.rc_edge(marker_edge);
                graph.edges[rc as usize].set_super_bubble_edge(true);
            }
        }
    }
}

/// Bandage-loadable csv marking kept edges green and removed edges gray.
fn write_debug_csv(
    graph: &MarkerGraph,
    assembly: &AssemblyGraph,
    keep: &[bool],
    name: &str,
) -> Result<()> {
    let mut file = std::fs::File::create(graph.storage_dir().join(name))?;
    writeln!(file, "EdgeId,Color,Source,Target")?;
    for (edge_id, edge) in assembly.edges.iter().enumerate() {
        writeln!(
            file,
            "{edge_id},{},{},{}",
            if keep[edge_id] { "green" } else { "#D3D3D3" },
            assembly.vertices[edge.source],
            assembly.vertices[edge.target],
        )?;
    }
    Ok(())
}
