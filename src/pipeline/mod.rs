//! Phase driver: owns the stores and the marker graph and runs the phases
//! in dependency order.

use crate::config::{ConsensusConfig, MarkerGraphConfig, RefinementConfig};
use crate::consensus::caller::ConsensusCaller;
use crate::consensus::poa::MsaEngineFactory;
use crate::consensus::{assemble_edges, assemble_vertices};
use crate::core::alignments::AlignmentStore;
use crate::core::markers::MarkerStore;
use crate::core::reads::ReadStore;
use crate::graph::edge_builder::create_edges;
use crate::graph::marker_graph::MarkerGraph;
use crate::graph::prune::prune_strong_subgraph;
use crate::graph::reverse_complement::{
    check_strand_symmetry, find_reverse_complement_edges, find_reverse_complement_vertices,
};
use crate::graph::simplify::simplify;
use crate::graph::transitive_reduction::{reverse_transitive_reduction, transitive_reduction};
use crate::graph::vertex_builder::create_vertices;
use crate::utils::resolve_thread_count;
use crate::Result;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default)]
pub struct AssemblyStats {
    pub marker_count: u64,
    pub min_coverage_used: usize,
    pub bad_set_count: u64,
    pub vertex_count: u64,
    pub edge_count: u64,
    pub not_isolated_vertex_count: u64,
    pub live_edge_count: u64,
}

impl fmt::Display for AssemblyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Marker Graph Statistics ===")?;
        writeln!(f, "Markers: {}", self.marker_count)?;
        writeln!(f, "Min vertex coverage used: {}", self.min_coverage_used)?;
        writeln!(f, "Bad disjoint sets: {}", self.bad_set_count)?;
        writeln!(f, "Vertices: {}", self.vertex_count)?;
        writeln!(f, "Edges: {}", self.edge_count)?;
        writeln!(
            f,
            "After refinement: {} vertices not isolated, {} edges live",
            self.not_isolated_vertex_count, self.live_edge_count
        )?;
        Ok(())
    }
}

/// The marker graph core, end to end: vertex formation, edge formation,
/// reverse-complement pairing, refinement, and consensus.
pub struct Assembler {
    reads: ReadStore,
    markers: MarkerStore,
    alignments: AlignmentStore,
    graph: MarkerGraph,
    marker_graph_config: MarkerGraphConfig,
    refinement_config: RefinementConfig,
    consensus_config: ConsensusConfig,
    thread_count: usize,
    stats: AssemblyStats,
}

impl Assembler {
    pub fn new(
        reads: ReadStore,
        markers: MarkerStore,
        alignments: AlignmentStore,
        storage_dir: &Path,
        marker_graph_config: MarkerGraphConfig,
        refinement_config: RefinementConfig,
        consensus_config: ConsensusConfig,
    ) -> Result<Self> {
        marker_graph_config.validate()?;
        refinement_config.validate()?;
        consensus_config.validate()?;
        let thread_count = resolve_thread_count(marker_graph_config.thread_count);
        let stats = AssemblyStats {
            marker_count: markers.total_count(),
            ..Default::default()
        };
        Ok(Assembler {
            graph: MarkerGraph::create(storage_dir)?,
            reads,
            markers,
            alignments,
            marker_graph_config,
            refinement_config,
            consensus_config,
            thread_count,
            stats,
        })
    }

    pub fn graph(&self) -> &MarkerGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut MarkerGraph {
        &mut self.graph
    }

    pub fn reads(&self) -> &ReadStore {
        &self.reads
    }

    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    pub fn stats(&self) -> &AssemblyStats {
        &self.stats
    }

    pub fn create_vertices(&mut self) -> Result<()> {
        let outcome = create_vertices(
            &mut self.graph,
            &self.reads,
            &self.markers,
            &self.alignments,
            &self.marker_graph_config,
        )?;
        self.stats.min_coverage_used = outcome.min_coverage_used;
        self.stats.vertex_count = outcome.vertex_count;
        self.stats.bad_set_count = outcome.bad_set_count;
        Ok(())
    }

    pub fn find_reverse_complement_vertices(&mut self) -> Result<()> {
        find_reverse_complement_vertices(&mut self.graph, &self.markers, self.thread_count)
    }

    pub fn create_edges(&mut self) -> Result<()> {
        create_edges(&mut self.graph, &self.markers, self.thread_count)?;
        self.stats.edge_count = self.graph.edge_count();
        Ok(())
    }

    pub fn find_reverse_complement_edges(&mut self) -> Result<()> {
        find_reverse_complement_edges(&mut self.graph, &self.markers, self.thread_count)
    }

    pub fn check_strand_symmetry(&self) -> Result<()> {
        check_strand_symmetry(&self.graph, &self.markers, self.thread_count)
    }

    pub fn transitive_reduction(&mut self) -> Result<()> {
        self.refinement_config.validate()?;
        transitive_reduction(
            &mut self.graph,
            self.refinement_config.low_coverage_threshold,
            self.refinement_config.high_coverage_threshold,
            self.refinement_config.max_distance,
            self.refinement_config.marker_skip_threshold,
        )
    }

    pub fn reverse_transitive_reduction(&mut self) -> Result<()> {
        reverse_transitive_reduction(
            &mut self.graph,
            self.refinement_config.low_coverage_threshold,
            self.refinement_config.high_coverage_threshold,
            self.refinement_config.max_distance,
        )
    }

    pub fn prune(&mut self) -> Result<()> {
        prune_strong_subgraph(&mut self.graph, self.refinement_config.prune_iteration_count)
    }

    pub fn simplify(&mut self) -> Result<()> {
        let max_lengths = self.refinement_config.simplify_max_lengths.clone();
        simplify(
            &mut self.graph,
            &self.markers,
            &max_lengths,
            self.thread_count,
            self.marker_graph_config.debug_output,
        )?;
        self.stats.not_isolated_vertex_count = self.graph.not_isolated_vertex_count();
        self.stats.live_edge_count = self.graph.live_edge_count();
        Ok(())
    }

    pub fn assemble_vertices(&mut self, caller: &dyn ConsensusCaller) -> Result<()> {
        assemble_vertices(
            &mut self.graph,
            &self.reads,
            &self.markers,
            caller,
            self.thread_count,
        )
    }

    pub fn assemble_edges(
        &mut self,
        caller: &dyn ConsensusCaller,
        factory: &dyn MsaEngineFactory,
        assemble_all_edges: bool,
    ) -> Result<()> {
        assemble_edges(
            &mut self.graph,
            &self.reads,
            &self.markers,
            caller,
            factory,
            &self.consensus_config,
            assemble_all_edges,
            self.thread_count,
        )
    }

    /// The whole core in phase order. Consensus is computed for the
    /// refined graph only.
    pub fn run(
        &mut self,
        caller: &dyn ConsensusCaller,
        factory: &dyn MsaEngineFactory,
    ) -> Result<()> {
        self.create_vertices()?;
        self.find_reverse_complement_vertices()?;
        self.create_edges()?;
        self.find_reverse_complement_edges()?;
        self.check_strand_symmetry()?;
        self.transitive_reduction()?;
        self.reverse_transitive_reduction()?;
        self.prune()?;
        self.simplify()?;
        self.assemble_vertices(caller)?;
        self.assemble_edges(caller, factory, false)?;
        info!("marker graph core complete\n{}", self.stats);
        Ok(())
    }
}
