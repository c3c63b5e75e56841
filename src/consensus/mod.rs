//! Consensus computation for marker graph vertices and edges.

pub mod caller;
pub mod coverage;
pub mod edge;
pub mod poa;
pub mod vertex;

pub use caller::{Consensus, ConsensusCaller, SimpleConsensusCaller};
pub use coverage::{AlignedBase, CompressedCoverageData, Coverage, PositionedCoverageData};
pub use edge::{assemble_edges, compute_edge_consensus, EdgeConsensusDetail};
pub use poa::{MsaEngine, MsaEngineFactory, PoaEngine, PoaEngineFactory};
pub use vertex::{assemble_vertices, compute_vertex_consensus};
