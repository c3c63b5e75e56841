//! # HelixForge - Marker Graph Assembly Core
//!
//! A high-performance marker-graph assembly core for long, noisy reads.
//! Builds a strand-symmetric directed multigraph whose vertices are
//! equivalence classes of aligned marker positions and whose edges are
//! transitions between consecutive markers within reads, refines it
//! (transitive reduction, leaf pruning, bubble and super-bubble removal),
//! and computes per-vertex and per-edge consensus sequence.
//!
//! The crate is organized leaves-first:
//! - [`core`] - identifiers and the read/marker/alignment stores
//! - [`storage`] - memory-mapped vectors and ragged arrays
//! - [`graph`] - the lock-free disjoint-set engine, the marker graph,
//!   its builders and refinement passes
//! - [`consensus`] - coverage bookkeeping, consensus calling, and the
//!   partial-order-alignment backend for edge consensus
//! - [`pipeline`] - the phase driver that wires everything together

pub mod config;
pub mod consensus;
pub mod core;
pub mod graph;
pub mod pipeline;
pub mod storage;
pub mod utils;

// Re-export commonly used types at crate level
pub use crate::config::{MarkerGraphConfig, RefinementConfig};
pub use crate::core::ids::{EdgeId, MarkerId, OrientedReadId, ReadId, VertexId};
pub use crate::graph::marker_graph::MarkerGraph;
pub use crate::pipeline::{Assembler, AssemblyStats};

/// Result type used throughout the crate
pub type Result<T> = anyhow::Result<T>;

/// Error type used throughout the crate
pub type Error = anyhow::Error;
