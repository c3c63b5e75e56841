//! Core identifier types and the external stores the marker graph consumes.

pub mod alignments;
pub mod ids;
pub mod markers;
pub mod reads;

pub use alignments::{AlignmentStore, ReadGraphEdge};
pub use ids::{
    EdgeId, KmerId, MarkerId, MarkerInterval, OrientedReadId, ReadId, Strand, Uint40, VertexId,
    INVALID_EDGE_ID, INVALID_VERTEX_ID,
};
pub use markers::{Marker, MarkerStore};
pub use reads::{Base, ReadRepresentation, ReadStore};
