//! Memory-mapped bulk storage for the large marker graph tables.

pub mod mapped_vec;
pub mod ragged;

pub use mapped_vec::{MappedElement, MappedVec};
pub use ragged::RaggedArray;
