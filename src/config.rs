//! Configuration for the marker graph core.
//!
//! Plain serde structs with defaults and validation. File loading and CLI
//! parsing live with the embedding application; these structs are the
//! interface it fills in.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("min_coverage ({min}) must not exceed max_coverage ({max})")]
    CoverageRange { min: usize, max: usize },
    #[error("peak finder min_area_fraction must be in (0, 1], got {0}")]
    AreaFraction(f64),
    #[error("high_coverage_threshold ({high}) must exceed low_coverage_threshold ({low})")]
    CoverageThresholds { low: usize, high: usize },
    #[error("transitive reduction max_distance must be at least 1")]
    MaxDistance,
    #[error("consensus match score must be positive and penalties negative")]
    AlignmentScores,
}

/// Vertex formation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerGraphConfig {
    /// Minimum number of markers for a vertex to be kept. Zero selects the
    /// value automatically from the disjoint-set size histogram.
    pub min_coverage: usize,
    /// Maximum number of markers for a vertex to be kept.
    pub max_coverage: usize,
    /// Minimum number of markers required on each strand.
    pub min_coverage_per_strand: usize,
    /// Allow more than one marker from the same oriented read in a vertex.
    pub allow_duplicate_markers: bool,
    /// Fraction of histogram area the main peak must cover for automatic
    /// min_coverage selection to be trusted.
    pub peak_finder_min_area_fraction: f64,
    /// Histogram index where area accounting starts, excluding the
    /// low-coverage error peak.
    pub peak_finder_area_start_index: usize,
    /// Worker threads; zero means one per hardware thread.
    pub thread_count: usize,
    /// Emit diagnostic CSV files into the storage directory.
    pub debug_output: bool,
}

impl Default for MarkerGraphConfig {
    fn default() -> Self {
        MarkerGraphConfig {
            min_coverage: 0,
            max_coverage: 100,
            min_coverage_per_strand: 0,
            allow_duplicate_markers: false,
            peak_finder_min_area_fraction: 0.08,
            peak_finder_area_start_index: 10,
            thread_count: 0,
            debug_output: false,
        }
    }
}

impl MarkerGraphConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_coverage > self.max_coverage && self.min_coverage != 0 {
            return Err(ConfigError::CoverageRange {
                min: self.min_coverage,
                max: self.max_coverage,
            });
        }
        if !(self.peak_finder_min_area_fraction > 0.0
            && self.peak_finder_min_area_fraction <= 1.0)
        {
            return Err(ConfigError::AreaFraction(self.peak_finder_min_area_fraction));
        }
        Ok(())
    }
}

/// Graph refinement parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefinementConfig {
    /// Edges with coverage at or below this are removed outright.
    pub low_coverage_threshold: usize,
    /// Edges with coverage at or above this are never touched.
    pub high_coverage_threshold: usize,
    /// Maximum BFS depth when searching for an alternative path.
    pub max_distance: usize,
    /// Coverage-1 edges whose single marker interval skips more ordinals
    /// than this are removed.
    pub marker_skip_threshold: u32,
    /// Leaf pruning iterations.
    pub prune_iteration_count: usize,
    /// Bubble/super-bubble removal schedule: one maximum assembly-graph
    /// edge length per iteration.
    pub simplify_max_lengths: Vec<usize>,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        RefinementConfig {
            low_coverage_threshold: 1,
            high_coverage_threshold: 256,
            max_distance: 30,
            marker_skip_threshold: 100,
            prune_iteration_count: 6,
            simplify_max_lengths: vec![10, 100, 1000],
        }
    }
}

impl RefinementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.high_coverage_threshold <= self.low_coverage_threshold {
            return Err(ConfigError::CoverageThresholds {
                low: self.low_coverage_threshold,
                high: self.high_coverage_threshold,
            });
        }
        if self.max_distance == 0 {
            return Err(ConfigError::MaxDistance);
        }
        Ok(())
    }
}

/// Consensus computation parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Marker intervals skipping more ordinals than this short-circuit edge
    /// consensus to the shortest interval's sequence.
    pub edge_length_threshold: u32,
    /// Marker intervals spanning more stored bases than this do the same.
    pub long_interval_base_threshold: u32,
    /// Alignment scores handed to the partial-order aligner.
    pub match_score: i8,
    pub mismatch_score: i8,
    pub gap_score: i8,
    /// Record per-position coverage data alongside the consensus.
    pub store_coverage_data: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig {
            edge_length_threshold: 1000,
            long_interval_base_threshold: 1000,
            match_score: 1,
            mismatch_score: -1,
            gap_score: -1,
            store_coverage_data: false,
        }
    }
}

impl ConsensusConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.match_score <= 0 || self.mismatch_score >= 0 || self.gap_score >= 0 {
            return Err(ConfigError::AlignmentScores);
        }
        Ok(())
    }
}
