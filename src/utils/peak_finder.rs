//! Histogram peak analysis for automatic coverage threshold selection.
//!
//! The disjoint-set size histogram of a typical run has a tall peak at very
//! low coverage (alignment errors), a trough, and a broad genomic peak. When
//! the minimum vertex coverage is not specified, we locate the main peak,
//! check that it accounts for enough of the histogram area to be trusted,
//! and return the trough position between the error peak and the main peak
//! as the coverage cutoff.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PeakFinderError {
    #[error("histogram has no usable peak")]
    NoPeak,
    #[error(
        "no significant cutoff found: observed peak has {observed_percent_area:.2}% of total \
         area, minimum is {min_percent_area:.2}%"
    )]
    InsufficientArea {
        observed_percent_area: f64,
        min_percent_area: f64,
    },
}

/// A local maximum of the histogram with the extent of its basin.
#[derive(Debug, Clone, Copy)]
pub struct Peak {
    pub position: usize,
    pub height: u64,
    /// Basin boundaries: nearest positions, on each side, where the
    /// histogram stops descending.
    pub left: usize,
    pub right: usize,
}

/// Find all local maxima of the histogram, with their basins.
pub fn find_peaks(histogram: &[u64]) -> Vec<Peak> {
    let n = histogram.len();
    let mut peaks = Vec::new();
    let mut i = 0;
    while i < n {
        let height = histogram[i];
        if height == 0 {
            i += 1;
            continue;
        }
        // A peak may be a plateau; find its extent.
        let mut j = i;
        while j + 1 < n && histogram[j + 1] == height {
            j += 1;
        }
        let rises_left = i == 0 || histogram[i - 1] < height;
        let rises_right = j + 1 == n || histogram[j + 1] < height;
        if rises_left && rises_right {
            // Walk outward while the histogram keeps descending.
            let mut left = i;
            while left > 0 && histogram[left - 1] <= histogram[left] {
                left -= 1;
            }
            let mut right = j;
            while right + 1 < n && histogram[right + 1] <= histogram[right] {
                right += 1;
            }
            peaks.push(Peak {
                position: i,
                height,
                left,
                right,
            });
        }
        i = j + 1;
    }
    peaks
}

/// Select the coverage cutoff from the disjoint-set size histogram.
///
/// `min_area_fraction` is the fraction of total histogram area (counted from
/// `area_start_index` on) that the chosen peak's basin must cover;
/// `area_start_index` excludes the low-coverage error peak from both the
/// candidate peaks and the area normalization.
pub fn find_coverage_cutoff(
    histogram: &[u64],
    min_area_fraction: f64,
    area_start_index: usize,
) -> Result<usize, PeakFinderError> {
    let peaks = find_peaks(histogram);

    // The main peak: the highest local maximum at or past the start index.
    let main_peak = peaks
        .iter()
        .filter(|p| p.position >= area_start_index)
        .max_by_key(|p| p.height)
        .copied()
        .ok_or(PeakFinderError::NoPeak)?;

    let total_area: u64 = histogram.iter().skip(area_start_index).sum();
    let area_begin = main_peak.left.max(area_start_index);
    let peak_area: u64 = histogram[area_begin..=main_peak.right].iter().sum();
    let observed = peak_area as f64 / total_area.max(1) as f64;
    if observed < min_area_fraction {
        return Err(PeakFinderError::InsufficientArea {
            observed_percent_area: observed * 100.0,
            min_percent_area: min_area_fraction * 100.0,
        });
    }

    // Cutoff: position of the histogram minimum between the start of the
    // distribution and the main peak (the trough after the error peak).
    let search_begin = 1usize;
    let mut cutoff = search_begin;
    let mut best = u64::MAX;
    for (x, &frequency) in histogram
        .iter()
        .enumerate()
        .take(main_peak.position + 1)
        .skip(search_begin)
    {
        if frequency < best {
            best = frequency;
            cutoff = x;
        }
    }
    Ok(cutoff)
}
