//! Base and repeat-count coverage at one position, collected across reads.

use crate::core::ids::Strand;
use crate::core::reads::Base;
use crate::storage::MappedElement;

/// A base or an alignment gap. Values 0-3 are bases, 4 is the gap.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct AlignedBase(u8);

impl AlignedBase {
    pub const GAP: AlignedBase = AlignedBase(4);

    pub fn from_base(base: Base) -> Self {
        AlignedBase(base.value())
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '-' => Some(Self::GAP),
            _ => Base::from_char(c).ok().map(Self::from_base),
        }
    }

    pub fn is_gap(self) -> bool {
        self.0 == 4
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// The base, for non-gap values.
    pub fn to_base(self) -> Option<Base> {
        (!self.is_gap()).then(|| Base::from_value(self.0))
    }

    pub fn to_char(self) -> char {
        match self.to_base() {
            Some(base) => base.to_char(),
            None => '-',
        }
    }
}

/// One read's contribution to the coverage of a position.
#[derive(Copy, Clone, Debug)]
pub struct CoverageData {
    pub base: AlignedBase,
    pub strand: Strand,
    /// Zero for gap contributions.
    pub repeat_count: u64,
}

/// Compressed per-position coverage: one record per distinct
/// (base, strand, repeat count), with its frequency.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CompressedCoverageData {
    pub base: u8,
    pub strand: u8,
    pub repeat_count: u8,
    pub frequency: u8,
}

unsafe impl MappedElement for CompressedCoverageData {}

/// Compressed coverage tagged with the consensus position it belongs to.
#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct PositionedCoverageData {
    pub position: u32,
    pub data: CompressedCoverageData,
}

unsafe impl MappedElement for PositionedCoverageData {}

/// Coverage of one position: the (base, strand, repeat count) contributions
/// of all reads covering it.
#[derive(Default)]
pub struct Coverage {
    data: Vec<CoverageData>,
}

impl Coverage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_read(&mut self, base: AlignedBase, strand: Strand, repeat_count: u64) {
        debug_assert!(!base.is_gap() || repeat_count == 0);
        self.data.push(CoverageData {
            base,
            strand,
            repeat_count,
        });
    }

    pub fn read_coverage_data(&self) -> &[CoverageData] {
        &self.data
    }

    pub fn read_count(&self) -> usize {
        self.data.len()
    }

    /// Number of reads contributing the given aligned base.
    pub fn base_frequency(&self, base: AlignedBase) -> usize {
        self.data.iter().filter(|d| d.base == base).count()
    }

    /// The most frequent aligned base. Ties resolve to the smaller base
    /// value, with the gap last.
    pub fn most_frequent_base(&self) -> AlignedBase {
        let mut best = AlignedBase(0);
        let mut best_frequency = 0usize;
        for value in 0..=4u8 {
            let base = AlignedBase(value);
            let frequency = self.base_frequency(base);
            if frequency > best_frequency {
                best_frequency = frequency;
                best = base;
            }
        }
        best
    }

    /// The most frequent repeat count among reads carrying `base`. Ties
    /// resolve to the smaller count.
    pub fn most_frequent_repeat_count(&self, base: AlignedBase) -> u64 {
        let mut frequencies: Vec<(u64, usize)> = Vec::new();
        for d in self.data.iter().filter(|d| d.base == base) {
            match frequencies.iter_mut().find(|(count, _)| *count == d.repeat_count) {
                Some((_, f)) => *f += 1,
                None => frequencies.push((d.repeat_count, 1)),
            }
        }
        frequencies.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        let mut best = 0u64;
        let mut best_frequency = 0usize;
        for (count, frequency) in frequencies {
            if frequency > best_frequency {
                best_frequency = frequency;
                best = count;
            }
        }
        best
    }

    /// Group the contributions by (base, strand, repeat count).
    pub fn compress(&self) -> Vec<CompressedCoverageData> {
        let mut compressed: Vec<CompressedCoverageData> = Vec::new();
        for d in &self.data {
            let repeat_count = d.repeat_count.min(255) as u8;
            match compressed.iter_mut().find(|c| {
                c.base == d.base.value() && c.strand == d.strand as u8 && c.repeat_count == repeat_count
            }) {
                Some(c) => c.frequency = c.frequency.saturating_add(1),
                None => compressed.push(CompressedCoverageData {
                    base: d.base.value(),
                    strand: d.strand as u8,
                    repeat_count,
                    frequency: 1,
                }),
            }
        }
        compressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(c: char) -> AlignedBase {
        AlignedBase::from_char(c).unwrap()
    }

    #[test]
    fn test_most_frequent_base_and_count() {
        let mut coverage = Coverage::new();
        coverage.add_read(base('A'), 0, 3);
        coverage.add_read(base('A'), 1, 3);
        coverage.add_read(base('A'), 0, 2);
        coverage.add_read(base('C'), 1, 5);
        assert_eq!(coverage.most_frequent_base(), base('A'));
        assert_eq!(coverage.most_frequent_repeat_count(base('A')), 3);
        assert_eq!(coverage.base_frequency(base('C')), 1);
    }

    #[test]
    fn test_gap_contributions() {
        let mut coverage = Coverage::new();
        coverage.add_read(AlignedBase::GAP, 0, 0);
        coverage.add_read(AlignedBase::GAP, 1, 0);
        coverage.add_read(base('T'), 0, 1);
        assert_eq!(coverage.most_frequent_base(), AlignedBase::GAP);
    }

    #[test]
    fn test_compress_groups() {
        let mut coverage = Coverage::new();
        coverage.add_read(base('G'), 0, 2);
        coverage.add_read(base('G'), 0, 2);
        coverage.add_read(base('G'), 1, 2);
        let compressed = coverage.compress();
        assert_eq!(compressed.len(), 2);
        assert_eq!(compressed[0].frequency, 2);
        assert_eq!(compressed[1].strand, 1);
    }
}
