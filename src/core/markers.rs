//! Marker storage: the ordered markers of every oriented read, the dense
//! `MarkerId` bijection with `(oriented_read, ordinal)`, and reverse
//! complement lookup.
//!
//! A marker is a fixed-length k-mer occurrence at a specific position of an
//! oriented read. The markers of the two strands of a read mirror each
//! other: ordinal `i` on one strand corresponds to ordinal
//! `marker_count - 1 - i` on the other, with the reverse-complement k-mer.

use crate::core::ids::{KmerId, MarkerId, OrientedReadId};
use crate::core::reads::ReadStore;

/// One marker of an oriented read.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Marker {
    pub kmer_id: KmerId,
    /// Position of the first base of the k-mer in the oriented read.
    pub position: u32,
}

/// Encode k bases of an oriented read as a dense k-mer id, 2 bits per base,
/// first base in the most significant position.
pub fn encode_kmer(reads: &ReadStore, oriented_read: OrientedReadId, position: u32, k: usize) -> KmerId {
    let mut id: u64 = 0;
    for i in 0..k {
        id = (id << 2) | u64::from(reads.base(oriented_read, position + i as u32).value());
    }
    id
}

/// The k-mer id of the reverse complement k-mer.
pub fn reverse_complement_kmer(kmer_id: KmerId, k: usize) -> KmerId {
    let mut rc: u64 = 0;
    let mut id = kmer_id;
    for _ in 0..k {
        rc = (rc << 2) | (3 - (id & 3));
        id >>= 2;
    }
    rc
}

/// Markers of all oriented reads, with dense marker ids.
///
/// Oriented reads are indexed by their dense value; each read appears twice,
/// once per strand, and the global marker id space is the concatenation of
/// the per-oriented-read marker lists in that order.
pub struct MarkerStore {
    k: usize,
    markers: Vec<Vec<Marker>>,
    /// Prefix sums over `markers`, one entry per oriented read plus a final
    /// total, so `offsets[v] + ordinal` is the marker id.
    offsets: Vec<u64>,
}

impl MarkerStore {
    /// Generate markers for every oriented read of the store by scanning all
    /// k-mer positions and keeping those the predicate accepts.
    pub fn build<F>(reads: &ReadStore, k: usize, mut is_marker: F) -> Self
    where
        F: FnMut(KmerId) -> bool,
    {
        let mut markers = Vec::with_capacity(reads.read_count() * 2);
        for read_id in 0..reads.read_count() as u32 {
            for strand in 0..2u32 {
                let oriented_read = OrientedReadId::new(read_id, strand);
                let length = reads.read_length(read_id);
                let mut list = Vec::new();
                if length >= k {
                    for position in 0..=(length - k) as u32 {
                        let kmer_id = encode_kmer(reads, oriented_read, position, k);
                        if is_marker(kmer_id) {
                            list.push(Marker { kmer_id, position });
                        }
                    }
                }
                markers.push(list);
            }
        }
        Self::from_markers(k, markers)
    }

    /// Build from explicit per-oriented-read marker lists, indexed by the
    /// dense oriented read value.
    pub fn from_markers(k: usize, markers: Vec<Vec<Marker>>) -> Self {
        let mut offsets = Vec::with_capacity(markers.len() + 1);
        let mut total = 0u64;
        for list in &markers {
            offsets.push(total);
            total += list.len() as u64;
        }
        offsets.push(total);
        MarkerStore { k, markers, offsets }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Total number of markers over all oriented reads.
    pub fn total_count(&self) -> u64 {
        *self.offsets.last().unwrap()
    }

    pub fn count(&self, oriented_read: OrientedReadId) -> usize {
        self.markers[oriented_read.value() as usize].len()
    }

    pub fn markers(&self, oriented_read: OrientedReadId) -> &[Marker] {
        &self.markers[oriented_read.value() as usize]
    }

    pub fn marker_id(&self, oriented_read: OrientedReadId, ordinal: u32) -> MarkerId {
        self.offsets[oriented_read.value() as usize] + u64::from(ordinal)
    }

    /// Invert the dense marker id back to `(oriented_read, ordinal)`.
    pub fn find(&self, marker_id: MarkerId) -> (OrientedReadId, u32) {
        let v = self.offsets.partition_point(|&offset| offset <= marker_id) - 1;
        let oriented_read = OrientedReadId::from_value(v as u32);
        let ordinal = (marker_id - self.offsets[v]) as u32;
        (oriented_read, ordinal)
    }

    pub fn marker(&self, marker_id: MarkerId) -> Marker {
        let (oriented_read, ordinal) = self.find(marker_id);
        self.markers[oriented_read.value() as usize][ordinal as usize]
    }

    /// The marker of the opposite strand covering the same read positions.
    pub fn reverse_complement(&self, marker_id: MarkerId) -> MarkerId {
        let (oriented_read, ordinal) = self.find(marker_id);
        let flipped = oriented_read.flipped();
        let count = self.count(flipped) as u32;
        self.marker_id(flipped, count - 1 - ordinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reads::ReadRepresentation;

    fn store_with(sequences: &[&str], k: usize) -> (ReadStore, MarkerStore) {
        let mut reads = ReadStore::new(ReadRepresentation::Raw);
        for s in sequences {
            reads.add_read(s).unwrap();
        }
        let markers = MarkerStore::build(&reads, k, |_| true);
        (reads, markers)
    }

    #[test]
    fn test_kmer_encoding() {
        let mut reads = ReadStore::new(ReadRepresentation::Raw);
        let r = reads.add_read("ACGT").unwrap();
        let o = OrientedReadId::new(r, 0);
        // A=0 C=1 G=2 T=3 -> 0b00011011
        assert_eq!(encode_kmer(&reads, o, 0, 4), 0b00011011);
        assert_eq!(reverse_complement_kmer(0b00011011, 4), 0b00011011);
        // AC -> rc GT
        assert_eq!(reverse_complement_kmer(0b0001, 2), 0b1011);
    }

    #[test]
    fn test_marker_id_bijection() {
        let (_, markers) = store_with(&["ACGTAC", "TTTT"], 3);
        let total = markers.total_count();
        for marker_id in 0..total {
            let (o, ordinal) = markers.find(marker_id);
            assert_eq!(markers.marker_id(o, ordinal), marker_id);
        }
        // Read 0 has 4 k-mers per strand, read 1 has 2.
        assert_eq!(total, 4 + 4 + 2 + 2);
    }

    #[test]
    fn test_reverse_complement_involution_and_kmer() {
        let (_, markers) = store_with(&["ACGTACGT", "GGATCC"], 4);
        for marker_id in 0..markers.total_count() {
            let rc = markers.reverse_complement(marker_id);
            assert_eq!(markers.reverse_complement(rc), marker_id);
            let m = markers.marker(marker_id);
            let mrc = markers.marker(rc);
            assert_eq!(mrc.kmer_id, reverse_complement_kmer(m.kmer_id, 4));
        }
    }
}
