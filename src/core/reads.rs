//! Read storage with random access to the bases and repeat counts of an
//! oriented read.
//!
//! Reads are stored once, on strand 0; strand 1 accesses mirror the
//! coordinates and complement the base. Reads may be raw or run-length
//! encoded; a single [`ReadRepresentation`] flag selects the path.

use crate::core::ids::{OrientedReadId, ReadId, Strand};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single DNA base, 2-bit encoded (A=0, C=1, G=2, T=3).
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Base(u8);

impl Base {
    pub fn from_value(value: u8) -> Self {
        debug_assert!(value < 4);
        Base(value)
    }

    pub fn from_char(c: char) -> Result<Self> {
        Ok(Base(match c {
            'A' | 'a' => 0,
            'C' | 'c' => 1,
            'G' | 'g' => 2,
            'T' | 't' => 3,
            _ => bail!("invalid base character {c:?}"),
        }))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn to_char(self) -> char {
        match self.0 {
            0 => 'A',
            1 => 'C',
            2 => 'G',
            _ => 'T',
        }
    }

    pub fn complement(self) -> Self {
        Base(3 - self.0)
    }
}

impl fmt::Display for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

impl fmt::Debug for Base {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Whether reads are stored raw or in run-length encoded form.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
pub enum ReadRepresentation {
    Raw,
    #[default]
    RunLength,
}

/// Per-read flags maintained by upstream stages.
#[derive(Copy, Clone, Default, Debug)]
pub struct ReadFlags {
    pub is_chimeric: bool,
}

struct StoredRead {
    bases: Vec<Base>,
    /// Repeat counts, parallel to `bases`. All 1 for raw reads.
    repeat_counts: Vec<u8>,
    flags: ReadFlags,
}

/// In-memory read store exposing the interface the marker graph core consumes.
pub struct ReadStore {
    representation: ReadRepresentation,
    reads: Vec<StoredRead>,
}

impl ReadStore {
    pub fn new(representation: ReadRepresentation) -> Self {
        ReadStore {
            representation,
            reads: Vec::new(),
        }
    }

    pub fn representation(&self) -> ReadRepresentation {
        self.representation
    }

    pub fn read_count(&self) -> usize {
        self.reads.len()
    }

    /// Add a read from its raw base sequence. Run-length compresses when the
    /// store holds RLE reads.
    pub fn add_read(&mut self, sequence: &str) -> Result<ReadId> {
        let raw: Vec<Base> = sequence
            .chars()
            .map(Base::from_char)
            .collect::<Result<_>>()?;
        if raw.is_empty() {
            bail!("cannot add an empty read");
        }
        let (bases, repeat_counts) = match self.representation {
            ReadRepresentation::Raw => {
                let n = raw.len();
                (raw, vec![1u8; n])
            }
            ReadRepresentation::RunLength => {
                let mut bases = Vec::new();
                let mut counts: Vec<u8> = Vec::new();
                for base in raw {
                    if bases.last() == Some(&base) && *counts.last().unwrap() < u8::MAX {
                        *counts.last_mut().unwrap() += 1;
                    } else {
                        bases.push(base);
                        counts.push(1);
                    }
                }
                (bases, counts)
            }
        };
        let read_id = self.reads.len() as ReadId;
        self.reads.push(StoredRead {
            bases,
            repeat_counts,
            flags: ReadFlags::default(),
        });
        Ok(read_id)
    }

    pub fn set_chimeric(&mut self, read_id: ReadId, is_chimeric: bool) {
        self.reads[read_id as usize].flags.is_chimeric = is_chimeric;
    }

    pub fn flags(&self, read_id: ReadId) -> ReadFlags {
        self.reads[read_id as usize].flags
    }

    /// Length of the read in stored coordinates (RLE length for RLE reads).
    pub fn read_length(&self, read_id: ReadId) -> usize {
        self.reads[read_id as usize].bases.len()
    }

    /// Base at a position of an oriented read. Strand 1 mirrors the position
    /// and complements the base.
    pub fn base(&self, oriented_read: OrientedReadId, position: u32) -> Base {
        let read = &self.reads[oriented_read.read_id() as usize];
        match oriented_read.strand() as Strand {
            0 => read.bases[position as usize],
            _ => read.bases[read.bases.len() - 1 - position as usize].complement(),
        }
    }

    /// Base and repeat count at a position of an oriented read.
    pub fn base_and_repeat_count(&self, oriented_read: OrientedReadId, position: u32) -> (Base, u8) {
        let read = &self.reads[oriented_read.read_id() as usize];
        let index = match oriented_read.strand() as Strand {
            0 => position as usize,
            _ => read.bases.len() - 1 - position as usize,
        };
        let base = match oriented_read.strand() {
            0 => read.bases[index],
            _ => read.bases[index].complement(),
        };
        (base, read.repeat_counts[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_complement() {
        for (c, comp) in [('A', 'T'), ('C', 'G'), ('G', 'C'), ('T', 'A')] {
            let b = Base::from_char(c).unwrap();
            assert_eq!(b.complement().to_char(), comp);
            assert_eq!(b.complement().complement(), b);
        }
        assert!(Base::from_char('N').is_err());
    }

    #[test]
    fn test_raw_read_access() {
        let mut store = ReadStore::new(ReadRepresentation::Raw);
        let r = store.add_read("ACGT").unwrap();
        let fwd = OrientedReadId::new(r, 0);
        let rev = OrientedReadId::new(r, 1);
        let fwd_str: String = (0..4).map(|i| store.base(fwd, i).to_char()).collect();
        let rev_str: String = (0..4).map(|i| store.base(rev, i).to_char()).collect();
        assert_eq!(fwd_str, "ACGT");
        // Reverse complement of ACGT is itself.
        assert_eq!(rev_str, "ACGT");
    }

    #[test]
    fn test_rle_compression_and_counts() {
        let mut store = ReadStore::new(ReadRepresentation::RunLength);
        let r = store.add_read("AACGGGT").unwrap();
        assert_eq!(store.read_length(r), 4);
        let fwd = OrientedReadId::new(r, 0);
        assert_eq!(store.base_and_repeat_count(fwd, 0), (Base::from_char('A').unwrap(), 2));
        assert_eq!(store.base_and_repeat_count(fwd, 2), (Base::from_char('G').unwrap(), 3));
        // Strand 1 of AACGGGT (RLE ACGT, counts 2,1,3,1) is ACCCGTT (RLE ACGT, counts 1,3,1,2).
        let rev = OrientedReadId::new(r, 1);
        assert_eq!(store.base_and_repeat_count(rev, 0), (Base::from_char('A').unwrap(), 1));
        assert_eq!(store.base_and_repeat_count(rev, 1), (Base::from_char('C').unwrap(), 3));
        assert_eq!(store.base_and_repeat_count(rev, 3), (Base::from_char('T').unwrap(), 2));
    }

    #[test]
    fn test_chimeric_flag() {
        let mut store = ReadStore::new(ReadRepresentation::Raw);
        let r = store.add_read("ACGT").unwrap();
        assert!(!store.flags(r).is_chimeric);
        store.set_chimeric(r, true);
        assert!(store.flags(r).is_chimeric);
    }
}
