//! Ragged arrays: a vector of variable-length vectors stored contiguously.
//!
//! Two filling disciplines are supported, matching how the big tables are
//! actually produced:
//!
//! - **Two-pass bucketing**: `begin_pass1(n)` then per-item count increments
//!   (serial or atomic), `begin_pass2()` to turn counts into offsets, then
//!   per-item stores into reserved slots, and `end_pass2()` which verifies
//!   every bucket was filled exactly.
//! - **Sequential append**: `append_vector()` opens a new bucket and
//!   `append(value)` extends it; used by single-threaded gather loops.

use crate::storage::mapped_vec::{MappedElement, MappedVec};
use anyhow::{bail, Result};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct RaggedArray<T: MappedElement> {
    data: MappedVec<T>,
    /// Bucket boundaries; `offsets[i]..offsets[i+1]` indexes bucket `i`.
    offsets: Vec<u64>,
    /// Pass-1 counts, then pass-2 write cursors.
    toc: Vec<AtomicU64>,
}

impl<T: MappedElement> RaggedArray<T> {
    pub fn create(dir: &Path, name: &str) -> Result<Self> {
        Ok(RaggedArray {
            data: MappedVec::create(dir, name)?,
            offsets: vec![0],
            toc: Vec::new(),
        })
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.offsets.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of stored elements.
    pub fn total_len(&self) -> usize {
        self.data.len()
    }

    pub fn bucket(&self, index: usize) -> &[T] {
        let begin = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &self.data.as_slice()[begin..end]
    }

    pub fn bucket_len(&self, index: usize) -> usize {
        (self.offsets[index + 1] - self.offsets[index]) as usize
    }

    pub fn bucket_mut(&mut self, index: usize) -> &mut [T] {
        let begin = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        &mut self.data.as_mut_slice()[begin..end]
    }

    /// Mutable bucket access through a shared reference, for phases that
    /// hand disjoint buckets to different threads (e.g. parallel per-bucket
    /// sorting).
    ///
    /// # Safety
    /// Concurrent callers must touch disjoint buckets only.
    pub unsafe fn bucket_mut_unsynchronized(&self, index: usize) -> &mut [T] {
        let begin = self.offsets[index] as usize;
        let end = self.offsets[index + 1] as usize;
        self.data.slice_mut_shared(begin, end - begin)
    }

    // ---- two-pass bucketing ----

    pub fn begin_pass1(&mut self, bucket_count: usize) {
        self.toc = (0..bucket_count).map(|_| AtomicU64::new(0)).collect();
    }

    /// Serial count increment for bucket `index`.
    pub fn increment_count(&mut self, index: usize) {
        *self.toc[index].get_mut() += 1;
    }

    /// Thread-safe count increment for bucket `index`.
    pub fn increment_count_multithreaded(&self, index: usize) {
        self.toc[index].fetch_add(1, Ordering::Relaxed);
    }

    /// Turn the counts into offsets and allocate the data area. After this,
    /// the toc entries are write cursors positioned at each bucket start.
    pub fn begin_pass2(&mut self) -> Result<()> {
        let bucket_count = self.toc.len();
        self.offsets = Vec::with_capacity(bucket_count + 1);
        let mut total = 0u64;
        for entry in &mut self.toc {
            self.offsets.push(total);
            total += *entry.get_mut();
        }
        self.offsets.push(total);
        for (entry, &offset) in self.toc.iter_mut().zip(&self.offsets) {
            *entry.get_mut() = offset;
        }
        self.data.reserve_and_resize(total as usize)
    }

    /// Serial store into the next slot of bucket `index`.
    pub fn store(&mut self, index: usize, value: T) {
        let slot = *self.toc[index].get_mut();
        *self.toc[index].get_mut() = slot + 1;
        self.data[slot as usize] = value;
    }

    /// Thread-safe store: reserves a slot with an atomic cursor bump, then
    /// writes it. Each slot is written exactly once, so plain stores into
    /// the reserved slot are race-free.
    pub fn store_multithreaded(&self, index: usize, value: T) {
        let slot = self.toc[index].fetch_add(1, Ordering::Relaxed);
        unsafe { self.data.write_shared(slot as usize, value) };
    }

    /// Verify every bucket was filled to its boundary and drop the cursors.
    pub fn end_pass2(&mut self) -> Result<()> {
        for (index, entry) in self.toc.iter_mut().enumerate() {
            let cursor = *entry.get_mut();
            if cursor != self.offsets[index + 1] {
                bail!(
                    "ragged array bucket {index} not fully stored: cursor {cursor}, expected {}",
                    self.offsets[index + 1]
                );
            }
        }
        self.toc = Vec::new();
        Ok(())
    }

    // ---- sequential append ----

    pub fn append_vector(&mut self) {
        let end = *self.offsets.last().unwrap();
        self.offsets.push(end);
    }

    pub fn append(&mut self, value: T) -> Result<()> {
        self.data.push(value)?;
        *self.offsets.last_mut().unwrap() += 1;
        Ok(())
    }

    pub fn unreserve(&mut self) -> Result<()> {
        self.data.unreserve()
    }

    pub fn remove(self) -> Result<()> {
        self.data.remove()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[T]> {
        (0..self.len()).map(move |i| self.bucket(i))
    }
}
