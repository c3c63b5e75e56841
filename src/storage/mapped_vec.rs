//! File-backed, memory-mapped typed vectors.
//!
//! All large tables of the marker graph live in named, memory-mapped files
//! under a storage directory, are filled in multiple passes, compacted in
//! place when their width shrinks, and removed as soon as the next stage no
//! longer needs them. Names beginning `tmp-` are scratch.

use anyhow::{bail, Context, Result};
use memmap2::MmapMut;
use std::fs::{File, OpenOptions};
use std::marker::PhantomData;
use std::ops::{Index, IndexMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;

/// Allocation granularity for backing files. Multiples of this stay friendly
/// to transparent huge pages.
const CHUNK_BYTES: usize = 2 * 1024 * 1024;

/// Marker for element types that can live in a memory-mapped file: plain
/// data with no pointers, valid for any bit pattern the file may hold.
///
/// # Safety
/// Implementors must be `#[repr(C)]` (or primitive), contain no references,
/// and tolerate arbitrary byte content.
pub unsafe trait MappedElement: Copy + 'static {}

unsafe impl MappedElement for u8 {}
unsafe impl MappedElement for u32 {}
unsafe impl MappedElement for u64 {}
unsafe impl MappedElement for i32 {}
unsafe impl MappedElement for crate::core::ids::Uint40 {}
unsafe impl MappedElement for crate::core::ids::MarkerInterval {}

/// A typed vector backed by a named memory-mapped file.
pub struct MappedVec<T: MappedElement> {
    file: File,
    path: PathBuf,
    mmap: Option<MmapMut>,
    ptr: *mut T,
    len: usize,
    capacity: usize,
    _marker: PhantomData<T>,
}

// The raw pointer tracks the mmap, which is owned by the struct; concurrent
// use is restricted to the explicitly unsafe shared-write entry points.
unsafe impl<T: MappedElement> Send for MappedVec<T> {}
unsafe impl<T: MappedElement> Sync for MappedVec<T> {}

impl<T: MappedElement> MappedVec<T> {
    /// Create a new empty vector backed by `dir/name`. Truncates any
    /// leftover file with the same name.
    pub fn create(dir: &Path, name: &str) -> Result<Self> {
        let path = dir.join(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("creating mapped vector {}", path.display()))?;
        Ok(MappedVec {
            file,
            path,
            mmap: None,
            ptr: std::ptr::null_mut(),
            len: 0,
            capacity: 0,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn remap(&mut self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            // A zero-length file cannot be mapped.
            self.mmap = None;
            self.ptr = std::ptr::null_mut();
            self.capacity = 0;
            self.file
                .set_len(0)
                .with_context(|| format!("truncating {}", self.path.display()))?;
            return Ok(());
        }
        let bytes = (capacity * std::mem::size_of::<T>()).next_multiple_of(CHUNK_BYTES);
        let capacity = if std::mem::size_of::<T>() == 0 {
            capacity
        } else {
            bytes / std::mem::size_of::<T>()
        };
        self.mmap = None; // unmap before resizing the file
        self.file
            .set_len(bytes as u64)
            .with_context(|| format!("resizing {}", self.path.display()))?;
        let mut mmap = unsafe { MmapMut::map_mut(&self.file) }
            .with_context(|| format!("mapping {}", self.path.display()))?;
        self.ptr = mmap.as_mut_ptr() as *mut T;
        self.mmap = Some(mmap);
        self.capacity = capacity;
        Ok(())
    }

    /// Allocate backing storage for exactly `len` elements and set the
    /// length. Newly mapped pages read as zero.
    pub fn reserve_and_resize(&mut self, len: usize) -> Result<()> {
        if len > self.capacity {
            self.remap(len)?;
        }
        self.len = len;
        Ok(())
    }

    /// Shrink the logical length without touching the backing file.
    pub fn truncate(&mut self, len: usize) {
        assert!(len <= self.len);
        self.len = len;
    }

    /// Give back backing pages beyond the current length.
    pub fn unreserve(&mut self) -> Result<()> {
        if self.capacity > self.len {
            self.remap(self.len)?;
        }
        Ok(())
    }

    pub fn push(&mut self, value: T) -> Result<()> {
        if self.len == self.capacity {
            let grown = (self.capacity * 2).max(CHUNK_BYTES / std::mem::size_of::<T>().max(1));
            self.remap(grown)?;
        }
        unsafe { self.ptr.add(self.len).write(value) };
        self.len += 1;
        Ok(())
    }

    pub fn fill(&mut self, value: T) {
        for slot in self.as_mut_slice() {
            *slot = value;
        }
    }

    pub fn as_slice(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.as_slice().iter()
    }

    /// Store through a shared reference into a slot this caller has
    /// exclusively reserved (e.g. via an atomic cursor).
    ///
    /// # Safety
    /// No other thread may read or write `index` concurrently.
    pub unsafe fn write_shared(&self, index: usize, value: T) {
        debug_assert!(index < self.len);
        self.ptr.add(index).write(value);
    }

    /// Mutable view of a sub-range through a shared reference, for phases
    /// that partition the vector into disjoint per-thread ranges.
    ///
    /// # Safety
    /// Ranges handed to concurrent callers must not overlap, and nothing
    /// may read the range while it is borrowed.
    pub unsafe fn slice_mut_shared(&self, begin: usize, len: usize) -> &mut [T] {
        debug_assert!(begin + len <= self.len);
        std::slice::from_raw_parts_mut(self.ptr.add(begin), len)
    }

    /// Delete the backing file. Consumes the vector.
    pub fn remove(mut self) -> Result<()> {
        self.mmap = None;
        std::fs::remove_file(&self.path)
            .with_context(|| format!("removing {}", self.path.display()))?;
        Ok(())
    }
}

impl MappedVec<u64> {
    /// View the buffer as atomics for lock-free phases. `AtomicU64` has the
    /// same layout as `u64`, and every access through the view is atomic.
    pub fn as_atomic_slice(&self) -> &[AtomicU64] {
        unsafe { std::slice::from_raw_parts(self.ptr as *const AtomicU64, self.len) }
    }

    /// Compact a `2n`-element table in place to its `n` even-indexed entries,
    /// then drop the second half. Used for the 128-to-64-bit disjoint-set
    /// transition.
    pub fn compact_pairs(&mut self) -> Result<()> {
        if self.len % 2 != 0 {
            bail!("compact_pairs on a vector of odd length {}", self.len);
        }
        let n = self.len / 2;
        let slice = self.as_mut_slice();
        for i in 0..n {
            slice[i] = slice[2 * i];
        }
        self.truncate(n);
        self.unreserve()
    }
}

impl<T: MappedElement> Index<usize> for MappedVec<T> {
    type Output = T;
    fn index(&self, index: usize) -> &T {
        &self.as_slice()[index]
    }
}

impl<T: MappedElement> IndexMut<usize> for MappedVec<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.as_mut_slice()[index]
    }
}

impl<'a, T: MappedElement> IntoIterator for &'a MappedVec<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use tempfile::TempDir;

    #[test]
    fn test_resize_fill_index() {
        let dir = TempDir::new().unwrap();
        let mut v: MappedVec<u64> = MappedVec::create(dir.path(), "tmp-test").unwrap();
        v.reserve_and_resize(1000).unwrap();
        assert_eq!(v.len(), 1000);
        assert_eq!(v[999], 0);
        v.fill(7);
        assert_eq!(v[0], 7);
        v[3] = 11;
        assert_eq!(v.as_slice()[3], 11);
        v.remove().unwrap();
    }

    #[test]
    fn test_push_grows() {
        let dir = TempDir::new().unwrap();
        let mut v: MappedVec<u32> = MappedVec::create(dir.path(), "tmp-push").unwrap();
        for i in 0..10_000u32 {
            v.push(i).unwrap();
        }
        assert_eq!(v.len(), 10_000);
        assert_eq!(v[9_999], 9_999);
    }

    #[test]
    fn test_compact_pairs() {
        let dir = TempDir::new().unwrap();
        let mut v: MappedVec<u64> = MappedVec::create(dir.path(), "tmp-compact").unwrap();
        v.reserve_and_resize(8).unwrap();
        for i in 0..8 {
            v[i] = i as u64 * 10;
        }
        v.compact_pairs().unwrap();
        assert_eq!(v.as_slice(), &[0, 20, 40, 60]);
    }

    #[test]
    fn test_atomic_view() {
        let dir = TempDir::new().unwrap();
        let mut v: MappedVec<u64> = MappedVec::create(dir.path(), "tmp-atomic").unwrap();
        v.reserve_and_resize(4).unwrap();
        v.as_atomic_slice()[2].store(42, Ordering::Relaxed);
        assert_eq!(v[2], 42);
    }
}
