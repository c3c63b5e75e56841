//! Lock-free parallel disjoint-set (union-find) engine.
//!
//! Operates directly on a caller-provided buffer of `2N` atomic 64-bit
//! words: slot `2i` holds the parent of element `i`, slot `2i + 1` its rank.
//! After all unions, the caller runs compression passes until no parent
//! changes, verifies convergence, and compacts the buffer in place to the
//! `N` parent words (the ranks are no longer needed).
//!
//! Sequential consistency is not required: unions CAS a root's parent with
//! acquire/release, everything else is relaxed. Correctness comes from the
//! algorithm (a parent write only ever installs a current root of the same
//! set), not from memory order. Path compression stores are idempotent;
//! racing winners all store the same root.

use std::sync::atomic::{AtomicU64, Ordering};

pub struct DisjointSets<'a> {
    slots: &'a [AtomicU64],
    count: u64,
    /// Number of parent rewrites performed by compression since the last
    /// `reset_update_counter`. Used to detect convergence.
    parents_updated: AtomicU64,
}

impl<'a> DisjointSets<'a> {
    /// Wrap a `2 * count` buffer. Parents are initialized to self, ranks to
    /// zero; the caller only provides the memory.
    pub fn new(slots: &'a [AtomicU64], count: u64) -> Self {
        assert_eq!(slots.len() as u64, 2 * count, "buffer must hold 2N words");
        for i in 0..count {
            slots[(2 * i) as usize].store(i, Ordering::Relaxed);
            slots[(2 * i + 1) as usize].store(0, Ordering::Relaxed);
        }
        DisjointSets {
            slots,
            count,
            parents_updated: AtomicU64::new(0),
        }
    }

    pub fn element_count(&self) -> u64 {
        self.count
    }

    /// Plain load of the parent word.
    pub fn parent(&self, x: u64) -> u64 {
        self.slots[(2 * x) as usize].load(Ordering::Relaxed)
    }

    fn rank(&self, x: u64) -> u64 {
        self.slots[(2 * x + 1) as usize].load(Ordering::Relaxed)
    }

    /// Locate the root of `x` with path halving.
    pub fn find(&self, x: u64) -> u64 {
        let mut current = x;
        loop {
            let parent = self.parent(current);
            if parent == current {
                return current;
            }
            let grandparent = self.parent(parent);
            if grandparent == parent {
                return parent;
            }
            // Halve the path. Losing the race is fine; the winner stored an
            // equally valid ancestor.
            let _ = self.slots[(2 * current) as usize].compare_exchange_weak(
                parent,
                grandparent,
                Ordering::Relaxed,
                Ordering::Relaxed,
            );
            current = grandparent;
        }
    }

    /// Merge the sets containing `a` and `b`. Lock-free union by rank with
    /// an id tiebreak; retries on contention.
    pub fn unite(&self, a: u64, b: u64) {
        loop {
            let x = self.find(a);
            let y = self.find(b);
            if x == y {
                return;
            }
            let rank_x = self.rank(x);
            let rank_y = self.rank(y);
            let (loser, winner, tie) = if rank_x < rank_y {
                (x, y, false)
            } else if rank_y < rank_x {
                (y, x, false)
            } else if x < y {
                (x, y, true)
            } else {
                (y, x, true)
            };
            // Link only if the loser is still a root.
            if self.slots[(2 * loser) as usize]
                .compare_exchange(loser, winner, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if tie {
                    // Bump the winner's rank. A failed CAS means another
                    // union already raised it, which is just as good.
                    let _ = self.slots[(2 * winner + 1) as usize].compare_exchange(
                        rank_x,
                        rank_x + 1,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    );
                }
                return;
            }
        }
    }

    /// Find the root of `x` and write it into every entry of the chain.
    /// The stores are relaxed and idempotent. Rewrites are counted so the
    /// finalization loop can detect a converged pass.
    pub fn find_and_compress(&self, x: u64) -> u64 {
        let root = self.find(x);
        let mut current = x;
        while current != root {
            let parent = self.parent(current);
            if parent == current {
                break;
            }
            if parent != root {
                self.slots[(2 * current) as usize].store(root, Ordering::Relaxed);
                self.parents_updated.fetch_add(1, Ordering::Relaxed);
            }
            current = parent;
        }
        root
    }

    pub fn reset_update_counter(&self) {
        self.parents_updated.store(0, Ordering::Relaxed);
    }

    pub fn updates_since_reset(&self) -> u64 {
        self.parents_updated.load(Ordering::Relaxed)
    }
}
