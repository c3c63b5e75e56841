//! Dynamic load balancing for the hot loops.
//!
//! Every parallel phase follows the same shape: a [`LoadBalancer`] is set up
//! with the total work and a batch size tuned per phase, and worker threads
//! repeatedly pull the next batch until the work runs out. Phases are
//! separated by join points that act as full fences.

use crate::Result;
use parking_lot::Mutex;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// An atomic batch dispenser over `0..total`.
pub struct LoadBalancer {
    next: AtomicU64,
    total: u64,
    batch_size: u64,
}

impl LoadBalancer {
    pub fn new(total: u64, batch_size: u64) -> Self {
        assert!(batch_size > 0);
        LoadBalancer {
            next: AtomicU64::new(0),
            total,
            batch_size,
        }
    }

    /// Claim the next batch, or `None` when the work is exhausted.
    pub fn next_batch(&self) -> Option<Range<u64>> {
        let begin = self.next.fetch_add(self.batch_size, Ordering::Relaxed);
        if begin >= self.total {
            return None;
        }
        Some(begin..(begin + self.batch_size).min(self.total))
    }
}

/// The number of worker threads to use; zero means one per hardware thread.
pub fn resolve_thread_count(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get()
    } else {
        requested
    }
}

/// Run `worker` on `thread_count` rayon-scoped workers and join. The first
/// worker error, if any, is returned after all workers have finished.
pub fn run_workers<F>(thread_count: usize, worker: F) -> Result<()>
where
    F: Fn(usize) -> Result<()> + Sync,
{
    let first_error: Mutex<Option<crate::Error>> = Mutex::new(None);
    rayon::scope(|scope| {
        for thread_id in 0..thread_count {
            let worker = &worker;
            let first_error = &first_error;
            scope.spawn(move |_| {
                if let Err(error) = worker(thread_id) {
                    let mut slot = first_error.lock();
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                }
            });
        }
    });
    match first_error.into_inner() {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_batches_cover_range_exactly_once() {
        let balancer = LoadBalancer::new(1000, 7);
        let sum = AtomicU64::new(0);
        run_workers(4, |_| {
            while let Some(batch) = balancer.next_batch() {
                for i in batch {
                    sum.fetch_add(i, Ordering::Relaxed);
                }
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(sum.load(Ordering::Relaxed), 999 * 1000 / 2);
    }

    #[test]
    fn test_empty_work() {
        let balancer = LoadBalancer::new(0, 10);
        assert!(balancer.next_batch().is_none());
    }

    #[test]
    fn test_worker_error_is_returned() {
        let result = run_workers(3, |thread_id| {
            if thread_id == 1 {
                anyhow::bail!("worker failed");
            }
            Ok(())
        });
        assert!(result.is_err());
    }
}
