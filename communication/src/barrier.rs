//! The one-shot distributed termination barrier.
//!
//! Every process enters the barrier exactly once, after its share of the
//! user main has returned and its outstanding work has drained. The root
//! counts entries (its own included); once all processes have entered it
//! broadcasts a release. A process keeps pumping tasks between entering
//! and observing the release, so tasks that are still in flight when a
//! process enters are executed rather than lost.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// State of the termination barrier on one process.
///
/// The message plumbing lives in [`crate::Comm`]; this type only tracks
/// what has been observed.
pub struct TerminationBarrier {
    size: usize,
    entered: AtomicBool,
    /// Number of processes known to have entered; maintained on the root.
    entries: AtomicUsize,
    released: AtomicBool,
}

impl TerminationBarrier {
    pub fn new(size: usize) -> Self {
        TerminationBarrier {
            size,
            entered: AtomicBool::new(false),
            entries: AtomicUsize::new(0),
            released: AtomicBool::new(false),
        }
    }

    /// Marks the local process as having entered. Returns `false` if it had
    /// already entered.
    pub fn enter_local(&self) -> bool {
        !self.entered.swap(true, Ordering::AcqRel)
    }

    pub fn has_entered(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Records one entry on the root; returns `true` once every process
    /// has entered.
    pub fn observe_enter(&self) -> bool {
        let seen = self.entries.fetch_add(1, Ordering::AcqRel) + 1;
        assert!(seen <= self.size, "more barrier entries than processes");
        seen == self.size
    }

    /// Records the release broadcast.
    pub fn observe_release(&self) {
        self.released.store(true, Ordering::Release);
    }

    /// True once the barrier has completed on this process.
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_entry_completes_alone() {
        let barrier = TerminationBarrier::new(1);
        assert!(barrier.enter_local());
        assert!(!barrier.enter_local());
        assert!(barrier.observe_enter());
    }

    #[test]
    fn root_counts_entries() {
        let barrier = TerminationBarrier::new(3);
        assert!(!barrier.observe_enter());
        assert!(!barrier.observe_enter());
        assert!(barrier.observe_enter());
        assert!(!barrier.is_released());
        barrier.observe_release();
        assert!(barrier.is_released());
    }
}
