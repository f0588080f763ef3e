//! Single-slot frame mailbox between the capture thread and the render thread

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::utils::CachePadded;

use crate::Frame;

/// Drop-oldest handoff slot holding at most one [`Frame`].
///
/// `publish` and `take` share one critical section that only swaps an
/// `Option`; a displaced frame is dropped after the lock is released.
pub struct Mailbox {
    slot: Mutex<Option<Frame>>,

    /// Statistics
    stats: CachePadded<Stats>,
}

#[derive(Default)]
struct Stats {
    published: AtomicU64,
    taken: AtomicU64,
    overwritten: AtomicU64,
}

/// Snapshot of mailbox counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MailboxStats {
    pub published: u64,
    pub taken: u64,
    pub overwritten: u64,
}

impl Mailbox {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            stats: CachePadded::new(Stats::default()),
        }
    }

    /// Producer: store `frame`, discarding any frame nobody took yet.
    pub fn publish(&self, frame: Frame) {
        let displaced = self.lock().replace(frame);

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        if displaced.is_some() {
            self.stats.overwritten.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("mailbox_frames_overwritten").increment(1);
        }
        // `displaced` is freed here, outside the lock.
    }

    /// Consumer: remove and return the pending frame, if any.
    pub fn take(&self) -> Option<Frame> {
        let frame = self.lock().take();
        if frame.is_some() {
            self.stats.taken.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    pub fn stats(&self) -> MailboxStats {
        MailboxStats {
            published: self.stats.published.load(Ordering::Relaxed),
            taken: self.stats.taken.load(Ordering::Relaxed),
            overwritten: self.stats.overwritten.load(Ordering::Relaxed),
        }
    }

    // The slot has no invariant a panicking holder could break, so a
    // poisoned lock is simply reused.
    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}
