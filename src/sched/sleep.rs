//! Timed sleep queue.

use crate::thread::ThreadId;

extern crate alloc;
use alloc::vec::Vec;

/// Threads blocked until an absolute tick.
///
/// The list is unordered. A watermark holds the minimum wake tick so the
/// timer path can skip the scan until something is due.
#[derive(Debug)]
pub struct SleepQueue {
    sleepers: Vec<ThreadId>,
    next_wake: u64,
}

impl SleepQueue {
    pub const fn new() -> Self {
        Self {
            sleepers: Vec::new(),
            next_wake: u64::MAX,
        }
    }

    /// Add a sleeper and lower the watermark to `wake_tick` if earlier.
    pub fn push(&mut self, thread: ThreadId, wake_tick: u64) {
        self.sleepers.push(thread);
        self.next_wake = self.next_wake.min(wake_tick);
    }

    /// Earliest wake tick among sleepers, `u64::MAX` when empty.
    pub fn next_wake(&self) -> u64 {
        self.next_wake
    }

    /// Whether the awake pass has work at tick `now`.
    pub fn is_due(&self, now: u64) -> bool {
        self.next_wake <= now
    }

    /// Remove and return every sleeper whose wake tick is at or before `now`,
    /// in the order they went to sleep, and recompute the watermark over the
    /// rest.
    pub fn awake(&mut self, now: u64, wake_tick: impl Fn(ThreadId) -> u64) -> Vec<ThreadId> {
        let mut woken = Vec::new();
        let mut next_wake = u64::MAX;
        self.sleepers.retain(|&thread| {
            let tick = wake_tick(thread);
            if tick <= now {
                woken.push(thread);
                false
            } else {
                next_wake = next_wake.min(tick);
                true
            }
        });
        self.next_wake = next_wake;
        woken
    }

    pub fn len(&self) -> usize {
        self.sleepers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sleepers.is_empty()
    }

    pub fn contains(&self, thread: ThreadId) -> bool {
        self.sleepers.contains(&thread)
    }
}

impl Default for SleepQueue {
    fn default() -> Self {
        Self::new()
    }
}
