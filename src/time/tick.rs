//! Tick counting and per-category tick statistics.

use portable_atomic::{AtomicU64, Ordering};

/// Global tick counter for system uptime and sleep deadlines.
///
/// This counter is incremented on every timer interrupt. It is atomic so the
/// interrupt path and readers outside the scheduler lock agree on its value.
pub struct TickCounter {
    /// Number of ticks since system start
    ticks: AtomicU64,
    /// Tick frequency in Hz
    frequency: u32,
}

impl TickCounter {
    /// Create a new tick counter with the given frequency.
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
        }
    }

    /// Increment the tick counter and return the new value.
    ///
    /// This should only be called from the timer interrupt handler.
    pub fn increment(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    /// Get the tick frequency in Hz.
    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Ticks elapsed since `then`.
    pub fn elapsed(&self, then: u64) -> u64 {
        self.ticks().saturating_sub(then)
    }
}

/// Where timer ticks were spent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Ticks spent in the idle thread
    pub idle: u64,
    /// Ticks spent in kernel threads
    pub kernel: u64,
    /// Ticks spent in threads backing user processes
    pub user: u64,
}

impl TickStats {
    pub fn total(&self) -> u64 {
        self.idle + self.kernel + self.user
    }
}
