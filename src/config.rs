//! Scheduler configuration.

use crate::time::TIMER_FREQUENCY_HZ;

/// Number of timer ticks a thread may run before it is preempted.
pub const TIME_SLICE: u32 = 4;

/// Maximum number of lock holders a donation walks through.
pub const MAX_DONATION_DEPTH: usize = 8;

/// Default upper bound on live thread control blocks.
pub const DEFAULT_MAX_THREADS: usize = 256;

/// Tunables of a [`Kernel`](crate::Kernel) instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Timer ticks per time slice
    pub time_slice: u32,
    /// Donation chain length bound
    pub donation_depth: usize,
    /// Limit on threads that have not exited, idle and initial thread included
    pub max_threads: usize,
    /// Timer interrupt frequency in Hz
    pub timer_hz: u32,
}

impl SchedConfig {
    pub const fn new() -> Self {
        Self {
            time_slice: TIME_SLICE,
            donation_depth: MAX_DONATION_DEPTH,
            max_threads: DEFAULT_MAX_THREADS,
            timer_hz: TIMER_FREQUENCY_HZ,
        }
    }

    pub const fn with_time_slice(mut self, ticks: u32) -> Self {
        self.time_slice = ticks;
        self
    }

    pub const fn with_donation_depth(mut self, depth: usize) -> Self {
        self.donation_depth = depth;
        self
    }

    pub const fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    pub const fn with_timer_hz(mut self, hz: u32) -> Self {
        self.timer_hz = hz;
        self
    }
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self::new()
    }
}
