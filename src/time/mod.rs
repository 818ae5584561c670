//! Time keeping in timer ticks.

pub mod tick;

pub use tick::{TickCounter, TickStats};

/// Frequency in Hz for timer interrupts.
pub const TIMER_FREQUENCY_HZ: u32 = 100; // 100 Hz = 10ms ticks

/// A duration of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Duration {
    /// Create a duration from nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create a duration from microseconds.
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    /// Create a duration from milliseconds.
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    /// Get milliseconds in this duration.
    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    /// Whole timer ticks covered by this duration at `hz`, rounded down.
    pub const fn as_ticks(self, hz: u32) -> u64 {
        ((self.0 as u128 * hz as u128) / 1_000_000_000) as u64
    }
}
