//! Thread scheduling.
//!
//! Provides the strict-priority ready queue, the timed sleep queue and the
//! priority donation engine.

pub mod donation;
pub mod queue;
pub mod ready;
pub mod sleep;
pub mod trait_def;

pub use ready::PriorityScheduler;
pub use sleep::SleepQueue;
pub use trait_def::{priority, Priority, Scheduler};
