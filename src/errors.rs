//! Error types for the recoverable failures of the scheduler.
//!
//! Only resource exhaustion and misuse of one-shot setup calls are reported
//! as errors. Broken scheduler invariants are not recoverable and panic with
//! a diagnostic instead (see the crate documentation).

#![allow(clippy::uninlined_format_args)]

use core::fmt;

/// Result type for threading operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Error type for all fallible threading operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadError {
    /// Thread creation errors
    Spawn(SpawnError),
    /// Scheduler setup errors
    Schedule(ScheduleError),
}

/// Errors that can occur during thread creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Configured maximum number of live threads reached
    TooManyThreads(usize),
    /// Thread identifier space exhausted
    IdsExhausted,
    /// Allocation of the thread control block failed
    OutOfMemory,
}

/// Errors related to scheduler setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// `start` was called a second time
    AlreadyStarted,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "Thread spawn error: {}", e),
            ThreadError::Schedule(e) => write!(f, "Scheduling error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TooManyThreads(max) => write!(f, "Maximum number of threads reached ({})", max),
            SpawnError::IdsExhausted => write!(f, "No thread identifier available"),
            SpawnError::OutOfMemory => write!(f, "Out of memory for thread creation"),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::AlreadyStarted => write!(f, "Scheduler already started"),
        }
    }
}

impl From<SpawnError> for ThreadError {
    fn from(error: SpawnError) -> Self {
        ThreadError::Spawn(error)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(error: ScheduleError) -> Self {
        ThreadError::Schedule(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_error_display() {
        let err: ThreadError = SpawnError::TooManyThreads(8).into();
        assert_eq!(err.to_string(), "Thread spawn error: Maximum number of threads reached (8)");

        let err: ThreadError = ScheduleError::AlreadyStarted.into();
        assert_eq!(err.to_string(), "Scheduling error: Scheduler already started");
    }
}
