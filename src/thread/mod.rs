//! Thread control blocks.
//!
//! A [`Thread`] is the scheduler's record of one kernel execution context.
//! Control blocks live in the kernel's [`ThreadTable`] and refer to each
//! other only by [`ThreadId`]; donation edges and lock waits are index
//! relations, never owning pointers.

use crate::errors::SpawnError;
use crate::sched::Priority;
use crate::sync::{LockId, SemaId};
use core::num::NonZeroUsize;

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::string::String;

pub mod builder;
pub mod registry;

pub use builder::ThreadBuilder;
pub use registry::ThreadTable;

/// Signature stored in every control block. A lookup that finds any other
/// value means the control block has been overwritten.
pub const THREAD_MAGIC: u32 = 0xcd6a_bf4b;

/// Longest thread name kept, in bytes.
pub const THREAD_NAME_MAX: usize = 15;

/// Unique identifier for threads.
///
/// Thread IDs are allocated in increasing order, never reused and never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(NonZeroUsize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ThreadId {
    /// Identity of the initial thread.
    pub const MAIN: ThreadId = ThreadId(NonZeroUsize::MIN);

    /// Create a thread ID from a raw value, `None` for zero.
    pub fn from_raw(id: usize) -> Option<Self> {
        NonZeroUsize::new(id).map(Self)
    }

    /// Get the raw ID value.
    pub fn get(self) -> usize {
        self.0.get()
    }
}

/// Thread lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    /// Owns the CPU
    Running = 0,
    /// Queued on the ready queue
    Ready = 1,
    /// Waiting for an event (semaphore, lock, condition, timer, explicit unblock)
    Blocked = 2,
    /// Exited; storage is reclaimed by a later schedule
    Dying = 3,
}

/// The single scheduler structure a thread is queued on, if any.
///
/// A thread is on the ready queue only while Ready and on the sleep queue or
/// a semaphore wait list only while Blocked, so one tag is enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// Not queued anywhere
    Detached,
    /// On the ready queue
    Ready,
    /// On the sleep queue
    Sleep,
    /// On a semaphore wait list
    Sema(SemaId),
}

/// Work a suspended thread still has to finish when it next runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resume {
    /// Retry a semaphore down.
    Sema(SemaId),
    /// Retry a lock acquisition.
    Lock(LockId),
    /// Wait for a condition signal, then re-acquire the lock.
    CondWait { waiter: SemaId, lock: LockId },
}

/// Thread control block.
pub struct Thread<C> {
    magic: u32,
    id: ThreadId,
    name: String,
    pub(crate) state: ThreadState,
    /// Priority set at creation or by `set_priority`
    pub(crate) base_priority: Priority,
    /// Base priority raised by donation
    pub(crate) priority: Priority,
    /// Lock this thread is blocked acquiring
    pub(crate) waiting_on: Option<LockId>,
    /// Threads donating to this one, highest priority first
    pub(crate) donors: VecDeque<ThreadId>,
    /// Absolute tick to wake at, while on the sleep queue
    pub(crate) wake_tick: u64,
    pub(crate) location: Location,
    pub(crate) pending: Option<Resume>,
    /// Backs a user process (tick accounting only)
    pub(crate) user: bool,
    pub(crate) context: C,
}

impl<C> Thread<C> {
    /// Create a control block in the Blocked state.
    pub(crate) fn new(id: ThreadId, name: String, priority: Priority, context: C) -> Self {
        Self {
            magic: THREAD_MAGIC,
            id,
            name,
            state: ThreadState::Blocked,
            base_priority: priority,
            priority,
            waiting_on: None,
            donors: VecDeque::new(),
            wake_tick: 0,
            location: Location::Detached,
            pending: None,
            user: false,
            context,
        }
    }

    /// Whether the control block signature is intact.
    pub fn is_valid(&self) -> bool {
        self.magic == THREAD_MAGIC
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Effective priority, including donations.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn base_priority(&self) -> Priority {
        self.base_priority
    }

    pub fn waiting_on(&self) -> Option<LockId> {
        self.waiting_on
    }

    pub fn donors(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.donors.iter().copied()
    }

    pub fn wake_tick(&self) -> u64 {
        self.wake_tick
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn is_user(&self) -> bool {
        self.user
    }

    /// Whether a blocking operation is still in progress for this thread.
    pub fn is_waiting(&self) -> bool {
        self.pending.is_some()
    }

    pub fn context(&self) -> &C {
        &self.context
    }

    #[cfg(test)]
    pub(crate) fn corrupt(&mut self) {
        self.magic = !THREAD_MAGIC;
    }
}

/// Copy `name` into owned storage, truncated to [`THREAD_NAME_MAX`] bytes on
/// a character boundary.
pub(crate) fn truncated_name(name: &str) -> Result<String, SpawnError> {
    let mut end = name.len().min(THREAD_NAME_MAX);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut owned = String::new();
    owned
        .try_reserve_exact(end)
        .map_err(|_| SpawnError::OutOfMemory)?;
    owned.push_str(&name[..end]);
    Ok(owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_thread_is_blocked_and_detached() {
        let id = ThreadId::from_raw(7).unwrap();
        let thread = Thread::new(id, String::from("worker"), 12, ());

        assert!(thread.is_valid());
        assert_eq!(thread.id(), id);
        assert_eq!(thread.state(), ThreadState::Blocked);
        assert_eq!(thread.priority(), 12);
        assert_eq!(thread.base_priority(), 12);
        assert_eq!(thread.location(), Location::Detached);
        assert!(thread.waiting_on().is_none());
        assert!(!thread.is_waiting());
    }

    #[test]
    fn test_thread_id_zero_rejected() {
        assert!(ThreadId::from_raw(0).is_none());
        assert_eq!(ThreadId::MAIN.get(), 1);
    }

    #[test]
    fn test_name_truncation() {
        assert_eq!(truncated_name("main").unwrap(), "main");
        assert_eq!(truncated_name("a-very-long-thread-name").unwrap(), "a-very-long-thr");
        // 'é' is two bytes and straddles the limit.
        let name = "aaaaaaaaaaaaaaé";
        assert_eq!(truncated_name(name).unwrap(), "aaaaaaaaaaaaaa");
    }
}
