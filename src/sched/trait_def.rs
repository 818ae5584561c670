//! Ready-queue trait definition.

use crate::thread::ThreadId;

extern crate alloc;
use alloc::vec::Vec;

/// Thread priority. Larger values are more urgent.
pub type Priority = u8;

/// Interface of the ready queue the dispatcher picks from.
///
/// The queue stores thread identities together with the effective priority
/// each was queued at. Implementations must hand out the highest priority
/// first and, among equal priorities, the thread queued earliest.
pub trait Scheduler: Send {
    /// Enqueue a thread that is ready to run.
    ///
    /// This is called when a thread becomes ready (newly created, woken up
    /// from blocking, or yielding) and is placed behind every queued thread
    /// of equal or higher priority.
    fn enqueue(&mut self, thread: ThreadId, priority: Priority);

    /// Remove and return the next thread to run, `None` if no thread is ready.
    fn pick_next(&mut self) -> Option<ThreadId>;

    /// The thread `pick_next` would return, with its queued priority.
    fn peek(&self) -> Option<(ThreadId, Priority)>;

    /// Remove a specific thread. Returns whether it was queued.
    fn remove(&mut self, thread: ThreadId) -> bool;

    /// Move a queued thread to the position its new priority calls for.
    ///
    /// Returns whether the thread was queued.
    fn reprioritize(&mut self, thread: ThreadId, priority: Priority) -> bool {
        // Default implementation: requeue behind its new peers
        if self.remove(thread) {
            self.enqueue(thread, priority);
            true
        } else {
            false
        }
    }

    /// Number of queued threads.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued threads in dispatch order.
    fn snapshot(&self) -> Vec<ThreadId>;
}

/// Priority levels for threads.
pub mod priority {
    use super::Priority;

    /// Lowest priority; the idle thread runs here
    pub const PRI_MIN: Priority = 0;

    /// Default priority for new threads and the initial thread
    pub const PRI_DEFAULT: Priority = 31;

    /// Highest priority
    pub const PRI_MAX: Priority = 63;

    /// Whether `priority` lies in `PRI_MIN..=PRI_MAX`.
    pub const fn is_valid(priority: Priority) -> bool {
        matches!(priority, PRI_MIN..=PRI_MAX)
    }
}
