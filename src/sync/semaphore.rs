//! Counting semaphores.

use super::{SemaId, Wait};
use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::sched::{queue, Scheduler};
use crate::thread::{Location, Resume, ThreadId, ThreadState};
use log::trace;

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// A nonnegative counter with a list of threads waiting for it to become
/// positive.
pub struct Semaphore {
    pub(crate) value: u32,
    /// Waiting threads, highest effective priority first
    pub(crate) waiters: VecDeque<ThreadId>,
}

impl Semaphore {
    pub(crate) const fn new(value: u32) -> Self {
        Self {
            value,
            waiters: VecDeque::new(),
        }
    }
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Create a semaphore with the given initial value.
    pub fn sema_init(&mut self, value: u32) -> SemaId {
        SemaId(self.semaphores.insert(Semaphore::new(value)))
    }

    /// Destroy an unused semaphore.
    ///
    /// # Panics
    ///
    /// Panics if threads are still waiting on it.
    pub fn sema_destroy(&mut self, sema: SemaId) {
        let waiting = self.semaphores.slot(sema.0, "semaphore").waiters.len();
        assert_eq!(waiting, 0, "sema_destroy: {} has {} waiters", sema, waiting);
        self.semaphores.remove(sema.0);
    }

    pub fn sema_value(&self, sema: SemaId) -> u32 {
        self.semaphores.slot(sema.0, "semaphore").value
    }

    /// Threads waiting on `sema`, in wake order.
    pub fn sema_waiters(&self, sema: SemaId) -> Vec<ThreadId> {
        self.semaphores
            .slot(sema.0, "semaphore")
            .waiters
            .iter()
            .copied()
            .collect()
    }

    /// Wait for `sema` to become positive, then decrement it.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context.
    pub fn sema_down(&mut self, sema: SemaId) -> Wait {
        assert!(!self.in_interrupt, "sema_down: called from interrupt context");
        let old = self.intr_disable();
        let wait = if self.sema_attempt(sema, Resume::Sema(sema)) {
            Wait::Completed
        } else {
            self.schedule();
            Wait::Suspended
        };
        self.intr_set_level(old);
        wait
    }

    /// Decrement `sema` if it is positive. Never blocks, so it may be used
    /// from interrupt context.
    pub fn sema_try_down(&mut self, sema: SemaId) -> bool {
        let old = self.intr_disable();
        let slot = self.semaphores.slot_mut(sema.0, "semaphore");
        let acquired = slot.value > 0;
        if acquired {
            slot.value -= 1;
        }
        self.intr_set_level(old);
        acquired
    }

    /// Increment `sema` and wake its highest-priority waiter, yielding to it
    /// if it outranks the caller.
    pub fn sema_up(&mut self, sema: SemaId) {
        let old = self.intr_disable();
        self.sema_wake(sema);
        self.test_max_priority();
        self.intr_set_level(old);
    }

    /// Increment `sema` and unblock its highest-priority waiter without
    /// checking for preemption.
    pub(crate) fn sema_wake(&mut self, sema: SemaId) {
        let threads = &self.threads;
        let slot = self.semaphores.slot_mut(sema.0, "semaphore");
        // Waiter priorities may have changed through donation since they
        // were queued.
        queue::sort_ordered(&mut slot.waiters, |t| threads.priority(*t));
        let woken = slot.waiters.pop_front();
        slot.value = match slot.value.checked_add(1) {
            Some(value) => value,
            None => panic!("sema_up: {} overflow", sema),
        };

        if let Some(thread) = woken {
            trace!("{} wakes thread {}", sema, thread);
            self.threads.thread_mut(thread).location = Location::Detached;
            self.unblock(thread);
        }
    }

    /// Take one unit of `sema` for the current thread, or queue the current
    /// thread on it and mark it Blocked with `resume` as the work to finish
    /// when it next runs. Returns whether the unit was taken.
    ///
    /// The caller must schedule after a `false` return.
    pub(crate) fn sema_attempt(&mut self, sema: SemaId, resume: Resume) -> bool {
        let cur = self.current;
        let threads = &self.threads;
        let slot = self.semaphores.slot_mut(sema.0, "semaphore");
        if slot.value > 0 {
            slot.value -= 1;
            return true;
        }

        queue::sort_ordered(&mut slot.waiters, |t| threads.priority(*t));
        queue::insert_ordered(&mut slot.waiters, cur, |t| threads.priority(*t));
        let thread = self.threads.thread_mut(cur);
        thread.state = ThreadState::Blocked;
        thread.location = Location::Sema(sema);
        thread.pending = Some(resume);
        trace!("thread {} waits on {}", cur, sema);
        false
    }
}
