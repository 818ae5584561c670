//! Condition variables (Mesa semantics).
//!
//! Each waiter blocks on a private semaphore of its own. Signalling picks the
//! waiter whose thread has the highest effective priority at that moment and
//! ups its semaphore; the woken thread re-acquires the lock before its wait
//! returns, so the signalled condition must be re-checked.

use super::{CondId, LockId, SemaId, Wait};
use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::sched::{queue, Scheduler};
use crate::thread::{Resume, ThreadId};
use log::trace;

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// One blocked `cond_wait` call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CondWaiter {
    pub(crate) sema: SemaId,
    pub(crate) thread: ThreadId,
}

/// Condition variable state.
pub struct Condvar {
    pub(crate) waiters: VecDeque<CondWaiter>,
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    pub fn cond_init(&mut self) -> CondId {
        CondId(self.conds.insert(Condvar {
            waiters: VecDeque::new(),
        }))
    }

    /// Destroy a condition variable nobody waits on.
    pub fn cond_destroy(&mut self, cond: CondId) {
        let waiting = self.conds.slot(cond.0, "condition").waiters.len();
        assert_eq!(waiting, 0, "cond_destroy: {} has {} waiters", cond, waiting);
        self.conds.remove(cond.0);
    }

    /// Threads waiting on `cond`, in their current queue order.
    pub fn cond_waiters(&self, cond: CondId) -> Vec<ThreadId> {
        self.conds
            .slot(cond.0, "condition")
            .waiters
            .iter()
            .map(|waiter| waiter.thread)
            .collect()
    }

    /// Atomically release `lock` and wait for `cond` to be signalled, then
    /// re-acquire `lock`.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or without holding `lock`.
    pub fn cond_wait(&mut self, cond: CondId, lock: LockId) -> Wait {
        assert!(!self.in_interrupt, "cond_wait: called from interrupt context");
        let cur = self.current;
        assert!(
            self.lock_held_by_current(lock),
            "cond_wait: {} not held by thread {}",
            lock,
            cur
        );
        let old = self.intr_disable();

        let waiter = self.sema_init(0);
        let threads = &self.threads;
        let slot = self.conds.slot_mut(cond.0, "condition");
        queue::sort_ordered(&mut slot.waiters, |entry| threads.priority(entry.thread));
        queue::insert_ordered(
            &mut slot.waiters,
            CondWaiter { sema: waiter, thread: cur },
            |entry| threads.priority(entry.thread),
        );
        trace!("thread {} waits on {}", cur, cond);

        // Releasing may hand the CPU to a waiter of the lock. The rest of the
        // wait then runs when this thread is rescheduled.
        self.threads.thread_mut(cur).pending = Some(Resume::CondWait { waiter, lock });
        self.lock_release(lock);

        let wait = if self.current != cur {
            Wait::Suspended
        } else {
            self.threads.thread_mut(cur).pending = None;
            if self.cond_resume(waiter, lock) {
                Wait::Completed
            } else {
                self.schedule();
                Wait::Suspended
            }
        };
        self.intr_set_level(old);
        wait
    }

    /// Wake the highest-priority waiter of `cond`, if any.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or without holding `lock`.
    pub fn cond_signal(&mut self, cond: CondId, lock: LockId) {
        self.check_cond_caller("cond_signal", lock);
        let old = self.intr_disable();
        if self.cond_wake_one(cond) {
            self.test_max_priority();
        }
        self.intr_set_level(old);
    }

    /// Wake every waiter of `cond`.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or without holding `lock`.
    pub fn cond_broadcast(&mut self, cond: CondId, lock: LockId) {
        self.check_cond_caller("cond_broadcast", lock);
        let old = self.intr_disable();
        let mut woke = false;
        while self.cond_wake_one(cond) {
            woke = true;
        }
        if woke {
            self.test_max_priority();
        }
        self.intr_set_level(old);
    }

    fn check_cond_caller(&self, op: &str, lock: LockId) {
        assert!(!self.in_interrupt, "{}: called from interrupt context", op);
        assert!(
            self.lock_held_by_current(lock),
            "{}: {} not held by thread {}",
            op,
            lock,
            self.current
        );
    }

    fn cond_wake_one(&mut self, cond: CondId) -> bool {
        let threads = &self.threads;
        let slot = self.conds.slot_mut(cond.0, "condition");
        queue::sort_ordered(&mut slot.waiters, |entry| threads.priority(entry.thread));
        match slot.waiters.pop_front() {
            Some(entry) => {
                trace!("{} signals thread {}", cond, entry.thread);
                self.sema_wake(entry.sema);
                true
            }
            None => false,
        }
    }

    /// Second half of `cond_wait`: wait for the signal, then take the lock.
    /// Returns `false` if the current thread blocked again.
    pub(crate) fn cond_resume(&mut self, waiter: SemaId, lock: LockId) -> bool {
        if !self.sema_attempt(waiter, Resume::CondWait { waiter, lock }) {
            return false;
        }
        self.sema_destroy(waiter);
        self.lock_attempt(lock)
    }
}

#[cfg(test)]
mod tests {
    use crate::arch::HostArch;
    use crate::config::SchedConfig;
    use crate::kernel::Kernel;
    use crate::sync::Wait;
    use crate::thread::ThreadId;

    fn nop(_: usize) {}

    fn started() -> Kernel<HostArch> {
        let mut kernel = Kernel::new(HostArch::new(), SchedConfig::default());
        kernel.start().unwrap();
        kernel
    }

    #[test]
    fn test_wait_then_signal() {
        let mut kernel = started();
        let lock = kernel.lock_init();
        let cond = kernel.cond_init();

        let t = kernel.create("waiter", 40, nop, 0).unwrap();
        assert_eq!(kernel.lock_acquire(lock), Wait::Completed);
        assert_eq!(kernel.cond_wait(cond, lock), Wait::Suspended);
        assert_eq!(kernel.current(), ThreadId::MAIN);
        assert_eq!(kernel.lock_holder(lock), None);
        assert_eq!(kernel.cond_waiters(cond), [t]);

        assert_eq!(kernel.lock_acquire(lock), Wait::Completed);
        kernel.cond_signal(cond, lock);
        // The waiter cannot finish until main gives the lock back, and it
        // donates to main meanwhile.
        assert_eq!(kernel.current(), ThreadId::MAIN);
        assert!(kernel.cond_waiters(cond).is_empty());
        assert_eq!(kernel.get_priority(), 40);

        kernel.lock_release(lock);
        assert_eq!(kernel.current(), t);
        assert_eq!(kernel.lock_holder(lock), Some(t));
        assert!(!kernel.thread(t).unwrap().is_waiting());
        assert_eq!(kernel.get_priority(), 40);
        assert_eq!(kernel.thread(ThreadId::MAIN).unwrap().priority(), 31);
    }

    #[test]
    fn test_signal_without_waiters_is_noop() {
        let mut kernel = started();
        let lock = kernel.lock_init();
        let cond = kernel.cond_init();
        let _ = kernel.lock_acquire(lock);
        let switches = kernel.arch().switch_count();
        kernel.cond_signal(cond, lock);
        kernel.cond_broadcast(cond, lock);
        assert_eq!(kernel.arch().switch_count(), switches);
    }

    #[test]
    fn test_broadcast_wakes_all_in_priority_order() {
        let mut kernel = started();
        let lock = kernel.lock_init();
        let cond = kernel.cond_init();

        let mut waiters = std::vec::Vec::new();
        for priority in [40, 45, 42] {
            let t = kernel.create("waiter", priority, nop, 0).unwrap();
            assert_eq!(kernel.current(), t);
            assert_eq!(kernel.lock_acquire(lock), Wait::Completed);
            assert_eq!(kernel.cond_wait(cond, lock), Wait::Suspended);
            waiters.push(t);
        }
        assert_eq!(kernel.cond_waiters(cond), [waiters[1], waiters[2], waiters[0]]);

        assert_eq!(kernel.lock_acquire(lock), Wait::Completed);
        kernel.cond_broadcast(cond, lock);
        assert!(kernel.cond_waiters(cond).is_empty());
        kernel.lock_release(lock);

        // Each woken waiter re-takes the lock in priority order.
        assert_eq!(kernel.current(), waiters[1]);
        assert_eq!(kernel.lock_holder(lock), Some(waiters[1]));
        assert_eq!(
            kernel.ready_threads(),
            [waiters[2], waiters[0], ThreadId::MAIN]
        );
        for next in [waiters[2], waiters[0]] {
            kernel.lock_release(lock);
            kernel.exit();
            assert_eq!(kernel.current(), next);
            assert_eq!(kernel.lock_holder(lock), Some(next));
        }
        kernel.lock_release(lock);
        assert!(kernel.thread(waiters[1]).is_none());
    }

    #[test]
    #[should_panic(expected = "cond_signal: lock#0 not held by thread 1")]
    fn test_signal_without_lock_is_fatal() {
        let mut kernel = started();
        let lock = kernel.lock_init();
        let cond = kernel.cond_init();
        kernel.cond_signal(cond, lock);
    }
}
