//! Non-recursive locks with priority donation.
//!
//! A lock is a semaphore with initial value one plus an owner. While a
//! thread waits for a held lock it is recorded as a donor of the holder, so
//! the holder runs at no less than the waiter's priority until it releases.

use super::{LockId, SemaId, Wait};
use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::sched::Scheduler;
use crate::thread::{Resume, ThreadId};
use log::trace;

/// Lock state. The holder is the only thread allowed to release it.
pub struct Lock {
    pub(crate) holder: Option<ThreadId>,
    pub(crate) sema: SemaId,
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Create an unheld lock.
    pub fn lock_init(&mut self) -> LockId {
        let sema = self.sema_init(1);
        LockId(self.locks.insert(Lock { holder: None, sema }))
    }

    /// Destroy an unheld lock.
    ///
    /// # Panics
    ///
    /// Panics if the lock is held.
    pub fn lock_destroy(&mut self, lock: LockId) {
        let slot = self.locks.slot(lock.0, "lock");
        assert!(
            slot.holder.is_none(),
            "lock_destroy: {} is held by thread {:?}",
            lock,
            slot.holder
        );
        let sema = slot.sema;
        self.locks.remove(lock.0);
        self.sema_destroy(sema);
    }

    pub fn lock_holder(&self, lock: LockId) -> Option<ThreadId> {
        self.locks.slot(lock.0, "lock").holder
    }

    pub fn lock_held_by_current(&self, lock: LockId) -> bool {
        self.lock_holder(lock) == Some(self.current)
    }

    /// Threads waiting to acquire `lock`, in wake order.
    pub fn lock_waiters(&self, lock: LockId) -> alloc::vec::Vec<ThreadId> {
        self.sema_waiters(self.locks.slot(lock.0, "lock").sema)
    }

    /// Acquire `lock`, blocking until it is available.
    ///
    /// While blocked the caller donates its priority to the holder and on
    /// along the holder's own lock waits.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or if the caller already
    /// holds the lock.
    pub fn lock_acquire(&mut self, lock: LockId) -> Wait {
        assert!(!self.in_interrupt, "lock_acquire: called from interrupt context");
        assert!(
            !self.lock_held_by_current(lock),
            "lock_acquire: {} already held by thread {}",
            lock,
            self.current
        );
        let old = self.intr_disable();
        let wait = if self.lock_attempt(lock) {
            Wait::Completed
        } else {
            self.schedule();
            Wait::Suspended
        };
        self.intr_set_level(old);
        wait
    }

    /// Acquire `lock` if it is free. Never blocks and never donates.
    ///
    /// # Panics
    ///
    /// Panics if the caller already holds the lock.
    pub fn lock_try_acquire(&mut self, lock: LockId) -> bool {
        assert!(
            !self.lock_held_by_current(lock),
            "lock_try_acquire: {} already held by thread {}",
            lock,
            self.current
        );
        let old = self.intr_disable();
        let sema = self.locks.slot(lock.0, "lock").sema;
        let acquired = self.sema_try_down(sema);
        if acquired {
            self.finish_acquire(lock);
        }
        self.intr_set_level(old);
        acquired
    }

    /// Release `lock`, giving back donations made through it and waking its
    /// highest-priority waiter.
    ///
    /// # Panics
    ///
    /// Panics if the caller does not hold the lock.
    pub fn lock_release(&mut self, lock: LockId) {
        let cur = self.current;
        assert!(
            self.lock_held_by_current(lock),
            "lock_release: {} not held by thread {}",
            lock,
            cur
        );
        let old = self.intr_disable();

        let mut donors = core::mem::take(&mut self.threads.thread_mut(cur).donors);
        donors.retain(|donor| {
            self.threads
                .get(*donor)
                .map_or(false, |thread| thread.waiting_on != Some(lock))
        });
        self.threads.thread_mut(cur).donors = donors;
        self.refresh_priority(cur);

        let slot = self.locks.slot_mut(lock.0, "lock");
        slot.holder = None;
        let sema = slot.sema;
        trace!("thread {} releases {}", cur, lock);
        self.sema_up(sema);
        self.intr_set_level(old);
    }

    /// Take `lock` for the current thread, or register the current thread as
    /// a waiter and donor. Returns whether the lock was taken.
    ///
    /// The caller must schedule after a `false` return.
    pub(crate) fn lock_attempt(&mut self, lock: LockId) -> bool {
        let cur = self.current;
        let slot = self.locks.slot(lock.0, "lock");
        let (holder, sema) = (slot.holder, slot.sema);

        if let Some(holder) = holder {
            self.threads.thread_mut(cur).waiting_on = Some(lock);
            self.threads.insert_donor(holder, cur);
            self.donate_priority();
        }

        if self.sema_attempt(sema, Resume::Lock(lock)) {
            self.finish_acquire(lock);
            true
        } else {
            false
        }
    }

    /// Record the current thread as holder of `lock`.
    ///
    /// Threads still queued on the lock now wait behind the new holder and
    /// donate to it.
    fn finish_acquire(&mut self, lock: LockId) {
        let cur = self.current;
        self.threads.thread_mut(cur).waiting_on = None;
        let slot = self.locks.slot_mut(lock.0, "lock");
        slot.holder = Some(cur);
        let sema = slot.sema;
        trace!("thread {} holds {}", cur, lock);

        let waiters = self.sema_waiters(sema);
        if !waiters.is_empty() {
            for waiter in waiters {
                self.threads.insert_donor(cur, waiter);
            }
            self.refresh_priority(cur);
        }
    }
}
