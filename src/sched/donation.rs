//! Priority donation and preemption checks.
//!
//! A thread blocked acquiring a held lock lends its effective priority to the
//! holder, and through the holder to whoever that holder is waiting for, up
//! to the configured depth. Donations are only ever raises; a holder gives
//! them back when it releases the lock, by recomputing its priority from its
//! base and the donors still waiting on other locks it holds.

use super::{queue, Priority, Scheduler};
use crate::arch::Arch;
use crate::kernel::Kernel;
use crate::thread::{Location, ThreadId, ThreadState};
use log::{debug, warn};

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Propagate the current thread's priority along the chain of lock
    /// holders it waits behind.
    pub(crate) fn donate_priority(&mut self) {
        let mut donor = self.current;
        for _ in 0..self.config.donation_depth {
            let Some(holder) = self.blocking_holder(donor) else {
                return;
            };
            let priority = self.threads.priority(donor);
            if self.threads.priority(holder) < priority {
                debug!("thread {} donates priority {} to thread {}", donor, priority, holder);
                self.set_effective(holder, priority);
            }
            donor = holder;
        }
        if self.blocking_holder(donor).is_some() {
            warn!(
                "donation chain from thread {} truncated after {} holders",
                self.current, self.config.donation_depth
            );
        }
    }

    /// Holder of the lock `thread` is waiting for, if that holder is alive.
    ///
    /// A Ready thread woken from a lock wait still names the lock until it
    /// retries, but it no longer donates through it.
    fn blocking_holder(&self, thread: ThreadId) -> Option<ThreadId> {
        let waiter = self.threads.thread(thread);
        if waiter.state() == ThreadState::Ready {
            return None;
        }
        let lock = waiter.waiting_on?;
        let holder = self.locks.get(lock.0)?.holder?;
        self.threads.contains(holder).then_some(holder)
    }

    /// Recompute `thread`'s effective priority as the larger of its base
    /// priority and its highest donor.
    pub(crate) fn refresh_priority(&mut self, thread: ThreadId) {
        let mut donors = core::mem::take(&mut self.threads.thread_mut(thread).donors);
        donors.retain(|donor| self.threads.contains(*donor));
        queue::sort_ordered(&mut donors, |donor| self.threads.priority(*donor));
        let donated = donors.front().map(|donor| self.threads.priority(*donor));

        let current = self.threads.thread_mut(thread);
        current.donors = donors;
        let base = current.base_priority;
        let effective = donated.map_or(base, |donated| donated.max(base));
        if effective != current.priority {
            debug!(
                "thread {} priority {} -> {}",
                thread, current.priority, effective
            );
        }
        self.set_effective(thread, effective);
    }

    /// Set `thread`'s effective priority and keep its ready queue position
    /// consistent with it.
    pub(crate) fn set_effective(&mut self, thread: ThreadId, priority: Priority) {
        let current = self.threads.thread_mut(thread);
        current.priority = priority;
        if current.location == Location::Ready {
            self.scheduler.reprioritize(thread, priority);
        }
    }

    /// Yield if a ready thread outranks the current one.
    ///
    /// Equal priority never preempts. The idle thread gives way to any ready
    /// thread. Inside an interrupt handler the yield is deferred until the
    /// handler returns.
    pub fn test_max_priority(&mut self) {
        let Some((_, front)) = self.scheduler.peek() else {
            return;
        };
        let cur = self.current;
        let outranked =
            Some(cur) == self.idle_thread() || self.threads.priority(cur) < front;
        if !outranked {
            return;
        }
        if self.in_interrupt {
            self.yield_on_return = true;
        } else {
            self.yield_now();
        }
    }
}
