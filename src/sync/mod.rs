//! Synchronization primitives: counting semaphores, locks with priority
//! donation and condition variables.
//!
//! Primitives are owned by the [`Kernel`](crate::Kernel) and addressed by
//! typed handles. Operations on them act for the current thread:
//!
//! ```ignore
//! let lock = kernel.lock_init();
//! let ready = kernel.cond_init();
//!
//! if kernel.lock_acquire(lock) == Wait::Completed {
//!     kernel.cond_signal(ready, lock);
//!     kernel.lock_release(lock);
//! }
//! ```

use core::fmt;

extern crate alloc;
use alloc::collections::BTreeMap;

pub mod condvar;
pub mod lock;
pub mod semaphore;

pub use condvar::Condvar;
pub use lock::Lock;
pub use semaphore::Semaphore;

/// Outcome of an operation that may block the current thread.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    /// Finished without giving up the CPU
    Completed,
    /// The caller blocked and another thread is now current. The operation
    /// completes when the caller is next scheduled.
    Suspended,
}

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub(crate) usize);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// Handle to a kernel semaphore.
    SemaId,
    "sema"
);
handle!(
    /// Handle to a kernel lock.
    LockId,
    "lock"
);
handle!(
    /// Handle to a kernel condition variable.
    CondId,
    "cond"
);

/// Storage for one kind of primitive. Slots are never reused, so a stale
/// handle misses instead of aliasing a newer primitive.
pub(crate) struct Arena<T> {
    slots: BTreeMap<usize, T>,
    next: usize,
}

impl<T> Arena<T> {
    pub(crate) const fn new() -> Self {
        Self {
            slots: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn insert(&mut self, item: T) -> usize {
        let index = self.next;
        self.next += 1;
        self.slots.insert(index, item);
        index
    }

    pub(crate) fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.remove(&index)
    }

    pub(crate) fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(&index)
    }

    /// Look up a slot that must exist; a stale handle is fatal.
    #[track_caller]
    pub(crate) fn slot(&self, index: usize, kind: &str) -> &T {
        match self.slots.get(&index) {
            Some(item) => item,
            None => panic!("unknown {} #{}", kind, index),
        }
    }

    #[track_caller]
    pub(crate) fn slot_mut(&mut self, index: usize, kind: &str) -> &mut T {
        match self.slots.get_mut(&index) {
            Some(item) => item,
            None => panic!("unknown {} #{}", kind, index),
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        self.slots.iter().map(|(&index, item)| (index, item))
    }
}
