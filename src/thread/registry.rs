//! Arena of thread control blocks and identity allocation.

use super::{Thread, ThreadId, ThreadState};
use crate::sched::{queue, Priority};
use portable_atomic::{AtomicUsize, Ordering};

extern crate alloc;
use alloc::collections::BTreeMap;

/// All live thread control blocks, keyed by identity.
pub struct ThreadTable<C> {
    threads: BTreeMap<ThreadId, Thread<C>>,
    /// Next thread ID to assign
    next_id: AtomicUsize,
}

impl<C> ThreadTable<C> {
    /// Create an empty table. The first allocated ID follows
    /// [`ThreadId::MAIN`].
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            next_id: AtomicUsize::new(ThreadId::MAIN.get() + 1),
        }
    }

    /// Allocate a fresh thread ID, `None` once the ID space is used up.
    ///
    /// IDs are never reused for the lifetime of the table.
    pub fn allocate_id(&self) -> Option<ThreadId> {
        self.next_id
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |id| id.checked_add(1))
            .ok()
            .and_then(ThreadId::from_raw)
    }

    pub(crate) fn insert(&mut self, thread: Thread<C>) {
        let id = thread.id();
        if self.threads.insert(id, thread).is_some() {
            panic!("thread table: duplicate thread id {}", id);
        }
    }

    pub(crate) fn remove(&mut self, id: ThreadId) -> Option<Thread<C>> {
        self.threads.remove(&id)
    }

    pub fn get(&self, id: ThreadId) -> Option<&Thread<C>> {
        self.threads.get(&id)
    }

    /// Look up a thread that must exist.
    ///
    /// A missing thread or a damaged signature means the scheduler's own
    /// bookkeeping is broken, which is fatal.
    #[track_caller]
    pub fn thread(&self, id: ThreadId) -> &Thread<C> {
        match self.threads.get(&id) {
            Some(thread) if thread.is_valid() => thread,
            Some(_) => panic!("thread {}: corrupted control block signature", id),
            None => panic!("thread {}: no such thread", id),
        }
    }

    #[track_caller]
    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> &mut Thread<C> {
        match self.threads.get_mut(&id) {
            Some(thread) if thread.is_valid() => thread,
            Some(_) => panic!("thread {}: corrupted control block signature", id),
            None => panic!("thread {}: no such thread", id),
        }
    }

    /// Effective priority of a thread that must exist.
    #[track_caller]
    pub fn priority(&self, id: ThreadId) -> Priority {
        self.thread(id).priority
    }

    /// Add `donor` to `holder`'s donor list, keeping it ordered by effective
    /// priority. A donor already present is left where it is.
    pub(crate) fn insert_donor(&mut self, holder: ThreadId, donor: ThreadId) {
        let mut donors = core::mem::take(&mut self.thread_mut(holder).donors);
        if !donors.contains(&donor) {
            queue::insert_ordered(&mut donors, donor, |t| self.priority(*t));
        }
        self.thread_mut(holder).donors = donors;
    }

    pub(crate) fn context_ptr_mut(&mut self, id: ThreadId) -> *mut C {
        &mut self.thread_mut(id).context as *mut C
    }

    pub(crate) fn context_ptr(&self, id: ThreadId) -> *const C {
        &self.thread(id).context as *const C
    }

    pub fn contains(&self, id: ThreadId) -> bool {
        self.threads.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Threads that have not exited, whether or not their storage has been
    /// reclaimed yet.
    pub fn live_count(&self) -> usize {
        self.threads
            .values()
            .filter(|thread| thread.state() != ThreadState::Dying)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread<C>> + '_ {
        self.threads.values()
    }
}

impl<C> Default for ThreadTable<C> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::String;

    fn table_with(priorities: &[Priority]) -> (ThreadTable<()>, std::vec::Vec<ThreadId>) {
        let mut table = ThreadTable::new();
        let mut ids = std::vec::Vec::new();
        for &priority in priorities {
            let id = table.allocate_id().unwrap();
            table.insert(Thread::new(id, String::from("t"), priority, ()));
            ids.push(id);
        }
        (table, ids)
    }

    #[test]
    fn test_ids_are_monotonic() {
        let table: ThreadTable<()> = ThreadTable::new();
        let a = table.allocate_id().unwrap();
        let b = table.allocate_id().unwrap();
        assert_eq!(a.get(), 2);
        assert!(b > a);
    }

    #[test]
    fn test_id_space_exhaustion() {
        let table: ThreadTable<()> = ThreadTable::new();
        table.next_id.store(usize::MAX, Ordering::Release);
        assert!(table.allocate_id().is_none());
    }

    #[test]
    fn test_insert_donor_orders_by_priority() {
        let (mut table, ids) = table_with(&[1, 5, 9, 5]);
        let holder = ids[0];
        table.insert_donor(holder, ids[1]);
        table.insert_donor(holder, ids[2]);
        table.insert_donor(holder, ids[3]);
        table.insert_donor(holder, ids[2]);

        let donors: std::vec::Vec<_> = table.thread(holder).donors().collect();
        assert_eq!(donors, [ids[2], ids[1], ids[3]]);
    }

    #[test]
    #[should_panic(expected = "corrupted control block signature")]
    fn test_corrupted_signature_is_fatal() {
        let (mut table, ids) = table_with(&[3]);
        table.threads.get_mut(&ids[0]).unwrap().corrupt();
        let _ = table.thread(ids[0]);
    }
}
