//! Strict-priority ready queue.

use super::queue;
use super::trait_def::{Priority, Scheduler};
use crate::thread::ThreadId;

extern crate alloc;
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Single ready queue ordered by effective priority, FIFO within a level.
///
/// Every entry carries the priority the thread had when it was queued or last
/// repositioned, so ordering never needs the thread table.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    queue: VecDeque<(ThreadId, Priority)>,
}

impl PriorityScheduler {
    pub const fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queued priority of `thread`, if queued.
    pub fn priority_of(&self, thread: ThreadId) -> Option<Priority> {
        self.queue
            .iter()
            .find(|(id, _)| *id == thread)
            .map(|&(_, priority)| priority)
    }
}

impl Scheduler for PriorityScheduler {
    fn enqueue(&mut self, thread: ThreadId, priority: Priority) {
        debug_assert!(
            self.priority_of(thread).is_none(),
            "thread {} queued twice",
            thread
        );
        queue::insert_ordered(&mut self.queue, (thread, priority), |&(_, p)| p);
    }

    fn pick_next(&mut self) -> Option<ThreadId> {
        self.queue.pop_front().map(|(id, _)| id)
    }

    fn peek(&self) -> Option<(ThreadId, Priority)> {
        self.queue.front().copied()
    }

    fn remove(&mut self, thread: ThreadId) -> bool {
        match self.queue.iter().position(|(id, _)| *id == thread) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    fn reprioritize(&mut self, thread: ThreadId, priority: Priority) -> bool {
        match self.queue.iter_mut().find(|(id, _)| *id == thread) {
            Some(entry) => {
                entry.1 = priority;
                queue::sort_ordered(&mut self.queue, |&(_, p)| p);
                true
            }
            None => false,
        }
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn snapshot(&self) -> Vec<ThreadId> {
        self.queue.iter().map(|&(id, _)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: usize) -> ThreadId {
        ThreadId::from_raw(n).unwrap()
    }

    #[test]
    fn test_highest_priority_first() {
        let mut sched = PriorityScheduler::new();
        sched.enqueue(tid(2), 10);
        sched.enqueue(tid(3), 40);
        sched.enqueue(tid(4), 20);

        assert_eq!(sched.peek(), Some((tid(3), 40)));
        assert_eq!(sched.pick_next(), Some(tid(3)));
        assert_eq!(sched.pick_next(), Some(tid(4)));
        assert_eq!(sched.pick_next(), Some(tid(2)));
        assert_eq!(sched.pick_next(), None);
        assert!(sched.is_empty());
    }

    #[test]
    fn test_fifo_within_priority() {
        let mut sched = PriorityScheduler::new();
        for n in 2..6 {
            sched.enqueue(tid(n), 31);
        }
        assert_eq!(sched.snapshot(), [tid(2), tid(3), tid(4), tid(5)]);
    }

    #[test]
    fn test_reprioritize_moves_entry() {
        let mut sched = PriorityScheduler::new();
        sched.enqueue(tid(2), 31);
        sched.enqueue(tid(3), 31);
        sched.enqueue(tid(4), 20);

        assert!(sched.reprioritize(tid(4), 50));
        assert_eq!(sched.snapshot(), [tid(4), tid(2), tid(3)]);
        assert_eq!(sched.priority_of(tid(4)), Some(50));

        assert!(sched.reprioritize(tid(4), 31));
        // Stable: keeps its place ahead of the earlier equals.
        assert_eq!(sched.snapshot(), [tid(4), tid(2), tid(3)]);

        assert!(!sched.reprioritize(tid(9), 1));
    }

    #[test]
    fn test_remove() {
        let mut sched = PriorityScheduler::new();
        sched.enqueue(tid(2), 1);
        sched.enqueue(tid(3), 2);
        assert!(sched.remove(tid(2)));
        assert!(!sched.remove(tid(2)));
        assert_eq!(sched.len(), 1);
    }
}
