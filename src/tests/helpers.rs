//! Test helper utilities and common functionality.

use crate::arch::HostArch;
use crate::config::SchedConfig;
use crate::kernel::{Kernel, ProcessHooks};
use crate::sched::Priority;
use crate::thread::{Location, ThreadId, ThreadState};
use alloc::sync::Arc;
use alloc::vec::Vec;

/// Entry point for threads whose body the test plays out by hand.
pub fn nop(_aux: usize) {}

/// Kernel with default configuration, started.
pub fn boot() -> Kernel<HostArch> {
    boot_with(SchedConfig::default())
}

pub fn boot_with(config: SchedConfig) -> Kernel<HostArch> {
    let mut kernel = Kernel::new(HostArch::new(), config);
    kernel.start().expect("fresh kernel must start");
    kernel
}

/// Create a thread that outranks the caller and check it is now current.
pub fn run_as(kernel: &mut Kernel<HostArch>, name: &str, priority: Priority) -> ThreadId {
    let id = kernel
        .create(name, priority, nop, 0)
        .expect("thread creation failed");
    assert_eq!(kernel.current(), id, "{} did not preempt its creator", name);
    id
}

/// Deliver `n` timer interrupts.
pub fn tick(kernel: &mut Kernel<HostArch>, n: u64) {
    for _ in 0..n {
        kernel.timer_interrupt();
    }
}

/// Dispatcher callbacks seen by [`RecordingHooks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookEvent {
    Activate(ThreadId),
    Exit(ThreadId),
}

/// Process hooks that append every callback to a shared log.
#[derive(Clone, Default)]
pub struct RecordingHooks {
    events: Arc<spin::Mutex<Vec<HookEvent>>>,
}

impl RecordingHooks {
    pub fn events(&self) -> Vec<HookEvent> {
        self.events.lock().clone()
    }
}

impl ProcessHooks for RecordingHooks {
    fn activate(&mut self, next: ThreadId) {
        self.events.lock().push(HookEvent::Activate(next));
    }

    fn exit(&mut self, thread: ThreadId) {
        self.events.lock().push(HookEvent::Exit(thread));
    }
}

/// Check the scheduler-wide invariants that must hold between operations.
pub fn check_invariants(kernel: &Kernel<HostArch>) {
    let current = kernel.current();
    let mut running = 0;
    let mut ready = 0;

    for thread in kernel.threads.iter() {
        let id = thread.id();
        assert!(thread.is_valid(), "thread {} signature", id);

        match thread.state() {
            ThreadState::Running => {
                running += 1;
                assert_eq!(id, current, "thread {} running but not current", id);
            }
            ThreadState::Ready => {
                ready += 1;
                assert_eq!(thread.location(), Location::Ready, "ready thread {} not queued", id);
            }
            ThreadState::Blocked => {
                assert_ne!(thread.location(), Location::Ready, "blocked thread {} queued", id);
            }
            ThreadState::Dying => {}
        }

        let base = thread.base_priority();
        let donated = thread
            .donors()
            .filter_map(|donor| kernel.priority_of(donor))
            .max();
        assert!(thread.priority() >= base, "thread {} below base priority", id);
        assert_eq!(
            thread.priority(),
            donated.map_or(base, |donated| donated.max(base)),
            "thread {} effective priority out of sync with donors",
            id
        );

        match thread.location() {
            Location::Ready => {
                assert_eq!(kernel.scheduler.priority_of(id), Some(thread.priority()));
            }
            Location::Sleep => assert!(kernel.sleepers.contains(id)),
            Location::Sema(sema) => assert!(kernel.sema_waiters(sema).contains(&id)),
            Location::Detached => {}
        }
    }
    assert_eq!(running, 1, "exactly one thread must be running");

    let queue = kernel.ready_threads();
    assert_eq!(queue.len(), ready);
    let priorities: Vec<Priority> = queue
        .iter()
        .filter_map(|&id| kernel.priority_of(id))
        .collect();
    assert!(
        priorities.windows(2).all(|pair| pair[0] >= pair[1]),
        "ready queue out of order: {:?}",
        priorities
    );

    for (_, lock) in kernel.locks.iter() {
        if let Some(holder) = lock.holder {
            let state = kernel.state_of(holder);
            assert!(
                matches!(state, Some(ThreadState::Running | ThreadState::Ready | ThreadState::Blocked)),
                "lock held by thread {} in state {:?}",
                holder,
                state
            );
        }
    }
}
