//! Kernel abstraction for managing the threading system.
//!
//! This module provides the main [`Kernel`] struct: the thread table, the
//! ready and sleep queues, the synchronization primitive arenas and the
//! dispatcher that moves the single CPU between threads.
//!
//! # Execution model
//!
//! Every operation acts on behalf of the current thread. An operation that
//! blocks hands the CPU to another thread and returns [`Wait::Suspended`];
//! the remainder of the blocking operation (retrying a semaphore down,
//! re-acquiring a lock after a condition wait) runs inside the dispatcher the
//! next time the blocked thread is switched in. When that happens the thread
//! is current again and holds whatever it was waiting for.

use crate::arch::{self, Arch, IntrLevel, ThreadFn};
use crate::config::SchedConfig;
use crate::errors::{ScheduleError, SpawnError, ThreadResult};
use crate::sched::priority::{self, PRI_MIN};
use crate::sched::{PriorityScheduler, Priority, Scheduler, SleepQueue};
use crate::sync::{Arena, Condvar, Lock, LockId, Semaphore, Wait};
use crate::thread::{self, Location, Resume, Thread, ThreadId, ThreadState, ThreadTable};
use crate::time::{Duration, TickCounter, TickStats};
use log::{debug, info, trace, warn};
use portable_atomic::{AtomicU64, Ordering};

extern crate alloc;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Process-layer callbacks invoked by the dispatcher.
///
/// The default methods do nothing, which is what a kernel without user
/// processes wants.
pub trait ProcessHooks: Send {
    /// Called on every schedule, before `next` starts running.
    fn activate(&mut self, _next: ThreadId) {}

    /// Called when `thread` exits, before it is marked dying.
    fn exit(&mut self, _thread: ThreadId) {}
}

/// Main kernel handle that manages the threading system.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation
/// * `S` - Ready queue implementation
pub struct Kernel<A: Arch, S: Scheduler = PriorityScheduler> {
    pub(crate) arch: A,
    pub(crate) config: SchedConfig,
    pub(crate) threads: ThreadTable<A::SavedContext>,
    pub(crate) scheduler: S,
    pub(crate) sleepers: SleepQueue,
    /// Dying threads waiting to be reclaimed by the next schedule
    destruction: Vec<ThreadId>,
    pub(crate) current: ThreadId,
    initial: ThreadId,
    idle: Option<ThreadId>,
    pub(crate) semaphores: Arena<Semaphore>,
    pub(crate) locks: Arena<Lock>,
    pub(crate) conds: Arena<Condvar>,
    ticks: TickCounter,
    stats: TickStats,
    /// Ticks the current thread has run since it was last scheduled
    slice_ticks: u32,
    pub(crate) in_interrupt: bool,
    pub(crate) yield_on_return: bool,
    hooks: Option<Box<dyn ProcessHooks>>,
}

impl<A: Arch> Kernel<A> {
    /// Create a kernel with the strict-priority ready queue.
    pub fn new(arch: A, config: SchedConfig) -> Self {
        Self::with_scheduler(arch, PriorityScheduler::new(), config)
    }
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Create a kernel around the code that is already running.
    ///
    /// The running code becomes the initial thread, "main", at
    /// [`PRI_DEFAULT`](priority::PRI_DEFAULT). Interrupts are left disabled
    /// until [`start`](Self::start).
    pub fn with_scheduler(arch: A, scheduler: S, config: SchedConfig) -> Self {
        arch.disable_interrupts();

        let mut threads = ThreadTable::new();
        let mut main = Thread::new(
            ThreadId::MAIN,
            alloc::string::String::from("main"),
            priority::PRI_DEFAULT,
            A::SavedContext::default(),
        );
        main.state = ThreadState::Running;
        threads.insert(main);

        Self {
            arch,
            config,
            threads,
            scheduler,
            sleepers: SleepQueue::new(),
            destruction: Vec::new(),
            current: ThreadId::MAIN,
            initial: ThreadId::MAIN,
            idle: None,
            semaphores: Arena::new(),
            locks: Arena::new(),
            conds: Arena::new(),
            ticks: TickCounter::new(config.timer_hz),
            stats: TickStats::default(),
            slice_ticks: 0,
            in_interrupt: false,
            yield_on_return: false,
            hooks: None,
        }
    }

    /// Create the idle thread and enable interrupts.
    ///
    /// The idle thread runs only when the ready queue is empty and is never
    /// placed on the ready queue itself.
    pub fn start(&mut self) -> ThreadResult<ThreadId> {
        if self.idle.is_some() {
            return Err(ScheduleError::AlreadyStarted.into());
        }

        let id = self.threads.allocate_id().ok_or(SpawnError::IdsExhausted)?;
        let context = self.arch.init_context(idle_entry, 0);
        let idle = Thread::new(id, alloc::string::String::from("idle"), PRI_MIN, context);
        self.threads.insert(idle);
        self.idle = Some(id);

        info!("scheduler started, idle thread {}", id);
        self.arch.enable_interrupts();
        Ok(id)
    }

    /// Whether [`start`](Self::start) has run.
    pub fn is_started(&self) -> bool {
        self.idle.is_some()
    }

    /// Create a kernel thread and make it ready.
    ///
    /// If the new thread outranks the caller, the caller yields before this
    /// returns.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is outside `PRI_MIN..=PRI_MAX`.
    pub fn create(
        &mut self,
        name: &str,
        priority: Priority,
        entry: ThreadFn,
        aux: usize,
    ) -> Result<ThreadId, SpawnError> {
        self.spawn_thread(name, priority, false, entry, aux)
    }

    pub(crate) fn spawn_thread(
        &mut self,
        name: &str,
        priority: Priority,
        user: bool,
        entry: ThreadFn,
        aux: usize,
    ) -> Result<ThreadId, SpawnError> {
        check_priority("create", priority);
        if self.threads.live_count() >= self.config.max_threads {
            return Err(SpawnError::TooManyThreads(self.config.max_threads));
        }

        let name = thread::truncated_name(name)?;
        let id = self.threads.allocate_id().ok_or(SpawnError::IdsExhausted)?;
        let context = self.arch.init_context(entry, aux);
        let mut thread = Thread::new(id, name, priority, context);
        thread.user = user;
        debug!("created thread {} '{}' at priority {}", id, thread.name(), priority);
        self.threads.insert(thread);

        self.unblock(id);
        self.test_max_priority();
        Ok(id)
    }

    /// Identity of the running thread.
    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// Control block of the running thread.
    ///
    /// # Panics
    ///
    /// Panics if the control block is damaged or not marked Running.
    pub fn current_thread(&self) -> &Thread<A::SavedContext> {
        let thread = self.threads.thread(self.current);
        assert_eq!(
            thread.state(),
            ThreadState::Running,
            "current thread {} is not running",
            self.current
        );
        thread
    }

    pub fn thread_name(&self) -> &str {
        self.current_thread().name()
    }

    /// Look up any live thread.
    pub fn thread(&self, id: ThreadId) -> Option<&Thread<A::SavedContext>> {
        self.threads.get(id)
    }

    pub fn state_of(&self, id: ThreadId) -> Option<ThreadState> {
        self.threads.get(id).map(|thread| thread.state())
    }

    /// Effective priority of `id`.
    pub fn priority_of(&self, id: ThreadId) -> Option<Priority> {
        self.threads.get(id).map(|thread| thread.priority())
    }

    pub fn base_priority_of(&self, id: ThreadId) -> Option<Priority> {
        self.threads.get(id).map(|thread| thread.base_priority())
    }

    /// Threads currently donating to `id`, highest priority first.
    pub fn donors_of(&self, id: ThreadId) -> Vec<ThreadId> {
        self.threads
            .get(id)
            .map(|thread| thread.donors().collect())
            .unwrap_or_default()
    }

    /// Lock `id` is blocked acquiring.
    pub fn waiting_on(&self, id: ThreadId) -> Option<LockId> {
        self.threads.get(id).and_then(|thread| thread.waiting_on())
    }

    pub fn thread_count(&self) -> usize {
        self.threads.len()
    }

    pub fn idle_thread(&self) -> Option<ThreadId> {
        self.idle
    }

    pub fn initial_thread(&self) -> ThreadId {
        self.initial
    }

    /// Ready threads in dispatch order.
    pub fn ready_threads(&self) -> Vec<ThreadId> {
        self.scheduler.snapshot()
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Install process-layer callbacks, returning the previous ones.
    pub fn set_process_hooks(
        &mut self,
        hooks: Box<dyn ProcessHooks>,
    ) -> Option<Box<dyn ProcessHooks>> {
        self.hooks.replace(hooks)
    }

    /// Effective priority of the running thread.
    pub fn get_priority(&self) -> Priority {
        self.current_thread().priority()
    }

    /// Set the running thread's base priority.
    ///
    /// The effective priority is recomputed from the new base and any
    /// donations; the caller yields if it no longer has the highest priority.
    ///
    /// # Panics
    ///
    /// Panics if `priority` is outside `PRI_MIN..=PRI_MAX`.
    pub fn set_priority(&mut self, priority: Priority) {
        check_priority("set_priority", priority);
        let old = self.intr_disable();
        let cur = self.current;
        self.threads.thread_mut(cur).base_priority = priority;
        self.refresh_priority(cur);
        self.test_max_priority();
        self.intr_set_level(old);
    }

    /// Niceness is not tracked; accepted and ignored.
    pub fn set_nice(&mut self, _nice: i32) {}

    pub fn get_nice(&self) -> i32 {
        0
    }

    /// 100 times the system load average. Not tracked.
    pub fn get_load_avg(&self) -> i32 {
        0
    }

    /// 100 times the running thread's recent CPU. Not tracked.
    pub fn get_recent_cpu(&self) -> i32 {
        0
    }

    /// Current interrupt level.
    pub fn intr_get_level(&self) -> IntrLevel {
        arch::intr_get_level(&self.arch)
    }

    /// Disable interrupts and return the previous level.
    pub fn intr_disable(&self) -> IntrLevel {
        arch::intr_disable(&self.arch)
    }

    /// Restore an interrupt level returned by [`intr_disable`](Self::intr_disable).
    pub fn intr_set_level(&self, level: IntrLevel) -> IntrLevel {
        arch::intr_set_level(&self.arch, level)
    }

    pub fn in_interrupt(&self) -> bool {
        self.in_interrupt
    }

    /// Put the current thread to sleep until [`unblock`](Self::unblock).
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or with interrupts enabled.
    pub fn block(&mut self) {
        assert!(!self.in_interrupt, "block: called from interrupt context");
        assert!(
            !self.arch.interrupts_enabled(),
            "block: interrupts must be disabled"
        );
        let cur = self.current;
        self.threads.thread_mut(cur).state = ThreadState::Blocked;
        self.schedule();
    }

    /// Make a blocked thread ready. Never preempts the caller.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not Blocked or is still queued on a wait structure.
    pub fn unblock(&mut self, id: ThreadId) {
        let old = self.intr_disable();
        let thread = self.threads.thread(id);
        assert_eq!(
            thread.state(),
            ThreadState::Blocked,
            "unblock: thread {} is not blocked",
            id
        );
        assert_eq!(
            thread.location(),
            Location::Detached,
            "unblock: thread {} is still queued",
            id
        );
        self.make_ready(id);
        self.intr_set_level(old);
    }

    fn make_ready(&mut self, id: ThreadId) {
        let thread = self.threads.thread_mut(id);
        thread.state = ThreadState::Ready;
        thread.location = Location::Ready;
        let priority = thread.priority;
        self.scheduler.enqueue(id, priority);
    }

    /// Give up the CPU. The current thread stays runnable and may be picked
    /// again immediately.
    pub fn yield_now(&mut self) {
        assert!(!self.in_interrupt, "yield: called from interrupt context");
        let old = self.intr_disable();
        let cur = self.current;
        if Some(cur) == self.idle {
            self.threads.thread_mut(cur).state = ThreadState::Blocked;
        } else {
            self.make_ready(cur);
        }
        self.schedule();
        self.intr_set_level(old);
    }

    /// Terminate the current thread. Its storage is reclaimed during a later
    /// schedule, except for the initial thread's.
    ///
    /// # Panics
    ///
    /// Panics if called from interrupt context or by the idle thread.
    pub fn exit(&mut self) {
        assert!(!self.in_interrupt, "exit: called from interrupt context");
        let cur = self.current;
        assert!(Some(cur) != self.idle, "exit: idle thread cannot exit");

        if let Some(hooks) = self.hooks.as_mut() {
            hooks.exit(cur);
        }
        let held = self
            .locks
            .iter()
            .filter(|(_, lock)| lock.holder == Some(cur))
            .count();
        if held > 0 {
            warn!("thread {} exiting while holding {} lock(s)", cur, held);
        }

        let old = self.intr_disable();
        debug!("thread {} '{}' exiting", cur, self.threads.thread(cur).name());
        self.threads.thread_mut(cur).state = ThreadState::Dying;
        self.schedule();
        self.intr_set_level(old);
    }

    /// Switch to the next thread to run.
    ///
    /// The caller has already moved the current thread out of Running.
    /// After the switch the incoming thread finishes any blocking operation
    /// it was suspended in; if that blocks it again, the next pick follows.
    pub(crate) fn schedule(&mut self) {
        assert!(
            !self.arch.interrupts_enabled(),
            "schedule: interrupts must be disabled"
        );
        self.reclaim_dying();

        loop {
            let prev = self.current;
            assert_ne!(
                self.threads.thread(prev).state(),
                ThreadState::Running,
                "schedule: thread {} is still running",
                prev
            );

            let next = self.next_thread_to_run();
            self.threads.thread_mut(next).state = ThreadState::Running;
            self.slice_ticks = 0;
            if let Some(hooks) = self.hooks.as_mut() {
                hooks.activate(next);
            }

            if prev != next {
                if self.threads.thread(prev).state() == ThreadState::Dying && prev != self.initial
                {
                    self.destruction.push(prev);
                }
                self.current = next;
                self.switch_context(prev, next);
            }

            if self.resume_pending() {
                break;
            }
        }
    }

    fn next_thread_to_run(&mut self) -> ThreadId {
        match self.scheduler.pick_next() {
            Some(id) => {
                self.threads.thread_mut(id).location = Location::Detached;
                id
            }
            None => match self.idle {
                Some(idle) => idle,
                None => panic!("schedule: no runnable thread before start"),
            },
        }
    }

    fn switch_context(&mut self, prev: ThreadId, next: ThreadId) {
        trace!("switch {} -> {}", prev, next);
        let prev_ctx = self.threads.context_ptr_mut(prev);
        let next_ctx = self.threads.context_ptr(next);
        // SAFETY: both contexts live in distinct control blocks that stay in
        // the table for the duration of the switch.
        unsafe { self.arch.context_switch(prev_ctx, next_ctx) };
    }

    /// Finish the blocking operation the current thread was suspended in.
    /// Returns `false` if it had to block again.
    fn resume_pending(&mut self) -> bool {
        let cur = self.current;
        match self.threads.thread_mut(cur).pending.take() {
            None => true,
            Some(Resume::Sema(sema)) => self.sema_attempt(sema, Resume::Sema(sema)),
            Some(Resume::Lock(lock)) => self.lock_attempt(lock),
            Some(Resume::CondWait { waiter, lock }) => self.cond_resume(waiter, lock),
        }
    }

    fn reclaim_dying(&mut self) {
        for id in core::mem::take(&mut self.destruction) {
            if let Some(thread) = self.threads.remove(id) {
                debug!("reclaimed thread {} '{}'", id, thread.name());
            }
        }
    }

    /// Current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.ticks()
    }

    /// Ticks elapsed since `then`.
    pub fn elapsed(&self, then: u64) -> u64 {
        self.ticks.elapsed(then)
    }

    pub fn tick_stats(&self) -> TickStats {
        self.stats
    }

    /// Log where timer ticks have been spent.
    pub fn print_stats(&self) {
        info!(
            "Thread: {} idle ticks, {} kernel ticks, {} user ticks",
            self.stats.idle, self.stats.kernel, self.stats.user
        );
    }

    /// Run `handler` as an external interrupt handler.
    ///
    /// Inside the handler, operations that would preempt the interrupted
    /// thread defer the switch until the handler returns.
    ///
    /// # Panics
    ///
    /// Panics on nested delivery or when interrupts are masked.
    pub fn external_interrupt<R>(&mut self, handler: impl FnOnce(&mut Self) -> R) -> R {
        assert!(!self.in_interrupt, "nested external interrupt");
        assert!(
            self.arch.interrupts_enabled(),
            "interrupt delivered while interrupts are masked"
        );
        let old = self.intr_disable();
        self.in_interrupt = true;
        let result = handler(self);
        self.in_interrupt = false;
        self.interrupt_return();
        self.intr_set_level(old);
        result
    }

    fn interrupt_return(&mut self) {
        let requested = core::mem::take(&mut self.yield_on_return);
        let idle_with_work = Some(self.current) == self.idle && !self.scheduler.is_empty();
        if requested || idle_with_work {
            self.yield_now();
        }
    }

    /// Deliver one timer interrupt.
    pub fn timer_interrupt(&mut self) {
        self.external_interrupt(|kernel| kernel.timer_tick());
    }

    fn timer_tick(&mut self) {
        let now = self.ticks.increment();

        let cur = self.current;
        if Some(cur) == self.idle {
            self.stats.idle += 1;
        } else if self.threads.thread(cur).is_user() {
            self.stats.user += 1;
        } else {
            self.stats.kernel += 1;
        }

        self.slice_ticks += 1;
        if self.slice_ticks >= self.config.time_slice {
            self.yield_on_return = true;
        }

        if self.sleepers.is_due(now) {
            self.awake(now);
            self.test_max_priority();
        }
    }

    /// Unblock every sleeper due at `now`.
    fn awake(&mut self, now: u64) {
        let threads = &self.threads;
        let woken = self.sleepers.awake(now, |id| threads.thread(id).wake_tick);
        for id in woken {
            trace!("waking thread {} at tick {}", id, now);
            self.threads.thread_mut(id).location = Location::Detached;
            self.unblock(id);
        }
    }

    /// Block the current thread until tick `wake_tick`.
    ///
    /// Returns [`Wait::Completed`] without blocking if the tick has passed.
    pub fn sleep_until(&mut self, wake_tick: u64) -> Wait {
        assert!(!self.in_interrupt, "sleep: called from interrupt context");
        let cur = self.current;
        assert!(Some(cur) != self.idle, "sleep: idle thread cannot sleep");
        if wake_tick <= self.ticks() {
            return Wait::Completed;
        }

        let old = self.intr_disable();
        let thread = self.threads.thread_mut(cur);
        thread.wake_tick = wake_tick;
        thread.location = Location::Sleep;
        thread.state = ThreadState::Blocked;
        self.sleepers.push(cur, wake_tick);
        trace!("thread {} sleeping until tick {}", cur, wake_tick);
        self.schedule();
        self.intr_set_level(old);
        Wait::Suspended
    }

    /// Block the current thread for `ticks` timer ticks.
    pub fn sleep(&mut self, ticks: u64) -> Wait {
        let start = self.ticks();
        self.sleep_until(start.saturating_add(ticks))
    }

    /// Block the current thread for at least the whole ticks in `duration`.
    pub fn sleep_for(&mut self, duration: Duration) -> Wait {
        self.sleep(duration.as_ticks(self.config.timer_hz))
    }

    /// Earliest tick a sleeper is due, `u64::MAX` when none sleeps.
    pub fn next_wake_tick(&self) -> u64 {
        self.sleepers.next_wake()
    }
}

#[track_caller]
pub(crate) fn check_priority(op: &str, priority: Priority) {
    assert!(
        priority::is_valid(priority),
        "{}: priority {} outside {}..={}",
        op,
        priority,
        priority::PRI_MIN,
        priority::PRI_MAX
    );
}

/// The idle thread is switched to only by the dispatcher and waits for the
/// next interrupt.
fn idle_entry(_aux: usize) {
    loop {
        core::hint::spin_loop();
    }
}

/// Kernel shared between thread context and interrupt handlers.
///
/// Thread-context access goes through [`with`](Self::with), which takes the
/// lock and masks interrupts. The timer handler only tries the lock: if
/// thread context holds it, the tick is recorded as missed and replayed by
/// the next handler that gets in.
///
/// Wrap a kernel after [`Kernel::start`]: `with` restores the interrupt level
/// it found, so interrupts enabled inside the closure do not stay enabled.
pub struct KernelCell<A: Arch, S: Scheduler = PriorityScheduler> {
    kernel: spin::Mutex<Kernel<A, S>>,
    missed_ticks: AtomicU64,
}

impl<A: Arch, S: Scheduler> KernelCell<A, S> {
    pub const fn new(kernel: Kernel<A, S>) -> Self {
        Self {
            kernel: spin::Mutex::new(kernel),
            missed_ticks: AtomicU64::new(0),
        }
    }

    /// Run `f` with exclusive access and interrupts masked.
    pub fn with<R>(&self, f: impl FnOnce(&mut Kernel<A, S>) -> R) -> R {
        let mut kernel = self.kernel.lock();
        let old = kernel.intr_disable();
        let result = f(&mut kernel);
        kernel.intr_set_level(old);
        result
    }

    /// Timer interrupt entry point.
    ///
    /// Returns `false` if the kernel was busy and the tick was deferred.
    pub fn timer_interrupt(&self) -> bool {
        match self.kernel.try_lock() {
            Some(mut kernel) => {
                let pending = self.missed_ticks.swap(0, Ordering::AcqRel);
                for _ in 0..=pending {
                    kernel.timer_interrupt();
                }
                true
            }
            None => {
                // Skip this tick if lock is contended
                self.missed_ticks.fetch_add(1, Ordering::AcqRel);
                false
            }
        }
    }

    /// Ticks deferred and not yet replayed.
    pub fn missed_ticks(&self) -> u64 {
        self.missed_ticks.load(Ordering::Acquire)
    }

    pub fn into_inner(self) -> Kernel<A, S> {
        self.kernel.into_inner()
    }
}
