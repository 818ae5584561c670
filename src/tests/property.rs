//! Property-based tests for verifying system invariants.

mod property_tests {
    use crate::arch::HostArch;
    use crate::kernel::Kernel;
    use crate::sched::priority::{PRI_MAX, PRI_MIN};
    use crate::sched::Priority;
    use crate::sync::{CondId, LockId, SemaId};
    use crate::tests::helpers::{boot, check_invariants, nop};
    use crate::thread::ThreadId;
    use proptest::prelude::*;

    const LOCKS: usize = 3;
    const SEMAS: usize = 2;
    const MAX_LIVE: usize = 10;

    /// One step performed by whichever thread is current.
    #[derive(Debug, Clone)]
    enum Op {
        Create(Priority),
        SetPriority(Priority),
        Yield,
        Acquire(usize),
        TryAcquire(usize),
        Release(usize),
        Down(usize),
        Up(usize),
        InterruptUp(usize),
        CondWait(usize),
        CondSignal(usize),
        CondBroadcast(usize),
        Tick,
        Sleep(u8),
        Exit,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (PRI_MIN..=PRI_MAX).prop_map(Op::Create),
            (PRI_MIN..=PRI_MAX).prop_map(Op::SetPriority),
            Just(Op::Yield),
            (0..LOCKS).prop_map(Op::Acquire),
            (0..LOCKS).prop_map(Op::TryAcquire),
            (0..LOCKS).prop_map(Op::Release),
            (0..SEMAS).prop_map(Op::Down),
            (0..SEMAS).prop_map(Op::Up),
            (0..SEMAS).prop_map(Op::InterruptUp),
            (0..LOCKS).prop_map(Op::CondWait),
            (0..LOCKS).prop_map(Op::CondSignal),
            (0..LOCKS).prop_map(Op::CondBroadcast),
            Just(Op::Tick),
            (1..8u8).prop_map(Op::Sleep),
            Just(Op::Exit),
        ]
    }

    struct World {
        kernel: Kernel<HostArch>,
        locks: std::vec::Vec<LockId>,
        semas: std::vec::Vec<SemaId>,
        /// Condition variable guarded by the lock at the same index
        conds: std::vec::Vec<CondId>,
    }

    impl World {
        fn new() -> Self {
            let mut kernel = boot();
            let locks = (0..LOCKS).map(|_| kernel.lock_init()).collect();
            let semas = (0..SEMAS).map(|_| kernel.sema_init(0)).collect();
            let conds = (0..LOCKS).map(|_| kernel.cond_init()).collect();
            Self {
                kernel,
                locks,
                semas,
                conds,
            }
        }

        fn holds_any_lock(&self) -> bool {
            self.locks
                .iter()
                .any(|&lock| self.kernel.lock_held_by_current(lock))
        }

        /// Apply `op` if the current thread may legally perform it.
        fn apply(&mut self, op: &Op) {
            let cur = self.kernel.current();
            let idle = Some(cur) == self.kernel.idle_thread();
            let may_exit = !idle && cur != ThreadId::MAIN && !self.holds_any_lock();
            let k = &mut self.kernel;

            match *op {
                Op::Create(priority) => {
                    if k.thread_count() < MAX_LIVE {
                        k.create("prop", priority, nop, 0).unwrap();
                    }
                }
                Op::SetPriority(priority) if !idle => k.set_priority(priority),
                Op::Yield => k.yield_now(),
                Op::Acquire(i) if !idle && !k.lock_held_by_current(self.locks[i]) => {
                    let _ = k.lock_acquire(self.locks[i]);
                }
                Op::TryAcquire(i) if !idle && !k.lock_held_by_current(self.locks[i]) => {
                    let _ = k.lock_try_acquire(self.locks[i]);
                }
                Op::Release(i) if k.lock_held_by_current(self.locks[i]) => {
                    k.lock_release(self.locks[i]);
                }
                Op::Down(i) if !idle => {
                    let _ = k.sema_down(self.semas[i]);
                }
                Op::Up(i) => k.sema_up(self.semas[i]),
                Op::InterruptUp(i) => {
                    let sema = self.semas[i];
                    k.external_interrupt(|k| k.sema_up(sema));
                }
                Op::CondWait(i) if k.lock_held_by_current(self.locks[i]) => {
                    let _ = k.cond_wait(self.conds[i], self.locks[i]);
                }
                Op::CondSignal(i) if k.lock_held_by_current(self.locks[i]) => {
                    k.cond_signal(self.conds[i], self.locks[i]);
                }
                Op::CondBroadcast(i) if k.lock_held_by_current(self.locks[i]) => {
                    k.cond_broadcast(self.conds[i], self.locks[i]);
                }
                Op::Tick => k.timer_interrupt(),
                Op::Sleep(ticks) if !idle => {
                    let _ = k.sleep(u64::from(ticks));
                }
                Op::Exit if may_exit => k.exit(),
                _ => {}
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn property_random_operations_keep_invariants(ops in prop::collection::vec(op(), 1..80)) {
            let mut world = World::new();
            for op in &ops {
                world.apply(op);
                check_invariants(&world.kernel);
            }
        }

        #[test]
        fn property_acquire_release_restores_priority(
            base in 1..40u8,
            donors in prop::collection::vec(41..=PRI_MAX, 1..5),
        ) {
            let mut world = World::new();
            let lock = world.locks[0];
            let k = &mut world.kernel;
            k.set_priority(base);
            prop_assert_eq!(k.lock_acquire(lock), crate::sync::Wait::Completed);

            for &priority in &donors {
                let t = k.create("donor", priority, nop, 0).unwrap();
                if k.current() == t {
                    let _ = k.lock_acquire(lock);
                }
            }
            prop_assert_eq!(k.current(), ThreadId::MAIN);
            let highest = donors.iter().copied().max().unwrap();
            prop_assert_eq!(k.get_priority(), highest);

            k.lock_release(lock);
            prop_assert_eq!(k.priority_of(ThreadId::MAIN), Some(base));
            check_invariants(k);
        }

        #[test]
        fn property_ready_queue_dispatch_order(priorities in prop::collection::vec(PRI_MIN..=PRI_MAX, 1..20)) {
            let mut kernel = boot();
            kernel.set_priority(PRI_MAX);
            let mut expected: std::vec::Vec<(Priority, ThreadId)> = std::vec::Vec::new();
            for &priority in &priorities {
                let id = kernel.create("ready", priority, nop, 0).unwrap();
                expected.push((priority, id));
            }
            // Stable: equal priorities keep creation order.
            expected.sort_by(|a, b| b.0.cmp(&a.0));
            let order: std::vec::Vec<ThreadId> = expected.iter().map(|&(_, id)| id).collect();
            prop_assert_eq!(kernel.ready_threads(), order);
        }
    }
}
