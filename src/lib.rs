#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]

//! Priority scheduling and synchronization for a single-CPU kernel.
//!
//! This library provides the thread core of a small instructional kernel:
//! thread creation and lifecycle, a strict-priority ready queue with time
//! slicing, timed sleep, counting semaphores, locks with priority donation
//! and condition variables.
//!
//! # Quick Start
//!
//! ```ignore
//! use priority_threads::{Kernel, KernelCell, SchedConfig, Wait};
//!
//! static KERNEL: spin::Lazy<KernelCell<BoardArch>> = spin::Lazy::new(|| {
//!     let mut kernel = Kernel::new(BoardArch::new(), SchedConfig::default());
//!     kernel.start().expect("scheduler already started");
//!     KernelCell::new(kernel)
//! });
//!
//! fn kernel_main() {
//!     let worker = KERNEL.with(|k| k.create("worker", 40, worker_main, 0));
//!     assert!(worker.is_ok());
//! }
//!
//! fn timer_handler() {
//!     KERNEL.timer_interrupt();
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized around several key abstractions:
//! - [`Arch`] supplies context switching and interrupt masking
//! - [`Kernel`] owns every thread control block and primitive and runs the
//!   dispatcher
//! - [`Scheduler`] is the ready queue the dispatcher picks from
//! - [`KernelCell`] shares one kernel between thread and interrupt context
//!
//! # Fatal conditions
//!
//! Misuse that indicates a kernel bug (an out-of-range priority, releasing a
//! lock the caller does not hold, blocking inside an interrupt handler, a
//! damaged thread control block) panics with a diagnostic naming the
//! operation. Only resource exhaustion is reported through [`errors`].

// Core modules
pub mod arch;
pub mod config;
pub mod errors;
pub mod kernel;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
mod tests;

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

// Panic handler for bare-metal targets
#[cfg(all(not(test), target_os = "none"))]
use core::panic::PanicInfo;

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, HostArch, IntrLevel, ThreadFn};

// Kernel
pub use kernel::{Kernel, KernelCell, ProcessHooks};

// Configuration
pub use config::SchedConfig;

// Scheduler
pub use sched::priority::{PRI_DEFAULT, PRI_MAX, PRI_MIN};
pub use sched::{PriorityScheduler, Priority, Scheduler};

// Synchronization
pub use sync::{CondId, LockId, SemaId, Wait};

// Threads
pub use thread::{Thread, ThreadBuilder, ThreadId, ThreadState};

// Time
pub use time::{Duration, TickStats};

// Errors
pub use errors::{ScheduleError, SpawnError, ThreadError, ThreadResult};
