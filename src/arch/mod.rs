//! Architecture abstraction layer for context switching and interrupt masking.
//!
//! The scheduler core never touches registers itself. It asks the [`Arch`]
//! implementation to build an initial context for a new thread, to switch
//! between two saved contexts, and to mask or unmask interrupts on the single
//! CPU it runs on.

use portable_atomic::{AtomicBool, AtomicU64, Ordering};

/// Entry point of a kernel thread. The argument is the opaque `aux` word
/// passed at creation.
pub type ThreadFn = fn(usize);

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations of `context_switch` involve direct hardware manipulation.
/// The scheduler only calls it with interrupts disabled and with pointers to
/// contexts owned by live thread control blocks.
pub trait Arch {
    /// Architecture-specific saved context type.
    ///
    /// This type must contain all CPU state needed to resume a thread.
    type SavedContext: Send + Default;

    /// Build the context a new thread starts from.
    ///
    /// Switching to the returned context must begin execution at `entry`
    /// with `aux` as its only argument.
    fn init_context(&self, entry: ThreadFn, aux: usize) -> Self::SavedContext;

    /// Suspend the thread owning `prev` and resume the one owning `next`.
    ///
    /// # Safety
    ///
    /// - `prev` and `next` must point to valid, distinct saved contexts
    /// - Must be called with interrupts disabled
    /// - The `next` context must represent a valid execution state
    unsafe fn context_switch(&self, prev: *mut Self::SavedContext, next: *const Self::SavedContext);

    /// Enable interrupts on the current CPU.
    fn enable_interrupts(&self);

    /// Disable interrupts on the current CPU.
    fn disable_interrupts(&self);

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled(&self) -> bool;
}

/// Interrupt level, as saved by [`intr_disable`] and restored by
/// [`intr_set_level`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    /// Interrupts enabled.
    On,
    /// Interrupts disabled.
    Off,
}

/// Current interrupt level.
pub fn intr_get_level<A: Arch>(arch: &A) -> IntrLevel {
    if arch.interrupts_enabled() {
        IntrLevel::On
    } else {
        IntrLevel::Off
    }
}

/// Disable interrupts and return the level that was in effect before.
pub fn intr_disable<A: Arch>(arch: &A) -> IntrLevel {
    let old = intr_get_level(arch);
    arch.disable_interrupts();
    old
}

/// Restore a previously saved interrupt level, returning the level it
/// replaces.
///
/// This never unconditionally enables interrupts: a section entered with
/// interrupts already off leaves them off.
pub fn intr_set_level<A: Arch>(arch: &A, level: IntrLevel) -> IntrLevel {
    let old = intr_get_level(arch);
    match level {
        IntrLevel::On => arch.enable_interrupts(),
        IntrLevel::Off => arch.disable_interrupts(),
    }
    old
}

/// Saved context used by [`HostArch`].
///
/// It only remembers where the thread would start; there is no register
/// state because the host never really switches stacks.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostContext {
    pub entry: Option<ThreadFn>,
    pub aux: usize,
}

/// Hosted architecture implementation for testing.
///
/// Context switches are recorded, not performed. The interrupt flag is kept
/// per instance so independent kernels (and parallel tests) never observe
/// each other's interrupt level. Interrupts start disabled, as on boot.
#[derive(Debug, Default)]
pub struct HostArch {
    interrupts: AtomicBool,
    switches: AtomicU64,
}

impl HostArch {
    pub const fn new() -> Self {
        Self {
            interrupts: AtomicBool::new(false),
            switches: AtomicU64::new(0),
        }
    }

    /// Total number of context switches performed so far.
    pub fn switch_count(&self) -> u64 {
        self.switches.load(Ordering::Acquire)
    }
}

impl Arch for HostArch {
    type SavedContext = HostContext;

    fn init_context(&self, entry: ThreadFn, aux: usize) -> HostContext {
        HostContext {
            entry: Some(entry),
            aux,
        }
    }

    unsafe fn context_switch(&self, _prev: *mut HostContext, _next: *const HostContext) {
        // The host keeps executing on the caller's stack.
        self.switches.fetch_add(1, Ordering::AcqRel);
    }

    fn enable_interrupts(&self) {
        self.interrupts.store(true, Ordering::Release);
    }

    fn disable_interrupts(&self) {
        self.interrupts.store(false, Ordering::Release);
    }

    fn interrupts_enabled(&self) -> bool {
        self.interrupts.load(Ordering::Acquire)
    }
}
