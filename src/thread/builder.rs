use super::ThreadId;
use crate::arch::{Arch, ThreadFn};
use crate::errors::SpawnError;
use crate::kernel::Kernel;
use crate::sched::priority::PRI_DEFAULT;
use crate::sched::{Priority, Scheduler};

extern crate alloc;
use alloc::string::String;

/// Configures a thread before [`spawn`](ThreadBuilder::spawn) hands it to a
/// kernel.
pub struct ThreadBuilder {
    priority: Priority,
    name: Option<String>,
    user: bool,
}

impl ThreadBuilder {
    pub fn new() -> Self {
        Self {
            priority: PRI_DEFAULT,
            name: None,
            user: false,
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn name<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the thread as backing a user process. Only tick accounting
    /// looks at this.
    pub fn user(mut self, user: bool) -> Self {
        self.user = user;
        self
    }

    /// Create the thread on `kernel`, with the same effects as
    /// [`Kernel::create`].
    pub fn spawn<A: Arch, S: Scheduler>(
        self,
        kernel: &mut Kernel<A, S>,
        entry: ThreadFn,
        aux: usize,
    ) -> Result<ThreadId, SpawnError> {
        let name = self.name.as_deref().unwrap_or("thread");
        kernel.spawn_thread(name, self.priority, self.user, entry, aux)
    }
}

impl Default for ThreadBuilder {
    fn default() -> Self {
        Self::new()
    }
}
