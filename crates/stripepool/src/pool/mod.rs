mod config;
mod fault;
mod thread_pool;

pub use config::*;
pub use fault::*;
pub use thread_pool::*;

use core::time::Duration;
use std::{sync::Arc, time::Instant};

use crate::{Result, Task, TaskHandle};

/// The capability every pool in this crate exposes: submit work and drive the
/// pool through shutdown to termination.
///
/// [`ThreadPool`] is the runtime implementation. [`BoundedPool`] and
/// [`StripedExecutor`] implement it by composition.
///
/// [`BoundedPool`]: crate::BoundedPool
/// [`StripedExecutor`]: crate::StripedExecutor
pub trait WorkerPool: Send + Sync {
    /// Hands `task` to the pool.
    ///
    /// # Errors
    /// [`Error::Rejected`] if the pool cannot accept the task. The task is
    /// dropped, which releases anything it owns.
    ///
    /// [`Error::Rejected`]: crate::Error::Rejected
    fn execute(&self, task: Task) -> Result<()>;

    /// Runs `f` on the pool and returns a handle to its result.
    ///
    /// # Errors
    /// Same as [`Self::execute`].
    fn submit<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        Self: Sized,
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        self.execute(task)?;
        Ok(handle)
    }

    /// Stops accepting tasks. Queued tasks still run. Idempotent.
    fn shutdown(&self);

    /// Stops accepting tasks and hands back every queued task that has not
    /// started, in queue order.
    ///
    /// Running tasks are not preempted: interruption of running workers is
    /// best-effort, and threads cannot be interrupted safely, so they run to
    /// completion.
    fn shutdown_now(&self) -> Vec<Task>;

    /// `true` once [`Self::shutdown`] or [`Self::shutdown_now`] was called.
    fn is_shutdown(&self) -> bool;

    /// `true` once the pool is shut down and every worker has exited.
    fn is_terminated(&self) -> bool;

    /// Blocks until the pool terminates or `timeout` elapses. Returns whether
    /// the pool terminated.
    fn await_termination(&self, timeout: Duration) -> bool;

    /// Like [`Self::await_termination`], against an absolute deadline.
    fn await_termination_until(&self, deadline: Instant) -> bool {
        self.await_termination(deadline.saturating_duration_since(Instant::now()))
    }
}

impl<P> WorkerPool for Arc<P>
where
    P: WorkerPool + ?Sized,
{
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }

    fn shutdown(&self) {
        (**self).shutdown();
    }

    fn shutdown_now(&self) -> Vec<Task> {
        (**self).shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        (**self).is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        (**self).is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        (**self).await_termination(timeout)
    }

    fn await_termination_until(&self, deadline: Instant) -> bool {
        (**self).await_termination_until(deadline)
    }
}

/// `now + timeout`, saturating for timeouts too large to represent.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(60 * 60 * 24 * 365 * 100))
}
