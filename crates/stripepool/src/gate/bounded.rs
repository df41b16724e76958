use core::{fmt, num::NonZeroUsize, time::Duration};
use std::time::Instant;

use crate::{
    AdmissionGate, Error, Interrupt, Permit, RejectReason, Result, Task, TaskHandle, ThreadPool,
    ThreadPoolBuilder, WorkerPool,
};

/// A [`WorkerPool`] that admits at most `budget` tasks at a time.
///
/// Each submission first takes a [`Permit`] from the pool's
/// [`AdmissionGate`], blocking the submitter while the budget is spent. The
/// permit travels with the task and is returned when the task finishes,
/// panics, or is dropped unstarted. If the inner pool refuses the task the
/// permit is returned immediately and the error is passed through.
///
/// ## Recommended When
/// - Producers must be slowed down rather than see `QueueFull` rejections
/// - The inner queue capacity is at least `budget`, so admitted tasks always
///   fit
///
/// ## See Also
/// - [`StripedExecutor::bounded`](crate::StripedExecutor::bounded)
pub struct BoundedPool<P = ThreadPool> {
    pool: P,
    gate: AdmissionGate,
}

impl<P> BoundedPool<P>
where
    P: WorkerPool,
{
    /// Wraps `pool` with a fresh gate of `budget` permits.
    pub fn new(pool: P, budget: NonZeroUsize) -> Self {
        Self::with_gate(pool, AdmissionGate::new(budget))
    }

    /// Wraps `pool` with an existing gate. Pools sharing a gate share its
    /// budget.
    pub fn with_gate(pool: P, gate: AdmissionGate) -> Self {
        Self { pool, gate }
    }

    pub fn gate(&self) -> &AdmissionGate {
        &self.gate
    }

    pub fn inner(&self) -> &P {
        &self.pool
    }

    pub fn into_inner(self) -> P {
        self.pool
    }

    /// Like [`WorkerPool::execute`], but a raised `interrupt` wakes the
    /// submitter without abandoning the submission.
    ///
    /// # Errors
    /// Same as [`WorkerPool::execute`].
    pub fn execute_interruptible(&self, task: Task, interrupt: &Interrupt) -> Result<()> {
        self.reject_if_shutdown()?;
        let permit = self.gate.acquire_interruptible(interrupt);
        self.admit(task, permit)
    }

    /// Like [`WorkerPool::execute`], giving up if no permit frees up within
    /// `timeout`.
    ///
    /// # Errors
    /// [`Error::Rejected`] with [`RejectReason::QueueFull`] when the wait
    /// elapses, otherwise same as [`WorkerPool::execute`].
    pub fn execute_timeout(&self, task: Task, timeout: Duration) -> Result<()> {
        self.reject_if_shutdown()?;
        let permit = self
            .gate
            .acquire_timeout(timeout)
            .ok_or(Error::Rejected(RejectReason::QueueFull))?;
        self.admit(task, permit)
    }

    /// Like [`WorkerPool::submit`] with an interruptible wait.
    ///
    /// # Errors
    /// Same as [`WorkerPool::execute`].
    pub fn submit_interruptible<F, T>(&self, f: F, interrupt: &Interrupt) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        self.execute_interruptible(task, interrupt)?;
        Ok(handle)
    }

    /// Waiting for a permit on a pool that no longer accepts work would only
    /// end in a rejection.
    fn reject_if_shutdown(&self) -> Result<()> {
        if self.pool.is_shutdown() {
            return Err(Error::Rejected(RejectReason::Shutdown));
        }
        Ok(())
    }

    fn admit(&self, task: Task, permit: Permit) -> Result<()> {
        // On error the pool has dropped the task, and the permit with it.
        self.pool.execute(task.guarded(permit)).inspect_err(|_e| {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                error = %_e,
                available = self.gate.available(),
                "submission refused, permit released"
            );
        })
    }
}

impl BoundedPool<ThreadPool> {
    /// Builds a [`ThreadPool`] from `builder` and bounds it by `budget`.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if `budget` is zero or the pool cannot be
    ///   built
    pub fn build(builder: ThreadPoolBuilder, budget: usize) -> Result<Self> {
        let gate = AdmissionGate::with_budget(budget)?;
        Ok(Self::with_gate(builder.build()?, gate))
    }
}

impl<P> WorkerPool for BoundedPool<P>
where
    P: WorkerPool,
{
    /// Blocks until a permit is available, then hands `task` to the inner
    /// pool.
    fn execute(&self, task: Task) -> Result<()> {
        self.reject_if_shutdown()?;
        let permit = self.gate.acquire();
        self.admit(task, permit)
    }

    fn shutdown(&self) {
        self.pool.shutdown();
    }

    /// Unstarted tasks keep their permits until the caller runs or drops
    /// them.
    fn shutdown_now(&self) -> Vec<Task> {
        self.pool.shutdown_now()
    }

    fn is_shutdown(&self) -> bool {
        self.pool.is_shutdown()
    }

    fn is_terminated(&self) -> bool {
        self.pool.is_terminated()
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        self.pool.await_termination(timeout)
    }

    fn await_termination_until(&self, deadline: Instant) -> bool {
        self.pool.await_termination_until(deadline)
    }
}

impl<P> fmt::Debug for BoundedPool<P>
where
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundedPool")
            .field("pool", &self.pool)
            .field("gate", &self.gate)
            .finish()
    }
}
