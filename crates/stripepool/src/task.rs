use core::{any::Any, fmt, time::Duration};
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, bounded};
use std::panic::{self, AssertUnwindSafe};

/// An opaque unit of work accepted by a [`WorkerPool`].
///
/// Tasks handed back by [`WorkerPool::shutdown_now`] can be run later with
/// [`Task::run`] or simply dropped. Dropping an unstarted task releases
/// anything it owns, including admission permits.
///
/// [`WorkerPool`]: crate::WorkerPool
/// [`WorkerPool::shutdown_now`]: crate::WorkerPool::shutdown_now
pub struct Task {
    job: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    /// Wraps a closure as a task.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self { job: Box::new(f) }
    }

    /// Wraps a value-producing closure and returns the task together with the
    /// handle that will receive its outcome.
    ///
    /// A panic inside `f` is delivered to the handle as
    /// [`TaskError::Panicked`]. If the handle has already been dropped there is
    /// nobody to deliver it to, so the panic resumes and reaches the pool's
    /// fault handler instead.
    pub fn with_handle<F, T>(f: F) -> (Self, TaskHandle<T>)
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let task = Self::new(move || match panic::catch_unwind(AssertUnwindSafe(f)) {
            Ok(value) => {
                let _ = tx.send(Ok(value));
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                if tx.send(Err(TaskError::Panicked(message))).is_err() {
                    panic::resume_unwind(payload);
                }
            }
        });
        (task, TaskHandle { rx })
    }

    /// Runs the task on the current thread.
    pub fn run(self) {
        (self.job)()
    }

    /// Returns a task that keeps `guard` alive until `self` has finished
    /// running, or until the task is dropped without running.
    pub(crate) fn guarded<G>(self, guard: G) -> Self
    where
        G: Send + 'static,
    {
        Self::new(move || {
            let _guard = guard;
            self.run();
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

/// Why a [`TaskHandle`] did not yield a value.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// The task panicked; carries the panic message.
    #[error("task panicked: {0}")]
    Panicked(String),

    /// The task was dropped before it ran, e.g. it was drained by
    /// `shutdown_now`, or its result was already taken.
    #[error("task was cancelled before completing")]
    Cancelled,

    /// The wait elapsed before the task completed.
    #[error("timed out waiting for task")]
    Timeout,
}

/// Receives the outcome of a task created with [`Task::with_handle`].
///
/// A handle yields its value once. Calls made after the value has been taken
/// report [`TaskError::Cancelled`].
#[must_use = "dropping the handle discards the task's result"]
pub struct TaskHandle<T> {
    rx: Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task completes.
    ///
    /// # Errors
    /// - [`TaskError::Panicked`] if the task panicked
    /// - [`TaskError::Cancelled`] if the task was dropped without running
    pub fn join(self) -> Result<T, TaskError> {
        self.rx.recv().unwrap_or(Err(TaskError::Cancelled))
    }

    /// Blocks for at most `timeout`.
    ///
    /// # Errors
    /// As [`Self::join`], plus [`TaskError::Timeout`] when the wait elapses.
    pub fn join_timeout(&self, timeout: Duration) -> Result<T, TaskError> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => Err(TaskError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TaskError::Cancelled),
        }
    }

    /// Returns the outcome if the task has already completed.
    pub fn try_join(&self) -> Option<Result<T, TaskError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(TaskError::Cancelled)),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("ready", &!self.rx.is_empty())
            .finish()
    }
}

/// Extracts a printable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("Box<dyn Any>")
    }
}
