//! Fixed-size worker thread pool backed by a crossbeam channel.
//!
//! Workers pull [`Task`]s from one shared queue. `core_threads` workers are
//! started eagerly and live until shutdown; when the queue is full the pool
//! grows up to `max_threads`, and those extra workers exit after
//! `keep_alive` of idleness.
//!
//! Shutdown is signalled by dropping the sending half of a dedicated stop
//! channel. Every worker has it in its `select!`, so a disconnect wakes all of
//! them at once:
//!
//! - graceful shutdown: workers drain the queue, then exit
//! - `shutdown_now`: the caller drains the queue, workers exit as soon as
//!   their current task returns

use core::{fmt, time::Duration};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, select, unbounded};
use parking_lot::{Condvar, Mutex, RwLock};
use portable_atomic::{AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crate::{
    Error, FaultHandler, LogFaultHandler, PoolConfig, RejectReason, Result, Task, WorkerPool,
    pool::{Fault, deadline_after},
    task::panic_message,
};

const RUNNING: u8 = 0;
const SHUTDOWN: u8 = 1;
const STOP: u8 = 2;

/// Builder for a [`ThreadPool`].
///
/// ```
/// use std::time::Duration;
/// use stripepool::{ThreadPool, WorkerPool};
///
/// let pool = ThreadPool::builder()
///     .core_threads(2)
///     .max_threads(4)
///     .queue_capacity(64)
///     .keep_alive(Duration::from_secs(5))
///     .name_prefix("ingest")
///     .build()
///     .unwrap();
///
/// let name = pool
///     .submit(|| std::thread::current().name().map(str::to_owned))
///     .unwrap()
///     .join()
///     .unwrap();
/// assert!(name.unwrap().starts_with("ingest-"));
/// ```
#[derive(Default)]
pub struct ThreadPoolBuilder {
    config: PoolConfig,
    fault_handler: Option<Arc<dyn FaultHandler>>,
}

impl ThreadPoolBuilder {
    /// Replaces every sizing option with `config`.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn core_threads(mut self, threads: usize) -> Self {
        self.config.core_threads = threads;
        self
    }

    pub fn max_threads(mut self, threads: usize) -> Self {
        self.config.max_threads = threads;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.config.keep_alive = keep_alive;
        self
    }

    /// Bounds the backing queue. Pools are unbounded unless this is set.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = Some(capacity);
        self
    }

    pub fn name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.name_prefix = prefix.into();
        self
    }

    /// Installs the handler invoked when a task panics. Defaults to
    /// [`LogFaultHandler`].
    pub fn fault_handler(mut self, handler: impl FaultHandler) -> Self {
        self.fault_handler = Some(Arc::new(handler));
        self
    }

    /// Same as [`Self::fault_handler`] for a handler shared across pools.
    pub fn shared_fault_handler(mut self, handler: Arc<dyn FaultHandler>) -> Self {
        self.fault_handler = Some(handler);
        self
    }

    /// Validates the configuration and starts the core workers.
    ///
    /// # Errors
    /// - [`Error::InvalidConfig`] if the configuration is inconsistent or a
    ///   core worker thread could not be spawned
    pub fn build(self) -> Result<ThreadPool> {
        self.config.validate()?;
        let PoolConfig {
            core_threads,
            max_threads,
            keep_alive,
            queue_capacity,
            name_prefix,
        } = self.config;

        let (queue_tx, queue_rx) = match queue_capacity {
            Some(capacity) => bounded(capacity),
            None => unbounded(),
        };
        let (stop_tx, stop_rx) = bounded(0);

        let shared = Arc::new(Shared {
            core_threads,
            max_threads,
            keep_alive,
            name_prefix,
            fault_handler: self
                .fault_handler
                .unwrap_or_else(|| Arc::new(LogFaultHandler)),
            queue: queue_rx,
            stop: stop_rx,
            state: AtomicU8::new(RUNNING),
            live: Mutex::new(0),
            terminated: Condvar::new(),
            next_thread: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
        });

        let pool = ThreadPool {
            shared,
            queue: queue_tx,
            accepting: RwLock::new(Some(stop_tx)),
        };

        for _ in 0..core_threads {
            if !pool.add_worker(None, true) {
                pool.shutdown();
                return Err(Error::invalid_config(format!(
                    "failed to spawn core worker for pool {}",
                    pool.shared.name_prefix
                )));
            }
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            pool = %pool.shared.name_prefix,
            core_threads,
            max_threads,
            keep_alive = ?keep_alive,
            queue_capacity = ?queue_capacity,
            "thread pool started"
        );

        Ok(pool)
    }
}

impl fmt::Debug for ThreadPoolBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolBuilder")
            .field("config", &self.config)
            .field("custom_fault_handler", &self.fault_handler.is_some())
            .finish()
    }
}

/// State shared by the pool handle and its workers.
struct Shared {
    core_threads: usize,
    max_threads: usize,
    keep_alive: Duration,
    name_prefix: String,
    fault_handler: Arc<dyn FaultHandler>,
    queue: Receiver<Task>,
    /// Never receives a message; disconnects when the pool stops accepting.
    stop: Receiver<()>,
    state: AtomicU8,
    live: Mutex<usize>,
    terminated: Condvar,
    next_thread: AtomicUsize,
    completed: AtomicU64,
}

impl Shared {
    fn state(&self) -> u8 {
        self.state.load(Ordering::Acquire)
    }

    /// Removes one worker from the live count, waking terminators when it
    /// was the last one.
    fn deregister(&self) {
        let mut live = self.live.lock();
        *live -= 1;
        if *live == 0 {
            self.terminated.notify_all();
        }
    }
}

/// A pool of OS threads executing [`Task`]s from one FIFO queue.
///
/// ## Features
/// - ✅ Bounded or unbounded queue
/// - ✅ Grows from `core_threads` to `max_threads` under a full queue
/// - ✅ Task panics are caught and reported; the worker survives
/// - ❌ Running tasks are never interrupted
///
/// Dropping the pool starts a graceful shutdown without waiting for it.
pub struct ThreadPool {
    shared: Arc<Shared>,
    queue: Sender<Task>,
    /// `Some` while accepting. Submitters hold the read lock across the
    /// enqueue so no task can slip in after the state flips.
    accepting: RwLock<Option<Sender<()>>>,
}

impl ThreadPool {
    /// Builds a pool from `config` with the default fault handler.
    ///
    /// # Errors
    /// See [`ThreadPoolBuilder::build`].
    pub fn new(config: PoolConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::default()
    }

    /// Number of worker threads currently alive.
    pub fn active_threads(&self) -> usize {
        *self.shared.live.lock()
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.queue.len()
    }

    /// Number of tasks that finished running, including ones that panicked.
    pub fn completed_tasks(&self) -> u64 {
        self.shared.completed.load(Ordering::Relaxed)
    }

    pub fn name_prefix(&self) -> &str {
        &self.shared.name_prefix
    }

    /// Starts a worker if the pool is below its limit. `first` runs before
    /// the worker touches the queue; it is dropped if no worker starts.
    fn add_worker(&self, first: Option<Task>, core: bool) -> bool {
        let limit = if core {
            self.shared.core_threads
        } else {
            self.shared.max_threads
        };

        {
            let mut live = self.shared.live.lock();
            if *live >= limit {
                return false;
            }
            *live += 1;
        }

        let id = self.shared.next_thread.fetch_add(1, Ordering::Relaxed);
        let name = format!("{}-{id}", self.shared.name_prefix);
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            name: name.clone(),
            first,
            core,
            registered: true,
        };

        match thread::Builder::new().name(name).spawn(move || worker.run()) {
            Ok(_) => true,
            Err(_e) => {
                // The closure, and the worker inside it, was dropped, which
                // already deregistered the worker.
                #[cfg(feature = "tracing")]
                tracing::error!(pool = %self.shared.name_prefix, "failed to spawn worker: {_e}");
                false
            }
        }
    }

    /// Makes sure somebody will pick up an enqueued task when no worker is
    /// alive, e.g. `core_threads == 0` or every extra worker just retired.
    fn ensure_worker(&self) {
        if self.active_threads() == 0 {
            self.add_worker(None, false);
        }
    }

    fn close(&self, state: u8) {
        let mut accepting = self.accepting.write();
        self.shared.state.fetch_max(state, Ordering::AcqRel);
        if accepting.take().is_some() {
            #[cfg(feature = "tracing")]
            tracing::debug!(pool = %self.shared.name_prefix, "thread pool shutting down");
        }
        // Wake terminators in case no worker was alive to do it.
        let _live = self.shared.live.lock();
        self.shared.terminated.notify_all();
    }
}

impl WorkerPool for ThreadPool {
    fn execute(&self, task: Task) -> Result<()> {
        let accepting = self.accepting.read();
        if accepting.is_none() {
            return Err(Error::Rejected(RejectReason::Shutdown));
        }

        match self.queue.try_send(task) {
            Ok(()) => {
                self.ensure_worker();
                Ok(())
            }
            Err(TrySendError::Full(task)) => {
                if self.add_worker(Some(task), false) {
                    return Ok(());
                }
                #[cfg(feature = "tracing")]
                tracing::debug!(pool = %self.shared.name_prefix, "queue full, task rejected");
                Err(Error::Rejected(RejectReason::QueueFull))
            }
            Err(TrySendError::Disconnected(_)) => Err(Error::Rejected(RejectReason::Shutdown)),
        }
    }

    fn shutdown(&self) {
        self.close(SHUTDOWN);
    }

    fn shutdown_now(&self) -> Vec<Task> {
        self.close(STOP);
        let drained: Vec<Task> = self.shared.queue.try_iter().collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            pool = %self.shared.name_prefix,
            drained = drained.len(),
            "thread pool stopped"
        );

        drained
    }

    fn is_shutdown(&self) -> bool {
        self.shared.state() != RUNNING
    }

    fn is_terminated(&self) -> bool {
        self.is_shutdown() && self.active_threads() == 0
    }

    fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = deadline_after(timeout);
        let mut live = self.shared.live.lock();
        loop {
            if self.shared.state() != RUNNING && *live == 0 {
                return true;
            }
            if self
                .shared
                .terminated
                .wait_until(&mut live, deadline)
                .timed_out()
            {
                return self.shared.state() != RUNNING && *live == 0;
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name_prefix", &self.shared.name_prefix)
            .field("core_threads", &self.shared.core_threads)
            .field("max_threads", &self.shared.max_threads)
            .field("active_threads", &self.active_threads())
            .field("queued", &self.queued())
            .field("state", &self.shared.state())
            .finish()
    }
}

enum Next {
    Run(Task),
    Drain,
    Idle,
}

struct Worker {
    shared: Arc<Shared>,
    name: String,
    first: Option<Task>,
    core: bool,
    registered: bool,
}

impl Worker {
    fn run(mut self) {
        if let Some(task) = self.first.take() {
            self.run_task(task);
        }

        loop {
            let next = if self.core {
                select! {
                    recv(self.shared.queue) -> task => task.map_or(Next::Drain, Next::Run),
                    recv(self.shared.stop) -> _ => Next::Drain,
                }
            } else {
                select! {
                    recv(self.shared.queue) -> task => task.map_or(Next::Drain, Next::Run),
                    recv(self.shared.stop) -> _ => Next::Drain,
                    default(self.shared.keep_alive) => Next::Idle,
                }
            };

            match next {
                Next::Run(task) => {
                    if self.shared.state() == STOP {
                        // Raced with shutdown_now; the task had already left
                        // the queue, so it counts as started.
                        self.run_task(task);
                        break;
                    }
                    self.run_task(task);
                }
                Next::Drain => {
                    self.drain();
                    break;
                }
                Next::Idle => {
                    if self.retire() {
                        break;
                    }
                }
            }
        }
    }

    fn drain(&self) {
        while self.shared.state() == SHUTDOWN {
            match self.shared.queue.try_recv() {
                Ok(task) => self.run_task(task),
                Err(_) => break,
            }
        }
    }

    /// Called after `keep_alive` of idleness. Returns `true` if this worker
    /// should exit.
    fn retire(&mut self) -> bool {
        {
            let mut live = self.shared.live.lock();
            if *live <= self.shared.core_threads {
                return false;
            }
            *live -= 1;
        }
        self.registered = false;

        // A submitter may have enqueued after our timeout while still seeing
        // us alive. Take the work back instead of stranding it.
        if !self.shared.queue.is_empty() && self.shared.state() != STOP {
            *self.shared.live.lock() += 1;
            self.registered = true;
            return false;
        }

        let live = self.shared.live.lock();
        if *live == 0 {
            self.shared.terminated.notify_all();
        }
        true
    }

    fn run_task(&self, task: Task) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            let fault = Fault::new(panic_message(payload.as_ref()));
            self.shared.fault_handler.on_fault(&self.name, &fault);
        }
        self.shared.completed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if self.registered {
            self.shared.deregister();
        }
        #[cfg(feature = "tracing")]
        tracing::trace!(thread = %self.name, "worker exited");
    }
}
