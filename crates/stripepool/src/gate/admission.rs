use core::{fmt, num::NonZeroUsize, time::Duration};
use parking_lot::{Condvar, Mutex};
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{Error, Result, pool::deadline_after};

struct GateInner {
    budget: usize,
    #[cfg(feature = "cache-padded")]
    available: crossbeam_utils::CachePadded<AtomicUsize>,
    #[cfg(not(feature = "cache-padded"))]
    available: AtomicUsize,
    /// Only held by threads about to sleep and by releasers about to wake
    /// them, never on the fast path.
    sleepers: Mutex<()>,
    wakeup: Condvar,
}

impl GateInner {
    /// Takes one permit if any is left.
    fn try_take(&self) -> bool {
        let mut current = self.available.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return false;
            }
            match self.available.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn release(&self) {
        let _available = self.available.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(_available <= self.budget, "permit released twice");

        let _sleepers = self.sleepers.lock();
        self.wakeup.notify_one();

        #[cfg(feature = "tracing")]
        tracing::debug!(available = _available, "permit released");
    }
}

/// A counting admission gate that caps how many tasks are in flight.
///
/// Every admitted task holds one [`Permit`] from the moment it is accepted
/// until it finishes. When the budget is spent, [`Self::acquire`] blocks the
/// submitting thread: backpressure, never queueing or dropping.
///
/// ## Features
/// - ✅ Lock-free fast path (compare-and-swap on the permit count)
/// - ✅ Sleeping waiters, woken one per released permit
/// - ✅ Interruptible waits that retry and re-assert the interrupt
///
/// ## Invariants
/// - `0 <= outstanding() <= budget()` at all times
/// - `outstanding() == 0` once every permit has been dropped
///
/// Clones share the same budget.
///
/// ```
/// use stripepool::AdmissionGate;
///
/// let gate = AdmissionGate::with_budget(2).unwrap();
/// let first = gate.acquire();
/// let _second = gate.acquire();
/// assert!(gate.try_acquire().is_none());
///
/// drop(first);
/// assert_eq!(gate.available(), 1);
/// ```
#[derive(Clone)]
pub struct AdmissionGate {
    inner: Arc<GateInner>,
}

impl AdmissionGate {
    /// Creates a gate with `budget` permits.
    pub fn new(budget: NonZeroUsize) -> Self {
        let budget = budget.get();
        Self {
            inner: Arc::new(GateInner {
                budget,
                #[cfg(feature = "cache-padded")]
                available: crossbeam_utils::CachePadded::new(AtomicUsize::new(budget)),
                #[cfg(not(feature = "cache-padded"))]
                available: AtomicUsize::new(budget),
                sleepers: Mutex::new(()),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Creates a gate with `budget` permits.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `budget` is zero.
    pub fn with_budget(budget: usize) -> Result<Self> {
        NonZeroUsize::new(budget)
            .map(Self::new)
            .ok_or_else(|| Error::invalid_config("admission budget must be greater than 0"))
    }

    pub fn budget(&self) -> usize {
        self.inner.budget
    }

    /// Permits not currently held.
    pub fn available(&self) -> usize {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Permits currently held: acquired minus released.
    pub fn outstanding(&self) -> usize {
        self.inner.budget - self.available()
    }

    /// Takes a permit without blocking.
    pub fn try_acquire(&self) -> Option<Permit> {
        self.inner.try_take().then(|| self.permit())
    }

    /// Blocks until a permit is available.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn acquire(&self) -> Permit {
        if let Some(permit) = self.try_acquire() {
            return permit;
        }

        let mut sleepers = self.inner.sleepers.lock();
        loop {
            if self.inner.try_take() {
                return self.permit();
            }
            self.inner.wakeup.wait(&mut sleepers);
        }
    }

    /// Blocks for at most `timeout`. Returns `None` if no permit freed up.
    pub fn acquire_timeout(&self, timeout: Duration) -> Option<Permit> {
        if let Some(permit) = self.try_acquire() {
            return Some(permit);
        }

        let deadline = deadline_after(timeout);
        let mut sleepers = self.inner.sleepers.lock();
        loop {
            if self.inner.try_take() {
                return Some(self.permit());
            }
            if self
                .inner
                .wakeup
                .wait_until(&mut sleepers, deadline)
                .timed_out()
            {
                return self.inner.try_take().then(|| self.permit());
            }
        }
    }

    /// Blocks until a permit is available, surviving interrupts.
    ///
    /// Raising `interrupt` while this call sleeps wakes it. The wait is not
    /// abandoned: the interrupt is recorded and the call keeps waiting. Once a
    /// permit is obtained the interrupt is raised again, so the caller still
    /// observes it.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip_all))]
    pub fn acquire_interruptible(&self, interrupt: &Interrupt) -> Permit {
        let _registration = interrupt.register(&self.inner);
        let mut interrupted = false;

        let mut sleepers = self.inner.sleepers.lock();
        let permit = loop {
            if self.inner.try_take() {
                break self.permit();
            }
            if interrupt.take() {
                interrupted = true;
                #[cfg(feature = "tracing")]
                tracing::warn!("interrupted while waiting for an admission permit, retrying");
                continue;
            }
            self.inner.wakeup.wait(&mut sleepers);
        };
        drop(sleepers);

        if interrupted {
            interrupt.flag.raised.store(true, Ordering::Release);
        }
        permit
    }

    fn permit(&self) -> Permit {
        Permit {
            gate: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("budget", &self.budget())
            .field("available", &self.available())
            .finish()
    }
}

/// One unit of an [`AdmissionGate`]'s budget.
///
/// Dropping the permit returns it to the gate. That is the only release
/// path, so each permit is released exactly once, whether the task holding
/// it returned, panicked, or never ran.
#[must_use = "dropping a permit releases it immediately"]
pub struct Permit {
    gate: Arc<GateInner>,
}

impl Permit {
    /// Returns the permit to its gate. Same as dropping it.
    pub fn release(self) {}
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.release();
    }
}

impl fmt::Debug for Permit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permit")
            .field("budget", &self.gate.budget)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct InterruptFlag {
    raised: AtomicBool,
    /// Gate the owning thread is currently sleeping on, if any.
    waiting_on: Mutex<Option<Weak<GateInner>>>,
}

/// A flag one thread raises to wake another blocked in
/// [`AdmissionGate::acquire_interruptible`].
///
/// Clones share the same flag.
#[derive(Clone, Default)]
pub struct Interrupt {
    flag: Arc<InterruptFlag>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag and wakes the gate the owner is sleeping on.
    pub fn raise(&self) {
        self.flag.raised.store(true, Ordering::Release);
        let waiting_on = self.flag.waiting_on.lock().as_ref().and_then(Weak::upgrade);
        if let Some(gate) = waiting_on {
            let _sleepers = gate.sleepers.lock();
            gate.wakeup.notify_all();
        }
    }

    pub fn is_raised(&self) -> bool {
        self.flag.raised.load(Ordering::Acquire)
    }

    /// Clears the flag, returning whether it was raised.
    pub fn take(&self) -> bool {
        self.flag.raised.swap(false, Ordering::AcqRel)
    }

    fn register(&self, gate: &Arc<GateInner>) -> Registration<'_> {
        *self.flag.waiting_on.lock() = Some(Arc::downgrade(gate));
        Registration { interrupt: self }
    }
}

impl fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interrupt")
            .field("raised", &self.is_raised())
            .finish()
    }
}

struct Registration<'a> {
    interrupt: &'a Interrupt,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        *self.interrupt.flag.waiting_on.lock() = None;
    }
}
