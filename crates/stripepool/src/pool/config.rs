use core::time::Duration;

use crate::{Error, Result};

/// Prefix used for worker thread names when none is configured.
pub const DEFAULT_NAME_PREFIX: &str = "stripepool";

/// Idle time after which workers above `core_threads` exit.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Sizing and naming of a single [`ThreadPool`].
///
/// [`ThreadPool`]: crate::ThreadPool
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Workers started eagerly and kept alive for the pool's whole life.
    pub core_threads: usize,
    /// Upper bound on live workers. Workers above `core_threads` are only
    /// started when the queue is full.
    pub max_threads: usize,
    /// How long a worker above `core_threads` may sit idle before exiting.
    pub keep_alive: Duration,
    /// Bound of the backing queue. `None` means unbounded.
    pub queue_capacity: Option<usize>,
    /// Worker threads are named `{name_prefix}-{n}`.
    pub name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            core_threads: 1,
            max_threads: 1,
            keep_alive: DEFAULT_KEEP_ALIVE,
            queue_capacity: None,
            name_prefix: String::from(DEFAULT_NAME_PREFIX),
        }
    }
}

impl PoolConfig {
    /// A pool of exactly `threads` workers that never grows or shrinks.
    pub fn fixed(threads: usize) -> Self {
        Self {
            core_threads: threads,
            max_threads: threads,
            ..Self::default()
        }
    }

    /// Checks that the configuration describes a pool that can run tasks.
    ///
    /// # Errors
    /// Returns [`Error::InvalidConfig`] if `max_threads` is zero, is smaller
    /// than `core_threads`, or the name prefix contains a NUL byte.
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 {
            return Err(Error::invalid_config("max_threads must be greater than 0"));
        }
        if self.core_threads > self.max_threads {
            return Err(Error::invalid_config(format!(
                "core_threads ({}) exceeds max_threads ({})",
                self.core_threads, self.max_threads
            )));
        }
        if self.name_prefix.contains('\0') {
            return Err(Error::invalid_config("name_prefix must not contain NUL"));
        }
        Ok(())
    }
}
