//! Error types shared by every pool, gate and executor in this crate.
//!
//! - `Rejected`: a pool refused a task because its queue is full or it is
//!   shutting down. Any admission permit taken for the task has already been
//!   returned by the time the caller sees this.
//! - `Unsupported`: a key-less submission reached an executor whose routing
//!   strategy requires a key.
//! - `InvalidConfig`: construction parameters that cannot describe a working
//!   pool.

use core::fmt;

/// A result type defaulting to this crate's [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Why a pool refused a task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RejectReason {
    /// The backing queue is full and no further worker may be started.
    QueueFull,
    /// The pool no longer accepts work.
    Shutdown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::QueueFull => f.write_str("queue is full"),
            Self::Shutdown => f.write_str("pool is shut down"),
        }
    }
}

/// All error variants that `stripepool` can emit.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The target pool refused the task.
    #[error("task rejected: {0}")]
    Rejected(RejectReason),

    /// The operation is not available for this routing strategy.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// Construction parameters are inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if a pool refused the task.
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }
}

impl From<RejectReason> for Error {
    fn from(reason: RejectReason) -> Self {
        Self::Rejected(reason)
    }
}
