//! Bounded admission and striped routing for worker thread pools.
//!
//! - [`AdmissionGate`] caps how many tasks may be in flight against a pool.
//!   Submitters block once the budget is spent, so the queue never grows
//!   past it.
//! - [`StripedExecutor`] owns `N` independent pools and sends every task to
//!   the stripe picked by a [`Router`]. Tasks that share a routing key always
//!   land on the same stripe, in submission order.
//!
//! Both sit on top of the [`WorkerPool`] capability. [`ThreadPool`] is the
//! runtime shipped with this crate.
//!
//! ```
//! use std::time::Duration;
//! use stripepool::{PoolConfig, StripedConfig, StripedExecutor, WorkerPool};
//!
//! let config = StripedConfig {
//!     stripes: 4,
//!     pool: PoolConfig {
//!         core_threads: 1,
//!         max_threads: 1,
//!         queue_capacity: Some(16),
//!         ..PoolConfig::default()
//!     },
//!     ..StripedConfig::default()
//! };
//!
//! let executor = StripedExecutor::bounded(config).unwrap();
//! let handle = executor.submit(|| 6 * 7, 7_u64).unwrap();
//! assert_eq!(handle.join().unwrap(), 42);
//! assert_eq!(executor.stripe_for(7_u64), 3);
//!
//! executor.shutdown();
//! assert!(executor.await_termination(Duration::from_secs(5)));
//! ```
mod error;
mod gate;
mod pool;
mod router;
mod striped;
mod task;

pub use crate::error::*;
pub use crate::gate::*;
pub use crate::pool::*;
pub use crate::router::*;
pub use crate::striped::*;
pub use crate::task::*;
