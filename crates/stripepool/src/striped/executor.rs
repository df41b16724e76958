use core::{fmt, time::Duration};
use std::{sync::Arc, time::Instant};

use crate::{
    BoundedPool, Error, FaultHandler, KeyRouter, Result, RoundRobinRouter, Router, RoutingKey,
    StripedConfig, Task, TaskHandle, ThreadPool, WorkerPool, pool::deadline_after,
};

const UNKEYED: &str = "key-less submission requires a round-robin router";

/// A fixed array of independent worker pools with a router in front.
///
/// Every task is sent to exactly one pool, the one the [`Router`] picks.
/// With a [`KeyRouter`] all tasks sharing a key enter the same pool's queue
/// in submission order; with a [`RoundRobinRouter`] tasks are spread evenly
/// and no key is needed.
///
/// Lifecycle calls fan out to every pool. The executor is shut down or
/// terminated only when every pool is.
///
/// ## Features
/// - ✅ Per-key FIFO with [`KeyRouter`]
/// - ✅ Isolation: a hot key only ever saturates its own stripe
/// - ✅ Admission control per stripe when built with [`Self::bounded`]
/// - ❌ Ordering across stripes or across keys
///
/// ## See Also
/// - [`StripedBuilder`]
/// - [`BoundedPool`]
pub struct StripedExecutor<P = BoundedPool, R = KeyRouter> {
    pools: Box<[P]>,
    router: R,
}

impl<P, R> StripedExecutor<P, R>
where
    P: WorkerPool,
    R: Router,
{
    /// Wraps `pools` behind `router`.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `pools` is empty or its length differs
    /// from `router.stripes()`.
    pub fn new(pools: Vec<P>, router: R) -> Result<Self> {
        if pools.is_empty() {
            return Err(Error::invalid_config("striped executor needs at least one pool"));
        }
        if pools.len() != router.stripes() {
            return Err(Error::invalid_config(format!(
                "router distributes over {} stripes but {} pools were given",
                router.stripes(),
                pools.len()
            )));
        }
        Ok(Self {
            pools: pools.into_boxed_slice(),
            router,
        })
    }

    pub fn stripes(&self) -> usize {
        self.pools.len()
    }

    pub fn router(&self) -> &R {
        &self.router
    }

    pub fn pools(&self) -> &[P] {
        &self.pools
    }

    pub fn pool(&self, index: usize) -> Option<&P> {
        self.pools.get(index)
    }

    /// Index of the stripe `key` routes to.
    ///
    /// Pure for a [`KeyRouter`]. For a [`RoundRobinRouter`] this advances the
    /// cursor like a submission would.
    pub fn stripe_for(&self, key: impl RoutingKey) -> usize {
        self.router.route(key.routing_key())
    }

    pub fn pool_for(&self, key: impl RoutingKey) -> &P {
        &self.pools[self.stripe_for(key)]
    }

    /// The pool the next key-less submission would use, or `None` if the
    /// router requires keys.
    pub fn next_pool(&self) -> Option<&P> {
        self.router.route_unkeyed().map(|index| &self.pools[index])
    }

    /// Routes `task` by `key` and hands it to that stripe's pool.
    ///
    /// # Errors
    /// Whatever the chosen pool returns, unchanged.
    pub fn execute(&self, task: Task, key: impl RoutingKey) -> Result<()> {
        let stripe = self.stripe_for(key);
        #[cfg(feature = "tracing")]
        tracing::trace!(stripe, "routing task");
        self.pools[stripe].execute(task)
    }

    /// Runs `f` on the stripe `key` routes to.
    ///
    /// # Errors
    /// Same as [`Self::execute`].
    pub fn submit<F, T>(&self, f: F, key: impl RoutingKey) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        self.execute(task, key)?;
        Ok(handle)
    }

    /// Hands `task` to the next stripe of a key-less router.
    ///
    /// # Errors
    /// - [`Error::Unsupported`] if the router requires a key
    /// - whatever the chosen pool returns
    pub fn execute_unkeyed(&self, task: Task) -> Result<()> {
        let stripe = self
            .router
            .route_unkeyed()
            .ok_or(Error::Unsupported(UNKEYED))?;
        #[cfg(feature = "tracing")]
        tracing::trace!(stripe, "routing key-less task");
        self.pools[stripe].execute(task)
    }

    /// # Errors
    /// Same as [`Self::execute_unkeyed`].
    pub fn submit_unkeyed<F, T>(&self, f: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (task, handle) = Task::with_handle(f);
        self.execute_unkeyed(task)?;
        Ok(handle)
    }
}

impl<P> StripedExecutor<P, KeyRouter>
where
    P: WorkerPool,
{
    /// Routes deterministically by key over `pools`.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `pools` is empty.
    pub fn key_routed(pools: Vec<P>) -> Result<Self> {
        let router = KeyRouter::new(non_empty(&pools)?);
        Self::new(pools, router)
    }
}

impl<P> StripedExecutor<P, RoundRobinRouter>
where
    P: WorkerPool,
{
    /// Spreads tasks over `pools` in turn, ignoring keys.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `pools` is empty.
    pub fn round_robin(pools: Vec<P>) -> Result<Self> {
        let router = RoundRobinRouter::new(non_empty(&pools)?);
        Self::new(pools, router)
    }
}

impl StripedExecutor<BoundedPool, KeyRouter> {
    /// Builds `config.stripes` bounded thread pools routed by key.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `config` is invalid.
    pub fn bounded(config: StripedConfig) -> Result<Self> {
        StripedBuilder::new(config).key_routed()
    }
}

impl StripedExecutor<BoundedPool, RoundRobinRouter> {
    /// Builds `config.stripes` bounded thread pools served in turn.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if `config` is invalid.
    pub fn bounded_round_robin(config: StripedConfig) -> Result<Self> {
        StripedBuilder::new(config).round_robin()
    }
}

fn non_empty<P>(pools: &[P]) -> Result<core::num::NonZeroUsize> {
    core::num::NonZeroUsize::new(pools.len())
        .ok_or_else(|| Error::invalid_config("striped executor needs at least one pool"))
}

impl<P, R> WorkerPool for StripedExecutor<P, R>
where
    P: WorkerPool,
    R: Router,
{
    /// Key-less execution; see [`Self::execute_unkeyed`].
    fn execute(&self, task: Task) -> Result<()> {
        self.execute_unkeyed(task)
    }

    fn shutdown(&self) {
        #[cfg(feature = "tracing")]
        tracing::debug!(stripes = self.stripes(), "striped executor shutting down");
        for pool in self.pools.iter() {
            pool.shutdown();
        }
    }

    /// Unstarted tasks of every stripe, stripe 0 first.
    fn shutdown_now(&self) -> Vec<Task> {
        let drained: Vec<Task> = self
            .pools
            .iter()
            .flat_map(|pool| pool.shutdown_now())
            .collect();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            stripes = self.stripes(),
            drained = drained.len(),
            "striped executor stopped"
        );

        drained
    }

    fn is_shutdown(&self) -> bool {
        self.pools.iter().all(WorkerPool::is_shutdown)
    }

    fn is_terminated(&self) -> bool {
        self.pools.iter().all(WorkerPool::is_terminated)
    }

    /// Waits for the pools in order against one deadline, so the whole call
    /// takes at most `timeout`.
    fn await_termination(&self, timeout: Duration) -> bool {
        self.await_termination_until(deadline_after(timeout))
    }

    fn await_termination_until(&self, deadline: Instant) -> bool {
        self.pools
            .iter()
            .all(|pool| pool.await_termination_until(deadline))
    }
}

impl<P, R> fmt::Debug for StripedExecutor<P, R>
where
    P: fmt::Debug,
    R: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripedExecutor")
            .field("router", &self.router)
            .field("pools", &self.pools)
            .finish()
    }
}

/// Builds a [`StripedExecutor`] of bounded thread pools from a
/// [`StripedConfig`].
///
/// ```
/// use stripepool::{Fault, PoolConfig, StripedBuilder, StripedConfig};
///
/// let config = StripedConfig {
///     stripes: 2,
///     pool: PoolConfig {
///         queue_capacity: Some(8),
///         name_prefix: "report".into(),
///         ..PoolConfig::default()
///     },
///     ..StripedConfig::default()
/// };
///
/// let executor = StripedBuilder::new(config)
///     .fault_handler(|thread: &str, fault: &Fault| eprintln!("{thread}: {fault}"))
///     .round_robin()
///     .unwrap();
/// assert_eq!(executor.stripes(), 2);
/// ```
pub struct StripedBuilder {
    config: StripedConfig,
    fault_handler: Option<Arc<dyn FaultHandler>>,
}

impl StripedBuilder {
    pub fn new(config: StripedConfig) -> Self {
        Self {
            config,
            fault_handler: None,
        }
    }

    /// Installs one handler shared by every stripe's pool.
    pub fn fault_handler(self, handler: impl FaultHandler) -> Self {
        self.shared_fault_handler(Arc::new(handler))
    }

    pub fn shared_fault_handler(mut self, handler: Arc<dyn FaultHandler>) -> Self {
        self.fault_handler = Some(handler);
        self
    }

    /// # Errors
    /// [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn key_routed(self) -> Result<StripedExecutor<BoundedPool, KeyRouter>> {
        let router = KeyRouter::new(self.config.stripe_count()?);
        self.with_router(router)
    }

    /// # Errors
    /// [`Error::InvalidConfig`] if the configuration is invalid.
    pub fn round_robin(self) -> Result<StripedExecutor<BoundedPool, RoundRobinRouter>> {
        let router = RoundRobinRouter::new(self.config.stripe_count()?);
        self.with_router(router)
    }

    /// # Errors
    /// [`Error::InvalidConfig`] if the configuration is invalid or `router`
    /// does not cover exactly `config.stripes` stripes.
    pub fn with_router<R>(self, router: R) -> Result<StripedExecutor<BoundedPool, R>>
    where
        R: Router,
    {
        self.config.validate()?;
        let budget = self.config.effective_budget()?;
        let StripedConfig { stripes, pool, .. } = self.config;

        let mut pools = Vec::with_capacity(stripes);
        for stripe in 0..stripes {
            let mut builder = ThreadPool::builder().config(pool.clone()).name_prefix(format!(
                "{}-{stripe}",
                pool.name_prefix
            ));
            if let Some(handler) = &self.fault_handler {
                builder = builder.shared_fault_handler(Arc::clone(handler));
            }
            // Pools built so far shut down when `pools` drops on error.
            pools.push(BoundedPool::new(builder.build()?, budget));
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            stripes,
            budget = budget.get(),
            prefix = %pool.name_prefix,
            "striped executor started"
        );

        StripedExecutor::new(pools, router)
    }
}

impl fmt::Debug for StripedBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StripedBuilder")
            .field("config", &self.config)
            .field("custom_fault_handler", &self.fault_handler.is_some())
            .finish()
    }
}
