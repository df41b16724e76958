use core::num::NonZeroUsize;

use crate::{Error, PoolConfig, Result};

/// Shape of a bounded [`StripedExecutor`].
///
/// Every stripe gets its own [`ThreadPool`] built from `pool`, named
/// `{pool.name_prefix}-{stripe}`, and its own admission budget.
///
/// [`StripedExecutor`]: crate::StripedExecutor
/// [`ThreadPool`]: crate::ThreadPool
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StripedConfig {
    /// Number of independent pools.
    pub stripes: usize,
    /// Configuration applied to every stripe's pool.
    pub pool: PoolConfig,
    /// Permits per stripe. Falls back to `pool.queue_capacity`.
    pub admission_budget: Option<usize>,
}

impl Default for StripedConfig {
    fn default() -> Self {
        Self {
            stripes: 1,
            pool: PoolConfig::default(),
            admission_budget: None,
        }
    }
}

impl StripedConfig {
    /// The admission budget each stripe will use.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if neither `admission_budget` nor
    /// `pool.queue_capacity` is set, or the resolved budget is zero.
    pub fn effective_budget(&self) -> Result<NonZeroUsize> {
        let budget = self.admission_budget.or(self.pool.queue_capacity).ok_or_else(|| {
            Error::invalid_config("admission budget requires admission_budget or queue_capacity")
        })?;
        NonZeroUsize::new(budget)
            .ok_or_else(|| Error::invalid_config("admission budget must be greater than 0"))
    }

    pub(crate) fn stripe_count(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.stripes)
            .ok_or_else(|| Error::invalid_config("stripes must be greater than 0"))
    }

    /// # Errors
    /// [`Error::InvalidConfig`] if there are no stripes, the budget cannot be
    /// resolved, or `pool` is invalid.
    pub fn validate(&self) -> Result<()> {
        self.stripe_count()?;
        self.effective_budget()?;
        self.pool.validate()
    }
}
