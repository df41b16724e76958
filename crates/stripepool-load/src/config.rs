use anyhow::bail;
use clap::{Parser, ValueEnum};
use std::time::Duration;
use stripepool::{PoolConfig, StripedConfig};

/// How tasks are spread over stripes.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routing {
    /// `key mod stripes`; same key, same stripe.
    Key,
    /// Every task goes to the next stripe in turn.
    RoundRobin,
}

/// Runtime configuration for the `stripepool-load` binary.
///
/// Every value can come from a CLI flag or an environment variable (a `.env`
/// file in the working directory is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "stripepool-load",
    version,
    about = "Drives keyed work through a bounded striped executor"
)]
pub struct CliArgs {
    /// Number of independent pools.
    ///
    /// Environment variable: `STRIPES`
    #[arg(long, env = "STRIPES", default_value_t = 4)]
    pub stripes: usize,

    /// Worker threads per stripe. `0` splits the available CPUs evenly
    /// across stripes (at least one each).
    ///
    /// Each stripe runs exactly this many workers, so per-key completion
    /// order is only guaranteed with `1`.
    ///
    /// Environment variable: `THREADS_PER_STRIPE`
    #[arg(long, env = "THREADS_PER_STRIPE", default_value_t = 1)]
    pub threads_per_stripe: usize,

    /// Bound of each stripe's queue.
    ///
    /// Environment variable: `QUEUE_CAPACITY`
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = 64)]
    pub queue_capacity: usize,

    /// Tasks each stripe may have in flight. Defaults to the queue capacity.
    ///
    /// Environment variable: `ADMISSION_BUDGET`
    #[arg(long, env = "ADMISSION_BUDGET")]
    pub admission_budget: Option<usize>,

    /// Total number of tasks to submit.
    ///
    /// Environment variable: `TASKS`
    #[arg(long, env = "TASKS", default_value_t = 10_000)]
    pub tasks: usize,

    /// Number of distinct routing keys; task `i` uses key `i mod keys`.
    ///
    /// Environment variable: `KEYS`
    #[arg(long, env = "KEYS", default_value_t = 64)]
    pub keys: u64,

    /// How long each task sleeps, in milliseconds.
    ///
    /// Environment variable: `TASK_DURATION_MS`
    #[arg(long, env = "TASK_DURATION_MS", default_value_t = 1)]
    pub task_duration_ms: u64,

    /// Routing strategy.
    ///
    /// Environment variable: `ROUTING`
    #[arg(long, env = "ROUTING", value_enum, default_value_t = Routing::Key)]
    pub routing: Routing,

    /// Worker threads are named `{prefix}-{stripe}-{n}`.
    ///
    /// Environment variable: `NAME_PREFIX`
    #[arg(long, env = "NAME_PREFIX", default_value_t = String::from("load"))]
    pub name_prefix: String,

    /// How long to wait for the executor to terminate after submission.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT_SECS`
    #[arg(long, env = "SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub striped: StripedConfig,
    pub tasks: usize,
    pub keys: u64,
    pub task_duration: Duration,
    pub routing: Routing,
    pub shutdown_timeout: Duration,
}

impl TryFrom<CliArgs> for LoadConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stripes == 0 {
            bail!("STRIPES must be greater than 0");
        }

        if args.queue_capacity == 0 {
            bail!("QUEUE_CAPACITY must be greater than 0");
        }

        if args.admission_budget == Some(0) {
            bail!("ADMISSION_BUDGET must be greater than 0");
        }

        if args.keys == 0 {
            bail!("KEYS must be greater than 0");
        }

        if args.tasks == 0 {
            bail!("TASKS must be greater than 0");
        }

        let threads = match args.threads_per_stripe {
            0 => num_cpus::get().div_ceil(args.stripes).max(1),
            n => n,
        };

        let striped = StripedConfig {
            stripes: args.stripes,
            pool: PoolConfig {
                queue_capacity: Some(args.queue_capacity),
                name_prefix: args.name_prefix,
                ..PoolConfig::fixed(threads)
            },
            admission_budget: args.admission_budget,
        };
        striped.validate()?;

        Ok(Self {
            striped,
            tasks: args.tasks,
            keys: args.keys,
            task_duration: Duration::from_millis(args.task_duration_ms),
            routing: args.routing,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> anyhow::Result<LoadConfig> {
        let argv = std::iter::once("stripepool-load").chain(args.iter().copied());
        LoadConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_describe_a_bounded_executor() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.striped.stripes, 4);
        assert_eq!(config.striped.pool.core_threads, 1);
        assert_eq!(config.striped.effective_budget().unwrap().get(), 64);
        assert_eq!(config.routing, Routing::Key);
    }

    #[test]
    fn zero_threads_splits_available_cpus() {
        let config = parse(&["--threads-per-stripe", "0", "--stripes", "2"]).unwrap();
        let expected = num_cpus::get().div_ceil(2).max(1);
        assert_eq!(config.striped.pool.core_threads, expected);
        assert_eq!(config.striped.pool.max_threads, expected);
    }

    #[test]
    fn round_robin_and_budget_flags() {
        let config = parse(&["--routing", "round-robin", "--admission-budget", "3"]).unwrap();
        assert_eq!(config.routing, Routing::RoundRobin);
        assert_eq!(config.striped.effective_budget().unwrap().get(), 3);
    }

    #[test]
    fn nonsense_is_rejected() {
        assert!(parse(&["--stripes", "0"]).is_err());
        assert!(parse(&["--queue-capacity", "0"]).is_err());
        assert!(parse(&["--admission-budget", "0"]).is_err());
        assert!(parse(&["--keys", "0"]).is_err());
        assert!(parse(&["--routing", "random"]).is_err());
    }
}
