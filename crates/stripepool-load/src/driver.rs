//! Pushes the configured workload through a bounded striped executor and
//! measures what the admission gates let through.

use portable_atomic::{AtomicUsize, Ordering};
use std::{
    fmt,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};
use stripepool::{BoundedPool, Router, StripedBuilder, StripedExecutor, Task, WorkerPool};

use crate::config::{LoadConfig, Routing};

/// Tracks how many tasks are running right now and the most ever seen.
#[derive(Default)]
struct Gauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::AcqRel);
    }

    fn exit(&self) {
        self.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Outcome of one load run.
#[derive(Debug, Clone)]
pub struct Report {
    pub submitted: usize,
    pub rejected: usize,
    pub per_stripe: Vec<u64>,
    pub peak_running: usize,
    /// Upper bound on `peak_running`: stripes × per-stripe budget.
    pub admission_limit: usize,
    pub submit_time: Duration,
    pub total_time: Duration,
    pub terminated: bool,
}

impl Report {
    pub fn completed(&self) -> u64 {
        self.per_stripe.iter().sum()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "submitted      {}", self.submitted)?;
        writeln!(f, "rejected       {}", self.rejected)?;
        writeln!(f, "completed      {}", self.completed())?;
        writeln!(
            f,
            "peak running   {} (limit {})",
            self.peak_running, self.admission_limit
        )?;
        writeln!(f, "submit time    {:?}", self.submit_time)?;
        writeln!(f, "total time     {:?}", self.total_time)?;
        writeln!(f, "terminated     {}", self.terminated)?;
        for (stripe, count) in self.per_stripe.iter().enumerate() {
            writeln!(f, "stripe {stripe:<7} {count}")?;
        }
        Ok(())
    }
}

/// Builds the executor `config` describes and runs the workload on it.
pub fn run(config: &LoadConfig) -> anyhow::Result<Report> {
    let builder = StripedBuilder::new(config.striped.clone());
    match config.routing {
        Routing::Key => drive(builder.key_routed()?, config),
        Routing::RoundRobin => drive(builder.round_robin()?, config),
    }
}

fn drive<R>(executor: StripedExecutor<BoundedPool, R>, config: &LoadConfig) -> anyhow::Result<Report>
where
    R: Router,
{
    let gauge = Arc::new(Gauge::default());
    let admission_limit = executor.stripes() * config.striped.effective_budget()?.get();
    let mut rejected = 0;

    let start = Instant::now();
    for i in 0..config.tasks {
        let key = i as u64 % config.keys;
        let gauge = Arc::clone(&gauge);
        let pause = config.task_duration;
        let task = Task::new(move || {
            gauge.enter();
            thread::sleep(pause);
            gauge.exit();
        });

        if let Err(e) = executor.execute(task, key) {
            // Only possible when the budget exceeds the queue capacity.
            tracing::debug!(key, error = %e, "task rejected");
            rejected += 1;
        }
    }
    let submit_time = start.elapsed();
    tracing::info!(
        tasks = config.tasks,
        rejected,
        elapsed = ?submit_time,
        "submission finished, shutting down"
    );

    executor.shutdown();
    let terminated = executor.await_termination(config.shutdown_timeout);
    let total_time = start.elapsed();

    let per_stripe = executor
        .pools()
        .iter()
        .map(|pool| pool.inner().completed_tasks())
        .collect();

    Ok(Report {
        submitted: config.tasks,
        rejected,
        per_stripe,
        peak_running: gauge.peak.load(Ordering::Acquire),
        admission_limit,
        submit_time,
        total_time,
        terminated,
    })
}
