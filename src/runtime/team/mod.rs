//! Teams: named worker pools that run jobs
//!
//! The engine hands a team one job per dispatched thread chain. A
//! [`PassiveTeam`] runs the job on the calling thread, an [`ExecutorTeam`]
//! queues it for a fixed pool of workers. Authors may plug in their own
//! [`Team`] through `TeamKind::Custom`.

pub mod executor;
pub mod passive;

pub use executor::ExecutorTeam;
pub use passive::PassiveTeam;

use std::sync::atomic::{AtomicUsize, Ordering};

use thiserror::Error;

/// Unit of work assigned to a team
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Team failure
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("team '{team}' has stopped working")]
    Stopped { team: String },

    #[error("team '{team}' failed to start a worker")]
    Spawn {
        team: String,
        #[source]
        source: std::io::Error,
    },
}

impl TeamError {
    /// Name of the failing team
    pub fn team(&self) -> &str {
        match self {
            TeamError::Stopped { team } | TeamError::Spawn { team, .. } => team,
        }
    }
}

/// A worker pool.
pub trait Team: Send + Sync + 'static {
    /// Team name
    fn name(&self) -> &str;

    /// Run `job`, now or later. The job must run exactly once if `Ok` is
    /// returned and never if `Err` is.
    fn assign_job(
        &self,
        job: Job,
    ) -> Result<(), TeamError>;

    /// Stop accepting jobs and release workers once queued jobs finish
    fn stop_working(&self);

    /// Jobs run on the assigning thread
    fn is_passive(&self) -> bool {
        false
    }

    /// Counters, if the team keeps any
    fn stats(&self) -> Option<&TeamStats> {
        None
    }
}

/// Team counters.
#[derive(Debug, Default)]
pub struct TeamStats {
    /// Jobs accepted
    pub jobs_assigned: AtomicUsize,
    /// Jobs run to completion
    pub jobs_completed: AtomicUsize,
    /// Jobs that panicked
    pub jobs_panicked: AtomicUsize,
    /// Total execution time in microseconds
    pub total_exec_time_us: AtomicUsize,
    /// Peak number of jobs running at once
    pub peak_parallelism: AtomicUsize,
    running: AtomicUsize,
}

impl TeamStats {
    #[inline]
    pub fn record_assigned(&self) {
        self.jobs_assigned.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark a job as started
    #[inline]
    pub fn record_started(&self) {
        let current = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.update_parallelism(current);
    }

    /// Mark a job as finished
    #[inline]
    pub fn record_completed(
        &self,
        duration_us: usize,
        panicked: bool,
    ) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        if panicked {
            self.jobs_panicked.fetch_add(1, Ordering::SeqCst);
        } else {
            self.jobs_completed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_exec_time_us
            .fetch_add(duration_us, Ordering::SeqCst);
    }

    fn update_parallelism(
        &self,
        current: usize,
    ) {
        loop {
            let peak = self.peak_parallelism.load(Ordering::SeqCst);
            if current <= peak {
                break;
            }
            if self
                .peak_parallelism
                .compare_exchange(peak, current, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
    }

    #[inline]
    pub fn assigned(&self) -> usize {
        self.jobs_assigned.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn completed(&self) -> usize {
        self.jobs_completed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn panicked(&self) -> usize {
        self.jobs_panicked.load(Ordering::SeqCst)
    }
}

/// Run a job, recording it in `stats`.
///
/// A panic escaping the job is caught so that it cannot take a worker down.
pub(crate) fn run_job(
    team: &str,
    job: Job,
    stats: &TeamStats,
) {
    stats.record_started();
    let start = std::time::Instant::now();
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));
    let duration_us = start.elapsed().as_micros() as usize;
    if outcome.is_err() {
        tracing::error!("job on team '{}' panicked", team);
    }
    stats.record_completed(duration_us, outcome.is_err());
}

#[cfg(test)]
mod tests;
