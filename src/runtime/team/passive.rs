//! Team running jobs on the assigning thread

use std::sync::atomic::{AtomicBool, Ordering};

use super::{run_job, Job, Team, TeamError, TeamStats};

/// Runs every job immediately, on the thread that assigns it.
#[derive(Debug, Default)]
pub struct PassiveTeam {
    name: String,
    stopped: AtomicBool,
    stats: TeamStats,
}

impl PassiveTeam {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stopped: AtomicBool::new(false),
            stats: TeamStats::default(),
        }
    }
}

impl Team for PassiveTeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn assign_job(
        &self,
        job: Job,
    ) -> Result<(), TeamError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(TeamError::Stopped {
                team: self.name.clone(),
            });
        }
        self.stats.record_assigned();
        run_job(&self.name, job, &self.stats);
        Ok(())
    }

    fn stop_working(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    fn is_passive(&self) -> bool {
        true
    }

    fn stats(&self) -> Option<&TeamStats> {
        Some(&self.stats)
    }
}
