//! Fixed-size worker pool fed from one FIFO queue

use std::sync::Arc;
use std::thread;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;

use super::{run_job, Job, Team, TeamError, TeamStats};

/// Executor team.
///
/// Jobs are queued on an unbounded channel and taken by whichever worker is
/// free first. Stopping closes the queue; workers drain what was already
/// queued and exit.
#[derive(Debug)]
pub struct ExecutorTeam {
    name: String,
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    stats: Arc<TeamStats>,
}

impl ExecutorTeam {
    /// Start a team with `num_workers` worker threads
    pub fn new(
        name: impl Into<String>,
        num_workers: usize,
    ) -> Result<Self, TeamError> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded::<Job>();
        let stats = Arc::new(TeamStats::default());
        let workers = Self::spawn_workers(&name, num_workers.max(1), &receiver, &stats)?;
        tracing::debug!("team '{}' started with {} worker(s)", name, workers.len());
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            stats,
        })
    }

    fn spawn_workers(
        name: &str,
        num_workers: usize,
        receiver: &Receiver<Job>,
        stats: &Arc<TeamStats>,
    ) -> Result<Vec<thread::JoinHandle<()>>, TeamError> {
        let mut workers = Vec::with_capacity(num_workers);
        for worker_id in 0..num_workers {
            let receiver = receiver.clone();
            let stats = stats.clone();
            let team = name.to_string();
            let worker = thread::Builder::new()
                .name(format!("{}-{}", name, worker_id))
                .spawn(move || Self::worker_loop(&team, &receiver, &stats))
                .map_err(|source| TeamError::Spawn {
                    team: name.to_string(),
                    source,
                })?;
            workers.push(worker);
        }
        Ok(workers)
    }

    /// Worker main loop; ends when the queue is closed and drained
    fn worker_loop(
        team: &str,
        receiver: &Receiver<Job>,
        stats: &TeamStats,
    ) {
        for job in receiver.iter() {
            run_job(team, job, stats);
        }
    }

    /// Number of worker threads
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.workers.lock().len()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.sender.lock().is_some()
    }
}

impl Team for ExecutorTeam {
    fn name(&self) -> &str {
        &self.name
    }

    fn assign_job(
        &self,
        job: Job,
    ) -> Result<(), TeamError> {
        let sender = self.sender.lock();
        let stopped = || TeamError::Stopped {
            team: self.name.clone(),
        };
        let sender = sender.as_ref().ok_or_else(stopped)?;
        self.stats.record_assigned();
        sender.send(job).map_err(|_| stopped())
    }

    fn stop_working(&self) {
        // dropping the sender closes the queue
        if self.sender.lock().take().is_none() {
            return;
        }
        let current = thread::current().id();
        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        for worker in workers {
            // a worker stopping its own team cannot wait for itself
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                tracing::error!("worker of team '{}' terminated abnormally", self.name);
            }
        }
        tracing::debug!("team '{}' stopped", self.name);
    }

    fn stats(&self) -> Option<&TeamStats> {
        Some(&self.stats)
    }
}

impl Drop for ExecutorTeam {
    fn drop(&mut self) {
        self.stop_working();
    }
}
