//! Team declarations

use std::sync::Arc;

use crate::runtime::team::Team;

/// How a team executes the jobs assigned to it
#[derive(Clone)]
pub enum TeamKind {
    /// Runs jobs on the thread that assigns them
    Passive,
    /// Fixed pool of worker threads fed from one FIFO queue
    Executor {
        /// Worker count (`None` uses the runtime default)
        workers: Option<usize>,
    },
    /// Author-supplied implementation
    Custom(Arc<dyn Team>),
}

impl std::fmt::Debug for TeamKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            TeamKind::Passive => write!(f, "Passive"),
            TeamKind::Executor { workers } => f
                .debug_struct("Executor")
                .field("workers", workers)
                .finish(),
            TeamKind::Custom(team) => write!(f, "Custom({})", team.name()),
        }
    }
}

/// A named worker pool
#[derive(Debug, Clone)]
pub struct TeamConfig {
    /// Team name
    pub name: String,
    /// Execution strategy
    pub kind: TeamKind,
}

impl TeamConfig {
    /// Passive (current thread) team
    pub fn passive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TeamKind::Passive,
        }
    }

    /// Executor team with the given number of workers
    pub fn executor(
        name: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TeamKind::Executor {
                workers: Some(workers),
            },
        }
    }

    /// Executor team sized by the runtime configuration
    pub fn executor_default(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TeamKind::Executor { workers: None },
        }
    }

    /// Custom team implementation
    pub fn custom(
        name: impl Into<String>,
        team: Arc<dyn Team>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: TeamKind::Custom(team),
        }
    }
}
