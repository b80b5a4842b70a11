//! Execution engine
//!
//! An [`Office`] runs invocations as processes. Each process starts with one
//! thread: a chain of function states executed one after another on the
//! team each function is bound to. A chain stays on the current worker
//! while consecutive functions share a team and is handed off to the
//! target team's queue otherwise. A function that must wait (for an
//! asynchronously sourced object, an exclusive object or its asynchronous
//! flows) parks the chain; whoever completes the awaited resource
//! dispatches the chain again.

mod function;
mod object;
mod state;

pub use function::{AsynchronousFlow, FunctionContext};
pub use object::ObjectUser;
pub use state::{ProcessId, ProcessOutcome, ThreadId};

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;

use crate::model::{self, Escalation, Object, TeamKind};
use crate::office::{FunctionIndex, OfficeMetaData, TeamIndex};
use crate::runtime::asset::{AssetInfo, AssetManager, AssetMonitor};
use crate::runtime::team::{ExecutorTeam, PassiveTeam, Team, TeamError, TeamStats};
use crate::util::config::RuntimeConfig;
use crate::util::diagnostic::Issue;
use function::{Completion, FunctionState, Step};
use state::{CompletionCallback, PendingFunction, ProcessState, ThreadState};


/// Invocation failure
#[derive(Debug, Error)]
pub enum OfficeError {
    #[error("no function named '{0}' in the office")]
    UnknownFunction(String),

    #[error("office has been shut down")]
    Stopped,

    #[error(transparent)]
    Team(#[from] TeamError),
}

/// Engine counters.
#[derive(Debug, Default)]
pub struct EngineStats {
    pub processes_started: AtomicUsize,
    pub processes_completed: AtomicUsize,
    /// Processes ended by an escalation or cancellation
    pub processes_failed: AtomicUsize,
    /// Chains queued to another team
    pub handoffs: AtomicUsize,
    /// Functions continued on the current worker
    pub inline_continuations: AtomicUsize,
    pub suspensions: AtomicUsize,
    pub escalations_handled: AtomicUsize,
}

impl EngineStats {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn started(&self) -> usize {
        self.processes_started.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn completed(&self) -> usize {
        self.processes_completed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn failed(&self) -> usize {
        self.processes_failed.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn handoffs(&self) -> usize {
        self.handoffs.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn inline_continuations(&self) -> usize {
        self.inline_continuations.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn suspensions(&self) -> usize {
        self.suspensions.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn escalations_handled(&self) -> usize {
        self.escalations_handled.load(Ordering::SeqCst)
    }
}

/// State shared by an office and every job it hands to its teams
pub(crate) struct OfficeInner {
    pub metadata: OfficeMetaData,
    pub config: RuntimeConfig,
    pub assets: Arc<AssetManager>,
    teams: Vec<Arc<dyn Team>>,
    monitor: Mutex<Option<AssetMonitor>>,
    warnings: Vec<Issue>,
    next_process: AtomicU64,
    next_thread: AtomicU64,
    processes: Mutex<IndexMap<ProcessId, Weak<ProcessState>>>,
    stopped: AtomicBool,
    stats: EngineStats,
}

impl OfficeInner {
    fn new_thread(
        &self,
        process: &Arc<ProcessState>,
    ) -> Arc<ThreadState> {
        let id = ThreadId(self.next_thread.fetch_add(1, Ordering::SeqCst));
        ThreadState::new(id, process.clone(), self.metadata.thread_objects.len())
    }

    #[inline]
    fn team_of(
        &self,
        function: FunctionIndex,
    ) -> TeamIndex {
        self.metadata.function(function).team
    }

    /// Team of whatever the chain runs next
    fn next_team(
        &self,
        thread: &ThreadState,
    ) -> Option<TeamIndex> {
        let chain = thread.chain.lock();
        chain
            .active
            .as_ref()
            .map(|state| state.function)
            .or_else(|| chain.pending.last().map(|pending| pending.function))
            .map(|function| self.team_of(function))
    }

    /// Continue a parked chain
    pub fn resume(
        self: &Arc<Self>,
        thread: Arc<ThreadState>,
    ) {
        tracing::debug!("resuming {} of {}", thread.id, thread.process.id);
        self.dispatch(thread);
    }

    fn dispatch(
        self: &Arc<Self>,
        thread: Arc<ThreadState>,
    ) {
        match self.next_team(&thread) {
            Some(team) => self.assign(team, thread),
            None => self.execute(thread, None),
        }
    }

    fn assign(
        self: &Arc<Self>,
        team: TeamIndex,
        thread: Arc<ThreadState>,
    ) {
        let office = self.clone();
        let job_thread = thread.clone();
        let job = Box::new(move || office.execute(job_thread, Some(team)));
        if let Err(error) = self.teams[team.0].assign_job(job) {
            self.team_failure(&thread, error);
        }
    }

    fn team_failure(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
        error: TeamError,
    ) {
        tracing::error!("{} of {} lost: {}", thread.id, thread.process.id, error);
        let team = error.team().to_string();
        self.fail_process(&thread.process, Escalation::team_failure(&team, error));
        self.abandon_thread(thread);
    }

    /// Run the chain of `thread` on the current worker of `team` until it
    /// completes, parks or must move to another team.
    fn execute(
        self: &Arc<Self>,
        thread: Arc<ThreadState>,
        team: Option<TeamIndex>,
    ) {
        let mut steps = 0usize;
        let mut retry: Option<FunctionState> = None;
        loop {
            let mut state = match retry.take() {
                Some(state) => state,
                None => {
                    let next = {
                        let mut chain = thread.chain.lock();
                        match chain.active.take() {
                            Some(state) => Some(state),
                            None => chain
                                .pending
                                .pop()
                                .map(|pending| FunctionState::new(self, pending)),
                        }
                    };
                    let Some(mut state) = next else {
                        self.complete_thread(&thread);
                        return;
                    };
                    if thread.process.is_cancelled() {
                        state.abandon(self);
                        self.abandon_thread(&thread);
                        return;
                    }

                    let target = self.team_of(state.function);
                    let inline = self.teams[target.0].is_passive()
                        || (team == Some(target)
                            && (steps == 0
                                || (self.config.inline_same_team
                                    && steps < self.config.max_inline_steps)));
                    if !inline {
                        thread.chain.lock().active = Some(state);
                        EngineStats::bump(&self.stats.handoffs);
                        tracing::debug!(
                            "{} handed off to team '{}'",
                            thread.id,
                            self.metadata.teams[target.0].name
                        );
                        self.assign(target, thread);
                        return;
                    }
                    if steps > 0 {
                        EngineStats::bump(&self.stats.inline_continuations);
                    }
                    steps += 1;
                    state
                }
            };

            match state.run(self, &thread) {
                Step::Complete(completion) => {
                    state.finish(self);
                    self.continue_chain(&thread, completion, state.handling);
                }
                Step::Wait(waiter) => {
                    let function = state.function;
                    let mut chain = thread.chain.lock();
                    if waiter.register(&thread) {
                        chain.active = Some(state);
                        drop(chain);
                        EngineStats::bump(&self.stats.suspensions);
                        tracing::debug!(
                            "{} suspended in '{}'",
                            thread.id,
                            self.metadata.function(function).name
                        );
                        return;
                    }
                    drop(chain);
                    retry = Some(state);
                }
                Step::Escalate(escalation) => {
                    state.abandon(self);
                    if !self.escalate(&thread, &state, escalation) {
                        self.abandon_thread(&thread);
                        return;
                    }
                }
            }
        }
    }

    /// Queue the continuations of a completed function
    fn continue_chain(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
        completion: Completion,
        handling: bool,
    ) {
        let (spawned, sequential): (Vec<_>, Vec<_>) =
            completion.flows.into_iter().partition(|flow| flow.spawn);
        {
            let mut chain = thread.chain.lock();
            if let Some(next) = completion.next {
                chain.pending.push(PendingFunction {
                    function: next,
                    parameter: completion.argument,
                    handling,
                });
            }
            // the chain is a stack: push in reverse so flows run in request order
            for flow in sequential.into_iter().rev() {
                chain
                    .pending
                    .push(PendingFunction::new(flow.target, flow.argument));
            }
        }
        for flow in spawned {
            self.spawn_thread(&thread.process, flow.target, flow.argument);
        }
    }

    fn spawn_thread(
        self: &Arc<Self>,
        process: &Arc<ProcessState>,
        function: FunctionIndex,
        parameter: Option<Object>,
    ) {
        let thread = self.new_thread(process);
        tracing::debug!(
            "{} spawned in {} for '{}'",
            thread.id,
            process.id,
            self.metadata.function(function).name
        );
        thread
            .chain
            .lock()
            .pending
            .push(PendingFunction::new(function, parameter));
        self.dispatch(thread);
    }

    /// Route an escalation to its handler.
    ///
    /// Returns `false` when nothing handled it and the process is failing.
    fn escalate(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
        state: &FunctionState,
        escalation: Escalation,
    ) -> bool {
        let function = self.metadata.function(state.function);
        let hierarchy = &self.metadata.escalation_types;

        if let Some(flow) = hierarchy.select(&function.escalations, &escalation) {
            tracing::debug!(
                "'{}' escalated {}, handled by '{}'",
                function.name,
                escalation,
                self.metadata.function(flow.handler).name
            );
            EngineStats::bump(&self.stats.escalations_handled);
            thread
                .chain
                .lock()
                .pending
                .push(PendingFunction::new(flow.handler, Some(model::object(escalation))));
            self.release_exclusive(thread);
            return true;
        }

        if !state.handling {
            if let Some(flow) = hierarchy.select(&self.metadata.office_escalations, &escalation) {
                tracing::debug!(
                    "'{}' escalated {}, handled by office handler '{}'",
                    function.name,
                    escalation,
                    self.metadata.function(flow.handler).name
                );
                EngineStats::bump(&self.stats.escalations_handled);
                {
                    let mut chain = thread.chain.lock();
                    chain.pending.clear();
                    chain.pending.push(PendingFunction {
                        function: flow.handler,
                        parameter: Some(model::object(escalation)),
                        handling: true,
                    });
                }
                self.release_exclusive(thread);
                return true;
            }
        }

        self.unhandled(&thread.process, escalation);
        false
    }

    fn unhandled(
        self: &Arc<Self>,
        process: &Arc<ProcessState>,
        escalation: Escalation,
    ) {
        tracing::error!("unhandled escalation in {}: {}", process.id, escalation);
        if let Some(handler) = &self.metadata.unhandled {
            let notified = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler.handle(process.id, &escalation)
            }));
            if notified.is_err() {
                tracing::error!("unhandled escalation handler panicked");
            }
        }
        self.fail_process(process, escalation);
    }

    fn fail_process(
        self: &Arc<Self>,
        process: &Arc<ProcessState>,
        escalation: Escalation,
    ) {
        process.record_failure(escalation);
        self.cancel_process(process);
    }

    /// Stop every thread of `process` at its next step.
    ///
    /// Returns `false` if the process was already cancelled.
    fn cancel_process(
        self: &Arc<Self>,
        process: &Arc<ProcessState>,
    ) -> bool {
        if !process.mark_cancelled() {
            return false;
        }
        tracing::debug!("cancelling {}", process.id);
        let escalation = Escalation::cancelled(&format!("{} cancelled", process.id));
        self.assets.fail_owned_by(process.id, &escalation);
        for thread in process.drain_exclusive_waiters() {
            self.resume(thread);
        }
        true
    }

    /// Drop the rest of a chain and finish the thread
    fn abandon_thread(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
    ) {
        let active = {
            let mut chain = thread.chain.lock();
            chain.pending.clear();
            chain.active.take()
        };
        if let Some(mut state) = active {
            state.abandon(self);
        }
        self.complete_thread(thread);
    }

    fn release_exclusive(
        self: &Arc<Self>,
        thread: &ThreadState,
    ) {
        let held = std::mem::take(&mut *thread.held_exclusive.lock());
        for index in held.into_iter().rev() {
            if let Some(next) = thread.process.release_exclusive(index) {
                self.resume(next);
            }
        }
    }

    fn complete_thread(
        self: &Arc<Self>,
        thread: &Arc<ThreadState>,
    ) {
        if !thread.mark_finished() {
            return;
        }
        tracing::debug!("{} of {} complete", thread.id, thread.process.id);
        thread.objects.release_all(&self.metadata.thread_objects);
        self.release_exclusive(thread);
        if thread.process.thread_finished() {
            self.complete_process(&thread.process);
        }
    }

    fn complete_process(
        &self,
        process: &ProcessState,
    ) {
        process.objects.release_all(&self.metadata.process_objects);
        self.processes.lock().shift_remove(&process.id);
        if process.has_failed() {
            EngineStats::bump(&self.stats.processes_failed);
        } else {
            EngineStats::bump(&self.stats.processes_completed);
        }
        tracing::debug!("{} complete", process.id);
        process.complete();
    }
}

/// A running office.
///
/// Dropping the office shuts it down.
pub struct Office {
    inner: Arc<OfficeInner>,
}

impl std::fmt::Debug for Office {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Office")
            .field("name", &self.inner.metadata.name)
            .field("active_processes", &self.active_processes())
            .field("stats", &self.inner.stats)
            .finish()
    }
}

impl Office {
    /// Start the teams and the asset monitor for bound metadata
    pub(crate) fn start(
        metadata: OfficeMetaData,
        config: RuntimeConfig,
        warnings: Vec<Issue>,
    ) -> Result<Self, TeamError> {
        let mut teams: Vec<Arc<dyn Team>> = Vec::with_capacity(metadata.teams.len());
        for team in &metadata.teams {
            let started: Arc<dyn Team> = match &team.kind {
                TeamKind::Passive => Arc::new(PassiveTeam::new(team.name.clone())),
                TeamKind::Executor { .. } => {
                    Arc::new(ExecutorTeam::new(team.name.clone(), team.workers)?)
                }
                TeamKind::Custom(custom) => custom.clone(),
            };
            teams.push(started);
        }
        let assets = AssetManager::new();
        let monitor = AssetMonitor::start(assets.clone(), config.asset_poll_interval())?;
        for warning in &warnings {
            tracing::warn!("{}", warning);
        }
        tracing::info!(
            "office '{}' started with {} team(s)",
            metadata.name,
            teams.len()
        );
        Ok(Self {
            inner: Arc::new(OfficeInner {
                metadata,
                config,
                assets,
                teams,
                monitor: Mutex::new(Some(monitor)),
                warnings,
                next_process: AtomicU64::new(1),
                next_thread: AtomicU64::new(1),
                processes: Mutex::new(IndexMap::new()),
                stopped: AtomicBool::new(false),
                stats: EngineStats::default(),
            }),
        })
    }

    /// Invoke function `name` as a new process
    pub fn invoke(
        &self,
        name: &str,
        parameter: Option<Object>,
    ) -> Result<InvocationHandle, OfficeError> {
        self.start_process(name, parameter, None)
    }

    /// Invoke function `name`, calling `callback` once the process completes
    pub fn invoke_with_callback<F>(
        &self,
        name: &str,
        parameter: Option<Object>,
        callback: F,
    ) -> Result<InvocationHandle, OfficeError>
    where
        F: FnOnce(&ProcessOutcome) + Send + 'static,
    {
        self.start_process(name, parameter, Some(Box::new(callback)))
    }

    fn start_process(
        &self,
        name: &str,
        parameter: Option<Object>,
        callback: Option<CompletionCallback>,
    ) -> Result<InvocationHandle, OfficeError> {
        let inner = &self.inner;
        if inner.stopped.load(Ordering::SeqCst) {
            return Err(OfficeError::Stopped);
        }
        let function = inner
            .metadata
            .function_index(name)
            .ok_or_else(|| OfficeError::UnknownFunction(name.to_string()))?;

        let id = ProcessId(inner.next_process.fetch_add(1, Ordering::SeqCst));
        let process = ProcessState::new(id, inner.metadata.process_objects.len(), callback);
        inner.processes.lock().insert(id, Arc::downgrade(&process));
        EngineStats::bump(&inner.stats.processes_started);

        let thread = inner.new_thread(&process);
        thread
            .chain
            .lock()
            .pending
            .push(PendingFunction::new(function, parameter));
        tracing::debug!("{} invoking '{}'", id, name);

        let handle = InvocationHandle {
            process,
            office: Arc::downgrade(inner),
        };
        let team = inner.team_of(function);
        let office = inner.clone();
        let job_thread = thread.clone();
        let job = Box::new(move || office.execute(job_thread, Some(team)));
        if let Err(error) = inner.teams[team.0].assign_job(job) {
            let escalation = Escalation::new(Escalation::TEAM_FAILURE, error.to_string());
            inner.fail_process(&thread.process, escalation);
            inner.abandon_thread(&thread);
            return Err(OfficeError::Team(error));
        }
        Ok(handle)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.metadata.name
    }

    /// Bound metadata the office runs
    #[inline]
    pub fn metadata(&self) -> &OfficeMetaData {
        &self.inner.metadata
    }

    /// Non-fatal issues found while building the office
    #[inline]
    pub fn warnings(&self) -> &[Issue] {
        &self.inner.warnings
    }

    #[inline]
    pub fn stats(&self) -> &EngineStats {
        &self.inner.stats
    }

    /// Counters of the named team, if it keeps any
    pub fn team_stats(
        &self,
        name: &str,
    ) -> Option<&TeamStats> {
        self.inner
            .teams
            .iter()
            .find(|team| team.name() == name)
            .and_then(|team| team.stats())
    }

    /// Assets not yet completed, cancelled or failed
    pub fn outstanding_assets(&self) -> Vec<AssetInfo> {
        self.inner.assets.outstanding()
    }

    /// Processes started and not yet complete
    pub fn active_processes(&self) -> usize {
        self.inner
            .processes
            .lock()
            .values()
            .filter(|process| process.strong_count() > 0)
            .count()
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Cancel active processes and stop the asset monitor and every team.
    ///
    /// Later invocations fail with [`OfficeError::Stopped`].
    pub fn shutdown(&self) {
        let inner = &self.inner;
        if inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("office '{}' shutting down", inner.metadata.name);
        let active: Vec<Arc<ProcessState>> = inner
            .processes
            .lock()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        for process in active {
            process.record_failure(Escalation::cancelled("office shut down"));
            inner.cancel_process(&process);
        }
        if let Some(mut monitor) = inner.monitor.lock().take() {
            monitor.stop();
        }
        for team in &inner.teams {
            team.stop_working();
        }
    }
}

impl Drop for Office {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle on one invocation's process.
pub struct InvocationHandle {
    process: Arc<ProcessState>,
    office: Weak<OfficeInner>,
}

impl std::fmt::Debug for InvocationHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("InvocationHandle")
            .field("process", &self.process.id)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl InvocationHandle {
    #[inline]
    pub fn process_id(&self) -> ProcessId {
        self.process.id
    }

    pub fn is_complete(&self) -> bool {
        self.process.outcome().is_some()
    }

    /// Outcome, once complete
    pub fn outcome(&self) -> Option<ProcessOutcome> {
        self.process.outcome()
    }

    /// Block until the process completes
    pub fn wait(&self) -> ProcessOutcome {
        self.process.wait()
    }

    /// Block until the process completes or `timeout` elapses
    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<ProcessOutcome> {
        self.process.wait_timeout(timeout)
    }

    /// Cancel the process.
    ///
    /// Outstanding assets fail with a cancellation escalation and every
    /// thread stops at its next step. Returns `false` if the process had
    /// already completed or been cancelled.
    pub fn cancel(&self) -> bool {
        if self.is_complete() {
            return false;
        }
        let Some(office) = self.office.upgrade() else {
            return false;
        };
        self.process
            .record_failure(Escalation::cancelled(&format!("{} cancelled", self.process.id)));
        office.cancel_process(&self.process)
    }
}
