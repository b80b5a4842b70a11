//! Process and thread state

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use super::function::FunctionState;
use super::object::ObjectContainer;
use crate::model::{Escalation, Object};
use crate::office::FunctionIndex;

/// Identifies one invocation's process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(pub u64);

impl std::fmt::Display for ProcessId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Process({})", self.0)
    }
}

/// Identifies one thread chain within a process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u64);

impl std::fmt::Display for ThreadId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// How a process ended: `Ok` or the escalation that ended it
pub type ProcessOutcome = Result<(), Escalation>;

/// Notified once when a process completes
pub type CompletionCallback = Box<dyn FnOnce(&ProcessOutcome) + Send + 'static>;

/// A continuation waiting on a thread's chain
pub(crate) struct PendingFunction {
    pub function: FunctionIndex,
    pub parameter: Option<Object>,
    /// Runs as an office-level escalation handler
    pub handling: bool,
}

impl PendingFunction {
    pub fn new(
        function: FunctionIndex,
        parameter: Option<Object>,
    ) -> Self {
        Self {
            function,
            parameter,
            handling: false,
        }
    }
}

/// The thread's continuation stack.
///
/// `pending` is a stack: the last entry runs next. `active` holds a
/// suspended function while it waits to be resumed.
#[derive(Default)]
pub(crate) struct Chain {
    pub active: Option<FunctionState>,
    pub pending: Vec<PendingFunction>,
}

/// One sequential chain of function states.
pub(crate) struct ThreadState {
    pub id: ThreadId,
    pub process: Arc<ProcessState>,
    /// Thread-scope objects
    pub objects: ObjectContainer,
    pub chain: Mutex<Chain>,
    /// Exclusive process objects this thread holds
    pub held_exclusive: Mutex<Vec<usize>>,
    finished: AtomicBool,
}

impl ThreadState {
    pub fn new(
        id: ThreadId,
        process: Arc<ProcessState>,
        thread_objects: usize,
    ) -> Arc<Self> {
        process.thread_started();
        Arc::new(Self {
            id,
            process,
            objects: ObjectContainer::new(thread_objects),
            chain: Mutex::new(Chain::default()),
            held_exclusive: Mutex::new(Vec::new()),
            finished: AtomicBool::new(false),
        })
    }

    /// Mark the chain finished; `true` only for the first call
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }
}

#[derive(Default)]
struct ExclusiveLock {
    owner: Option<ThreadId>,
    waiters: VecDeque<Arc<ThreadState>>,
}

/// State shared by every thread of one invocation.
pub(crate) struct ProcessState {
    pub id: ProcessId,
    /// Process-scope objects
    pub objects: ObjectContainer,
    exclusive: Vec<Mutex<ExclusiveLock>>,
    active_threads: AtomicUsize,
    cancelled: AtomicBool,
    completing: AtomicBool,
    failure: Mutex<Option<Escalation>>,
    outcome: Mutex<Option<ProcessOutcome>>,
    completed: Condvar,
    callback: Mutex<Option<CompletionCallback>>,
}

impl ProcessState {
    pub fn new(
        id: ProcessId,
        process_objects: usize,
        callback: Option<CompletionCallback>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            objects: ObjectContainer::new(process_objects),
            exclusive: (0..process_objects)
                .map(|_| Mutex::new(ExclusiveLock::default()))
                .collect(),
            active_threads: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            completing: AtomicBool::new(false),
            failure: Mutex::new(None),
            outcome: Mutex::new(None),
            completed: Condvar::new(),
            callback: Mutex::new(callback),
        })
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Set the cancelled flag; `true` only for the first call
    pub fn mark_cancelled(&self) -> bool {
        !self.cancelled.swap(true, Ordering::SeqCst)
    }

    /// Keep the first escalation that ends the process
    pub fn record_failure(
        &self,
        escalation: Escalation,
    ) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            *failure = Some(escalation);
        }
    }

    /// An escalation has been recorded against the process
    pub fn has_failed(&self) -> bool {
        self.failure.lock().is_some()
    }

    fn thread_started(&self) {
        self.active_threads.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns `true` when the last thread finished
    pub fn thread_finished(&self) -> bool {
        self.active_threads.fetch_sub(1, Ordering::SeqCst) == 1
    }

    #[inline]
    pub fn active_threads(&self) -> usize {
        self.active_threads.load(Ordering::SeqCst)
    }

    /// Take the exclusive object for `thread` if it is free (or already held)
    pub fn acquire_exclusive(
        &self,
        index: usize,
        thread: &ThreadState,
    ) -> bool {
        let mut lock = self.exclusive[index].lock();
        Self::try_take(&mut lock, index, thread)
    }

    fn try_take(
        lock: &mut ExclusiveLock,
        index: usize,
        thread: &ThreadState,
    ) -> bool {
        match lock.owner {
            Some(owner) => owner == thread.id,
            None => {
                lock.owner = Some(thread.id);
                thread.held_exclusive.lock().push(index);
                true
            }
        }
    }

    /// Queue `thread` for the exclusive object.
    ///
    /// Returns `false` if the object was free and is now held instead.
    pub fn wait_exclusive(
        &self,
        index: usize,
        thread: &Arc<ThreadState>,
    ) -> bool {
        let mut lock = self.exclusive[index].lock();
        if Self::try_take(&mut lock, index, thread) {
            return false;
        }
        lock.waiters.push_back(thread.clone());
        true
    }

    /// Release an exclusive object, handing it to the next waiter
    pub fn release_exclusive(
        &self,
        index: usize,
    ) -> Option<Arc<ThreadState>> {
        let mut lock = self.exclusive[index].lock();
        lock.owner = None;
        let next = lock.waiters.pop_front()?;
        lock.owner = Some(next.id);
        next.held_exclusive.lock().push(index);
        Some(next)
    }

    /// Remove every thread queued for an exclusive object
    pub fn drain_exclusive_waiters(&self) -> Vec<Arc<ThreadState>> {
        self.exclusive
            .iter()
            .flat_map(|lock| lock.lock().waiters.drain(..).collect::<Vec<_>>())
            .collect()
    }

    /// Record the outcome, run the callback, then wake waiters.
    ///
    /// Only the first call has any effect.
    pub fn complete(&self) -> bool {
        if self.completing.swap(true, Ordering::SeqCst) {
            return false;
        }
        let outcome = match self.failure.lock().clone() {
            Some(escalation) => Err(escalation),
            None => Ok(()),
        };
        if let Some(callback) = self.callback.lock().take() {
            callback(&outcome);
        }
        *self.outcome.lock() = Some(outcome);
        self.completed.notify_all();
        true
    }

    pub fn outcome(&self) -> Option<ProcessOutcome> {
        self.outcome.lock().clone()
    }

    pub fn wait(&self) -> ProcessOutcome {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(outcome) = outcome.as_ref() {
                return outcome.clone();
            }
            self.completed.wait(&mut outcome);
        }
    }

    pub fn wait_timeout(
        &self,
        timeout: Duration,
    ) -> Option<ProcessOutcome> {
        let deadline = std::time::Instant::now() + timeout;
        let mut outcome = self.outcome.lock();
        while outcome.is_none() {
            if self.completed.wait_until(&mut outcome, deadline).timed_out() {
                break;
            }
        }
        outcome.clone()
    }
}
