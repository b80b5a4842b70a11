//! Function state machine and the context handed to function bodies
//!
//! A [`FunctionState`] moves through its stages one step at a time:
//! exclusive locks, object acquisition, pre-administration and governance
//! enrolment, the body itself, outstanding asynchronous flows, then
//! governance enforcement and post-administration. Any stage may suspend
//! (an object or lock is not available yet) or escalate.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::object::{settle, Acquire, ObjectContainer, ObjectSlot, ObjectUser};
use super::state::{PendingFunction, ProcessId, ThreadState};
use super::OfficeInner;
use crate::model::{Escalation, Object, Scope};
use crate::office::{
    BoundAdministration, FunctionIndex, FunctionMetaData, GovernanceIndex, ManagedObjectIndex,
};
use crate::runtime::asset::AssetHandle;

/// Run a collaborator, converting a panic into an escalation
pub(crate) fn guarded<T>(
    during: &str,
    call: impl FnOnce() -> Result<T, Escalation>,
) -> Result<T, Escalation> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(result) => result,
        Err(payload) => Err(Escalation::panic(during, &*payload)),
    }
}

/// A flow requested by a body
pub(crate) struct FlowRequest {
    pub target: FunctionIndex,
    pub argument: Option<Object>,
    pub spawn: bool,
}

/// What a function asks of its chain once it has completed
pub(crate) struct Completion {
    /// Argument for the default continuation
    pub argument: Option<Object>,
    pub flows: Vec<FlowRequest>,
    pub next: Option<FunctionIndex>,
}

/// Something a suspended function waits on
pub(crate) enum Waiter {
    Object(Arc<ObjectSlot>),
    Exclusive(usize),
    Flows(Arc<FlowLatch>),
}

impl Waiter {
    /// Queue `thread` on the awaited resource.
    ///
    /// Returns `false` if it became available meanwhile. Callers hold the
    /// thread's chain lock, so a resumption cannot overtake the suspension.
    pub fn register(
        &self,
        thread: &Arc<ThreadState>,
    ) -> bool {
        match self {
            Waiter::Object(slot) => slot.wait(thread),
            Waiter::Exclusive(index) => thread.process.wait_exclusive(*index, thread),
            Waiter::Flows(latch) => latch.wait(thread),
        }
    }
}

/// Result of running a function state as far as it can go
pub(crate) enum Step {
    Complete(Completion),
    Wait(Waiter),
    Escalate(Escalation),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Exclusive,
    Acquire,
    PreAdminister,
    Body,
    AwaitFlows,
    PostAdminister,
    Done,
}

#[derive(Default)]
struct LatchState {
    outstanding: usize,
    failure: Option<Escalation>,
    waiter: Option<Arc<ThreadState>>,
}

/// Counts a function's outstanding asynchronous flows
#[derive(Default)]
pub(crate) struct FlowLatch {
    state: Mutex<LatchState>,
}

impl FlowLatch {
    fn add(&self) {
        self.state.lock().outstanding += 1;
    }

    /// One flow finished; returns the thread to resume, if it is waiting
    /// and this was the last flow
    fn finish(
        &self,
        failure: Option<Escalation>,
    ) -> Option<Arc<ThreadState>> {
        let mut state = self.state.lock();
        state.outstanding = state.outstanding.saturating_sub(1);
        if state.failure.is_none() {
            state.failure = failure;
        }
        if state.outstanding == 0 {
            state.waiter.take()
        } else {
            None
        }
    }

    fn wait(
        &self,
        thread: &Arc<ThreadState>,
    ) -> bool {
        let mut state = self.state.lock();
        if state.outstanding == 0 {
            return false;
        }
        state.waiter = Some(thread.clone());
        true
    }

    fn outstanding(&self) -> usize {
        self.state.lock().outstanding
    }

    fn take_failure(&self) -> Option<Escalation> {
        self.state.lock().failure.take()
    }
}

fn finish_flow(
    office: &Weak<OfficeInner>,
    latch: &FlowLatch,
    failure: Option<Escalation>,
) {
    if let Some(thread) = latch.finish(failure) {
        if let Some(office) = office.upgrade() {
            office.resume(thread);
        }
    }
}

/// An asynchronous flow: the function that created it does not complete
/// until every such flow is completed or fails.
///
/// Dropping it without completing fails it.
pub struct AsynchronousFlow {
    latch: Arc<FlowLatch>,
    asset: Option<AssetHandle>,
    office: Weak<OfficeInner>,
}

impl std::fmt::Debug for AsynchronousFlow {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AsynchronousFlow")
            .field("completed", &self.asset.is_none())
            .finish()
    }
}

impl AsynchronousFlow {
    pub fn complete(mut self) {
        self.finish(None);
    }

    pub fn fail(
        mut self,
        escalation: Escalation,
    ) {
        self.finish(Some(escalation));
    }

    fn finish(
        &mut self,
        failure: Option<Escalation>,
    ) {
        let Some(asset) = self.asset.take() else {
            return;
        };
        if asset.complete() {
            finish_flow(&self.office, &self.latch, failure);
        }
    }
}

impl Drop for AsynchronousFlow {
    fn drop(&mut self) {
        if self.asset.is_some() {
            self.finish(Some(Escalation::new(
                Escalation::EXCEPTION,
                "asynchronous flow dropped without completion",
            )));
        }
    }
}

/// Everything a function body may see and do.
pub struct FunctionContext<'a> {
    function: &'a FunctionMetaData,
    parameter: Option<&'a Object>,
    objects: &'a [Object],
    flows: &'a mut Vec<FlowRequest>,
    latch: &'a Arc<FlowLatch>,
    office: &'a Arc<OfficeInner>,
    process: ProcessId,
}

impl<'a> FunctionContext<'a> {
    #[inline]
    pub fn function_name(&self) -> &str {
        &self.function.name
    }

    #[inline]
    pub fn process_id(&self) -> ProcessId {
        self.process
    }

    /// The incoming parameter
    #[inline]
    pub fn parameter(&self) -> Option<&Object> {
        self.parameter
    }

    /// The incoming parameter, if it is a `T`
    pub fn parameter_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.parameter.and_then(|p| (**p).downcast_ref::<T>())
    }

    /// Injected object by position
    #[inline]
    pub fn object(
        &self,
        index: usize,
    ) -> Option<&Object> {
        self.objects.get(index)
    }

    /// Injected object by position, if it is a `T`
    pub fn object_as<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Option<&T> {
        self.objects.get(index).and_then(|o| (**o).downcast_ref::<T>())
    }

    #[inline]
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn flow_count(&self) -> usize {
        self.function.flows.len()
    }

    fn request_flow(
        &mut self,
        index: usize,
        argument: Option<Object>,
        spawn: Option<bool>,
    ) -> Result<(), Escalation> {
        let flow = self.function.flows.get(index).ok_or_else(|| {
            Escalation::new(
                Escalation::EXCEPTION,
                format!(
                    "function '{}' has no flow {} ({} declared)",
                    self.function.name,
                    index,
                    self.function.flows.len()
                ),
            )
        })?;
        self.flows.push(FlowRequest {
            target: flow.target,
            argument,
            spawn: spawn.unwrap_or(flow.spawn_thread),
        });
        Ok(())
    }

    /// Invoke flow `index` once this function completes.
    ///
    /// Sequential flows run on this thread, in request order, before the
    /// function's next; flows declared with `spawn_thread` start a new
    /// thread instead.
    pub fn do_flow(
        &mut self,
        index: usize,
        argument: Option<Object>,
    ) -> Result<(), Escalation> {
        self.request_flow(index, argument, None)
    }

    /// Invoke flow `index` on a new thread of this process
    pub fn spawn_flow(
        &mut self,
        index: usize,
        argument: Option<Object>,
    ) -> Result<(), Escalation> {
        self.request_flow(index, argument, Some(true))
    }

    /// Begin an asynchronous flow, timed out by the flow timeout
    pub fn create_asynchronous_flow(&self) -> AsynchronousFlow {
        self.latch.add();
        let weak = Arc::downgrade(self.office);
        let latch = self.latch.clone();
        let on_failure = {
            let weak = weak.clone();
            let latch = latch.clone();
            move |escalation: Escalation| finish_flow(&weak, &latch, Some(escalation))
        };
        let asset = self.office.assets.register(
            format!("asynchronous flow of '{}'", self.function.name),
            Some(self.process),
            self.office.config.default_flow_timeout(),
            on_failure,
        );
        AsynchronousFlow {
            latch,
            asset: Some(asset),
            office: weak,
        }
    }
}

/// One function invocation on a thread.
pub(crate) struct FunctionState {
    pub function: FunctionIndex,
    pub parameter: Option<Object>,
    pub handling: bool,
    stage: Stage,
    cursor: usize,
    /// Exclusive process objects to hold, in ascending order
    exclusive: Option<Vec<usize>>,
    objects: ObjectContainer,
    governed: Vec<(GovernanceIndex, Vec<Object>)>,
    latch: Arc<FlowLatch>,
    flows: Vec<FlowRequest>,
    result: Option<Object>,
}

impl FunctionState {
    pub fn new(
        office: &OfficeInner,
        pending: PendingFunction,
    ) -> Self {
        let metadata = office.metadata.function(pending.function);
        Self {
            function: pending.function,
            parameter: pending.parameter,
            handling: pending.handling,
            stage: Stage::Exclusive,
            cursor: 0,
            exclusive: None,
            objects: ObjectContainer::new(metadata.function_objects.len()),
            governed: Vec::new(),
            latch: Arc::new(FlowLatch::default()),
            flows: Vec::new(),
            result: None,
        }
    }

    fn slot<'s>(
        &'s self,
        thread: &'s ThreadState,
        index: ManagedObjectIndex,
    ) -> &'s Arc<ObjectSlot> {
        match index.scope {
            Scope::Function => self.objects.slot(index.index),
            Scope::Thread => thread.objects.slot(index.index),
            Scope::Process => thread.process.objects.slot(index.index),
        }
    }

    fn container<'s>(
        &'s self,
        thread: &'s ThreadState,
        scope: Scope,
    ) -> &'s ObjectContainer {
        match scope {
            Scope::Function => &self.objects,
            Scope::Thread => &thread.objects,
            Scope::Process => &thread.process.objects,
        }
    }

    fn loaded(
        &self,
        thread: &ThreadState,
        index: ManagedObjectIndex,
    ) -> Result<Object, Escalation> {
        self.slot(thread, index).get().ok_or_else(|| {
            Escalation::new(
                Escalation::EXCEPTION,
                format!("managed object {} is not available", index),
            )
        })
    }

    /// Run until the function completes, suspends or escalates
    pub fn run(
        &mut self,
        office: &Arc<OfficeInner>,
        thread: &Arc<ThreadState>,
    ) -> Step {
        let metadata = office.metadata.function(self.function);
        loop {
            match self.stage {
                Stage::Exclusive => {
                    let plan = match self.exclusive.take() {
                        Some(plan) => plan,
                        None => self.plan_exclusive(office, thread, &metadata.exclusive_objects),
                    };
                    while let Some(index) = plan.get(self.cursor).copied() {
                        if !thread.process.acquire_exclusive(index, thread) {
                            self.exclusive = Some(plan);
                            return Step::Wait(Waiter::Exclusive(index));
                        }
                        self.cursor += 1;
                    }
                    self.cursor = 0;
                    self.stage = Stage::Acquire;
                }
                Stage::Acquire => {
                    while let Some(index) = metadata.required_objects.get(self.cursor).copied() {
                        let slot = self.slot(thread, index).clone();
                        match slot.acquire() {
                            Acquire::Ready => self.cursor += 1,
                            Acquire::Failed(escalation) => return Step::Escalate(escalation),
                            Acquire::Loading => return Step::Wait(Waiter::Object(slot)),
                            Acquire::Load => self.load(office, thread, index, slot),
                        }
                    }
                    self.stage = Stage::PreAdminister;
                }
                Stage::PreAdminister => {
                    if let Err(escalation) = self.administer(office, thread, &metadata.pre_administration) {
                        return Step::Escalate(escalation);
                    }
                    if let Err(escalation) = self.enrol(office, thread, metadata) {
                        return Step::Escalate(escalation);
                    }
                    self.stage = Stage::Body;
                }
                Stage::Body => {
                    let objects = match metadata
                        .objects
                        .iter()
                        .map(|index| self.loaded(thread, *index))
                        .collect::<Result<Vec<_>, _>>()
                    {
                        Ok(objects) => objects,
                        Err(escalation) => return Step::Escalate(escalation),
                    };
                    let mut flows = Vec::new();
                    let mut ctx = FunctionContext {
                        function: metadata,
                        parameter: self.parameter.as_ref(),
                        objects: &objects,
                        flows: &mut flows,
                        latch: &self.latch,
                        office,
                        process: thread.process.id,
                    };
                    let during = format!("function '{}'", metadata.name);
                    let outcome = guarded(&during, || metadata.body.execute(&mut ctx));
                    self.flows = flows;
                    match outcome {
                        Ok(result) => {
                            self.result = result;
                            self.stage = Stage::AwaitFlows;
                        }
                        Err(escalation) => return Step::Escalate(escalation),
                    }
                }
                Stage::AwaitFlows => {
                    if self.latch.outstanding() > 0 {
                        return Step::Wait(Waiter::Flows(self.latch.clone()));
                    }
                    if let Some(escalation) = self.latch.take_failure() {
                        return Step::Escalate(escalation);
                    }
                    self.stage = Stage::PostAdminister;
                }
                Stage::PostAdminister => {
                    if let Err(escalation) = self.enforce(office) {
                        return Step::Escalate(escalation);
                    }
                    if let Err(escalation) = self.administer(office, thread, &metadata.post_administration) {
                        return Step::Escalate(escalation);
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => {
                    return Step::Complete(Completion {
                        argument: self.result.take().or_else(|| self.parameter.clone()),
                        flows: std::mem::take(&mut self.flows),
                        next: metadata.next,
                    });
                }
            }
        }
    }

    /// Order in which the exclusive objects of this function are taken.
    ///
    /// A thread only ever blocks on an index above everything it holds.
    /// When a needed index sits below one already held, the held set is
    /// given up and the union is taken again from the lowest index.
    fn plan_exclusive(
        &self,
        office: &Arc<OfficeInner>,
        thread: &ThreadState,
        needed: &[usize],
    ) -> Vec<usize> {
        let held = thread.held_exclusive.lock().clone();
        let Some(highest) = held.iter().max().copied() else {
            return needed.to_vec();
        };
        let out_of_order = needed
            .iter()
            .any(|index| *index < highest && !held.contains(index));
        if !out_of_order {
            return needed.to_vec();
        }
        tracing::debug!("{} re-acquiring exclusive objects in order", thread.id);
        office.release_exclusive(thread);
        let mut plan: Vec<usize> = held.into_iter().chain(needed.iter().copied()).collect();
        plan.sort_unstable();
        plan.dedup();
        plan
    }

    /// Source the object at `index`; its slot has just become loading
    fn load(
        &self,
        office: &Arc<OfficeInner>,
        thread: &Arc<ThreadState>,
        index: ManagedObjectIndex,
        slot: Arc<ObjectSlot>,
    ) {
        let weak = Arc::downgrade(office);
        self.container(thread, index.scope).record_load(index.index);
        let metadata = office.metadata.object(self.function, index);

        let dependencies = match metadata
            .dependencies
            .iter()
            .map(|dependency| self.loaded(thread, *dependency))
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(dependencies) => dependencies,
            Err(escalation) => {
                settle(&weak, &slot, Err(escalation));
                return;
            }
        };

        let asset = {
            let weak = weak.clone();
            let slot = slot.clone();
            office.assets.register(
                format!("managed object '{}'", metadata.name),
                Some(thread.process.id),
                metadata.timeout,
                move |escalation| settle(&weak, &slot, Err(escalation)),
            )
        };
        slot.track(asset.clone());
        let user = ObjectUser::new(
            metadata.name.clone(),
            slot.clone(),
            asset.clone(),
            weak.clone(),
            metadata.source.clone(),
        );
        tracing::trace!("sourcing managed object '{}'", metadata.name);
        let sourced = catch_unwind(AssertUnwindSafe(|| {
            metadata.source.source(&dependencies, user)
        }));
        if let Err(payload) = sourced {
            if asset.complete() {
                let during = format!("sourcing '{}'", metadata.name);
                settle(&weak, &slot, Err(Escalation::panic(&during, &*payload)));
            }
        }
    }

    fn administer(
        &self,
        office: &OfficeInner,
        thread: &ThreadState,
        administrations: &[BoundAdministration],
    ) -> Result<(), Escalation> {
        for bound in administrations {
            let admin = &office.metadata.administrations[bound.administration.0];
            let extensions = bound
                .objects
                .iter()
                .map(|index| self.loaded(thread, *index))
                .collect::<Result<Vec<_>, _>>()?;
            let during = format!("administration '{}'", admin.name);
            guarded(&during, || admin.duty.administer(&extensions))?;
        }
        Ok(())
    }

    fn enrol(
        &mut self,
        office: &OfficeInner,
        thread: &ThreadState,
        metadata: &FunctionMetaData,
    ) -> Result<(), Escalation> {
        for bound in &metadata.governance {
            let governance = &office.metadata.governances[bound.governance.0];
            let extensions = bound
                .enrolled
                .iter()
                .map(|index| self.loaded(thread, *index))
                .collect::<Result<Vec<_>, _>>()?;
            let during = format!("governance '{}'", governance.name);
            for extension in &extensions {
                guarded(&during, || governance.governance.enrol(extension))?;
            }
            self.governed.push((bound.governance, extensions));
        }
        Ok(())
    }

    fn enforce(
        &mut self,
        office: &OfficeInner,
    ) -> Result<(), Escalation> {
        while !self.governed.is_empty() {
            let (index, extensions) = self.governed.remove(0);
            let governance = &office.metadata.governances[index.0];
            let during = format!("governance '{}'", governance.name);
            guarded(&during, || governance.governance.enforce(&extensions))?;
        }
        Ok(())
    }

    /// Disregard active governance and release function objects after an
    /// escalation (or cancellation)
    pub fn abandon(
        &mut self,
        office: &OfficeInner,
    ) {
        for (index, extensions) in self.governed.drain(..) {
            let governance = &office.metadata.governances[index.0];
            let during = format!("governance '{}'", governance.name);
            if let Err(escalation) = guarded(&during, || governance.governance.disregard(&extensions)) {
                tracing::warn!("disregarding {} failed: {}", governance.name, escalation);
            }
        }
        self.finish(office);
    }

    /// Release function-scope objects
    pub fn finish(
        &mut self,
        office: &OfficeInner,
    ) {
        let metadata = office.metadata.function(self.function);
        self.objects.release_all(&metadata.function_objects);
    }
}
