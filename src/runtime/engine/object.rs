//! Managed object slots and the source-facing user handle

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::state::ThreadState;
use super::OfficeInner;
use crate::model::{Escalation, ManagedObjectSource, Object};
use crate::office::ManagedObjectMetaData;
use crate::runtime::asset::AssetHandle;

pub(crate) enum SlotState {
    Empty,
    /// Being sourced; threads that need the object queue here
    Loading {
        waiters: Vec<Arc<ThreadState>>,
        asset: Option<AssetHandle>,
    },
    Ready(Object),
    Failed(Escalation),
    Released,
}

/// Outcome of asking a slot for its object
pub(crate) enum Acquire {
    Ready,
    Failed(Escalation),
    /// Someone else is sourcing it
    Loading,
    /// The caller must source it (the slot is now loading)
    Load,
}

/// One managed object instance within a scope.
pub(crate) struct ObjectSlot {
    state: Mutex<SlotState>,
}

impl ObjectSlot {
    fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Empty),
        }
    }

    pub fn acquire(&self) -> Acquire {
        let mut state = self.state.lock();
        let settled = match &*state {
            SlotState::Ready(_) => Some(Acquire::Ready),
            SlotState::Failed(escalation) => Some(Acquire::Failed(escalation.clone())),
            SlotState::Released => Some(Acquire::Failed(Escalation::new(
                Escalation::EXCEPTION,
                "managed object used after its scope was torn down",
            ))),
            SlotState::Loading { .. } => Some(Acquire::Loading),
            SlotState::Empty => None,
        };
        if let Some(acquire) = settled {
            return acquire;
        }
        *state = SlotState::Loading {
            waiters: Vec::new(),
            asset: None,
        };
        Acquire::Load
    }

    /// Attach the asset tracking the sourcing in progress
    pub fn track(
        &self,
        handle: AssetHandle,
    ) {
        if let SlotState::Loading { asset, .. } = &mut *self.state.lock() {
            *asset = Some(handle);
        }
    }

    /// Queue `thread` until the object is resolved.
    ///
    /// Returns `false` if the slot is no longer loading.
    pub fn wait(
        &self,
        thread: &Arc<ThreadState>,
    ) -> bool {
        match &mut *self.state.lock() {
            SlotState::Loading { waiters, .. } => {
                waiters.push(thread.clone());
                true
            }
            _ => false,
        }
    }

    /// Settle a loading slot. Returns the threads to resume, or hands the
    /// object back if the slot was not loading.
    pub fn resolve(
        &self,
        result: Result<Object, Escalation>,
    ) -> Result<Vec<Arc<ThreadState>>, Option<Object>> {
        let mut state = self.state.lock();
        if !matches!(&*state, SlotState::Loading { .. }) {
            return Err(result.ok());
        }
        let previous = std::mem::replace(
            &mut *state,
            match result {
                Ok(object) => SlotState::Ready(object),
                Err(escalation) => SlotState::Failed(escalation),
            },
        );
        match previous {
            SlotState::Loading { waiters, .. } => Ok(waiters),
            _ => Ok(Vec::new()),
        }
    }

    pub fn get(&self) -> Option<Object> {
        match &*self.state.lock() {
            SlotState::Ready(object) => Some(object.clone()),
            _ => None,
        }
    }

    /// Tear the slot down, returning the object to release
    fn release(&self) -> Option<Object> {
        let previous = std::mem::replace(&mut *self.state.lock(), SlotState::Released);
        match previous {
            SlotState::Ready(object) => Some(object),
            SlotState::Loading {
                asset: Some(asset), ..
            } => {
                asset.cancel();
                None
            }
            _ => None,
        }
    }
}

/// The managed objects of one scope, released in reverse load order.
pub(crate) struct ObjectContainer {
    slots: Vec<Arc<ObjectSlot>>,
    load_order: Mutex<Vec<usize>>,
}

impl ObjectContainer {
    pub fn new(size: usize) -> Self {
        Self {
            slots: (0..size).map(|_| Arc::new(ObjectSlot::new())).collect(),
            load_order: Mutex::new(Vec::with_capacity(size)),
        }
    }

    #[inline]
    pub fn slot(
        &self,
        index: usize,
    ) -> &Arc<ObjectSlot> {
        &self.slots[index]
    }

    /// Note that sourcing of `index` started
    pub fn record_load(
        &self,
        index: usize,
    ) {
        self.load_order.lock().push(index);
    }

    /// Release every loaded object, most recently loaded first
    pub fn release_all(
        &self,
        metadata: &[ManagedObjectMetaData],
    ) {
        let order: Vec<usize> = std::mem::take(&mut *self.load_order.lock());
        for index in order.into_iter().rev() {
            let Some(object) = self.slots[index].release() else {
                continue;
            };
            let meta = &metadata[index];
            tracing::trace!("releasing managed object '{}'", meta.name);
            let released = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                meta.source.release(&object)
            }));
            if released.is_err() {
                tracing::error!("releasing managed object '{}' panicked", meta.name);
            }
        }
    }
}

/// Handed to a [`ManagedObjectSource`] to deliver the sourced object.
///
/// Either [`provide`](Self::provide) or [`fail`](Self::fail) completes the
/// sourcing, from any thread. Dropping the user without completing it fails
/// the object.
pub struct ObjectUser {
    name: String,
    slot: Arc<ObjectSlot>,
    asset: Option<AssetHandle>,
    office: Weak<OfficeInner>,
    source: Arc<dyn ManagedObjectSource>,
}

impl std::fmt::Debug for ObjectUser {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ObjectUser")
            .field("name", &self.name)
            .field("completed", &self.asset.is_none())
            .finish()
    }
}

impl ObjectUser {
    pub(crate) fn new(
        name: String,
        slot: Arc<ObjectSlot>,
        asset: AssetHandle,
        office: Weak<OfficeInner>,
        source: Arc<dyn ManagedObjectSource>,
    ) -> Self {
        Self {
            name,
            slot,
            asset: Some(asset),
            office,
            source,
        }
    }

    /// Name of the object being sourced
    #[inline]
    pub fn object_name(&self) -> &str {
        &self.name
    }

    /// Deliver the object
    pub fn provide(
        mut self,
        object: Object,
    ) {
        self.finish(Ok(object));
    }

    /// Report that the object could not be sourced
    pub fn fail(
        mut self,
        escalation: Escalation,
    ) {
        self.finish(Err(escalation));
    }

    fn finish(
        &mut self,
        result: Result<Object, Escalation>,
    ) {
        let Some(asset) = self.asset.take() else {
            return;
        };
        if !asset.complete() {
            // lost against a timeout or cancellation
            if let Ok(object) = result {
                self.source.release(&object);
            }
            return;
        }
        match self.slot.resolve(result) {
            Ok(waiters) => {
                if let Some(office) = self.office.upgrade() {
                    for thread in waiters {
                        office.resume(thread);
                    }
                }
            }
            Err(Some(object)) => self.source.release(&object),
            Err(None) => {}
        }
    }
}

impl Drop for ObjectUser {
    fn drop(&mut self) {
        // a panicking source is failed by the engine
        if self.asset.is_none() || std::thread::panicking() {
            return;
        }
        let escalation = Escalation::new(
            Escalation::EXCEPTION,
            format!("source of '{}' dropped its user without providing an object", self.name),
        );
        self.finish(Err(escalation));
    }
}

/// Settle `slot` with `result` and resume its waiters
pub(crate) fn settle(
    office: &Weak<OfficeInner>,
    slot: &ObjectSlot,
    result: Result<Object, Escalation>,
) {
    if let Ok(waiters) = slot.resolve(result) {
        if let Some(office) = office.upgrade() {
            for thread in waiters {
                office.resume(thread);
            }
        }
    }
}
