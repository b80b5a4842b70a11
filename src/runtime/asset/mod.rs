//! Asset manager: outstanding asynchronous operations and their timeouts
//!
//! Every asynchronous managed object sourcing and every asynchronous flow is
//! registered as an asset with a deadline. An asset leaves the manager in
//! exactly one of three ways: it is completed, it is cancelled, or it fails.
//! Failure happens either through a timeout found by
//! [`AssetManager::check_timeouts`] or because its owning process was torn
//! down ([`AssetManager::fail_owned_by`]). The failure callback registered
//! with the asset runs once, outside the manager's lock.
//!
//! [`AssetMonitor`] only detects timeouts on its polling thread. Failure
//! callbacks of timed out assets are delivered one after another on a
//! separate `asset-timeout` thread, so a callback that resumes a chain on a
//! passive team runs that chain there without holding up detection.

pub mod monitor;

pub use monitor::AssetMonitor;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::model::Escalation;
use crate::runtime::engine::ProcessId;

#[cfg(test)]
mod tests;

/// Asset identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(pub u64);

impl std::fmt::Display for AssetId {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "Asset({})", self.0)
    }
}

/// Called with the escalation when an asset fails
pub type FailureCallback = Box<dyn FnOnce(Escalation) + Send + 'static>;

struct AssetEntry {
    description: String,
    owner: Option<ProcessId>,
    registered_at: Instant,
    timeout: Duration,
    on_failure: FailureCallback,
}

impl AssetEntry {
    #[inline]
    fn deadline(&self) -> Instant {
        self.registered_at + self.timeout
    }
}

/// Snapshot of one outstanding asset, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInfo {
    pub id: AssetId,
    pub description: String,
    pub owner: Option<ProcessId>,
    pub age: Duration,
    pub timeout: Duration,
}

/// Asset counters
#[derive(Debug, Default)]
pub struct AssetStats {
    pub registered: AtomicUsize,
    pub completed: AtomicUsize,
    pub cancelled: AtomicUsize,
    pub timed_out: AtomicUsize,
    pub failed: AtomicUsize,
}

impl AssetStats {
    #[inline]
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    #[inline]
    pub fn timed_out(&self) -> usize {
        self.timed_out.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

/// Tracks outstanding assets.
#[derive(Default)]
pub struct AssetManager {
    assets: Mutex<IndexMap<AssetId, AssetEntry>>,
    next_id: AtomicU64,
    stats: AssetStats,
}

impl std::fmt::Debug for AssetManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AssetManager")
            .field("outstanding", &self.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl AssetManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an asset that fails with a timeout escalation unless it is
    /// completed or cancelled within `timeout`.
    pub fn register(
        self: &Arc<Self>,
        description: impl Into<String>,
        owner: Option<ProcessId>,
        timeout: Duration,
        on_failure: impl FnOnce(Escalation) + Send + 'static,
    ) -> AssetHandle {
        let id = AssetId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let entry = AssetEntry {
            description: description.into(),
            owner,
            registered_at: Instant::now(),
            timeout,
            on_failure: Box::new(on_failure),
        };
        tracing::trace!("{} registered: {}", id, entry.description);
        self.assets.lock().insert(id, entry);
        AssetStats::bump(&self.stats.registered);
        AssetHandle {
            id,
            manager: Arc::downgrade(self),
        }
    }

    fn remove(
        &self,
        id: AssetId,
    ) -> Option<AssetEntry> {
        self.assets.lock().shift_remove(&id)
    }

    /// Fail every asset whose deadline has passed at `now`.
    ///
    /// Returns the number of assets timed out.
    pub fn check_timeouts(
        &self,
        now: Instant,
    ) -> usize {
        let expired = self.expire(now);
        let count = expired.len();
        for asset in expired {
            asset.fail();
        }
        count
    }

    /// Remove every asset whose deadline has passed at `now` without
    /// running its failure callback
    pub fn expire(
        &self,
        now: Instant,
    ) -> Vec<ExpiredAsset> {
        let expired: Vec<ExpiredAsset> = {
            let mut assets = self.assets.lock();
            let ids: Vec<AssetId> = assets
                .iter()
                .filter(|(_, entry)| entry.deadline() <= now)
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| assets.shift_remove(&id).map(|entry| ExpiredAsset { id, entry }))
                .collect()
        };
        for asset in &expired {
            tracing::warn!(
                "{} timed out after {:?}: {}",
                asset.id,
                asset.entry.timeout,
                asset.entry.description
            );
            AssetStats::bump(&self.stats.timed_out);
        }
        expired
    }

    /// Fail every asset owned by `owner` with `escalation`.
    ///
    /// Returns the number of assets failed.
    pub fn fail_owned_by(
        &self,
        owner: ProcessId,
        escalation: &Escalation,
    ) -> usize {
        let owned: Vec<(AssetId, AssetEntry)> = {
            let mut assets = self.assets.lock();
            let ids: Vec<AssetId> = assets
                .iter()
                .filter(|(_, entry)| entry.owner == Some(owner))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| assets.shift_remove(&id).map(|entry| (id, entry)))
                .collect()
        };
        let count = owned.len();
        for (id, entry) in owned {
            tracing::debug!("{} failed with owner {}: {}", id, owner, escalation);
            AssetStats::bump(&self.stats.failed);
            (entry.on_failure)(escalation.clone());
        }
        count
    }

    /// Outstanding assets in registration order
    pub fn outstanding(&self) -> Vec<AssetInfo> {
        let now = Instant::now();
        self.assets
            .lock()
            .iter()
            .map(|(id, entry)| AssetInfo {
                id: *id,
                description: entry.description.clone(),
                owner: entry.owner,
                age: now.saturating_duration_since(entry.registered_at),
                timeout: entry.timeout,
            })
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn stats(&self) -> &AssetStats {
        &self.stats
    }
}

/// A timed out asset whose failure callback has not run yet
pub struct ExpiredAsset {
    id: AssetId,
    entry: AssetEntry,
}

impl std::fmt::Debug for ExpiredAsset {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("ExpiredAsset")
            .field("id", &self.id)
            .field("description", &self.entry.description)
            .finish()
    }
}

impl ExpiredAsset {
    #[inline]
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Run the failure callback with a timeout escalation
    pub fn fail(self) {
        let escalation = Escalation::timeout(&self.entry.description, self.entry.timeout);
        (self.entry.on_failure)(escalation);
    }
}

/// Handle held by whoever completes the asset.
#[derive(Debug, Clone)]
pub struct AssetHandle {
    id: AssetId,
    manager: Weak<AssetManager>,
}

impl AssetHandle {
    #[inline]
    pub fn id(&self) -> AssetId {
        self.id
    }

    /// Mark the asset complete.
    ///
    /// Returns `false` if the asset already left the manager (timed out,
    /// failed or cancelled); the caller then owns cleaning up its result.
    pub fn complete(&self) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        let removed = manager.remove(self.id).is_some();
        if removed {
            AssetStats::bump(&manager.stats.completed);
        }
        removed
    }

    /// Withdraw the asset without running its failure callback
    pub fn cancel(&self) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        match manager.remove(self.id) {
            Some(entry) => {
                tracing::debug!("{} cancelled: {}", self.id, entry.description);
                AssetStats::bump(&manager.stats.cancelled);
                true
            }
            None => false,
        }
    }

    /// Check whether the asset is still outstanding
    pub fn is_outstanding(&self) -> bool {
        self.manager
            .upgrade()
            .map(|m| m.assets.lock().contains_key(&self.id))
            .unwrap_or(false)
    }
}
