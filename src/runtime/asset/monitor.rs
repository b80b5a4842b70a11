//! Background timeout polling

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};

use super::{AssetManager, ExpiredAsset};
use crate::runtime::team::TeamError;

/// Thread calling [`AssetManager::expire`] once per poll interval.
///
/// Expired assets are failed on a second thread so that slow failure
/// callbacks never delay the next poll. Stopped explicitly or on drop.
#[derive(Debug)]
pub struct AssetMonitor {
    stop: Option<Sender<()>>,
    worker: Option<thread::JoinHandle<()>>,
    dispatcher: Option<thread::JoinHandle<()>>,
}

impl AssetMonitor {
    pub fn start(
        manager: Arc<AssetManager>,
        poll_interval: Duration,
    ) -> Result<Self, TeamError> {
        let (expired, deliver) = channel::unbounded::<ExpiredAsset>();
        let dispatcher = thread::Builder::new()
            .name("asset-timeout".to_string())
            .spawn(move || {
                for asset in deliver {
                    asset.fail();
                }
            })
            .map_err(|source| TeamError::Spawn {
                team: "asset-timeout".to_string(),
                source,
            })?;

        let (stop, stopped) = channel::bounded::<()>(1);
        let ticker = channel::tick(poll_interval);
        let worker = thread::Builder::new()
            .name("asset-monitor".to_string())
            .spawn(move || loop {
                channel::select! {
                    recv(ticker) -> _ => {
                        for asset in manager.expire(Instant::now()) {
                            // dispatcher gone: fail on this thread instead
                            if let Err(unsent) = expired.send(asset) {
                                unsent.into_inner().fail();
                            }
                        }
                    }
                    recv(stopped) -> _ => break,
                }
            })
            .map_err(|source| TeamError::Spawn {
                team: "asset-monitor".to_string(),
                source,
            })?;
        tracing::debug!("asset monitor polling every {:?}", poll_interval);
        Ok(Self {
            stop: Some(stop),
            worker: Some(worker),
            dispatcher: Some(dispatcher),
        })
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn stop(&mut self) {
        // dropping the sender disconnects the stop channel
        self.stop.take();
        let current = thread::current().id();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == current {
                return;
            }
            if worker.join().is_err() {
                tracing::error!("asset monitor terminated abnormally");
            }
        }
        // the worker held the only sender, so the dispatcher ends once drained
        if let Some(dispatcher) = self.dispatcher.take() {
            if dispatcher.thread().id() != current && dispatcher.join().is_err() {
                tracing::error!("asset timeout dispatcher terminated abnormally");
            }
        }
    }
}

impl Drop for AssetMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
