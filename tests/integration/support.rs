//! Shared test doubles

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use officefloor::model::{object, FunctionConfig, ManagedObjectSource, Object};
use officefloor::{Office, OfficeBuilder, OfficeConfig, ProcessOutcome, RuntimeConfig};
use parking_lot::Mutex;

/// Upper bound for any single test wait
pub const WAIT: Duration = Duration::from_secs(5);

/// Shared ordered log
#[derive(Clone, Default)]
pub struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    pub fn push(
        &self,
        entry: impl Into<String>,
    ) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Shared counter
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Source providing its own name and logging releases
pub struct RecordingSource {
    pub name: &'static str,
    pub log: Log,
}

impl ManagedObjectSource for RecordingSource {
    fn source(
        &self,
        _dependencies: &[Object],
        user: officefloor::ObjectUser,
    ) {
        self.log.push(format!("source {}", self.name));
        user.provide(object(self.name));
    }

    fn release(
        &self,
        _object: &Object,
    ) {
        self.log.push(format!("release {}", self.name));
    }
}

/// Source that keeps the user and never completes it
#[derive(Default)]
pub struct StalledSource {
    pub users: Arc<Mutex<Vec<officefloor::ObjectUser>>>,
}

impl ManagedObjectSource for StalledSource {
    fn source(
        &self,
        _dependencies: &[Object],
        user: officefloor::ObjectUser,
    ) {
        self.users.lock().push(user);
    }
}

/// Function appending its name to `log`
pub fn logging(
    name: &'static str,
    log: &Log,
) -> FunctionConfig {
    let log = log.clone();
    FunctionConfig::new(name, move |_ctx| {
        log.push(name);
        Ok(None)
    })
}

pub fn build(config: OfficeConfig) -> Office {
    OfficeBuilder::new().build(&config).unwrap()
}

/// Runtime configuration polling assets every 10ms
pub fn fast_config() -> RuntimeConfig {
    RuntimeConfig {
        asset_poll_interval_ms: 10,
        ..RuntimeConfig::default()
    }
}

pub fn build_fast(config: OfficeConfig) -> Office {
    OfficeBuilder::with_config(fast_config())
        .build(&config)
        .unwrap()
}

pub fn run(
    office: &Office,
    function: &str,
    parameter: Option<Object>,
) -> ProcessOutcome {
    office
        .invoke(function, parameter)
        .unwrap()
        .wait_timeout(WAIT)
        .expect("process did not complete in time")
}
