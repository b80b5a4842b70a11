//! OfficeFloor: an embeddable managed-function runtime
//!
//! Authors declare an office: teams, managed objects, functions with their
//! flows and escalation handlers, administration and governance. The
//! office is bound once into immutable metadata, then invoked any number of
//! times. Each invocation runs as a process whose function chain is
//! dispatched across the teams the functions are bound to.
//!
//! # Example
//!
//! ```
//! use officefloor::model::{object, FunctionConfig, OfficeConfig, TeamConfig};
//! use officefloor::OfficeBuilder;
//!
//! fn main() -> officefloor::Result<()> {
//!     let config = OfficeConfig::new("office")
//!         .team(TeamConfig::executor("T1", 1))
//!         .function(FunctionConfig::new("greet", |ctx| {
//!             let name = ctx.parameter_as::<&str>().copied().unwrap_or("world");
//!             Ok(Some(object(format!("hello {}", name))))
//!         }));
//!     let office = OfficeBuilder::new().build(&config)?;
//!     let outcome = office.invoke("greet", Some(object("office")))?.wait();
//!     assert!(outcome.is_ok());
//!     Ok(())
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod construct;
pub mod model;
pub mod office;
pub mod runtime;
pub mod util;

// Re-exports
pub use anyhow::{self, Context, Result};
pub use construct::{build_office, Compiled, ConstructionError, OfficeBuilder};
pub use model::{Escalation, Object, OfficeConfig};
pub use office::OfficeMetaData;
pub use runtime::engine::{
    AsynchronousFlow, EngineStats, FunctionContext, InvocationHandle, ObjectUser, Office,
    OfficeError, ProcessId, ProcessOutcome,
};
pub use util::config::RuntimeConfig;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
