//! Utility modules: diagnostics, configuration and logging

pub mod config;
pub mod diagnostic;
pub mod logger;
