//! Runtime system
//!
//! Teams that run jobs, the asset manager that times out asynchronous work,
//! and the engine that executes bound offices on both.

pub mod asset;
pub mod engine;
pub mod team;
