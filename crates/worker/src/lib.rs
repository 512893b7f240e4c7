//! `voxbench-worker` library crate.
//!
//! The binary entrypoint lives in `main.rs`; the modules are exposed so
//! integration tests can drive the worker against fake services.

pub mod backend;
pub mod collector;
pub mod config;
pub mod controller;
pub mod pipeline;
pub mod queue;
pub mod readiness;
pub mod report;
pub mod storage;
