//! Shared domain types for Cronflow.
//!
//! This crate contains the core domain types used across the Cronflow
//! automation platform: Job, Execution, EventLog, the workflow graph
//! entities, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror.

pub mod config;
pub mod error;
pub mod execution;
pub mod job;
pub mod log;
pub mod workflow;
