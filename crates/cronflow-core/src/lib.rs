//! Business logic and repository trait definitions for Cronflow.
//!
//! This crate defines the "ports" (repository traits) that the infrastructure
//! layer implements, the integrity engine keeping Job/Execution/Log rows
//! mutually consistent, and the workflow graph driver. It depends only on
//! `cronflow-types` -- never on `cronflow-infra` or any database/IO crate.

pub mod integrity;
pub mod repository;
pub mod workflow;
