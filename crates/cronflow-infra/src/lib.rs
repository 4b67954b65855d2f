//! Infrastructure layer for Cronflow.
//!
//! Contains implementations of the repository traits defined in
//! `cronflow-core`: SQLite storage with split read/write pools, plus the
//! configuration loader.

pub mod config;
pub mod sqlite;
