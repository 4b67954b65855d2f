//! Repository trait definitions ("ports").
//!
//! One trait per entity family. Implementations live in `cronflow-infra`
//! (SQLite); tests provide in-memory versions. All traits use native async
//! fn in traits (Rust 2024 edition, no async_trait macro).

pub mod execution;
pub mod job;
pub mod log;
pub mod workflow;

pub use execution::ExecutionRepository;
pub use job::JobRepository;
pub use log::LogRepository;
pub use workflow::WorkflowRepository;
