//! Job/Execution/Log consistency subsystem.
//!
//! Three linked records describe one event run: the queued `Job`, its
//! concrete `Execution` attempt(s), and the user-facing `EventLog`. The
//! external agent writes the first two; crashes, duplicate writes, and
//! out-of-order updates can leave the trio disagreeing. This module keeps
//! them truthful:
//!
//! - `service` -- the `IntegrityService` with the repair/audit operations
//! - `report` -- the structured audit result types

pub mod report;
pub mod service;

pub use report::{IntegrityReport, MismatchedPair, OrphanCleanup, UnlinkedRepair};
pub use service::IntegrityService;
