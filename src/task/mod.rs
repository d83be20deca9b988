//! Task module - analysis task records, their store, and the background runner.
//!
//! State machine: `pending -> running -> completed | failed | cancelled`.
//! A pending task can also go straight to `cancelled` or `failed`.

pub mod runner;
pub mod store;

pub use runner::{SubmitError, TaskRunner, SWEEP_INTERVAL};
pub use store::{SharedTaskStore, TaskKind, TaskOutput, TaskRecord, TaskStatus, TaskStore};
