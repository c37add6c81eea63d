//! Durable triage job queue.

mod config;
mod policy;
mod service;
mod sqlite_store;
mod store;
mod types;

pub use config::QueueConfig;
pub use policy::{RetryDecision, RetryPolicy};
pub use service::TriageQueue;
pub use sqlite_store::SqliteJobStore;
pub use store::JobStore;
pub use types::{JobCounts, JobFilter, JobState, QueueError, TriageJob};
