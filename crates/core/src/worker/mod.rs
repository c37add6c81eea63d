//! Triage worker: the per-job protocol and the pool that runs it.

mod config;
mod processor;
mod rate_limiter;
mod runner;
mod types;

pub use config::WorkerConfig;
pub use processor::TriageProcessor;
pub use rate_limiter::{StartLimiter, TokenBucket};
pub use runner::TriageWorkerPool;
pub use types::{JobOutcome, PoolStatus, TriageError};
