//! Background job execution: Redis-backed queue and worker pool.
//!
//! Long-running operations (dataset builds, status sweeps, catalog import)
//! run as jobs so request handlers and the CLI never block on them. The
//! queue guarantees at-least-once dispatch; every job handler is idempotent.

pub mod job;
pub mod queue;
pub mod worker;

pub use job::{Job, JobKind};
pub use queue::{JobQueue, QueueError};
pub use worker::{JobContext, PoolError, WorkerPool, WorkerPoolConfig};
