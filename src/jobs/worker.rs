//! Worker pool draining the job queue.
//!
//! Each worker is an independent tokio task holding a shared [`JobContext`].
//! Shutdown is signalled over a broadcast channel; workers finish their
//! current job before stopping.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::job::{Job, JobKind};
use super::queue::{JobQueue, QueueError};
use crate::dataset::DatasetBuilder;
use crate::orchestrator::OrchestratorClient;
use crate::run::{sync_all, sync_catalog};
use crate::store::TenantRegistry;

/// Errors that can occur in the worker pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Pool is already running")]
    AlreadyRunning,

    #[error("Pool is not running")]
    NotRunning,
}

/// Everything a worker needs to execute any job kind.
pub struct JobContext {
    pub registry: TenantRegistry,
    pub client: OrchestratorClient,
}

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub num_workers: usize,
    /// Block time per dequeue attempt.
    pub poll_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Pool of workers processing jobs from a shared queue.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<JobQueue>,
    context: Arc<JobContext>,
    shutdown_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
    running: bool,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig, queue: Arc<JobQueue>, context: Arc<JobContext>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            queue,
            context,
            shutdown_tx,
            handles: Vec::new(),
            running: false,
        }
    }

    /// Starts the workers. Jobs stranded by a previous crash are recovered
    /// first.
    pub async fn start(&mut self) -> Result<(), PoolError> {
        if self.running {
            return Err(PoolError::AlreadyRunning);
        }

        match self.queue.recover_processing_jobs().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "Recovered jobs from processing queue"),
            Err(e) => warn!(error = %e, "Could not recover processing jobs"),
        }

        for i in 0..self.config.num_workers {
            let worker = Worker {
                id: format!("worker-{}", i),
                queue: Arc::clone(&self.queue),
                context: Arc::clone(&self.context),
                shutdown_rx: self.shutdown_tx.subscribe(),
                poll_interval: self.config.poll_interval,
            };
            self.handles.push(tokio::spawn(worker.run()));
        }
        self.running = true;
        info!(num_workers = self.config.num_workers, "Worker pool started");
        Ok(())
    }

    /// Signals shutdown and waits for every worker to finish its current
    /// job.
    pub async fn shutdown(&mut self) -> Result<(), PoolError> {
        if !self.running {
            return Err(PoolError::NotRunning);
        }
        let _ = self.shutdown_tx.send(());
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked during shutdown");
            }
        }
        self.running = false;
        info!("Worker pool stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    context: Arc<JobContext>,
    shutdown_rx: broadcast::Receiver<()>,
    poll_interval: Duration,
}

impl Worker {
    async fn run(mut self) {
        info!(worker_id = %self.id, "Worker started");
        loop {
            match self.shutdown_rx.try_recv() {
                Ok(()) | Err(broadcast::error::TryRecvError::Closed) => break,
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Empty) => {}
            }

            match self.queue.dequeue(self.poll_interval).await {
                Ok(Some(job)) => self.process(job).await,
                Ok(None) => debug!(worker_id = %self.id, "No jobs available"),
                Err(e) => {
                    error!(worker_id = %self.id, error = %e, "Dequeue failed");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn process(&self, mut job: Job) {
        job.increment_attempts();
        info!(
            worker_id = %self.id,
            job_id = %job.id,
            kind = job.kind.name(),
            attempt = job.attempts,
            "Processing job"
        );

        match execute(&self.context, &job.kind).await {
            Ok(()) => {
                if let Err(e) = self.queue.ack(job.id).await {
                    error!(worker_id = %self.id, job_id = %job.id, error = %e, "Ack failed");
                }
                info!(worker_id = %self.id, job_id = %job.id, "Job finished");
            }
            Err(e) if job.should_retry() => {
                warn!(
                    worker_id = %self.id,
                    job_id = %job.id,
                    error = %e,
                    remaining_attempts = job.remaining_attempts(),
                    "Job failed, requeueing"
                );
                if let Err(requeue_err) = self.queue.requeue(&job).await {
                    error!(
                        worker_id = %self.id,
                        job_id = %job.id, error = %requeue_err, "Requeue failed"
                    );
                }
            }
            Err(e) => {
                error!(
                    worker_id = %self.id,
                    job_id = %job.id, error = %e, "Job failed, moving to dead letter queue"
                );
                if let Err(dlq_err) = self.queue.dead_letter(&job, &e.to_string()).await {
                    error!(
                        worker_id = %self.id,
                        job_id = %job.id, error = %dlq_err, "Dead letter failed"
                    );
                }
            }
        }
    }
}

/// Dispatches one job kind against the shared context.
async fn execute(context: &JobContext, kind: &JobKind) -> anyhow::Result<()> {
    match kind {
        JobKind::BuildDataset {
            tenant,
            dataframe_id,
            methods,
            product_ids,
        } => {
            let store = context.registry.store(tenant)?;
            DatasetBuilder::new(&store)
                .run(*dataframe_id, methods, product_ids.clone())
                .await?;
        }
        JobKind::SyncRunStatus => {
            sync_all(&context.registry, &context.client).await;
        }
        JobKind::SyncCatalog => {
            sync_catalog(&context.registry, &context.client).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_pool_error_display() {
        assert!(PoolError::AlreadyRunning.to_string().contains("already"));
        assert!(PoolError::NotRunning.to_string().contains("not running"));
    }
}
