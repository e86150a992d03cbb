//! Redis-backed job queue with reliable dequeue.
//!
//! Three Redis lists per queue name:
//!
//! - `{name}`: pending jobs
//! - `{name}:processing`: jobs currently held by a worker
//! - `{name}:dead_letter`: jobs that exhausted their attempts
//!
//! Dequeue uses BRPOPLPUSH so a job atomically moves to the processing
//! list; jobs held by a crashed worker are recovered on startup.

use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;
use uuid::Uuid;

use super::job::Job;

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Redis connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Redis operation failed: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Distributed FIFO job queue.
pub struct JobQueue {
    redis: ConnectionManager,
    queue_name: String,
    processing_queue: String,
    dead_letter_queue: String,
}

impl JobQueue {
    /// Connects to Redis.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| QueueError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_connection(redis, queue_name))
    }

    /// Builds a queue over an existing connection.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
            processing_queue: format!("{}:processing", queue_name),
            dead_letter_queue: format!("{}:dead_letter", queue_name),
        }
    }

    /// Enqueues a job at the back of the queue.
    pub async fn enqueue(&self, job: &Job) -> Result<(), QueueError> {
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Dequeues the next job, blocking for at most `timeout`.
    ///
    /// The job is moved atomically to the processing list; call
    /// [`JobQueue::ack`] when done with it.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<Job>, QueueError> {
        let mut conn = self.redis.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;
        let result: Option<String> = redis::cmd("BRPOPLPUSH")
            .arg(&self.queue_name)
            .arg(&self.processing_queue)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;
        match result {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    /// Removes a finished job from the processing list. Acking a job that
    /// is no longer there is a no-op.
    pub async fn ack(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.remove_from_processing(job_id).await
    }

    /// Returns a job to the back of the main queue for retry. The caller
    /// increments the attempt counter beforehand.
    pub async fn requeue(&self, job: &Job) -> Result<(), QueueError> {
        self.remove_from_processing(job.id).await?;
        let serialized = serde_json::to_string(job)?;
        let mut conn = self.redis.clone();
        conn.rpush::<_, _, ()>(&self.queue_name, serialized).await?;
        Ok(())
    }

    /// Moves a job to the dead letter queue with the final error attached.
    pub async fn dead_letter(&self, job: &Job, error: &str) -> Result<(), QueueError> {
        self.remove_from_processing(job.id).await?;
        let entry = serde_json::json!({
            "job": job,
            "error": error,
            "moved_at": chrono::Utc::now().to_rfc3339(),
        });
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.dead_letter_queue, serde_json::to_string(&entry)?)
            .await?;
        Ok(())
    }

    pub async fn len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        Ok(conn.llen(&self.queue_name).await?)
    }

    pub async fn processing_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        Ok(conn.llen(&self.processing_queue).await?)
    }

    pub async fn dead_letter_len(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        Ok(conn.llen(&self.dead_letter_queue).await?)
    }

    /// Moves jobs stranded in the processing list back into the main queue,
    /// counting the crash as one attempt. Called on worker startup.
    ///
    /// Returns the number of jobs recovered.
    pub async fn recover_processing_jobs(&self) -> Result<usize, QueueError> {
        let mut conn = self.redis.clone();
        let mut recovered = 0;

        let stranded: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;
        for data in stranded {
            let Ok(mut job) = serde_json::from_str::<Job>(&data) else {
                continue;
            };
            job.increment_attempts();
            if job.should_retry() {
                let serialized = serde_json::to_string(&job)?;
                let mut pipe = redis::pipe();
                pipe.atomic()
                    .lrem(&self.processing_queue, 1, &data)
                    .rpush(&self.queue_name, &serialized);
                pipe.query_async::<_, ()>(&mut conn).await?;
                recovered += 1;
            } else {
                self.dead_letter(&job, "recovered from processing queue after max attempts")
                    .await?;
            }
        }
        Ok(recovered)
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    async fn remove_from_processing(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.redis.clone();
        let jobs: Vec<String> = conn.lrange(&self.processing_queue, 0, -1).await?;
        for data in jobs {
            if let Ok(job) = serde_json::from_str::<Job>(&data) {
                if job.id == job_id {
                    conn.lrem::<_, _, ()>(&self.processing_queue, 1, &data)
                        .await?;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobKind;

    #[test]
    fn test_queue_error_display() {
        let err = QueueError::ConnectionFailed("timeout".to_string());
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_dead_letter_entry_structure() {
        let job = Job::new(JobKind::SyncRunStatus);
        let entry = serde_json::json!({
            "job": job,
            "error": "boom",
            "moved_at": chrono::Utc::now().to_rfc3339(),
        });
        let parsed: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&entry).unwrap()).unwrap();
        assert!(parsed.get("job").is_some());
        assert_eq!(parsed["error"], "boom");
    }
}
