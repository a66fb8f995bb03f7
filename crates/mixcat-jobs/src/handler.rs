//! Job handlers and execution outcomes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use mixcat_core::{Error, Job, WorkerType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// The staged record this job operates on, if any.
    pub fn staged_id(&self) -> Option<Uuid> {
        self.job.staged_id
    }

    /// Get the job payload.
    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobOutcome {
    /// Job completed successfully.
    Success,
    /// Job failed permanently; no retry (malformed payload, config bug).
    Failed(String),
    /// Job failed transiently; retried with backoff until attempts run out.
    Retry(String),
}

impl JobOutcome {
    /// Map a pipeline error onto the retry policy.
    pub fn from_error(error: &Error) -> Self {
        if error.is_retryable() {
            JobOutcome::Retry(error.to_string())
        } else {
            JobOutcome::Failed(error.to_string())
        }
    }
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The worker type this handler processes.
    fn worker_type(&self) -> WorkerType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobOutcome;

    /// Check if this handler can process the given worker type.
    fn can_handle(&self, worker_type: WorkerType) -> bool {
        self.worker_type() == worker_type
    }
}

/// No-op handler for testing.
pub struct NoOpHandler {
    worker_type: WorkerType,
}

impl NoOpHandler {
    /// Create a new no-op handler for the given worker type.
    pub fn new(worker_type: WorkerType) -> Self {
        Self { worker_type }
    }
}

#[async_trait]
impl JobHandler for NoOpHandler {
    fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    async fn execute(&self, _ctx: JobContext) -> JobOutcome {
        JobOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_job(worker_type: WorkerType) -> Job {
        Job {
            id: Uuid::new_v4(),
            worker_type,
            staged_id: Some(Uuid::new_v4()),
            payload: Some(serde_json::json!({"key": "value"})),
            status: mixcat_core::JobStatus::Pending,
            attempts: 0,
            max_attempts: 3,
            error_message: None,
            last_run_at: None,
            next_run_at: Utc::now(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    #[test]
    fn test_job_context_accessors() {
        let job = sample_job(WorkerType::Canonicalize);
        let ctx = JobContext::new(job.clone());
        assert_eq!(ctx.staged_id(), job.staged_id);
        assert_eq!(ctx.payload().unwrap()["key"], "value");
    }

    #[tokio::test]
    async fn test_noop_handler() {
        let handler = NoOpHandler::new(WorkerType::Canonicalize);
        assert_eq!(handler.worker_type(), WorkerType::Canonicalize);
        assert!(handler.can_handle(WorkerType::Canonicalize));
        assert!(!handler.can_handle(WorkerType::FetchAndStage));

        let ctx = JobContext::new(sample_job(WorkerType::Canonicalize));
        assert!(matches!(handler.execute(ctx).await, JobOutcome::Success));
    }

    #[test]
    fn test_outcome_from_error_follows_retry_policy() {
        let transient = Error::Internal("store hiccup".into());
        assert!(matches!(
            JobOutcome::from_error(&transient),
            JobOutcome::Retry(_)
        ));

        let terminal = Error::Validation("bad payload".into());
        assert!(matches!(
            JobOutcome::from_error(&terminal),
            JobOutcome::Failed(_)
        ));
    }
}
