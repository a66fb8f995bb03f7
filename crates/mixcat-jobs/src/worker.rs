//! The job processor loop: lease, execute, acknowledge.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mixcat_core::{defaults, Job, JobRepository, WorkerType};

use crate::handler::{JobContext, JobHandler, JobOutcome};

/// Configuration for the job processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Per-job execution timeout in seconds.
    pub exec_timeout_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            exec_timeout_secs: defaults::JOB_EXEC_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl ProcessorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_POLL_INTERVAL_MS` | `5000` | Polling interval when queue is empty |
    /// | `JOB_EXEC_TIMEOUT_SECS` | `600` | Per-job execution timeout |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let exec_timeout_secs = std::env::var("JOB_EXEC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_EXEC_TIMEOUT_SECS);

        Self {
            poll_interval_ms,
            exec_timeout_secs,
            enabled,
        }
    }

    /// Create a new config with custom poll interval.
    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the per-job execution timeout.
    pub fn with_exec_timeout(mut self, secs: u64) -> Self {
        self.exec_timeout_secs = secs;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job processor.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// A job was leased and started.
    JobStarted {
        job_id: Uuid,
        worker_type: WorkerType,
    },
    /// A job completed successfully.
    JobCompleted {
        job_id: Uuid,
        worker_type: WorkerType,
    },
    /// A job attempt failed (terminally or pending retry).
    JobFailed {
        job_id: Uuid,
        worker_type: WorkerType,
        error: String,
    },
    /// Processor started.
    ProcessorStarted,
    /// Processor stopped.
    ProcessorStopped,
}

/// Handle for controlling a running processor.
pub struct ProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl ProcessorHandle {
    /// Signal the processor to shut down gracefully.
    ///
    /// An in-flight job is released back to pending before the loop exits.
    pub async fn shutdown(&self) -> mixcat_core::Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| mixcat_core::Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for processor events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job processor that leases and executes jobs from the shared queue.
pub struct JobProcessor {
    jobs: Arc<dyn JobRepository>,
    config: ProcessorConfig,
    handlers: HashMap<WorkerType, Arc<dyn JobHandler>>,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobProcessor {
    /// Create a new job processor.
    pub fn new(jobs: Arc<dyn JobRepository>, config: ProcessorConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::WORKER_EVENT_CAPACITY);
        Self {
            jobs,
            config,
            handlers: HashMap::new(),
            event_tx,
        }
    }

    /// Register a handler for its worker type.
    pub fn register_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        let worker_type = handler.worker_type();
        self.handlers.insert(worker_type, Arc::new(handler));
        debug!(?worker_type, "Registered job handler");
        self
    }

    /// Get a receiver for processor events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the processor loop and return a handle for control.
    pub fn start(self) -> ProcessorHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        ProcessorHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// The cooperative polling loop: at most one job per iteration; the
    /// lease primitive makes N concurrent instances safe.
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job processor is disabled, not starting");
            return;
        }

        info!(
            subsystem = "jobs",
            component = "processor",
            op = "start",
            poll_interval_ms = self.config.poll_interval_ms,
            handler_count = self.handlers.len(),
            "Job processor started"
        );
        let _ = self.event_tx.send(WorkerEvent::ProcessorStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let worker_types: Vec<WorkerType> = self.handlers.keys().copied().collect();

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job processor received shutdown signal");
                break;
            }

            let leased = match self.jobs.lease_next_for_types(&worker_types).await {
                Ok(leased) => leased,
                Err(e) => {
                    error!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "lease_next",
                        error = %e,
                        "Failed to lease job"
                    );
                    None
                }
            };

            match leased {
                Some(job) => {
                    let job_id = job.id;
                    tokio::select! {
                        outcome = self.execute(&job) => {
                            self.ack(&job, outcome).await;
                        }
                        _ = shutdown_rx.recv() => {
                            // Never leave a running job orphaned: revert it
                            // to pending without consuming an attempt.
                            if let Err(e) = self.jobs.release(job_id).await {
                                error!(
                                    subsystem = "jobs",
                                    component = "processor",
                                    op = "release",
                                    job_id = %job_id,
                                    error = %e,
                                    "Failed to release in-flight job on shutdown"
                                );
                            } else {
                                info!(
                                    subsystem = "jobs",
                                    component = "processor",
                                    op = "release",
                                    job_id = %job_id,
                                    "Released in-flight job on shutdown"
                                );
                            }
                            break;
                        }
                    }
                }
                None => {
                    // Queue empty (or lease error): sleep before polling again.
                    tokio::select! {
                        _ = shutdown_rx.recv() => {
                            info!("Job processor received shutdown signal");
                            break;
                        }
                        _ = sleep(poll_interval) => {}
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::ProcessorStopped);
        info!("Job processor stopped");
    }

    /// Dispatch one leased job to its handler, bounded by the exec timeout.
    async fn execute(&self, job: &Job) -> JobOutcome {
        let start = Instant::now();
        info!(
            subsystem = "jobs",
            component = "processor",
            op = "execute",
            job_id = %job.id,
            worker_type = ?job.worker_type,
            attempts = job.attempts,
            "Processing job"
        );
        let _ = self.event_tx.send(WorkerEvent::JobStarted {
            job_id: job.id,
            worker_type: job.worker_type,
        });

        let Some(handler) = self.handlers.get(&job.worker_type) else {
            // Leases are filtered by registered types, so this is a bug.
            return JobOutcome::Failed(format!(
                "No handler for worker type: {:?}",
                job.worker_type
            ));
        };

        let timeout = Duration::from_secs(self.config.exec_timeout_secs);
        let ctx = JobContext::new(job.clone());
        let outcome = match tokio::time::timeout(timeout, handler.execute(ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!(
                    subsystem = "jobs",
                    component = "processor",
                    op = "execute",
                    job_id = %job.id,
                    "Job exceeded timeout of {}s",
                    self.config.exec_timeout_secs
                );
                JobOutcome::Retry(format!(
                    "Job exceeded timeout of {}s",
                    self.config.exec_timeout_secs
                ))
            }
        };

        debug!(
            subsystem = "jobs",
            component = "processor",
            op = "execute",
            job_id = %job.id,
            duration_ms = start.elapsed().as_millis() as u64,
            "Handler finished"
        );
        outcome
    }

    /// Record the outcome of one attempt.
    async fn ack(&self, job: &Job, outcome: JobOutcome) {
        match outcome {
            JobOutcome::Success => {
                if let Err(e) = self.jobs.complete(job.id).await {
                    error!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "complete",
                        job_id = %job.id,
                        error = %e,
                        "Failed to mark job as completed"
                    );
                } else {
                    info!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "complete",
                        job_id = %job.id,
                        worker_type = ?job.worker_type,
                        "Job completed successfully"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted {
                        job_id: job.id,
                        worker_type: job.worker_type,
                    });
                }
            }
            JobOutcome::Retry(error) => {
                // Backoff-or-fail policy lives in the repository.
                if let Err(e) = self.jobs.fail(job.id, &error).await {
                    error!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "fail",
                        job_id = %job.id,
                        error = %e,
                        "Failed to record job failure"
                    );
                } else {
                    warn!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "fail",
                        job_id = %job.id,
                        worker_type = ?job.worker_type,
                        %error,
                        "Job attempt failed, scheduled for retry"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id: job.id,
                        worker_type: job.worker_type,
                        error,
                    });
                }
            }
            JobOutcome::Failed(error) => {
                if let Err(e) = self.jobs.fail_terminal(job.id, &error).await {
                    error!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "fail_terminal",
                        job_id = %job.id,
                        error = %e,
                        "Failed to record terminal job failure"
                    );
                } else {
                    error!(
                        subsystem = "jobs",
                        component = "processor",
                        op = "fail_terminal",
                        job_id = %job.id,
                        worker_type = ?job.worker_type,
                        %error,
                        "Job failed permanently"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed {
                        job_id: job.id,
                        worker_type: job.worker_type,
                        error,
                    });
                }
            }
        }
    }
}
