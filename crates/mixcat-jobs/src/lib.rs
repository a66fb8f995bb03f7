//! # mixcat-jobs
//!
//! Background job processor for mixcat.
//!
//! A [`JobProcessor`] runs a single-threaded cooperative polling loop:
//! lease one due job through the store's atomic lease primitive, dispatch it
//! to the handler registered for its worker type, acknowledge the outcome,
//! sleep when the queue is empty. Multiple processor instances may run
//! against the same store — coordination happens entirely in the lease.
//!
//! Shutdown mid-execution releases the in-flight job back to `pending`; a
//! `running` job is never left orphaned.

pub mod handler;
pub mod handlers;
pub mod telemetry;
pub mod worker;

pub use handler::{JobContext, JobHandler, JobOutcome, NoOpHandler};
pub use handlers::{CanonicalizeHandler, FetchHandler};
pub use telemetry::init_tracing;
pub use worker::{JobProcessor, ProcessorConfig, ProcessorHandle, WorkerEvent};
