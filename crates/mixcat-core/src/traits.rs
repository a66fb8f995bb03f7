//! Core traits for mixcat abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability. The PostgreSQL
//! implementations live in `mixcat-db`; unit tests use in-memory fakes.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::external_id::{ExternalIdSet, Provider};
use crate::models::*;

// =============================================================================
// STAGING
// =============================================================================

/// Repository for staged (not-yet-canonical) records.
#[async_trait]
pub trait StagingRepository: Send + Sync {
    /// Insert a record unless its `source_url` is already staged.
    ///
    /// Atomic insert-if-absent (`ON CONFLICT DO NOTHING`); returns the new
    /// row's ID, or `None` when the URL was already present.
    async fn insert_if_absent(&self, record: NewStagedRecord) -> Result<Option<Uuid>>;

    /// Stage a batch of fetched records, counting inserts and skips.
    async fn insert_batch(&self, records: Vec<NewStagedRecord>) -> Result<IngestStats>;

    /// Fetch a staged record by ID.
    async fn get(&self, id: Uuid) -> Result<Option<StagedRecord>>;

    /// Exact lookup by source URL.
    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<StagedRecord>>;

    /// Exact lookup by namespaced external identifier.
    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<StagedRecord>>;

    /// Transition pending → processing.
    async fn mark_processing(&self, id: Uuid) -> Result<()>;

    /// Transition processing → canonicalized, recording the canonical entity.
    async fn mark_canonicalized(&self, id: Uuid, entity_id: Uuid) -> Result<()>;

    /// Transition to failed with the captured error.
    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()>;

    /// Reset a failed record to pending so it can be re-processed.
    async fn requeue_failed(&self, id: Uuid) -> Result<()>;
}

// =============================================================================
// CANONICAL CATALOG
// =============================================================================

/// Repository for canonical catalog entities.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// All artist candidates for fuzzy scoring.
    async fn artist_candidates(&self) -> Result<Vec<MatchCandidate>>;

    /// Artist candidates whose name contains `needle` (case-insensitive).
    async fn artist_candidates_like(&self, needle: &str) -> Result<Vec<MatchCandidate>>;

    /// All track candidates for fuzzy scoring.
    async fn track_candidates(&self) -> Result<Vec<MatchCandidate>>;

    /// Create an unverified artist.
    async fn create_artist(&self, name: &str) -> Result<Uuid>;

    /// Create an unverified track.
    async fn create_track(&self, title: &str, artist_id: Option<Uuid>) -> Result<Uuid>;

    /// Create an unverified mix.
    async fn create_mix(&self, mix: NewMix) -> Result<Uuid>;

    /// Fetch a mix by ID.
    async fn get_mix(&self, id: Uuid) -> Result<Option<Mix>>;

    /// Persist merged mix fields (title, description, external IDs, ...).
    async fn update_mix(&self, mix: &Mix) -> Result<()>;

    /// Mixes whose external-ID sets share at least one provider key with
    /// `ids` (key presence only — value overlap is the caller's check).
    async fn mixes_with_any_provider_key(&self, ids: &ExternalIdSet) -> Result<Vec<Mix>>;

    /// Find a context by `(type, name)` or create it.
    ///
    /// `verified_by` is only ever supplied under the auto-verify
    /// configuration; newly created entities are otherwise unverified.
    async fn find_or_create_context(
        &self,
        context_type: ContextType,
        name: &str,
        verified_by: Option<&str>,
    ) -> Result<Uuid>;

    /// Find a venue by name or create it.
    async fn find_or_create_venue(&self, name: &str, verified_by: Option<&str>) -> Result<Uuid>;

    /// Associate a context with a mix (idempotent).
    async fn link_context(&self, mix_id: Uuid, context_id: Uuid) -> Result<()>;

    /// Associate a venue with a mix (idempotent).
    async fn link_venue(&self, mix_id: Uuid, venue_id: Uuid) -> Result<()>;

    /// Persist a rule application for review or audit.
    async fn insert_rule_application(&self, application: NewRuleApplication) -> Result<Uuid>;
}

// =============================================================================
// CONTEXT RULES
// =============================================================================

/// Read-only access to the context rule store.
///
/// Rule lifecycle (creation, activation, versioning) is managed by external
/// tooling; the engine only ever lists what is currently active.
#[async_trait]
pub trait RuleRepository: Send + Sync {
    /// Active rules ordered by ascending priority, then descending
    /// confidence weight.
    async fn list_active(&self) -> Result<Vec<ContextRule>>;
}

// =============================================================================
// JOBS
// =============================================================================

/// Repository for the shared job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        worker_type: WorkerType,
        staged_id: Option<Uuid>,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Queue a job unless an equivalent pending/running job exists for the
    /// same staged record. Returns `None` when deduplicated away.
    async fn queue_deduplicated(
        &self,
        worker_type: WorkerType,
        staged_id: Option<Uuid>,
        payload: Option<JsonValue>,
    ) -> Result<Option<Uuid>>;

    /// Atomically lease the next due pending job (FIFO by creation time).
    ///
    /// The selected row transitions pending → running invisibly to
    /// concurrent lease attempts (`FOR UPDATE SKIP LOCKED`).
    async fn lease_next(&self) -> Result<Option<Job>>;

    /// Lease the next due pending job whose type is in `worker_types`.
    /// An empty slice means "lease any type".
    async fn lease_next_for_types(&self, worker_types: &[WorkerType]) -> Result<Option<Job>>;

    /// Revert a running job to pending without counting an attempt.
    ///
    /// Used on shutdown so an in-flight job is never left orphaned.
    async fn release(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Record a retryable failure: increments attempts and either
    /// reschedules with exponential backoff or fails permanently once
    /// attempts are exhausted.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Fail a job permanently regardless of remaining attempts
    /// (validation errors are never retried).
    async fn fail_terminal(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Get a job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Queue statistics summary.
    async fn queue_stats(&self) -> Result<QueueStats>;
}

// =============================================================================
// SOURCE FETCHERS
// =============================================================================

/// A platform-specific fetcher producing raw records for staging.
///
/// Implementations (YouTube API pagination, SoundCloud scraping, ...) live
/// outside this workspace and register with the fetch-and-stage handler.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// The platform this fetcher pulls from.
    fn provider(&self) -> Provider;

    /// Fetch a batch of raw records described by the job payload.
    async fn fetch(&self, payload: Option<&JsonValue>) -> Result<Vec<NewStagedRecord>>;
}
