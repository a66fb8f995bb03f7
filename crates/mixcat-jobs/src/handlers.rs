//! Handlers for the two worker capabilities: fetch-and-stage and
//! canonicalize.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use uuid::Uuid;

use mixcat_canon::Canonicalizer;
use mixcat_core::{
    IngestStats, JobRepository, Provider, SourceFetcher, StagingRepository, WorkerType,
};

use crate::handler::{JobContext, JobHandler, JobOutcome};

/// Promotes one staged record into the canonical catalog.
pub struct CanonicalizeHandler {
    canonicalizer: Arc<Canonicalizer>,
}

impl CanonicalizeHandler {
    pub fn new(canonicalizer: Arc<Canonicalizer>) -> Self {
        Self { canonicalizer }
    }
}

#[async_trait]
impl JobHandler for CanonicalizeHandler {
    fn worker_type(&self) -> WorkerType {
        WorkerType::Canonicalize
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        let Some(staged_id) = ctx.staged_id() else {
            // Malformed job; retrying cannot help.
            return JobOutcome::Failed("canonicalize job has no staged_id".into());
        };

        match self.canonicalizer.process(staged_id).await {
            Ok(outcome) => {
                info!(
                    subsystem = "jobs",
                    component = "canonicalize_handler",
                    op = "execute",
                    staged_id = %staged_id,
                    entity_id = %outcome.entity_id(),
                    "Canonicalization finished"
                );
                JobOutcome::Success
            }
            Err(e) => JobOutcome::from_error(&e),
        }
    }
}

/// Pulls raw records from a registered source fetcher into staging, then
/// queues a canonicalize job for every newly staged record.
///
/// Fetcher implementations live outside this workspace; the handler only
/// dispatches on the `provider` field of the job payload.
pub struct FetchHandler {
    staging: Arc<dyn StagingRepository>,
    jobs: Arc<dyn JobRepository>,
    fetchers: HashMap<Provider, Arc<dyn SourceFetcher>>,
}

impl FetchHandler {
    pub fn new(staging: Arc<dyn StagingRepository>, jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            staging,
            jobs,
            fetchers: HashMap::new(),
        }
    }

    /// Register a source fetcher for its provider.
    pub fn register_fetcher<F: SourceFetcher + 'static>(mut self, fetcher: F) -> Self {
        self.fetchers.insert(fetcher.provider(), Arc::new(fetcher));
        self
    }

    async fn fetch_and_stage(&self, ctx: &JobContext) -> mixcat_core::Result<IngestStats> {
        let provider_name = ctx
            .payload()
            .and_then(|p| p.get("provider"))
            .and_then(|p| p.as_str())
            .ok_or_else(|| {
                mixcat_core::Error::Validation("fetch job payload has no provider".into())
            })?;
        let provider = Provider::parse(provider_name)?;

        let fetcher = self.fetchers.get(&provider).ok_or_else(|| {
            mixcat_core::Error::Config(format!("no fetcher registered for {provider}"))
        })?;

        let records = fetcher.fetch(ctx.payload()).await?;
        let mut stats = IngestStats::default();
        let mut staged_ids: Vec<Uuid> = Vec::new();

        for record in records {
            match self.staging.insert_if_absent(record).await? {
                Some(id) => {
                    stats.mixes_added += 1;
                    staged_ids.push(id);
                }
                None => stats.duplicates_skipped += 1,
            }
        }

        // Queue follow-up canonicalization; deduplicated in case a previous
        // attempt of this job already queued some of them.
        for staged_id in staged_ids {
            if let Err(e) = self
                .jobs
                .queue_deduplicated(WorkerType::Canonicalize, Some(staged_id), None)
                .await
            {
                warn!(
                    subsystem = "jobs",
                    component = "fetch_handler",
                    op = "queue_canonicalize",
                    staged_id = %staged_id,
                    error = %e,
                    "Failed to queue canonicalize job"
                );
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl JobHandler for FetchHandler {
    fn worker_type(&self) -> WorkerType {
        WorkerType::FetchAndStage
    }

    async fn execute(&self, ctx: JobContext) -> JobOutcome {
        match self.fetch_and_stage(&ctx).await {
            Ok(stats) => {
                info!(
                    subsystem = "jobs",
                    component = "fetch_handler",
                    op = "execute",
                    mixes_added = stats.mixes_added,
                    duplicates_skipped = stats.duplicates_skipped,
                    "Fetch pass staged records"
                );
                JobOutcome::Success
            }
            Err(e) => JobOutcome::from_error(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use mixcat_core::{
        Job, JobStatus, NewStagedRecord, QueueStats, Result, StagedKind, StagedRecord,
    };
    use serde_json::{json, Value as JsonValue};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStaging {
        records: Mutex<Vec<StagedRecord>>,
    }

    #[async_trait]
    impl StagingRepository for RecordingStaging {
        async fn insert_if_absent(&self, record: NewStagedRecord) -> Result<Option<Uuid>> {
            let mut records = self.records.lock().unwrap();
            if records.iter().any(|r| r.source_url == record.source_url) {
                return Ok(None);
            }
            let id = mixcat_core::new_v7();
            records.push(StagedRecord {
                id,
                provider: record.provider,
                kind: record.kind,
                source_url: record.source_url,
                external_id: record.external_id,
                raw_title: record.raw_title,
                raw_description: record.raw_description,
                raw_artist: record.raw_artist,
                channel_id: record.channel_id,
                channel_name: record.channel_name,
                uploaded_at: record.uploaded_at,
                duration_seconds: record.duration_seconds,
                metadata: record.metadata,
                status: mixcat_core::StagedStatus::Pending,
                error_message: None,
                canonical_entity_id: None,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            });
            Ok(Some(id))
        }

        async fn insert_batch(&self, records: Vec<NewStagedRecord>) -> Result<IngestStats> {
            let mut stats = IngestStats::default();
            for record in records {
                match self.insert_if_absent(record).await? {
                    Some(_) => stats.mixes_added += 1,
                    None => stats.duplicates_skipped += 1,
                }
            }
            Ok(stats)
        }

        async fn get(&self, id: Uuid) -> Result<Option<StagedRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.id == id)
                .cloned())
        }

        async fn find_by_source_url(&self, source_url: &str) -> Result<Option<StagedRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.source_url == source_url)
                .cloned())
        }

        async fn find_by_external_id(&self, external_id: &str) -> Result<Option<StagedRecord>> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .find(|r| r.external_id.as_deref() == Some(external_id))
                .cloned())
        }

        async fn mark_processing(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn mark_canonicalized(&self, _id: Uuid, _entity_id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn mark_failed(&self, _id: Uuid, _error: &str) -> Result<()> {
            Ok(())
        }

        async fn requeue_failed(&self, _id: Uuid) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingJobs {
        queued: Mutex<Vec<(WorkerType, Option<Uuid>)>>,
    }

    #[async_trait]
    impl JobRepository for RecordingJobs {
        async fn queue(
            &self,
            worker_type: WorkerType,
            staged_id: Option<Uuid>,
            _payload: Option<JsonValue>,
        ) -> Result<Uuid> {
            self.queued.lock().unwrap().push((worker_type, staged_id));
            Ok(mixcat_core::new_v7())
        }

        async fn queue_deduplicated(
            &self,
            worker_type: WorkerType,
            staged_id: Option<Uuid>,
            payload: Option<JsonValue>,
        ) -> Result<Option<Uuid>> {
            Ok(Some(self.queue(worker_type, staged_id, payload).await?))
        }

        async fn lease_next(&self) -> Result<Option<Job>> {
            Ok(None)
        }

        async fn lease_next_for_types(&self, _worker_types: &[WorkerType]) -> Result<Option<Job>> {
            Ok(None)
        }

        async fn release(&self, _job_id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn complete(&self, _job_id: Uuid) -> Result<()> {
            Ok(())
        }

        async fn fail(&self, _job_id: Uuid, _error: &str) -> Result<()> {
            Ok(())
        }

        async fn fail_terminal(&self, _job_id: Uuid, _error: &str) -> Result<()> {
            Ok(())
        }

        async fn get(&self, _job_id: Uuid) -> Result<Option<Job>> {
            Ok(None)
        }

        async fn pending_count(&self) -> Result<i64> {
            Ok(0)
        }

        async fn queue_stats(&self) -> Result<QueueStats> {
            Ok(QueueStats {
                pending: 0,
                running: 0,
                completed_last_hour: 0,
                failed_last_hour: 0,
                total: 0,
            })
        }
    }

    struct StubFetcher {
        records: Vec<NewStagedRecord>,
    }

    #[async_trait]
    impl SourceFetcher for StubFetcher {
        fn provider(&self) -> Provider {
            Provider::Youtube
        }

        async fn fetch(&self, _payload: Option<&JsonValue>) -> Result<Vec<NewStagedRecord>> {
            Ok(self.records.clone())
        }
    }

    fn record(url: &str) -> NewStagedRecord {
        NewStagedRecord {
            provider: Provider::Youtube,
            kind: StagedKind::Mix,
            source_url: url.into(),
            external_id: None,
            raw_title: Some("a mix".into()),
            raw_description: None,
            raw_artist: None,
            channel_id: None,
            channel_name: None,
            uploaded_at: None,
            duration_seconds: None,
            metadata: json!({}),
        }
    }

    fn fetch_job(payload: JsonValue) -> JobContext {
        JobContext::new(Job {
            id: Uuid::new_v4(),
            worker_type: WorkerType::FetchAndStage,
            staged_id: None,
            payload: Some(payload),
            status: JobStatus::Running,
            attempts: 0,
            max_attempts: 3,
            error_message: None,
            last_run_at: None,
            next_run_at: Utc::now(),
            created_at: Utc::now(),
            completed_at: None,
        })
    }

    #[tokio::test]
    async fn test_fetch_handler_stages_and_queues_canonicalization() {
        let staging = Arc::new(RecordingStaging::default());
        let jobs = Arc::new(RecordingJobs::default());

        // One duplicate among three fetched records.
        staging
            .insert_if_absent(record("https://youtube.com/watch?v=dup"))
            .await
            .unwrap();

        let handler = FetchHandler::new(staging.clone(), jobs.clone()).register_fetcher(
            StubFetcher {
                records: vec![
                    record("https://youtube.com/watch?v=a"),
                    record("https://youtube.com/watch?v=b"),
                    record("https://youtube.com/watch?v=dup"),
                ],
            },
        );

        let outcome = handler
            .execute(fetch_job(json!({"provider": "youtube"})))
            .await;
        assert!(matches!(outcome, JobOutcome::Success));

        assert_eq!(staging.records.lock().unwrap().len(), 3);
        let queued = jobs.queued.lock().unwrap();
        // Only the two new records got canonicalize jobs.
        assert_eq!(queued.len(), 2);
        assert!(queued
            .iter()
            .all(|(wt, staged)| *wt == WorkerType::Canonicalize && staged.is_some()));
    }

    #[tokio::test]
    async fn test_fetch_handler_rejects_missing_provider() {
        let handler = FetchHandler::new(
            Arc::new(RecordingStaging::default()),
            Arc::new(RecordingJobs::default()),
        );

        let outcome = handler.execute(fetch_job(json!({}))).await;
        // Validation error: terminal, no retry.
        assert!(matches!(outcome, JobOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn test_fetch_handler_unknown_provider_is_terminal() {
        let handler = FetchHandler::new(
            Arc::new(RecordingStaging::default()),
            Arc::new(RecordingJobs::default()),
        );

        let outcome = handler
            .execute(fetch_job(json!({"provider": "mixcloud"})))
            .await;
        assert!(matches!(outcome, JobOutcome::Failed(_)));
    }

}
