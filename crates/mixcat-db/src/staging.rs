//! Staged-record repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use mixcat_core::{
    new_v7, Error, IngestStats, NewStagedRecord, Provider, Result, StagedKind, StagedRecord,
    StagedStatus, StagingRepository,
};

/// PostgreSQL implementation of StagingRepository.
#[derive(Clone)]
pub struct PgStagingRepository {
    pool: Pool<Postgres>,
}

const STAGED_COLUMNS: &str = "id, provider, kind, source_url, external_id, raw_title, \
                              raw_description, raw_artist, channel_id, channel_name, uploaded_at, \
                              duration_seconds, metadata, status, error_message, canonical_entity_id, \
                              created_at, updated_at";

impl PgStagingRepository {
    /// Create a new PgStagingRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn str_to_provider(s: &str) -> Provider {
        Provider::parse(s).unwrap_or(Provider::Youtube) // fallback
    }

    fn str_to_kind(s: &str) -> StagedKind {
        match s {
            "track" => StagedKind::Track,
            _ => StagedKind::Mix, // fallback
        }
    }

    fn kind_to_str(kind: StagedKind) -> &'static str {
        match kind {
            StagedKind::Mix => "mix",
            StagedKind::Track => "track",
        }
    }

    fn str_to_status(s: &str) -> StagedStatus {
        match s {
            "processing" => StagedStatus::Processing,
            "canonicalized" => StagedStatus::Canonicalized,
            "failed" => StagedStatus::Failed,
            _ => StagedStatus::Pending, // fallback
        }
    }

    /// Parse a staged-record row.
    fn parse_row(row: sqlx::postgres::PgRow) -> StagedRecord {
        StagedRecord {
            id: row.get("id"),
            provider: Self::str_to_provider(row.get("provider")),
            kind: Self::str_to_kind(row.get("kind")),
            source_url: row.get("source_url"),
            external_id: row.get("external_id"),
            raw_title: row.get("raw_title"),
            raw_description: row.get("raw_description"),
            raw_artist: row.get("raw_artist"),
            channel_id: row.get("channel_id"),
            channel_name: row.get("channel_name"),
            uploaded_at: row.get("uploaded_at"),
            duration_seconds: row.get("duration_seconds"),
            metadata: row.get("metadata"),
            status: Self::str_to_status(row.get("status")),
            error_message: row.get("error_message"),
            canonical_entity_id: row.get("canonical_entity_id"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl StagingRepository for PgStagingRepository {
    async fn insert_if_absent(&self, record: NewStagedRecord) -> Result<Option<Uuid>> {
        let id = new_v7();
        let now = Utc::now();

        // ON CONFLICT DO NOTHING on the unique source_url makes the
        // insert-if-absent atomic; re-submissions return None.
        let inserted = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO staged_records
                 (id, provider, kind, source_url, external_id, raw_title, raw_description,
                  raw_artist, channel_id, channel_name, uploaded_at, duration_seconds, metadata,
                  status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'pending', $14, $14)
             ON CONFLICT (source_url) DO NOTHING
             RETURNING id",
        )
        .bind(id)
        .bind(record.provider.as_str())
        .bind(Self::kind_to_str(record.kind))
        .bind(&record.source_url)
        .bind(&record.external_id)
        .bind(&record.raw_title)
        .bind(&record.raw_description)
        .bind(&record.raw_artist)
        .bind(&record.channel_id)
        .bind(&record.channel_name)
        .bind(record.uploaded_at)
        .bind(record.duration_seconds)
        .bind(&record.metadata)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if inserted.is_none() {
            debug!(
                subsystem = "db",
                component = "staging",
                op = "insert_if_absent",
                source_url = %record.source_url,
                "Source URL already staged, skipping"
            );
        }

        Ok(inserted)
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
        let query = format!("SELECT {STAGED_COLUMNS} FROM staged_records WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_row))
    }

    async fn find_by_source_url(&self, source_url: &str) -> Result<Option<StagedRecord>> {
        let query = format!("SELECT {STAGED_COLUMNS} FROM staged_records WHERE source_url = $1");
        let row = sqlx::query(&query)
            .bind(source_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_row))
    }

    async fn find_by_external_id(&self, external_id: &str) -> Result<Option<StagedRecord>> {
        let query = format!(
            "SELECT {STAGED_COLUMNS} FROM staged_records WHERE external_id = $1 LIMIT 1"
        );
        let row = sqlx::query(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_row))
    }

    async fn mark_processing(&self, id: Uuid) -> Result<()> {
        self.set_status(id, "processing", None, None).await
    }

    async fn mark_canonicalized(&self, id: Uuid, entity_id: Uuid) -> Result<()> {
        self.set_status(id, "canonicalized", None, Some(entity_id)).await
    }

    async fn mark_failed(&self, id: Uuid, error: &str) -> Result<()> {
        self.set_status(id, "failed", Some(error), None).await
    }

    async fn requeue_failed(&self, id: Uuid) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE staged_records
             SET status = 'pending', error_message = NULL, updated_at = $1
             WHERE id = $2 AND status = 'failed'",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Error::NotFound(format!("failed staged record {id}")));
        }
        Ok(())
    }
}

impl PgStagingRepository {
    async fn set_status(
        &self,
        id: Uuid,
        status: &str,
        error: Option<&str>,
        entity_id: Option<Uuid>,
    ) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE staged_records
             SET status = $1,
                 error_message = $2,
                 canonical_entity_id = COALESCE($3, canonical_entity_id),
                 updated_at = $4
             WHERE id = $5",
        )
        .bind(status)
        .bind(error)
        .bind(entity_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if updated.rows_affected() == 0 {
            return Err(Error::StagedRecordNotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [StagedKind::Mix, StagedKind::Track] {
            let s = PgStagingRepository::kind_to_str(kind);
            assert_eq!(PgStagingRepository::str_to_kind(s), kind);
        }
    }

    #[test]
    fn test_str_to_status_all_variants() {
        assert_eq!(
            PgStagingRepository::str_to_status("pending"),
            StagedStatus::Pending
        );
        assert_eq!(
            PgStagingRepository::str_to_status("processing"),
            StagedStatus::Processing
        );
        assert_eq!(
            PgStagingRepository::str_to_status("canonicalized"),
            StagedStatus::Canonicalized
        );
        assert_eq!(
            PgStagingRepository::str_to_status("failed"),
            StagedStatus::Failed
        );
    }

    #[test]
    fn test_str_to_provider_known_names() {
        assert_eq!(
            PgStagingRepository::str_to_provider("1001tracklists"),
            Provider::Tracklists1001
        );
        assert_eq!(
            PgStagingRepository::str_to_provider("soundcloud"),
            Provider::Soundcloud
        );
    }
}
