//! Canonical catalog repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use mixcat_core::{
    defaults, new_v7, normalize, CatalogRepository, ContextType, Error, ExternalIdSet,
    MatchCandidate, Mix, NewMix, NewRuleApplication, Provider, Result, RuleApplicationStatus,
};

use crate::escape_like;

/// PostgreSQL implementation of CatalogRepository.
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: Pool<Postgres>,
}

const MIX_COLUMNS: &str = "id, title, description, artist_id, source_url, source_provider, \
                           external_ids, uploaded_at, duration_seconds, metadata, is_verified, \
                           verified_by, verified_at, created_at, updated_at";

impl PgCatalogRepository {
    /// Create a new PgCatalogRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn context_type_to_str(context_type: ContextType) -> &'static str {
        context_type.as_str()
    }

    fn application_status_to_str(status: RuleApplicationStatus) -> &'static str {
        match status {
            RuleApplicationStatus::PendingReview => "pending_review",
            RuleApplicationStatus::AutoLinked => "auto_linked",
            RuleApplicationStatus::Approved => "approved",
            RuleApplicationStatus::Rejected => "rejected",
        }
    }

    /// Parse a mix row.
    fn parse_mix_row(row: sqlx::postgres::PgRow) -> Mix {
        let external_ids: JsonValue = row.get("external_ids");
        Mix {
            id: row.get("id"),
            title: row.get("title"),
            description: row.get("description"),
            artist_id: row.get("artist_id"),
            source_url: row.get("source_url"),
            source_provider: Provider::parse(row.get("source_provider"))
                .unwrap_or(Provider::Youtube), // fallback
            external_ids: serde_json::from_value::<ExternalIdSet>(external_ids)
                .unwrap_or_default(),
            uploaded_at: row.get("uploaded_at"),
            duration_seconds: row.get("duration_seconds"),
            metadata: row.get("metadata"),
            is_verified: row.get("is_verified"),
            verified_by: row.get("verified_by"),
            verified_at: row.get("verified_at"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }

    fn parse_candidate_row(row: sqlx::postgres::PgRow) -> MatchCandidate {
        MatchCandidate {
            id: row.get("id"),
            text: row.get("text"),
            metadata: None,
        }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn artist_candidates(&self) -> Result<Vec<MatchCandidate>> {
        let rows = sqlx::query(
            "SELECT id, name AS text FROM artists ORDER BY created_at ASC LIMIT $1",
        )
        .bind(defaults::CANDIDATE_FETCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_candidate_row).collect())
    }

    async fn artist_candidates_like(&self, needle: &str) -> Result<Vec<MatchCandidate>> {
        let pattern = format!("%{}%", escape_like(needle));
        let rows = sqlx::query(
            "SELECT id, name AS text FROM artists
             WHERE name ILIKE $1 OR normalized_name ILIKE $1
             ORDER BY created_at ASC LIMIT $2",
        )
        .bind(pattern)
        .bind(defaults::CANDIDATE_FETCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_candidate_row).collect())
    }

    async fn track_candidates(&self) -> Result<Vec<MatchCandidate>> {
        let rows = sqlx::query(
            "SELECT id, title AS text FROM tracks ORDER BY created_at ASC LIMIT $1",
        )
        .bind(defaults::CANDIDATE_FETCH_LIMIT)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_candidate_row).collect())
    }

    async fn create_artist(&self, name: &str) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO artists (id, name, normalized_name, is_verified, created_at)
             VALUES ($1, $2, $3, FALSE, $4)",
        )
        .bind(id)
        .bind(name)
        .bind(normalize(name))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn create_track(&self, title: &str, artist_id: Option<Uuid>) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO tracks (id, title, normalized_title, artist_id, is_verified, created_at)
             VALUES ($1, $2, $3, $4, FALSE, $5)",
        )
        .bind(id)
        .bind(title)
        .bind(normalize(title))
        .bind(artist_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn create_mix(&self, mix: NewMix) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO mixes
                 (id, title, description, artist_id, source_url, source_provider, external_ids,
                  uploaded_at, duration_seconds, metadata, is_verified, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE, $11, $11)",
        )
        .bind(id)
        .bind(&mix.title)
        .bind(&mix.description)
        .bind(mix.artist_id)
        .bind(&mix.source_url)
        .bind(mix.source_provider.as_str())
        .bind(serde_json::to_value(&mix.external_ids)?)
        .bind(mix.uploaded_at)
        .bind(mix.duration_seconds)
        .bind(&mix.metadata)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }

    async fn get_mix(&self, id: Uuid) -> Result<Option<Mix>> {
        let query = format!("SELECT {MIX_COLUMNS} FROM mixes WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.map(Self::parse_mix_row))
    }

    async fn update_mix(&self, mix: &Mix) -> Result<()> {
        sqlx::query(
            "UPDATE mixes
             SET title = $1, description = $2, artist_id = $3, source_provider = $4,
                 external_ids = $5, uploaded_at = $6, duration_seconds = $7, metadata = $8,
                 updated_at = $9
             WHERE id = $10",
        )
        .bind(&mix.title)
        .bind(&mix.description)
        .bind(mix.artist_id)
        .bind(mix.source_provider.as_str())
        .bind(serde_json::to_value(&mix.external_ids)?)
        .bind(mix.uploaded_at)
        .bind(mix.duration_seconds)
        .bind(&mix.metadata)
        .bind(Utc::now())
        .bind(mix.id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn mixes_with_any_provider_key(&self, ids: &ExternalIdSet) -> Result<Vec<Mix>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .providers()
            .into_iter()
            .map(|p| p.as_str().to_string())
            .collect();

        // Key-presence prefilter only; exact value overlap is decided by the
        // codec in the duplicate resolver.
        let query = format!("SELECT {MIX_COLUMNS} FROM mixes WHERE external_ids ?| $1::text[]");
        let rows = sqlx::query(&query)
            .bind(&keys)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_mix_row).collect())
    }

    async fn find_or_create_context(
        &self,
        context_type: ContextType,
        name: &str,
        verified_by: Option<&str>,
    ) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();

        // Upsert keyed on (type, lower(name)); the no-op DO UPDATE makes
        // RETURNING yield the existing row's id on conflict. A pre-existing
        // entity keeps its verification state.
        let context_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO contexts (id, context_type, name, is_verified, verified_by, verified_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)
             ON CONFLICT (context_type, lower(name)) DO UPDATE SET name = contexts.name
             RETURNING id",
        )
        .bind(id)
        .bind(Self::context_type_to_str(context_type))
        .bind(name)
        .bind(verified_by.is_some())
        .bind(verified_by)
        .bind(verified_by.map(|_| now))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(context_id)
    }

    async fn find_or_create_venue(&self, name: &str, verified_by: Option<&str>) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();

        let venue_id = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO venues (id, name, is_verified, verified_by, verified_at, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (lower(name)) DO UPDATE SET name = venues.name
             RETURNING id",
        )
        .bind(id)
        .bind(name)
        .bind(verified_by.is_some())
        .bind(verified_by)
        .bind(verified_by.map(|_| now))
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(venue_id)
    }

    async fn link_context(&self, mix_id: Uuid, context_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO mix_contexts (mix_id, context_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(mix_id)
        .bind(context_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn link_venue(&self, mix_id: Uuid, venue_id: Uuid) -> Result<()> {
        sqlx::query(
            "INSERT INTO mix_venues (mix_id, venue_id) VALUES ($1, $2)
             ON CONFLICT DO NOTHING",
        )
        .bind(mix_id)
        .bind(venue_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn insert_rule_application(&self, application: NewRuleApplication) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO rule_applications
                 (id, mix_id, rule_id, context_type, context_name, venue_name, confidence,
                  requires_approval, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(application.mix_id)
        .bind(application.rule_id)
        .bind(Self::context_type_to_str(application.context_type))
        .bind(&application.context_name)
        .bind(&application.venue_name)
        .bind(application.confidence)
        .bind(application.requires_approval)
        .bind(Self::application_status_to_str(application.status))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(id)
    }
}
