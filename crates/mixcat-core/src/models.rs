//! Core data models for mixcat.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::external_id::{ExternalIdSet, Provider};

// =============================================================================
// STAGING
// =============================================================================

/// What kind of unit a staged record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedKind {
    Mix,
    Track,
}

/// Lifecycle of a staged record.
///
/// `canonicalized` and `failed` are terminal, though failed records may be
/// requeued by operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StagedStatus {
    Pending,
    Processing,
    Canonicalized,
    Failed,
}

/// A source-ingested, not-yet-canonical unit of data.
///
/// Created by fetch workers; mutated only by the canonicalization
/// orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedRecord {
    pub id: Uuid,
    pub provider: Provider,
    pub kind: StagedKind,
    /// Globally unique; the staging insert is insert-if-absent on this.
    pub source_url: String,
    /// Namespaced external identifier (`yt:...`), when the source supplied one.
    pub external_id: Option<String>,
    pub raw_title: Option<String>,
    pub raw_description: Option<String>,
    pub raw_artist: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub metadata: JsonValue,
    pub status: StagedStatus,
    pub error_message: Option<String>,
    /// Set when the record was promoted or merged into a canonical entity
    /// (a mix, or a track for track records).
    pub canonical_entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StagedRecord {
    /// The record's external-ID set: its own namespaced identifier, if any.
    pub fn external_ids(&self) -> ExternalIdSet {
        self.external_id
            .as_deref()
            .and_then(crate::external_id::decode)
            .map(|(provider, _)| {
                let mut set = ExternalIdSet::new();
                set.insert(provider, self.external_id.clone().unwrap_or_default());
                set
            })
            .unwrap_or_default()
    }
}

/// Request for staging a new record, as produced by source fetchers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewStagedRecord {
    pub provider: Provider,
    pub kind: StagedKind,
    pub source_url: String,
    pub external_id: Option<String>,
    pub raw_title: Option<String>,
    pub raw_description: Option<String>,
    pub raw_artist: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    #[serde(default)]
    pub metadata: JsonValue,
}

/// Counters returned by a staging pass.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IngestStats {
    pub mixes_added: i64,
    pub duplicates_skipped: i64,
}

impl IngestStats {
    /// Fold another pass's counters into this one.
    pub fn add(&mut self, other: IngestStats) {
        self.mixes_added += other.mixes_added;
        self.duplicates_skipped += other.duplicates_skipped;
    }
}

// =============================================================================
// CANONICAL CATALOG
// =============================================================================

/// An authoritative artist record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: Uuid,
    pub name: String,
    /// Normalized form of `name`, stored for candidate retrieval.
    pub normalized_name: String,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An authoritative track record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: Uuid,
    pub title: String,
    pub normalized_title: String,
    pub artist_id: Option<Uuid>,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An authoritative mix record — the canonical unit a staged mix promotes to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mix {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub artist_id: Option<Uuid>,
    pub source_url: String,
    /// The source whose fields currently win the priority merge.
    pub source_provider: Provider,
    pub external_ids: ExternalIdSet,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub metadata: JsonValue,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request for creating a canonical mix.
///
/// New mixes are always created unverified; verification is a review-workflow
/// concern.
#[derive(Debug, Clone)]
pub struct NewMix {
    pub title: String,
    pub description: Option<String>,
    pub artist_id: Option<Uuid>,
    pub source_url: String,
    pub source_provider: Provider,
    pub external_ids: ExternalIdSet,
    pub uploaded_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<i32>,
    pub metadata: JsonValue,
}

/// Non-physical categorization of a mix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    Festival,
    RadioShow,
    Publisher,
    Label,
    Promoter,
    Series,
    Stage,
}

impl ContextType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextType::Festival => "festival",
            ContextType::RadioShow => "radio_show",
            ContextType::Publisher => "publisher",
            ContextType::Label => "label",
            ContextType::Promoter => "promoter",
            ContextType::Series => "series",
            ContextType::Stage => "stage",
        }
    }
}

/// An authoritative context record (festival, radio show, publisher, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntity {
    pub id: Uuid,
    pub context_type: ContextType,
    pub name: String,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// An authoritative venue record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
    pub is_verified: bool,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Read-only projection of a canonical entity used during fuzzy scoring.
///
/// Never persisted; `text` is the raw display string and is normalized by
/// the matcher before comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub id: Uuid,
    pub text: String,
    pub metadata: Option<JsonValue>,
}

// =============================================================================
// CONTEXT RULES
// =============================================================================

/// How a context rule decides whether it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Pattern,
    Keyword,
    ChannelMapping,
    TitlePattern,
}

/// A stored context-inference rule.
///
/// `config` is the raw tagged variant as persisted; it is parsed and
/// validated once per cache load, not per evaluation. Rule lifecycle
/// (creation, activation, versioning) is managed outside this core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextRule {
    pub id: Uuid,
    pub rule_type: RuleType,
    pub target_context_type: ContextType,
    pub target_context_name: String,
    pub config: JsonValue,
    pub confidence_weight: f64,
    pub requires_approval: bool,
    pub priority: i32,
    pub is_active: bool,
}

/// A context/venue suggestion produced by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextSuggestion {
    pub context_type: ContextType,
    pub context_name: String,
    /// Venue extracted from a "live at X" capture, when the rule supports it.
    pub venue_name: Option<String>,
    pub confidence: f64,
    /// Carried verbatim from the rule; the engine never escalates or
    /// suppresses it.
    pub requires_approval: bool,
    pub rule_id: Uuid,
}

/// The content fields a rule evaluation pass sees.
#[derive(Debug, Clone, Default)]
pub struct ContentRecord {
    pub provider: Option<Provider>,
    pub title: String,
    pub description: Option<String>,
    pub channel_id: Option<String>,
    pub channel_name: Option<String>,
}

impl ContentRecord {
    /// Build the rule-engine view of a staged record.
    pub fn from_staged(record: &StagedRecord) -> Self {
        Self {
            provider: Some(record.provider),
            title: record.raw_title.clone().unwrap_or_default(),
            description: record.raw_description.clone(),
            channel_id: record.channel_id.clone(),
            channel_name: record.channel_name.clone(),
        }
    }
}

/// Review status of a persisted rule application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleApplicationStatus {
    PendingReview,
    AutoLinked,
    Approved,
    Rejected,
}

/// A persisted suggestion, gated for manual review or auto-linked.
///
/// `moderator_feedback` is written by the external review workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleApplication {
    pub id: Uuid,
    pub mix_id: Uuid,
    pub rule_id: Uuid,
    pub context_type: ContextType,
    pub context_name: String,
    pub venue_name: Option<String>,
    pub confidence: f64,
    pub requires_approval: bool,
    pub status: RuleApplicationStatus,
    pub moderator_feedback: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Request for persisting a new rule application.
#[derive(Debug, Clone)]
pub struct NewRuleApplication {
    pub mix_id: Uuid,
    pub rule_id: Uuid,
    pub context_type: ContextType,
    pub context_name: String,
    pub venue_name: Option<String>,
    pub confidence: f64,
    pub requires_approval: bool,
    pub status: RuleApplicationStatus,
}

// =============================================================================
// JOBS
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The capability a job dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// Pull raw records from a source platform into staging.
    FetchAndStage,
    /// Promote one staged record into the canonical catalog.
    Canonicalize,
}

/// A job in the processing queue.
///
/// Mutated exclusively by the job processor through `JobRepository`; the
/// pending→running transition only ever happens via the atomic lease.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub worker_type: WorkerType,
    /// The staged record this job operates on, for canonicalize jobs.
    pub staged_id: Option<Uuid>,
    pub payload: Option<JsonValue>,
    pub status: JobStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub error_message: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Earliest time the job is eligible for leasing (backoff target).
    pub next_run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Queue statistics summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub running: i64,
    pub completed_last_hour: i64,
    pub failed_last_hour: i64,
    pub total: i64,
}
