//! Per-record canonicalization: duplicate check, fuzzy resolution, context
//! inference, canonical write.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mixcat_core::{
    defaults, CatalogRepository, ContentRecord, ContextSuggestion, Error, NewMix,
    NewRuleApplication, Provider, Result, RuleApplicationStatus, StagedKind, StagedRecord,
    StagingRepository,
};
use mixcat_match::find_best_match;
use mixcat_rules::ContextRuleEngine;

use crate::merge::merge_staged_into_mix;
use crate::resolver::DuplicateResolver;

/// Configuration for the canonicalization pass.
#[derive(Debug, Clone)]
pub struct CanonicalizeConfig {
    /// Auto-link high-confidence suggestions instead of queueing review.
    pub auto_verify: bool,
    /// Minimum suggestion confidence for auto-linking.
    pub auto_verify_floor: f64,
    /// Identity recorded on entities verified by auto-linking. Required when
    /// `auto_verify` is on — the core never invents a verifier.
    pub verified_by: Option<String>,
}

impl Default for CanonicalizeConfig {
    fn default() -> Self {
        Self {
            auto_verify: false,
            auto_verify_floor: defaults::AUTO_VERIFY_CONFIDENCE_FLOOR,
            verified_by: None,
        }
    }
}

impl CanonicalizeConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `CANON_AUTO_VERIFY` | `false` | Enable auto-linking of suggestions |
    /// | `CANON_AUTO_VERIFY_FLOOR` | `0.9` | Confidence floor for auto-linking |
    /// | `CANON_VERIFIED_BY` | unset | Verifier identity for auto-linked entities |
    pub fn from_env() -> Self {
        let auto_verify = std::env::var("CANON_AUTO_VERIFY")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        let auto_verify_floor = std::env::var("CANON_AUTO_VERIFY_FLOOR")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .unwrap_or(defaults::AUTO_VERIFY_CONFIDENCE_FLOOR);

        let verified_by = std::env::var("CANON_VERIFIED_BY").ok();

        Self {
            auto_verify,
            auto_verify_floor,
            verified_by,
        }
    }

    /// Enable or disable auto-verification.
    pub fn with_auto_verify(mut self, enabled: bool, verified_by: Option<String>) -> Self {
        self.auto_verify = enabled;
        self.verified_by = verified_by;
        self
    }

    /// Set the auto-link confidence floor.
    pub fn with_floor(mut self, floor: f64) -> Self {
        self.auto_verify_floor = floor;
        self
    }

    /// Reject inconsistent configuration.
    pub fn validate(&self) -> Result<()> {
        if self.auto_verify && self.verified_by.is_none() {
            return Err(Error::Config(
                "CANON_AUTO_VERIFY requires CANON_VERIFIED_BY".into(),
            ));
        }
        Ok(())
    }
}

/// What a canonicalization pass did with a staged record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CanonicalizeOutcome {
    /// The record was a cross-platform duplicate of an existing mix.
    MergedIntoMix { mix_id: Uuid, matched_key: Provider },
    /// A new canonical mix was created.
    MixCreated {
        mix_id: Uuid,
        artist_id: Option<Uuid>,
        artist_created: bool,
        auto_linked: usize,
        pending_review: usize,
    },
    /// The record's title matched an existing track with high confidence.
    TrackMatched { track_id: Uuid },
    /// A new unverified track was created.
    TrackCreated {
        track_id: Uuid,
        artist_id: Option<Uuid>,
    },
}

impl CanonicalizeOutcome {
    /// The canonical entity this record now points at.
    pub fn entity_id(&self) -> Uuid {
        match self {
            CanonicalizeOutcome::MergedIntoMix { mix_id, .. } => *mix_id,
            CanonicalizeOutcome::MixCreated { mix_id, .. } => *mix_id,
            CanonicalizeOutcome::TrackMatched { track_id } => *track_id,
            CanonicalizeOutcome::TrackCreated { track_id, .. } => *track_id,
        }
    }
}

/// Runs the canonicalization state machine for one staged record:
/// `pending → processing → {canonicalized | failed}`.
pub struct Canonicalizer {
    staging: Arc<dyn StagingRepository>,
    catalog: Arc<dyn CatalogRepository>,
    resolver: DuplicateResolver,
    engine: ContextRuleEngine,
    config: CanonicalizeConfig,
}

impl Canonicalizer {
    pub fn new(
        staging: Arc<dyn StagingRepository>,
        catalog: Arc<dyn CatalogRepository>,
        engine: ContextRuleEngine,
        config: CanonicalizeConfig,
    ) -> Self {
        let resolver = DuplicateResolver::new(staging.clone(), catalog.clone());
        Self {
            staging,
            catalog,
            resolver,
            engine,
            config,
        }
    }

    /// The duplicate resolver, shared with staging-time checks.
    pub fn resolver(&self) -> &DuplicateResolver {
        &self.resolver
    }

    /// Canonicalize one staged record.
    ///
    /// Safe to re-execute after a crash: the duplicate check is idempotent,
    /// so a half-finished pass re-runs without double-creating entities for
    /// records that already promoted.
    pub async fn process(&self, staged_id: Uuid) -> Result<CanonicalizeOutcome> {
        let start = Instant::now();

        let record = self
            .staging
            .get(staged_id)
            .await?
            .ok_or(Error::StagedRecordNotFound(staged_id))?;

        self.staging.mark_processing(staged_id).await?;

        match self.canonicalize(&record).await {
            Ok(outcome) => {
                self.staging
                    .mark_canonicalized(staged_id, outcome.entity_id())
                    .await?;
                info!(
                    subsystem = "canon",
                    component = "orchestrator",
                    op = "canonicalize",
                    staged_id = %staged_id,
                    entity_id = %outcome.entity_id(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Staged record canonicalized"
                );
                Ok(outcome)
            }
            Err(e) => {
                // Capture the failure on the record; the owning job decides
                // whether to retry.
                if let Err(mark_err) = self.staging.mark_failed(staged_id, &e.to_string()).await {
                    error!(
                        subsystem = "canon",
                        component = "orchestrator",
                        op = "canonicalize",
                        staged_id = %staged_id,
                        error = %mark_err,
                        "Failed to record staged failure"
                    );
                }
                Err(e)
            }
        }
    }

    async fn canonicalize(&self, record: &StagedRecord) -> Result<CanonicalizeOutcome> {
        // Duplicate check always precedes any canonical write.
        let ids = record.external_ids();
        if let Some(duplicate) = self.resolver.find_duplicate_canonical(&ids).await? {
            let mix = self
                .catalog
                .get_mix(duplicate.mix_id)
                .await?
                .ok_or_else(|| {
                    Error::Internal(format!("duplicate mix {} disappeared", duplicate.mix_id))
                })?;

            let merged = merge_staged_into_mix(&mix, record);
            self.catalog.update_mix(&merged).await?;

            return Ok(CanonicalizeOutcome::MergedIntoMix {
                mix_id: duplicate.mix_id,
                matched_key: duplicate.matched_key,
            });
        }

        match record.kind {
            StagedKind::Mix => self.canonicalize_mix(record).await,
            StagedKind::Track => self.canonicalize_track(record).await,
        }
    }

    async fn canonicalize_mix(&self, record: &StagedRecord) -> Result<CanonicalizeOutcome> {
        let title = required_title(record)?;
        let (artist_id, artist_created) = self.resolve_artist(record.raw_artist.as_deref()).await?;

        let mix_id = self
            .catalog
            .create_mix(NewMix {
                title,
                description: record.raw_description.clone(),
                artist_id,
                source_url: record.source_url.clone(),
                source_provider: record.provider,
                external_ids: record.external_ids(),
                uploaded_at: record.uploaded_at,
                duration_seconds: record.duration_seconds,
                metadata: record.metadata.clone(),
            })
            .await?;

        let suggestions = self
            .engine
            .suggest_contexts(&ContentRecord::from_staged(record))
            .await?;

        let mut auto_linked = 0;
        let mut pending_review = 0;
        for suggestion in &suggestions {
            // One failing suggestion must not abort the rest.
            match self.apply_suggestion(mix_id, suggestion).await {
                Ok(RuleApplicationStatus::AutoLinked) => auto_linked += 1,
                Ok(_) => pending_review += 1,
                Err(e) => warn!(
                    subsystem = "canon",
                    component = "orchestrator",
                    op = "apply_suggestion",
                    mix_id = %mix_id,
                    rule_id = %suggestion.rule_id,
                    error = %e,
                    "Failed to persist suggestion, skipping"
                ),
            }
        }

        Ok(CanonicalizeOutcome::MixCreated {
            mix_id,
            artist_id,
            artist_created,
            auto_linked,
            pending_review,
        })
    }

    async fn canonicalize_track(&self, record: &StagedRecord) -> Result<CanonicalizeOutcome> {
        let title = required_title(record)?;

        let candidates = self.catalog.track_candidates().await?;
        let outcome = find_best_match(&title, &candidates, defaults::TRACK_TITLE_THRESHOLD);

        if outcome.is_high_confidence {
            // matched is always present when high confidence.
            let track_id = outcome
                .matched
                .map(|m| m.id)
                .ok_or_else(|| Error::Internal("high-confidence match without candidate".into()))?;
            return Ok(CanonicalizeOutcome::TrackMatched { track_id });
        }

        let (artist_id, _) = self.resolve_artist(record.raw_artist.as_deref()).await?;
        let track_id = self.catalog.create_track(&title, artist_id).await?;
        debug!(
            subsystem = "canon",
            component = "orchestrator",
            op = "canonicalize_track",
            track_id = %track_id,
            score = outcome.score,
            "Created new unverified track"
        );
        Ok(CanonicalizeOutcome::TrackCreated { track_id, artist_id })
    }

    /// Resolve a raw artist string to a catalog artist, creating an
    /// unverified one when no match clears the threshold.
    async fn resolve_artist(&self, raw_artist: Option<&str>) -> Result<(Option<Uuid>, bool)> {
        let Some(name) = raw_artist.map(str::trim).filter(|n| !n.is_empty()) else {
            return Ok((None, false));
        };

        let candidates = self.catalog.artist_candidates().await?;
        let outcome = find_best_match(name, &candidates, defaults::ARTIST_NAME_THRESHOLD);

        if outcome.is_high_confidence {
            let artist_id = outcome
                .matched
                .map(|m| m.id)
                .ok_or_else(|| Error::Internal("high-confidence match without candidate".into()))?;
            return Ok((Some(artist_id), false));
        }

        let artist_id = self.catalog.create_artist(name).await?;
        debug!(
            subsystem = "canon",
            component = "orchestrator",
            op = "resolve_artist",
            artist = name,
            score = outcome.score,
            "Created new unverified artist"
        );
        Ok((Some(artist_id), true))
    }

    /// Persist one suggestion: auto-link it when configuration allows,
    /// otherwise queue it for manual review.
    async fn apply_suggestion(
        &self,
        mix_id: Uuid,
        suggestion: &ContextSuggestion,
    ) -> Result<RuleApplicationStatus> {
        let auto_link = !suggestion.requires_approval
            && self.config.auto_verify
            && self.config.verified_by.is_some()
            && suggestion.confidence >= self.config.auto_verify_floor;

        let status = if auto_link {
            let verified_by = self.config.verified_by.as_deref();
            let context_id = self
                .catalog
                .find_or_create_context(
                    suggestion.context_type,
                    &suggestion.context_name,
                    verified_by,
                )
                .await?;
            self.catalog.link_context(mix_id, context_id).await?;

            if let Some(venue_name) = &suggestion.venue_name {
                let venue_id = self
                    .catalog
                    .find_or_create_venue(venue_name, verified_by)
                    .await?;
                self.catalog.link_venue(mix_id, venue_id).await?;
            }
            RuleApplicationStatus::AutoLinked
        } else {
            RuleApplicationStatus::PendingReview
        };

        self.catalog
            .insert_rule_application(NewRuleApplication {
                mix_id,
                rule_id: suggestion.rule_id,
                context_type: suggestion.context_type,
                context_name: suggestion.context_name.clone(),
                venue_name: suggestion.venue_name.clone(),
                confidence: suggestion.confidence,
                requires_approval: suggestion.requires_approval,
                status,
            })
            .await?;

        Ok(status)
    }
}

fn required_title(record: &StagedRecord) -> Result<String> {
    record
        .raw_title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::Validation(format!("staged record {} has no title", record.id)))
}
