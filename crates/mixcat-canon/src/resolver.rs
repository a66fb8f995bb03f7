//! Duplicate detection for staged and canonical records.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use mixcat_core::{
    CatalogRepository, ExternalIdSet, Provider, Result, StagingRepository,
};

/// A canonical mix identified as a duplicate of an incoming record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalDuplicate {
    pub mix_id: Uuid,
    /// The provider key whose identifier matched, for audit logging.
    pub matched_key: Provider,
}

/// Decides whether an incoming record already exists, in staging or in the
/// canonical catalog.
///
/// Cross-platform canonical duplicates are detected exclusively through
/// external-ID overlap — text similarity plays no part in this decision.
pub struct DuplicateResolver {
    staging: Arc<dyn StagingRepository>,
    catalog: Arc<dyn CatalogRepository>,
}

impl DuplicateResolver {
    pub fn new(staging: Arc<dyn StagingRepository>, catalog: Arc<dyn CatalogRepository>) -> Self {
        Self { staging, catalog }
    }

    /// Whether a record with this URL or external ID is already staged.
    ///
    /// Both checks are required: two URLs can point to re-uploads sharing an
    /// external ID, and the same URL can be re-submitted without one.
    pub async fn is_duplicate_staged(
        &self,
        source_url: &str,
        external_id: Option<&str>,
    ) -> Result<bool> {
        if self.staging.find_by_source_url(source_url).await?.is_some() {
            return Ok(true);
        }

        if let Some(external_id) = external_id {
            if self
                .staging
                .find_by_external_id(external_id)
                .await?
                .is_some()
            {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Find an existing canonical mix sharing an identical external ID.
    ///
    /// The store prefilters on provider-key presence; the identical-value
    /// check happens here through the codec. Returns the first match and the
    /// key that matched.
    pub async fn find_duplicate_canonical(
        &self,
        ids: &ExternalIdSet,
    ) -> Result<Option<CanonicalDuplicate>> {
        if ids.is_empty() {
            return Ok(None);
        }

        let candidates = self.catalog.mixes_with_any_provider_key(ids).await?;
        debug!(
            subsystem = "canon",
            component = "resolver",
            op = "find_duplicate_canonical",
            candidate_count = candidates.len(),
            "Scanning prefiltered mixes for identifier overlap"
        );

        for mix in candidates {
            if let Some(matched_key) = ids.overlap_key(&mix.external_ids) {
                info!(
                    subsystem = "canon",
                    component = "resolver",
                    op = "find_duplicate_canonical",
                    mix_id = %mix.id,
                    matched_key = %matched_key,
                    "Canonical duplicate detected via external-ID overlap"
                );
                return Ok(Some(CanonicalDuplicate {
                    mix_id: mix.id,
                    matched_key,
                }));
            }
        }

        Ok(None)
    }
}
