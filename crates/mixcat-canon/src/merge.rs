//! Source-priority merge of duplicate records.
//!
//! When a staged record turns out to reference an existing canonical mix,
//! the source with higher priority (1001tracklists > soundcloud > youtube)
//! supplies every scalar field unless it is empty, in which case the
//! lower-priority value survives. Metadata objects merge key-wise with the
//! higher-priority side winning. The merge is deterministic and idempotent;
//! equal priorities tie-break on source URL so argument order never changes
//! the result.

use serde_json::{Map, Value as JsonValue};

use mixcat_core::{Mix, StagedRecord};

/// Merge a staged record's fields into an existing canonical mix.
///
/// Returns the updated mix; the caller persists it. Artist linkage is left
/// untouched — artist resolution happens when the mix is first created.
pub fn merge_staged_into_mix(mix: &Mix, staged: &StagedRecord) -> Mix {
    let staged_wins = staged_wins(mix, staged);
    let mut merged = mix.clone();

    let staged_title = non_empty(staged.raw_title.as_deref());
    let staged_description = non_empty(staged.raw_description.as_deref());

    if staged_wins {
        merged.title = staged_title.unwrap_or(merged.title);
        merged.description = staged_description.or(merged.description);
        merged.uploaded_at = staged.uploaded_at.or(merged.uploaded_at);
        merged.duration_seconds = staged.duration_seconds.or(merged.duration_seconds);
        merged.metadata = merge_metadata(&staged.metadata, &mix.metadata);
        merged.source_provider = staged.provider;
        merged.source_url = staged.source_url.clone();
    } else {
        if merged.title.is_empty() {
            merged.title = staged_title.unwrap_or_default();
        }
        merged.description = merged.description.or(staged_description);
        merged.uploaded_at = merged.uploaded_at.or(staged.uploaded_at);
        merged.duration_seconds = merged.duration_seconds.or(staged.duration_seconds);
        merged.metadata = merge_metadata(&mix.metadata, &staged.metadata);
    }

    // Identifier sets always union; the winner's value survives a
    // same-provider collision (right-biased toward the winner).
    let staged_ids = staged.external_ids();
    merged.external_ids = if staged_wins {
        mix.external_ids.merge(&staged_ids)
    } else {
        staged_ids.merge(&mix.external_ids)
    };

    merged
}

/// Trim a candidate string, dropping it entirely when empty.
fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Whether the staged record's source outranks the mix's current source.
fn staged_wins(mix: &Mix, staged: &StagedRecord) -> bool {
    let staged_priority = staged.provider.priority();
    let mix_priority = mix.source_provider.priority();
    if staged_priority != mix_priority {
        return staged_priority > mix_priority;
    }
    // Equal priority: stable lexicographic tie-break on source URL keeps the
    // merge commutative for the same pair of inputs.
    staged.source_url < mix.source_url
}

/// Key-wise metadata merge; `winner`'s keys overwrite `loser`'s.
fn merge_metadata(winner: &JsonValue, loser: &JsonValue) -> JsonValue {
    match (winner, loser) {
        (JsonValue::Object(w), JsonValue::Object(l)) => {
            let mut out: Map<String, JsonValue> = l.clone();
            for (key, value) in w {
                out.insert(key.clone(), value.clone());
            }
            JsonValue::Object(out)
        }
        (JsonValue::Null, other) => other.clone(),
        (other, _) => other.clone(),
    }
}
