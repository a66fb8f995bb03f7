//! Best-match selection with conservative validation.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use mixcat_core::{defaults, tokenize, MatchCandidate};

use crate::scoring::{score, token_similarity};

/// A candidate with its similarity score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: MatchCandidate,
    pub score: f64,
}

/// Result of matching a query against a candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    /// Best-scoring candidate, when any candidate scored above zero.
    ///
    /// Present even below the threshold — callers decide via
    /// [`MatchOutcome::is_high_confidence`] whether to merge or create.
    pub matched: Option<MatchCandidate>,
    /// Score of the best candidate (0.0 when no candidate scored).
    pub score: f64,
    /// Whether the best candidate cleared the threshold and survived the
    /// validation guards.
    pub is_high_confidence: bool,
    /// Up to three runner-up candidates with non-zero scores.
    pub alternatives: Vec<ScoredCandidate>,
}

impl MatchOutcome {
    fn no_match() -> Self {
        Self {
            matched: None,
            score: 0.0,
            is_high_confidence: false,
            alternatives: Vec::new(),
        }
    }
}

/// Find the best fuzzy match for `query` among `candidates`.
///
/// Every candidate is normalized before scoring; raw strings are never
/// compared. Scores in the ambiguous zone (`[0.6, threshold)`) are logged
/// for audit but do not produce a high-confidence match.
pub fn find_best_match(
    query: &str,
    candidates: &[MatchCandidate],
    threshold: f64,
) -> MatchOutcome {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|candidate| ScoredCandidate {
            candidate: candidate.clone(),
            score: score(query, &candidate.text),
        })
        .filter(|sc| sc.score > 0.0)
        .collect();

    // No NaN possible: scores come from Sørensen–Dice on non-empty strings.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let Some(best) = scored.first().cloned() else {
        return MatchOutcome::no_match();
    };

    let mut is_high_confidence = best.score >= threshold;

    if is_high_confidence {
        if let Some(reason) = validation_failure(query, &best.candidate.text, best.score) {
            warn!(
                subsystem = "match",
                component = "matcher",
                op = "find_best_match",
                query,
                candidate = %best.candidate.text,
                score = best.score,
                reason,
                "Match cleared threshold but failed validation, treating as no match"
            );
            is_high_confidence = false;
        }
    } else if best.score >= defaults::AMBIGUOUS_SCORE_FLOOR {
        warn!(
            subsystem = "match",
            component = "matcher",
            op = "find_best_match",
            query,
            candidate = %best.candidate.text,
            score = best.score,
            threshold,
            "Ambiguous match below threshold"
        );
    } else {
        debug!(
            subsystem = "match",
            component = "matcher",
            op = "find_best_match",
            query,
            score = best.score,
            candidate_count = candidates.len(),
            "No plausible match"
        );
    }

    let alternatives = scored
        .iter()
        .skip(1)
        .take(defaults::MAX_MATCH_ALTERNATIVES)
        .cloned()
        .collect();

    MatchOutcome {
        matched: Some(best.candidate),
        score: best.score,
        is_high_confidence,
        alternatives,
    }
}

/// Whether the caller should create a new unverified entity instead of
/// merging into the matched one.
///
/// Always true when the match is not high-confidence: a duplicate unverified
/// entity is cheaper to fix than two distinct entities merged together.
pub fn should_create_new(outcome: &MatchOutcome) -> bool {
    !outcome.is_high_confidence
}

/// Guards against degenerate high scores from short, generic strings.
///
/// Returns the rejection reason, or `None` when the match stands.
fn validation_failure(query: &str, candidate: &str, score: f64) -> Option<&'static str> {
    let query_tokens = tokenize(query);
    let candidate_tokens = tokenize(candidate);
    if query_tokens.is_empty() || candidate_tokens.is_empty() {
        return Some("empty_after_normalization");
    }

    let longer = query_tokens.len().max(candidate_tokens.len()) as f64;
    let shorter = query_tokens.len().min(candidate_tokens.len()) as f64;
    if longer / shorter > defaults::MAX_TOKEN_COUNT_RATIO && score < 0.95 {
        return Some("token_count_ratio");
    }

    if token_similarity(&query_tokens[0], &candidate_tokens[0]) < 0.6 && score < 0.9 {
        return Some("first_token_mismatch");
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn candidates(names: &[&str]) -> Vec<MatchCandidate> {
        names
            .iter()
            .map(|name| MatchCandidate {
                id: Uuid::new_v4(),
                text: name.to_string(),
                metadata: None,
            })
            .collect()
    }

    #[test]
    fn test_exact_duplicate_is_high_confidence_with_score_one() {
        let cands = candidates(&["Lane 8", "Odesza"]);
        let outcome = find_best_match("Lane 8", &cands, defaults::ARTIST_NAME_THRESHOLD);

        assert_eq!(outcome.score, 1.0);
        assert!(outcome.is_high_confidence);
        assert_eq!(outcome.matched.unwrap().text, "Lane 8");
        assert!(!should_create_new(&find_best_match(
            "Lane 8",
            &cands,
            defaults::ARTIST_NAME_THRESHOLD
        )));
    }

    #[test]
    fn test_post_normalization_duplicate_scores_one() {
        let cands = candidates(&["Above & Beyond"]);
        let outcome = find_best_match(
            "Above and Beyond (Live)",
            &cands,
            defaults::ARTIST_NAME_THRESHOLD,
        );
        assert_eq!(outcome.score, 1.0);
        assert!(outcome.is_high_confidence);
    }

    #[test]
    fn test_lane_8_scenario_never_matches_odesza() {
        let cands = candidates(&["Lane8", "Lane 8 Music", "Odesza"]);
        let outcome = find_best_match("Lane 8", &cands, defaults::ARTIST_NAME_THRESHOLD);

        let matched = outcome.matched.unwrap();
        assert!(
            matched.text == "Lane8" || matched.text == "Lane 8 Music",
            "matched {:?}",
            matched.text
        );
        assert_ne!(matched.text, "Odesza");
        // Below the artist threshold: the policy is to create a new entity.
        assert!(!outcome.is_high_confidence);
        let outcome_again = find_best_match("Lane 8", &cands, defaults::ARTIST_NAME_THRESHOLD);
        assert!(should_create_new(&outcome_again));
    }

    #[test]
    fn test_no_candidates_yields_no_match() {
        let outcome = find_best_match("Lane 8", &[], defaults::ARTIST_NAME_THRESHOLD);
        assert!(outcome.matched.is_none());
        assert_eq!(outcome.score, 0.0);
        assert!(!outcome.is_high_confidence);
        assert!(should_create_new(&outcome));
    }

    #[test]
    fn test_zero_scoring_candidates_are_dropped() {
        let cands = candidates(&["Odesza"]);
        let outcome = find_best_match("Lane 8", &cands, defaults::ARTIST_NAME_THRESHOLD);
        assert!(outcome.matched.is_none());
        assert!(outcome.alternatives.is_empty());
    }

    #[test]
    fn test_alternatives_are_capped_and_ordered() {
        let cands = candidates(&["Lane 8", "Lane8", "Lane 8 Music", "Lane Eight", "Lanes"]);
        let outcome = find_best_match("Lane 8", &cands, defaults::ARTIST_NAME_THRESHOLD);

        assert_eq!(outcome.matched.unwrap().text, "Lane 8");
        assert!(outcome.alternatives.len() <= defaults::MAX_MATCH_ALTERNATIVES);
        for pair in outcome.alternatives.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_order_independent_matching() {
        let cands = candidates(&["Last Night On Earth - Sasha"]);
        let outcome = find_best_match(
            "Sasha - Last Night On Earth",
            &cands,
            defaults::TRACK_TITLE_THRESHOLD,
        );
        assert_eq!(outcome.score, 1.0);
        assert!(outcome.is_high_confidence);
    }

    #[test]
    fn test_validation_rejects_token_count_blowup() {
        // Below 0.95 with a >3x token-count spread: rejected.
        assert_eq!(
            validation_failure("one", "one two three four five", 0.92),
            Some("token_count_ratio")
        );
        // Near-exact scores survive the spread.
        assert_eq!(validation_failure("one", "one two three four five", 0.96), None);
    }

    #[test]
    fn test_validation_rejects_first_token_mismatch() {
        assert_eq!(
            validation_failure("alpha set", "zulu set", 0.88),
            Some("first_token_mismatch")
        );
        // Strong overall score overrides a weak first token.
        assert_eq!(validation_failure("alpha set", "zulu set", 0.93), None);
    }

    #[test]
    fn test_validation_accepts_clean_match() {
        assert_eq!(validation_failure("lane 8", "lane 8 music", 0.9), None);
    }
}
