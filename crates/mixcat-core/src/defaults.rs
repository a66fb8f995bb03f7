//! Centralized default constants for the mixcat system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// MATCHING
// =============================================================================

/// Minimum normalized similarity to auto-accept a track title match.
///
/// Titles carry more entropy than names, so the bar is higher. Chosen to
/// bias toward false negatives: a duplicate unverified track is cheaper to
/// fix than two merged distinct tracks.
pub const TRACK_TITLE_THRESHOLD: f64 = 0.90;

/// Minimum normalized similarity to auto-accept an artist name match.
pub const ARTIST_NAME_THRESHOLD: f64 = 0.85;

/// Lower bound of the ambiguous zone; scores in `[floor, threshold)` are
/// logged for audit but never produce an automatic match.
pub const AMBIGUOUS_SCORE_FLOOR: f64 = 0.6;

/// Token-count ratio above which a threshold-clearing match is still
/// rejected unless the score is near-exact (degenerate short-string guard).
pub const MAX_TOKEN_COUNT_RATIO: f64 = 3.0;

/// Maximum alternatives reported alongside the best match.
pub const MAX_MATCH_ALTERNATIVES: usize = 3;

// =============================================================================
// JOBS
// =============================================================================

/// Default maximum attempts before a job fails permanently.
pub const JOB_MAX_ATTEMPTS: i32 = 3;

/// Retry backoff base in seconds; attempt N reschedules at
/// `base * 2^N` (5 min, 10 min, 20 min, ...).
pub const JOB_RETRY_BASE_SECS: i64 = 300;

/// Polling interval when the queue is empty.
pub const JOB_POLL_INTERVAL_MS: u64 = 5_000;

/// Per-job execution timeout.
pub const JOB_EXEC_TIMEOUT_SECS: u64 = 600;

/// Broadcast channel capacity for worker events.
pub const WORKER_EVENT_CAPACITY: usize = 256;

// =============================================================================
// RULES
// =============================================================================

/// How long a loaded rule set stays fresh before a reload.
pub const RULE_CACHE_TTL_SECS: u64 = 300;

/// Confidence floor for auto-linking a suggestion when auto-verify is on.
pub const AUTO_VERIFY_CONFIDENCE_FLOOR: f64 = 0.9;

// =============================================================================
// CANDIDATE RETRIEVAL
// =============================================================================

/// Internal "fetch everything" limit for candidate queries.
pub const CANDIDATE_FETCH_LIMIT: i64 = 10_000;
