//! Structured logging schema and field name constants for mixcat.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (candidates, rules) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "jobs", "canon", "match", "rules"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "pool", "processor", "resolver", "engine"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "lease_next", "canonicalize", "suggest_contexts"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Worker type enum variant.
pub const WORKER_TYPE: &str = "worker_type";

/// Staged record UUID being canonicalized.
pub const STAGED_ID: &str = "staged_id";

/// Canonical mix UUID.
pub const MIX_ID: &str = "mix_id";

/// Rule UUID being evaluated.
pub const RULE_ID: &str = "rule_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Normalized similarity score of a fuzzy match.
pub const SCORE: &str = "score";

/// Number of candidates scored.
pub const CANDIDATE_COUNT: &str = "candidate_count";

/// Retry attempt count of a job.
pub const ATTEMPTS: &str = "attempts";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// External-ID key that matched during duplicate resolution (audit trail).
pub const MATCHED_KEY: &str = "matched_key";
