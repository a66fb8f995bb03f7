//! # mixcat-rules
//!
//! Context inference rule engine.
//!
//! Evaluates a prioritized, TTL-cached rule set against a content record to
//! produce festival/venue/publisher suggestions with confidence scores and
//! review gating. Rule configs are a closed set of tagged variants validated
//! and regex-compiled once at load time, never per evaluation; a rule that
//! fails to compile or to evaluate is logged and skipped without aborting
//! the pass.

pub mod cache;
pub mod config;
pub mod engine;

pub use cache::{Clock, FakeClock, SystemClock, TtlCache};
pub use config::{CompiledRule, KeywordMode, PatternField, RuleConfig};
pub use engine::ContextRuleEngine;
