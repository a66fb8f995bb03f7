//! # mixcat-match
//!
//! Fuzzy matching of raw source text against canonical catalog entities.
//!
//! Scoring is order-independent: both sides are normalized
//! ([`mixcat_core::normalize`]) and token-sorted before a Sørensen–Dice
//! bigram comparison, so "Title - Artist" and "Artist - Title" score
//! identically. The decision policy is deliberately conservative — a score
//! below the type-specific threshold creates a new unverified entity rather
//! than risking a false merge.

pub mod matcher;
pub mod scoring;

pub use matcher::{find_best_match, should_create_new, MatchOutcome, ScoredCandidate};
pub use scoring::{score, token_sort_key};
