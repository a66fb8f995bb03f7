//! # mixcat-core
//!
//! Core types, traits, and abstractions for the mixcat catalog.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other mixcat crates depend on: staged/canonical models, the
//! external-ID codec used for cross-platform duplicate detection, text
//! normalization, and the repository traits implemented by `mixcat-db`.

pub mod defaults;
pub mod error;
pub mod external_id;
pub mod logging;
pub mod models;
pub mod normalize;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use external_id::{decode, encode, ExternalIdSet, Provider};
pub use models::*;
pub use normalize::{normalize, tokenize};
pub use traits::*;
pub use uuid_utils::new_v7;
