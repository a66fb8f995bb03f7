//! Namespaced external identifiers for cross-platform duplicate detection.
//!
//! Every source platform gets a fixed prefix; an encoded identifier looks
//! like `yt:dQw4w9WgXcQ` or `1001:2f9kt1`. Overlap between two
//! [`ExternalIdSet`]s (same provider, identical value) is the *only* signal
//! used to decide that two records are the same entity across platforms —
//! text similarity is never consulted for that decision.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A source platform known to the catalog.
///
/// The variant order defines the stable tie-break ordering used by the
/// source-priority merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Provider {
    #[serde(rename = "youtube")]
    Youtube,
    #[serde(rename = "soundcloud")]
    Soundcloud,
    #[serde(rename = "1001tracklists")]
    Tracklists1001,
}

impl Provider {
    /// All known providers.
    pub const ALL: [Provider; 3] = [
        Provider::Youtube,
        Provider::Soundcloud,
        Provider::Tracklists1001,
    ];

    /// Fixed namespace prefix used in encoded identifiers.
    pub fn prefix(&self) -> &'static str {
        match self {
            Provider::Youtube => "yt",
            Provider::Soundcloud => "sc",
            Provider::Tracklists1001 => "1001",
        }
    }

    /// Database/string name of the provider.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Youtube => "youtube",
            Provider::Soundcloud => "soundcloud",
            Provider::Tracklists1001 => "1001tracklists",
        }
    }

    /// Parse a provider name. Unknown names are a configuration bug.
    pub fn parse(s: &str) -> Result<Provider> {
        match s {
            "youtube" => Ok(Provider::Youtube),
            "soundcloud" => Ok(Provider::Soundcloud),
            "1001tracklists" => Ok(Provider::Tracklists1001),
            other => Err(Error::UnsupportedProvider(other.to_string())),
        }
    }

    /// Look up a provider by its namespace prefix.
    fn from_prefix(prefix: &str) -> Option<Provider> {
        Provider::ALL.iter().copied().find(|p| p.prefix() == prefix)
    }

    /// Merge priority of this source (higher wins scalar conflicts).
    ///
    /// 1001tracklists carries curated tracklist data, SoundCloud uploads are
    /// usually artist-owned, YouTube re-uploads are the noisiest.
    pub fn priority(&self) -> u8 {
        match self {
            Provider::Tracklists1001 => 3,
            Provider::Soundcloud => 2,
            Provider::Youtube => 1,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encode a platform-native identifier into its namespaced form.
pub fn encode(provider: Provider, id: &str) -> Result<String> {
    let id = id.trim();
    if id.is_empty() {
        return Err(Error::Validation(format!(
            "empty external id for provider {provider}"
        )));
    }
    Ok(format!("{}:{}", provider.prefix(), id))
}

/// Decode a namespaced identifier back into `(provider, id)`.
///
/// Returns `None` on malformed input. Callers must treat `None` as
/// "no signal", not as an error — raw records routinely carry junk here.
pub fn decode(external: &str) -> Option<(Provider, String)> {
    let (prefix, id) = external.split_once(':')?;
    let provider = Provider::from_prefix(prefix)?;
    if id.is_empty() {
        return None;
    }
    Some((provider, id.to_string()))
}

/// A set of namespaced external identifiers, at most one per provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalIdSet(BTreeMap<Provider, String>);

impl ExternalIdSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding a single encoded identifier.
    pub fn single(provider: Provider, id: &str) -> Result<Self> {
        let mut set = Self::new();
        set.0.insert(provider, encode(provider, id)?);
        Ok(set)
    }

    /// Insert (or replace) the identifier for a provider.
    pub fn insert(&mut self, provider: Provider, encoded: String) {
        self.0.insert(provider, encoded);
    }

    /// Get the encoded identifier for a provider.
    pub fn get(&self, provider: Provider) -> Option<&str> {
        self.0.get(&provider).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Providers present in this set (used as the SQL prefilter key list).
    pub fn providers(&self) -> Vec<Provider> {
        self.0.keys().copied().collect()
    }

    /// Iterate over `(provider, encoded)` pairs in stable provider order.
    pub fn iter(&self) -> impl Iterator<Item = (Provider, &str)> {
        self.0.iter().map(|(p, v)| (*p, v.as_str()))
    }

    /// Right-biased union: every key in `other` overwrites `self`; keys only
    /// in `self` survive.
    pub fn merge(&self, other: &ExternalIdSet) -> ExternalIdSet {
        let mut merged = self.0.clone();
        for (provider, encoded) in &other.0 {
            merged.insert(*provider, encoded.clone());
        }
        ExternalIdSet(merged)
    }

    /// True iff some provider key maps to an identical value in both sets.
    ///
    /// Key presence alone is not overlap — `yt:abc` and `yt:def` are two
    /// different uploads.
    pub fn has_overlap(&self, other: &ExternalIdSet) -> bool {
        self.0
            .iter()
            .any(|(provider, encoded)| other.0.get(provider) == Some(encoded))
    }

    /// First provider whose value is identical in both sets, for audit logs.
    pub fn overlap_key(&self, other: &ExternalIdSet) -> Option<Provider> {
        self.0
            .iter()
            .find(|(provider, encoded)| other.0.get(provider) == Some(*encoded))
            .map(|(provider, _)| *provider)
    }
}

impl FromIterator<(Provider, String)> for ExternalIdSet {
    fn from_iter<T: IntoIterator<Item = (Provider, String)>>(iter: T) -> Self {
        ExternalIdSet(iter.into_iter().collect())
    }
}
