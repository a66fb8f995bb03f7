//! Rule configuration variants and load-time compilation.
//!
//! Stored rule configs are a tagged variant over a closed set of shapes.
//! Parsing, validation, and regex compilation all happen once when the rule
//! set is loaded into the cache — evaluation never constructs a regex or
//! inspects loose JSON.

use std::collections::HashSet;

use regex::Regex;
use serde::Deserialize;

use mixcat_core::{ContextRule, Error, Provider, Result, RuleType};

/// Which content field a `pattern` rule runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternField {
    Title,
    Description,
    #[default]
    Any,
}

/// Keyword combination mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
    /// Fire on any keyword; confidence scales with the matched fraction.
    #[default]
    Any,
    /// Fire only when every keyword is present.
    All,
}

/// The closed set of rule-config shapes, as persisted.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleConfig {
    /// Regex against title and/or description.
    Pattern {
        pattern: String,
        #[serde(default)]
        field: PatternField,
    },
    /// Keyword presence test.
    Keyword {
        keywords: Vec<String>,
        #[serde(default)]
        mode: KeywordMode,
    },
    /// Exact membership against a per-platform allow-list of channels.
    ChannelMapping {
        provider: Provider,
        channels: Vec<String>,
    },
    /// Substring gate with optional "live at X" venue extraction.
    TitlePattern {
        needle: String,
        #[serde(default)]
        venue_pattern: Option<String>,
    },
}

impl RuleConfig {
    fn rule_type(&self) -> RuleType {
        match self {
            RuleConfig::Pattern { .. } => RuleType::Pattern,
            RuleConfig::Keyword { .. } => RuleType::Keyword,
            RuleConfig::ChannelMapping { .. } => RuleType::ChannelMapping,
            RuleConfig::TitlePattern { .. } => RuleType::TitlePattern,
        }
    }
}

/// A rule whose config has been parsed, validated, and compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: ContextRule,
    pub matcher: CompiledMatcher,
}

/// The evaluation-ready form of each config shape.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    Pattern {
        regex: Regex,
        field: PatternField,
    },
    Keyword {
        /// Lowercased keywords; empty lists are rejected at compile.
        keywords: Vec<String>,
        mode: KeywordMode,
    },
    ChannelMapping {
        provider: Provider,
        /// Lowercased channel IDs/usernames.
        channels: HashSet<String>,
    },
    TitlePattern {
        /// Lowercased substring gate.
        needle: String,
        /// Capture group 1 extracts the venue name.
        venue_regex: Option<Regex>,
    },
}

/// Parse and compile one stored rule.
///
/// Fails on unknown shapes, a config tag disagreeing with the stored
/// `rule_type`, invalid regexes, and empty keyword/channel lists.
pub fn compile(rule: ContextRule) -> Result<CompiledRule> {
    let config: RuleConfig = serde_json::from_value(rule.config.clone())
        .map_err(|e| Error::Rule(format!("rule {}: invalid config: {e}", rule.id)))?;

    if config.rule_type() != rule.rule_type {
        return Err(Error::Rule(format!(
            "rule {}: config shape {:?} does not match rule_type {:?}",
            rule.id,
            config.rule_type(),
            rule.rule_type
        )));
    }

    let matcher = match config {
        RuleConfig::Pattern { pattern, field } => CompiledMatcher::Pattern {
            regex: Regex::new(&pattern)
                .map_err(|e| Error::Rule(format!("rule {}: invalid pattern: {e}", rule.id)))?,
            field,
        },
        RuleConfig::Keyword { keywords, mode } => {
            if keywords.is_empty() {
                return Err(Error::Rule(format!("rule {}: empty keyword list", rule.id)));
            }
            CompiledMatcher::Keyword {
                keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
                mode,
            }
        }
        RuleConfig::ChannelMapping { provider, channels } => {
            if channels.is_empty() {
                return Err(Error::Rule(format!("rule {}: empty channel list", rule.id)));
            }
            CompiledMatcher::ChannelMapping {
                provider,
                channels: channels.iter().map(|c| c.to_lowercase()).collect(),
            }
        }
        RuleConfig::TitlePattern {
            needle,
            venue_pattern,
        } => {
            if needle.trim().is_empty() {
                return Err(Error::Rule(format!("rule {}: empty needle", rule.id)));
            }
            let venue_regex = venue_pattern
                .map(|p| {
                    Regex::new(&p).map_err(|e| {
                        Error::Rule(format!("rule {}: invalid venue pattern: {e}", rule.id))
                    })
                })
                .transpose()?;
            CompiledMatcher::TitlePattern {
                needle: needle.to_lowercase(),
                venue_regex,
            }
        }
    };

    Ok(CompiledRule { rule, matcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mixcat_core::ContextType;
    use serde_json::json;
    use uuid::Uuid;

    fn rule(rule_type: RuleType, config: serde_json::Value) -> ContextRule {
        ContextRule {
            id: Uuid::new_v4(),
            rule_type,
            target_context_type: ContextType::Festival,
            target_context_name: "Tomorrowland".into(),
            config,
            confidence_weight: 0.8,
            requires_approval: true,
            priority: 10,
            is_active: true,
        }
    }

    #[test]
    fn test_compile_pattern() {
        let compiled = compile(rule(
            RuleType::Pattern,
            json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
        ))
        .unwrap();
        assert!(matches!(
            compiled.matcher,
            CompiledMatcher::Pattern {
                field: PatternField::Any,
                ..
            }
        ));
    }

    #[test]
    fn test_compile_invalid_regex_fails() {
        let err = compile(rule(
            RuleType::Pattern,
            json!({"type": "pattern", "pattern": "(unclosed"}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Rule(_)));
    }

    #[test]
    fn test_compile_rejects_tag_mismatch() {
        let err = compile(rule(
            RuleType::Keyword,
            json!({"type": "pattern", "pattern": "x"}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Rule(_)));
    }

    #[test]
    fn test_compile_rejects_unknown_shape() {
        let err = compile(rule(RuleType::Pattern, json!({"type": "llm_magic"}))).unwrap_err();
        assert!(matches!(err, Error::Rule(_)));
    }

    #[test]
    fn test_compile_keyword_lowercases() {
        let compiled = compile(rule(
            RuleType::Keyword,
            json!({"type": "keyword", "keywords": ["ASOT", "Trance"], "mode": "all"}),
        ))
        .unwrap();
        match compiled.matcher {
            CompiledMatcher::Keyword { keywords, mode } => {
                assert_eq!(keywords, vec!["asot", "trance"]);
                assert_eq!(mode, KeywordMode::All);
            }
            other => panic!("wrong matcher: {other:?}"),
        }
    }

    #[test]
    fn test_compile_rejects_empty_keywords() {
        let err = compile(rule(
            RuleType::Keyword,
            json!({"type": "keyword", "keywords": []}),
        ))
        .unwrap_err();
        assert!(matches!(err, Error::Rule(_)));
    }

    #[test]
    fn test_compile_channel_mapping() {
        let compiled = compile(rule(
            RuleType::ChannelMapping,
            json!({
                "type": "channel_mapping",
                "provider": "youtube",
                "channels": ["UCabc", "Cercle"]
            }),
        ))
        .unwrap();
        match compiled.matcher {
            CompiledMatcher::ChannelMapping { provider, channels } => {
                assert_eq!(provider, Provider::Youtube);
                assert!(channels.contains("ucabc"));
                assert!(channels.contains("cercle"));
            }
            other => panic!("wrong matcher: {other:?}"),
        }
    }

    #[test]
    fn test_compile_title_pattern_with_venue_extraction() {
        let compiled = compile(rule(
            RuleType::TitlePattern,
            json!({
                "type": "title_pattern",
                "needle": "Live At",
                "venue_pattern": "(?i)live at ([^|\\-\\[\\(]+)"
            }),
        ))
        .unwrap();
        match compiled.matcher {
            CompiledMatcher::TitlePattern {
                needle,
                venue_regex,
            } => {
                assert_eq!(needle, "live at");
                assert!(venue_regex.is_some());
            }
            other => panic!("wrong matcher: {other:?}"),
        }
    }
}
