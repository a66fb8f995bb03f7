//! Prioritized rule evaluation with suggestion deduplication.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use mixcat_core::{
    defaults, ContentRecord, ContextSuggestion, ContextType, Result, RuleRepository,
};

use crate::cache::{Clock, SystemClock, TtlCache};
use crate::config::{compile, CompiledMatcher, CompiledRule, KeywordMode, PatternField};

/// Evaluates the active rule set against content records.
///
/// The rule set is loaded from the store and cached for a fixed TTL; the
/// cache is the only process-wide mutable state here and can be cleared with
/// [`ContextRuleEngine::invalidate_cache`] for tests.
pub struct ContextRuleEngine {
    repo: Arc<dyn RuleRepository>,
    cache: TtlCache<Vec<CompiledRule>>,
}

impl ContextRuleEngine {
    /// Create an engine with the default TTL and system clock.
    pub fn new(repo: Arc<dyn RuleRepository>) -> Self {
        Self::with_clock(
            repo,
            Duration::from_secs(defaults::RULE_CACHE_TTL_SECS),
            Arc::new(SystemClock),
        )
    }

    /// Create an engine with an injected TTL and clock (for tests).
    pub fn with_clock(repo: Arc<dyn RuleRepository>, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            repo,
            cache: TtlCache::new(ttl, clock),
        }
    }

    /// Drop the cached rule set so the next evaluation reloads it.
    pub fn invalidate_cache(&self) {
        self.cache.invalidate();
    }

    /// Suggest contexts for a content record.
    ///
    /// Every active rule is evaluated — no short-circuit, since several rules
    /// may legitimately fire for one record. Suggestions are deduplicated by
    /// `(context_type, lowercase(name))` keeping the higher confidence, and
    /// returned in descending confidence order.
    pub async fn suggest_contexts(&self, content: &ContentRecord) -> Result<Vec<ContextSuggestion>> {
        let rules = self.cached_rules().await?;

        let mut by_key: HashMap<(ContextType, String), ContextSuggestion> = HashMap::new();
        for rule in rules.iter() {
            let suggestion = match evaluate(rule, content) {
                Ok(suggestion) => suggestion,
                Err(e) => {
                    // One bad rule must never abort the rest of the pass.
                    warn!(
                        subsystem = "rules",
                        component = "engine",
                        op = "suggest_contexts",
                        rule_id = %rule.rule.id,
                        error = %e,
                        "Rule evaluation failed, skipping"
                    );
                    continue;
                }
            };

            let Some(suggestion) = suggestion else {
                continue;
            };

            let key = (
                suggestion.context_type,
                suggestion.context_name.to_lowercase(),
            );
            match by_key.get(&key) {
                Some(existing) if existing.confidence >= suggestion.confidence => {}
                _ => {
                    by_key.insert(key, suggestion);
                }
            }
        }

        let mut suggestions: Vec<ContextSuggestion> = by_key.into_values().collect();
        suggestions.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.context_name.cmp(&b.context_name))
        });

        debug!(
            subsystem = "rules",
            component = "engine",
            op = "suggest_contexts",
            rule_count = rules.len(),
            result_count = suggestions.len(),
            "Rule evaluation complete"
        );

        Ok(suggestions)
    }

    /// The compiled rule set, reloading through the cache when stale.
    async fn cached_rules(&self) -> Result<Arc<Vec<CompiledRule>>> {
        let repo = self.repo.clone();
        self.cache
            .get_or_load(|| async move {
                let stored = repo.list_active().await?;
                let total = stored.len();

                let mut compiled: Vec<CompiledRule> = Vec::with_capacity(total);
                for rule in stored {
                    let rule_id = rule.id;
                    match compile(rule) {
                        Ok(c) => compiled.push(c),
                        Err(e) => {
                            // Invalid configs are rejected here, once per
                            // load, instead of failing every evaluation.
                            warn!(
                                subsystem = "rules",
                                component = "engine",
                                op = "load_rules",
                                rule_id = %rule_id,
                                error = %e,
                                "Skipping rule that failed to compile"
                            );
                        }
                    }
                }

                // Evaluation order: ascending priority, then descending
                // confidence weight.
                compiled.sort_by(|a, b| {
                    a.rule.priority.cmp(&b.rule.priority).then_with(|| {
                        b.rule
                            .confidence_weight
                            .partial_cmp(&a.rule.confidence_weight)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    })
                });

                debug!(
                    subsystem = "rules",
                    component = "engine",
                    op = "load_rules",
                    loaded = compiled.len(),
                    skipped = total - compiled.len(),
                    "Loaded active rule set"
                );
                Ok(compiled)
            })
            .await
    }
}

/// Evaluate one compiled rule against a content record.
fn evaluate(rule: &CompiledRule, content: &ContentRecord) -> Result<Option<ContextSuggestion>> {
    let weight = rule.rule.confidence_weight;

    let (fired, confidence, venue_name) = match &rule.matcher {
        CompiledMatcher::Pattern { regex, field } => {
            let title_hit = matches!(field, PatternField::Title | PatternField::Any)
                && regex.is_match(&content.title);
            let description_hit = matches!(field, PatternField::Description | PatternField::Any)
                && content
                    .description
                    .as_deref()
                    .is_some_and(|d| regex.is_match(d));
            (title_hit || description_hit, weight, None)
        }

        CompiledMatcher::Keyword { keywords, mode } => {
            let mut haystack = content.title.to_lowercase();
            if let Some(description) = &content.description {
                haystack.push(' ');
                haystack.push_str(&description.to_lowercase());
            }

            let matched = keywords
                .iter()
                .filter(|keyword| haystack.contains(keyword.as_str()))
                .count();

            match mode {
                KeywordMode::Any => {
                    let fraction = matched as f64 / keywords.len() as f64;
                    (matched > 0, weight * fraction, None)
                }
                KeywordMode::All => (matched == keywords.len(), weight, None),
            }
        }

        CompiledMatcher::ChannelMapping { provider, channels } => {
            let platform_matches = content.provider == Some(*provider);
            let channel_matches = platform_matches
                && [&content.channel_id, &content.channel_name]
                    .into_iter()
                    .flatten()
                    .any(|value| channels.contains(&value.to_lowercase()));
            (channel_matches, weight, None)
        }

        CompiledMatcher::TitlePattern {
            needle,
            venue_regex,
        } => {
            let fired = content.title.to_lowercase().contains(needle.as_str());
            let venue = if fired {
                venue_regex
                    .as_ref()
                    .and_then(|re| re.captures(&content.title))
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|name| !name.is_empty())
            } else {
                None
            };
            (fired, weight, venue)
        }
    };

    if !fired {
        return Ok(None);
    }

    Ok(Some(ContextSuggestion {
        context_type: rule.rule.target_context_type,
        context_name: rule.rule.target_context_name.clone(),
        venue_name,
        confidence: confidence.clamp(0.0, 1.0),
        requires_approval: rule.rule.requires_approval,
        rule_id: rule.rule.id,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FakeClock;
    use async_trait::async_trait;
    use mixcat_core::{ContextRule, Provider, RuleType};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct FakeRuleRepo {
        rules: Vec<ContextRule>,
        loads: AtomicUsize,
    }

    impl FakeRuleRepo {
        fn new(rules: Vec<ContextRule>) -> Arc<Self> {
            Arc::new(Self {
                rules,
                loads: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RuleRepository for FakeRuleRepo {
        async fn list_active(&self) -> Result<Vec<ContextRule>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(self.rules.clone())
        }
    }

    fn rule(
        rule_type: RuleType,
        context_type: ContextType,
        name: &str,
        config: serde_json::Value,
        weight: f64,
        priority: i32,
    ) -> ContextRule {
        ContextRule {
            id: Uuid::new_v4(),
            rule_type,
            target_context_type: context_type,
            target_context_name: name.into(),
            config,
            confidence_weight: weight,
            requires_approval: true,
            priority,
            is_active: true,
        }
    }

    fn content(title: &str) -> ContentRecord {
        ContentRecord {
            provider: Some(Provider::Youtube),
            title: title.into(),
            description: None,
            channel_id: Some("UCcercle".into()),
            channel_name: Some("Cercle".into()),
        }
    }

    #[tokio::test]
    async fn test_pattern_rule_fires_on_title() {
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::Pattern,
            ContextType::Festival,
            "Tomorrowland",
            json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
            0.9,
            10,
        )]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Amelie Lens @ Tomorrowland 2024"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].context_name, "Tomorrowland");
        assert_eq!(suggestions[0].confidence, 0.9);
        assert!(suggestions[0].requires_approval);
    }

    #[tokio::test]
    async fn test_keyword_any_scales_confidence_by_fraction() {
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::Keyword,
            ContextType::RadioShow,
            "Group Therapy",
            json!({"type": "keyword", "keywords": ["group therapy", "abgt", "anjuna"], "mode": "any"}),
            0.9,
            10,
        )]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("ABGT 550 anjuna takeover"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        // 2 of 3 keywords matched.
        assert!((suggestions[0].confidence - 0.6).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_keyword_all_requires_every_keyword() {
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::Keyword,
            ContextType::RadioShow,
            "ASOT",
            json!({"type": "keyword", "keywords": ["state of trance", "episode"], "mode": "all"}),
            0.8,
            10,
        )]);
        let engine = ContextRuleEngine::new(repo);

        assert!(engine
            .suggest_contexts(&content("A State Of Trance"))
            .await
            .unwrap()
            .is_empty());
        let suggestions = engine
            .suggest_contexts(&content("A State Of Trance episode 1100"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].confidence, 0.8);
    }

    #[tokio::test]
    async fn test_channel_mapping_requires_platform_and_membership() {
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::ChannelMapping,
            ContextType::Publisher,
            "Cercle",
            json!({"type": "channel_mapping", "provider": "youtube", "channels": ["cercle"]}),
            0.95,
            5,
        )]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Ben Böhmer live above the clouds"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].context_name, "Cercle");

        // Same channel on a different platform: no match.
        let mut other_platform = content("Ben Böhmer live above the clouds");
        other_platform.provider = Some(Provider::Soundcloud);
        assert!(engine
            .suggest_contexts(&other_platform)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_title_pattern_extracts_venue() {
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::TitlePattern,
            ContextType::Series,
            "Live Sets",
            json!({
                "type": "title_pattern",
                "needle": "live at",
                "venue_pattern": "(?i)live at ([^|\\-\\[\\(]+)"
            }),
            0.7,
            20,
        )]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Lane 8 Live At Red Rocks - 2023"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].venue_name.as_deref(), Some("Red Rocks"));
    }

    #[tokio::test]
    async fn test_duplicate_suggestions_keep_higher_confidence() {
        // A festival pattern rule and a publisher channel rule targeting the
        // same context name: one deduplicated entry, higher confidence wins.
        let repo = FakeRuleRepo::new(vec![
            rule(
                RuleType::Pattern,
                ContextType::Festival,
                "Tomorrowland",
                json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
                0.7,
                10,
            ),
            rule(
                RuleType::ChannelMapping,
                ContextType::Festival,
                "TOMORROWLAND",
                json!({"type": "channel_mapping", "provider": "youtube", "channels": ["cercle"]}),
                0.95,
                5,
            ),
        ]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Tomorrowland 2024 mainstage"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].confidence, 0.95);
        assert_eq!(suggestions[0].context_name, "TOMORROWLAND");
    }

    #[tokio::test]
    async fn test_suggestions_ordered_by_descending_confidence() {
        let repo = FakeRuleRepo::new(vec![
            rule(
                RuleType::Pattern,
                ContextType::Festival,
                "Tomorrowland",
                json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
                0.6,
                10,
            ),
            rule(
                RuleType::ChannelMapping,
                ContextType::Publisher,
                "Cercle",
                json!({"type": "channel_mapping", "provider": "youtube", "channels": ["cercle"]}),
                0.95,
                5,
            ),
        ]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Tomorrowland aftermovie"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 2);
        assert_eq!(suggestions[0].context_name, "Cercle");
        assert_eq!(suggestions[1].context_name, "Tomorrowland");
    }

    #[tokio::test]
    async fn test_bad_rule_is_isolated() {
        // The invalid regex is rejected at load; the remaining rules still
        // evaluate and return suggestions.
        let repo = FakeRuleRepo::new(vec![
            rule(
                RuleType::Pattern,
                ContextType::Festival,
                "Broken",
                json!({"type": "pattern", "pattern": "(unclosed"}),
                0.9,
                1,
            ),
            rule(
                RuleType::Pattern,
                ContextType::Festival,
                "Tomorrowland",
                json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
                0.8,
                10,
            ),
        ]);
        let engine = ContextRuleEngine::new(repo);

        let suggestions = engine
            .suggest_contexts(&content("Tomorrowland 2024"))
            .await
            .unwrap();
        assert_eq!(suggestions.len(), 1);
        assert_eq!(suggestions[0].context_name, "Tomorrowland");
    }

    #[tokio::test]
    async fn test_rule_cache_ttl_and_invalidation() {
        let clock = Arc::new(FakeClock::new());
        let repo = FakeRuleRepo::new(vec![rule(
            RuleType::Pattern,
            ContextType::Festival,
            "Tomorrowland",
            json!({"type": "pattern", "pattern": "(?i)tomorrowland"}),
            0.9,
            10,
        )]);
        let engine = ContextRuleEngine::with_clock(
            repo.clone(),
            Duration::from_secs(300),
            clock.clone(),
        );

        let record = content("Tomorrowland");
        engine.suggest_contexts(&record).await.unwrap();
        engine.suggest_contexts(&record).await.unwrap();
        assert_eq!(repo.loads.load(Ordering::SeqCst), 1);

        clock.advance(Duration::from_secs(301));
        engine.suggest_contexts(&record).await.unwrap();
        assert_eq!(repo.loads.load(Ordering::SeqCst), 2);

        engine.invalidate_cache();
        engine.suggest_contexts(&record).await.unwrap();
        assert_eq!(repo.loads.load(Ordering::SeqCst), 3);
    }
}
