//! Context rule store implementation (read-only).

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};

use mixcat_core::{
    ContextRule, ContextType, Error, Result, RuleRepository, RuleType,
};

/// PostgreSQL implementation of RuleRepository.
///
/// Rule lifecycle is managed by external tooling; this repository only lists
/// what is currently active, in evaluation order.
#[derive(Clone)]
pub struct PgRuleRepository {
    pool: Pool<Postgres>,
}

impl PgRuleRepository {
    /// Create a new PgRuleRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn str_to_rule_type(s: &str) -> RuleType {
        match s {
            "pattern" => RuleType::Pattern,
            "keyword" => RuleType::Keyword,
            "channel_mapping" => RuleType::ChannelMapping,
            "title_pattern" => RuleType::TitlePattern,
            _ => RuleType::Pattern, // fallback
        }
    }

    fn str_to_context_type(s: &str) -> ContextType {
        match s {
            "festival" => ContextType::Festival,
            "radio_show" => ContextType::RadioShow,
            "publisher" => ContextType::Publisher,
            "label" => ContextType::Label,
            "promoter" => ContextType::Promoter,
            "series" => ContextType::Series,
            "stage" => ContextType::Stage,
            _ => ContextType::Festival, // fallback
        }
    }
}

#[async_trait]
impl RuleRepository for PgRuleRepository {
    async fn list_active(&self) -> Result<Vec<ContextRule>> {
        let rows = sqlx::query(
            "SELECT id, rule_type, target_context_type, target_context_name, config,
                    confidence_weight, requires_approval, priority, is_active
             FROM context_rules
             WHERE is_active
             ORDER BY priority ASC, confidence_weight DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| ContextRule {
                id: row.get("id"),
                rule_type: Self::str_to_rule_type(row.get("rule_type")),
                target_context_type: Self::str_to_context_type(row.get("target_context_type")),
                target_context_name: row.get("target_context_name"),
                config: row.get("config"),
                confidence_weight: row.get("confidence_weight"),
                requires_approval: row.get("requires_approval"),
                priority: row.get("priority"),
                is_active: row.get("is_active"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_str_to_rule_type_all_variants() {
        assert_eq!(PgRuleRepository::str_to_rule_type("pattern"), RuleType::Pattern);
        assert_eq!(PgRuleRepository::str_to_rule_type("keyword"), RuleType::Keyword);
        assert_eq!(
            PgRuleRepository::str_to_rule_type("channel_mapping"),
            RuleType::ChannelMapping
        );
        assert_eq!(
            PgRuleRepository::str_to_rule_type("title_pattern"),
            RuleType::TitlePattern
        );
    }

    #[test]
    fn test_str_to_context_type_matches_as_str() {
        for ct in [
            ContextType::Festival,
            ContextType::RadioShow,
            ContextType::Publisher,
            ContextType::Label,
            ContextType::Promoter,
            ContextType::Series,
            ContextType::Stage,
        ] {
            assert_eq!(PgRuleRepository::str_to_context_type(ct.as_str()), ct);
        }
    }
}
