use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::rule::Rule;
use crate::rule::RuleId;

/// One atomic change to the host's dynamic rule table.
///
/// Removals are applied before additions, so an id may appear in both lists
/// to replace a rule in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRuleOptions {
    #[serde(default)]
    pub remove_rule_ids: Vec<RuleId>,
    #[serde(default)]
    pub add_rules: Vec<Rule>,
}

impl UpdateRuleOptions {
    pub fn is_empty(&self) -> bool {
        self.remove_rule_ids.is_empty() && self.add_rules.is_empty()
    }
}

/// Rejections reported by the host rule engine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuleEngineError {
    #[error("rule {id} is invalid: {reason}")]
    InvalidRule { id: RuleId, reason: String },
    #[error("rule id {id} is already in use")]
    DuplicateId { id: RuleId },
    #[error("dynamic rule quota exceeded: {count} rules (max: {max})")]
    QuotaExceeded { count: usize, max: usize },
    #[error("host rejected the update: {reason}")]
    Rejected { reason: String },
}

/// The host's dynamic rule table.
///
/// `update_rules` is atomic from the perspective of rule matching: either the
/// whole change applies or the call fails and the table is unchanged.
#[async_trait]
pub trait RuleEngine: Send + Sync {
    async fn update_rules(&self, options: UpdateRuleOptions) -> Result<(), RuleEngineError>;

    async fn list_rules(&self) -> Result<Vec<Rule>, RuleEngineError>;
}

#[async_trait]
impl<T: RuleEngine + ?Sized> RuleEngine for std::sync::Arc<T> {
    async fn update_rules(&self, options: UpdateRuleOptions) -> Result<(), RuleEngineError> {
        (**self).update_rules(options).await
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, RuleEngineError> {
        (**self).list_rules().await
    }
}
