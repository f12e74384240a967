//! In-memory implementation of [`RuleEngine`] for testing.
//!
//! Enforces the host contract the allocator relies on: rule ids are unique
//! across the table, each update is validated in full before any of it is
//! applied, and a failed update leaves the table untouched.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::engine::RuleEngine;
use crate::engine::RuleEngineError;
use crate::engine::UpdateRuleOptions;
use crate::rule::Rule;
use crate::rule::RuleActionType;
use crate::rule::RuleId;

/// Chrome's limit on dynamic rules per extension.
pub const DEFAULT_MAX_DYNAMIC_RULES: usize = 30_000;

#[derive(Default)]
struct EngineState {
    rules: BTreeMap<RuleId, Rule>,
    fail_next: Option<RuleEngineError>,
}

/// In-memory deterministic rule table.
pub struct DeterministicRuleEngine {
    state: Mutex<EngineState>,
    max_rules: usize,
    updates_applied: AtomicU64,
}

impl Default for DeterministicRuleEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(EngineState::default()),
            max_rules: DEFAULT_MAX_DYNAMIC_RULES,
            updates_applied: AtomicU64::new(0),
        }
    }
}

impl DeterministicRuleEngine {
    /// Create an empty rule table with the default quota.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Create an empty rule table that holds at most `max_rules` rules.
    pub fn with_max_rules(max_rules: usize) -> Arc<Self> {
        Arc::new(Self {
            max_rules,
            ..Self::default()
        })
    }

    /// Create a table pre-populated with `rules`, bypassing validation.
    ///
    /// Used to model rules left behind by an earlier version of an extension.
    pub fn with_rules(rules: Vec<Rule>) -> Arc<Self> {
        let state = EngineState {
            rules: rules.into_iter().map(|rule| (rule.id, rule)).collect(),
            fail_next: None,
        };
        Arc::new(Self {
            state: Mutex::new(state),
            ..Self::default()
        })
    }

    /// Make the next `update_rules` call fail with `err` without touching the table.
    pub async fn fail_next_update(&self, err: RuleEngineError) {
        self.state.lock().await.fail_next = Some(err);
    }

    /// Number of successful `update_rules` calls.
    pub fn updates_applied(&self) -> u64 {
        self.updates_applied.load(Ordering::SeqCst)
    }

    /// Ids currently installed, ascending.
    pub async fn rule_ids(&self) -> Vec<RuleId> {
        self.state.lock().await.rules.keys().copied().collect()
    }

    pub async fn get(&self, id: RuleId) -> Option<Rule> {
        self.state.lock().await.rules.get(&id).cloned()
    }
}

fn validate_rule(rule: &Rule) -> Result<(), RuleEngineError> {
    let invalid = |reason: &str| RuleEngineError::InvalidRule {
        id: rule.id,
        reason: reason.to_string(),
    };
    if rule.id == 0 {
        return Err(invalid("id must be at least 1"));
    }
    if rule.priority == 0 {
        return Err(invalid("priority must be at least 1"));
    }
    if rule.action.kind == RuleActionType::Redirect {
        match &rule.action.redirect {
            Some(redirect) if !redirect.is_empty() => {}
            _ => return Err(invalid("redirect action requires a redirect target")),
        }
    }
    if matches!(rule.condition.url_filter.as_deref(), Some(filter) if filter.trim().is_empty()) {
        return Err(invalid("urlFilter must not be empty"));
    }
    Ok(())
}

#[async_trait]
impl RuleEngine for DeterministicRuleEngine {
    async fn update_rules(&self, options: UpdateRuleOptions) -> Result<(), RuleEngineError> {
        let mut state = self.state.lock().await;

        if let Some(err) = state.fail_next.take() {
            return Err(err);
        }

        let removing: BTreeSet<RuleId> = options.remove_rule_ids.iter().copied().collect();
        let mut adding = BTreeSet::new();
        for rule in &options.add_rules {
            validate_rule(rule)?;
            if !adding.insert(rule.id) {
                return Err(RuleEngineError::DuplicateId { id: rule.id });
            }
            if state.rules.contains_key(&rule.id) && !removing.contains(&rule.id) {
                return Err(RuleEngineError::DuplicateId { id: rule.id });
            }
        }

        let remaining = state.rules.keys().filter(|id| !removing.contains(id)).count();
        let count = remaining + adding.len();
        if count > self.max_rules {
            return Err(RuleEngineError::QuotaExceeded {
                count,
                max: self.max_rules,
            });
        }

        for id in &removing {
            state.rules.remove(id);
        }
        for rule in options.add_rules {
            state.rules.insert(rule.id, rule);
        }
        self.updates_applied.fetch_add(1, Ordering::SeqCst);

        debug!(removed = removing.len(), added = adding.len(), total = state.rules.len(), "dynamic rules updated");
        Ok(())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, RuleEngineError> {
        Ok(self.state.lock().await.rules.values().cloned().collect())
    }
}
