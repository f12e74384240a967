//! Host-level rule operations for features.
//!
//! [`RuleManager`] wires the lock, allocator, commit adapter and migration
//! pass together and exposes the operations features actually call: block
//! or unblock hosts, replace a feature's whole rule set, and run the startup
//! migration. Each operation is one critical section.

use std::collections::BTreeSet;
use std::sync::Arc;

use ruleward_kv::KeyValueStore;
use ruleward_rules::host_from_url_filter;
use ruleward_rules::Rule;
use ruleward_rules::RuleEngine;
use ruleward_rules::RuleId;
use ruleward_rules::UpdateRuleOptions;
use snafu::ResultExt;
use tracing::info;
use tracing::warn;

use crate::allocator::range_exhausted;
use crate::allocator::RuleIdAllocator;
use crate::commit::CommitReport;
use crate::commit::RuleCommitter;
use crate::config::AllocatorConfig;
use crate::config::ConfigError;
use crate::error::HostListFailedSnafu;
use crate::error::RuleIdError;
use crate::feature::Feature;
use crate::lock::LockConfig;
use crate::lock::RuleLock;
use crate::migration::MigrationOutcome;
use crate::migration::RuleMigrator;
use crate::persist::read_host_index;
use crate::persist::write_host_index;
use crate::registry::RangeRegistry;
use crate::types::HostIndex;
use crate::verified::partition_owned_rules;
use crate::verified::plan_allocation;
use crate::verified::FeatureIdState;

pub struct RuleManager<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    allocator: Arc<RuleIdAllocator<S>>,
    committer: Arc<RuleCommitter<S, H>>,
    migrator: RuleMigrator<S, H>,
}

impl<S, H> RuleManager<S, H>
where
    S: KeyValueStore + ?Sized + 'static,
    H: RuleEngine + ?Sized,
{
    /// Build a manager from validated configuration.
    pub fn from_config(store: Arc<S>, engine: Arc<H>, config: &AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let registry = config.registry()?;
        Ok(Self::new(store, engine, registry, config.lock_key.clone(), config.lock.clone()))
    }

    pub fn new(
        store: Arc<S>,
        engine: Arc<H>,
        registry: RangeRegistry,
        lock_key: String,
        lock_config: LockConfig,
    ) -> Self {
        let lock = Arc::new(RuleLock::new(store.clone(), lock_key, lock_config));
        let allocator = Arc::new(RuleIdAllocator::new(store, Arc::new(registry), lock));
        let committer = Arc::new(RuleCommitter::new(allocator.clone(), engine));
        let migrator = RuleMigrator::new(committer.clone());
        Self {
            allocator,
            committer,
            migrator,
        }
    }

    pub fn allocator(&self) -> &Arc<RuleIdAllocator<S>> {
        &self.allocator
    }

    pub fn committer(&self) -> &Arc<RuleCommitter<S, H>> {
        &self.committer
    }

    pub fn migrator(&self) -> &RuleMigrator<S, H> {
        &self.migrator
    }

    pub fn registry(&self) -> &RangeRegistry {
        self.allocator.registry()
    }

    pub async fn update_dynamic_rules(&self, options: UpdateRuleOptions) -> Result<CommitReport, RuleIdError> {
        self.committer.update_dynamic_rules(options).await
    }

    /// The feature's host to rule ID lookup.
    pub async fn host_index(&self, feature: Feature) -> Result<HostIndex, RuleIdError> {
        self.registry().range_for(feature)?;
        read_host_index(&**self.allocator.store(), feature).await
    }

    /// Install one rule per host for `feature`.
    ///
    /// Hosts are lowercased and deduplicated. A host that already has a rule
    /// gets it replaced in the same host update. If the host rejects the
    /// update the allocator state is restored and the error returned. A store
    /// failure after the host accepted the update keeps the new allocation
    /// and host index, and is returned after they are written.
    pub async fn apply_host_rules(&self, feature: Feature, hosts: &[String]) -> Result<Vec<Rule>, RuleIdError> {
        let hosts = normalize_hosts(hosts);
        if hosts.is_empty() {
            return Ok(Vec::new());
        }
        self.allocator.lock().with_lock(|| self.apply_host_rules_locked(feature, &hosts)).await
    }

    /// Remove the rules installed for `hosts`. Returns the freed IDs.
    ///
    /// Hosts without a rule are ignored.
    pub async fn remove_host_rules(&self, feature: Feature, hosts: &[String]) -> Result<Vec<RuleId>, RuleIdError> {
        let hosts = normalize_hosts(hosts);
        if hosts.is_empty() {
            return Ok(Vec::new());
        }
        self.allocator.lock().with_lock(|| self.remove_host_rules_locked(feature, &hosts)).await
    }

    /// Clear `feature`'s rules and install `templates` in their place.
    ///
    /// Template IDs are ignored; the new rules take IDs from the start of the
    /// range. Everything the feature owns on the host is removed in the same
    /// update, so this also repairs an active set that drifted from the host.
    pub async fn replace_feature_rules(
        &self,
        feature: Feature,
        templates: Vec<Rule>,
    ) -> Result<Vec<Rule>, RuleIdError> {
        self.allocator.lock().with_lock(|| self.replace_feature_rules_locked(feature, templates)).await
    }

    /// Migrate `feature`'s rules into its range and persist the rebuilt host index.
    pub async fn run_startup_migration(&self, feature: Feature) -> Result<MigrationOutcome, RuleIdError> {
        self.allocator.lock().with_lock(|| self.run_startup_migration_locked(feature)).await
    }

    async fn apply_host_rules_locked(&self, feature: Feature, hosts: &[String]) -> Result<Vec<Rule>, RuleIdError> {
        let store = &**self.allocator.store();
        let blueprint = feature.blueprint();
        let mut index = read_host_index(store, feature).await?;
        let before = self.allocator.load_state(feature).await?;

        let ids = self.allocator.allocate_locked(feature, hosts.len()).await?;
        let rules: Vec<Rule> = hosts.iter().zip(&ids).map(|(host, id)| blueprint.host_rule(*id, host)).collect();
        let options = UpdateRuleOptions {
            remove_rule_ids: hosts.iter().filter_map(|host| index.get(host).copied()).collect(),
            add_rules: rules.clone(),
        };

        let committed = match self.committer.update_dynamic_rules_locked(options).await {
            Err(e @ RuleIdError::HostCommitFailed { .. }) => {
                if let Err(restore) = self.allocator.persist_state(feature, &before).await {
                    warn!(feature = %feature, error = %restore, "failed to roll back rule id allocation");
                }
                return Err(e);
            }
            other => other,
        };

        // Past this point the new rules are live on the host, so the
        // allocation and index must describe them even if bookkeeping failed.
        for (host, id) in hosts.iter().zip(&ids) {
            index.insert(host.clone(), *id);
        }
        write_host_index(store, feature, &index).await?;
        committed?;
        info!(feature = %feature, hosts = hosts.len(), "host rules applied");
        Ok(rules)
    }

    async fn remove_host_rules_locked(&self, feature: Feature, hosts: &[String]) -> Result<Vec<RuleId>, RuleIdError> {
        let store = &**self.allocator.store();
        let mut index = read_host_index(store, feature).await?;
        let ids: Vec<RuleId> = hosts.iter().filter_map(|host| index.remove(host)).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.committer
            .update_dynamic_rules_locked(UpdateRuleOptions {
                remove_rule_ids: ids.clone(),
                ..Default::default()
            })
            .await?;
        write_host_index(store, feature, &index).await?;
        info!(feature = %feature, removed = ids.len(), "host rules removed");
        Ok(ids)
    }

    async fn replace_feature_rules_locked(
        &self,
        feature: Feature,
        templates: Vec<Rule>,
    ) -> Result<Vec<Rule>, RuleIdError> {
        let range = self.registry().range_for(feature)?;
        let installed = self.committer.engine().list_rules().await.context(HostListFailedSnafu)?;
        let partition = partition_owned_rules(self.registry(), feature, &installed);
        let mut old_ids: BTreeSet<RuleId> = self.allocator.load_state(feature).await?.active;
        old_ids.extend(partition.owned_ids());
        old_ids.retain(|id| !partition.foreign.contains(id));

        let base = FeatureIdState {
            active: partition.foreign.clone(),
            free: Vec::new(),
        };
        let new_ids = plan_allocation(range, &base, templates.len())
            .map_err(|available| range_exhausted(feature, range, templates.len(), available))?
            .ids;
        let rules: Vec<Rule> = templates.iter().zip(&new_ids).map(|(rule, id)| rule.with_id(*id)).collect();

        self.committer
            .update_dynamic_rules_locked(UpdateRuleOptions {
                remove_rule_ids: old_ids.into_iter().collect(),
                add_rules: rules.clone(),
            })
            .await?;
        self.allocator.set_active_locked(feature, &new_ids).await?;

        let index: HostIndex = rules
            .iter()
            .filter_map(|rule| {
                let host = rule.condition.url_filter.as_deref().and_then(host_from_url_filter)?;
                Some((host, rule.id))
            })
            .collect();
        write_host_index(&**self.allocator.store(), feature, &index).await?;

        info!(feature = %feature, rules = rules.len(), "feature rules replaced");
        Ok(rules)
    }

    async fn run_startup_migration_locked(&self, feature: Feature) -> Result<MigrationOutcome, RuleIdError> {
        let store = &**self.allocator.store();
        let installed = self.committer.engine().list_rules().await.context(HostListFailedSnafu)?;
        let index = read_host_index(store, feature).await?;

        let outcome = self.migrator.migrate_bad_ids_locked(feature, &installed, &index).await?;
        if outcome.index != index {
            write_host_index(store, feature, &outcome.index).await?;
        }
        Ok(outcome)
    }
}

/// Lowercase, trim and deduplicate, keeping first-seen order.
fn normalize_hosts(hosts: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    hosts
        .iter()
        .map(|host| host.trim().trim_end_matches('.').to_ascii_lowercase())
        .filter(|host| !host.is_empty() && seen.insert(host.clone()))
        .collect()
}
