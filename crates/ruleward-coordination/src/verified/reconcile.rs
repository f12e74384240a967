//! Bookkeeping implied by a host rule update.

use std::collections::BTreeSet;

use ruleward_rules::Rule;
use ruleward_rules::RuleId;

/// IDs an update frees: removed and not re-added. Ascending, no duplicates.
///
/// An ID in both lists is a replace-in-place and stays active.
pub fn released_ids(remove_rule_ids: &[RuleId], add_rules: &[Rule]) -> Vec<RuleId> {
    let added: BTreeSet<RuleId> = add_rules.iter().map(|rule| rule.id).collect();
    let removed: BTreeSet<RuleId> = remove_rule_ids.iter().copied().collect();
    removed.difference(&added).copied().collect()
}
