//! Features that own dynamic rules, and the rule shape each one installs.

use std::fmt;
use std::str::FromStr;

use ruleward_rules::host_url_filter;
use ruleward_rules::ResourceType;
use ruleward_rules::Rule;
use ruleward_rules::RuleAction;
use ruleward_rules::RuleCondition;
use ruleward_rules::RuleId;
use serde::Deserialize;
use serde::Serialize;

use crate::error::RuleIdError;

/// A logical component that installs dynamic rules.
///
/// The serialized name is also the suffix of the feature's storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Feature {
    Lockout,
    WordBlocker,
    Debug,
}

impl Feature {
    pub const ALL: [Feature; 3] = [Feature::Lockout, Feature::WordBlocker, Feature::Debug];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Lockout => "lockout",
            Feature::WordBlocker => "wordBlocker",
            Feature::Debug => "debug",
        }
    }

    /// Extension page this feature's redirect rules point at.
    ///
    /// Used to recognise the feature's rules when their ids fall outside its
    /// range. `None` for features whose rules carry no such marker.
    pub fn fingerprint(&self) -> Option<&'static str> {
        match self {
            Feature::Lockout => Some("/lockout.html"),
            Feature::WordBlocker => Some("/word-blocked.html"),
            Feature::Debug => None,
        }
    }

    /// True when `rule` carries this feature's fingerprint.
    pub fn matches_fingerprint(&self, rule: &Rule) -> bool {
        match (self.fingerprint(), rule.redirect_extension_path()) {
            (Some(fingerprint), Some(path)) => path.starts_with(fingerprint),
            _ => false,
        }
    }

    /// The feature whose fingerprint `rule` carries, if any.
    pub fn from_fingerprint(rule: &Rule) -> Option<Feature> {
        Feature::ALL.into_iter().find(|feature| feature.matches_fingerprint(rule))
    }

    /// Template for the per-host rules this feature installs.
    pub fn blueprint(&self) -> RuleBlueprint {
        match self {
            Feature::Lockout => RuleBlueprint {
                priority: 2,
                action: RuleAction::redirect_to_extension("/lockout.html"),
                resource_types: vec![ResourceType::MainFrame],
            },
            Feature::WordBlocker => RuleBlueprint {
                priority: 1,
                action: RuleAction::redirect_to_extension("/word-blocked.html"),
                resource_types: vec![ResourceType::MainFrame],
            },
            Feature::Debug => RuleBlueprint {
                priority: 1,
                action: RuleAction::block(),
                resource_types: vec![ResourceType::MainFrame, ResourceType::SubFrame],
            },
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = RuleIdError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Feature::ALL.into_iter().find(|feature| feature.as_str() == name).ok_or_else(|| {
            RuleIdError::UnknownFeature {
                name: name.to_string(),
            }
        })
    }
}

/// Priority, action and resource types shared by all of a feature's host rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBlueprint {
    pub priority: u32,
    pub action: RuleAction,
    pub resource_types: Vec<ResourceType>,
}

impl RuleBlueprint {
    /// Rule matching `host` and its subdomains under `id`.
    pub fn host_rule(&self, id: RuleId, host: &str) -> Rule {
        Rule {
            id,
            priority: self.priority,
            action: self.action.clone(),
            condition: RuleCondition {
                url_filter: Some(host_url_filter(host)),
                resource_types: self.resource_types.clone(),
            },
        }
    }
}
