//! Rule objects as understood by the host rule engine.

use serde::Deserialize;
use serde::Serialize;

/// Numeric identifier of a dynamic rule. Unique across the whole host table.
pub type RuleId = u32;

/// A single dynamic rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rule {
    pub id: RuleId,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl Rule {
    /// Same rule under a different id.
    pub fn with_id(&self, id: RuleId) -> Self {
        Self { id, ..self.clone() }
    }

    /// Extension path of a redirect action, if any.
    pub fn redirect_extension_path(&self) -> Option<&str> {
        self.action.redirect.as_ref().and_then(|r| r.extension_path.as_deref())
    }
}

/// What the host does when a rule matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum RuleActionType {
    Block,
    Redirect,
    Allow,
    UpgradeScheme,
    AllowAllRequests,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: RuleActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<Redirect>,
}

impl RuleAction {
    pub fn block() -> Self {
        Self {
            kind: RuleActionType::Block,
            redirect: None,
        }
    }

    pub fn redirect_to_extension(path: impl Into<String>) -> Self {
        Self {
            kind: RuleActionType::Redirect,
            redirect: Some(Redirect {
                extension_path: Some(path.into()),
                ..Default::default()
            }),
        }
    }
}

/// Redirect target. Exactly one field is expected to be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_substitution: Option<String>,
}

impl Redirect {
    pub fn is_empty(&self) -> bool {
        self.extension_path.is_none() && self.url.is_none() && self.regex_substitution.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Object,
    #[serde(rename = "xmlhttprequest")]
    XmlHttpRequest,
    Ping,
    Media,
    Websocket,
    Other,
}
