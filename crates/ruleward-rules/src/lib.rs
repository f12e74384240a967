//! Dynamic rule model and the host rule engine interface.
//!
//! Rules follow the JSON shape of Chrome's `declarativeNetRequest` dynamic
//! rules, so payloads produced here can be handed to the browser unchanged.
//! The host engine is an external collaborator; [`RuleEngine`] describes the
//! two calls the allocator needs from it and [`DeterministicRuleEngine`]
//! enforces the same contract in memory for tests.

mod engine;
pub mod inmemory;
mod rule;
mod url_filter;

pub use engine::RuleEngine;
pub use engine::RuleEngineError;
pub use engine::UpdateRuleOptions;
pub use inmemory::DeterministicRuleEngine;
pub use rule::Redirect;
pub use rule::ResourceType;
pub use rule::Rule;
pub use rule::RuleAction;
pub use rule::RuleActionType;
pub use rule::RuleCondition;
pub use rule::RuleId;
pub use url_filter::host_from_url_filter;
pub use url_filter::host_url_filter;
