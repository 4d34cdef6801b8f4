use crate::errors::{GatewayError, GatewayResult};

/// Predicate deciding whether a target serves a requested model.
///
/// The production rule is a crude substring test; keeping it behind this
/// type means hardening the rule later does not touch any caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelMatcher {
    /// Matches any model identifier containing the marker.
    Contains(String),
    /// Matches every model identifier. Place last.
    Any,
}

impl ModelMatcher {
    pub fn matches(&self, model: &str) -> bool {
        match self {
            ModelMatcher::Contains(marker) => model.contains(marker.as_str()),
            ModelMatcher::Any => true,
        }
    }
}

/// One backend a request can be routed to. Immutable after process start.
#[derive(Debug, Clone)]
pub struct ProviderTarget {
    pub id: String,
    pub base_url: String,
    pub credential: String,
    pub matcher: ModelMatcher,
    pub supports_vision: bool,
    pub supports_tools: bool,
}

/// Static table mapping a requested model identifier to a backend target.
/// The set of targets is the single source of truth for routing.
pub struct ProviderRegistry {
    targets: Vec<ProviderTarget>,
}

impl ProviderRegistry {
    pub fn new(targets: Vec<ProviderTarget>) -> Self {
        ProviderRegistry { targets }
    }

    /// Select the first target whose predicate matches, in declaration order.
    pub fn select(&self, model: &str) -> GatewayResult<&ProviderTarget> {
        self.targets
            .iter()
            .find(|target| target.matcher.matches(model))
            .ok_or_else(|| GatewayError::NoProviderMatch(model.to_string()))
    }
}
