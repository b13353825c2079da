use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Label carrying the per-resource auto-update opt-in/opt-out.
pub const AUTO_UPDATE_LABEL: &str = "tsugi.auto-update";

/// Labels identifying a stack-managed container. Such containers are only
/// ever updated through the stack path.
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const SWARM_NAMESPACE_LABEL: &str = "com.docker.stack.namespace";

/// Tri-state auto-update policy, parsed once from the label value instead
/// of re-interpreting the raw string at every decision point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePolicy {
    Enabled,
    Disabled,
    #[default]
    Unspecified,
}

impl UpdatePolicy {
    /// Parse the documented truthy/falsy spellings. Unknown values count as
    /// unspecified rather than failing the resource.
    pub fn from_label(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("true") | Some("1") | Some("yes") | Some("on") | Some("enabled") => Self::Enabled,
            Some("false") | Some("0") | Some("no") | Some("off") | Some("disabled") => {
                Self::Disabled
            }
            _ => Self::Unspecified,
        }
    }

    pub fn from_labels(labels: &HashMap<String, String>) -> Self {
        Self::from_label(labels.get(AUTO_UPDATE_LABEL).map(String::as_str))
    }

    /// True when the resource has opted out of automatic updates.
    pub fn opted_out(self) -> bool {
        self == Self::Disabled
    }
}

/// The stack (compose project or swarm namespace) a container belongs to.
pub fn stack_name(labels: &HashMap<String, String>) -> Option<&str> {
    labels
        .get(COMPOSE_PROJECT_LABEL)
        .or_else(|| labels.get(SWARM_NAMESPACE_LABEL))
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthy_and_falsy_spellings() {
        for v in ["true", "1", "yes", "ON", "Enabled"] {
            assert_eq!(UpdatePolicy::from_label(Some(v)), UpdatePolicy::Enabled);
        }
        for v in ["false", "0", "no", "Off", "DISABLED"] {
            assert_eq!(UpdatePolicy::from_label(Some(v)), UpdatePolicy::Disabled);
        }
        assert_eq!(UpdatePolicy::from_label(None), UpdatePolicy::Unspecified);
        assert_eq!(UpdatePolicy::from_label(Some("maybe")), UpdatePolicy::Unspecified);
    }

    #[test]
    fn test_stack_name_prefers_compose_project() {
        let mut labels = HashMap::new();
        labels.insert(SWARM_NAMESPACE_LABEL.to_string(), "swarmstack".to_string());
        labels.insert(COMPOSE_PROJECT_LABEL.to_string(), "webapp".to_string());
        assert_eq!(stack_name(&labels), Some("webapp"));
    }
}
