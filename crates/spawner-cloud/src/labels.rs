//! Default resource tags and label merging

use std::collections::HashMap;

/// Tag key identifying resources provisioned through Spawner
pub const CREATOR_LABEL: &str = "creator";

/// Tag key carrying the provisioning service version
pub const PROVISIONER_VERSION_LABEL: &str = "provisioner-version";

/// Tags attached to every cluster, node pool, volume and snapshot
pub fn default_tags() -> HashMap<String, String> {
    HashMap::from([
        (CREATOR_LABEL.to_string(), "spawner-service".to_string()),
        (
            PROVISIONER_VERSION_LABEL.to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ),
    ])
}

/// Merge caller labels over `base`. Last write wins, so a caller-supplied
/// value replaces a default with the same key.
pub fn merge_labels(
    mut base: HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    for (k, v) in overrides {
        base.insert(k.clone(), v.clone());
    }
    base
}

/// Default tags merged with caller labels
pub fn with_default_tags(labels: &HashMap<String, String>) -> HashMap<String, String> {
    merge_labels(default_tags(), labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_labels_override_defaults() {
        let labels = HashMap::from([
            (CREATOR_LABEL.to_string(), "team-ml".to_string()),
            ("workspace".to_string(), "ws-42".to_string()),
        ]);

        let merged = with_default_tags(&labels);
        assert_eq!(merged.get(CREATOR_LABEL).map(String::as_str), Some("team-ml"));
        assert_eq!(merged.get("workspace").map(String::as_str), Some("ws-42"));
        assert!(merged.contains_key(PROVISIONER_VERSION_LABEL));
    }

    #[test]
    fn test_empty_labels_keep_defaults() {
        let merged = with_default_tags(&HashMap::new());
        assert_eq!(merged, default_tags());
    }
}
