//! Repository configuration.

use serde::{Deserialize, Serialize};

use crate::Result;

/// Which record store backs a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,
}

/// Repository settings. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub backend: BackendConfig,
    /// Node type of the root node.
    pub root_node_type: String,
    /// Node type whose children are exported as one file per item.
    pub array_node_type: String,
    /// Name of the ordering file inside an exported array directory.
    pub order_file: String,
    /// Name of the root document in an exported tree or package.
    pub root_file: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::Memory,
            root_node_type: "root".into(),
            array_node_type: "array".into(),
            order_file: ".order".into(),
            root_file: "root.json".into(),
        }
    }
}

impl RepositoryConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_gives_defaults() {
        let cfg = RepositoryConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, RepositoryConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let cfg = RepositoryConfig::from_json_str(
            r#"{"backend": {"kind": "memory"}, "array_node_type": "list"}"#,
        )
        .unwrap();
        assert_eq!(cfg.array_node_type, "list");
        assert_eq!(cfg.root_file, "root.json");
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(RepositoryConfig::from_json_str(r#"{"backend": {"kind": "bolt"}}"#).is_err());
    }
}
