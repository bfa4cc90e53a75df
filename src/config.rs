//! Node configuration: identity, peer roster, protocol constants, and logging,
//! loaded from and saved to a TOML file via the teacher's `from_file`/`to_file`
//! layering, scoped down to what this node actually needs.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::blockchain::{REWARD, TBITS, THRESHOLD};
use crate::error::{NodeError, NodeResult};

/// This node's own identity and on-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// This node's id within the roster. Matches `--mid`.
    pub node_id: String,
    pub data_dir: PathBuf,
}

impl NodeConfig {
    fn default_data_dir(node_id: &str) -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("./data"))
            .join("tipchain")
            .join(node_id)
    }

    pub fn new(node_id: String) -> Self {
        let data_dir = Self::default_data_dir(&node_id);
        NodeConfig { node_id, data_dir }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new("node-0".to_string())
    }
}

/// The static configured peer set: `node_id -> endpoint`, broadcast to
/// unconditionally and sequentially on every outbound message.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RosterConfig {
    pub peers: HashMap<String, String>,
}

impl RosterConfig {
    pub fn endpoint(&self, node_id: &str) -> Option<&str> {
        self.peers.get(node_id).map(|s| s.as_str())
    }
}

/// The protocol's fixed difficulty and economic constants. These are not
/// meant to vary per deployment; they're exposed here so a config file can
/// record them alongside the rest of a node's settings, not so they can be
/// tuned away from the values the protocol actually uses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProtocolConfig {
    pub tbits: u32,
    pub reward: u64,
    pub mempool_threshold: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        ProtocolConfig {
            tbits: TBITS,
            reward: REWARD,
            mempool_threshold: THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub enable_console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            enable_console: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub node: NodeConfig,
    pub roster: RosterConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn new(node_id: String) -> Self {
        Config {
            node: NodeConfig::new(node_id),
            ..Default::default()
        }
    }

    pub fn from_file(path: &PathBuf) -> NodeResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::ConfigError(format!("reading {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| NodeError::ConfigError(format!("parsing {}: {}", path.display(), e)))
    }

    pub fn to_file(&self, path: &PathBuf) -> NodeResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| NodeError::ConfigError(format!("serializing config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| NodeError::ConfigError(format!("writing {}: {}", path.display(), e)))
    }

    pub fn wallet_file(&self) -> PathBuf {
        self.node.data_dir.join(format!("{}.wallet", self.node.node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_protocol_config_matches_fixed_constants() {
        let protocol = ProtocolConfig::default();
        assert_eq!(protocol.tbits, TBITS);
        assert_eq!(protocol.reward, REWARD);
        assert_eq!(protocol.mempool_threshold, THRESHOLD);
    }

    #[test]
    fn roundtrips_through_toml_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::new("node-1".to_string());
        config.roster.peers.insert("node-2".to_string(), "127.0.0.1:9001".to_string());
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.node.node_id, "node-1");
        assert_eq!(loaded.roster.endpoint("node-2"), Some("127.0.0.1:9001"));
    }
}
