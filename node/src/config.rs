use chain_common::Modules;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// `program <config.json> [true]` (spec.md §6). The second positional
/// argument toggles console logging on top of the file logger, the same
/// shape as the original's `<config.libconfig> [true]`, with JSON
/// substituted for the config format (see DESIGN.md).
#[derive(Debug, Parser)]
#[command(name = "chain-node", about = "Read-only P2P block replication node")]
pub struct Cli {
    /// Path to the node's JSON configuration file.
    pub config_path: PathBuf,

    /// When present and `true`, also logs to stdout/stderr.
    #[arg(default_value_t = false)]
    pub console_log: bool,
}

fn default_port() -> u16 {
    8080
}

fn default_count_threads() -> usize {
    8
}

fn default_count_connections() -> usize {
    4
}

fn default_cache_size() -> usize {
    10_000
}

fn default_peer_broadcast_width() -> usize {
    8
}

/// One upstream peer, addressed by a stable name and base URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerConfig {
    pub name: String,
    pub endpoint: String,
}

/// The full set of fields spec.md §6 enumerates for the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub path_to_bd: PathBuf,
    pub path_to_folder: PathBuf,

    #[serde(default = "default_count_threads")]
    pub count_threads: usize,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub get_blocks_from_file: bool,

    #[serde(default = "default_count_connections")]
    pub count_connections: usize,

    #[serde(default)]
    pub modules: Modules,

    #[serde(default = "default_cache_size")]
    pub max_count_elements_block_cache: usize,

    #[serde(default = "default_cache_size")]
    pub max_count_elements_txs_cache: usize,

    #[serde(default = "default_peer_broadcast_width")]
    pub peer_broadcast_width: usize,

    /// Either an explicit peer list or a path to a file containing one,
    /// per spec.md §6 ("optional peer list (array or file path)").
    #[serde(default)]
    pub peers: PeerSource,

    #[serde(default)]
    pub db_tuning: DbTuning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PeerSource {
    Inline(Vec<PeerConfig>),
    File(String),
}

impl Default for PeerSource {
    fn default() -> Self {
        PeerSource::Inline(Vec::new())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DbTuning {
    #[serde(default)]
    pub write_buffer_size_mb: Option<usize>,
    #[serde(default)]
    pub max_open_files: Option<i32>,
    #[serde(default)]
    pub block_cache_mb: Option<usize>,
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config {}: {e}", path.display()))?;
        let config: NodeConfig = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse config {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Resolves `peers` into a concrete list, reading the referenced file
    /// if `peers` was given as a path rather than inline.
    pub fn resolve_peers(&self) -> anyhow::Result<Vec<PeerConfig>> {
        match &self.peers {
            PeerSource::Inline(list) => Ok(list.clone()),
            PeerSource::File(path) => {
                let raw = std::fs::read_to_string(path)?;
                Ok(serde_json::from_str(&raw)?)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let json = r#"{
            "path_to_bd": "/tmp/bd",
            "path_to_folder": "/tmp/blocks"
        }"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.count_connections, 4);
        assert!(matches!(config.peers, PeerSource::Inline(ref v) if v.is_empty()));
    }

    #[test]
    fn parses_inline_peers() {
        let json = r#"{
            "path_to_bd": "/tmp/bd",
            "path_to_folder": "/tmp/blocks",
            "peers": [{"name": "a", "endpoint": "http://a:8080"}]
        }"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();
        let peers = config.resolve_peers().unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].name, "a");
    }
}
