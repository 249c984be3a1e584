use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chats.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Multiaddrs ending in `/p2p/<PeerId>`.
    pub bootstrap_nodes: Vec<String>,
    pub listen_addr: String,
    pub database_path: String,
    /// Base URL for photo uploads; fetching works without it.
    pub attachment_base_url: Option<String>,
    /// Capacity of the per-thread update channel.
    pub channel_capacity: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bootstrap_nodes: Vec::new(),
            listen_addr: "/ip4/0.0.0.0/tcp/0".to_string(),
            database_path: "data/messages.db".to_string(),
            attachment_base_url: None,
            channel_capacity: 100,
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    crate::storage::ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}

/// Đưa bootstrap node lên đầu danh sách rồi ghi lại file config.
pub fn add_bootstrap_node(path: &str, entry: &str) -> std::io::Result<AppConfig> {
    let mut config = load_config(path);
    config.bootstrap_nodes.retain(|node| node != entry);
    config.bootstrap_nodes.insert(0, entry.to_string());

    save_config(path, &config)?;
    log::info!("Added bootstrap node {entry} to {path}");
    Ok(config)
}
