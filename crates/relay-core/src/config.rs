use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, ChannelPair};

// Relay constants. Discord rejects messages over 2000 chars, the payload cap
// leaves room for the continuation prefix.
pub const DEFAULT_CHUNK_LIMIT: usize = 1900;
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_COMMAND_PREFIX: &str = "!";
pub const LEGACY_PAIR_NAME: &str = "Legacy Pair";

/// Top-level config (relay.toml + RELAY_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub discord: DiscordConfig,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Prefix for administrative text commands (`!addpair`, `!listfilters`, ...).
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
    /// Presence status: online | idle | dnd | invisible.
    #[serde(default = "default_status")]
    pub status: String,
    pub activity_name: Option<String>,
    /// playing | listening | watching | competing | custom (default: playing).
    pub activity_type: Option<String>,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            command_prefix: default_command_prefix(),
            status: default_status(),
            activity_name: None,
            activity_type: None,
        }
    }
}

/// Relay behaviour knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Single-pair setup from before channel pairs existed.
    /// Also read from the bare SOURCE_CHANNEL_ID env var. 0 means unset.
    #[serde(default)]
    pub legacy_source: u64,
    /// Also read from DESTINATION_CHANNEL_ID. 0 means unset.
    #[serde(default)]
    pub legacy_destination: u64,
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    /// Bot accounts allowed through the bot-loop guard (other relays, bridges).
    #[serde(default)]
    pub trusted_bots: Vec<u64>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            legacy_source: 0,
            legacy_destination: 0,
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            trusted_bots: Vec::new(),
        }
    }
}

impl RelaySettings {
    /// The pair synthesized from the legacy settings, if both ids are set.
    pub fn legacy_pair(&self) -> Option<ChannelPair> {
        if self.legacy_source == 0 || self.legacy_destination == 0 {
            return None;
        }
        Some(ChannelPair::new(
            ChannelId(self.legacy_source),
            ChannelId(self.legacy_destination),
            LEGACY_PAIR_NAME,
        ))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// channel_pairs.json + filter_words.json in a directory.
    Json,
    /// Nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// SQLite file for `sqlite`, data directory for `json`, ignored for `memory`.
    #[serde(default = "default_storage_path")]
    pub path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

fn default_command_prefix() -> String {
    DEFAULT_COMMAND_PREFIX.to_string()
}
fn default_status() -> String {
    "online".to_string()
}
fn default_dedup_window_secs() -> u64 {
    DEFAULT_DEDUP_WINDOW_SECS
}
fn default_chunk_limit() -> usize {
    DEFAULT_CHUNK_LIMIT
}
fn default_send_timeout_secs() -> u64 {
    DEFAULT_SEND_TIMEOUT_SECS
}
fn default_storage_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.db", home)
}

impl RelayConfig {
    /// Load config from a TOML file with RELAY_* env var overrides.
    ///
    /// The bare `SOURCE_CHANNEL_ID` / `DESTINATION_CHANNEL_ID` variables are
    /// still honoured for deployments that predate channel pairs.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&["SOURCE_CHANNEL_ID", "DESTINATION_CHANNEL_ID"])
                    .map(|key| {
                        if key == "source_channel_id" {
                            "relay.legacy_source".into()
                        } else {
                            "relay.legacy_destination".into()
                        }
                    }),
            )
            .merge(Env::prefixed("RELAY_").split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.relay/relay.toml", home)
}
