use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::stream::DEFAULT_STREAM_CAPACITY;

/// Listener distribution mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerMode {
    /// Every packet, unfiltered
    Fullfeed,
    /// Only packets selected by the listener or session filter
    Igate,
}

impl std::fmt::Display for ListenerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerMode::Fullfeed => write!(f, "fullfeed"),
            ListenerMode::Igate => write!(f, "igate"),
        }
    }
}

/// One configured listen endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub name: String,
    pub mode: ListenerMode,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Hidden listeners are omitted from status snapshots
    #[serde(default = "default_true")]
    pub visible: bool,
    /// Server-side filter applied to every IGate session on this listener
    #[serde(default)]
    pub filter: String,
}

impl ListenerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One upstream peer, tried in config order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkPeer {
    pub name: String,
    #[serde(default = "default_uplink_mode")]
    pub mode: ListenerMode,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    pub host: String,
    pub port: u16,
}

impl UplinkPeer {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// This server's identity on APRS-IS (also its uplink login)
    pub id: String,
    /// Passcode presented to uplink peers
    #[serde(default)]
    pub passcode: i32,
    /// Receive buffer / maximum accepted line length, in KB
    #[serde(default = "default_buf_size_kb")]
    pub buf_size_kb: usize,
    /// Per-subscriber stream queue capacity
    #[serde(default = "default_stream_capacity")]
    pub stream_capacity: usize,
    #[serde(default)]
    pub listeners: Vec<ListenerConfig>,
    #[serde(default)]
    pub uplinks: Vec<UplinkPeer>,
}

/// Top-level configuration file structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

fn default_true() -> bool {
    true
}

fn default_uplink_mode() -> ListenerMode {
    ListenerMode::Fullfeed
}

fn default_buf_size_kb() -> usize {
    1
}

fn default_stream_capacity() -> usize {
    DEFAULT_STREAM_CAPACITY
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        let config: Config =
            toml::from_str(&contents).with_context(|| format!("Failed to parse {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to a TOML file (atomic: write to .tmp then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let tmp_path = path.with_extension("toml.tmp");
        std::fs::write(&tmp_path, &contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("Failed to rename {:?} to {:?}", tmp_path, path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.id.is_empty() {
            bail!("server.id must not be empty");
        }
        if self.server.buf_size_kb == 0 {
            bail!("server.buf_size_kb must be at least 1");
        }
        for listener in &self.server.listeners {
            if listener.protocol != "tcp" {
                bail!(
                    "listener {:?}: unsupported protocol {:?} (only tcp)",
                    listener.name,
                    listener.protocol
                );
            }
        }
        for uplink in &self.server.uplinks {
            if uplink.protocol != "tcp" {
                bail!(
                    "uplink {:?}: unsupported protocol {:?} (only tcp)",
                    uplink.name,
                    uplink.protocol
                );
            }
        }
        Ok(())
    }

    /// Maximum accepted line length in bytes.
    pub fn max_line_len(&self) -> usize {
        self.server.buf_size_kb * 1024
    }
}

/// Resolve the config file path.
///
/// Priority:
/// 1. `APRSHUB_CONFIG` env var
/// 2. `./aprshub.toml`
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("APRSHUB_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("./aprshub.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            server: ServerConfig {
                id: "T2TEST".to_string(),
                passcode: 13023,
                buf_size_kb: 1,
                stream_capacity: 100,
                listeners: vec![
                    ListenerConfig {
                        name: "fullfeed".to_string(),
                        mode: ListenerMode::Fullfeed,
                        protocol: "tcp".to_string(),
                        host: "0.0.0.0".to_string(),
                        port: 10152,
                        visible: true,
                        filter: String::new(),
                    },
                    ListenerConfig {
                        name: "igate".to_string(),
                        mode: ListenerMode::Igate,
                        protocol: "tcp".to_string(),
                        host: "0.0.0.0".to_string(),
                        port: 14580,
                        visible: true,
                        filter: "t/poimqstuw".to_string(),
                    },
                ],
                uplinks: vec![UplinkPeer {
                    name: "core".to_string(),
                    mode: ListenerMode::Fullfeed,
                    protocol: "tcp".to_string(),
                    host: "rotate.aprs2.net".to_string(),
                    port: 10152,
                }],
            },
        }
    }

    #[test]
    fn toml_roundtrip() {
        let config = sample();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn load_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aprshub.toml");

        let config = sample();
        config.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();

        assert_eq!(loaded.server.id, "T2TEST");
        assert_eq!(loaded.server.listeners.len(), 2);
        assert_eq!(loaded.server.listeners[1].mode, ListenerMode::Igate);
        assert_eq!(loaded.server.uplinks[0].addr(), "rotate.aprs2.net:10152");
    }

    #[test]
    fn defaults_fill_in() {
        let minimal = r#"
            [server]
            id = "T2TEST"

            [[server.listeners]]
            name = "feed"
            mode = "fullfeed"
            host = "127.0.0.1"
            port = 14580
        "#;
        let config: Config = toml::from_str(minimal).unwrap();
        assert_eq!(config.server.passcode, 0);
        assert_eq!(config.server.buf_size_kb, 1);
        assert_eq!(config.server.stream_capacity, DEFAULT_STREAM_CAPACITY);
        assert!(config.server.listeners[0].visible);
        assert_eq!(config.server.listeners[0].protocol, "tcp");
        assert!(config.server.listeners[0].filter.is_empty());
        assert!(config.server.uplinks.is_empty());
        assert_eq!(config.max_line_len(), 1024);
    }

    #[test]
    fn rejects_bad_configs() {
        let empty_id = Config {
            server: ServerConfig {
                id: String::new(),
                ..sample().server
            },
        };
        assert!(empty_id.validate().is_err());

        let mut bad_proto = sample();
        bad_proto.server.listeners[0].protocol = "udp".to_string();
        assert!(bad_proto.validate().is_err());
    }
}
