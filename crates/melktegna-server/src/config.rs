//! Server configuration: TOML file + CLI overrides.

use melktegna_core::{ChatError, ChatResult};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub history: HistorySection,
}

/// `[server]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Outbound events buffered per connection before new ones are dropped.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

/// `[history]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct HistorySection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_messages")]
    pub max_messages: usize,
}

impl Default for HistorySection {
    fn default() -> Self {
        Self {
            enabled: true,
            max_messages: default_max_messages(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    5000
}
fn default_outbound_queue() -> usize {
    64
}
fn default_max_messages() -> usize {
    10_000
}
fn default_true() -> bool {
    true
}

/// Values given on the command line; `None` keeps the file value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub outbound_queue: Option<usize>,
    pub no_history: bool,
}

/// Resolved server configuration (CLI overrides applied).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub outbound_queue: usize,
    pub history_enabled: bool,
    pub history_max_messages: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: file.server.port,
            outbound_queue: file.server.outbound_queue,
            history_enabled: file.history.enabled,
            history_max_messages: file.history.max_messages,
        }
    }
}

impl ServerConfig {
    /// Load config from TOML file, then apply CLI overrides.
    ///
    /// A missing file is not an error; defaults are used instead.
    pub fn load(config_path: Option<&Path>, overrides: ConfigOverrides) -> ChatResult<Self> {
        let file_config = match config_path {
            Some(path) => {
                let expanded = expand_tilde(path);
                if expanded.exists() {
                    info!(path = %expanded.display(), "loading config file");
                    let content = std::fs::read_to_string(&expanded)?;
                    toml::from_str::<ConfigFile>(&content)
                        .map_err(|e| ChatError::Config(format!("config parse error: {e}")))?
                } else {
                    info!(path = %expanded.display(), "config file not found, using defaults");
                    ConfigFile::default()
                }
            }
            None => ConfigFile::default(),
        };

        Self::resolve(file_config, overrides)
    }

    fn resolve(file: ConfigFile, overrides: ConfigOverrides) -> ChatResult<Self> {
        let host_str = overrides.host.unwrap_or(file.server.host);
        let host: IpAddr = host_str
            .parse()
            .map_err(|e| ChatError::Config(format!("invalid host {host_str:?}: {e}")))?;

        let outbound_queue = overrides
            .outbound_queue
            .unwrap_or(file.server.outbound_queue);
        if outbound_queue == 0 {
            return Err(ChatError::Config("outbound_queue must be at least 1".into()));
        }
        if file.history.max_messages == 0 {
            return Err(ChatError::Config("history.max_messages must be at least 1".into()));
        }

        Ok(Self {
            host,
            port: overrides.port.unwrap_or(file.server.port),
            outbound_queue,
            history_enabled: file.history.enabled && !overrides.no_history,
            history_max_messages: file.history.max_messages,
        })
    }

    /// Address the WebSocket listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_without_file() {
        let cfg = ServerConfig::load(None, ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.outbound_queue, 64);
        assert!(cfg.history_enabled);
        assert_eq!(cfg.history_max_messages, 10_000);
        assert_eq!(cfg.listen_addr().to_string(), "0.0.0.0:5000");
    }

    #[test]
    fn missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        let cfg = ServerConfig::load(Some(&path), ConfigOverrides::default()).unwrap();
        assert_eq!(cfg.port, 5000);
    }

    #[test]
    fn partial_file_and_cli_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
host = "127.0.0.1"
port = 6000

[history]
max_messages = 50
"#
        )
        .unwrap();

        let cfg = ServerConfig::load(
            Some(file.path()),
            ConfigOverrides {
                port: Some(7000),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(cfg.listen_addr().to_string(), "127.0.0.1:7000");
        assert_eq!(cfg.outbound_queue, 64);
        assert_eq!(cfg.history_max_messages, 50);
        assert!(cfg.history_enabled);
    }

    #[test]
    fn no_history_override_disables_store() {
        let cfg = ServerConfig::load(
            None,
            ConfigOverrides {
                no_history: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!cfg.history_enabled);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let bad_host = ConfigOverrides {
            host: Some("not-an-ip".into()),
            ..Default::default()
        };
        assert!(matches!(
            ServerConfig::load(None, bad_host),
            Err(ChatError::Config(_))
        ));

        let zero_queue = ConfigOverrides {
            outbound_queue: Some(0),
            ..Default::default()
        };
        assert!(ServerConfig::load(None, zero_queue).is_err());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nport = ").unwrap();
        assert!(matches!(
            ServerConfig::load(Some(file.path()), ConfigOverrides::default()),
            Err(ChatError::Config(_))
        ));
    }
}
