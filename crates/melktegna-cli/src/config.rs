//! Client configuration at `~/.melktegna/config.toml`.
//!
//! Provides the default relay URL, user and wire format. CLI flags always
//! override config file values.

use anyhow::{Context, Result};
use melktegna_client::WireFormat;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default: DefaultConfig,
}

/// Default connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultConfig {
    /// Relay WebSocket URL.
    #[serde(default = "default_server")]
    pub server: String,

    /// User to act as when `--user`/`--from` is omitted (empty = none).
    #[serde(default)]
    pub user: String,

    /// Wire format: "cbor" or "json".
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            user: String::new(),
            format: default_format(),
        }
    }
}

fn default_server() -> String {
    "ws://127.0.0.1:5000".to_string()
}

fn default_format() -> String {
    "cbor".to_string()
}

impl Config {
    /// Load configuration from a TOML file, returning defaults if the file
    /// does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config at {}", path.display()))?;

        debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    /// Default location: `~/.melktegna/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_default()
            .join(".melktegna")
            .join("config.toml")
    }

    pub fn wire_format(&self) -> Result<WireFormat> {
        parse_format(&self.default.format)
    }

    /// Pick the explicit user if given, else the configured default.
    pub fn user_or_default(&self, explicit: Option<String>) -> Result<String> {
        match explicit {
            Some(user) => Ok(user),
            None if !self.default.user.is_empty() => Ok(self.default.user.clone()),
            None => anyhow::bail!("no user given and no default user configured"),
        }
    }
}

/// Parse a wire format name.
pub fn parse_format(name: &str) -> Result<WireFormat> {
    match name.to_ascii_lowercase().as_str() {
        "cbor" => Ok(WireFormat::Cbor),
        "json" => Ok(WireFormat::Json),
        other => anyhow::bail!("unknown wire format: {other} (expected cbor or json)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_values() {
        let cfg = Config::default();
        assert_eq!(cfg.default.server, "ws://127.0.0.1:5000");
        assert!(cfg.default.user.is_empty());
        assert_eq!(cfg.wire_format().unwrap(), WireFormat::Cbor);
    }

    #[test]
    fn parse_partial_toml_config() {
        let cfg: Config = toml::from_str(
            r#"
[default]
user = "alice"
format = "JSON"
"#,
        )
        .unwrap();
        assert_eq!(cfg.default.server, "ws://127.0.0.1:5000");
        assert_eq!(cfg.default.user, "alice");
        assert_eq!(cfg.wire_format().unwrap(), WireFormat::Json);
    }

    #[test]
    fn load_from_file_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = Config::load(&dir.path().join("nope.toml")).unwrap();
        assert!(missing.default.user.is_empty());

        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[default]\nserver = \"ws://chat.local:9000\"").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.default.server, "ws://chat.local:9000");
    }

    #[test]
    fn user_fallback() {
        let mut cfg = Config::default();
        assert!(cfg.user_or_default(None).is_err());
        assert_eq!(cfg.user_or_default(Some("bob".into())).unwrap(), "bob");

        cfg.default.user = "carol".into();
        assert_eq!(cfg.user_or_default(None).unwrap(), "carol");
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(parse_format("xml").is_err());
    }
}
