//! Optional TOML configuration for the CLI.
//!
//! Looked up at `--config` when given, otherwise at
//! `<config dir>/ite10/config.toml`. A missing default file means defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use color_eyre::eyre::{Result, eyre};
use ite10_discovery::DiscoveryConfig;
use serde::Deserialize;

/// Settings read from `config.toml`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct CliConfig {
    /// GraphQL endpoint used when `--attestations-from` is not given.
    pub(crate) graph_endpoint: Option<String>,
    /// Graph request timeout in seconds.
    pub(crate) timeout_secs: Option<u64>,
    /// Bearer token for the graph service.
    pub(crate) bearer_token: Option<String>,
    /// Emit JSON logs without needing `--json-logs`.
    pub(crate) json_logs: bool,
}

impl CliConfig {
    /// Load from `explicit`, or from the default location if it exists.
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        match default_path() {
            Some(path) if path.is_file() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| eyre!("failed to read config {}: {e}", path.display()))?;
        toml::from_str(&raw).map_err(|e| eyre!("invalid config {}: {e}", path.display()))
    }

    /// Graph connection settings; `endpoint` overrides the configured one.
    pub(crate) fn discovery(&self, endpoint: Option<&str>) -> DiscoveryConfig {
        let mut out = DiscoveryConfig::default();
        if let Some(endpoint) = endpoint.or(self.graph_endpoint.as_deref()) {
            endpoint.clone_into(&mut out.endpoint);
        }
        if let Some(secs) = self.timeout_secs {
            out.timeout = Duration::from_secs(secs);
        }
        out.bearer_token.clone_from(&self.bearer_token);
        out
    }
}

fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "in-toto", "ite10")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "graph_endpoint = \"https://guac.example/query\"\ntimeout_secs = 5\njson_logs = true\n",
        )
        .unwrap();

        let config = CliConfig::load(Some(&path)).unwrap();
        assert!(config.json_logs);
        let discovery = config.discovery(None);
        assert_eq!(discovery.endpoint, "https://guac.example/query");
        assert_eq!(discovery.timeout, Duration::from_secs(5));
        assert!(discovery.bearer_token.is_none());
    }

    #[test]
    fn flag_overrides_configured_endpoint() {
        let config = CliConfig {
            graph_endpoint: Some("https://configured/query".to_owned()),
            ..CliConfig::default()
        };
        assert_eq!(
            config.discovery(Some("http://flag/query")).endpoint,
            "http://flag/query"
        );
    }

    #[test]
    fn defaults_target_local_graph() {
        let discovery = CliConfig::default().discovery(None);
        assert_eq!(discovery, DiscoveryConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CliConfig::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn unknown_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "graph_endpont = \"typo\"\n").unwrap();
        assert!(CliConfig::load(Some(&path)).is_err());
    }
}
