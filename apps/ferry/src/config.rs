//! Configuration file handling.
//!
//! Settings are read from TOML (`ferry.toml` in the working directory
//! unless `--config` names another file). Every field has a default, so a
//! missing file or a partial one is fine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use ferry_client::ClientConfig;
use ferry_protocol::{DEFAULT_CHUNK_SIZE, DEFAULT_PORT, Framing};
use ferry_server::{DEFAULT_IDLE_TIMEOUT, DEFAULT_WORKERS, ServerConfig};
use serde::{Deserialize, Serialize};

/// File looked up when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "ferry.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_addr")]
    pub bind: SocketAddr,

    /// Directory served files are read from.
    #[serde(default = "default_server_root")]
    pub root: PathBuf,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Datagrams processed concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Seconds a silent client keeps its session.
    #[serde(default = "default_idle_timeout_secs")]
    pub idle_timeout_secs: u64,

    /// Fixed seed for loss injection (random when absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_seed: Option<u64>,
}

/// `[client]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_addr")]
    pub server: SocketAddr,

    /// Received files go to `<root>/<ip>_<port>/`.
    #[serde(default = "default_client_root")]
    pub root: PathBuf,

    #[serde(default = "default_receive_timeout_secs")]
    pub receive_timeout_secs: u64,

    #[serde(default)]
    pub framing: Framing,
}

fn default_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT))
}

fn default_server_root() -> PathBuf {
    "server_files".into()
}

fn default_client_root() -> PathBuf {
    "client_files".into()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_idle_timeout_secs() -> u64 {
    DEFAULT_IDLE_TIMEOUT.as_secs()
}

fn default_receive_timeout_secs() -> u64 {
    ferry_client::DEFAULT_RECEIVE_TIMEOUT.as_secs()
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: default_addr(),
            root: default_server_root(),
            chunk_size: default_chunk_size(),
            workers: default_workers(),
            idle_timeout_secs: default_idle_timeout_secs(),
            loss_seed: None,
        }
    }
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            server: default_addr(),
            root: default_client_root(),
            receive_timeout_secs: default_receive_timeout_secs(),
            framing: Framing::default(),
        }
    }
}

impl Config {
    /// Loads `path`, or `ferry.toml` if present, or the defaults.
    ///
    /// An explicitly named file must exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        if !required && !path.exists() {
            tracing::debug!("no {DEFAULT_CONFIG_FILE}, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

impl ServerSection {
    pub fn to_server_config(&self) -> ServerConfig {
        ServerConfig {
            bind: self.bind,
            root: self.root.clone(),
            chunk_size: self.chunk_size,
            workers: self.workers,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            loss_seed: self.loss_seed,
        }
    }
}

impl ClientSection {
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            server: self.server,
            root: self.root.clone(),
            receive_timeout: Duration::from_secs(self.receive_timeout_secs),
            framing: self.framing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_protocol() {
        let config = Config::default();
        assert_eq!(config.server.bind.port(), 8082);
        assert_eq!(config.server.root, PathBuf::from("server_files"));
        assert_eq!(config.server.chunk_size, 256);
        assert_eq!(config.server.workers, 10);
        assert_eq!(config.server.idle_timeout_secs, 300);
        assert_eq!(config.server.loss_seed, None);
        assert_eq!(config.client.root, PathBuf::from("client_files"));
        assert_eq!(config.client.receive_timeout_secs, 10);
        assert_eq!(config.client.framing, Framing::Split);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            chunk_size = 1024
            loss_seed = 7

            [client]
            framing = "framed"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.chunk_size, 1024);
        assert_eq!(config.server.loss_seed, Some(7));
        assert_eq!(config.server.workers, 10);
        assert_eq!(config.client.framing, Framing::Framed);
        assert_eq!(config.client.server, default_addr());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn sections_convert_to_runtime_configs() {
        let section = ServerSection {
            idle_timeout_secs: 5,
            loss_seed: Some(1),
            ..ServerSection::default()
        };
        let server = section.to_server_config();
        assert_eq!(server.idle_timeout, Duration::from_secs(5));
        assert_eq!(server.loss_seed, Some(1));

        let client = ClientSection::default().to_client_config();
        assert_eq!(client.receive_timeout, Duration::from_secs(10));
    }

    #[test]
    fn load_reads_named_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(&path, "[server]\nworkers = 3\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.workers, 3);
    }

    #[test]
    fn named_file_must_exist() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&tmp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.toml");
        std::fs::write(&path, "[server]\nworkers = \"many\"\n").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = Config::default();
        config.server.loss_seed = Some(42);
        config.client.framing = Framing::Framed;

        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.server.loss_seed, Some(42));
        assert_eq!(parsed.client.framing, Framing::Framed);
    }
}
