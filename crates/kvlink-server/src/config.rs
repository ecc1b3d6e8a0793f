//! Configuration: command line over config file over defaults.

use clap::Parser;
use kvlink_client::ClientOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Default, Parser)]
#[command(name = "kvlink", version, about = "Expose a key-value store to a command host over HTTP")]
pub struct Args {
    /// TOML config file
    #[arg(long, env = "KVLINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to serve commands on
    #[arg(long, env = "KVLINK_LISTEN_HOST")]
    pub listen_host: Option<String>,

    #[arg(long, env = "KVLINK_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    /// Store to connect to at startup
    #[arg(long, env = "KVLINK_REDIS_HOST")]
    pub redis_host: Option<String>,

    #[arg(long, env = "KVLINK_REDIS_PORT")]
    pub redis_port: Option<u16>,

    /// Start disconnected and wait for a `connect` command
    #[arg(long)]
    pub no_connect: bool,

    /// Serve an in-process store instead of connecting over the network
    #[arg(long)]
    pub memory: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub listen: ListenConfig,
    pub backend: BackendConfig,
    pub module: ModuleConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ListenConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 33334,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    /// Connect at startup. A failed startup connect is fatal.
    pub connect: bool,
    pub memory: bool,
    /// Zero disables the limit.
    pub connect_timeout_ms: u64,
    /// Zero disables the limit.
    pub request_timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 6379,
            connect: true,
            memory: false,
            connect_timeout_ms: 5_000,
            request_timeout_ms: 10_000,
        }
    }
}

/// How the command table is published to the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub name: String,
    pub title: String,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            name: "redis".into(),
            title: "Redis connector".into(),
        }
    }
}

impl Config {
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply(args);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(&mut self, args: &Args) {
        if let Some(host) = &args.listen_host {
            self.listen.host = host.clone();
        }
        if let Some(port) = args.listen_port {
            self.listen.port = port;
        }
        if let Some(host) = &args.redis_host {
            self.backend.host = host.clone();
        }
        if let Some(port) = args.redis_port {
            self.backend.port = port;
        }
        if args.no_connect {
            self.backend.connect = false;
        }
        if args.memory {
            self.backend.memory = true;
        }
    }

    pub fn client_options(&self) -> ClientOptions {
        let limit = |ms: u64| (ms > 0).then(|| Duration::from_millis(ms));
        ClientOptions {
            connect_timeout: limit(self.backend.connect_timeout_ms),
            request_timeout: limit(self.backend.request_timeout_ms),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}
