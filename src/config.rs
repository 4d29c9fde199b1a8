//! Server configuration.
//!
//! Values are layered, later sources winning:
//!
//! 1. built-in defaults
//! 2. an optional YAML file (`--config`)
//! 3. environment variables (read by clap, see [`Cli`])
//! 4. command line flags
//!
//! ```yaml
//! server:
//!   host: 0.0.0.0
//!   port: 4221
//!   backlog: 128
//!   max_connections: 1024
//!   idle_timeout_secs: 30
//! files:
//!   root: /srv/files
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::Parser;
use serde::Deserialize;

use crate::http::parser::{DEFAULT_MAX_BODY_BYTES, DEFAULT_MAX_HEADER_BYTES, ParseLimits};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub files: FilesConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Pending connection queue length passed to `listen(2)`
    pub backlog: u32,
    /// Connections served at once; further clients wait in the backlog
    pub max_connections: usize,
    /// Seconds a connection may sit idle waiting for bytes, 0 disables
    pub idle_timeout_secs: u64,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Directory served by `/files/<name>`
    pub root: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 4221,
            backlog: 128,
            max_connections: 1024,
            idle_timeout_secs: 30,
            max_header_bytes: DEFAULT_MAX_HEADER_BYTES,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Loads the YAML file at `path`, or the defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn from_yaml_str(raw: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }

    /// `host:port` string handed to the resolver.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Overrides host and port from a `host:port` string.
    pub fn set_listen_addr(&mut self, addr: &str) -> anyhow::Result<()> {
        let (host, port) = addr
            .rsplit_once(':')
            .with_context(|| format!("Listen address {:?} is not host:port", addr))?;
        let port = port
            .parse()
            .with_context(|| format!("Invalid port in listen address {:?}", addr))?;

        // Bracketed IPv6 literals, e.g. "[::1]:8080"
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            bail!("Listen address {:?} has no host", addr);
        }

        self.server.host = host.to_string();
        self.server.port = port;
        Ok(())
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        match self.server.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn parse_limits(&self) -> ParseLimits {
        ParseLimits {
            max_header_bytes: self.server.max_header_bytes,
            max_body_bytes: self.server.max_body_bytes,
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.host.is_empty() {
            bail!("server.host must not be empty");
        }
        if self.server.backlog == 0 {
            bail!("server.backlog must be greater than 0");
        }
        if self.server.max_connections == 0 {
            bail!("server.max_connections must be greater than 0");
        }
        if self.server.max_header_bytes == 0 {
            bail!("server.max_header_bytes must be greater than 0");
        }
        if !self.files.root.is_dir() {
            bail!("files.root {} is not a directory", self.files.root.display());
        }
        Ok(())
    }
}

/// Command line interface of the `beacon` binary.
#[derive(Debug, Clone, Parser)]
#[command(name = "beacon")]
#[command(about = "Single-threaded event-driven HTTP/1.1 file and echo server")]
#[command(version)]
pub struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "BEACON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address as host:port, overrides the config file
    #[arg(long, env = "LISTEN")]
    pub listen: Option<String>,

    /// Host/IP to listen on, overrides --listen
    #[arg(long, env = "BEACON_HOST")]
    pub host: Option<String>,

    /// Port to listen on, overrides --listen
    #[arg(short, long, env = "BEACON_PORT")]
    pub port: Option<u16>,

    /// Directory served under /files/
    #[arg(short, long, env = "FILES_ROOT")]
    pub directory: Option<PathBuf>,

    /// listen(2) backlog
    #[arg(long, env = "BEACON_BACKLOG")]
    pub backlog: Option<u32>,

    /// Maximum concurrently served connections
    #[arg(long = "max-connections", env = "MAX_CONNECTIONS")]
    pub max_connections: Option<usize>,

    /// Idle timeout per connection in seconds (0 disables)
    #[arg(long = "idle-timeout", env = "IDLE_TIMEOUT")]
    pub idle_timeout_secs: Option<u64>,

    /// Log at DEBUG instead of INFO
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// Builds the effective configuration and validates it.
    pub fn into_config(self) -> anyhow::Result<Config> {
        let mut cfg = Config::load(self.config.as_deref())?;

        if let Some(listen) = &self.listen {
            cfg.set_listen_addr(listen)?;
        }
        if let Some(host) = self.host {
            cfg.server.host = host;
        }
        if let Some(port) = self.port {
            cfg.server.port = port;
        }
        if let Some(root) = self.directory {
            cfg.files.root = root;
        }
        if let Some(backlog) = self.backlog {
            cfg.server.backlog = backlog;
        }
        if let Some(max) = self.max_connections {
            cfg.server.max_connections = max;
        }
        if let Some(secs) = self.idle_timeout_secs {
            cfg.server.idle_timeout_secs = secs;
        }

        cfg.validate()?;
        Ok(cfg)
    }
}
