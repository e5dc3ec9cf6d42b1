use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;
use serde::Deserialize;

/// How to reach one cluster's login node
///
/// Read from a JSON file the caller names explicitly and handed to
/// [`SshChannel::connect`](crate::remote::ssh::SshChannel::connect).
///
/// ```json
/// { "host": "log1.wynton.ucsf.edu", "user": "jzhang", "identity_file": "~/.ssh/id_ed25519" }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClusterConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    /// Private key passed to ssh, otherwise the agent and ssh config decide
    #[serde(default)]
    pub identity_file: Option<PathBuf>,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Where the ssh control sockets are created (defaults to the system temp dir)
    #[serde(default)]
    pub control_dir: Option<PathBuf>,
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    30
}

impl ClusterConfig {
    pub fn new(host: impl Into<String>, user: impl Into<String>) -> Self {
        ClusterConfig {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            identity_file: None,
            connect_timeout_secs: default_connect_timeout(),
            control_dir: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        info!("Reading cluster configuration {}", path.display());
        let json = fs::read_to_string(path)
            .with_context(|| format!("Can't read cluster configuration {}", path.display()))?;
        let config: ClusterConfig = serde_json::from_str(&json)
            .with_context(|| format!("Invalid cluster configuration {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("host cannot be empty");
        }
        if self.user.trim().is_empty() {
            bail!("user cannot be empty");
        }
        if self.port == 0 {
            bail!("port must be greater than 0");
        }
        if self.connect_timeout_secs == 0 {
            bail!("connect_timeout_secs must be greater than 0");
        }
        Ok(())
    }

    /// `user@host` as ssh expects it
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}
