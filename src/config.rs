use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::policy::Policy;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub lnd: LndConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    /// Ordered policy list; the first rejection wins.
    #[serde(default)]
    pub policies: Vec<Policy>,
}

#[derive(Debug, Deserialize)]
pub struct LndConfig {
    /// lnd gRPC endpoint (host:port, no scheme)
    pub rpc_address: String,
    /// Path to lnd's TLS certificate
    pub tls_cert_path: PathBuf,
    /// Path to a macaroon allowed to read graph data and run the
    /// channel acceptor
    pub macaroon_path: PathBuf,
    /// Connection timeout in seconds; 0 disables the deadline entirely
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Evaluate and log decisions but accept every request
    #[serde(default)]
    pub monitor_only: bool,
}

fn default_rpc_timeout() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            monitor_only: false,
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let Some((host, port)) = self.lnd.rpc_address.rsplit_once(':') else {
            anyhow::bail!("rpc_address must be host:port: {}", self.lnd.rpc_address);
        };
        if host.is_empty() || port.parse::<u16>().is_err() {
            anyhow::bail!("invalid rpc_address: {}", self.lnd.rpc_address);
        }
        if !self.lnd.tls_cert_path.exists() {
            anyhow::bail!(
                "TLS cert not found at: {}",
                self.lnd.tls_cert_path.display()
            );
        }
        if !self.lnd.macaroon_path.exists() {
            anyhow::bail!(
                "macaroon not found at: {}",
                self.lnd.macaroon_path.display()
            );
        }
        Ok(())
    }

    /// Create a config with all defaults for testing purposes. The
    /// cert and macaroon paths must exist for validation.
    #[cfg(test)]
    pub fn test_default(cert_path: PathBuf, macaroon_path: PathBuf) -> Self {
        Self {
            lnd: LndConfig {
                rpc_address: "localhost:10009".to_string(),
                tls_cert_path: cert_path,
                macaroon_path,
                rpc_timeout_secs: default_rpc_timeout(),
            },
            general: GeneralConfig::default(),
            policies: Vec::new(),
        }
    }
}
