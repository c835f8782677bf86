//! Server configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via SIGILDB_CONFIG)
//! 3. Environment variables

use serde::{Deserialize, Serialize};
use sigildb_protocol::HashKind;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network configuration.
    pub network: NetworkConfig,
    /// Protocol configuration.
    pub protocol: ProtocolConfig,
    /// Tablespaces and tables created at startup.
    pub schema: SchemaConfig,
    /// TLS configuration.
    pub tls: TlsConfig,
}

impl Config {
    /// Loads configuration from file, then applies environment variable
    /// overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("SIGILDB_CONFIG") {
            config = Self::from_file(&path)?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.network.apply_env_overrides();
        self.protocol.apply_env_overrides();
        self.tls.apply_env_overrides();
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Idle connection timeout in seconds.
    pub idle_timeout_secs: u64,
    /// Maximum concurrent connections.
    pub max_connections: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_addr: format!("127.0.0.1:{}", sigildb_protocol::DEFAULT_PORT)
                .parse()
                .expect("default bind address"),
            idle_timeout_secs: 300,
            max_connections: 1000,
        }
    }
}

impl NetworkConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var("SIGILDB_BIND") {
            if let Ok(parsed) = addr.parse() {
                self.bind_addr = parsed;
            }
        }

        if let Ok(timeout) = std::env::var("SIGILDB_IDLE_TIMEOUT") {
            if let Ok(secs) = timeout.parse() {
                self.idle_timeout_secs = secs;
            }
        }

        if let Ok(max) = std::env::var("SIGILDB_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.max_connections = n;
            }
        }
    }

    /// Returns idle timeout as Duration.
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

/// Protocol configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Digest algorithm for field and header hashes.
    pub hash: HashName,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            hash: HashName::Keccak256,
        }
    }
}

impl ProtocolConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(name) = std::env::var("SIGILDB_HASH") {
            match name.as_str() {
                "keccak256" => self.hash = HashName::Keccak256,
                "sha256" => self.hash = HashName::Sha256,
                _ => {}
            }
        }
    }

    /// The digest algorithm threaded into the protocol layer.
    pub fn hash_kind(&self) -> HashKind {
        match self.hash {
            HashName::Keccak256 => HashKind::Keccak256,
            HashName::Sha256 => HashKind::Sha256,
        }
    }
}

/// Serializable digest algorithm name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashName {
    Keccak256,
    Sha256,
}

/// Tablespaces and tables to create at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    pub tablespaces: Vec<TablespaceConfig>,
}

/// One tablespace and its tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TablespaceConfig {
    pub name: String,
    pub tables: Vec<String>,
}

/// TLS configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Whether TLS is enabled.
    pub enabled: bool,
    /// Path to the server certificate chain (PEM).
    pub cert_path: Option<PathBuf>,
    /// Path to the server private key (PEM).
    pub key_path: Option<PathBuf>,
    /// Whether to require and verify client certificates (mTLS).
    pub require_client_cert: bool,
    /// Path to the CA bundle for client certificate verification.
    pub client_ca_path: Option<PathBuf>,
}

impl TlsConfig {
    fn apply_env_overrides(&mut self) {
        if let Ok(enabled) = std::env::var("SIGILDB_TLS") {
            self.enabled = enabled == "1" || enabled.to_lowercase() == "true";
        }

        if let Ok(path) = std::env::var("SIGILDB_TLS_CERT") {
            self.cert_path = Some(PathBuf::from(path));
        }

        if let Ok(path) = std::env::var("SIGILDB_TLS_KEY") {
            self.key_path = Some(PathBuf::from(path));
        }
    }

    /// Validates that enabled TLS has the paths it needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.cert_path.is_none() {
            return Err(ConfigError::Invalid("tls.cert_path not set".into()));
        }
        if self.key_path.is_none() {
            return Err(ConfigError::Invalid("tls.key_path not set".into()));
        }
        if self.require_client_cert && self.client_ca_path.is_none() {
            return Err(ConfigError::Invalid(
                "tls.client_ca_path not set for mTLS".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {0}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("cannot parse config file {0}: {1}")]
    Parse(PathBuf, String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
