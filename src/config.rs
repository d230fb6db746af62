//! Configuration file parsing
//!
//! Parses TOML configuration files for the proxy.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Proxy configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// OS backend selection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Seed data for the memory backend
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// Server settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP API listens on
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("bind is not a socket address: {}", self.bind)))
    }
}

fn default_bind() -> String {
    "127.0.0.1:9070".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Backend settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,

    /// PowerShell executable used by the powershell backend
    #[serde(default = "default_powershell")]
    pub powershell: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::default(),
            powershell: default_powershell(),
        }
    }
}

fn default_powershell() -> String {
    "powershell.exe".to_string()
}

/// Backend type
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Powershell,
    Memory,
}

impl FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "powershell" => Ok(Self::Powershell),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::Invalid(format!("unknown backend: {}", other))),
        }
    }
}

/// Memory backend seed data
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub target: Vec<MemoryTargetConfig>,

    #[serde(default)]
    pub disk: Vec<MemoryDiskConfig>,
}

/// A target reachable through a simulated portal
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryTargetConfig {
    pub address: String,

    /// 0 means the default iSCSI port
    #[serde(default)]
    pub port: u16,

    pub iqn: String,

    /// Disk identifiers exposed once logged in
    #[serde(default)]
    pub disks: Vec<String>,

    #[serde(default)]
    pub chap_username: Option<String>,

    #[serde(default)]
    pub chap_secret: Option<String>,

    /// Secret the target presents back to the initiator
    #[serde(default)]
    pub mutual_secret: Option<String>,
}

/// A simulated disk
#[derive(Debug, Clone, Deserialize)]
pub struct MemoryDiskConfig {
    pub number: u32,

    #[serde(default)]
    pub volumes: Vec<String>,

    #[serde(default = "default_online")]
    pub online: bool,
}

fn default_online() -> bool {
    true
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.socket_addr()?;

        if !matches!(
            self.server.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "warning" | "error" | "off"
        ) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.server.log_level
            )));
        }

        for target in &self.memory.target {
            if target.address.trim().is_empty() || target.iqn.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "memory target requires address and iqn".to_string(),
                ));
            }
            if target.chap_username.is_some() != target.chap_secret.is_some() {
                return Err(ConfigError::Invalid(format!(
                    "memory target {}: chap_username and chap_secret must be set together",
                    target.iqn
                )));
            }
        }

        // Check for duplicate disk numbers
        let mut seen = std::collections::HashSet::new();
        for disk in &self.memory.disk {
            if !seen.insert(disk.number) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate memory disk: {}",
                    disk.number
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9070");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.backend.kind, BackendKind::Powershell);
        assert_eq!(config.backend.powershell, "powershell.exe");
        assert!(config.memory.target.is_empty());
    }

    #[test]
    fn test_parse_memory_config() {
        let config_str = r#"
[server]
bind = "127.0.0.1:0"
log_level = "debug"

[backend]
kind = "memory"

[[memory.target]]
address = "10.0.0.5"
iqn = "iqn.2020-01.world.srv:disk1"
disks = ["1"]
chap_username = "user"
chap_secret = "secret"

[[memory.disk]]
number = 1
volumes = ["vol-1"]

[[memory.disk]]
number = 2
online = false
"#;

        let config = Config::parse(config_str).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.backend.kind, BackendKind::Memory);
        assert_eq!(config.memory.target[0].port, 0);
        assert_eq!(config.memory.target[0].disks, vec!["1"]);
        assert!(config.memory.disk[0].online);
        assert!(!config.memory.disk[1].online);
    }

    #[test]
    fn test_invalid_bind_error() {
        let result = Config::parse("[server]\nbind = \"localhost\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_log_level_error() {
        let result = Config::parse("[server]\nlog_level = \"chatty\"\n");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_half_chap_credentials_error() {
        let config_str = r#"
[[memory.target]]
address = "10.0.0.5"
iqn = "iqn.x"
chap_username = "user"
"#;
        let result = Config::parse(config_str);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_duplicate_disk_error() {
        let config_str = r#"
[[memory.disk]]
number = 1

[[memory.disk]]
number = 1
"#;
        let result = Config::parse(config_str);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_unknown_backend_kind() {
        assert!(matches!(
            Config::parse("[backend]\nkind = \"wmi\"\n"),
            Err(ConfigError::Parse(_))
        ));
        assert_eq!("Memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("wmi".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nbind = \"0.0.0.0:9071\"").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.socket_addr().unwrap().port(), 9071);

        let missing = Config::load(file.path().with_extension("missing"));
        assert!(matches!(missing, Err(ConfigError::Io(_))));
    }
}
