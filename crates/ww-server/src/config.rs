use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ww_cap::Policy;
use ww_pubsub::RegistryConfig;

use crate::error::{ServerError, ServerResult};

/// Upper bound for `heartbeat_ttl`: one day.
pub const MAX_HEARTBEAT_TTL: u64 = 24 * 60 * 60;

/// Node host configuration, usually loaded from a TOML file.
///
/// Every field has a default, so a partial file (or none at all) is valid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Cluster namespace.
    pub ns: String,
    /// Calls admitted concurrently per exported capability.
    pub max_concurrent_calls: usize,
    /// Per-topic buffer of the local messaging substrate.
    pub channel_capacity: usize,
    /// Lifetime of the local membership record, in seconds.
    pub heartbeat_ttl: u64,
    /// Address of the HTTP status endpoint. Disabled when unset.
    pub status_addr: Option<SocketAddr>,
    /// Hex-encoded ed25519 secret. A fresh identity is generated when unset.
    pub identity: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ns: "ww".into(),
            max_concurrent_calls: ww_cap::policy::DEFAULT_MAX_CONCURRENT_CALLS,
            channel_capacity: ww_pubsub::local::DEFAULT_CAPACITY,
            heartbeat_ttl: 10,
            status_addr: None,
            identity: None,
        }
    }
}

impl ServerConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| ServerError::Config(format!("{}: {e}", path.display())))
    }

    /// Parse and validate TOML text.
    pub fn from_toml(text: &str) -> ServerResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| ServerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self).map_err(|e| ServerError::Config(e.to_string()))
    }

    pub fn validate(&self) -> ServerResult<()> {
        ww_types::path::validate_segment(&self.ns)
            .map_err(|e| ServerError::Config(format!("ns: {e}")))?;
        if self.max_concurrent_calls == 0 {
            return Err(ServerError::Config("max_concurrent_calls must be positive".into()));
        }
        if self.channel_capacity == 0 {
            return Err(ServerError::Config("channel_capacity must be positive".into()));
        }
        if self.heartbeat_ttl == 0 {
            return Err(ServerError::Config("heartbeat_ttl must be positive".into()));
        }
        if self.heartbeat_ttl > MAX_HEARTBEAT_TTL {
            return Err(ServerError::Config(format!(
                "heartbeat_ttl must be at most {MAX_HEARTBEAT_TTL} seconds"
            )));
        }
        Ok(())
    }

    pub fn policy(&self) -> Policy {
        Policy::new(self.max_concurrent_calls)
    }

    pub fn registry_config(&self) -> RegistryConfig {
        RegistryConfig { ns: self.ns.clone() }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.heartbeat_ttl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.ns, "ww");
        assert_eq!(c.max_concurrent_calls, 64);
        assert_eq!(c.channel_capacity, 1024);
        assert_eq!(c.ttl(), Duration::from_secs(10));
        assert!(c.status_addr.is_none());
        assert!(c.identity.is_none());
        c.validate().unwrap();
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = ServerConfig::from_toml(
            r#"
            ns = "lab"
            status_addr = "127.0.0.1:2020"
            "#,
        )
        .unwrap();
        assert_eq!(c.ns, "lab");
        assert_eq!(c.status_addr, Some("127.0.0.1:2020".parse().unwrap()));
        assert_eq!(c.max_concurrent_calls, 64);
        assert_eq!(c.registry_config().ns, "lab");
    }

    #[test]
    fn toml_roundtrip() {
        let c = ServerConfig {
            heartbeat_ttl: 3,
            ..ServerConfig::default()
        };
        assert_eq!(ServerConfig::from_toml(&c.to_toml().unwrap()).unwrap(), c);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(ServerConfig::from_toml("ns = \"a/b\"").is_err());
        assert!(ServerConfig::from_toml("max_concurrent_calls = 0").is_err());
        assert!(ServerConfig::from_toml("heartbeat_ttl = 0").is_err());
        assert!(ServerConfig::from_toml("ns = ").is_err());
    }

    #[test]
    fn rejects_oversized_heartbeat_ttl() {
        assert!(ServerConfig::from_toml("heartbeat_ttl = 86401").is_err());
        assert!(ServerConfig::from_toml("heartbeat_ttl = 9223372036854775807").is_err());
        assert!(ServerConfig::from_toml("heartbeat_ttl = 86400").is_ok());

        let huge = ServerConfig {
            heartbeat_ttl: u64::MAX,
            ..ServerConfig::default()
        };
        assert!(matches!(huge.validate(), Err(ServerError::Config(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "ns = \"disk\"\nchannel_capacity = 16").unwrap();

        let c = ServerConfig::load(file.path()).unwrap();
        assert_eq!(c.ns, "disk");
        assert_eq!(c.channel_capacity, 16);
        assert_eq!(c.policy(), Policy::new(64));
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ServerConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
