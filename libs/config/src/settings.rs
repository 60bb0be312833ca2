//! Transport instance settings

use crate::error::{ConfigError, ConfigResult};
use crate::loader::{load_layered, ENV_PREFIX};
use codec::{DEFAULT_MAX_FRAME_SIZE, FIXED_HEADER_SIZE};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Settings for one transport instance
///
/// ```toml
/// scheme = "maltcp"
/// host = "0.0.0.0"
/// port = 1024
/// listen = true
/// connections_per_destination = 2
/// inbound_workers = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransportSettings {
    /// URI scheme of every address this transport produces
    pub scheme: String,
    /// Host to bind and to advertise in root URIs
    pub host: String,
    /// Listening port; 0 picks an ephemeral port
    pub port: u16,
    /// Accept inbound connections. When false the transport is a client
    /// and its root URI carries an opaque id instead of a port.
    pub listen: bool,
    /// Advertise the address of the outbound interface instead of `host`
    #[serde(alias = "autohost")]
    pub auto_host: bool,
    /// Sockets opened per remote root URI
    #[serde(alias = "numconnections")]
    pub connections_per_destination: usize,
    /// Inbound dispatch workers
    pub inbound_workers: usize,
    /// Queue depth of each inbound worker
    pub inbound_queue_depth: usize,
    /// Largest frame accepted or sent, excluding the length prefix
    pub max_frame_size: usize,
    pub connect_timeout_ms: u64,
    /// Log at DEBUG when no RUST_LOG filter is set
    pub debug: bool,
    /// Cut endpoint ids at the routing delimiter
    pub routing_supported: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            scheme: "maltcp".to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            listen: true,
            auto_host: false,
            connections_per_destination: 1,
            inbound_workers: 4,
            inbound_queue_depth: 1024,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            connect_timeout_ms: 5_000,
            debug: false,
            routing_supported: false,
        }
    }
}

impl TransportSettings {
    /// Load from defaults, an optional TOML file and `MALTCP_*` variables
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        load_layered(path, ENV_PREFIX)
    }

    /// Reject settings the transport cannot run with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.scheme.is_empty() || self.scheme.contains(':') || self.scheme.contains('/') {
            return Err(ConfigError::invalid(
                "scheme",
                format!("'{}' is not a URI scheme", self.scheme),
            ));
        }
        if self.host.is_empty() {
            return Err(ConfigError::invalid("host", "must not be empty"));
        }
        if self.connections_per_destination == 0 {
            return Err(ConfigError::invalid(
                "connections_per_destination",
                "at least one socket per destination is required",
            ));
        }
        if self.inbound_workers == 0 {
            return Err(ConfigError::invalid("inbound_workers", "must be at least 1"));
        }
        if self.inbound_queue_depth == 0 {
            return Err(ConfigError::invalid(
                "inbound_queue_depth",
                "must be at least 1",
            ));
        }
        if self.max_frame_size < FIXED_HEADER_SIZE {
            return Err(ConfigError::invalid(
                "max_frame_size",
                format!(
                    "{} bytes cannot hold a message header ({} bytes)",
                    self.max_frame_size, FIXED_HEADER_SIZE
                ),
            ));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms", "must be non-zero"));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Effective settings rendered as TOML
    pub fn to_toml(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let settings = TransportSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.connections_per_destination, 1);
        assert_eq!(settings.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_file_with_legacy_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transport.toml");
        fs::write(
            &path,
            r#"
host = "10.1.2.3"
port = 2024
numconnections = 3
autohost = true
routing_supported = true
"#,
        )
        .unwrap();

        let settings: TransportSettings =
            load_layered(Some(&path), "MALTCP_TEST_LEGACY").unwrap();
        assert_eq!(settings.host, "10.1.2.3");
        assert_eq!(settings.port, 2024);
        assert_eq!(settings.connections_per_destination, 3);
        assert!(settings.auto_host);
        assert!(settings.routing_supported);
        assert_eq!(settings.scheme, "maltcp");
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("transport.toml");
        fs::write(&path, "inbound_workers = 2\n").unwrap();

        std::env::set_var("MALTCP_TEST_ENV_INBOUND_WORKERS", "8");
        std::env::set_var("MALTCP_TEST_ENV_DEBUG", "true");
        let settings: TransportSettings = load_layered(Some(&path), "MALTCP_TEST_ENV").unwrap();
        std::env::remove_var("MALTCP_TEST_ENV_INBOUND_WORKERS");
        std::env::remove_var("MALTCP_TEST_ENV_DEBUG");

        assert_eq!(settings.inbound_workers, 8);
        assert!(settings.debug);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let result = TransportSettings::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let mut settings = TransportSettings {
            connections_per_destination: 0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "connections_per_destination",
                ..
            })
        ));

        settings.connections_per_destination = 1;
        settings.max_frame_size = 8;
        assert!(settings.validate().is_err());

        settings.max_frame_size = 1024;
        settings.scheme = "bad://".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_frame_bounds_follow_codec() {
        let mut settings = TransportSettings::default();
        assert_eq!(settings.max_frame_size, DEFAULT_MAX_FRAME_SIZE);

        settings.max_frame_size = FIXED_HEADER_SIZE;
        assert!(settings.validate().is_ok());
        settings.max_frame_size = FIXED_HEADER_SIZE - 1;
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid {
                field: "max_frame_size",
                ..
            })
        ));
    }

    #[test]
    fn test_render_roundtrip() {
        let settings = TransportSettings {
            port: 4000,
            ..Default::default()
        };
        let rendered = settings.to_toml().unwrap();
        let parsed: TransportSettings = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, settings);
    }
}
