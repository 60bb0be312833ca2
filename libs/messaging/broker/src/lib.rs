//! # MAL Publish/Subscribe Broker
//!
//! ## Purpose
//!
//! Broker side of the PUBSUB interaction: keeps consumer subscriptions per
//! topic signature and turns every PUBLISH into per-consumer NOTIFY
//! messages sent back over the transport.
//!
//! ## Architecture Role
//!
//! ```text
//! consumers ── REGISTER/DEREGISTER ─┐
//!                                   ▼
//!                  Transport ─► BrokerEndpoint ─► BrokerMatchEngine
//!                                   │                    │
//! providers ── PUBLISH ─────────────┘        NotifyBatch per consumer
//!                                                        │
//! consumers ◄──────────── NOTIFY (send_batch) ◄──────────┘
//! ```
//!
//! ## Configuration
//!
//! ```toml
//! endpoint = "broker"
//!
//! [transport]
//! host = "0.0.0.0"
//! port = 2024
//! inbound_workers = 8
//! ```
//!
//! Every key can be overridden from the environment, e.g.
//! `MALTCP_TRANSPORT__PORT=3000`.

pub mod engine;
pub mod error;
pub mod handler;
pub mod pattern;
pub mod wire;

pub use engine::{
    BrokerMatchEngine, ConsumerId, NotifyBatch, SubscriptionId, TopicSignature, UpdateEntry,
};
pub use error::{BrokerError, BrokerResult};
pub use handler::BrokerEndpoint;
pub use pattern::{EntityKey, KeyPattern, WILDCARD};
pub use wire::{DeregisterBody, NotifyBody, PublishBody, RegisterBody};

use network::{Endpoint, Transport};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use transport_config::{load_layered, TransportSettings, ENV_PREFIX};
use types::Uri;

/// Broker process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Name of the broker endpoint under the transport root
    pub endpoint: String,
    pub transport: TransportSettings,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            endpoint: "broker".to_string(),
            transport: TransportSettings::default(),
        }
    }
}

impl BrokerConfig {
    pub fn load(path: Option<&Path>) -> BrokerResult<Self> {
        let config: Self = load_layered(path, ENV_PREFIX)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BrokerResult<()> {
        if self.endpoint.is_empty() || self.endpoint.contains(&['/', '@'][..]) {
            return Err(transport_config::ConfigError::invalid(
                "endpoint",
                format!("'{}' is not a valid endpoint name", self.endpoint),
            )
            .into());
        }
        self.transport.validate()?;
        Ok(())
    }
}

/// Running broker: transport, endpoint and subscription store
pub struct Broker {
    transport: Arc<Transport>,
    endpoint: Arc<Endpoint>,
    engine: Arc<BrokerMatchEngine>,
}

impl Broker {
    pub async fn start(config: BrokerConfig) -> BrokerResult<Self> {
        config.validate()?;
        let transport = Transport::start(config.transport).await?;
        let engine = Arc::new(BrokerMatchEngine::new());

        let endpoint = transport.create_endpoint(&config.endpoint);
        endpoint.set_listener(Arc::new(BrokerEndpoint::new(Arc::clone(&engine))));
        endpoint.start_delivery()?;

        info!(uri = %endpoint.uri(), "Broker ready");
        Ok(Self {
            transport,
            endpoint,
            engine,
        })
    }

    /// Address consumers and providers send to
    pub fn uri(&self) -> &Uri {
        self.endpoint.uri()
    }

    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    pub fn engine(&self) -> &Arc<BrokerMatchEngine> {
        &self.engine
    }

    pub async fn shutdown(&self) {
        self.endpoint.close();
        self.transport.close().await;
        info!("Broker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_file_and_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "endpoint = \"pubsub\"\n\n[transport]\nport = 4100\nnumconnections = 2"
        )
        .unwrap();

        let config = BrokerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.endpoint, "pubsub");
        assert_eq!(config.transport.port, 4100);
        assert_eq!(config.transport.connections_per_destination, 2);
        assert_eq!(config.transport.inbound_workers, 4);
    }

    #[test]
    fn test_invalid_endpoint_name() {
        let config = BrokerConfig {
            endpoint: "a/b".into(),
            ..BrokerConfig::default()
        };
        assert!(matches!(config.validate(), Err(BrokerError::Config(_))));
    }
}
