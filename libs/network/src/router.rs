//! # Endpoint Router
//!
//! Maps the `to` address of each inbound message onto a registered local
//! endpoint. Messages for an unknown endpoint are answered with a
//! DESTINATION_UNKNOWN error reply when their stage always expects an
//! answer, and dropped otherwise.

use crate::endpoint::Endpoint;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};
use types::{Message, MessageHeader, StandardError};

/// Sends a protocol-level error back to the originator of a message
#[async_trait]
pub trait ErrorReplier: Send + Sync {
    async fn reply_error(&self, original: &MessageHeader, error: StandardError, info: String);
}

/// Router counters
#[derive(Debug, Default)]
pub struct RouterStats {
    pub delivered: AtomicU64,
    pub dropped: AtomicU64,
    pub error_replies: AtomicU64,
}

pub struct EndpointRouter {
    endpoints: RwLock<HashMap<String, Arc<Endpoint>>>,
    routing_supported: bool,
    replier: Arc<dyn ErrorReplier>,
    stats: RouterStats,
}

impl EndpointRouter {
    pub fn new(routing_supported: bool, replier: Arc<dyn ErrorReplier>) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            routing_supported,
            replier,
            stats: RouterStats::default(),
        }
    }

    pub fn routing_supported(&self) -> bool {
        self.routing_supported
    }

    /// Register an endpoint under its name, or return the one already
    /// registered under that name
    pub fn register(&self, endpoint: Arc<Endpoint>) -> Arc<Endpoint> {
        let mut endpoints = self.endpoints.write();
        Arc::clone(
            endpoints
                .entry(endpoint.name().to_string())
                .or_insert(endpoint),
        )
    }

    pub fn get(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.endpoints.write().remove(name)
    }

    pub fn len(&self) -> usize {
        self.endpoints.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.read().is_empty()
    }

    /// Close and remove every endpoint
    pub fn close_all(&self) {
        let endpoints: Vec<_> = self.endpoints.write().drain().map(|(_, e)| e).collect();
        for endpoint in endpoints {
            endpoint.close();
        }
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Deliver a message to its endpoint or answer the sender with an error
    pub async fn route(&self, message: Message) {
        let endpoint_id = message
            .header
            .to
            .as_ref()
            .map(|to| to.endpoint_id(self.routing_supported).to_string())
            .unwrap_or_default();

        let endpoint = self.get(&endpoint_id);
        if let Some(endpoint) = endpoint {
            trace!(
                endpoint = %endpoint_id,
                sdu = %message.header.sdu_type,
                transaction_id = message.header.transaction_id,
                "Routing message"
            );
            self.stats.delivered.fetch_add(1, Ordering::Relaxed);
            endpoint.deliver(message).await;
            return;
        }

        let header = message.header;
        if header.sdu_type.is_always_answered() {
            debug!(
                endpoint = %endpoint_id,
                sdu = %header.sdu_type,
                from = ?header.from,
                "No such endpoint, replying with error"
            );
            self.stats.error_replies.fetch_add(1, Ordering::Relaxed);
            let info = format!("no endpoint '{endpoint_id}' registered");
            self.replier
                .reply_error(&header, StandardError::DestinationUnknown, info)
                .await;
        } else {
            debug!(
                endpoint = %endpoint_id,
                sdu = %header.sdu_type,
                "No such endpoint, message dropped"
            );
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}
