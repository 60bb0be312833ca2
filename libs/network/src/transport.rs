//! # Transport
//!
//! One transport instance: its root URI, listener, connection pool, inbound
//! dispatch workers, endpoint registry and outbound sender.
//!
//! ## Startup order
//!
//! ```text
//! bind listener / root URI ─► dispatcher ─► pool (+ supervisor) ─► sender
//!                          ─► router ─► dispatch workers ─► accept loop
//! ```
//!
//! A server transport listens on `host:port` and advertises a server-class
//! root URI. A client transport never listens; it advertises a client-class
//! root URI with an opaque id and can only be answered over sockets it
//! opened itself.

use crate::dispatch::InboundDispatcher;
use crate::endpoint::Endpoint;
use crate::error::{BatchSendError, Result, TransportError};
use crate::pool::{ConnectionPool, PoolSettings};
use crate::router::EndpointRouter;
use crate::sender::OutboundSender;
use parking_lot::Mutex;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transport_config::TransportSettings;
use types::{Message, Uri};

/// Pause after a failed accept before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Transport {
    settings: TransportSettings,
    root: Uri,
    local_addr: Option<SocketAddr>,
    pool: Arc<ConnectionPool>,
    sender: Arc<OutboundSender>,
    router: Arc<EndpointRouter>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Transport {
    /// Validate settings, bind the listener when configured to, and start
    /// every background task
    pub async fn start(settings: TransportSettings) -> Result<Arc<Self>> {
        settings.validate()?;

        // Bind before spawning anything
        let (root, listener) = if settings.listen {
            let listener = TcpListener::bind((settings.host.as_str(), settings.port))
                .await
                .map_err(|e| {
                    TransportError::io(
                        format!("Failed to bind {}:{}", settings.host, settings.port),
                        e,
                    )
                })?;
            let local_addr = listener
                .local_addr()
                .map_err(|e| TransportError::io("Failed to read listener address", e))?;

            let host = advertised_host(&settings, local_addr.ip()).await;
            let root = Uri::server_root(&settings.scheme, &host, local_addr.port());
            (root, Some((listener, local_addr)))
        } else {
            let id = uuid::Uuid::new_v4().simple().to_string();
            (Uri::client_root(&settings.scheme, &settings.host, &id), None)
        };

        let (dispatcher, workers) =
            InboundDispatcher::new(settings.inbound_workers, settings.inbound_queue_depth);
        let (pool, supervisor) = ConnectionPool::start(PoolSettings::from(&settings), dispatcher);
        let sender = Arc::new(OutboundSender::new(Arc::clone(&pool)));
        let router = Arc::new(EndpointRouter::new(
            settings.routing_supported,
            sender.clone(),
        ));

        let mut tasks = vec![supervisor];
        tasks.extend(workers.spawn(Arc::clone(&router)));
        let local_addr = listener.map(|(listener, local_addr)| {
            tasks.push(tokio::spawn(accept_loop(listener, Arc::clone(&pool))));
            local_addr
        });

        info!(
            uri = %root,
            listen = settings.listen,
            workers = settings.inbound_workers,
            connections_per_destination = settings.connections_per_destination,
            "Transport started"
        );

        Ok(Arc::new(Self {
            settings,
            root,
            local_addr,
            pool,
            sender,
            router,
            tasks: Mutex::new(tasks),
        }))
    }

    pub fn root_uri(&self) -> &Uri {
        &self.root
    }

    /// Bound listener address, for server transports
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    pub fn router(&self) -> &Arc<EndpointRouter> {
        &self.router
    }

    /// Create a local endpoint, or return the existing one of that name
    pub fn create_endpoint(&self, name: &str) -> Arc<Endpoint> {
        let uri = Uri::for_endpoint(&self.root, name);
        let endpoint = Arc::new(Endpoint::new(name, uri, Arc::clone(&self.sender)));
        let endpoint = self.router.register(endpoint);
        debug!(endpoint = %endpoint.uri(), "Endpoint registered");
        endpoint
    }

    pub fn endpoint(&self, name: &str) -> Option<Arc<Endpoint>> {
        self.router.get(name)
    }

    /// Endpoint addressed by a full URI under this transport's root
    pub fn endpoint_by_uri(&self, uri: &Uri) -> Option<Arc<Endpoint>> {
        if uri.root() != self.root {
            return None;
        }
        self.router
            .get(uri.endpoint_id(self.settings.routing_supported))
    }

    /// Close and unregister an endpoint. Returns false when there was none.
    pub fn delete_endpoint(&self, name: &str) -> bool {
        match self.router.remove(name) {
            Some(endpoint) => {
                endpoint.close();
                true
            }
            None => false,
        }
    }

    pub async fn send(&self, message: &Message) -> Result<()> {
        self.sender.send(message).await
    }

    pub async fn send_batch(&self, messages: &[Message]) -> std::result::Result<(), BatchSendError> {
        self.sender.send_batch(messages).await
    }

    /// Stop background tasks, close every endpoint and socket
    pub async fn close(&self) {
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in &tasks {
            task.abort();
        }
        futures::future::join_all(tasks).await;

        self.router.close_all();
        self.pool.close_all();
        info!(uri = %self.root, "Transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.pool.close_all();
    }
}

async fn accept_loop(listener: TcpListener, pool: Arc<ConnectionPool>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                if let Err(e) = pool.adopt_inbound(stream) {
                    warn!(peer = %peer, error = %e, "Failed to adopt connection");
                }
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Host name placed in the root URI. With `auto_host` the address of the
/// interface that routes outwards is used; binding to the unspecified
/// address advertises that address too.
async fn advertised_host(settings: &TransportSettings, bound: IpAddr) -> String {
    if !settings.auto_host && !bound.is_unspecified() {
        return settings.host.clone();
    }
    match outbound_interface().await {
        Ok(ip) => ip.to_string(),
        Err(e) => {
            warn!(error = %e, host = %settings.host, "Host detection failed, using configured host");
            settings.host.clone()
        }
    }
}

/// Local address the OS would use to reach a public address. Connecting a
/// UDP socket sends nothing.
async fn outbound_interface() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
    socket.connect(("8.8.8.8", 80)).await?;
    Ok(socket.local_addr()?.ip())
}
