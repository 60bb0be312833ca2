//! # Connection Pool
//!
//! ## Purpose
//!
//! Owns every socket of a transport and groups them into destination
//! channels keyed by remote root URI. Channels are created on demand for
//! outbound sends and bound on first message for accepted sockets, so a
//! reply to a peer that cannot be connected to (client-class address)
//! reuses the socket the peer opened.
//!
//! ## Lifecycle
//!
//! ```text
//! resolve_or_create(uri) ──► connect N sockets ──► channel
//!        │ failure                                    │
//!        └──► close partial sockets, drop entry       │
//! accepted socket ──► first message ──► register_inbound(uri) ─┤
//! reader exit ──► supervisor ──► teardown(uri) / remove_socket ┘
//! ```
//!
//! Concurrent `resolve_or_create` calls for one URI share a single
//! in-flight creation; exactly one channel results.

use crate::channel::{ConnectionId, DestinationChannel, SocketHandle};
use crate::connection;
use crate::dispatch::InboundDispatcher;
use crate::error::{Result, TransportError};
use crate::receiver::{ExitReason, InboundReceiver, ReaderExit};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use transport_config::TransportSettings;
use types::{Authority, Uri};

type ChannelSlot = Arc<OnceCell<Arc<DestinationChannel>>>;

/// Pool sizing and socket limits
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub connections_per_destination: usize,
    pub connect_timeout: Duration,
    pub max_frame_size: usize,
}

impl From<&TransportSettings> for PoolSettings {
    fn from(settings: &TransportSettings) -> Self {
        Self {
            connections_per_destination: settings.connections_per_destination.max(1),
            connect_timeout: settings.connect_timeout(),
            max_frame_size: settings.max_frame_size,
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub destinations: usize,
    pub open_sockets: usize,
    pub sockets_opened: u64,
    pub teardowns: u64,
}

pub struct ConnectionPool {
    settings: PoolSettings,
    destinations: DashMap<Uri, ChannelSlot>,
    /// Every live socket, bound to a destination or not
    sockets: DashMap<ConnectionId, Arc<SocketHandle>>,
    next_id: AtomicU64,
    dispatcher: InboundDispatcher,
    exits: mpsc::UnboundedSender<ReaderExit>,
    sockets_opened: AtomicU64,
    teardowns: AtomicU64,
    this: Weak<ConnectionPool>,
}

impl ConnectionPool {
    /// Create the pool and spawn its supervisor task
    pub fn start(
        settings: PoolSettings,
        dispatcher: InboundDispatcher,
    ) -> (Arc<Self>, JoinHandle<()>) {
        let (exits, exit_rx) = mpsc::unbounded_channel();
        let pool = Arc::new_cyclic(|this| Self {
            settings,
            destinations: DashMap::new(),
            sockets: DashMap::new(),
            next_id: AtomicU64::new(1),
            dispatcher,
            exits,
            sockets_opened: AtomicU64::new(0),
            teardowns: AtomicU64::new(0),
            this: this.clone(),
        });
        let supervisor = tokio::spawn(supervise(Arc::downgrade(&pool), exit_rx));
        (pool, supervisor)
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Existing channel for `root`, without creating one
    pub fn channel(&self, root: &Uri) -> Option<Arc<DestinationChannel>> {
        self.destinations
            .get(&root.root())
            .and_then(|slot| slot.get().cloned())
    }

    pub fn contains(&self, root: &Uri) -> bool {
        self.channel(root).is_some()
    }

    pub fn destinations(&self) -> Vec<Uri> {
        self.destinations
            .iter()
            .filter(|entry| entry.value().initialized())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Channel for a remote root URI, connecting it if absent.
    ///
    /// The address is parsed before any socket work, so a malformed URI
    /// fails without touching the network. A client-class root can only be
    /// reached through a socket the peer opened itself.
    pub async fn resolve_or_create(&self, uri: &Uri) -> Result<Arc<DestinationChannel>> {
        let root = uri.root();
        root.authority()
            .map_err(|e| TransportError::malformed_address(root.as_str(), e))?;

        let slot = self.destinations.entry(root.clone()).or_default().clone();
        let result = slot
            .get_or_try_init(|| self.open_channel(&root))
            .await
            .cloned();

        match result {
            Ok(channel) => {
                let current = self
                    .destinations
                    .get(&root)
                    .is_some_and(|entry| Arc::ptr_eq(entry.value(), &slot));
                if current {
                    Ok(channel)
                } else {
                    // Torn down while the connect was in flight
                    self.forget_sockets(&channel.close_all());
                    Err(TransportError::delivery_failed(
                        &root,
                        "destination was torn down while connecting",
                    ))
                }
            }
            Err(e) => {
                // An inbound socket may have filled the slot meanwhile
                self.destinations.remove_if(&root, |_, current| {
                    Arc::ptr_eq(current, &slot) && !current.initialized()
                });
                Err(e)
            }
        }
    }

    /// Bind an accepted socket to the remote root it was first heard from.
    ///
    /// The socket joins the existing channel for that root, or becomes the
    /// first socket of a new one. A socket already bound is left alone.
    pub async fn register_inbound(&self, socket: Arc<SocketHandle>, root: Uri) {
        let root = root.root();
        if socket.associate(root.clone()).is_err() {
            return;
        }

        let slot = self.destinations.entry(root.clone()).or_default().clone();
        let channel = slot
            .get_or_init(|| async {
                Arc::new(DestinationChannel::new(root.clone(), vec![Arc::clone(&socket)]))
            })
            .await;
        if !self.attach_socket(&root, &slot, channel, &socket) {
            warn!(
                uri = %root,
                connection = socket.id(),
                "Destination torn down while binding inbound connection"
            );
            return;
        }

        info!(
            uri = %root,
            connection = socket.id(),
            peer = %socket.peer(),
            sockets = channel.len(),
            "Bound inbound connection"
        );
    }

    /// Close every socket of `root` and drop its channel. Idempotent:
    /// returns false when there was nothing to tear down.
    pub fn teardown(&self, root: &Uri) -> bool {
        let root = root.root();
        let Some((_, slot)) = self.destinations.remove(&root) else {
            debug!(uri = %root, "Teardown of absent destination");
            return false;
        };

        let closed = slot
            .get()
            .map(|channel| channel.close_all())
            .unwrap_or_default();
        self.forget_sockets(&closed);
        self.teardowns.fetch_add(1, Ordering::Relaxed);

        info!(uri = %root, sockets = closed.len(), "Tore down destination");
        true
    }

    /// Drop one socket after a clean close. The channel goes with its last
    /// socket.
    pub fn remove_socket(&self, connection: ConnectionId, root: Option<&Uri>) {
        if let Some(root) = root {
            if let Some(slot) = self.destinations.get(root).map(|s| s.value().clone()) {
                if let Some(channel) = slot.get() {
                    channel.remove_socket(connection);
                    if channel.is_empty() {
                        self.destinations.remove_if(root, |_, current| {
                            Arc::ptr_eq(current, &slot) && channel.is_empty()
                        });
                        debug!(uri = %root, "Removed empty destination");
                    }
                }
            }
        }

        if let Some((_, socket)) = self.sockets.remove(&connection) {
            socket.close();
        }
    }

    /// Take ownership of an accepted socket and start reading from it
    pub fn adopt_inbound(&self, stream: TcpStream) -> Result<Arc<SocketHandle>> {
        let socket = self.spawn_socket(stream, None)?;
        info!(connection = socket.id(), peer = %socket.peer(), "Accepted connection");
        Ok(socket)
    }

    /// Tear down every destination and close unbound sockets
    pub fn close_all(&self) {
        let roots: Vec<Uri> = self
            .destinations
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for root in roots {
            self.teardown(&root);
        }

        let ids: Vec<ConnectionId> = self.sockets.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, socket)) = self.sockets.remove(&id) {
                socket.close();
            }
        }
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            destinations: self.destinations.len(),
            open_sockets: self.sockets.len(),
            sockets_opened: self.sockets_opened.load(Ordering::Relaxed),
            teardowns: self.teardowns.load(Ordering::Relaxed),
        }
    }

    async fn open_channel(&self, root: &Uri) -> Result<Arc<DestinationChannel>> {
        let (host, port) = match root.authority() {
            Ok(Authority::Server { host, port }) => (host, port),
            Ok(Authority::Client { .. }) => {
                return Err(TransportError::delivery_failed(
                    root,
                    "client address has no open connection",
                ))
            }
            Err(e) => return Err(TransportError::malformed_address(root.as_str(), e)),
        };

        let count = self.settings.connections_per_destination;
        let mut sockets = Vec::with_capacity(count);
        for _ in 0..count {
            match self.connect(root, host, port).await {
                Ok(socket) => sockets.push(socket),
                Err(e) => {
                    warn!(
                        uri = %root,
                        opened = sockets.len(),
                        error = %e,
                        "Connect failed, discarding partial destination"
                    );
                    for socket in &sockets {
                        socket.close();
                    }
                    self.forget_sockets(&sockets);
                    return Err(e);
                }
            }
        }

        info!(uri = %root, sockets = sockets.len(), "Opened destination");
        Ok(Arc::new(DestinationChannel::new(root.clone(), sockets)))
    }

    async fn connect(&self, root: &Uri, host: &str, port: u16) -> Result<Arc<SocketHandle>> {
        let timeout = self.settings.connect_timeout;
        let timed_out = || TransportError::TransientUnreachable {
            uri: root.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let addrs: Vec<_> = tokio::time::timeout(timeout, tokio::net::lookup_host((host, port)))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| TransportError::UnknownHost {
                host: host.to_string(),
                source: Some(e),
            })?
            .collect();
        if addrs.is_empty() {
            return Err(TransportError::UnknownHost {
                host: host.to_string(),
                source: None,
            });
        }

        let stream = tokio::time::timeout(timeout, TcpStream::connect(&addrs[..]))
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| TransportError::connect_failed(root.as_str(), e))?;

        let socket = self.spawn_socket(stream, Some(root.clone()))?;
        debug!(uri = %root, connection = socket.id(), peer = %socket.peer(), "Connected socket");
        Ok(socket)
    }

    /// Wrap a connected stream: writer task, reader task, pool bookkeeping
    fn spawn_socket(&self, stream: TcpStream, root: Option<Uri>) -> Result<Arc<SocketHandle>> {
        let (reader, writer, peer) = connection::split(stream, self.settings.max_frame_size)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let socket = Arc::new(SocketHandle::spawn(id, peer, writer));
        if let Some(root) = root {
            // Fresh handle, cannot already be bound
            let _ = socket.associate(root);
        }

        self.sockets.insert(id, Arc::clone(&socket));
        self.sockets_opened.fetch_add(1, Ordering::Relaxed);

        let receiver = InboundReceiver::new(
            Arc::clone(&socket),
            reader,
            self.this.clone(),
            self.dispatcher.clone(),
            self.exits.clone(),
        );
        socket.attach_reader(tokio::spawn(receiver.run()));
        Ok(socket)
    }

    /// Add `socket` to `channel` while `slot` is still the live entry for
    /// `root`. A socket that lost the race with a teardown is closed.
    fn attach_socket(
        &self,
        root: &Uri,
        slot: &ChannelSlot,
        channel: &DestinationChannel,
        socket: &Arc<SocketHandle>,
    ) -> bool {
        channel.add_socket(Arc::clone(socket));
        let current = self
            .destinations
            .get(root)
            .is_some_and(|entry| Arc::ptr_eq(entry.value(), slot));
        if !current {
            channel.remove_socket(socket.id());
            socket.close();
            self.forget_sockets(std::slice::from_ref(socket));
        }
        current
    }

    fn forget_sockets(&self, sockets: &[Arc<SocketHandle>]) {
        for socket in sockets {
            self.sockets.remove(&socket.id());
        }
    }

    fn handle_exit(&self, exit: ReaderExit) {
        match exit.reason {
            ExitReason::EndOfStream => {
                debug!(connection = exit.connection, uri = ?exit.root, "Connection closed by peer");
                self.remove_socket(exit.connection, exit.root.as_ref());
            }
            ExitReason::Failed(error) => {
                warn!(
                    connection = exit.connection,
                    uri = ?exit.root,
                    category = error.category(),
                    error = %error,
                    "Reader failed"
                );
                match exit.root {
                    Some(root) if error.is_connection_fatal() => {
                        self.teardown(&root);
                        // Socket may have been replaced in the map already
                        if let Some((_, socket)) = self.sockets.remove(&exit.connection) {
                            socket.close();
                        }
                    }
                    root => self.remove_socket(exit.connection, root.as_ref()),
                }
            }
        }
    }
}

/// Applies reader exits to the pool until the pool is dropped
async fn supervise(pool: Weak<ConnectionPool>, mut exits: mpsc::UnboundedReceiver<ReaderExit>) {
    while let Some(exit) = exits.recv().await {
        let Some(pool) = pool.upgrade() else {
            break;
        };
        pool.handle_exit(exit);
    }
    debug!("Pool supervisor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DispatchWorkers;

    fn pool() -> (Arc<ConnectionPool>, DispatchWorkers) {
        let (dispatcher, workers) = InboundDispatcher::new(1, 8);
        let settings = PoolSettings {
            connections_per_destination: 2,
            connect_timeout: Duration::from_secs(2),
            max_frame_size: 1024 * 1024,
        };
        let (pool, _supervisor) = ConnectionPool::start(settings, dispatcher);
        (pool, workers)
    }

    #[tokio::test]
    async fn test_malformed_address_touches_no_socket() {
        let (pool, _workers) = pool();
        let err = pool
            .resolve_or_create(&Uri::from("proto://host-no-port"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::MalformedAddress { .. }));
        assert_eq!(pool.stats().sockets_opened, 0);
        assert_eq!(pool.stats().destinations, 0);
    }

    #[tokio::test]
    async fn test_client_address_without_socket_is_undeliverable() {
        let (pool, _workers) = pool();
        let err = pool
            .resolve_or_create(&Uri::from("maltcp://127.0.0.1:c0ffee/svc"))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::DeliveryFailed { .. }));
        assert!(pool.destinations().is_empty());
    }

    #[tokio::test]
    async fn test_socket_bound_to_stale_slot_is_closed() {
        let (pool, _workers) = pool();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let socket = pool.adopt_inbound(stream).unwrap();
        assert_eq!(pool.stats().open_sockets, 1);

        // Slot that a teardown already removed from the map
        let root = Uri::from("maltcp://10.0.0.9:4000/");
        let stale: ChannelSlot = Arc::default();
        let channel = DestinationChannel::new(root.clone(), Vec::new());

        assert!(!pool.attach_socket(&root, &stale, &channel, &socket));
        assert!(channel.is_empty());
        assert!(socket.is_closed());
        assert_eq!(pool.stats().open_sockets, 0);
        assert!(!pool.contains(&root));
    }

    #[tokio::test]
    async fn test_socket_bound_to_live_slot_joins_channel() {
        let (pool, _workers) = pool();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _client = TcpStream::connect(addr).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        let socket = pool.adopt_inbound(stream).unwrap();

        let root = Uri::from("maltcp://10.0.0.9:4000/");
        pool.register_inbound(Arc::clone(&socket), root.clone()).await;

        let channel = pool.channel(&root).unwrap();
        assert_eq!(channel.len(), 1);
        assert!(!socket.is_closed());
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (pool, _workers) = pool();
        let uri = Uri::from("maltcp://127.0.0.1:1/");
        assert!(!pool.teardown(&uri));
        assert!(!pool.teardown(&uri));
        assert_eq!(pool.stats().teardowns, 0);
    }
}
