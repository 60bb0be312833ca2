//! Sockets and destination channels
//!
//! A [`SocketHandle`] owns one physical connection: a writer task fed by a
//! bounded queue and a reader task. A [`DestinationChannel`] groups the
//! sockets that lead to one remote root URI and picks one per send.

use crate::connection::FrameWriter;
use crate::error::{Result, TransportError};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};
use types::Uri;

/// Pool-unique socket identifier
pub type ConnectionId = u64;

/// Queued writes per socket before senders wait
pub(crate) const WRITE_QUEUE_DEPTH: usize = 64;

pub(crate) struct WriteRequest {
    frame: Bytes,
    done: oneshot::Sender<Result<()>>,
}

/// One physical connection
#[derive(Debug)]
pub struct SocketHandle {
    id: ConnectionId,
    peer: SocketAddr,
    /// Remote root URI; set once, at connect time or on the first decoded
    /// inbound message
    root: OnceLock<Uri>,
    writes: mpsc::Sender<WriteRequest>,
    writer_task: JoinHandle<()>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl SocketHandle {
    /// Spawn the writer task for `writer` and wrap it in a handle
    pub(crate) fn spawn<W>(id: ConnectionId, peer: SocketAddr, writer: FrameWriter<W>) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (writes, requests) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let writer_task = tokio::spawn(run_writer(id, writer, requests));
        Self {
            id,
            peer,
            root: OnceLock::new(),
            writes,
            writer_task,
            reader_task: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn root(&self) -> Option<&Uri> {
        self.root.get()
    }

    /// Bind this socket to a remote root. Fails if already bound.
    pub(crate) fn associate(&self, root: Uri) -> std::result::Result<(), Uri> {
        self.root.set(root)
    }

    pub(crate) fn attach_reader(&self, task: JoinHandle<()>) {
        if self.is_closed() {
            task.abort();
        } else {
            *self.reader_task.lock() = Some(task);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Queue a frame and wait for the writer's result
    pub async fn write(&self, frame: Bytes) -> Result<()> {
        let target = self
            .root()
            .map(ToString::to_string)
            .unwrap_or_else(|| self.peer.to_string());
        let (done, result) = oneshot::channel();

        self.writes
            .send(WriteRequest { frame, done })
            .await
            .map_err(|_| TransportError::delivery_failed(&target, "socket writer has stopped"))?;

        result.await.map_err(|_| {
            TransportError::delivery_failed(&target, "socket writer dropped the send result")
        })?
    }

    /// Stop both tasks; dropping their halves closes the socket. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.writer_task.abort();
        if let Some(reader) = self.reader_task.lock().take() {
            reader.abort();
        }
        debug!(connection = self.id, peer = %self.peer, "Closed socket");
    }
}

impl Drop for SocketHandle {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_writer<W: AsyncWrite + Unpin>(
    id: ConnectionId,
    mut writer: FrameWriter<W>,
    mut requests: mpsc::Receiver<WriteRequest>,
) {
    while let Some(request) = requests.recv().await {
        let result = writer.write_frame(&request.frame).await;
        let failed = result.is_err();
        // Caller may have given up waiting
        let _ = request.done.send(result);
        if failed {
            break;
        }
    }
    trace!(connection = id, "Writer task exiting");
    writer.shutdown().await;
}

/// Sockets leading to one remote root URI.
///
/// Sends rotate round-robin over the sockets present at the time of the
/// call. Frames sent over one socket stay ordered; frames spread over
/// several sockets are not ordered relative to each other.
#[derive(Debug)]
pub struct DestinationChannel {
    root: Uri,
    sockets: RwLock<Vec<Arc<SocketHandle>>>,
    cursor: AtomicUsize,
}

impl DestinationChannel {
    pub fn new(root: Uri, sockets: Vec<Arc<SocketHandle>>) -> Self {
        Self {
            root,
            sockets: RwLock::new(sockets),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn root(&self) -> &Uri {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }

    /// Next socket in round-robin order
    pub fn next_socket(&self) -> Option<Arc<SocketHandle>> {
        let sockets = self.sockets.read();
        if sockets.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % sockets.len();
        Some(Arc::clone(&sockets[index]))
    }

    /// Add a socket unless it is already part of the channel
    pub(crate) fn add_socket(&self, socket: Arc<SocketHandle>) -> bool {
        let mut sockets = self.sockets.write();
        if sockets.iter().any(|s| s.id() == socket.id()) {
            return false;
        }
        sockets.push(socket);
        true
    }

    /// Remove a socket; returns it if it was present
    pub(crate) fn remove_socket(&self, id: ConnectionId) -> Option<Arc<SocketHandle>> {
        let mut sockets = self.sockets.write();
        let index = sockets.iter().position(|s| s.id() == id)?;
        Some(sockets.swap_remove(index))
    }

    /// Remove and close every socket
    pub(crate) fn close_all(&self) -> Vec<Arc<SocketHandle>> {
        let sockets: Vec<_> = self.sockets.write().drain(..).collect();
        for socket in &sockets {
            socket.close();
        }
        sockets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    fn socket(id: ConnectionId) -> Arc<SocketHandle> {
        let (stream, _peer) = duplex(64);
        let peer = SocketAddr::from(([127, 0, 0, 1], 1000 + id as u16));
        Arc::new(SocketHandle::spawn(
            id,
            peer,
            FrameWriter::new(stream, Some(peer), 1024),
        ))
    }

    #[tokio::test]
    async fn test_round_robin_selection() {
        let channel = DestinationChannel::new(
            Uri::from("maltcp://127.0.0.1:5000/"),
            vec![socket(1), socket(2), socket(3)],
        );
        let picked: Vec<_> = (0..6)
            .map(|_| channel.next_socket().unwrap().id())
            .collect();
        assert_eq!(picked, vec![1, 2, 3, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_add_remove_and_close() {
        let channel = DestinationChannel::new(Uri::from("maltcp://127.0.0.1:5000/"), vec![]);
        assert!(channel.next_socket().is_none());

        let first = socket(7);
        assert!(channel.add_socket(Arc::clone(&first)));
        assert!(!channel.add_socket(Arc::clone(&first)));
        assert!(channel.add_socket(socket(8)));
        assert_eq!(channel.len(), 2);

        assert_eq!(channel.remove_socket(7).map(|s| s.id()), Some(7));
        assert!(channel.remove_socket(7).is_none());

        let closed = channel.close_all();
        assert_eq!(closed.len(), 1);
        assert!(closed[0].is_closed());
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn test_association_is_write_once() {
        let handle = socket(1);
        assert!(handle.associate(Uri::from("maltcp://a:1/")).is_ok());
        assert!(handle.associate(Uri::from("maltcp://b:2/")).is_err());
        assert_eq!(handle.root().unwrap().as_str(), "maltcp://a:1/");
    }

    #[tokio::test]
    async fn test_write_reaches_peer() {
        use crate::connection::{FrameReader, ReadOutcome};

        let (local, remote) = duplex(256);
        let peer = SocketAddr::from(([127, 0, 0, 1], 9));
        let handle = SocketHandle::spawn(1, peer, FrameWriter::new(local, Some(peer), 1024));
        let mut reader = FrameReader::new(remote, Some(peer), 1024);

        handle.write(Bytes::from_static(b"frame")).await.unwrap();
        assert_eq!(
            reader.read_frame().await.unwrap(),
            ReadOutcome::Frame(Bytes::from_static(b"frame"))
        );

        handle.close();
        assert!(handle.write(Bytes::from_static(b"late")).await.is_err());
    }
}
