//! # Inbound Receiver
//!
//! One reader task per socket, accepted or connected. The task reads
//! frames, decodes them, binds the socket to the sender's root URI on the
//! first decoded message, and hands messages to the inbound dispatcher.
//!
//! ```text
//! socket ──► FrameReader ──► decode_frame ──► InboundDispatcher ──► router
//!                │                 │
//!                └── EOF / error ──┴──► ReaderExit ──► pool supervisor
//! ```
//!
//! The task never mutates the pool's destination map on failure; it returns
//! a [`ReaderExit`] and the supervisor decides what to tear down.

use crate::channel::{ConnectionId, SocketHandle};
use crate::connection::{FrameReader, ReadOutcome};
use crate::dispatch::InboundDispatcher;
use crate::error::{Result, TransportError};
use crate::pool::ConnectionPool;
use std::sync::{Arc, Weak};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use types::Message;

/// Why a reader task stopped
#[derive(Debug)]
pub enum ExitReason {
    /// Peer closed the socket between frames, or the dispatcher shut down
    EndOfStream,
    /// Corrupt stream or socket error
    Failed(TransportError),
}

/// Report sent by a finished reader task to the pool supervisor
#[derive(Debug)]
pub struct ReaderExit {
    pub connection: ConnectionId,
    /// Root URI the socket was bound to when the reader stopped
    pub root: Option<types::Uri>,
    pub reason: ExitReason,
}

pub(crate) struct InboundReceiver<R> {
    socket: Arc<SocketHandle>,
    reader: FrameReader<R>,
    pool: Weak<ConnectionPool>,
    dispatcher: InboundDispatcher,
    exits: mpsc::UnboundedSender<ReaderExit>,
}

impl<R: AsyncRead + Unpin> InboundReceiver<R> {
    pub(crate) fn new(
        socket: Arc<SocketHandle>,
        reader: FrameReader<R>,
        pool: Weak<ConnectionPool>,
        dispatcher: InboundDispatcher,
        exits: mpsc::UnboundedSender<ReaderExit>,
    ) -> Self {
        Self {
            socket,
            reader,
            pool,
            dispatcher,
            exits,
        }
    }

    pub(crate) async fn run(mut self) {
        let reason = match self.read_loop().await {
            Ok(()) => ExitReason::EndOfStream,
            Err(e) => ExitReason::Failed(e),
        };

        let exit = ReaderExit {
            connection: self.socket.id(),
            root: self.socket.root().cloned(),
            reason,
        };
        if self.exits.send(exit).is_err() {
            debug!(connection = self.socket.id(), "Pool supervisor gone, closing socket");
            self.socket.close();
        }
    }

    async fn read_loop(&mut self) -> Result<()> {
        loop {
            let frame = match self.reader.read_frame().await? {
                ReadOutcome::Frame(frame) => frame,
                ReadOutcome::EndOfStream => return Ok(()),
            };

            let message = codec::decode_frame(frame)
                .map_err(|e| TransportError::decode(Some(self.socket.peer()), e))?;

            if self.socket.root().is_none() {
                self.associate(&message).await;
            }

            if !self
                .dispatcher
                .dispatch(self.socket.id(), message)
                .await
            {
                debug!(connection = self.socket.id(), "Dispatcher stopped, ending reader");
                return Ok(());
            }
        }
    }

    /// Bind this socket to the root of the sender's address so replies can
    /// travel back over it
    async fn associate(&self, message: &Message) {
        let Some(from) = message.header.from.as_ref() else {
            warn!(
                connection = self.socket.id(),
                peer = %self.socket.peer(),
                "First message carries no sender address, socket stays unbound"
            );
            return;
        };

        if let Some(pool) = self.pool.upgrade() {
            pool.register_inbound(Arc::clone(&self.socket), from.root())
                .await;
        }
    }
}
