//! Local endpoints
//!
//! An endpoint is a named service address under the transport's root URI.
//! Inbound messages reach its listener only while delivery is started.
//!
//! ```text
//!           start_delivery            close
//! Created ─────────────────► Active ────────► Closed
//!    ▲                          │               ▲
//!    └────── stop_delivery ─────┘               │
//!    └──────────────── close ───────────────────┘
//! ```

use crate::error::{BatchSendError, Result, TransportError};
use crate::sender::OutboundSender;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use types::{Message, MessageHeader, SduType, Uri};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Created,
    Active,
    /// Terminal
    Closed,
}

/// Receives messages routed to an endpoint
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, endpoint: &Endpoint, message: Message);
}

/// Listener that forwards every message into a bounded channel
pub struct ChannelListener {
    tx: mpsc::Sender<Message>,
}

impl ChannelListener {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageListener for ChannelListener {
    async fn on_message(&self, endpoint: &Endpoint, message: Message) {
        if self.tx.send(message).await.is_err() {
            debug!(endpoint = endpoint.name(), "Listener receiver dropped, message discarded");
        }
    }
}

pub struct Endpoint {
    name: String,
    uri: Uri,
    state: RwLock<EndpointState>,
    listener: RwLock<Option<Arc<dyn MessageListener>>>,
    sender: Arc<OutboundSender>,
}

impl Endpoint {
    pub(crate) fn new(name: impl Into<String>, uri: Uri, sender: Arc<OutboundSender>) -> Self {
        Self {
            name: name.into(),
            uri,
            state: RwLock::new(EndpointState::Created),
            listener: RwLock::new(None),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn state(&self) -> EndpointState {
        *self.state.read()
    }

    pub fn set_listener(&self, listener: Arc<dyn MessageListener>) {
        *self.listener.write() = Some(listener);
    }

    /// Created → Active. A closed endpoint cannot be restarted.
    pub fn start_delivery(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            EndpointState::Closed => Err(self.closed()),
            _ => {
                *state = EndpointState::Active;
                debug!(endpoint = %self.uri, "Delivery started");
                Ok(())
            }
        }
    }

    /// Active → Created
    pub fn stop_delivery(&self) -> Result<()> {
        let mut state = self.state.write();
        match *state {
            EndpointState::Closed => Err(self.closed()),
            _ => {
                *state = EndpointState::Created;
                debug!(endpoint = %self.uri, "Delivery stopped");
                Ok(())
            }
        }
    }

    /// Move to Closed and drop the listener. Idempotent.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), EndpointState::Closed);
        if previous != EndpointState::Closed {
            self.listener.write().take();
            info!(endpoint = %self.uri, "Endpoint closed");
        }
    }

    /// Header addressed from this endpoint to `to`
    pub fn header(&self, sdu_type: SduType, to: Uri) -> MessageHeader {
        MessageHeader::new(sdu_type).with_addresses(self.uri.clone(), to)
    }

    /// Build a message from this endpoint
    pub fn message(&self, sdu_type: SduType, to: Uri, body: Vec<Bytes>) -> Message {
        Message::new(self.header(sdu_type, to), body)
    }

    /// Send from this endpoint. A missing `from` is filled with this
    /// endpoint's URI.
    pub async fn send(&self, mut message: Message) -> Result<()> {
        self.ensure_open()?;
        message.header.from.get_or_insert_with(|| self.uri.clone());
        self.sender.send(&message).await
    }

    pub async fn send_batch(
        &self,
        mut messages: Vec<Message>,
    ) -> std::result::Result<(), BatchSendError> {
        if let Err(e) = self.ensure_open() {
            return Err(BatchSendError {
                total: messages.len(),
                failures: vec![(0, e)],
            });
        }
        for message in &mut messages {
            message.header.from.get_or_insert_with(|| self.uri.clone());
        }
        self.sender.send_batch(&messages).await
    }

    /// Hand a routed message to the listener; dropped unless Active
    pub(crate) async fn deliver(&self, message: Message) {
        if self.state() != EndpointState::Active {
            debug!(
                endpoint = %self.uri,
                state = ?self.state(),
                sdu = %message.header.sdu_type,
                "Endpoint not active, message dropped"
            );
            return;
        }

        let listener = self.listener.read().clone();
        match listener {
            Some(listener) => listener.on_message(self, message).await,
            None => warn!(endpoint = %self.uri, "No listener set, message dropped"),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == EndpointState::Closed {
            Err(self.closed())
        } else {
            Ok(())
        }
    }

    fn closed(&self) -> TransportError {
        TransportError::EndpointClosed {
            endpoint: self.name.clone(),
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("state", &self.state())
            .finish()
    }
}
