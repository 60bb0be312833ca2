//! # MAL/TCP Network Layer
//!
//! Sockets, destination channels and the inbound/outbound pipelines of a
//! transport instance.
//!
//! ## Architecture Role
//!
//! ```text
//! Endpoint::send ─► OutboundSender ─► ConnectionPool ─► SocketHandle writer ─► TCP
//!                                         ▲
//! TCP ─► InboundReceiver ─► InboundDispatcher ─► EndpointRouter ─► MessageListener
//!              │                                      │
//!              └─ ReaderExit ─► pool supervisor       └─ ErrorReplier (error replies)
//! ```
//!
//! ## Failure Policy
//!
//! Per-message failures (bad address, encoding, unknown endpoint) are
//! reported to the caller or answered with an error reply. Connection-level
//! failures (decode errors, socket I/O) tear down the whole destination
//! channel; the next send reconnects.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use network::{ChannelListener, Transport};
//! use std::sync::Arc;
//! use transport_config::TransportSettings;
//! use types::{SduType, Uri};
//!
//! # async fn example() -> network::Result<()> {
//! let transport = Transport::start(TransportSettings::default()).await?;
//! let endpoint = transport.create_endpoint("provider");
//! let (listener, mut inbox) = ChannelListener::new(64);
//! endpoint.set_listener(Arc::new(listener));
//! endpoint.start_delivery()?;
//!
//! let to = Uri::from("maltcp://10.0.0.5:1024/consumer");
//! endpoint.send(endpoint.message(SduType::Send, to, vec![])).await?;
//! let _first = inbox.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod connection;
pub mod dispatch;
pub mod endpoint;
pub mod error;
pub mod pool;
pub mod receiver;
pub mod router;
pub mod sender;
pub mod transport;

pub use channel::{ConnectionId, DestinationChannel, SocketHandle};
pub use connection::{FrameReader, FrameWriter, ReadOutcome};
pub use dispatch::{DispatchWorkers, InboundDispatcher};
pub use endpoint::{ChannelListener, Endpoint, EndpointState, MessageListener};
pub use error::{BatchSendError, Result, TransportError};
pub use pool::{ConnectionPool, PoolSettings, PoolStats};
pub use receiver::{ExitReason, ReaderExit};
pub use router::{EndpointRouter, ErrorReplier, RouterStats};
pub use sender::OutboundSender;
pub use transport::Transport;
