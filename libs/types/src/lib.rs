//! # MAL Transport Types
//!
//! Data model shared by every layer of the transport:
//!
//! - **SDU table**: the bijective mapping between the 5-bit SDU code on the
//!   wire and the (interaction type, stage) pair it stands for
//! - **MessageHeader**: the decoded form of the binary header, including the
//!   optional fields gated by the presence-flags byte
//! - **Uri**: transport addresses, root URI extraction and the
//!   server/client address classes
//! - **StandardError**: protocol-level error codes carried in error replies
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/network → libs/messaging/broker
//!     ↑             ↓              ↓
//! Pure Data    Header/Body     Sockets, pools,
//! Structures   Encoding        routing
//! ```
//!
//! Nothing in here performs I/O.

pub mod address;
pub mod protocol;

pub use address::{AddressError, Authority, Uri, ROUTING_DELIMITER, SERVICE_DELIMITER};
pub use protocol::error::{ProtocolError, ProtocolResult};
pub use protocol::header::{MessageHeader, QosLevel, SessionType};
pub use protocol::message::Message;
pub use protocol::sdu::{InteractionType, SduType};
pub use protocol::standard_error::{ErrorBody, StandardError};

/// Wire protocol version carried in the top 3 bits of the first header byte
pub const PROTOCOL_VERSION: u8 = 1;
