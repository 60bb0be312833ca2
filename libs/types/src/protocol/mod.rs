//! Protocol layer data types
//!
//! Header, SDU table and message structures. Encoding rules live in the
//! codec crate; these types only describe what travels on the wire.

pub mod error;
pub mod header;
pub mod message;
pub mod sdu;
pub mod standard_error;

pub use error::{ProtocolError, ProtocolResult};
pub use header::{MessageHeader, QosLevel, SessionType};
pub use message::Message;
pub use sdu::{InteractionType, SduType};
pub use standard_error::{ErrorBody, StandardError};
