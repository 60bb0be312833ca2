//! # MAL/TCP Codec
//!
//! ## Purpose
//!
//! Byte-level rules of the transport: the binary message header, the body
//! encodings selected by the header's encoding id, and frame construction.
//! Pure functions over byte buffers; no sockets, no async.
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//! MessageHeader  encode/decode  FrameWriter / FrameReader
//! SduType        body framing   length-prefixed sockets
//! ```
//!
//! ## What This Crate Contains
//! - [`HeaderCodec`]: header encode/decode with optional-field presence flags
//! - [`Encoding`]: closed set of body encodings keyed by encoding id
//! - [`encode_frame`] / [`decode_frame`]: two-pass frame construction and
//!   length-checked decoding
//!
//! ## What This Crate Does NOT Contain
//! - Attribute-level encoding of body elements (application concern)
//! - Socket I/O and the outer length prefix (belongs in network/)

pub mod constants;
pub mod encoding;
pub mod frame;
pub mod header;

pub use constants::{
    DEFAULT_MAX_FRAME_SIZE, FIXED_HEADER_SIZE, FRAME_LENGTH_PREFIX, VARIABLE_LENGTH_OFFSET,
};
pub use encoding::Encoding;
pub use frame::{decode_frame, encode_frame};
pub use header::HeaderCodec;

// Errors live with the data model so every layer shares one type
pub use types::{ProtocolError, ProtocolResult};
