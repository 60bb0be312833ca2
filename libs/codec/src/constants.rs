//! # Wire Constants
//!
//! Offsets and flag bits of the binary header. The fixed prefix is always
//! `FIXED_HEADER_SIZE` bytes; everything after it is counted by the
//! variable-length slot at `VARIABLE_LENGTH_OFFSET`.
//!
//! ```text
//! 0      version<<5 | sdu_type
//! 1..3   service area    (u16 BE)
//! 3..5   service         (u16 BE)
//! 5..7   operation       (u16 BE)
//! 7      area version
//! 8      error<<7 | qos<<4 | session
//! 9..17  transaction id  (u64 BE)
//! 17     presence flags
//! 18     encoding id
//! 19..23 variable length (u32 BE)
//! ```

pub const FIXED_HEADER_SIZE: usize = 23;
pub const VARIABLE_LENGTH_OFFSET: usize = 19;

/// Size of the outer length prefix written before each frame on a socket
pub const FRAME_LENGTH_PREFIX: usize = 4;

/// Default upper bound on a single frame, excluding the length prefix
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

pub const VERSION_SHIFT: u8 = 5;
pub const SDU_MASK: u8 = 0x1F;
pub const ERROR_BIT: u8 = 0x80;
pub const QOS_SHIFT: u8 = 4;
pub const QOS_MASK: u8 = 0x07;
pub const SESSION_MASK: u8 = 0x0F;

/// Presence flags, one bit per optional header field
pub mod flags {
    pub const FROM: u8 = 1 << 7;
    pub const TO: u8 = 1 << 6;
    pub const PRIORITY: u8 = 1 << 5;
    pub const TIMESTAMP: u8 = 1 << 4;
    pub const NETWORK_ZONE: u8 = 1 << 3;
    pub const SESSION_NAME: u8 = 1 << 2;
    pub const DOMAIN: u8 = 1 << 1;
    pub const AUTHENTICATION_ID: u8 = 1;
}
