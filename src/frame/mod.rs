//! HTTP/2 control-frame codec.
//!
//! Every frame starts with the same 9-byte header:
//! ```text
//! +-----------------------------------------------+
//! |                 Length (24)                   |
//! +---------------+---------------+---------------+
//! |   Type (8)    |   Flags (8)   |
//! +-+-------------+---------------+-------------------------------+
//! |R|                 Stream Identifier (31)                      |
//! +=+=============================================================+
//! |                   Frame Payload (0...)                      ...
//! +---------------------------------------------------------------+
//! ```
//!
//! Only the frames the connection handler acts on are decoded into typed
//! structs. Everything else is handed through as a [`RawFrame`].

mod decode;
mod encode;
mod error;
mod types;

pub use decode::FrameDecoder;
pub use encode::FrameEncoder;
pub use error::{ErrorCode, FrameError};
pub use types::*;

/// The 24 bytes a client sends before its first frame.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Length, type, flags and stream id.
pub const FRAME_HEADER_SIZE: usize = 9;

/// One SETTINGS parameter: 16-bit identifier, 32-bit value.
pub const SETTING_ENTRY_LENGTH: usize = 6;

// Frame size bounds (RFC 9113 Section 6.5.2).
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

// Flow-control windows.
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65_535;
pub const MAX_WINDOW_SIZE: u32 = (1 << 31) - 1;

/// Advertised but unused: header blocks are never decompressed here.
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4_096;

/// Streams we let the peer open at once unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_STREAMS: u32 = 100;
