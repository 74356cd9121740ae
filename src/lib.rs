//! h2-handler - connection-level HTTP/2 control plane.
//!
//! This crate implements the connection half of HTTP/2 on top of a
//! completion-based byte transport. It does not use async/await or tokio;
//! the owning event loop feeds bytes and lifecycle notifications into a
//! [`ConnectionHandler`] and drains [`HandlerEvent`]s from it.
//!
//! # Features
//!
//! - Connection preface verification, tolerant of arbitrary input splits
//! - Frame decoding and encoding for the control frames
//! - Stream registry with per-endpoint stream-id and concurrency rules
//! - SETTINGS, PING, GOAWAY, RST_STREAM and WINDOW_UPDATE handling
//! - Graceful close that waits for active streams, with an optional timeout
//!
//! # Architecture
//!
//! - `frame`: HTTP/2 frame types, encoding, and decoding
//! - `connection`: stream registry, endpoints, settings and flow control
//! - `transport`: the byte transport the handler writes to
//! - `handler`: the connection handler tying the above together
//! - `config`, `logging`: TOML configuration and `tracing` setup
//!
//! Header blocks are passed through HPACK-encoded.

pub mod completion;
pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod logging;
pub mod transport;

pub use completion::{Completion, Outcome};
pub use config::{ConfigError, HandlerConfig};
pub use connection::{
    Connection, ConnectionSettings, GoAwayRecord, Role, Stream, StreamState,
};
pub use error::Http2Error;
pub use frame::{
    CONNECTION_PREFACE, DataFrame, ErrorCode, FRAME_HEADER_SIZE, Frame, FrameDecoder,
    FrameEncoder, FrameError, FrameType, GoAwayFrame, HeadersFrame, PingFrame, RawFrame,
    RstStreamFrame, Setting, SettingId, SettingsFrame, StreamId, WindowUpdateFrame,
};
pub use handler::{ConnectionHandler, HandlerEvent, PrefaceState};
pub use transport::{BufferedTransport, Transport, TransportState};
