//! Errors raised by the connection handler.

use crate::frame::{ErrorCode, FrameError, StreamId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Http2Error {
    /// Affects the whole connection; answered with GOAWAY.
    #[error("connection error {code}: {message}")]
    Connection { code: ErrorCode, message: String },
    /// Scoped to one stream; answered with RST_STREAM.
    #[error("stream {stream_id} error {code}: {message}")]
    Stream {
        stream_id: StreamId,
        code: ErrorCode,
        message: String,
    },
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("write failed: {0}")]
    WriteFailed(String),
    #[error("transport closed")]
    Closed,
}

impl Http2Error {
    pub fn connection_error(code: ErrorCode, message: impl Into<String>) -> Self {
        Http2Error::Connection {
            code,
            message: message.into(),
        }
    }

    pub fn stream_error(stream_id: StreamId, code: ErrorCode, message: impl Into<String>) -> Self {
        Http2Error::Stream {
            stream_id,
            code,
            message: message.into(),
        }
    }

    /// The HTTP/2 error code carried on the wire for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Http2Error::Connection { code, .. } | Http2Error::Stream { code, .. } => *code,
            Http2Error::Frame(e) => e.error_code(),
            Http2Error::WriteFailed(_) | Http2Error::Closed => ErrorCode::InternalError,
        }
    }

    /// Stream errors are the only kind that leave the connection usable.
    pub fn is_connection_error(&self) -> bool {
        !matches!(self, Http2Error::Stream { .. })
    }
}
