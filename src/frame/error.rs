//! HTTP/2 error codes and frame errors.

use std::fmt;

/// HTTP/2 error codes (RFC 9113 Section 7).
///
/// Carried by GOAWAY for connection errors and by RST_STREAM for stream
/// errors. Names render as they appear in the RFC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ErrorCode {
    /// Also used for a graceful GOAWAY.
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn from_u32(code: u32) -> Self {
        match code {
            0x0 => ErrorCode::NoError,
            0x1 => ErrorCode::ProtocolError,
            0x2 => ErrorCode::InternalError,
            0x3 => ErrorCode::FlowControlError,
            0x4 => ErrorCode::SettingsTimeout,
            0x5 => ErrorCode::StreamClosed,
            0x6 => ErrorCode::FrameSizeError,
            0x7 => ErrorCode::RefusedStream,
            0x8 => ErrorCode::Cancel,
            0x9 => ErrorCode::CompressionError,
            0xa => ErrorCode::ConnectError,
            0xb => ErrorCode::EnhanceYourCalm,
            0xc => ErrorCode::InadequateSecurity,
            0xd => ErrorCode::Http11Required,
            // Unassigned codes must not trigger special handling.
            _ => ErrorCode::InternalError,
        }
    }

    pub fn to_u32(self) -> u32 {
        self as u32
    }

    fn name(self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reasons a frame failed to decode.
///
/// Each maps to a connection error through [`FrameError::error_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Length field above our SETTINGS_MAX_FRAME_SIZE.
    FrameTooLarge { size: u32, max: u32 },
    /// Connection-scoped frame carrying a stream id.
    InvalidStreamZero { frame_type: u8 },
    /// Stream-scoped frame on stream 0.
    StreamIdRequired { frame_type: u8 },
    InvalidPayloadLength {
        frame_type: u8,
        expected: usize,
        actual: usize,
    },
    /// Pad length covers the whole payload.
    InvalidPadding {
        pad_length: u8,
        payload_length: usize,
    },
    InvalidSettingValue { id: u16, value: u32 },
    /// Zero increment.
    InvalidWindowIncrement { increment: u32 },
}

impl FrameError {
    /// Error code to report when this failure tears down the connection.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            FrameError::FrameTooLarge { .. } | FrameError::InvalidPayloadLength { .. } => {
                ErrorCode::FrameSizeError
            }
            FrameError::InvalidSettingValue { id: 0x4, .. } => ErrorCode::FlowControlError,
            _ => ErrorCode::ProtocolError,
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            FrameError::FrameTooLarge { size, max } => {
                write!(f, "{} byte frame over the {} byte limit", size, max)
            }
            FrameError::InvalidStreamZero { frame_type } => {
                write!(f, "type 0x{:02x} frame on a stream, expected stream 0", frame_type)
            }
            FrameError::StreamIdRequired { frame_type } => {
                write!(f, "type 0x{:02x} frame on stream 0", frame_type)
            }
            FrameError::InvalidPayloadLength {
                frame_type,
                expected,
                actual,
            } => write!(
                f,
                "type 0x{:02x} payload is {} bytes, want {}",
                frame_type, actual, expected
            ),
            FrameError::InvalidPadding {
                pad_length,
                payload_length,
            } => write!(
                f,
                "{} bytes of padding in a {} byte payload",
                pad_length, payload_length
            ),
            FrameError::InvalidSettingValue { id, value } => {
                write!(f, "setting 0x{:04x} out of range: {}", id, value)
            }
            FrameError::InvalidWindowIncrement { increment } => {
                write!(f, "window increment {} out of range", increment)
            }
        }
    }
}

impl std::error::Error for FrameError {}
