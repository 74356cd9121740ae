//! Frame header, frame types and the decoded frame structs.

use bytes::Bytes;

/// HTTP/2 frame types (RFC 9113 Section 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    // Indexed by wire value.
    const KNOWN: [FrameType; 10] = [
        FrameType::Data,
        FrameType::Headers,
        FrameType::Priority,
        FrameType::RstStream,
        FrameType::Settings,
        FrameType::PushPromise,
        FrameType::Ping,
        FrameType::GoAway,
        FrameType::WindowUpdate,
        FrameType::Continuation,
    ];

    /// `None` for extension and unassigned types.
    pub fn from_u8(byte: u8) -> Option<Self> {
        Self::KNOWN.get(byte as usize).copied()
    }
}

/// Frame flags.
pub mod flags {
    /// DATA/HEADERS: last frame the sender will send on the stream.
    pub const END_STREAM: u8 = 0x1;
    /// SETTINGS/PING: this is an acknowledgment.
    pub const ACK: u8 = 0x1;
    /// HEADERS: the header block is complete.
    pub const END_HEADERS: u8 = 0x4;
    /// DATA/HEADERS: padding is present.
    pub const PADDED: u8 = 0x8;
    /// HEADERS: priority information is present.
    pub const PRIORITY: u8 = 0x20;
}

/// A 31-bit stream identifier. Zero names the connection itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct StreamId(pub u32);

impl StreamId {
    pub const CONNECTION: StreamId = StreamId(0);

    /// The reserved high bit is dropped.
    #[inline]
    pub fn new(id: u32) -> Self {
        StreamId(id & 0x7FFF_FFFF)
    }

    #[inline]
    pub fn value(self) -> u32 {
        self.0
    }

    #[inline]
    pub fn is_connection_level(self) -> bool {
        self.0 == 0
    }

    /// Odd ids belong to the client.
    #[inline]
    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }

    /// Even, non-zero ids belong to the server.
    #[inline]
    pub fn is_server_initiated(self) -> bool {
        self.0 != 0 && self.0 % 2 == 0
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        StreamId::new(id)
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// 24-bit payload length, header excluded.
    pub length: u32,
    /// Frame type.
    pub frame_type: u8,
    /// Frame flags.
    pub flags: u8,
    /// Stream identifier.
    pub stream_id: StreamId,
}

impl FrameHeader {
    /// Parse a full 9-byte header from the front of `buf`.
    ///
    /// Returns `None` if fewer than 9 bytes are available.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < super::FRAME_HEADER_SIZE {
            return None;
        }

        let length = u32::from_be_bytes([0, buf[0], buf[1], buf[2]]);
        let stream_id = StreamId::new(u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]));

        Some(Self {
            length,
            frame_type: buf[3],
            flags: buf[4],
            stream_id,
        })
    }

    /// Read only the frame type and flags.
    ///
    /// Needs the first 5 bytes (length, type, flags). Used to check what
    /// kind of frame is coming before the whole header has arrived.
    pub fn peek_type_and_flags(buf: &[u8]) -> Option<(u8, u8)> {
        if buf.len() < 5 {
            return None;
        }
        Some((buf[3], buf[4]))
    }

    pub fn get_type(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    #[inline]
    pub fn has_flag(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// A decoded HTTP/2 frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Data(DataFrame),
    Headers(HeadersFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    Ping(PingFrame),
    GoAway(GoAwayFrame),
    WindowUpdate(WindowUpdateFrame),
    /// Any frame this codec does not interpret (PRIORITY, PUSH_PROMISE,
    /// CONTINUATION, extension types).
    Raw(RawFrame),
}

impl Frame {
    /// Control frames report [`StreamId::CONNECTION`].
    pub fn stream_id(&self) -> StreamId {
        match self {
            Frame::Data(f) => f.stream_id,
            Frame::Headers(f) => f.stream_id,
            Frame::RstStream(f) => f.stream_id,
            Frame::Settings(_) | Frame::Ping(_) | Frame::GoAway(_) => StreamId::CONNECTION,
            Frame::WindowUpdate(f) => f.stream_id,
            Frame::Raw(f) => f.stream_id,
        }
    }
}

/// DATA.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: StreamId,
    pub end_stream: bool,
    pub data: Bytes,
    /// Bytes counted against flow control, including padding.
    pub flow_controlled_len: u32,
}

impl DataFrame {
    pub fn new(stream_id: StreamId, data: Bytes, end_stream: bool) -> Self {
        let flow_controlled_len = data.len() as u32;
        Self {
            stream_id,
            end_stream,
            data,
            flow_controlled_len,
        }
    }
}

/// HEADERS, with any CONTINUATION not yet merged.
///
/// The header block stays HPACK-encoded; decompression happens elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: StreamId,
    pub end_stream: bool,
    pub end_headers: bool,
    pub header_block: Bytes,
}

/// RST_STREAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: StreamId,
    pub error_code: u32,
}

/// SETTINGS, or its acknowledgment when `ack` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub ack: bool,
    pub settings: Vec<Setting>,
}

impl SettingsFrame {
    pub fn ack() -> Self {
        Self {
            ack: true,
            settings: Vec::new(),
        }
    }
}

/// One identifier/value pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Setting {
    pub id: SettingId,
    pub value: u32,
}

/// Known setting identifiers (RFC 9113 Section 6.5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingId {
    HeaderTableSize,
    EnablePush,
    MaxConcurrentStreams,
    InitialWindowSize,
    MaxFrameSize,
    MaxHeaderListSize,
    /// Unknown setting ID.
    Unknown(u16),
}

impl SettingId {
    pub fn from_u16(id: u16) -> Self {
        match id {
            0x1 => SettingId::HeaderTableSize,
            0x2 => SettingId::EnablePush,
            0x3 => SettingId::MaxConcurrentStreams,
            0x4 => SettingId::InitialWindowSize,
            0x5 => SettingId::MaxFrameSize,
            0x6 => SettingId::MaxHeaderListSize,
            _ => SettingId::Unknown(id),
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            SettingId::HeaderTableSize => 0x1,
            SettingId::EnablePush => 0x2,
            SettingId::MaxConcurrentStreams => 0x3,
            SettingId::InitialWindowSize => 0x4,
            SettingId::MaxFrameSize => 0x5,
            SettingId::MaxHeaderListSize => 0x6,
            SettingId::Unknown(id) => id,
        }
    }
}

/// PING with its 8 opaque bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

/// GOAWAY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoAwayFrame {
    pub last_stream_id: StreamId,
    pub error_code: u32,
    pub debug_data: Bytes,
}

/// WINDOW_UPDATE. Stream 0 targets the connection window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    pub stream_id: StreamId,
    pub increment: u32,
}

/// Frame passed through without interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub frame_type: u8,
    pub flags: u8,
    pub stream_id: StreamId,
    pub payload: Bytes,
}
