//! Frame serialization.

use bytes::{BufMut, BytesMut};

use super::types::*;
use super::{FRAME_HEADER_SIZE, SETTING_ENTRY_LENGTH};

/// Serializes [`Frame`]s. Never fails; callers keep frames within the
/// peer's limits.
#[derive(Debug)]
pub struct FrameEncoder {
    max_frame_size: u32,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameEncoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: super::DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the largest frame the peer accepts (its SETTINGS_MAX_FRAME_SIZE).
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Append the wire form of `frame` to `buf`.
    pub fn encode(&self, frame: &Frame, buf: &mut BytesMut) {
        match frame {
            Frame::Data(f) => {
                let frame_flags = if f.end_stream { flags::END_STREAM } else { 0 };
                self.write_frame(buf, FrameType::Data as u8, frame_flags, f.stream_id, &f.data);
            }
            Frame::Headers(f) => {
                let mut frame_flags = 0;
                if f.end_stream {
                    frame_flags |= flags::END_STREAM;
                }
                if f.end_headers {
                    frame_flags |= flags::END_HEADERS;
                }
                self.write_frame(
                    buf,
                    FrameType::Headers as u8,
                    frame_flags,
                    f.stream_id,
                    &f.header_block,
                );
            }
            Frame::RstStream(f) => {
                buf.reserve(FRAME_HEADER_SIZE + 4);
                write_header(buf, 4, FrameType::RstStream as u8, 0, f.stream_id);
                buf.put_u32(f.error_code);
            }
            Frame::Settings(f) => self.encode_settings(f, buf),
            Frame::Ping(f) => {
                let frame_flags = if f.ack { flags::ACK } else { 0 };
                self.write_frame(
                    buf,
                    FrameType::Ping as u8,
                    frame_flags,
                    StreamId::CONNECTION,
                    &f.data,
                );
            }
            Frame::GoAway(f) => {
                // Debug data is cut to fit the peer's frame size limit.
                let room = (self.max_frame_size as usize).saturating_sub(8);
                let debug_data = &f.debug_data[..f.debug_data.len().min(room)];
                let length = 8 + debug_data.len() as u32;
                buf.reserve(FRAME_HEADER_SIZE + length as usize);
                write_header(buf, length, FrameType::GoAway as u8, 0, StreamId::CONNECTION);
                buf.put_u32(f.last_stream_id.value());
                buf.put_u32(f.error_code);
                buf.extend_from_slice(debug_data);
            }
            Frame::WindowUpdate(f) => {
                buf.reserve(FRAME_HEADER_SIZE + 4);
                write_header(buf, 4, FrameType::WindowUpdate as u8, 0, f.stream_id);
                buf.put_u32(f.increment & 0x7FFF_FFFF);
            }
            Frame::Raw(f) => self.write_frame(buf, f.frame_type, f.flags, f.stream_id, &f.payload),
        }
    }

    fn encode_settings(&self, frame: &SettingsFrame, buf: &mut BytesMut) {
        if frame.ack {
            buf.reserve(FRAME_HEADER_SIZE);
            write_header(buf, 0, FrameType::Settings as u8, flags::ACK, StreamId::CONNECTION);
            return;
        }

        let length = (frame.settings.len() * SETTING_ENTRY_LENGTH) as u32;
        buf.reserve(FRAME_HEADER_SIZE + length as usize);
        write_header(buf, length, FrameType::Settings as u8, 0, StreamId::CONNECTION);

        for setting in &frame.settings {
            buf.put_u16(setting.id.to_u16());
            buf.put_u32(setting.value);
        }
    }

    #[inline]
    fn write_frame(
        &self,
        buf: &mut BytesMut,
        frame_type: u8,
        frame_flags: u8,
        stream_id: StreamId,
        payload: &[u8],
    ) {
        debug_assert!(payload.len() as u32 <= self.max_frame_size);
        buf.reserve(FRAME_HEADER_SIZE + payload.len());
        write_header(buf, payload.len() as u32, frame_type, frame_flags, stream_id);
        buf.extend_from_slice(payload);
    }
}

#[inline]
fn write_header(buf: &mut BytesMut, length: u32, frame_type: u8, frame_flags: u8, stream_id: StreamId) {
    // 24-bit length
    buf.put_u8((length >> 16) as u8);
    buf.put_u8((length >> 8) as u8);
    buf.put_u8(length as u8);

    buf.put_u8(frame_type);
    buf.put_u8(frame_flags);

    // Stream ID (31 bits, high bit reserved)
    buf.put_u32(stream_id.value() & 0x7FFF_FFFF);
}
