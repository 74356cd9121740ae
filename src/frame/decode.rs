//! Frame decoding from a growable input buffer.

use bytes::{Buf, Bytes, BytesMut};

use super::error::FrameError;
use super::types::*;
use super::{DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE, MAX_WINDOW_SIZE, SETTING_ENTRY_LENGTH};

/// Splits complete frames off the front of an input buffer.
///
/// The only state is the frame size limit we advertised.
#[derive(Debug)]
pub struct FrameDecoder {
    max_frame_size: u32,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Set the maximum frame size we accept (our SETTINGS_MAX_FRAME_SIZE).
    pub fn set_max_frame_size(&mut self, size: u32) {
        self.max_frame_size = size;
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Take one frame from the front of `buf`.
    ///
    /// `Ok(None)` leaves `buf` untouched until the rest of the frame
    /// arrives. An oversized length is rejected as soon as the header is
    /// readable.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        let Some(header) = FrameHeader::parse(buf) else {
            return Ok(None);
        };

        if header.length > self.max_frame_size {
            return Err(FrameError::FrameTooLarge {
                size: header.length,
                max: self.max_frame_size,
            });
        }

        let len = header.length as usize;
        if buf.len() - FRAME_HEADER_SIZE < len {
            return Ok(None);
        }

        let frame = buf.split_to(FRAME_HEADER_SIZE + len).freeze();
        let payload = frame.slice(FRAME_HEADER_SIZE..);
        Self::frame(header, payload).map(Some)
    }

    fn frame(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
        match header.get_type() {
            Some(FrameType::Data) => Self::data_frame(header, payload),
            Some(FrameType::Headers) => Self::headers_frame(header, payload),
            Some(FrameType::RstStream) => Self::rst_stream_frame(header, payload),
            Some(FrameType::Settings) => Self::settings_frame(header, payload),
            Some(FrameType::Ping) => Self::ping_frame(header, payload),
            Some(FrameType::GoAway) => Self::goaway_frame(header, payload),
            Some(FrameType::WindowUpdate) => Self::window_update_frame(header, payload),
            _ => Ok(Frame::Raw(RawFrame {
                frame_type: header.frame_type,
                flags: header.flags,
                stream_id: header.stream_id,
                payload,
            })),
        }
    }

    fn require_stream(header: &FrameHeader) -> Result<(), FrameError> {
        if header.stream_id.is_connection_level() {
            return Err(FrameError::StreamIdRequired {
                frame_type: header.frame_type,
            });
        }
        Ok(())
    }

    fn require_connection(header: &FrameHeader) -> Result<(), FrameError> {
        if !header.stream_id.is_connection_level() {
            return Err(FrameError::InvalidStreamZero {
                frame_type: header.frame_type,
            });
        }
        Ok(())
    }

    fn require_length(
        header: &FrameHeader,
        payload: &Bytes,
        expected: usize,
    ) -> Result<(), FrameError> {
        if payload.len() != expected {
            return Err(FrameError::InvalidPayloadLength {
                frame_type: header.frame_type,
                expected,
                actual: payload.len(),
            });
        }
        Ok(())
    }

    fn data_frame(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_stream(&header)?;

        let flow_controlled_len = payload.len() as u32;
        let data = if header.has_flag(flags::PADDED) {
            strip_padding(payload)?
        } else {
            payload
        };

        Ok(Frame::Data(DataFrame {
            stream_id: header.stream_id,
            end_stream: header.has_flag(flags::END_STREAM),
            data,
            flow_controlled_len,
        }))
    }

    fn headers_frame(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_stream(&header)?;

        let mut block = if header.has_flag(flags::PADDED) {
            strip_padding(payload)?
        } else {
            payload
        };

        // Priority fields are deprecated; skip the 5-byte block if present.
        if header.has_flag(flags::PRIORITY) {
            if block.len() < 5 {
                return Err(FrameError::InvalidPayloadLength {
                    frame_type: header.frame_type,
                    expected: 5,
                    actual: block.len(),
                });
            }
            block.advance(5);
        }

        Ok(Frame::Headers(HeadersFrame {
            stream_id: header.stream_id,
            end_stream: header.has_flag(flags::END_STREAM),
            end_headers: header.has_flag(flags::END_HEADERS),
            header_block: block,
        }))
    }

    fn rst_stream_frame(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_stream(&header)?;
        Self::require_length(&header, &payload, 4)?;

        Ok(Frame::RstStream(RstStreamFrame {
            stream_id: header.stream_id,
            error_code: payload.get_u32(),
        }))
    }

    fn settings_frame(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_connection(&header)?;

        let ack = header.has_flag(flags::ACK);
        if ack {
            Self::require_length(&header, &payload, 0)?;
            return Ok(Frame::Settings(SettingsFrame::ack()));
        }

        if payload.len() % SETTING_ENTRY_LENGTH != 0 {
            return Err(FrameError::InvalidPayloadLength {
                frame_type: header.frame_type,
                expected: (payload.len() / SETTING_ENTRY_LENGTH) * SETTING_ENTRY_LENGTH,
                actual: payload.len(),
            });
        }

        let mut settings = Vec::with_capacity(payload.len() / SETTING_ENTRY_LENGTH);
        while payload.has_remaining() {
            let id = SettingId::from_u16(payload.get_u16());
            let value = payload.get_u32();
            validate_setting(id, value)?;
            settings.push(Setting { id, value });
        }

        Ok(Frame::Settings(SettingsFrame { ack, settings }))
    }

    fn ping_frame(header: FrameHeader, payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_connection(&header)?;
        Self::require_length(&header, &payload, 8)?;

        let mut data = [0u8; 8];
        data.copy_from_slice(&payload);

        Ok(Frame::Ping(PingFrame {
            ack: header.has_flag(flags::ACK),
            data,
        }))
    }

    fn goaway_frame(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_connection(&header)?;

        if payload.len() < 8 {
            return Err(FrameError::InvalidPayloadLength {
                frame_type: header.frame_type,
                expected: 8,
                actual: payload.len(),
            });
        }

        let last_stream_id = StreamId::new(payload.get_u32());
        let error_code = payload.get_u32();

        Ok(Frame::GoAway(GoAwayFrame {
            last_stream_id,
            error_code,
            debug_data: payload,
        }))
    }

    fn window_update_frame(header: FrameHeader, mut payload: Bytes) -> Result<Frame, FrameError> {
        Self::require_length(&header, &payload, 4)?;

        let increment = payload.get_u32() & MAX_WINDOW_SIZE;
        if increment == 0 {
            return Err(FrameError::InvalidWindowIncrement { increment });
        }

        Ok(Frame::WindowUpdate(WindowUpdateFrame {
            stream_id: header.stream_id,
            increment,
        }))
    }
}

fn validate_setting(id: SettingId, value: u32) -> Result<(), FrameError> {
    let valid = match id {
        SettingId::EnablePush => value <= 1,
        SettingId::InitialWindowSize => value <= MAX_WINDOW_SIZE,
        SettingId::MaxFrameSize => (DEFAULT_MAX_FRAME_SIZE..=super::MAX_FRAME_SIZE).contains(&value),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(FrameError::InvalidSettingValue {
            id: id.to_u16(),
            value,
        })
    }
}

/// Remove the pad-length byte and trailing padding.
fn strip_padding(mut payload: Bytes) -> Result<Bytes, FrameError> {
    if payload.is_empty() {
        return Err(FrameError::InvalidPadding {
            pad_length: 0,
            payload_length: 0,
        });
    }

    let pad_length = payload.get_u8() as usize;
    if pad_length > payload.len() {
        return Err(FrameError::InvalidPadding {
            pad_length: pad_length as u8,
            payload_length: payload.len() + 1,
        });
    }

    let data_len = payload.len() - pad_length;
    Ok(payload.slice(..data_len))
}
