//! Inbound and outbound frame codecs owned by the handler.

use bytes::{Bytes, BytesMut};
use tracing::trace;

use crate::frame::{Frame, FrameDecoder, FrameEncoder, FrameError};

/// Accumulates inbound bytes and splits them into frames.
#[derive(Debug)]
pub struct ConnectionDecoder {
    frames: FrameDecoder,
    buf: BytesMut,
    closed: bool,
}

impl ConnectionDecoder {
    pub fn new(max_frame_size: u32) -> Self {
        let mut frames = FrameDecoder::new();
        frames.set_max_frame_size(max_frame_size);
        Self {
            frames,
            buf: BytesMut::with_capacity(16384),
            closed: false,
        }
    }

    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The unconsumed input.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drop all buffered input.
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Decode the next complete frame. A partial trailing frame stays
    /// buffered.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, FrameError> {
        self.frames.decode(&mut self.buf)
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.frames.set_max_frame_size(size);
    }

    /// Release the input buffer. Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        trace!(discarded = self.buf.len(), "decoder closed");
        self.buf = BytesMut::new();
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Serializes outbound frames into owned buffers.
#[derive(Debug, Default)]
pub struct ConnectionEncoder {
    frames: FrameEncoder,
    closed: bool,
}

impl ConnectionEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn encode(&self, frame: &Frame) -> Bytes {
        let mut buf = BytesMut::new();
        self.frames.encode(frame, &mut buf);
        buf.freeze()
    }

    pub fn set_max_frame_size(&mut self, size: u32) {
        self.frames.set_max_frame_size(size);
    }

    pub fn max_frame_size(&self) -> u32 {
        self.frames.max_frame_size()
    }

    /// Returns `false` if already closed.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        trace!("encoder closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PingFrame, SettingsFrame};

    #[test]
    fn test_decoder_keeps_partial_frame() {
        let encoder = ConnectionEncoder::new();
        let ack = encoder.encode(&Frame::Settings(SettingsFrame::ack()));

        let mut decoder = ConnectionDecoder::new(16384);
        decoder.extend(&ack);
        decoder.extend(&ack[..4]);

        assert_eq!(
            decoder.next_frame().unwrap(),
            Some(Frame::Settings(SettingsFrame::ack()))
        );
        assert_eq!(decoder.next_frame().unwrap(), None);
        assert_eq!(decoder.buffered(), 4);

        decoder.extend(&ack[4..]);
        assert!(decoder.next_frame().unwrap().is_some());
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut decoder = ConnectionDecoder::new(16384);
        decoder.extend(b"leftover");
        assert!(decoder.close());
        assert!(!decoder.close());
        assert!(decoder.is_closed());
        assert_eq!(decoder.buffered(), 0);

        let mut encoder = ConnectionEncoder::new();
        assert!(encoder.close());
        assert!(!encoder.close());
        assert!(encoder.is_closed());
    }

    #[test]
    fn test_encode_ping() {
        let encoder = ConnectionEncoder::new();
        let bytes = encoder.encode(&Frame::Ping(PingFrame {
            ack: false,
            data: *b"12345678",
        }));
        assert_eq!(bytes.len(), 17);
        assert_eq!(&bytes[9..], b"12345678");
    }
}
