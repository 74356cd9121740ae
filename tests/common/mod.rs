//! Shared helpers for handler integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::{Bytes, BytesMut};
use h2_handler::frame::MAX_FRAME_SIZE;
use h2_handler::{
    BufferedTransport, CONNECTION_PREFACE, Completion, ConnectionHandler, DataFrame, Frame,
    FrameDecoder, FrameEncoder, HandlerConfig, HeadersFrame, Http2Error, Setting, SettingsFrame,
    StreamId, Transport, TransportState,
};

/// How the mock transport completes writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Complete successfully as soon as the write is accepted.
    Succeed,
    /// Fail as soon as the write is accepted.
    Fail,
    /// Leave the completion pending until the test completes it.
    Hold,
}

/// Transport that records everything the handler does to it.
pub struct MockTransport {
    pub state: TransportState,
    pub mode: WriteMode,
    writes: Vec<Bytes>,
    held: Vec<Completion>,
    pub flushes: usize,
    pub closes: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_state(TransportState::Active)
    }

    pub fn connecting() -> Self {
        Self::with_state(TransportState::Connecting)
    }

    fn with_state(state: TransportState) -> Self {
        Self {
            state,
            mode: WriteMode::Succeed,
            writes: Vec::new(),
            held: Vec::new(),
            flushes: 0,
            closes: 0,
        }
    }

    pub fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub fn written(&self) -> Vec<u8> {
        self.writes.iter().flat_map(|b| b.iter().copied()).collect()
    }

    /// Decode every write since the last call, skipping a client preface.
    pub fn take_frames(&mut self) -> Vec<Frame> {
        let mut buf = BytesMut::new();
        for write in self.writes.drain(..) {
            buf.extend_from_slice(&write);
        }
        if buf.starts_with(CONNECTION_PREFACE) {
            let _ = buf.split_to(CONNECTION_PREFACE.len());
        }

        let mut decoder = FrameDecoder::new();
        decoder.set_max_frame_size(MAX_FRAME_SIZE);
        let mut frames = Vec::new();
        while let Some(frame) = decoder.decode(&mut buf).expect("handler wrote a bad frame") {
            frames.push(frame);
        }
        assert!(buf.is_empty(), "trailing partial frame");
        frames
    }

    pub fn held(&self) -> usize {
        self.held.len()
    }

    /// Complete the oldest held write.
    pub fn complete_next(&mut self, outcome: Result<(), Http2Error>) {
        let completion = self.held.remove(0);
        completion.complete(outcome);
    }
}

impl Transport for MockTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn write(&mut self, data: Bytes) -> Completion {
        if self.state != TransportState::Active {
            return Completion::failed(Http2Error::Closed);
        }
        self.writes.push(data);
        match self.mode {
            WriteMode::Succeed => Completion::succeeded(),
            WriteMode::Fail => Completion::failed(Http2Error::WriteFailed("broken pipe".into())),
            WriteMode::Hold => {
                let completion = Completion::new();
                self.held.push(completion.clone());
                completion
            }
        }
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn close(&mut self) -> Completion {
        self.closes += 1;
        self.state = TransportState::Closed;
        Completion::succeeded()
    }
}

/// Buffer owner that counts how often it is dropped.
pub struct DropCounter {
    data: Vec<u8>,
    drops: Arc<AtomicUsize>,
}

impl AsRef<[u8]> for DropCounter {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// A buffer and the number of times its storage has been released.
///
/// Read the counter with `drops.load(Ordering::SeqCst)`.
pub fn counted_bytes(data: &[u8]) -> (Bytes, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let owner = DropCounter {
        data: data.to_vec(),
        drops: drops.clone(),
    };
    (Bytes::from_owner(owner), drops)
}

pub fn encode(frames: &[Frame]) -> Vec<u8> {
    let encoder = FrameEncoder::new();
    let mut buf = BytesMut::new();
    for frame in frames {
        encoder.encode(frame, &mut buf);
    }
    buf.to_vec()
}

pub fn settings(values: Vec<Setting>) -> Frame {
    Frame::Settings(SettingsFrame {
        ack: false,
        settings: values,
    })
}

pub fn headers(stream_id: u32, end_stream: bool) -> Frame {
    Frame::Headers(HeadersFrame {
        stream_id: StreamId::new(stream_id),
        end_stream,
        end_headers: true,
        header_block: Bytes::from_static(&[0x82]),
    })
}

pub fn data(stream_id: u32, len: usize, end_stream: bool) -> Frame {
    Frame::Data(DataFrame::new(
        StreamId::new(stream_id),
        Bytes::from(vec![0u8; len]),
        end_stream,
    ))
}

/// Client preface followed by an empty SETTINGS frame.
pub fn client_preface() -> Vec<u8> {
    let mut buf = CONNECTION_PREFACE.to_vec();
    buf.extend(encode(&[settings(vec![])]));
    buf
}

pub fn server() -> ConnectionHandler<MockTransport> {
    server_with(&HandlerConfig::default())
}

pub fn server_with(config: &HandlerConfig) -> ConnectionHandler<MockTransport> {
    let mut handler = ConnectionHandler::server(MockTransport::new(), config);
    handler.handler_added();
    handler
}

/// A server that has completed the handshake, with its output discarded.
pub fn ready_server() -> ConnectionHandler<MockTransport> {
    ready_server_with(&HandlerConfig::default())
}

pub fn ready_server_with(config: &HandlerConfig) -> ConnectionHandler<MockTransport> {
    let mut handler = server_with(config);
    handler.on_bytes_received(&client_preface());
    handler.on_read_complete();
    handler.transport_mut().take_frames();
    handler.poll_events();
    handler
}

/// A client that has sent its preface and seen the server's SETTINGS.
pub fn ready_client() -> ConnectionHandler<MockTransport> {
    let mut handler = ConnectionHandler::client(MockTransport::new(), &HandlerConfig::default());
    handler.handler_added();
    handler.on_bytes_received(&encode(&[settings(vec![])]));
    handler.on_read_complete();
    handler.transport_mut().take_frames();
    handler.poll_events();
    handler
}

/// A server over [`BufferedTransport`] that has completed the handshake.
///
/// Writes complete only once [`send_all`] moves them onto the wire.
pub fn buffered_server() -> ConnectionHandler<BufferedTransport> {
    let mut handler = ConnectionHandler::server(BufferedTransport::new(), &HandlerConfig::default());
    handler.handler_added();
    handler.on_bytes_received(&client_preface());
    handler.on_read_complete();
    send_all(&mut handler);
    handler.poll_events();
    handler
}

/// Send everything flushed so far, run the completions, and decode what
/// went out.
pub fn send_all(handler: &mut ConnectionHandler<BufferedTransport>) -> Vec<Frame> {
    let mut wire = BytesMut::from(handler.transport().pending_send());
    let sent = wire.len();
    handler.transport_mut().advance_send(sent);
    handler.process_completions();

    let mut decoder = FrameDecoder::new();
    decoder.set_max_frame_size(MAX_FRAME_SIZE);
    let mut frames = Vec::new();
    while let Some(frame) = decoder.decode(&mut wire).expect("handler wrote a bad frame") {
        frames.push(frame);
    }
    assert!(wire.is_empty(), "trailing partial frame");
    frames
}
