//! HTTP/2 connection handler.
//!
//! [`ConnectionHandler`] sits between a [`Transport`] and the application.
//! The event loop feeds it transport notifications (`on_active`,
//! `on_bytes_received`, `on_read_complete`, `on_inactive`) and drains
//! [`HandlerEvent`]s with [`poll_events`](ConnectionHandler::poll_events).
//! The application sends control frames through `go_away`, `reset_stream`,
//! `ping` and `close`.
//!
//! Write completions may arrive later than the call that issued the write.
//! Their follow-up work, such as closing a stream once its RST_STREAM is
//! written or closing the transport after GOAWAY, is queued and runs at the
//! end of every handler entry point, or explicitly through
//! [`process_completions`](ConnectionHandler::process_completions).

mod close;
mod codec;
mod preface;

pub use close::CloseSequencer;
pub use codec::{ConnectionDecoder, ConnectionEncoder};
pub use preface::{Handshake, PrefaceDecoder, PrefaceState};

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

use bytes::{Buf, Bytes};
use tracing::{debug, trace, warn};

use crate::completion::{Completion, Outcome};
use crate::config::HandlerConfig;
use crate::connection::{Connection, ConnectionSettings, Role, StreamState};
use crate::error::Http2Error;
use crate::frame::{
    CONNECTION_PREFACE, DataFrame, ErrorCode, Frame, FrameType, GoAwayFrame, HeadersFrame,
    PingFrame, RawFrame, RstStreamFrame, SettingId, SettingsFrame, StreamId, WindowUpdateFrame,
    flags,
};
use crate::transport::Transport;

/// Events surfaced to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    /// The peer's first SETTINGS frame has been applied.
    Ready,
    /// The peer acknowledged our SETTINGS.
    SettingsAcked,
    /// The peer answered one of our PINGs.
    PingAck([u8; 8]),
    /// HEADERS received. The header block is still HPACK-encoded.
    Headers(HeadersFrame),
    /// DATA received.
    Data {
        stream_id: StreamId,
        data: Bytes,
        end_stream: bool,
    },
    /// The peer reset a stream.
    StreamReset {
        stream_id: StreamId,
        error_code: ErrorCode,
    },
    /// A stream reached the closed state.
    StreamClosed(StreamId),
    /// The peer sent GOAWAY.
    GoAway {
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    },
    /// A frame the handler does not interpret.
    Frame(RawFrame),
    /// A connection error was raised.
    Error(Http2Error),
}

/// Follow-up work from a write completion.
#[derive(Debug)]
enum Deferred {
    GoAwayWritten {
        error_code: ErrorCode,
        outcome: Outcome,
    },
    RstWritten {
        stream_id: StreamId,
        outcome: Outcome,
    },
    /// The last write before a graceful close completed.
    CloseAfterWrite { outcome: Outcome },
}

type DeferredQueue = Rc<RefCell<VecDeque<Deferred>>>;

/// Connection-level HTTP/2 protocol handler.
pub struct ConnectionHandler<T: Transport> {
    transport: T,
    connection: Connection,
    decoder: ConnectionDecoder,
    encoder: ConnectionEncoder,
    preface: PrefaceDecoder,
    close: CloseSequencer,
    /// Whether our preface (client) or initial SETTINGS (server) went out.
    preface_sent: bool,
    /// Whether the peer's first SETTINGS has been applied.
    ready: bool,
    deferred: DeferredQueue,
    events: Vec<HandlerEvent>,
}

impl<T: Transport> ConnectionHandler<T> {
    /// Create a handler for one transport connection.
    pub fn new(role: Role, transport: T, config: &HandlerConfig) -> Self {
        let settings = ConnectionSettings::from(&config.settings);
        Self {
            transport,
            connection: Connection::new(role, settings, config.window_update_ratio),
            decoder: ConnectionDecoder::new(settings.max_frame_size),
            encoder: ConnectionEncoder::new(),
            preface: PrefaceDecoder::new(role),
            close: CloseSequencer::new(config.graceful_shutdown_timeout()),
            preface_sent: false,
            ready: false,
            deferred: Rc::new(RefCell::new(VecDeque::new())),
            events: Vec::new(),
        }
    }

    /// Handler for the connecting side.
    pub fn client(transport: T, config: &HandlerConfig) -> Self {
        Self::new(Role::Client, transport, config)
    }

    /// Handler for the accepting side.
    pub fn server(transport: T, config: &HandlerConfig) -> Self {
        Self::new(Role::Server, transport, config)
    }

    /// The underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport, for the owning event loop.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Stream registry and connection-level state.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Mutable registry access, e.g. to open local streams.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Progress of the connection preface handshake.
    pub fn preface_state(&self) -> PrefaceState {
        self.preface.state()
    }

    /// Inbound frame decoder and its buffered input.
    pub fn decoder(&self) -> &ConnectionDecoder {
        &self.decoder
    }

    /// Outbound frame encoder.
    pub fn encoder(&self) -> &ConnectionEncoder {
        &self.encoder
    }

    /// Whether the close sequencer has closed, or seen the loss of, the
    /// transport.
    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }

    /// Drain pending events.
    pub fn poll_events(&mut self) -> Vec<HandlerEvent> {
        std::mem::take(&mut self.events)
    }

    // Lifecycle

    /// The handler was attached to its transport.
    pub fn handler_added(&mut self) {
        if self.transport.is_active() {
            self.send_preface();
        }
    }

    /// The handler was detached from its transport.
    ///
    /// An unfinished handshake starts over when the handler is added again.
    pub fn handler_removed(&mut self) {
        if !self.preface.is_valid() {
            self.decoder.clear();
        }
        self.preface.on_removed();
    }

    /// The transport became active.
    pub fn on_active(&mut self) {
        self.send_preface();
    }

    /// The transport went away. Closes every stream and releases the codecs.
    pub fn on_inactive(&mut self) {
        let closed = self.connection.close_all_streams();
        if !closed.is_empty() {
            debug!(streams = closed.len(), "closing streams of inactive connection");
        }
        self.events
            .extend(closed.into_iter().map(HandlerEvent::StreamClosed));

        if self.decoder.close() {
            trace!("released decoder");
        }
        if self.encoder.close() {
            trace!("released encoder");
        }

        self.close.on_transport_inactive();
        self.connection.reclaim_closed();
        self.process_completions();
    }

    /// Bytes arrived from the peer.
    pub fn on_bytes_received(&mut self, data: &[u8]) {
        if !self.transport.is_active() {
            trace!(len = data.len(), "dropping bytes for inactive transport");
            return;
        }

        self.decoder.extend(data);
        self.decode_inbound();
        self.process_completions();
    }

    /// A batch of reads finished. Flushes once.
    pub fn on_read_complete(&mut self) {
        self.transport.flush();
        self.connection.reclaim_closed();
        self.process_completions();
    }

    /// Run follow-up work for writes that have completed.
    pub fn process_completions(&mut self) {
        loop {
            let next = self.deferred.borrow_mut().pop_front();
            let Some(deferred) = next else {
                break;
            };

            match deferred {
                Deferred::GoAwayWritten {
                    error_code,
                    outcome,
                } => match outcome {
                    Ok(()) if error_code == ErrorCode::NoError => {}
                    Ok(()) => {
                        debug!(%error_code, "GOAWAY written, closing transport");
                        self.close.force_close(&mut self.transport);
                    }
                    Err(e) => {
                        warn!(error = %e, "failed to write GOAWAY, closing transport");
                        self.close.force_close(&mut self.transport);
                    }
                },
                Deferred::RstWritten { stream_id, outcome } => {
                    if let Err(e) = outcome {
                        warn!(%stream_id, error = %e, "failed to write RST_STREAM");
                    }
                    self.close_stream(stream_id);
                }
                Deferred::CloseAfterWrite { outcome } => {
                    if let Err(e) = outcome {
                        debug!(error = %e, "final write before close failed");
                    }
                    self.close.request_close(
                        &mut self.transport,
                        self.connection.num_active_streams(),
                        Instant::now(),
                    );
                }
            }
        }
    }

    /// When [`handle_timeout`](Self::handle_timeout) should next be called.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.close.poll_timeout()
    }

    /// Close the transport if a graceful close has outlived its deadline.
    pub fn handle_timeout(&mut self, now: Instant) {
        if self.close.handle_timeout(&mut self.transport, now) {
            debug!(
                active_streams = self.connection.num_active_streams(),
                "closed transport with streams still active"
            );
        }
        self.process_completions();
    }

    // Operations

    /// Push buffered writes to the transport.
    pub fn flush(&mut self) {
        self.transport.flush();
    }

    /// Send RST_STREAM for a stream.
    ///
    /// Succeeds immediately without writing if the stream is unknown or
    /// already reset. Otherwise the stream is closed once the write
    /// completes, whatever its outcome.
    pub fn reset_stream(&mut self, stream_id: StreamId, error_code: ErrorCode) -> Completion {
        let Some(stream) = self.connection.stream_mut(stream_id) else {
            trace!(%stream_id, "reset of unknown stream");
            return Completion::succeeded();
        };
        if stream.reset_sent() {
            return Completion::succeeded();
        }
        stream.set_reset_sent();

        debug!(%stream_id, %error_code, "sending RST_STREAM");
        let completion = self.write_frame(&Frame::RstStream(RstStreamFrame {
            stream_id,
            error_code: error_code.to_u32(),
        }));

        let queue = self.deferred.clone();
        completion.on_complete(move |outcome| {
            queue.borrow_mut().push_back(Deferred::RstWritten {
                stream_id,
                outcome: outcome.clone(),
            });
        });
        self.process_completions();
        completion
    }

    /// Send GOAWAY.
    ///
    /// Takes ownership of `debug_data`. Fails without writing if a GOAWAY
    /// was already sent with a smaller last-stream-id. A GOAWAY carrying an
    /// error code, or one whose write fails, closes the transport once the
    /// write completes.
    pub fn go_away(
        &mut self,
        last_stream_id: StreamId,
        error_code: ErrorCode,
        debug_data: Bytes,
    ) -> Completion {
        if let Err(e) = self.connection.go_away_sent_with(last_stream_id, error_code) {
            debug!(%last_stream_id, error = %e, "GOAWAY rejected");
            return Completion::failed(e);
        }

        debug!(%last_stream_id, %error_code, "sending GOAWAY");
        let completion = self.write_frame(&Frame::GoAway(GoAwayFrame {
            last_stream_id,
            error_code: error_code.to_u32(),
            debug_data,
        }));

        let queue = self.deferred.clone();
        completion.on_complete(move |outcome| {
            queue.borrow_mut().push_back(Deferred::GoAwayWritten {
                error_code,
                outcome: outcome.clone(),
            });
        });
        self.process_completions();
        completion
    }

    /// Gracefully close the connection.
    ///
    /// Sends GOAWAY(NO_ERROR) unless one was already sent, and flushes.
    /// Once that write completes (an empty write stands in for an earlier
    /// GOAWAY) the transport is closed as soon as no streams remain active.
    /// Repeated calls share one close.
    pub fn close(&mut self) -> Completion {
        if !self.transport.is_active() {
            return self.close.force_close(&mut self.transport);
        }
        if let Some(promise) = self.close.promise() {
            return promise;
        }

        let promise = self.close.request();
        let written = if self.connection.go_away_sent() {
            self.transport.write(Bytes::new())
        } else {
            let last_stream_id = self.connection.remote().last_stream_created();
            self.go_away(last_stream_id, ErrorCode::NoError, Bytes::new())
        };
        self.transport.flush();

        let queue = self.deferred.clone();
        written.on_complete(move |outcome| {
            queue.borrow_mut().push_back(Deferred::CloseAfterWrite {
                outcome: outcome.clone(),
            });
        });
        self.process_completions();
        promise
    }

    /// Close a stream outright.
    pub fn close_stream(&mut self, stream_id: StreamId) {
        if self.connection.close_stream(stream_id) {
            self.on_stream_closed(stream_id);
        }
    }

    /// Record that we sent END_STREAM on a stream.
    pub fn close_stream_local(&mut self, stream_id: StreamId) {
        if self.connection.close_stream_local(stream_id) {
            self.on_stream_closed(stream_id);
        }
    }

    /// Record that the peer sent END_STREAM on a stream.
    pub fn close_stream_remote(&mut self, stream_id: StreamId) {
        if self.connection.close_stream_remote(stream_id) {
            self.on_stream_closed(stream_id);
        }
    }

    /// Send a PING.
    pub fn ping(&mut self, data: [u8; 8]) -> Completion {
        self.write_frame(&Frame::Ping(PingFrame { ack: false, data }))
    }

    // Internals

    fn on_stream_closed(&mut self, stream_id: StreamId) {
        trace!(%stream_id, "stream closed");
        self.events.push(HandlerEvent::StreamClosed(stream_id));
        self.close
            .on_stream_closed(&mut self.transport, self.connection.num_active_streams());
    }

    fn write_frame(&mut self, frame: &Frame) -> Completion {
        let bytes = self.encoder.encode(frame);
        self.transport.write(bytes)
    }

    /// Client: preface and SETTINGS. Server: SETTINGS, once the client
    /// preface has arrived. Either way at most once per handler.
    fn send_preface(&mut self) {
        if self.preface_sent || self.connection.is_server() {
            return;
        }
        self.preface_sent = true;

        debug!("sending client preface");
        self.transport
            .write(Bytes::from_static(CONNECTION_PREFACE));
        self.send_settings();
        self.transport.flush();
    }

    fn send_settings(&mut self) {
        let frame = self
            .connection
            .local_settings()
            .to_frame(self.connection.is_server());
        self.write_frame(&Frame::Settings(frame));
    }

    fn decode_inbound(&mut self) {
        while !self.preface.is_valid() {
            match self.preface.decode(self.decoder.buffer_mut()) {
                Ok(handshake) if handshake.preface_matched => {
                    if !self.preface_sent {
                        self.preface_sent = true;
                        debug!("client preface received");
                        self.send_settings();
                    }
                }
                Ok(handshake) if handshake.complete => break,
                Ok(_) => return,
                Err(e) => {
                    self.decoder.clear();
                    self.on_error(e);
                    return;
                }
            }
        }

        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => {
                    if let Err(e) = self.on_frame(frame) {
                        let fatal = e.is_connection_error();
                        self.on_error(e);
                        if fatal {
                            self.decoder.clear();
                            return;
                        }
                    }
                }
                Ok(None) => return,
                Err(e) => {
                    self.decoder.clear();
                    self.on_error(e.into());
                    return;
                }
            }
        }
    }

    fn on_frame(&mut self, frame: Frame) -> Result<(), Http2Error> {
        trace!(stream_id = %frame.stream_id(), ?frame, "frame received");
        match frame {
            Frame::Settings(settings) => self.on_settings(settings),
            Frame::Ping(ping) => {
                if ping.ack {
                    self.events.push(HandlerEvent::PingAck(ping.data));
                } else {
                    self.write_frame(&Frame::Ping(PingFrame {
                        ack: true,
                        data: ping.data,
                    }));
                }
                Ok(())
            }
            Frame::GoAway(go_away) => {
                let error_code = ErrorCode::from_u32(go_away.error_code);
                debug!(last_stream_id = %go_away.last_stream_id, %error_code, "GOAWAY received");
                let abandoned = self
                    .connection
                    .go_away_received_with(go_away.last_stream_id, error_code)?;
                self.events.push(HandlerEvent::GoAway {
                    last_stream_id: go_away.last_stream_id,
                    error_code,
                    debug_data: go_away.debug_data,
                });
                for stream_id in abandoned {
                    self.on_stream_closed(stream_id);
                }
                Ok(())
            }
            Frame::WindowUpdate(update) => self.connection.window_update(&update),
            Frame::Headers(headers) => self.on_headers(headers),
            Frame::Data(data) => self.on_data(data),
            Frame::RstStream(rst) => self.on_rst_stream(rst),
            Frame::Raw(raw) => {
                if raw.frame_type == FrameType::PushPromise as u8 {
                    self.on_push_promise(&raw)?;
                }
                self.events.push(HandlerEvent::Frame(raw));
                Ok(())
            }
        }
    }

    fn on_settings(&mut self, settings: SettingsFrame) -> Result<(), Http2Error> {
        if settings.ack {
            self.events.push(HandlerEvent::SettingsAcked);
            return Ok(());
        }

        if !self.connection.is_server()
            && settings
                .settings
                .iter()
                .any(|s| s.id == SettingId::EnablePush && s.value != 0)
        {
            return Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                "server sent SETTINGS_ENABLE_PUSH",
            ));
        }

        let change = self.connection.apply_remote_settings(&settings.settings)?;
        if let Some(max_frame_size) = change.max_frame_size {
            self.encoder.set_max_frame_size(max_frame_size);
        }
        self.write_frame(&Frame::Settings(SettingsFrame::ack()));

        if !self.ready {
            self.ready = true;
            self.events.push(HandlerEvent::Ready);
        }
        Ok(())
    }

    fn on_headers(&mut self, headers: HeadersFrame) -> Result<(), Http2Error> {
        let stream_id = headers.stream_id;
        let end_stream = headers.end_stream;

        let state = self
            .connection
            .stream(stream_id)
            .map(|s| (s.state(), s.can_recv()));
        match state {
            None if self.connection.created(stream_id) => {
                return Err(Http2Error::stream_error(
                    stream_id,
                    ErrorCode::StreamClosed,
                    "HEADERS received for closed stream",
                ));
            }
            None => {
                self.connection.create_remote_stream(stream_id, end_stream)?;
                self.events.push(HandlerEvent::Headers(headers));
                return Ok(());
            }
            Some((StreamState::ReservedRemote, _)) => {
                self.connection.open_reserved_stream(stream_id)?;
            }
            Some((state, false)) => {
                return Err(Http2Error::stream_error(
                    stream_id,
                    ErrorCode::StreamClosed,
                    format!("HEADERS received in state {:?}", state),
                ));
            }
            Some(_) => {}
        }

        self.events.push(HandlerEvent::Headers(headers));
        if end_stream {
            self.close_stream_remote(stream_id);
        }
        Ok(())
    }

    fn on_data(&mut self, data: DataFrame) -> Result<(), Http2Error> {
        let result = self.connection.receive_data(&data);

        // Connection credit is returned even when the stream rejects the data.
        if let Some(update) = self.connection.connection_window_update() {
            self.write_window_update(update);
        }
        if let Some(update) = result? {
            self.write_window_update(update);
        }

        let stream_id = data.stream_id;
        self.events.push(HandlerEvent::Data {
            stream_id,
            data: data.data,
            end_stream: data.end_stream,
        });
        if data.end_stream {
            self.close_stream_remote(stream_id);
        }
        Ok(())
    }

    fn write_window_update(&mut self, update: WindowUpdateFrame) {
        trace!(stream_id = %update.stream_id, increment = update.increment, "sending WINDOW_UPDATE");
        self.write_frame(&Frame::WindowUpdate(update));
    }

    fn on_rst_stream(&mut self, rst: RstStreamFrame) -> Result<(), Http2Error> {
        let stream_id = rst.stream_id;
        if self.connection.stream(stream_id).is_none() {
            if self.connection.created(stream_id) {
                return Ok(());
            }
            return Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                format!("RST_STREAM received for idle stream {}", stream_id),
            ));
        }

        if !self.connection.close_stream(stream_id) {
            trace!(%stream_id, "RST_STREAM for closed stream");
            return Ok(());
        }

        let error_code = ErrorCode::from_u32(rst.error_code);
        debug!(%stream_id, %error_code, "stream reset by peer");
        self.events.push(HandlerEvent::StreamReset {
            stream_id,
            error_code,
        });
        self.on_stream_closed(stream_id);
        Ok(())
    }

    fn on_push_promise(&mut self, raw: &RawFrame) -> Result<(), Http2Error> {
        if self.connection.is_server() || !self.connection.local_settings().enable_push {
            return Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                "unexpected PUSH_PROMISE",
            ));
        }

        let mut payload = &raw.payload[..];
        if raw.flags & flags::PADDED != 0 && !payload.is_empty() {
            payload.advance(1);
        }
        if payload.len() < 4 {
            return Err(Http2Error::connection_error(
                ErrorCode::FrameSizeError,
                "PUSH_PROMISE too short",
            ));
        }
        let promised = StreamId::new(payload.get_u32());
        self.connection.reserve_remote_stream(promised)
    }

    fn on_error(&mut self, err: Http2Error) {
        match &err {
            Http2Error::Stream {
                stream_id, code, ..
            } => self.on_stream_error(*stream_id, *code, &err),
            _ => self.on_connection_error(err),
        }
    }

    fn on_stream_error(&mut self, stream_id: StreamId, code: ErrorCode, err: &Http2Error) {
        debug!(%stream_id, error = %err, "stream error");
        if self.connection.stream(stream_id).is_some() {
            self.reset_stream(stream_id, code);
            return;
        }

        // Refused before it was registered; the peer still needs to hear.
        self.write_frame(&Frame::RstStream(RstStreamFrame {
            stream_id,
            error_code: code.to_u32(),
        }));
    }

    fn on_connection_error(&mut self, err: Http2Error) {
        warn!(error = %err, "connection error");
        self.events.push(HandlerEvent::Error(err.clone()));

        if !self.transport.is_active() {
            return;
        }

        let last_stream_id = self.connection.remote().last_stream_created();
        let debug_data = Bytes::from(err.to_string());
        let completion = self.go_away(last_stream_id, err.code(), debug_data);
        self.transport.flush();

        if completion.cause().is_some() && !self.close.is_closed() {
            self.close.force_close(&mut self.transport);
        }
    }
}
