//! HTTP/2 connection state and stream registry.
//!
//! [`Connection`] is the protocol state shared by both traffic directions:
//! - the stream registry and its active-stream counter
//! - the local and remote [`Endpoint`]s with their flow controllers
//! - local and remote settings
//! - GOAWAY sent/received state
//!
//! It performs no I/O. The handler drives it from decoded frames and
//! writes whatever frames it asks for.

mod endpoint;
mod flow_control;
mod settings;
mod stream;

pub use endpoint::Endpoint;
pub use flow_control::{FlowControl, InboundFlowController, OutboundFlowController};
pub use settings::{ConnectionSettings, SettingsChange};
pub use stream::{Stream, StreamId, StreamState};

use std::collections::BTreeMap;
use std::ops::ControlFlow;

use tracing::trace;

use crate::error::Http2Error;
use crate::frame::{DataFrame, ErrorCode, Setting, WindowUpdateFrame};

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// A GOAWAY frame as recorded on the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GoAwayRecord {
    pub last_stream_id: StreamId,
    pub error_code: ErrorCode,
}

/// The shared state of one HTTP/2 session.
#[derive(Debug)]
pub struct Connection {
    role: Role,
    streams: BTreeMap<StreamId, Stream>,
    /// Streams we create; its flow controller guards inbound data.
    local: Endpoint<InboundFlowController>,
    /// Streams the peer creates; its flow controller tracks outbound credit.
    remote: Endpoint<OutboundFlowController>,
    local_settings: ConnectionSettings,
    remote_settings: ConnectionSettings,
    go_away_sent: Option<GoAwayRecord>,
    go_away_received: Option<GoAwayRecord>,
    num_active_streams: usize,
}

impl Connection {
    /// Create the state for a new connection advertising `local_settings`.
    pub fn new(role: Role, local_settings: ConnectionSettings, window_update_ratio: f32) -> Self {
        let server = role == Role::Server;
        let remote_settings = ConnectionSettings::protocol_defaults();
        Self {
            role,
            streams: BTreeMap::new(),
            local: Endpoint::new(
                server,
                remote_settings.max_concurrent_streams,
                InboundFlowController::new(local_settings.initial_window_size, window_update_ratio),
            ),
            remote: Endpoint::new(
                !server,
                local_settings.max_concurrent_streams,
                OutboundFlowController::new(),
            ),
            local_settings,
            remote_settings,
            go_away_sent: None,
            go_away_received: None,
            num_active_streams: 0,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_server(&self) -> bool {
        self.role == Role::Server
    }

    pub fn local(&self) -> &Endpoint<InboundFlowController> {
        &self.local
    }

    pub fn remote(&self) -> &Endpoint<OutboundFlowController> {
        &self.remote
    }

    pub fn local_settings(&self) -> &ConnectionSettings {
        &self.local_settings
    }

    pub fn remote_settings(&self) -> &ConnectionSettings {
        &self.remote_settings
    }

    /// Look up a stream. Closed streams stay visible until
    /// [`reclaim_closed`](Self::reclaim_closed) runs.
    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    /// Number of open and half-closed streams.
    pub fn num_active_streams(&self) -> usize {
        self.num_active_streams
    }

    /// Visit every stream that is not closed, in ascending id order.
    ///
    /// Returns the id of the stream at which the visitor broke off, or `None`
    /// if every stream was visited. The set of ids is captured before the
    /// first call, so streams created meanwhile are not visited.
    pub fn for_each_active_stream<F>(&mut self, mut visitor: F) -> Option<StreamId>
    where
        F: FnMut(&mut Stream) -> ControlFlow<()>,
    {
        let ids: Vec<StreamId> = self
            .streams
            .values()
            .filter(|s| s.state() != StreamState::Closed)
            .map(Stream::id)
            .collect();

        for id in ids {
            let Some(stream) = self.streams.get_mut(&id) else {
                continue;
            };
            if stream.state() == StreamState::Closed {
                continue;
            }
            if visitor(stream).is_break() {
                return Some(id);
            }
        }
        None
    }

    /// Open the next stream of our own.
    pub fn create_local_stream(&mut self, end_stream: bool) -> Result<StreamId, Http2Error> {
        let id = self.local.incremented_stream_id();
        if let Some(received) = self.go_away_received {
            return Err(Http2Error::stream_error(
                id,
                ErrorCode::RefusedStream,
                format!(
                    "peer sent GOAWAY with last stream {}",
                    received.last_stream_id
                ),
            ));
        }

        self.local.accept_new_stream(id, true)?;
        let mut stream = Stream::new(
            id,
            self.remote.flow_controller().new_stream_window(),
            self.local.flow_controller().new_stream_window(),
        );
        stream.open(false);
        if end_stream {
            stream.close_local();
        }
        self.insert_active(stream);
        Ok(id)
    }

    /// Open a stream the peer initiated with HEADERS.
    pub fn create_remote_stream(&mut self, id: StreamId, end_stream: bool) -> Result<(), Http2Error> {
        self.check_remote_after_go_away(id)?;
        self.remote.accept_new_stream(id, true)?;

        let mut stream = Stream::new(
            id,
            self.remote.flow_controller().new_stream_window(),
            self.local.flow_controller().new_stream_window(),
        );
        stream.open(end_stream);
        self.insert_active(stream);
        Ok(())
    }

    /// Reserve a stream promised by the peer in PUSH_PROMISE.
    pub fn reserve_remote_stream(&mut self, id: StreamId) -> Result<(), Http2Error> {
        self.check_remote_after_go_away(id)?;
        self.remote.accept_new_stream(id, false)?;

        let mut stream = Stream::new(
            id,
            self.remote.flow_controller().new_stream_window(),
            self.local.flow_controller().new_stream_window(),
        );
        stream.reserve(false);
        self.streams.insert(id, stream);
        Ok(())
    }

    /// Activate a reserved stream when its HEADERS arrive.
    pub fn open_reserved_stream(&mut self, id: StreamId) -> Result<(), Http2Error> {
        let opened = self.transition(id, |stream| stream.open(false));
        if opened != Some(true) {
            return Err(Http2Error::stream_error(
                id,
                ErrorCode::ProtocolError,
                "stream is not reserved",
            ));
        }
        Ok(())
    }

    fn check_remote_after_go_away(&self, id: StreamId) -> Result<(), Http2Error> {
        if let (Some(sent), Some(known)) = (self.go_away_sent, self.remote.last_stream_known_by_peer()) {
            if id > known {
                return Err(Http2Error::stream_error(
                    id,
                    ErrorCode::RefusedStream,
                    format!("GOAWAY sent with last stream {}", sent.last_stream_id),
                ));
            }
        }
        Ok(())
    }

    fn insert_active(&mut self, stream: Stream) {
        let id = stream.id();
        let active = stream.is_active();
        self.streams.insert(id, stream);
        if active {
            self.activated(id);
        }
    }

    fn activated(&mut self, id: StreamId) {
        self.num_active_streams += 1;
        if self.local.is_valid_stream_id(id) {
            self.local.stream_activated();
        } else {
            self.remote.stream_activated();
        }
    }

    fn deactivated(&mut self, id: StreamId) {
        self.num_active_streams = self.num_active_streams.saturating_sub(1);
        if self.local.is_valid_stream_id(id) {
            self.local.stream_deactivated();
        } else {
            self.remote.stream_deactivated();
        }
    }

    /// Run a state transition on a stream and keep the active counters in
    /// step. Returns `None` if the stream is not in the registry.
    fn transition<R>(&mut self, id: StreamId, f: impl FnOnce(&mut Stream) -> R) -> Option<R> {
        let stream = self.streams.get_mut(&id)?;
        let was_active = stream.is_active();
        let result = f(stream);
        let is_active = stream.is_active();

        match (was_active, is_active) {
            (false, true) => self.activated(id),
            (true, false) => self.deactivated(id),
            _ => {}
        }
        Some(result)
    }

    fn close_with(&mut self, id: StreamId, f: impl FnOnce(&mut Stream)) -> bool {
        self.transition(id, |stream| {
            let was_closed = stream.state() == StreamState::Closed;
            f(stream);
            !was_closed && stream.state() == StreamState::Closed
        })
        .unwrap_or(false)
    }

    /// Close a stream outright. Returns `true` if this call closed it.
    pub fn close_stream(&mut self, id: StreamId) -> bool {
        self.close_with(id, Stream::close)
    }

    /// Record END_STREAM sent. Returns `true` if the stream is now closed.
    pub fn close_stream_local(&mut self, id: StreamId) -> bool {
        self.close_with(id, Stream::close_local)
    }

    /// Record END_STREAM received. Returns `true` if the stream is now closed.
    pub fn close_stream_remote(&mut self, id: StreamId) -> bool {
        self.close_with(id, Stream::close_remote)
    }

    /// Close every stream that is not already closed, returning their ids.
    pub fn close_all_streams(&mut self) -> Vec<StreamId> {
        let mut ids = Vec::new();
        self.for_each_active_stream(|stream| {
            ids.push(stream.id());
            ControlFlow::Continue(())
        });
        ids.retain(|id| self.close_stream(*id));
        ids
    }

    /// Drop closed streams from the registry.
    pub fn reclaim_closed(&mut self) -> usize {
        let before = self.streams.len();
        self.streams
            .retain(|_, stream| stream.state() != StreamState::Closed);
        let reclaimed = before - self.streams.len();
        if reclaimed > 0 {
            trace!(reclaimed, "reclaimed closed streams");
        }
        reclaimed
    }

    /// Whether a GOAWAY has been sent.
    pub fn go_away_sent(&self) -> bool {
        self.go_away_sent.is_some()
    }

    pub fn last_go_away_sent(&self) -> Option<GoAwayRecord> {
        self.go_away_sent
    }

    /// Record a GOAWAY about to be sent.
    ///
    /// The last-stream-id may only stay equal or decrease across GOAWAY
    /// frames; a larger one is a connection error and nothing is recorded.
    pub fn go_away_sent_with(
        &mut self,
        last_stream_id: StreamId,
        error_code: ErrorCode,
    ) -> Result<(), Http2Error> {
        if self.go_away_sent.is_some() {
            if let Some(known) = self.remote.last_stream_known_by_peer() {
                if last_stream_id > known {
                    return Err(Http2Error::connection_error(
                        ErrorCode::ProtocolError,
                        format!(
                            "last stream id must not increase between GOAWAY frames ({} > {})",
                            last_stream_id, known
                        ),
                    ));
                }
            }
        }

        self.go_away_sent = Some(GoAwayRecord {
            last_stream_id,
            error_code,
        });
        self.remote.set_last_stream_known_by_peer(last_stream_id);
        Ok(())
    }

    /// Whether a GOAWAY has been received.
    pub fn go_away_received(&self) -> bool {
        self.go_away_received.is_some()
    }

    pub fn last_go_away_received(&self) -> Option<GoAwayRecord> {
        self.go_away_received
    }

    /// Record a received GOAWAY and close our streams the peer will not
    /// process. Returns the ids of the streams closed.
    pub fn go_away_received_with(
        &mut self,
        last_stream_id: StreamId,
        error_code: ErrorCode,
    ) -> Result<Vec<StreamId>, Http2Error> {
        if self.go_away_received.is_some() {
            if let Some(known) = self.local.last_stream_known_by_peer() {
                if last_stream_id > known {
                    return Err(Http2Error::connection_error(
                        ErrorCode::ProtocolError,
                        format!(
                            "peer increased GOAWAY last stream id ({} > {})",
                            last_stream_id, known
                        ),
                    ));
                }
            }
        }

        self.go_away_received = Some(GoAwayRecord {
            last_stream_id,
            error_code,
        });
        self.local.set_last_stream_known_by_peer(last_stream_id);

        let mut abandoned = Vec::new();
        let ours_are_even = self.local.is_server();
        self.for_each_active_stream(|stream| {
            let id = stream.id();
            if id > last_stream_id && id.is_server_initiated() == ours_are_even {
                abandoned.push(id);
            }
            ControlFlow::Continue(())
        });
        abandoned.retain(|id| self.close_stream(*id));
        Ok(abandoned)
    }

    /// Apply the peer's SETTINGS.
    pub fn apply_remote_settings(
        &mut self,
        settings: &[Setting],
    ) -> Result<SettingsChange, Http2Error> {
        let change = self.remote_settings.apply(settings);

        if let Some(max) = change.max_concurrent_streams {
            self.local.set_max_active_streams(max);
        }
        if let Some(initial) = change.initial_window_size {
            self.remote
                .flow_controller_mut()
                .set_initial_window(initial, self.streams.values_mut())?;
        }
        Ok(change)
    }

    /// Account for a received DATA frame.
    ///
    /// The connection window is always charged. Returns the stream-level
    /// WINDOW_UPDATE if one is due.
    pub fn receive_data(&mut self, frame: &DataFrame) -> Result<Option<WindowUpdateFrame>, Http2Error> {
        let len = frame.flow_controlled_len;
        self.local.flow_controller_mut().receive_connection(len)?;

        let id = frame.stream_id;
        let Some(stream) = self.streams.get_mut(&id) else {
            return Err(self.missing_stream_error(id, "DATA"));
        };
        if !stream.can_recv() {
            return Err(Http2Error::stream_error(
                id,
                ErrorCode::StreamClosed,
                format!("DATA received in state {:?}", stream.state()),
            ));
        }

        let update = self.local.flow_controller_mut().receive_stream(stream, len)?;
        // No point in more credit for a stream the peer has finished.
        Ok(update.filter(|_| !frame.end_stream))
    }

    /// The connection-level WINDOW_UPDATE, if one is due.
    pub fn connection_window_update(&mut self) -> Option<WindowUpdateFrame> {
        self.local.flow_controller_mut().connection_update()
    }

    /// Apply a received WINDOW_UPDATE.
    pub fn window_update(&mut self, frame: &WindowUpdateFrame) -> Result<(), Http2Error> {
        if frame.stream_id.is_connection_level() {
            return self
                .remote
                .flow_controller_mut()
                .connection_window_update(frame.increment);
        }

        if let Some(stream) = self.streams.get_mut(&frame.stream_id) {
            return self
                .remote
                .flow_controller_mut()
                .stream_window_update(stream, frame.increment);
        }

        // WINDOW_UPDATE may trail a stream that has already ended.
        if self.created(frame.stream_id) {
            Ok(())
        } else {
            Err(self.missing_stream_error(frame.stream_id, "WINDOW_UPDATE"))
        }
    }

    /// Whether `id` was created by either endpoint at some point.
    pub fn created(&self, id: StreamId) -> bool {
        self.local.created(id) || self.remote.created(id)
    }

    fn missing_stream_error(&self, id: StreamId, frame: &str) -> Http2Error {
        if self.created(id) {
            Http2Error::stream_error(
                id,
                ErrorCode::StreamClosed,
                format!("{} received for closed stream", frame),
            )
        } else {
            Http2Error::connection_error(
                ErrorCode::ProtocolError,
                format!("{} received for idle stream {}", frame, id),
            )
        }
    }
}
