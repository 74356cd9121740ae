//! Per-direction view of a connection.

use crate::error::Http2Error;
use crate::frame::{ErrorCode, StreamId};

/// One side of the connection: the streams it creates and the flow
/// controller for its direction.
///
/// Client endpoints create odd stream ids, server endpoints even ones.
#[derive(Debug)]
pub struct Endpoint<F> {
    server: bool,
    next_stream_id: u32,
    last_stream_created: StreamId,
    /// Last stream id announced in a GOAWAY for this endpoint's streams.
    /// `None` until a GOAWAY is sent.
    last_stream_known_by_peer: Option<StreamId>,
    max_active_streams: u32,
    num_active_streams: u32,
    flow_controller: F,
}

impl<F> Endpoint<F> {
    pub(super) fn new(server: bool, max_active_streams: u32, flow_controller: F) -> Self {
        Self {
            server,
            next_stream_id: if server { 2 } else { 1 },
            last_stream_created: StreamId::CONNECTION,
            last_stream_known_by_peer: None,
            max_active_streams,
            num_active_streams: 0,
            flow_controller,
        }
    }

    /// Whether this is the server side of the connection.
    pub fn is_server(&self) -> bool {
        self.server
    }

    /// Whether `id` has the parity of streams this endpoint creates.
    pub fn is_valid_stream_id(&self, id: StreamId) -> bool {
        !id.is_connection_level() && id.is_server_initiated() == self.server
    }

    /// Whether `id` belongs to this endpoint and has already been created.
    pub fn created(&self, id: StreamId) -> bool {
        self.is_valid_stream_id(id) && id <= self.last_stream_created
    }

    /// The id the next local stream will get.
    pub fn incremented_stream_id(&self) -> StreamId {
        StreamId::new(self.next_stream_id)
    }

    pub fn last_stream_created(&self) -> StreamId {
        self.last_stream_created
    }

    pub fn last_stream_known_by_peer(&self) -> Option<StreamId> {
        self.last_stream_known_by_peer
    }

    pub(super) fn set_last_stream_known_by_peer(&mut self, id: StreamId) {
        self.last_stream_known_by_peer = Some(id);
    }

    pub fn max_active_streams(&self) -> u32 {
        self.max_active_streams
    }

    pub(super) fn set_max_active_streams(&mut self, max: u32) {
        self.max_active_streams = max;
    }

    pub fn num_active_streams(&self) -> u32 {
        self.num_active_streams
    }

    pub(super) fn stream_activated(&mut self) {
        self.num_active_streams += 1;
    }

    pub(super) fn stream_deactivated(&mut self) {
        self.num_active_streams = self.num_active_streams.saturating_sub(1);
    }

    pub fn flow_controller(&self) -> &F {
        &self.flow_controller
    }

    pub fn flow_controller_mut(&mut self) -> &mut F {
        &mut self.flow_controller
    }

    /// Check that `id` may be created now and record it as the latest.
    ///
    /// Ids must have this endpoint's parity and increase strictly. Opening
    /// beyond the concurrency limit is refused with a stream error.
    pub(super) fn accept_new_stream(&mut self, id: StreamId, activate: bool) -> Result<(), Http2Error> {
        if !self.is_valid_stream_id(id) {
            return Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                format!(
                    "stream {} has the wrong parity for a {} endpoint",
                    id,
                    if self.server { "server" } else { "client" }
                ),
            ));
        }
        if id <= self.last_stream_created {
            return Err(Http2Error::connection_error(
                ErrorCode::ProtocolError,
                format!(
                    "stream {} is not above last created stream {}",
                    id, self.last_stream_created
                ),
            ));
        }

        self.last_stream_created = id;
        self.next_stream_id = id.value().saturating_add(2);

        if activate && self.num_active_streams >= self.max_active_streams {
            return Err(Http2Error::stream_error(
                id,
                ErrorCode::RefusedStream,
                format!("maximum active streams {} exceeded", self.max_active_streams),
            ));
        }
        Ok(())
    }
}
