//! Per-stream state machine (RFC 9113 Section 5.1).

pub use crate::frame::StreamId;

use super::flow_control::FlowControl;

/// Stream state (RFC 9113 Section 5.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Not yet opened.
    Idle,
    /// Promised by us with PUSH_PROMISE.
    ReservedLocal,
    /// Promised by the peer with PUSH_PROMISE.
    ReservedRemote,
    /// Both directions open.
    Open,
    /// We sent END_STREAM.
    HalfClosedLocal,
    /// The peer sent END_STREAM.
    HalfClosedRemote,
    /// Stream is closed.
    Closed,
}

impl StreamState {
    /// Open and half-closed streams count against the concurrency limit.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote
        )
    }
}

/// An HTTP/2 stream.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    /// Whether we have written RST_STREAM for this stream.
    reset_sent: bool,
    send_window: FlowControl,
    recv_window: FlowControl,
}

impl Stream {
    /// Create an idle stream.
    pub fn new(id: StreamId, send_window: FlowControl, recv_window: FlowControl) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            reset_sent: false,
            send_window,
            recv_window,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// We may still send frames on this stream.
    pub fn can_send(&self) -> bool {
        matches!(
            self.state,
            StreamState::Open | StreamState::HalfClosedRemote
        )
    }

    /// The peer may still send frames on this stream.
    pub fn can_recv(&self) -> bool {
        matches!(self.state, StreamState::Open | StreamState::HalfClosedLocal)
    }

    pub fn reset_sent(&self) -> bool {
        self.reset_sent
    }

    pub fn set_reset_sent(&mut self) {
        self.reset_sent = true;
    }

    pub fn send_window(&self) -> &FlowControl {
        &self.send_window
    }

    pub fn send_window_mut(&mut self) -> &mut FlowControl {
        &mut self.send_window
    }

    pub fn recv_window(&self) -> &FlowControl {
        &self.recv_window
    }

    pub fn recv_window_mut(&mut self) -> &mut FlowControl {
        &mut self.recv_window
    }

    /// Reserve an idle stream for a push promise.
    pub(super) fn reserve(&mut self, local: bool) -> bool {
        if self.state != StreamState::Idle {
            return false;
        }
        self.state = if local {
            StreamState::ReservedLocal
        } else {
            StreamState::ReservedRemote
        };
        true
    }

    /// Activate the stream.
    ///
    /// `half_closed_remote` opens it with the peer's side already finished
    /// (HEADERS carried END_STREAM, or a locally reserved push stream).
    /// Returns `false` if the stream was not idle or reserved.
    pub(super) fn open(&mut self, half_closed_remote: bool) -> bool {
        self.state = match self.state {
            StreamState::Idle if half_closed_remote => StreamState::HalfClosedRemote,
            StreamState::Idle => StreamState::Open,
            StreamState::ReservedLocal => StreamState::HalfClosedRemote,
            StreamState::ReservedRemote => StreamState::HalfClosedLocal,
            _ => return false,
        };
        true
    }

    /// Apply an outbound END_STREAM.
    pub(super) fn close_local(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedLocal,
            StreamState::HalfClosedRemote => StreamState::Closed,
            other => other,
        };
    }

    /// Apply an inbound END_STREAM.
    pub(super) fn close_remote(&mut self) {
        self.state = match self.state {
            StreamState::Open => StreamState::HalfClosedRemote,
            StreamState::HalfClosedLocal => StreamState::Closed,
            other => other,
        };
    }

    pub(super) fn close(&mut self) {
        self.state = StreamState::Closed;
    }
}
