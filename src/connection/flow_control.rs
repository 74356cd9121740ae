//! HTTP/2 flow control.
//!
//! [`FlowControl`] is a single window. The two controllers apply it per
//! direction: [`InboundFlowController`] guards what the peer may send us and
//! produces WINDOW_UPDATE frames, [`OutboundFlowController`] tracks the
//! credit the peer has granted us.

use crate::error::Http2Error;
use crate::frame::{ErrorCode, MAX_WINDOW_SIZE, StreamId, WindowUpdateFrame};

use super::stream::Stream;

/// One flow-control window, connection-wide or per stream.
///
/// The window is signed: lowering SETTINGS_INITIAL_WINDOW_SIZE can leave
/// it below zero until credit arrives.
#[derive(Debug, Clone)]
pub struct FlowControl {
    /// Current window size. May go negative after a SETTINGS change.
    window: i64,
    /// Baseline the update threshold is measured against.
    initial_window: u32,
    /// Received bytes not yet returned to the peer.
    consumed: u32,
    /// Consumed bytes that trigger a WINDOW_UPDATE.
    update_threshold: u32,
    /// Fraction of the initial window behind update_threshold.
    ratio: f32,
}

impl FlowControl {
    /// Create a window that asks for an update once half of it is used.
    pub fn new(initial_window_size: u32) -> Self {
        Self::with_update_ratio(initial_window_size, 0.5)
    }

    /// Create a window that asks for an update once `ratio` of it is used.
    pub fn with_update_ratio(initial_window_size: u32, ratio: f32) -> Self {
        Self {
            window: initial_window_size as i64,
            initial_window: initial_window_size,
            consumed: 0,
            update_threshold: threshold(initial_window_size, ratio),
            ratio,
        }
    }

    pub fn available(&self) -> i64 {
        self.window
    }

    /// Credit the window with a WINDOW_UPDATE increment.
    ///
    /// Returns `false`, leaving the window unchanged, if the result would
    /// exceed 2^31-1.
    pub fn increase_window(&mut self, increment: u32) -> bool {
        let next = self.window + increment as i64;
        if next > MAX_WINDOW_SIZE as i64 {
            return false;
        }
        self.window = next;
        true
    }

    /// Charge `amount` bytes against the window.
    ///
    /// Returns `false` without consuming if `amount` exceeds the window.
    pub fn consume(&mut self, amount: u32) -> bool {
        if amount as i64 > self.window {
            return false;
        }
        self.window -= amount as i64;
        self.consumed = self.consumed.saturating_add(amount);
        true
    }

    /// Enough has been consumed to be worth a WINDOW_UPDATE.
    pub fn should_update(&self) -> bool {
        self.consumed > 0 && self.consumed >= self.update_threshold
    }

    /// Increment the next WINDOW_UPDATE would carry.
    pub fn pending_update(&self) -> u32 {
        self.consumed
    }

    /// The pending increment was sent.
    pub fn reset_pending(&mut self) {
        self.window += self.consumed as i64;
        self.consumed = 0;
    }

    pub fn initial_window(&self) -> u32 {
        self.initial_window
    }

    /// Set a new initial window size, shifting the current window by the
    /// difference.
    ///
    /// Returns `false`, leaving the window unchanged, if the shifted window
    /// would exceed 2^31-1.
    pub fn set_initial_window(&mut self, new_initial: u32) -> bool {
        let delta = new_initial as i64 - self.initial_window as i64;
        let next = self.window + delta;
        if next > MAX_WINDOW_SIZE as i64 {
            return false;
        }
        self.window = next;
        self.initial_window = new_initial;
        self.update_threshold = threshold(new_initial, self.ratio);
        true
    }
}

fn threshold(window: u32, ratio: f32) -> u32 {
    ((window as f64 * ratio as f64) as u32).max(1)
}

/// Flow control for data the peer sends to us.
#[derive(Debug)]
pub struct InboundFlowController {
    connection: FlowControl,
    initial_window: u32,
    ratio: f32,
}

impl InboundFlowController {
    pub fn new(initial_window: u32, ratio: f32) -> Self {
        Self {
            // The connection window always starts at the protocol default.
            connection: FlowControl::with_update_ratio(
                crate::frame::DEFAULT_INITIAL_WINDOW_SIZE,
                ratio,
            ),
            initial_window,
            ratio,
        }
    }

    /// Receive window for a new stream.
    pub fn new_stream_window(&self) -> FlowControl {
        FlowControl::with_update_ratio(self.initial_window, self.ratio)
    }

    pub fn connection_window(&self) -> &FlowControl {
        &self.connection
    }

    /// Account for `len` flow-controlled bytes arriving on the connection.
    pub fn receive_connection(&mut self, len: u32) -> Result<(), Http2Error> {
        if !self.connection.consume(len) {
            return Err(Http2Error::connection_error(
                ErrorCode::FlowControlError,
                format!(
                    "received {} bytes with connection window {}",
                    len,
                    self.connection.available()
                ),
            ));
        }
        Ok(())
    }

    /// Account for `len` bytes arriving on `stream`, returning the stream's
    /// WINDOW_UPDATE if one is due.
    pub fn receive_stream(
        &mut self,
        stream: &mut Stream,
        len: u32,
    ) -> Result<Option<WindowUpdateFrame>, Http2Error> {
        let window = stream.recv_window_mut();
        if !window.consume(len) {
            return Err(Http2Error::stream_error(
                stream.id(),
                ErrorCode::FlowControlError,
                "stream receive window exceeded",
            ));
        }
        Ok(take_update(stream.id(), stream.recv_window_mut()))
    }

    /// The connection-level WINDOW_UPDATE, if one is due.
    pub fn connection_update(&mut self) -> Option<WindowUpdateFrame> {
        take_update(StreamId::CONNECTION, &mut self.connection)
    }
}

fn take_update(stream_id: StreamId, window: &mut FlowControl) -> Option<WindowUpdateFrame> {
    if !window.should_update() {
        return None;
    }
    let increment = window.pending_update();
    window.reset_pending();
    Some(WindowUpdateFrame {
        stream_id,
        increment,
    })
}

/// Flow control for data we send to the peer.
#[derive(Debug)]
pub struct OutboundFlowController {
    connection: FlowControl,
    initial_window: u32,
}

impl Default for OutboundFlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundFlowController {
    /// Starts from the protocol default until the peer's SETTINGS arrive.
    pub fn new() -> Self {
        Self {
            connection: FlowControl::new(crate::frame::DEFAULT_INITIAL_WINDOW_SIZE),
            initial_window: crate::frame::DEFAULT_INITIAL_WINDOW_SIZE,
        }
    }

    /// Send window for a new stream.
    pub fn new_stream_window(&self) -> FlowControl {
        FlowControl::new(self.initial_window)
    }

    pub fn initial_window(&self) -> u32 {
        self.initial_window
    }

    pub fn connection_window(&self) -> &FlowControl {
        &self.connection
    }

    /// Apply a connection-level WINDOW_UPDATE.
    pub fn connection_window_update(&mut self, increment: u32) -> Result<(), Http2Error> {
        if !self.connection.increase_window(increment) {
            return Err(Http2Error::connection_error(
                ErrorCode::FlowControlError,
                "connection send window overflow",
            ));
        }
        Ok(())
    }

    /// Apply a stream-level WINDOW_UPDATE.
    pub fn stream_window_update(
        &mut self,
        stream: &mut Stream,
        increment: u32,
    ) -> Result<(), Http2Error> {
        if !stream.send_window_mut().increase_window(increment) {
            return Err(Http2Error::stream_error(
                stream.id(),
                ErrorCode::FlowControlError,
                "stream send window overflow",
            ));
        }
        Ok(())
    }

    /// Apply the peer's SETTINGS_INITIAL_WINDOW_SIZE to every open stream.
    pub fn set_initial_window<'a>(
        &mut self,
        new_initial: u32,
        streams: impl Iterator<Item = &'a mut Stream>,
    ) -> Result<(), Http2Error> {
        self.initial_window = new_initial;
        for stream in streams {
            if !stream.send_window_mut().set_initial_window(new_initial) {
                return Err(Http2Error::connection_error(
                    ErrorCode::FlowControlError,
                    format!("stream {} send window overflow", stream.id()),
                ));
            }
        }
        Ok(())
    }

    /// Credit available for sending on `stream`.
    pub fn available(&self, stream: &Stream) -> i64 {
        self.connection
            .available()
            .min(stream.send_window().available())
    }
}
