//! In-memory transport for cleartext connections and tests.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use tracing::trace;

use super::{Transport, TransportState};
use crate::completion::Completion;
use crate::error::Http2Error;

/// Buffered plain transport.
///
/// Writes are queued until [`flush`](Transport::flush) moves them into the
/// send buffer. The owner drains [`pending_send`](Self::pending_send) onto
/// the socket and reports progress with [`advance_send`](Self::advance_send),
/// which completes every write whose bytes have fully left the buffer.
pub struct BufferedTransport {
    state: TransportState,
    /// Writes issued but not yet flushed.
    queued: VecDeque<(Bytes, Completion)>,
    /// Flushed bytes waiting for the socket.
    send_buf: BytesMut,
    /// How much of send_buf has been sent.
    send_pos: usize,
    /// Flushed writes by the send_buf offset at which they end.
    in_flight: VecDeque<(usize, Completion)>,
    flushes: usize,
}

impl BufferedTransport {
    /// Create a transport that is already connected.
    pub fn new() -> Self {
        Self::with_state(TransportState::Active)
    }

    /// Create a transport that becomes active later, via [`Self::activate`].
    pub fn connecting() -> Self {
        Self::with_state(TransportState::Connecting)
    }

    fn with_state(state: TransportState) -> Self {
        Self {
            state,
            queued: VecDeque::new(),
            send_buf: BytesMut::with_capacity(16384),
            send_pos: 0,
            in_flight: VecDeque::new(),
            flushes: 0,
        }
    }

    pub fn activate(&mut self) {
        if self.state == TransportState::Connecting {
            self.state = TransportState::Active;
        }
    }

    /// Get flushed data that needs to be sent on the socket.
    pub fn pending_send(&self) -> &[u8] {
        &self.send_buf[self.send_pos..]
    }

    pub fn has_pending_send(&self) -> bool {
        !self.pending_send().is_empty()
    }

    /// Mark bytes as sent on the socket.
    pub fn advance_send(&mut self, n: usize) {
        self.send_pos = (self.send_pos + n).min(self.send_buf.len());

        while let Some((end, _)) = self.in_flight.front() {
            if *end > self.send_pos {
                break;
            }
            if let Some((_, completion)) = self.in_flight.pop_front() {
                completion.succeed();
            }
        }

        // If all data sent, clear the buffer
        if self.send_pos >= self.send_buf.len() {
            self.send_buf.clear();
            self.send_pos = 0;
        }
    }

    /// Fail every unsent write, as when the socket reports an error.
    pub fn fail_pending(&mut self, cause: Http2Error) {
        let failed: Vec<Completion> = self
            .queued
            .drain(..)
            .map(|(_, c)| c)
            .chain(self.in_flight.drain(..).map(|(_, c)| c))
            .collect();
        self.send_buf.clear();
        self.send_pos = 0;

        trace!(writes = failed.len(), error = %cause, "failing pending writes");
        for completion in failed {
            completion.fail(cause.clone());
        }
    }

    /// Number of unflushed writes.
    pub fn queued_writes(&self) -> usize {
        self.queued.len()
    }

    /// Number of flush calls so far.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }
}

impl Default for BufferedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for BufferedTransport {
    fn state(&self) -> TransportState {
        self.state
    }

    fn write(&mut self, data: Bytes) -> Completion {
        if self.state != TransportState::Active {
            return Completion::failed(Http2Error::Closed);
        }

        let completion = Completion::new();
        self.queued.push_back((data, completion.clone()));
        completion
    }

    fn flush(&mut self) {
        self.flushes += 1;
        while let Some((data, completion)) = self.queued.pop_front() {
            self.send_buf.extend_from_slice(&data);
            self.in_flight.push_back((self.send_buf.len(), completion));
        }
    }

    fn close(&mut self) -> Completion {
        if self.state != TransportState::Closed {
            self.state = TransportState::Closed;
            self.fail_pending(Http2Error::Closed);
        }
        Completion::succeeded()
    }
}
