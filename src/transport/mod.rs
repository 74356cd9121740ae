//! Transport layer abstraction.
//!
//! The handler never touches a socket. It talks to a [`Transport`], which
//! accepts ordered writes, buffers them until flushed and reports each
//! write's outcome through a [`Completion`]. Inbound bytes and lifecycle
//! notifications travel the other way, as calls on the handler.

mod buffered;

pub use buffered::BufferedTransport;

use bytes::Bytes;

use crate::completion::Completion;

/// Transport state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    /// Not yet connected.
    Connecting,
    /// Ready for application data.
    Active,
    /// Closed, locally or by the peer.
    Closed,
}

/// Byte-stream connection the handler writes frames to.
pub trait Transport {
    /// Get the current transport state.
    fn state(&self) -> TransportState;

    /// Check if the transport can carry data.
    fn is_active(&self) -> bool {
        self.state() == TransportState::Active
    }

    /// Queue `data` for sending.
    ///
    /// Takes ownership of the buffer. Writes reach the wire in submission
    /// order. The returned handle completes once the bytes have been
    /// handed to the socket, or fails if the transport closes first.
    fn write(&mut self, data: Bytes) -> Completion;

    /// Push queued writes towards the socket.
    fn flush(&mut self);

    /// Close the connection.
    fn close(&mut self) -> Completion;
}
