//! Graceful close sequencing.
//!
//! The transport is closed at most once. A close is requested first, and
//! only starts once the caller's final write has completed. From then on it
//! waits until the last active stream closes or the deadline passes.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::completion::Completion;
use crate::transport::Transport;

#[derive(Debug)]
enum CloseState {
    Open,
    /// Close requested, final write still in flight.
    Requested {
        promise: Completion,
    },
    Draining {
        promise: Completion,
        deadline: Option<Instant>,
    },
    Closed {
        promise: Completion,
    },
}

#[derive(Debug)]
pub struct CloseSequencer {
    state: CloseState,
    timeout: Option<Duration>,
}

impl CloseSequencer {
    /// `timeout` bounds how long a graceful close may wait for streams.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            state: CloseState::Open,
            timeout,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, CloseState::Closed { .. })
    }

    pub fn is_draining(&self) -> bool {
        matches!(self.state, CloseState::Draining { .. })
    }

    /// The shared close handle, once any close has been requested.
    pub fn promise(&self) -> Option<Completion> {
        match &self.state {
            CloseState::Open => None,
            CloseState::Requested { promise }
            | CloseState::Draining { promise, .. }
            | CloseState::Closed { promise } => Some(promise.clone()),
        }
    }

    /// Record a close whose final write has not completed yet. Nothing is
    /// closed until [`request_close`](Self::request_close) follows.
    pub fn request(&mut self) -> Completion {
        if let Some(promise) = self.promise() {
            return promise;
        }
        let promise = Completion::new();
        self.state = CloseState::Requested {
            promise: promise.clone(),
        };
        promise
    }

    /// Ask for the transport to be closed once no streams are active.
    ///
    /// Every caller gets the same handle, completed with the outcome of the
    /// single transport close.
    pub fn request_close<T: Transport>(
        &mut self,
        transport: &mut T,
        active_streams: usize,
        now: Instant,
    ) -> Completion {
        match &self.state {
            CloseState::Closed { promise } => promise.clone(),
            CloseState::Draining { promise, .. } => {
                let promise = promise.clone();
                if active_streams == 0 {
                    self.close_transport(transport);
                }
                promise
            }
            CloseState::Open | CloseState::Requested { .. } if active_streams == 0 => {
                self.close_transport(transport)
            }
            CloseState::Open | CloseState::Requested { .. } => {
                let promise = self.promise().unwrap_or_default();
                let deadline = self.timeout.map(|timeout| now + timeout);
                debug!(active_streams, ?deadline, "waiting for streams before close");
                self.state = CloseState::Draining {
                    promise: promise.clone(),
                    deadline,
                };
                promise
            }
        }
    }

    /// A stream reached the closed state.
    pub fn on_stream_closed<T: Transport>(&mut self, transport: &mut T, active_streams: usize) {
        if self.is_draining() && active_streams == 0 {
            self.close_transport(transport);
        }
    }

    /// Close the transport now, unless it already was.
    pub fn force_close<T: Transport>(&mut self, transport: &mut T) -> Completion {
        self.close_transport(transport)
    }

    /// The transport went away without us closing it.
    pub fn on_transport_inactive(&mut self) {
        let promise = match &self.state {
            CloseState::Closed { .. } => return,
            CloseState::Requested { promise } | CloseState::Draining { promise, .. } => {
                promise.clone()
            }
            CloseState::Open => Completion::new(),
        };
        promise.succeed();
        self.state = CloseState::Closed { promise };
    }

    /// When [`handle_timeout`](Self::handle_timeout) should next be called.
    pub fn poll_timeout(&self) -> Option<Instant> {
        match self.state {
            CloseState::Draining { deadline, .. } => deadline,
            _ => None,
        }
    }

    /// Force the close if the drain deadline has passed. Returns `true` if
    /// the transport was closed by this call.
    pub fn handle_timeout<T: Transport>(&mut self, transport: &mut T, now: Instant) -> bool {
        match self.poll_timeout() {
            Some(deadline) if now >= deadline => {
                debug!("graceful close timed out");
                self.close_transport(transport);
                true
            }
            _ => false,
        }
    }

    fn close_transport<T: Transport>(&mut self, transport: &mut T) -> Completion {
        let promise = match &self.state {
            CloseState::Closed { promise } => return promise.clone(),
            CloseState::Requested { promise } | CloseState::Draining { promise, .. } => {
                promise.clone()
            }
            CloseState::Open => Completion::new(),
        };

        debug!("closing transport");
        self.state = CloseState::Closed {
            promise: promise.clone(),
        };
        transport.close().forward_to(promise.clone());
        promise
    }
}
