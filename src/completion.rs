//! Single-shot completion handles for outbound operations.
//!
//! Every write, close, GOAWAY or RST_STREAM request returns a [`Completion`].
//! The handle is completed exactly once; later attempts are ignored.
//! Listeners registered with [`Completion::on_complete`] run on the thread
//! that completes the handle, or immediately if it is already done.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Http2Error;

/// Outcome of a completed operation.
pub type Outcome = Result<(), Http2Error>;

type Listener = Box<dyn FnOnce(&Outcome)>;

struct Inner {
    outcome: Option<Outcome>,
    listeners: Vec<Listener>,
}

/// Shared handle to the eventual outcome of one operation.
///
/// Clones observe the same outcome.
#[derive(Clone)]
pub struct Completion {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Completion {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Completion")
            .field("outcome", &inner.outcome)
            .field("listeners", &inner.listeners.len())
            .finish()
    }
}

impl Completion {
    /// Create a pending completion.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                outcome: None,
                listeners: Vec::new(),
            })),
        }
    }

    /// Create a completion that has already succeeded.
    pub fn succeeded() -> Self {
        let completion = Self::new();
        completion.complete(Ok(()));
        completion
    }

    /// Create a completion that has already failed.
    pub fn failed(cause: Http2Error) -> Self {
        let completion = Self::new();
        completion.complete(Err(cause));
        completion
    }

    /// Complete the handle. Returns `false` if it was already completed.
    pub fn complete(&self, outcome: Outcome) -> bool {
        let listeners = {
            let mut inner = self.inner.borrow_mut();
            if inner.outcome.is_some() {
                return false;
            }
            inner.outcome = Some(outcome.clone());
            std::mem::take(&mut inner.listeners)
        };

        // Listeners may register further listeners or inspect this handle.
        for listener in listeners {
            listener(&outcome);
        }
        true
    }

    pub fn succeed(&self) -> bool {
        self.complete(Ok(()))
    }

    pub fn fail(&self, cause: Http2Error) -> bool {
        self.complete(Err(cause))
    }

    /// Register a listener. Runs immediately if already complete.
    pub fn on_complete<F>(&self, listener: F)
    where
        F: FnOnce(&Outcome) + 'static,
    {
        let done = self.inner.borrow().outcome.clone();
        match done {
            Some(outcome) => listener(&outcome),
            None => self.inner.borrow_mut().listeners.push(Box::new(listener)),
        }
    }

    /// Complete `other` with this handle's outcome once it is known.
    pub fn forward_to(&self, other: Completion) {
        self.on_complete(move |outcome| {
            other.complete(outcome.clone());
        });
    }

    pub fn is_done(&self) -> bool {
        self.inner.borrow().outcome.is_some()
    }

    pub fn is_success(&self) -> bool {
        matches!(self.inner.borrow().outcome, Some(Ok(())))
    }

    /// The failure cause, if the handle failed.
    pub fn cause(&self) -> Option<Http2Error> {
        match &self.inner.borrow().outcome {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        }
    }

    /// Whether two handles share the same underlying state.
    pub fn same_as(&self, other: &Completion) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn test_complete_once() {
        let completion = Completion::new();
        assert!(!completion.is_done());
        assert!(completion.succeed());
        assert!(!completion.fail(Http2Error::Closed));
        assert!(completion.is_success());
        assert!(completion.cause().is_none());
    }

    #[test]
    fn test_listener_runs_once() {
        let calls = Rc::new(Cell::new(0));
        let completion = Completion::new();

        let counter = calls.clone();
        completion.on_complete(move |outcome| {
            assert!(outcome.is_err());
            counter.set(counter.get() + 1);
        });
        assert_eq!(calls.get(), 0);

        completion.fail(Http2Error::WriteFailed("reset".into()));
        completion.fail(Http2Error::Closed);
        assert_eq!(calls.get(), 1);
        assert_eq!(
            completion.cause(),
            Some(Http2Error::WriteFailed("reset".into()))
        );
    }

    #[test]
    fn test_listener_on_done_handle_runs_immediately() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        Completion::succeeded().on_complete(move |outcome| {
            assert!(outcome.is_ok());
            flag.set(true);
        });
        assert!(ran.get());
    }

    #[test]
    fn test_listener_can_touch_handle() {
        let completion = Completion::new();
        let handle = completion.clone();
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        completion.on_complete(move |_| {
            flag.set(handle.is_done());
        });
        completion.succeed();
        assert!(seen.get());
    }

    #[test]
    fn test_forward_to() {
        let source = Completion::new();
        let target = Completion::new();
        source.forward_to(target.clone());
        assert!(!target.is_done());

        source.fail(Http2Error::Closed);
        assert_eq!(target.cause(), Some(Http2Error::Closed));
    }

    #[test]
    fn test_clones_share_state() {
        let a = Completion::new();
        let b = a.clone();
        assert!(a.same_as(&b));
        assert!(!a.same_as(&Completion::new()));
        b.succeed();
        assert!(a.is_success());
    }
}
