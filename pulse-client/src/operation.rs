//! Asynchronous operations: a cancellable handle representing a pending request.

use std::cell::RefCell;
use std::rc::Rc;

/// Lifecycle of an [`Operation`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum State {
    Running,
    Done,
    Cancelled,
}

struct Inner {
    state: State,
    state_callback: Option<Box<dyn FnMut()>>,
}

/// A handle to a pending asynchronous request.
///
/// Co-owned by the caller (who holds this handle) and by the dispatcher row awaiting the
/// matching reply (which holds a clone of the inner `Rc`); the request's bookkeeping is freed
/// once both releases have happened. Cancelling only disables the local callback — it cannot
/// un-send a command already written to the wire.
#[derive(Clone)]
pub struct Operation {
    inner: Rc<RefCell<Inner>>,
}

/// The dispatcher-side counterpart used to mark completion/cancellation from within a reply
/// callback, without the dispatcher needing to know about [`Operation`]'s public API.
pub(crate) struct OperationHandle {
    inner: Rc<RefCell<Inner>>,
}

pub(crate) fn new_pair() -> (Operation, OperationHandle) {
    let inner = Rc::new(RefCell::new(Inner { state: State::Running, state_callback: None }));
    (Operation { inner: inner.clone() }, OperationHandle { inner })
}

impl Operation {
    /// Cancels the operation: the registered callback will not run (or, if it is already
    /// mid-execution, must not be cancelled from within itself — unsupported and will panic in
    /// debug builds via the inner `RefCell`'s borrow check).
    pub fn cancel(&mut self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == State::Running {
            inner.state = State::Cancelled;
            if let Some(cb) = inner.state_callback.as_mut() {
                cb();
            }
        }
    }

    pub fn get_state(&self) -> State {
        self.inner.borrow().state
    }

    /// Registers a callback invoked whenever the operation's state changes, including on
    /// cancellation (the common case application code actually wants this for).
    pub fn set_state_callback(&mut self, callback: Option<Box<dyn FnMut()>>) {
        self.inner.borrow_mut().state_callback = callback;
    }
}

impl OperationHandle {
    /// Marks the operation done, unless it was already cancelled by the caller, and fires the
    /// state callback either way is moot since a cancelled operation's callback was already
    /// cleared by the caller-visible side — `Done` never overwrites `Cancelled`.
    pub(crate) fn complete(&self) {
        let mut inner = self.inner.borrow_mut();
        if inner.state == State::Running {
            inner.state = State::Done;
            if let Some(cb) = inner.state_callback.as_mut() {
                cb();
            }
        }
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.inner.borrow().state == State::Cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn cancel_before_complete_sticks() {
        let (mut op, handle) = new_pair();
        op.cancel();
        handle.complete();
        assert_eq!(op.get_state(), State::Cancelled);
    }

    #[test]
    fn complete_without_cancel_transitions_to_done() {
        let (op, handle) = new_pair();
        handle.complete();
        assert_eq!(op.get_state(), State::Done);
    }

    #[test]
    fn state_callback_fires_on_cancel() {
        let (mut op, _handle) = new_pair();
        let fired = Rc::new(Cell::new(false));
        let fired2 = fired.clone();
        op.set_state_callback(Some(Box::new(move || fired2.set(true))));
        op.cancel();
        assert!(fired.get());
    }

    #[test]
    fn is_cancelled_visible_to_dispatcher_side() {
        let (mut op, handle) = new_pair();
        assert!(!handle.is_cancelled());
        op.cancel();
        assert!(handle.is_cancelled());
    }
}
