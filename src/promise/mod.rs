//! Result cells and their handles.
//!
//! A [`Promise`] is a shared handle to one result cell: pending, succeeded
//! with a value, or failed with an [`Error`]. The paired [`Completer`] is the
//! single capability allowed to move the cell out of pending.
//!
//! # Completion
//!
//! Completion is a synchronous fan-out. Every continuation registered on the
//! cell runs, in registration order, before `succeed`/`fail` returns.
//! Continuations registered after completion run immediately during
//! registration, so there are no missed wakeups.
//!
//! ```rust
//! use beampromise::Promise;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let (promise, completer) = Promise::<u32>::pending();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! for tag in ["a", "b"] {
//!     let log = log.clone();
//!     promise.on_complete(move |result| log.borrow_mut().push((tag, result.clone().ok())));
//! }
//!
//! completer.succeed(5).unwrap();
//! assert_eq!(*log.borrow(), vec![("a", Some(5)), ("b", Some(5))]);
//!
//! // A second completion is ignored and reported back to the caller.
//! assert!(completer.succeed(6).is_err());
//! assert_eq!(promise.value(), Some(5));
//! ```

mod aggregate;
mod cell;
mod combinators;


use std::fmt;
use std::rc::Rc;

use crate::error::{AlreadyCompleted, Error};

pub(crate) use cell::Cell;
pub use cell::PromiseId;

/// A handle to the eventual outcome of one asynchronous operation.
///
/// Cloning a `Promise` clones the handle, not the cell: every clone observes
/// the same completion.
pub struct Promise<T> {
    pub(crate) cell: Rc<Cell<T>>,
}

/// The completion capability paired with a pending [`Promise`].
///
/// Only the first completion has an effect. Later calls return
/// [`AlreadyCompleted`] and leave the cell and its continuations untouched.
pub struct Completer<T> {
    cell: Rc<Cell<T>>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Rc::clone(&self.cell),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.cell.id())
            .field("state", &self.cell.state_name())
            .finish()
    }
}

impl<T> fmt::Debug for Completer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer")
            .field("id", &self.cell.id())
            .field("completed", &self.cell.is_completed())
            .finish()
    }
}

impl<T: 'static> Promise<T> {
    /// Create a pending promise and the capability that completes it.
    pub fn pending() -> (Self, Completer<T>) {
        let cell = Rc::new(Cell::pending());
        (
            Self {
                cell: Rc::clone(&cell),
            },
            Completer { cell },
        )
    }

    /// A promise that has already succeeded.
    pub fn success(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// A promise that has already failed.
    pub fn failure(error: impl Into<Error>) -> Self {
        Self::from_result(Err(error.into()))
    }

    /// A promise already completed with `result`.
    pub fn from_result(result: Result<T, Error>) -> Self {
        Self {
            cell: Rc::new(Cell::settled(result)),
        }
    }

    /// Identifier of the underlying cell.
    pub fn id(&self) -> PromiseId {
        self.cell.id()
    }

    /// Returns true once the promise has left the pending state.
    pub fn is_completed(&self) -> bool {
        self.cell.is_completed()
    }

    /// Returns true if the promise succeeded.
    pub fn is_successful(&self) -> bool {
        self.cell.with_result(|r| matches!(r, Some(Ok(_))))
    }

    /// Returns true if the promise failed.
    pub fn is_failed(&self) -> bool {
        self.cell.with_result(|r| matches!(r, Some(Err(_))))
    }

    /// The failure, if the promise failed.
    ///
    /// Reading the error does not count as observing it for the uncaught
    /// check; attach [`on_error`](Promise::on_error) for that.
    pub fn error(&self) -> Option<Error> {
        self.cell.with_result(|r| match r {
            Some(Err(e)) => Some(e.clone()),
            _ => None,
        })
    }

    /// Run `f` with the final result once the promise completes.
    ///
    /// This observes errors: a failure delivered here is never reported as
    /// uncaught.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Result<T, Error>) + 'static,
    {
        self.cell.register(Box::new(f), true);
    }

    /// Run `f` with the value if the promise succeeds.
    ///
    /// Unlike [`on_complete`](Promise::on_complete), this does not observe
    /// errors.
    pub fn on_success<F>(&self, f: F)
    where
        F: FnOnce(&T) + 'static,
    {
        self.cell.register(
            Box::new(move |result| {
                if let Ok(value) = result {
                    f(value)
                }
            }),
            false,
        );
    }
}

impl<T: Clone + 'static> Promise<T> {
    /// The value, if the promise succeeded.
    pub fn value(&self) -> Option<T> {
        self.cell.with_result(|r| match r {
            Some(Ok(v)) => Some(v.clone()),
            _ => None,
        })
    }

    /// The final result, if the promise completed.
    pub fn result(&self) -> Option<Result<T, Error>> {
        self.cell.with_result(|r| r.cloned())
    }
}

impl<T: 'static> Completer<T> {
    /// Complete the promise successfully.
    pub fn succeed(&self, value: T) -> Result<(), AlreadyCompleted> {
        self.cell.complete(Ok(value))
    }

    /// Complete the promise with a failure.
    pub fn fail(&self, error: impl Into<Error>) -> Result<(), AlreadyCompleted> {
        self.cell.complete(Err(error.into()))
    }

    /// Complete the promise with `result`.
    pub fn complete(&self, result: Result<T, Error>) -> Result<(), AlreadyCompleted> {
        self.cell.complete(result)
    }

    /// Returns true once the paired promise has completed.
    pub fn is_completed(&self) -> bool {
        self.cell.is_completed()
    }

    /// A new handle to the paired promise.
    pub fn promise(&self) -> Promise<T> {
        Promise {
            cell: Rc::clone(&self.cell),
        }
    }
}
