//! Testing utilities and helpers for promise-based code.
//!
//! This module provides assertion macros for promise state and a recorder for
//! the uncaught-error hook.
//!
//! # Examples
//!
//! ## Assertion Macros
//!
//! ```rust
//! use beampromise::{assert_failed, assert_pending, assert_succeeded, Promise};
//!
//! let ok = Promise::success(42);
//! assert_succeeded!(ok, 42);
//!
//! let (pending, _completer) = Promise::<u8>::pending();
//! assert_pending!(pending);
//!
//! let failed = Promise::<u8>::failure("boom");
//! assert_failed!(failed, "boom");
//! # drop(failed.on_error(|_| {}));
//! ```
//!
//! ## Recording uncaught failures
//!
//! ```rust
//! use beampromise::testing::UncaughtRecorder;
//! use beampromise::Promise;
//!
//! let recorder = UncaughtRecorder::install();
//!
//! drop(Promise::<()>::failure("ignored"));
//! drop(Promise::<()>::failure("handled").on_error(|_| {}));
//!
//! assert_eq!(recorder.messages(), vec!["ignored".to_string()]);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::promise::PromiseId;
use crate::uncaught::{self, UncaughtHandlerGuard};

/// Captures uncaught failures on the current thread while it is alive.
///
/// The previous handler is restored when the recorder drops.
pub struct UncaughtRecorder {
    reported: Rc<RefCell<Vec<(PromiseId, Error)>>>,
    _guard: UncaughtHandlerGuard,
}

impl UncaughtRecorder {
    /// Install a recorder as the current thread's uncaught handler.
    pub fn install() -> Self {
        let reported = Rc::new(RefCell::new(Vec::new()));
        let guard = uncaught::install({
            let reported = Rc::clone(&reported);
            move |id, error: &Error| reported.borrow_mut().push((id, error.clone()))
        });
        Self {
            reported,
            _guard: guard,
        }
    }

    /// Number of failures reported so far.
    pub fn count(&self) -> usize {
        self.reported.borrow().len()
    }

    /// The reported failures, in report order.
    pub fn reports(&self) -> Vec<(PromiseId, Error)> {
        self.reported.borrow().clone()
    }

    /// The messages of the reported failures, in report order.
    pub fn messages(&self) -> Vec<String> {
        self.reported
            .borrow()
            .iter()
            .map(|(_, error)| error.to_string())
            .collect()
    }
}

impl fmt::Debug for UncaughtRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UncaughtRecorder")
            .field("reported", &self.reported.borrow())
            .finish()
    }
}

/// Assert that a promise succeeded, optionally with a specific value.
///
/// This macro will panic if the promise is pending or failed.
///
/// # Example
///
/// ```rust
/// use beampromise::{assert_succeeded, Promise};
///
/// let promise = Promise::success("done");
/// assert_succeeded!(promise);
/// assert_succeeded!(promise, "done");
/// ```
#[macro_export]
macro_rules! assert_succeeded {
    ($promise:expr) => {
        match $promise.result() {
            Some(Ok(_)) => {}
            Some(Err(e)) => panic!("Expected Succeeded, got Failed: {}", e),
            None => panic!("Expected Succeeded, got Pending"),
        }
    };
    ($promise:expr, $expected:expr) => {
        match $promise.result() {
            Some(Ok(value)) => assert_eq!(value, $expected),
            Some(Err(e)) => panic!("Expected Succeeded, got Failed: {}", e),
            None => panic!("Expected Succeeded, got Pending"),
        }
    };
}

/// Assert that a promise failed, optionally with a specific message.
///
/// This macro will panic if the promise is pending or succeeded.
///
/// # Example
///
/// ```rust
/// use beampromise::{assert_failed, Promise};
///
/// let promise = Promise::<u8>::failure("offline");
/// assert_failed!(promise);
/// assert_failed!(promise, "offline");
/// # drop(promise.on_error(|_| {}));
/// ```
#[macro_export]
macro_rules! assert_failed {
    ($promise:expr) => {
        match $promise.result() {
            Some(Err(_)) => {}
            Some(Ok(v)) => panic!("Expected Failed, got Succeeded: {:?}", v),
            None => panic!("Expected Failed, got Pending"),
        }
    };
    ($promise:expr, $message:expr) => {
        match $promise.result() {
            Some(Err(e)) => assert_eq!(e.to_string(), $message),
            Some(Ok(v)) => panic!("Expected Failed, got Succeeded: {:?}", v),
            None => panic!("Expected Failed, got Pending"),
        }
    };
}

/// Assert that a promise has not completed yet.
///
/// # Example
///
/// ```rust
/// use beampromise::{assert_pending, Promise};
///
/// let (promise, _completer) = Promise::<()>::pending();
/// assert_pending!(promise);
/// ```
#[macro_export]
macro_rules! assert_pending {
    ($promise:expr) => {
        if $promise.is_completed() {
            panic!("Expected Pending, got {:?}", $promise);
        }
    };
}
