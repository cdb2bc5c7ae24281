//! Error types carried by failed promises.
//!
//! A single [`Error`] type flows through every promise. It is cheap to clone
//! (the payload lives behind an `Arc`) because one failure may be delivered to
//! any number of observers attached to the same cell.

use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::promise::PromiseId;

/// Classification of a promise failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An error produced by the asynchronous work itself, or returned by a
    /// combinator callback.
    Operation,
    /// A combinator or factory callback panicked.
    Panicked,
    /// The producer went away without completing the promise.
    Abandoned,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Operation => f.write_str("operation"),
            ErrorKind::Panicked => f.write_str("panicked"),
            ErrorKind::Abandoned => f.write_str("abandoned"),
        }
    }
}

/// The failure value of a promise.
///
/// # Examples
///
/// ```rust
/// use beampromise::{Error, ErrorKind};
///
/// let err = Error::msg("connection refused");
/// assert_eq!(err.kind(), ErrorKind::Operation);
/// assert_eq!(err.to_string(), "connection refused");
///
/// let io = Error::new(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
/// assert!(io.downcast_ref::<std::io::Error>().is_some());
/// ```
#[derive(Clone)]
pub struct Error {
    kind: ErrorKind,
    inner: Arc<dyn std::error::Error + Send + Sync + 'static>,
}

impl Error {
    /// Wrap a domain error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            kind: ErrorKind::Operation,
            inner: Arc::new(error),
        }
    }

    /// Create an error from a plain message.
    pub fn msg(message: impl fmt::Display) -> Self {
        Self::new(Message(message.to_string()))
    }

    /// Create an error describing a panicked callback.
    pub fn panicked(message: impl fmt::Display) -> Self {
        Self {
            kind: ErrorKind::Panicked,
            inner: Arc::new(Message(message.to_string())),
        }
    }

    /// Create an error for a promise whose producer dropped it uncompleted.
    pub fn abandoned(id: PromiseId) -> Self {
        Self {
            kind: ErrorKind::Abandoned,
            inner: Arc::new(Message(format!("{} was dropped before completion", id))),
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::panicked(panic_message(payload.as_ref()))
    }

    /// The classification of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns true if this error came from a panicking callback.
    pub fn is_panic(&self) -> bool {
        self.kind == ErrorKind::Panicked
    }

    /// Attempt to view the wrapped domain error as a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.inner.downcast_ref::<E>()
    }

    /// Returns true if both values are clones of the same failure.
    ///
    /// Errors forwarded through `map`/`then`/`flat_map` keep their identity, so
    /// this can be used to check that a failure passed through untouched.
    pub fn is_same(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("message", &self.inner.to_string())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ErrorKind::Panicked => write!(f, "callback panicked: {}", self.inner),
            _ => write!(f, "{}", self.inner),
        }
    }
}

/// Errors compare equal when they have the same kind and message.
impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other) || (self.kind == other.kind && self.to_string() == other.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.inner.source()
    }
}

impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::msg(message)
    }
}

impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::new(Message(message))
    }
}

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for Message {}

/// Returned when a completer is used after its promise already completed.
///
/// The second completion has no effect; this value only reports that it
/// happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyCompleted {
    /// The promise that was completed twice.
    pub id: PromiseId,
}

impl fmt::Display for AlreadyCompleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} was already completed", self.id)
    }
}

impl std::error::Error for AlreadyCompleted {}

/// Run a callback, turning a panic into a failed result.
pub(crate) fn catch_panic<R>(f: impl FnOnce() -> Result<R, Error>) -> Result<R, Error> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(Error::from_panic(payload)))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
