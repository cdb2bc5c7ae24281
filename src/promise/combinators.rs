//! Combinators deriving new promises from existing ones.
//!
//! Every combinator leaves its source untouched and returns a fresh promise
//! whose completion is driven by the source. Callbacks run inside a panic
//! guard: a panicking callback fails the derived promise with an
//! [`ErrorKind::Panicked`](crate::ErrorKind::Panicked) error instead of
//! unwinding into whoever completed the source.
//!
//! Errors pass through every combinator untouched unless the combinator is
//! explicitly a recovery one (`recover`, `recover_with`,
//! `recover_with_backoff`). Forwarding a failure hands responsibility for it to
//! the derived promise, so only the end of a chain is ever reported as
//! uncaught.

use std::cell::RefCell;
use std::rc::Rc;

use super::{Completer, Promise};
use crate::error::{catch_panic, Error};

impl<T: Clone + 'static> Promise<T> {
    /// Register a continuation that completes a new derived promise.
    fn derive<U, F>(&self, f: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(&Result<T, Error>, Completer<U>) + 'static,
    {
        let (derived, completer) = Promise::pending();
        self.cell
            .register(Box::new(move |result| f(result, completer)), true);
        derived
    }

    /// Run a fallible step when this promise succeeds.
    ///
    /// The derived promise completes with whatever `f` returns; returning
    /// `Err` fails it. When this promise fails, `f` is not called and the
    /// failure is forwarded unchanged.
    ///
    /// # Example
    ///
    /// ```rust
    /// use beampromise::{Error, Promise};
    ///
    /// let parsed = Promise::success("42".to_string())
    ///     .then(|s| s.parse::<u32>().map_err(Error::new));
    /// assert_eq!(parsed.value(), Some(42));
    ///
    /// let rejected = Promise::success("forty-two".to_string())
    ///     .then(|s| s.parse::<u32>().map_err(Error::new));
    /// assert!(rejected.is_failed());
    /// # drop(rejected.on_error(|_| {}));
    /// ```
    pub fn then<U, F>(&self, f: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(T) -> Result<U, Error> + 'static,
    {
        self.derive(move |result, out| {
            let next = match result {
                Ok(value) => {
                    let value = value.clone();
                    catch_panic(move || f(value))
                }
                Err(error) => Err(error.clone()),
            };
            let _ = out.complete(next);
        })
    }

    /// Transform the success value.
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then(move |value| Ok(f(value)))
    }

    /// Chain another asynchronous operation.
    ///
    /// The derived promise mirrors the promise returned by `f`. A failure of
    /// this promise skips `f`; a failure of the inner promise is forwarded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use beampromise::Promise;
    ///
    /// let (inner, completer) = Promise::<String>::pending();
    /// let chained = Promise::success(7).flat_map(move |n| inner.map(move |s| format!("{s}{n}")));
    ///
    /// assert!(!chained.is_completed());
    /// completer.succeed("level-".into()).unwrap();
    /// assert_eq!(chained.value().as_deref(), Some("level-7"));
    /// ```
    pub fn flat_map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Promise<U> + 'static,
    {
        self.derive(move |result, out| match result {
            Ok(value) => {
                let value = value.clone();
                match catch_panic(move || Ok(f(value))) {
                    Ok(inner) => forward(&inner, out),
                    Err(error) => {
                        let _ = out.fail(error);
                    }
                }
            }
            Err(error) => {
                let _ = out.fail(error.clone());
            }
        })
    }

    /// Observe a failure without handling it.
    ///
    /// `f` sees the error and the derived promise still fails with it. The
    /// failure counts as observed: neither this promise nor the derived one is
    /// reported as uncaught. If `f` panics, the derived promise fails with the
    /// panic instead, and that failure is reported like any other.
    pub fn on_error<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&Error) + 'static,
    {
        self.derive(move |result, out| {
            let next = match result {
                Ok(value) => Ok(value.clone()),
                Err(error) => match catch_panic(|| {
                    f(error);
                    Ok(())
                }) {
                    Ok(()) => {
                        out.cell.mark_observed();
                        Err(error.clone())
                    }
                    // The panic is a new failure and stays unobserved.
                    Err(panicked) => Err(panicked),
                },
            };
            let _ = out.complete(next);
        })
    }

    /// Discard the success value.
    pub fn to_unit(&self) -> Promise<()> {
        self.map(|_| ())
    }

    /// Inspect the success value, passing it through.
    pub fn tap<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(&T) + 'static,
    {
        self.then(move |value| {
            f(&value);
            Ok(value)
        })
    }

    /// Transform the failure.
    pub fn map_err<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Error + 'static,
    {
        self.derive(move |result, out| {
            let next = match result {
                Ok(value) => Ok(value.clone()),
                Err(error) => {
                    let error = error.clone();
                    catch_panic(move || Err(f(error)))
                }
            };
            let _ = out.complete(next);
        })
    }

    /// Handle a failure synchronously.
    ///
    /// `f` may produce a replacement value or a new error.
    pub fn recover<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Result<T, Error> + 'static,
    {
        self.derive(move |result, out| {
            let next = match result {
                Ok(value) => Ok(value.clone()),
                Err(error) => {
                    let error = error.clone();
                    catch_panic(move || f(error))
                }
            };
            let _ = out.complete(next);
        })
    }

    /// Handle a failure with another asynchronous operation, once.
    ///
    /// For repeated attempts with backoff, see
    /// [`recover_with_backoff`](Promise::recover_with_backoff).
    pub fn recover_with<F>(&self, f: F) -> Promise<T>
    where
        F: FnOnce(Error) -> Promise<T> + 'static,
    {
        self.derive(move |result, out| match result {
            Ok(value) => {
                let _ = out.succeed(value.clone());
            }
            Err(error) => {
                let error = error.clone();
                match catch_panic(move || Ok(f(error))) {
                    Ok(replacement) => forward(&replacement, out),
                    Err(error) => {
                        let _ = out.fail(error);
                    }
                }
            }
        })
    }

    /// Combine with another promise into a pair.
    ///
    /// Succeeds once both succeed; fails with whichever failure completes
    /// first. Both sides are observed, so a second failure is not reported as
    /// uncaught.
    pub fn merge<U>(&self, other: &Promise<U>) -> Promise<(T, U)>
    where
        U: Clone + 'static,
    {
        let (merged, completer) = Promise::pending();
        let completer = Rc::new(completer);
        let slots: Rc<RefCell<(Option<T>, Option<U>)>> = Rc::new(RefCell::new((None, None)));

        {
            let completer = Rc::clone(&completer);
            let slots = Rc::clone(&slots);
            self.on_complete(move |result| match result {
                Ok(left) => {
                    let pair = {
                        let mut slots = slots.borrow_mut();
                        slots.0 = Some(left.clone());
                        take_pair(&mut slots)
                    };
                    if let Some(pair) = pair {
                        let _ = completer.succeed(pair);
                    }
                }
                Err(error) => fail_once(&completer, error),
            });
        }
        other.on_complete(move |result| match result {
            Ok(right) => {
                let pair = {
                    let mut slots = slots.borrow_mut();
                    slots.1 = Some(right.clone());
                    take_pair(&mut slots)
                };
                if let Some(pair) = pair {
                    let _ = completer.succeed(pair);
                }
            }
            Err(error) => fail_once(&completer, error),
        });
        merged
    }

    /// Run downstream continuations inside `span`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use beampromise::Promise;
    ///
    /// let traced = Promise::success(1)
    ///     .instrument(tracing::info_span!("load_inventory"))
    ///     .map(|n| n + 1);
    /// assert_eq!(traced.value(), Some(2));
    /// ```
    pub fn instrument(&self, span: tracing::Span) -> Promise<T> {
        self.derive(move |result, out| {
            let _entered = span.enter();
            let _ = out.complete(result.clone());
        })
    }
}

fn forward<U: Clone + 'static>(source: &Promise<U>, out: Completer<U>) {
    source.on_complete(move |result| {
        let _ = out.complete(result.clone());
    });
}

fn take_pair<T, U>(slots: &mut (Option<T>, Option<U>)) -> Option<(T, U)> {
    if slots.0.is_some() && slots.1.is_some() {
        slots.0.take().zip(slots.1.take())
    } else {
        None
    }
}

pub(super) fn fail_once<T: 'static>(completer: &Completer<T>, error: &Error) {
    if !completer.is_completed() {
        let _ = completer.fail(error.clone());
    }
}
