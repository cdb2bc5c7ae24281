//! The uncaught-error hook.
//!
//! A failed promise that is dropped without any error-observing continuation
//! ever having been attached is reported to a single-slot handler. The slot is
//! per thread: promises are `!Send`, so every cell lives and dies on the thread
//! that drives it, and each test thread can install its own handler without
//! affecting the others.
//!
//! The default handler logs the failure at `error` level through `tracing`.
//!
//! # Example
//!
//! ```rust
//! use beampromise::{uncaught, Promise};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let seen = Rc::new(Cell::new(0));
//! let guard = uncaught::install({
//!     let seen = seen.clone();
//!     move |_id, _err| seen.set(seen.get() + 1)
//! });
//!
//! drop(Promise::<()>::failure("nobody listened"));
//! assert_eq!(seen.get(), 1);
//! drop(guard);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Error;
use crate::promise::PromiseId;

/// A handler invoked for failures nobody observed.
pub type UncaughtHandler = Rc<dyn Fn(PromiseId, &Error)>;

thread_local! {
    static HANDLER: RefCell<Option<UncaughtHandler>> = const { RefCell::new(None) };
}

/// Replace the handler for the current thread, returning the previous one.
///
/// `None` in the return value means the default handler was active. Last write
/// wins.
pub fn set_handler<F>(handler: F) -> Option<UncaughtHandler>
where
    F: Fn(PromiseId, &Error) + 'static,
{
    HANDLER.with(|slot| slot.borrow_mut().replace(Rc::new(handler)))
}

/// Restore the default handler for the current thread.
pub fn reset_handler() -> Option<UncaughtHandler> {
    HANDLER.with(|slot| slot.borrow_mut().take())
}

/// Install a handler for the lifetime of the returned guard.
///
/// The previously active handler is put back when the guard drops, which gives
/// tests a setup/teardown pair without global leaks between them.
pub fn install<F>(handler: F) -> UncaughtHandlerGuard
where
    F: Fn(PromiseId, &Error) + 'static,
{
    UncaughtHandlerGuard {
        previous: set_handler(handler),
    }
}

/// Restores the previous uncaught handler on drop.
#[must_use = "the handler is uninstalled as soon as the guard is dropped"]
pub struct UncaughtHandlerGuard {
    previous: Option<UncaughtHandler>,
}

impl fmt::Debug for UncaughtHandlerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UncaughtHandlerGuard")
            .field("restores_default", &self.previous.is_none())
            .finish()
    }
}

impl Drop for UncaughtHandlerGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = HANDLER.try_with(|slot| *slot.borrow_mut() = previous);
    }
}

/// The default handler: log and move on.
pub fn log_handler(id: PromiseId, error: &Error) {
    tracing::error!(promise = %id, kind = %error.kind(), error = %error, "uncaught promise failure");
}

/// A handler that panics, for hosts that want unobserved failures to be fatal.
pub fn panic_handler(id: PromiseId, error: &Error) {
    panic!("uncaught failure in {}: {}", id, error);
}

pub(crate) fn report(id: PromiseId, error: &Error) {
    // Never run a user handler while unwinding: a second panic would abort.
    if std::thread::panicking() {
        log_handler(id, error);
        return;
    }
    let handler = HANDLER
        .try_with(|slot| slot.borrow().clone())
        .ok()
        .flatten();
    match handler {
        Some(handler) => handler(id, error),
        None => log_handler(id, error),
    }
}
