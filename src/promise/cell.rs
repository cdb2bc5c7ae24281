//! The shared completion state behind every `Promise` handle.

use std::cell::{Cell as Flag, RefCell};
use std::fmt;
use std::mem;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::{panic_message, AlreadyCompleted, Error};
use crate::uncaught;

/// Identifies one result cell, for diagnostics.
///
/// Ids are allocated from a per-thread counter and are unique on that thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PromiseId(u64);

impl PromiseId {
    fn next() -> Self {
        thread_local! {
            static NEXT: Flag<u64> = const { Flag::new(0) };
        }
        NEXT.with(|next| {
            let id = next.get();
            next.set(id + 1);
            PromiseId(id)
        })
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        PromiseId(raw)
    }

    /// The numeric value of this id.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromiseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "promise#{}", self.0)
    }
}

pub(crate) type Continuation<T> = Box<dyn FnOnce(&Result<T, Error>)>;

enum State<T> {
    Pending(Vec<Continuation<T>>),
    Settled(Rc<Result<T, Error>>),
}

pub(crate) struct Cell<T> {
    id: PromiseId,
    state: RefCell<State<T>>,
    observed: Flag<bool>,
}

impl<T> Cell<T> {
    pub(crate) fn pending() -> Self {
        Self {
            id: PromiseId::next(),
            state: RefCell::new(State::Pending(Vec::new())),
            observed: Flag::new(false),
        }
    }

    pub(crate) fn settled(result: Result<T, Error>) -> Self {
        Self {
            id: PromiseId::next(),
            state: RefCell::new(State::Settled(Rc::new(result))),
            observed: Flag::new(false),
        }
    }

    pub(crate) fn id(&self) -> PromiseId {
        self.id
    }

    /// Transition out of pending and fan out to every registered continuation.
    ///
    /// Continuations run synchronously, in registration order, before this
    /// returns. The state is settled before the first one runs, so anything a
    /// continuation registers on this cell fires immediately.
    pub(crate) fn complete(&self, result: Result<T, Error>) -> Result<(), AlreadyCompleted> {
        let settled = Rc::new(result);
        let continuations = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Settled(_) => {
                    tracing::warn!(promise = %self.id, "completion ignored: promise already completed");
                    return Err(AlreadyCompleted { id: self.id });
                }
                State::Pending(continuations) => {
                    let continuations = mem::take(continuations);
                    *state = State::Settled(Rc::clone(&settled));
                    continuations
                }
            }
        };

        tracing::trace!(
            promise = %self.id,
            success = settled.is_ok(),
            continuations = continuations.len(),
            "promise completed"
        );

        for continuation in continuations {
            run(self.id, continuation, &settled);
        }
        Ok(())
    }

    /// Attach a continuation; fires now if the cell already completed.
    ///
    /// `observes_errors` records that a failure of this cell has somewhere to
    /// go, which suppresses the uncaught report when the cell is dropped.
    pub(crate) fn register(&self, continuation: Continuation<T>, observes_errors: bool) {
        if observes_errors {
            self.observed.set(true);
        }
        let settled = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                State::Pending(continuations) => {
                    continuations.push(continuation);
                    return;
                }
                State::Settled(result) => Rc::clone(result),
            }
        };
        run(self.id, continuation, &settled);
    }

    pub(crate) fn mark_observed(&self) {
        self.observed.set(true);
    }

    /// Returns true while the cell is pending with continuations waiting on it.
    pub(crate) fn has_continuations(&self) -> bool {
        matches!(&*self.state.borrow(), State::Pending(continuations) if !continuations.is_empty())
    }

    pub(crate) fn is_completed(&self) -> bool {
        matches!(*self.state.borrow(), State::Settled(_))
    }

    pub(crate) fn with_result<R>(&self, f: impl FnOnce(Option<&Result<T, Error>>) -> R) -> R {
        match &*self.state.borrow() {
            State::Pending(_) => f(None),
            State::Settled(result) => f(Some(&**result)),
        }
    }

    pub(crate) fn state_name(&self) -> &'static str {
        match &*self.state.borrow() {
            State::Pending(_) => "pending",
            State::Settled(result) if result.is_ok() => "succeeded",
            State::Settled(_) => "failed",
        }
    }
}

fn run<T>(id: PromiseId, continuation: Continuation<T>, result: &Result<T, Error>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| continuation(result))) {
        tracing::error!(
            promise = %id,
            panic = %panic_message(payload.as_ref()),
            "promise continuation panicked"
        );
    }
}

impl<T> Drop for Cell<T> {
    fn drop(&mut self) {
        if self.observed.get() {
            return;
        }
        if let State::Settled(result) = self.state.get_mut() {
            if let Err(error) = &**result {
                uncaught::report(self.id, error);
            }
        }
    }
}
