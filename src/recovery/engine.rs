//! The retry-with-backoff loop behind `recover_with_backoff`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::policy::RecoveryPolicy;
use crate::error::{catch_panic, Error};
use crate::promise::{Cell, Promise, PromiseId};
use crate::scheduler::Scheduler;

/// Information about a failed recovery attempt, passed to hooks.
#[derive(Debug, Clone)]
pub struct RecoveryEvent<'a> {
    /// The promise being recovered.
    pub promise: PromiseId,
    /// Which attempt just failed (0-indexed).
    pub attempt: u32,
    /// The error from the failed attempt.
    pub error: &'a Error,
    /// Wait before the next attempt, or `None` if the loop is giving up.
    pub next_delay: Option<Duration>,
}

type Hook = Box<dyn Fn(&RecoveryEvent<'_>)>;

/// One in-flight recovery loop.
///
/// The loop is the output cell's only producer. Once nothing else holds the
/// cell and nothing is registered on it, the loop stops at its next decision
/// point.
struct RecoveryState<T, S, F> {
    policy: RecoveryPolicy,
    scheduler: S,
    factory: RefCell<F>,
    on_retry: Option<Hook>,
    output: Rc<Cell<T>>,
    id: PromiseId,
}

/// Where the loop resumes.
enum Step<T> {
    Attempt { last_error: Error, index: u32 },
    Attempted { outcome: Result<T, Error>, index: u32 },
    Waited { outcome: Result<(), Error>, last_error: Error, index: u32 },
}

impl<T, S, F> RecoveryState<T, S, F>
where
    T: Clone + 'static,
    S: Scheduler + 'static,
    F: FnMut(&Error, u32) -> Promise<T> + 'static,
{
    /// Run steps until the loop finishes or has to wait for a pending promise.
    ///
    /// Promises that are already settled are consumed in place, so a factory
    /// or scheduler that completes synchronously never grows the stack.
    fn drive(self: Rc<Self>, mut step: Step<T>) {
        loop {
            step = match step {
                Step::Attempt { last_error, index } => {
                    if self.abandoned() {
                        tracing::debug!(promise = %self.id, attempt = index, "recovery abandoned by consumer");
                        return;
                    }
                    tracing::debug!(promise = %self.id, attempt = index, "starting recovery attempt");
                    let started = {
                        let mut factory = self.factory.borrow_mut();
                        catch_panic(|| Ok((*factory)(&last_error, index)))
                    };
                    match started {
                        Ok(attempt) => match take_settled(&attempt) {
                            Some(outcome) => Step::Attempted { outcome, index },
                            None => {
                                let this = Rc::clone(&self);
                                attempt.on_complete(move |result| {
                                    this.drive(Step::Attempted {
                                        outcome: result.clone(),
                                        index,
                                    })
                                });
                                return;
                            }
                        },
                        Err(error) => Step::Attempted {
                            outcome: Err(error),
                            index,
                        },
                    }
                }
                Step::Attempted {
                    outcome: Ok(value), ..
                } => {
                    self.finish(Ok(value));
                    return;
                }
                Step::Attempted {
                    outcome: Err(error),
                    index,
                } => {
                    if self.abandoned() {
                        tracing::debug!(promise = %self.id, attempt = index, "recovery abandoned by consumer");
                        return;
                    }
                    let delay = match self.next_delay(&error, index) {
                        Ok(Some(delay)) => delay,
                        Ok(None) => {
                            self.finish(Err(error));
                            return;
                        }
                        Err(panicked) => {
                            self.finish(Err(panicked));
                            return;
                        }
                    };
                    let waiting = catch_panic(|| Ok(self.scheduler.wait(delay)));
                    match waiting {
                        Ok(wait) => match take_settled(&wait) {
                            Some(outcome) => Step::Waited {
                                outcome,
                                last_error: error,
                                index,
                            },
                            None => {
                                let this = Rc::clone(&self);
                                wait.on_complete(move |waited| {
                                    this.drive(Step::Waited {
                                        outcome: waited.clone(),
                                        last_error: error,
                                        index,
                                    })
                                });
                                return;
                            }
                        },
                        Err(panicked) => {
                            self.finish(Err(panicked));
                            return;
                        }
                    }
                }
                Step::Waited {
                    outcome: Ok(()),
                    last_error,
                    index,
                } => Step::Attempt {
                    last_error,
                    index: index + 1,
                },
                Step::Waited {
                    outcome: Err(scheduler_error),
                    ..
                } => {
                    self.finish(Err(scheduler_error));
                    return;
                }
            };
        }
    }

    /// Decide what follows failed attempt `index`.
    ///
    /// `Ok(None)` means give up with `error`. `Err` carries a panic raised by
    /// the retry predicate or the hook.
    fn next_delay(&self, error: &Error, index: u32) -> Result<Option<Duration>, Error> {
        let retryable = catch_panic(|| Ok(self.policy.is_retryable(error)))?;
        if !retryable {
            self.notify(index, error, None)?;
            tracing::debug!(promise = %self.id, attempt = index, error = %error, "error is not retryable");
            return Ok(None);
        }

        if self.policy.is_exhausted(index) {
            self.notify(index, error, None)?;
            tracing::debug!(
                promise = %self.id,
                attempts = index + 1,
                error = %error,
                "recovery attempts exhausted"
            );
            return Ok(None);
        }

        let delay = self.policy.delay_after(index);
        self.notify(index, error, Some(delay))?;
        tracing::debug!(
            promise = %self.id,
            attempt = index,
            delay = ?delay,
            error = %error,
            "recovery attempt failed; waiting before retry"
        );
        Ok(Some(delay))
    }

    fn notify(&self, attempt: u32, error: &Error, next_delay: Option<Duration>) -> Result<(), Error> {
        match &self.on_retry {
            Some(hook) => catch_panic(|| {
                hook(&RecoveryEvent {
                    promise: self.id,
                    attempt,
                    error,
                    next_delay,
                });
                Ok(())
            }),
            None => Ok(()),
        }
    }

    fn abandoned(&self) -> bool {
        Rc::strong_count(&self.output) == 1 && !self.output.has_continuations()
    }

    fn finish(&self, result: Result<T, Error>) {
        let _ = self.output.complete(result);
    }
}

/// The outcome of an already settled promise, observing its error.
fn take_settled<U: Clone + 'static>(promise: &Promise<U>) -> Option<Result<U, Error>> {
    let outcome = promise.result()?;
    promise.cell.mark_observed();
    Some(outcome)
}

impl<T: Clone + 'static> Promise<T> {
    /// Recover from a failure by retrying with backoff.
    ///
    /// When this promise fails, `factory(last_error, attempt)` is called with
    /// `attempt` starting at 0. A successful attempt completes the returned
    /// promise. After a failed attempt the loop either gives up (the policy's
    /// attempt cap is reached, or its `retry_if` predicate rejects the error)
    /// and fails with that attempt's error, or asks `scheduler` to wait the
    /// backoff delay for that attempt and calls the factory again.
    ///
    /// Attempts are strictly sequential. If this promise succeeds the factory
    /// is never called. Dropping every handle to the returned promise stops
    /// the loop at its next decision point.
    ///
    /// # Example
    ///
    /// ```rust
    /// use beampromise::recovery::{Backoff, RecoveryPolicy};
    /// use beampromise::scheduler::ManualScheduler;
    /// use beampromise::Promise;
    /// use std::rc::Rc;
    ///
    /// let scheduler = Rc::new(ManualScheduler::new());
    /// let policy = RecoveryPolicy::new(Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]))
    ///     .with_max_attempts(5);
    ///
    /// let recovered = Promise::<u32>::failure("offline").recover_with_backoff(
    ///     policy,
    ///     scheduler.clone(),
    ///     |_err, attempt| {
    ///         if attempt == 2 {
    ///             Promise::success(attempt)
    ///         } else {
    ///             Promise::failure(format!("still offline {attempt}"))
    ///         }
    ///     },
    /// );
    ///
    /// scheduler.run_until_idle();
    /// assert_eq!(recovered.value(), Some(2));
    /// ```
    pub fn recover_with_backoff<S, F>(
        &self,
        policy: RecoveryPolicy,
        scheduler: S,
        factory: F,
    ) -> Promise<T>
    where
        S: Scheduler + 'static,
        F: FnMut(&Error, u32) -> Promise<T> + 'static,
    {
        self.start_recovery(policy, scheduler, factory, None)
    }

    /// Like [`recover_with_backoff`](Promise::recover_with_backoff), calling
    /// `on_retry` after every failed attempt.
    ///
    /// The hook is synchronous and should not block; use it for logging or
    /// metrics.
    pub fn recover_with_backoff_hooked<S, F, H>(
        &self,
        policy: RecoveryPolicy,
        scheduler: S,
        factory: F,
        on_retry: H,
    ) -> Promise<T>
    where
        S: Scheduler + 'static,
        F: FnMut(&Error, u32) -> Promise<T> + 'static,
        H: Fn(&RecoveryEvent<'_>) + 'static,
    {
        self.start_recovery(policy, scheduler, factory, Some(Box::new(on_retry)))
    }

    fn start_recovery<S, F>(
        &self,
        policy: RecoveryPolicy,
        scheduler: S,
        factory: F,
        on_retry: Option<Hook>,
    ) -> Promise<T>
    where
        S: Scheduler + 'static,
        F: FnMut(&Error, u32) -> Promise<T> + 'static,
    {
        let (recovered, _) = Promise::pending();
        let output = Rc::clone(&recovered.cell);
        let id = recovered.id();

        self.on_complete(move |result| match result {
            Ok(value) => {
                let _ = output.complete(Ok(value.clone()));
            }
            Err(error) => {
                tracing::debug!(promise = %id, error = %error, "starting recovery");
                let state = Rc::new(RecoveryState {
                    policy,
                    scheduler,
                    factory: RefCell::new(factory),
                    on_retry,
                    output,
                    id,
                });
                state.drive(Step::Attempt {
                    last_error: error.clone(),
                    index: 0,
                });
            }
        });
        recovered
    }
}
