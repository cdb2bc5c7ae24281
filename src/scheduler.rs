//! Scheduler capabilities used for time-based waits.
//!
//! Promises never sleep. Anything that needs to wait (the recovery engine
//! between attempts) asks a [`Scheduler`] for a promise that completes after
//! the delay, and control returns to the caller immediately.
//!
//! [`ManualScheduler`] is a virtual clock driven by the host (or a test) one
//! step at a time. With the `async` feature, [`TokioScheduler`] backs waits
//! with `tokio::time::sleep` on the current `LocalSet`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use crate::promise::{Completer, Promise};

/// Something that can complete a promise after a delay.
///
/// Implementations should complete the returned promise on a later tick and
/// never block the caller. A wait that is already complete when returned is
/// still accepted: the recovery loop consumes it in place and moves on to the
/// next attempt without growing the stack.
pub trait Scheduler {
    /// A promise that succeeds once `delay` has elapsed.
    fn wait(&self, delay: Duration) -> Promise<()>;
}

impl<S: Scheduler + ?Sized> Scheduler for &S {
    fn wait(&self, delay: Duration) -> Promise<()> {
        (**self).wait(delay)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Rc<S> {
    fn wait(&self, delay: Duration) -> Promise<()> {
        (**self).wait(delay)
    }
}

impl<S: Scheduler + ?Sized> Scheduler for Box<S> {
    fn wait(&self, delay: Duration) -> Promise<()> {
        (**self).wait(delay)
    }
}

/// A deterministic scheduler with a virtual clock.
///
/// Nothing fires until the clock is moved with [`advance`] or
/// [`run_until_idle`]. Timers fire in deadline order; timers with the same
/// deadline fire in the order they were requested.
///
/// [`advance`]: ManualScheduler::advance
/// [`run_until_idle`]: ManualScheduler::run_until_idle
///
/// # Example
///
/// ```rust
/// use beampromise::scheduler::{ManualScheduler, Scheduler};
/// use std::time::Duration;
///
/// let scheduler = ManualScheduler::new();
/// let wait = scheduler.wait(Duration::from_millis(250));
///
/// scheduler.advance(Duration::from_millis(100));
/// assert!(!wait.is_completed());
///
/// scheduler.advance(Duration::from_millis(150));
/// assert!(wait.is_successful());
/// assert_eq!(scheduler.now(), Duration::from_millis(250));
/// ```
#[derive(Debug, Default)]
pub struct ManualScheduler {
    timeline: RefCell<Timeline>,
}

#[derive(Debug, Default)]
struct Timeline {
    now: Duration,
    next_seq: u64,
    timers: BTreeMap<(Duration, u64), Completer<()>>,
    waits: Vec<Duration>,
}

impl ManualScheduler {
    /// A scheduler whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.timeline.borrow().now
    }

    /// Number of waits that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.timeline.borrow().timers.len()
    }

    /// Every delay requested so far, in request order.
    pub fn waits(&self) -> Vec<Duration> {
        self.timeline.borrow().waits.clone()
    }

    /// Move the clock forward by `by`, firing every timer that falls due.
    ///
    /// Timers requested by continuations while advancing fire in the same call
    /// if their deadline is inside the window. Returns the number of timers
    /// fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let fired = self.fire_while(|deadline| deadline <= target);
        self.timeline.borrow_mut().now = target;
        fired
    }

    /// Fire timers until none are left, jumping the clock to each deadline.
    ///
    /// Returns the number of timers fired.
    pub fn run_until_idle(&self) -> usize {
        self.fire_while(|_| true)
    }

    fn fire_while(&self, mut due: impl FnMut(Duration) -> bool) -> usize {
        let mut fired = 0;
        loop {
            let next = {
                let mut timeline = self.timeline.borrow_mut();
                let key = match timeline.timers.keys().next() {
                    Some(&key) if due(key.0) => key,
                    _ => break,
                };
                timeline.now = timeline.now.max(key.0);
                timeline.timers.remove(&key)
            };
            // Completing runs continuations, which may schedule more timers.
            if let Some(completer) = next {
                let _ = completer.succeed(());
                fired += 1;
            }
        }
        fired
    }
}

impl Scheduler for ManualScheduler {
    fn wait(&self, delay: Duration) -> Promise<()> {
        let (promise, completer) = Promise::pending();
        let mut timeline = self.timeline.borrow_mut();
        let key = (timeline.now + delay, timeline.next_seq);
        timeline.next_seq += 1;
        timeline.waits.push(delay);
        timeline.timers.insert(key, completer);
        tracing::trace!(delay = ?delay, deadline = ?key.0, "timer scheduled");
        promise
    }
}

/// A scheduler backed by the tokio timer.
///
/// Waits are spawned with [`tokio::task::spawn_local`], so they must be
/// requested from inside a [`tokio::task::LocalSet`].
#[cfg(feature = "async")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioScheduler;

#[cfg(feature = "async")]
impl Scheduler for TokioScheduler {
    fn wait(&self, delay: Duration) -> Promise<()> {
        let (promise, completer) = Promise::pending();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            let _ = completer.succeed(());
        });
        promise
    }
}
