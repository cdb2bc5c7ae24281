//! Bridges between promises and `std::future`.
//!
//! Awaiting a promise observes its outcome like any other continuation:
//!
//! ```rust
//! use beampromise::Promise;
//! use futures::executor::block_on;
//! use std::future::IntoFuture;
//!
//! let (promise, completer) = Promise::pending();
//! completer.succeed("ready").unwrap();
//!
//! assert_eq!(block_on(promise.into_future()), Ok("ready"));
//! ```

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::FutureExt;

use crate::error::Error;
use crate::promise::{Promise, PromiseId};

/// Future returned by awaiting a [`Promise`].
///
/// Resolves to the promise's result. If the promise is dropped while still
/// pending (its completer went away without completing), it resolves to an
/// [`ErrorKind::Abandoned`](crate::ErrorKind::Abandoned) error.
#[derive(Debug)]
#[must_use = "futures do nothing unless polled"]
pub struct PromiseFuture<T> {
    id: PromiseId,
    receiver: oneshot::Receiver<Result<T, Error>>,
}

impl<T: Clone + 'static> IntoFuture for Promise<T> {
    type Output = Result<T, Error>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (sender, receiver) = oneshot::channel();
        self.on_complete(move |result| {
            let _ = sender.send(result.clone());
        });
        PromiseFuture {
            id: self.id(),
            receiver,
        }
    }
}

impl<T> Future for PromiseFuture<T> {
    type Output = Result<T, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let id = self.id;
        self.receiver
            .poll_unpin(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::abandoned(id))))
    }
}

#[cfg(feature = "async")]
impl<T: 'static> Promise<T> {
    /// Drive `future` on the current `LocalSet` and complete a promise with
    /// its output.
    ///
    /// Must be called from inside a [`tokio::task::LocalSet`].
    pub fn from_future<F>(future: F) -> Promise<T>
    where
        F: Future<Output = Result<T, Error>> + 'static,
    {
        let (promise, completer) = Promise::pending();
        tokio::task::spawn_local(async move {
            let _ = completer.complete(future.await);
        });
        promise
    }
}


#[cfg(all(test, feature = "async"))]
mod tokio_tests {
    use super::*;
    use crate::recovery::{Backoff, RecoveryPolicy};
    use crate::scheduler::TokioScheduler;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::task::LocalSet;

    #[tokio::test]
    async fn test_from_future_completes_promise() {
        LocalSet::new()
            .run_until(async {
                let promise = Promise::from_future(async { Ok::<_, Error>(5) });
                assert_eq!(promise.map(|n| n * 2).await, Ok(10));
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_on_tokio_timer() {
        LocalSet::new()
            .run_until(async {
                let calls = Rc::new(Cell::new(0u32));
                let start = tokio::time::Instant::now();

                let recovered = Promise::<u32>::failure("offline").recover_with_backoff(
                    RecoveryPolicy::new(Backoff::from_table([
                        Duration::from_secs(1),
                        Duration::from_secs(2),
                    ]))
                    .with_max_attempts(5),
                    TokioScheduler,
                    {
                        let calls = calls.clone();
                        move |_, attempt| {
                            calls.set(calls.get() + 1);
                            if attempt == 3 {
                                Promise::success(attempt)
                            } else {
                                Promise::failure("still offline")
                            }
                        }
                    },
                );

                assert_eq!(recovered.await, Ok(3));
                assert_eq!(calls.get(), 4);
                // Waits of 1s, 2s, 2s between the four attempts.
                assert!(start.elapsed() >= Duration::from_secs(5));
            })
            .await;
    }
}
