//! Failure recovery with backoff and bounded retries.
//!
//! The pieces follow the "pure core, imperative shell" split:
//!
//! - **Pure data**: [`Backoff`] tables and [`RecoveryPolicy`] describe *what*
//!   retry behavior you want and are trivial to test, clone and load from
//!   configuration.
//! - **Driver**: [`Promise::recover_with_backoff`](crate::Promise::recover_with_backoff)
//!   runs the loop, using an injected [`Scheduler`](crate::scheduler::Scheduler)
//!   for every wait so that simulated time can be fast-forwarded in tests.
//!
//! # Loop semantics
//!
//! The failure that starts recovery is not itself an attempt. Attempt `k`
//! (0-indexed) calls the factory with the latest error and `k`. If attempt `k`
//! fails and the cap allows another, the loop waits `backoff.delay_for(k)`,
//! which reuses the last table entry once `k` runs past the end of the table.
//!
//! With a cap of `N` and a factory that always fails, the factory runs
//! exactly `N` times and the final failure is the error from attempt `N - 1`.
//!
//! # Backoff strategies
//!
//! - **Table**: explicit delays, e.g. `[0.1, 0.25, 0.5, 0.75]` seconds
//! - **Constant**: fixed delay between attempts
//! - **Linear**: 100ms, 200ms, 300ms, ...
//! - **Exponential**: 100ms, 200ms, 400ms, ...
//! - **Fibonacci**: 100ms, 100ms, 200ms, 300ms, 500ms, ...
//!
//! Enable the `jitter` feature to randomize delays and avoid synchronized
//! retries across clients.

mod backoff;
mod engine;
mod policy;

pub use backoff::{Backoff, JitterStrategy};
pub use engine::RecoveryEvent;
pub use policy::RecoveryPolicy;

#[cfg(test)]
mod tests;
