//! # Beampromise
//!
//! Single-threaded result cells with a combinator algebra and backoff-driven
//! failure recovery.
//!
//! ## Philosophy
//!
//! A [`Promise`] is a value that settles once. Everything else is derived:
//! - **Cells** complete exactly once and fan out synchronously, in order
//! - **Combinators** build new cells without touching their sources
//! - **Recovery** is pure data ([`RecoveryPolicy`]) driven by an injected
//!   [`Scheduler`], so time can be simulated in tests
//!
//! ## Quick Example
//!
//! ```rust
//! use beampromise::prelude::*;
//! use std::rc::Rc;
//! use std::time::Duration;
//!
//! let scheduler = Rc::new(ManualScheduler::new());
//! let (request, completer) = Promise::<String>::pending();
//!
//! let body = request
//!     .map(|text| text.to_uppercase())
//!     .recover_with_backoff(
//!         RecoveryPolicy::new(Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]))
//!             .with_max_attempts(5),
//!         scheduler.clone(),
//!         |_err, attempt| {
//!             if attempt < 2 {
//!                 Promise::failure(format!("attempt {attempt} failed"))
//!             } else {
//!                 Promise::success("CACHED".to_string())
//!             }
//!         },
//!     );
//!
//! completer.fail("connection reset").unwrap();
//! scheduler.run_until_idle();
//!
//! assert_eq!(body.value().as_deref(), Some("CACHED"));
//! assert_eq!(scheduler.now(), Duration::from_secs_f32(0.1) + Duration::from_secs_f32(0.25));
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

pub mod error;
pub mod future;
pub mod promise;
pub mod recovery;
pub mod scheduler;
pub mod testing;
pub mod uncaught;

// Re-exports
pub use error::{AlreadyCompleted, Error, ErrorKind};
pub use future::PromiseFuture;
pub use promise::{Completer, Promise, PromiseId};
pub use recovery::{Backoff, JitterStrategy, RecoveryEvent, RecoveryPolicy};
pub use scheduler::{ManualScheduler, Scheduler};

#[cfg(feature = "async")]
pub use scheduler::TokioScheduler;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, ErrorKind};
    pub use crate::promise::{Completer, Promise};
    pub use crate::recovery::{Backoff, RecoveryPolicy};
    pub use crate::scheduler::{ManualScheduler, Scheduler};

    #[cfg(feature = "async")]
    pub use crate::scheduler::TokioScheduler;
}
