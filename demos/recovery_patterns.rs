//! Recovery Patterns Example
//!
//! Demonstrates backoff recovery for promise-based operations on a real
//! timer. Shows practical patterns including:
//! - Table-driven backoff with an attempt cap
//! - Generated backoff tables
//! - Conditional recovery (retry_if)
//! - Recovery with an observability hook

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use beampromise::prelude::*;
use beampromise::RecoveryEvent;
use tokio::task::LocalSet;

// ==================== Table-driven Backoff ====================

/// Example 1: The classic falloff table
///
/// Retries a flaky download up to five times, waiting 0.1s, 0.25s, 0.5s and
/// then 0.75s for every later attempt.
async fn example_falloff_table() {
    println!("\n=== Example 1: Falloff Table ===");

    let attempts = Rc::new(Cell::new(0u32));
    let policy = RecoveryPolicy::new(Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]))
        .with_max_attempts(5);

    let download = Promise::<String>::failure("connection reset").recover_with_backoff(
        policy,
        TokioScheduler,
        {
            let attempts = attempts.clone();
            move |err, attempt| {
                attempts.set(attempts.get() + 1);
                println!("  Attempt {} after: {}", attempt, err);
                if attempt < 2 {
                    Promise::failure(format!("still unreachable ({attempt})"))
                } else {
                    Promise::success("manifest.json".to_string())
                }
            }
        },
    );

    match download.await {
        Ok(file) => println!("Downloaded {} after {} attempts", file, attempts.get()),
        Err(err) => println!("Gave up after {} attempts: {}", attempts.get(), err),
    }
}

// ==================== Generated Tables ====================

/// Example 2: Comparing generated backoff tables
fn example_backoff_tables() {
    println!("\n=== Example 2: Backoff Tables ===");

    let base = Duration::from_millis(100);
    let tables = [
        ("Constant", Backoff::constant(base)),
        ("Linear", Backoff::linear(base, 5)),
        ("Exponential", Backoff::exponential(base, 5)),
        ("Fibonacci", Backoff::fibonacci(base, 5)),
        (
            "Exponential capped at 500ms",
            Backoff::exponential(base, 8).with_max_delay(Duration::from_millis(500)),
        ),
    ];

    for (name, backoff) in tables {
        println!("{} delays:", name);
        for attempt in 0..6 {
            println!("  After attempt {}: {:?}", attempt, backoff.delay_for(attempt));
        }
    }
}

// ==================== Conditional Recovery ====================

#[derive(Debug)]
enum HttpError {
    Timeout,
    ServerError(u16),
    ClientError(u16),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::Timeout => write!(f, "request timed out"),
            HttpError::ServerError(code) => write!(f, "server error: {}", code),
            HttpError::ClientError(code) => write!(f, "client error: {}", code),
        }
    }
}

impl std::error::Error for HttpError {}

/// Example 3: Only retry transient failures
///
/// A 4xx response will not get better by asking again, so the policy stops
/// as soon as one comes back.
async fn example_conditional_recovery() {
    println!("\n=== Example 3: Conditional Recovery ===");

    let responses = Rc::new(Cell::new(0u32));
    let policy = RecoveryPolicy::new(Backoff::constant(Duration::from_millis(50)))
        .with_max_attempts(5)
        .retry_if(|err| {
            !matches!(err.downcast_ref::<HttpError>(), Some(HttpError::ClientError(_)))
        });

    let response = Promise::<u16>::failure(Error::new(HttpError::Timeout)).recover_with_backoff(
        policy,
        TokioScheduler,
        {
            let responses = responses.clone();
            move |_, attempt| {
                responses.set(responses.get() + 1);
                let error = match attempt {
                    0 => HttpError::ServerError(503),
                    _ => HttpError::ClientError(401),
                };
                println!("  Attempt {}: {}", attempt, error);
                Promise::failure(Error::new(error))
            }
        },
    );

    let result = response.await;
    println!("Result: {:?}", result.map_err(|e| e.to_string()));
    println!("Total attempts: {}", responses.get());
}

// ==================== Recovery with Observability ====================

/// Example 4: Hooks for logging and metrics
async fn example_recovery_hooks() {
    println!("\n=== Example 4: Recovery Hooks ===");

    let recovered = Promise::<u32>::failure("cold cache").recover_with_backoff_hooked(
        RecoveryPolicy::new(Backoff::exponential(Duration::from_millis(20), 4))
            .with_max_attempts(4),
        TokioScheduler,
        |_, attempt| {
            if attempt == 3 {
                Promise::success(42)
            } else {
                Promise::failure("cache miss")
            }
        },
        |event: &RecoveryEvent<'_>| match event.next_delay {
            Some(delay) => println!(
                "  [hook] attempt {} failed ({}); retrying in {:?}",
                event.attempt, event.error, delay
            ),
            None => println!("  [hook] attempt {} failed; giving up", event.attempt),
        },
    );

    println!("Result: {:?}", recovered.await.map_err(|e| e.to_string()));
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    LocalSet::new()
        .run_until(async {
            example_falloff_table().await;
            example_backoff_tables();
            example_conditional_recovery().await;
            example_recovery_hooks().await;
        })
        .await;
}
