//! Promise Basics Example
//!
//! Walks through the core promise operations on a single thread:
//! - Completing a pending promise
//! - Chaining with map, then and flat_map
//! - Handling and reporting failures
//! - Driving backoff recovery with a virtual clock

use std::rc::Rc;

use beampromise::prelude::*;
use beampromise::uncaught;

// ==================== Completion ====================

/// Example 1: A pending promise completed later
fn example_completion() {
    println!("\n=== Example 1: Completion ===");

    let (profile, completer) = Promise::<String>::pending();
    profile.on_success(|name| println!("  Loaded profile for {}", name));

    println!("Completed yet? {}", profile.is_completed());
    completer.succeed("ada".to_string()).ok();
    println!("Completed yet? {}", profile.is_completed());

    // Only the first completion counts.
    if let Err(err) = completer.succeed("grace".to_string()) {
        println!("Second completion rejected: {}", err);
    }
}

// ==================== Chaining ====================

/// Example 2: Building a pipeline
fn example_chaining() {
    println!("\n=== Example 2: Chaining ===");

    let (config, completer) = Promise::<String>::pending();

    let port = config
        .map(|text| text.trim().to_string())
        .then(|text| text.parse::<u16>().map_err(Error::new))
        .flat_map(|port| Promise::success(format!("listening on {port}")));

    completer.succeed(" 8080 \n".to_string()).ok();
    println!("Pipeline result: {:?}", port.value());
}

// ==================== Failures ====================

/// Example 3: Observing failures
fn example_failures() {
    println!("\n=== Example 3: Failures ===");

    let _guard = uncaught::install(|id, err| println!("  [uncaught] {}: {}", id, err));

    let handled = Promise::<u32>::failure("quota exceeded")
        .on_error(|err| println!("  Handled: {}", err));
    drop(handled);

    // Nobody attached an error handler to this one.
    drop(Promise::<u32>::failure("disk full").map(|n| n + 1));
}

// ==================== Recovery ====================

/// Example 4: Recovery on a virtual clock
fn example_recovery() {
    println!("\n=== Example 4: Recovery ===");

    let scheduler = Rc::new(ManualScheduler::new());
    let policy = RecoveryPolicy::new(Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75]))
        .with_max_attempts(5);

    let recovered = Promise::<u32>::failure("offline").recover_with_backoff(
        policy,
        scheduler.clone(),
        |err, attempt| {
            println!("  Attempt {} (last error: {})", attempt, err);
            Promise::failure(format!("ExceptionDuringRecovery {attempt}"))
        },
    );

    scheduler.run_until_idle();
    println!("Waited {:?} in total", scheduler.now());
    println!("Final error: {:?}", recovered.error().map(|e| e.to_string()));
    drop(recovered.on_error(|_| {}));
}

fn main() {
    tracing_subscriber::fmt().init();

    example_completion();
    example_chaining();
    example_failures();
    example_recovery();
}
