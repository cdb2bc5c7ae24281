//! Tests for the recovery loop.

use super::*;
use crate::error::{Error, ErrorKind};
use crate::promise::{Completer, Promise};
use crate::scheduler::{ManualScheduler, Scheduler};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use tracing_test::traced_test;

fn falloff() -> Backoff {
    Backoff::from_secs_f32(&[0.1, 0.25, 0.5, 0.75])
}

fn secs(s: f32) -> Duration {
    Duration::from_secs_f32(s)
}

/// A factory that records every attempt index it is called with.
fn recording_factory(
    calls: &Rc<RefCell<Vec<u32>>>,
    succeed_at: Option<u32>,
) -> impl FnMut(&Error, u32) -> Promise<String> + 'static {
    let calls = calls.clone();
    move |_err: &Error, attempt: u32| {
        calls.borrow_mut().push(attempt);
        if Some(attempt) == succeed_at {
            Promise::success(format!("recovered on {attempt}"))
        } else {
            Promise::failure(format!("ExceptionDuringRecovery {attempt}"))
        }
    }
}

#[test]
fn test_exhaustion_surfaces_last_error() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        scheduler.clone(),
        recording_factory(&calls, None),
    );

    scheduler.run_until_idle();

    let error = recovered.error().expect("recovery should fail");
    assert_eq!(error.to_string(), "ExceptionDuringRecovery 4");
    assert_eq!(*calls.borrow(), vec![0, 1, 2, 3, 4]);
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_success_mid_loop_stops_retrying() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        scheduler.clone(),
        recording_factory(&calls, Some(2)),
    );

    scheduler.run_until_idle();

    assert_eq!(recovered.value().as_deref(), Some("recovered on 2"));
    assert_eq!(*calls.borrow(), vec![0, 1, 2]);
    // Two waits, after attempts 0 and 1; none after the success.
    assert_eq!(scheduler.waits(), vec![secs(0.1), secs(0.25)]);
    assert_eq!(scheduler.pending_timers(), 0);
}

#[test]
fn test_short_table_reuses_last_delay() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(6),
        scheduler.clone(),
        recording_factory(&calls, None),
    );

    scheduler.run_until_idle();

    assert_eq!(calls.borrow().len(), 6);
    assert_eq!(
        scheduler.waits(),
        vec![secs(0.1), secs(0.25), secs(0.5), secs(0.75), secs(0.75)]
    );
    assert!(recovered.is_failed());
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_waits_gate_each_attempt() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        scheduler.clone(),
        recording_factory(&calls, Some(3)),
    );

    // The first attempt runs as soon as the source fails.
    assert_eq!(*calls.borrow(), vec![0]);

    scheduler.advance(Duration::from_millis(50));
    assert_eq!(*calls.borrow(), vec![0]);

    // First wait (0.1s) elapses.
    scheduler.advance(Duration::from_millis(60));
    assert_eq!(*calls.borrow(), vec![0, 1]);

    // Second wait (0.25s) runs from when attempt 1 failed, at 0.1s.
    scheduler.advance(Duration::from_millis(200));
    assert_eq!(*calls.borrow(), vec![0, 1]);
    scheduler.advance(Duration::from_millis(50));
    assert_eq!(*calls.borrow(), vec![0, 1, 2]);
    assert!(!recovered.is_completed());

    scheduler.advance(Duration::from_millis(500));
    assert_eq!(*calls.borrow(), vec![0, 1, 2, 3]);
    assert!(recovered.is_successful());
}

#[test]
fn test_source_success_skips_factory() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::success("fine".to_string()).recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        scheduler.clone(),
        recording_factory(&calls, None),
    );

    assert_eq!(recovered.value().as_deref(), Some("fine"));
    assert!(calls.borrow().is_empty());
    assert!(scheduler.waits().is_empty());
}

#[test]
fn test_factory_receives_latest_error() {
    let scheduler = Rc::new(ManualScheduler::new());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(Backoff::constant(Duration::from_secs(1))).with_max_attempts(3),
        scheduler.clone(),
        {
            let seen = seen.clone();
            move |err: &Error, attempt| {
                seen.borrow_mut().push(err.to_string());
                Promise::failure(format!("attempt {attempt}"))
            }
        },
    );

    scheduler.run_until_idle();

    assert_eq!(*seen.borrow(), vec!["initial", "attempt 0", "attempt 1"]);
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_attempts_are_sequential() {
    let scheduler = Rc::new(ManualScheduler::new());
    let in_flight: Rc<RefCell<Vec<Completer<u32>>>> = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(Backoff::default()).with_max_attempts(3),
        scheduler.clone(),
        {
            let in_flight = in_flight.clone();
            move |_, _| {
                let (attempt, completer) = Promise::pending();
                in_flight.borrow_mut().push(completer);
                attempt
            }
        },
    );

    // Time passing does not start a new attempt while one is in flight.
    scheduler.run_until_idle();
    assert_eq!(in_flight.borrow().len(), 1);

    in_flight.borrow()[0].fail("first").unwrap();
    assert_eq!(in_flight.borrow().len(), 1);
    scheduler.run_until_idle();
    assert_eq!(in_flight.borrow().len(), 2);

    in_flight.borrow()[1].succeed(11).unwrap();
    assert_eq!(recovered.value(), Some(11));
}

#[test]
fn test_non_retryable_error_stops_loop() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff())
            .with_max_attempts(5)
            .retry_if(|err| !err.to_string().ends_with(" 1")),
        scheduler.clone(),
        recording_factory(&calls, None),
    );

    scheduler.run_until_idle();

    assert_eq!(*calls.borrow(), vec![0, 1]);
    assert_eq!(
        recovered.error().map(|e| e.to_string()).as_deref(),
        Some("ExceptionDuringRecovery 1")
    );
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_panicking_factory_counts_as_failed_attempt() {
    let scheduler = Rc::new(ManualScheduler::new());

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(Backoff::default()).with_max_attempts(2),
        scheduler.clone(),
        |_, attempt| {
            if attempt == 0 {
                panic!("factory blew up");
            }
            Promise::success(attempt)
        },
    );

    scheduler.run_until_idle();
    assert_eq!(recovered.value(), Some(1));
}

/// A scheduler whose waits are already over when handed out.
struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn wait(&self, _delay: Duration) -> Promise<()> {
        Promise::success(())
    }
}

struct BrokenScheduler;

impl Scheduler for BrokenScheduler {
    fn wait(&self, _delay: Duration) -> Promise<()> {
        panic!("timer wheel exploded")
    }
}

#[test]
fn test_panicking_retry_predicate_fails_output() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff())
            .with_max_attempts(5)
            .retry_if(|_| panic!("predicate exploded")),
        scheduler.clone(),
        recording_factory(&calls, None),
    );

    scheduler.run_until_idle();

    assert!(recovered.is_failed());
    let error = recovered.error().unwrap();
    assert_eq!(error.kind(), ErrorKind::Panicked);
    assert!(error.to_string().contains("predicate exploded"));
    assert_eq!(*calls.borrow(), vec![0]);
    assert!(scheduler.waits().is_empty());
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_panicking_hook_fails_output() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff_hooked(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        scheduler.clone(),
        recording_factory(&calls, Some(3)),
        |_: &RecoveryEvent<'_>| panic!("hook exploded"),
    );

    scheduler.run_until_idle();

    assert!(recovered.is_failed());
    assert_eq!(recovered.error().unwrap().kind(), ErrorKind::Panicked);
    assert_eq!(*calls.borrow(), vec![0]);
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_panicking_scheduler_fails_output() {
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(5),
        BrokenScheduler,
        recording_factory(&calls, Some(3)),
    );

    assert!(recovered.is_failed());
    let error = recovered.error().unwrap();
    assert_eq!(error.kind(), ErrorKind::Panicked);
    assert!(error.to_string().contains("timer wheel exploded"));
    assert_eq!(*calls.borrow(), vec![0]);
    drop(recovered.on_error(|_| {}));
}

#[test]
fn test_immediate_waits_do_not_grow_the_stack() {
    const SUCCEED_AT: u32 = 20_000;
    let calls = Rc::new(RefCell::new(0u32));

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(Backoff::default()),
        ImmediateScheduler,
        {
            let calls = calls.clone();
            move |_, attempt| {
                *calls.borrow_mut() += 1;
                if attempt == SUCCEED_AT {
                    Promise::success(attempt)
                } else {
                    Promise::failure(format!("ExceptionDuringRecovery {attempt}"))
                }
            }
        },
    );

    assert_eq!(recovered.value(), Some(SUCCEED_AT));
    assert_eq!(*calls.borrow(), SUCCEED_AT + 1);
}

#[test]
fn test_dropping_output_cancels_loop() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()),
        scheduler.clone(),
        recording_factory(&calls, None),
    );
    assert_eq!(*calls.borrow(), vec![0]);

    drop(recovered);
    scheduler.run_until_idle();

    assert_eq!(*calls.borrow(), vec![0]);
    assert_eq!(scheduler.pending_timers(), 0);
}

#[test]
fn test_chained_output_keeps_loop_alive() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let length = Promise::<String>::failure("initial")
        .recover_with_backoff(
            RecoveryPolicy::new(falloff()),
            scheduler.clone(),
            recording_factory(&calls, Some(2)),
        )
        .map(|s| s.len());

    scheduler.run_until_idle();

    assert_eq!(*calls.borrow(), vec![0, 1, 2]);
    assert_eq!(length.value(), Some("recovered on 2".len()));
}

#[test]
fn test_uncapped_policy_retries_until_success() {
    let scheduler = Rc::new(ManualScheduler::new());
    let calls = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<String>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(Backoff::constant(Duration::from_secs(30))),
        scheduler.clone(),
        recording_factory(&calls, Some(20)),
    );

    scheduler.run_until_idle();

    assert!(recovered.is_successful());
    assert_eq!(calls.borrow().len(), 21);
    assert_eq!(scheduler.now(), Duration::from_secs(600));
}

#[test]
fn test_hook_sees_every_failed_attempt() {
    let scheduler = Rc::new(ManualScheduler::new());
    let events = Rc::new(RefCell::new(Vec::new()));

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff_hooked(
        RecoveryPolicy::new(falloff()).with_max_attempts(3),
        scheduler.clone(),
        |_, attempt| Promise::failure(format!("ExceptionDuringRecovery {attempt}")),
        {
            let events = events.clone();
            move |event: &RecoveryEvent<'_>| {
                events
                    .borrow_mut()
                    .push((event.attempt, event.error.to_string(), event.next_delay));
            }
        },
    );

    scheduler.run_until_idle();

    assert_eq!(
        *events.borrow(),
        vec![
            (0, "ExceptionDuringRecovery 0".to_string(), Some(secs(0.1))),
            (1, "ExceptionDuringRecovery 1".to_string(), Some(secs(0.25))),
            (2, "ExceptionDuringRecovery 2".to_string(), None),
        ]
    );
    assert_eq!(recovered.error().unwrap().kind(), ErrorKind::Operation);
    drop(recovered.on_error(|_| {}));
}

#[traced_test]
#[test]
fn test_attempts_are_logged() {
    let scheduler = Rc::new(ManualScheduler::new());

    let recovered = Promise::<u32>::failure("initial").recover_with_backoff(
        RecoveryPolicy::new(falloff()).with_max_attempts(2),
        scheduler.clone(),
        |_, attempt| Promise::failure(format!("ExceptionDuringRecovery {attempt}")),
    );
    scheduler.run_until_idle();
    drop(recovered.on_error(|_| {}));

    assert!(logs_contain("waiting before retry"));
    assert!(logs_contain("recovery attempts exhausted"));
}
