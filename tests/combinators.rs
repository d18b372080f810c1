#![allow(missing_docs)]
#![cfg(not(feature = "loom"))]

use ccf::{
    CompletableFuture, CompletionError, Engine, ExecutionError, Failure,
    config::Config,
    executor::{Executor, ExecutorHandle, Inline, Job},
};
use core::{num::NonZeroUsize, time::Duration};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    thread,
    time::Instant,
};

fn pool_engine(prefix: &str) -> Engine {
    let config = Config::default()
        .with_worker_threads(NonZeroUsize::new(4).unwrap())
        .with_thread_name_prefix(prefix);
    Engine::setup(&config).expect("engine setup must succeed")
}

fn inline_engine() -> Engine {
    Engine::with_executor(Arc::new(Inline))
}

fn delayed<T: Clone + Send + 'static>(engine: &Engine, millis: u64, value: T) -> CompletableFuture<T> {
    engine.supply_async(move || {
        thread::sleep(Duration::from_millis(millis));
        value
    })
}

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn named_pool(prefix: &'static str) -> ExecutorHandle {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(2)
        .thread_name(move |index| format!("{prefix}{index}"))
        .build()
        .unwrap();
    Arc::new(pool)
}

type Sightings = Arc<Mutex<Vec<(&'static str, String)>>>;

/// Returns a callback recording `label` with the name of the thread it runs on.
fn sighting(sightings: &Sightings, label: &'static str) -> impl FnOnce() + Send + 'static {
    let sightings = Arc::clone(sightings);
    move || {
        let name = thread::current().name().unwrap_or_default().to_owned();
        sightings.lock().unwrap().push((label, name));
    }
}

fn assert_all_ran_on(sightings: &Sightings, expected: usize, prefix: &str) {
    let sightings = sightings.lock().unwrap();
    assert_eq!(sightings.len(), expected, "{sightings:?}");
    for (label, name) in sightings.iter() {
        assert!(name.starts_with(prefix), "{label} ran on {name:?}");
    }
}

/// Runs jobs inline and counts them.
#[derive(Default)]
struct CountingExecutor(AtomicUsize);

impl Executor for CountingExecutor {
    fn execute(&self, job: Job) {
        self.0.fetch_add(1, Ordering::Relaxed);
        job();
    }
}

#[test]
fn then_apply_chains_sync_and_async_steps() {
    let engine = pool_engine("apply-pool-");
    let future = engine
        .supply_async(|| 100_u32)
        .then_apply_async(|value| value * 10)
        .then_apply(|value| value.to_string());
    assert_eq!(future.get().unwrap(), "1000");
}

#[test]
fn then_apply_on_resolved_runs_on_calling_thread() {
    let engine = pool_engine("sync-rule-pool-");
    let future = engine
        .resolved("message")
        .then_apply(|value| (value.to_uppercase(), thread::current().id()));
    let (value, thread) = future.get_now((String::new(), thread::current().id())).unwrap();
    assert_eq!(value, "MESSAGE");
    assert_eq!(thread, thread::current().id());
}

#[test]
fn then_apply_async_on_uses_the_given_executor() {
    let engine = inline_engine();
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(3)
        .thread_name(|index| format!("custom-executor-{}", index + 1))
        .build()
        .unwrap();
    let executor: ExecutorHandle = Arc::new(pool);
    let future = engine.resolved("message").then_apply_async_on(
        |value| {
            let name = thread::current().name().map(str::to_owned);
            (value.to_uppercase(), name)
        },
        &executor,
    );
    let (value, name) = future.join().unwrap();
    assert_eq!(value, "MESSAGE");
    assert!(name.unwrap().starts_with("custom-executor-"));
}

#[test]
fn uni_async_variants_run_on_the_default_executor() {
    let engine = pool_engine("uni-default-");
    let sightings = Sightings::default();
    let value = engine.resolved(2_u32);
    let failure = engine.failed::<u32>(Failure::msg("upstream"));

    let then_accept = sighting(&sightings, "then_accept_async");
    let then_compose = sighting(&sightings, "then_compose_async");
    let when_complete = sighting(&sightings, "when_complete_async");
    let handle = sighting(&sightings, "handle_async");
    let exceptionally = sighting(&sightings, "exceptionally_async");
    let inner_engine = engine.clone();
    let done = [
        value.then_accept_async(move |_| then_accept()),
        value.then_run_async(sighting(&sightings, "then_run_async")),
        value.then_compose_async(move |_| {
            then_compose();
            inner_engine.resolved(())
        }),
        value
            .when_complete_async(move |_: Result<&u32, &Failure>| when_complete())
            .then_run(|| ()),
        failure.handle_async(move |_| handle()),
        failure
            .exceptionally_async(move |_| {
                exceptionally();
                0
            })
            .then_run(|| ()),
    ];
    for future in &done {
        future.join().unwrap();
    }
    assert_all_ran_on(&sightings, done.len(), "uni-default-");
}

#[test]
fn uni_async_on_variants_run_on_the_given_executor() {
    let engine = inline_engine();
    let executor = named_pool("uni-explicit-");
    let sightings = Sightings::default();
    let value = engine.resolved(2_u32);
    let failure = engine.failed::<u32>(Failure::msg("upstream"));

    let then_accept = sighting(&sightings, "then_accept_async_on");
    let then_compose = sighting(&sightings, "then_compose_async_on");
    let when_complete = sighting(&sightings, "when_complete_async_on");
    let handle = sighting(&sightings, "handle_async_on");
    let exceptionally = sighting(&sightings, "exceptionally_async_on");
    let inner_engine = engine.clone();
    let done = [
        value.then_accept_async_on(move |_| then_accept(), &executor),
        value.then_run_async_on(sighting(&sightings, "then_run_async_on"), &executor),
        value.then_compose_async_on(
            move |_| {
                then_compose();
                inner_engine.resolved(())
            },
            &executor,
        ),
        value
            .when_complete_async_on(move |_: Result<&u32, &Failure>| when_complete(), &executor)
            .then_run(|| ()),
        failure.handle_async_on(move |_| handle(), &executor),
        failure
            .exceptionally_async_on(
                move |_| {
                    exceptionally();
                    0
                },
                &executor,
            )
            .then_run(|| ()),
    ];
    for future in &done {
        future.join().unwrap();
    }
    assert_all_ran_on(&sightings, done.len(), "uni-explicit-");
}

#[test]
fn pair_async_variants_run_on_the_default_executor() {
    let engine = pool_engine("pair-default-");
    let sightings = Sightings::default();
    let left = engine.resolved(1_u32);
    let right = engine.resolved(2_u32);

    let combine = sighting(&sightings, "then_combine_async");
    let accept_both = sighting(&sightings, "then_accept_both_async");
    let accept_either = sighting(&sightings, "accept_either_async");
    let apply_either = sighting(&sightings, "apply_to_either_async");
    let done = [
        left.then_combine_async(&right, move |_, _| combine()),
        left.then_accept_both_async(&right, move |_, _| accept_both()),
        left.run_after_both_async(&right, sighting(&sightings, "run_after_both_async")),
        left.apply_to_either_async(&right, move |_| apply_either()),
        left.accept_either_async(&right, move |_| accept_either()),
        left.run_after_either_async(&right, sighting(&sightings, "run_after_either_async")),
    ];
    for future in &done {
        future.join().unwrap();
    }
    assert_all_ran_on(&sightings, done.len(), "pair-default-");
}

#[test]
fn pair_async_on_variants_run_on_the_given_executor() {
    let engine = inline_engine();
    let executor = named_pool("pair-explicit-");
    let sightings = Sightings::default();
    let left = engine.resolved(1_u32);
    let right = engine.resolved(2_u32);

    let combine = sighting(&sightings, "then_combine_async_on");
    let accept_both = sighting(&sightings, "then_accept_both_async_on");
    let accept_either = sighting(&sightings, "accept_either_async_on");
    let apply_either = sighting(&sightings, "apply_to_either_async_on");
    let done = [
        left.then_combine_async_on(&right, move |_, _| combine(), &executor),
        left.then_accept_both_async_on(&right, move |_, _| accept_both(), &executor),
        left.run_after_both_async_on(
            &right,
            sighting(&sightings, "run_after_both_async_on"),
            &executor,
        ),
        left.apply_to_either_async_on(&right, move |_| apply_either(), &executor),
        left.accept_either_async_on(&right, move |_| accept_either(), &executor),
        left.run_after_either_async_on(
            &right,
            sighting(&sightings, "run_after_either_async_on"),
            &executor,
        ),
    ];
    for future in &done {
        future.join().unwrap();
    }
    assert_all_ran_on(&sightings, done.len(), "pair-explicit-");
}

#[test]
fn failures_short_circuit_without_dispatching() {
    let engine = inline_engine();
    let counting = Arc::new(CountingExecutor::default());
    let executor: ExecutorHandle = counting.clone();
    let value = engine.resolved(1_u32);
    let failure = engine.failed::<u32>(Failure::msg("upstream"));
    let pending = engine.incomplete::<u32>();
    let calls = counter();
    let call = || {
        let calls = Arc::clone(&calls);
        move || {
            calls.fetch_add(1, Ordering::Relaxed);
        }
    };

    let applied = {
        let call = call();
        failure.then_apply_async_on(
            move |value| {
                call();
                value
            },
            &executor,
        )
    };
    let recovered = {
        let call = call();
        value.exceptionally_async_on(
            move |_| {
                call();
                0
            },
            &executor,
        )
    };
    let raced = {
        let call = call();
        failure.apply_to_either_async_on(
            &pending,
            move |value| {
                call();
                value
            },
            &executor,
        )
    };
    let combined = {
        let call = call();
        failure.then_combine_async_on(
            &pending,
            move |a, b| {
                call();
                a + b
            },
            &executor,
        )
    };

    assert!(applied.join().unwrap_err().cause().to_string().contains("upstream"));
    assert_eq!(recovered.join().unwrap(), 1);
    assert!(raced.join().unwrap_err().cause().to_string().contains("upstream"));
    assert!(combined.join().unwrap_err().cause().to_string().contains("upstream"));
    assert_eq!(counting.0.load(Ordering::Relaxed), 0);
    assert_eq!(calls.load(Ordering::Relaxed), 0);

    value.then_apply_async_on(|value| value + 1, &executor).join().unwrap();
    assert_eq!(counting.0.load(Ordering::Relaxed), 1);
}

#[test]
fn then_apply_skips_function_on_failure() {
    let engine = inline_engine();
    let calls = counter();
    let upstream = engine.failed::<u32>(Failure::msg("upstream"));
    let downstream = {
        let calls = Arc::clone(&calls);
        upstream.then_apply(move |value| {
            calls.fetch_add(1, Ordering::Relaxed);
            value
        })
    };
    let err = downstream.join().unwrap_err();
    assert!(err.cause().to_string().contains("upstream"));
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn panicking_continuation_only_fails_downstream() {
    let engine = inline_engine();
    let upstream = engine.resolved(1_u32);
    let downstream = upstream.then_apply(|_| -> u32 { panic!("bad transform") });
    assert!(matches!(
        downstream.join(),
        Err(CompletionError::Failed(Failure::Panicked(_)))
    ));
    assert_eq!(upstream.join().unwrap(), 1);
}

#[test]
fn then_accept_and_then_run_discard_results() {
    let engine = inline_engine();
    let result = Arc::new(Mutex::new(String::new()));
    let accepted = {
        let result = Arc::clone(&result);
        engine
            .resolved("thenAccept message")
            .then_accept(move |value| result.lock().unwrap().push_str(value))
    };
    accepted.join().unwrap();
    assert_eq!(*result.lock().unwrap(), "thenAccept message");

    let runs = counter();
    let ran = {
        let runs = Arc::clone(&runs);
        engine.resolved(1_u8).then_run(move || {
            runs.fetch_add(1, Ordering::Relaxed);
        })
    };
    ran.join().unwrap();
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn then_compose_flattens_nested_futures() {
    let engine = pool_engine("compose-pool-");
    let inner_engine = engine.clone();
    let future = engine
        .supply_async(|| "message".to_owned())
        .then_compose(move |value| {
            inner_engine.supply_async(move || format!("{value} composed").to_uppercase())
        });
    assert_eq!(future.join().unwrap(), "MESSAGE COMPOSED");
}

#[test]
fn then_compose_propagates_nested_failure() {
    let engine = inline_engine();
    let nested = engine.incomplete::<u32>();
    let future = {
        let nested = nested.clone();
        engine.resolved(1_u32).then_compose_async(move |_| nested)
    };
    assert!(!future.is_done());
    nested.complete_exceptionally(Failure::msg("nested"));
    assert!(future.join().unwrap_err().cause().to_string().contains("nested"));

    let cancelled = engine.incomplete::<u32>();
    let future = {
        let cancelled = cancelled.clone();
        engine.resolved(1_u32).then_compose(move |_| cancelled)
    };
    cancelled.cancel();
    assert!(future.join().unwrap_err().cause().is_cancellation());
}

#[test]
fn then_combine_joins_two_independent_computations() {
    let engine = pool_engine("combine-pool-");
    let left = delayed(&engine, 30, "message".to_owned());
    let right = delayed(&engine, 10, 2_usize);
    let combined = left.then_combine(&right, |text, times| text.repeat(times));
    assert_eq!(combined.join().unwrap(), "messagemessage");

    let combined = left.then_combine_async(&right, |text, times| text.len() * times);
    assert_eq!(combined.join().unwrap(), 14);
}

#[test]
fn then_combine_fails_without_waiting_for_the_other_side() {
    let engine = inline_engine();
    let left = engine.incomplete::<u32>();
    let right = engine.incomplete::<u32>();
    let calls = counter();
    let combined = {
        let calls = Arc::clone(&calls);
        left.then_combine(&right, move |a, b| {
            calls.fetch_add(1, Ordering::Relaxed);
            a + b
        })
    };

    left.complete_exceptionally(Failure::msg("left failed"));
    let err = combined.get_timeout(Duration::from_secs(1)).unwrap_err();
    match err {
        ExecutionError::Execution(cause) => assert!(cause.to_string().contains("left failed")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!right.is_done());

    right.complete(1);
    assert_eq!(calls.load(Ordering::Relaxed), 0);
}

#[test]
fn accept_both_and_run_after_both_wait_for_both() {
    let engine = inline_engine();
    let left = engine.incomplete::<u32>();
    let right = engine.incomplete::<&'static str>();
    let seen = Arc::new(Mutex::new(None));
    let accepted = {
        let seen = Arc::clone(&seen);
        left.then_accept_both(&right, move |a, b| *seen.lock().unwrap() = Some(format!("{b}{a}")))
    };
    let runs = counter();
    let ran = {
        let runs = Arc::clone(&runs);
        left.run_after_both(&right, move || {
            runs.fetch_add(1, Ordering::Relaxed);
        })
    };

    right.complete("n=");
    assert!(!accepted.is_done());
    assert!(!ran.is_done());
    left.complete(3);
    accepted.join().unwrap();
    ran.join().unwrap();
    assert_eq!(seen.lock().unwrap().as_deref(), Some("n=3"));
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn apply_to_either_uses_the_first_to_resolve() {
    let engine = inline_engine();
    let left = engine.incomplete::<u32>();
    let right = engine.incomplete::<u32>();
    let calls = counter();
    let either = {
        let calls = Arc::clone(&calls);
        left.apply_to_either(&right, move |value| {
            calls.fetch_add(1, Ordering::Relaxed);
            value * 10
        })
    };

    right.complete(2);
    left.complete(1);
    assert_eq!(either.join().unwrap(), 20);
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn apply_to_either_propagates_a_first_failure() {
    let engine = inline_engine();
    let left = engine.incomplete::<u32>();
    let right = engine.incomplete::<u32>();
    let either = left.apply_to_either(&right, |value| value);
    left.complete_exceptionally(Failure::msg("fast failure"));
    right.complete(5);
    assert!(either.join().unwrap_err().cause().to_string().contains("fast failure"));
}

#[test]
fn apply_to_either_prefers_receiver_when_both_resolved() {
    let engine = inline_engine();
    let left = engine.resolved(1_u32);
    let right = engine.resolved(2_u32);
    assert_eq!(left.apply_to_either(&right, |value| value).join().unwrap(), 1);
    assert_eq!(right.apply_to_either(&left, |value| value).join().unwrap(), 2);
}

#[test]
fn either_race_invokes_function_exactly_once() {
    let engine = pool_engine("race-pool-");
    let calls = counter();
    let fast = delayed(&engine, 10, "fast");
    let slow = delayed(&engine, 300, "slow");
    let either = {
        let calls = Arc::clone(&calls);
        slow.apply_to_either_async(&fast, move |value| {
            calls.fetch_add(1, Ordering::Relaxed);
            value.to_uppercase()
        })
    };
    assert_eq!(either.join().unwrap(), "FAST");
    slow.join().unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 1);
}

#[test]
fn accept_either_and_run_after_either() {
    let engine = inline_engine();
    let left = engine.incomplete::<&'static str>();
    let right = engine.incomplete::<&'static str>();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let accepted = {
        let seen = Arc::clone(&seen);
        left.accept_either(&right, move |value| seen.lock().unwrap().push(value))
    };
    let runs = counter();
    let ran = {
        let runs = Arc::clone(&runs);
        left.run_after_either(&right, move || {
            runs.fetch_add(1, Ordering::Relaxed);
        })
    };

    left.complete("left");
    right.complete("right");
    accepted.join().unwrap();
    ran.join().unwrap();
    assert_eq!(*seen.lock().unwrap(), vec!["left"]);
    assert_eq!(runs.load(Ordering::Relaxed), 1);
}

#[test]
fn all_of_fails_with_the_failing_input_only_once_it_fails() {
    let engine = inline_engine();
    let inputs: Vec<_> = (0..3).map(|_| engine.incomplete::<u32>()).collect();
    let all = engine.all_of(&inputs);

    inputs[0].complete(1);
    inputs[2].complete(3);
    assert!(!all.is_done());

    inputs[1].complete_exceptionally(Failure::msg("c2 failed"));
    let err = all.join().unwrap_err();
    assert!(err.cause().to_string().contains("c2 failed"));
}

#[test]
fn all_of_does_not_cancel_pending_inputs() {
    let engine = inline_engine();
    let inputs: Vec<_> = (0..2).map(|_| engine.incomplete::<u32>()).collect();
    let all = engine.all_of(&inputs);
    inputs[0].complete_exceptionally(Failure::msg("first"));
    assert!(all.is_completed_exceptionally());
    assert!(!inputs[1].is_done());
    assert!(inputs[1].complete(2));
}

#[test]
fn all_of_succeeds_when_every_input_succeeds() {
    let engine = pool_engine("all-pool-");
    let inputs: Vec<_> = (0..8_u64).map(|index| delayed(&engine, index * 5, index)).collect();
    engine.all_of(&inputs).join().unwrap();
    let values: Vec<_> = inputs.iter().map(|input| input.get_now(u64::MAX).unwrap()).collect();
    assert_eq!(values, (0..8).collect::<Vec<_>>());

    let none: Vec<CompletableFuture<u64>> = Vec::new();
    assert!(engine.all_of(&none).is_done());
}

#[test]
fn any_of_resolves_with_the_first_input() {
    let engine = pool_engine("any-pool-");
    let started = Instant::now();
    let inputs = [delayed(&engine, 100, "x"), delayed(&engine, 500, "y")];
    let any = engine.any_of(&inputs);
    assert_eq!(any.join().unwrap(), "x");
    assert!(started.elapsed() < Duration::from_millis(450));

    inputs[1].join().unwrap();
    assert_eq!(any.join().unwrap(), "x");
}

#[test]
fn any_of_propagates_a_first_failure() {
    let engine = inline_engine();
    let inputs: Vec<_> = (0..2).map(|_| engine.incomplete::<u32>()).collect();
    let any = engine.any_of(&inputs);
    inputs[1].complete_exceptionally(Failure::msg("first"));
    inputs[0].complete(1);
    assert!(any.join().unwrap_err().cause().to_string().contains("first"));

    let none: Vec<CompletableFuture<u32>> = Vec::new();
    assert!(!engine.any_of(&none).is_done());
}

#[test]
fn ratings_pipeline_composes_all_of_and_join() {
    #[derive(Debug, Clone, PartialEq)]
    struct Car {
        id: u32,
        manufacturer: u32,
        rating: f32,
    }

    fn rating(engine: &Engine, manufacturer: u32) -> CompletableFuture<f32> {
        engine
            .supply_async(move || match manufacturer {
                2 => 4.0,
                3 => 4.1,
                7 => 4.2,
                13 => panic!("no rating"),
                _ => 5.0,
            })
            .exceptionally(|_| -1.0)
    }

    let engine = pool_engine("cars-pool-");
    let cars = engine.supply_async(|| {
        [(1, 3), (2, 7), (3, 2), (4, 13)]
            .map(|(id, manufacturer)| Car { id, manufacturer, rating: 0.0 })
            .to_vec()
    });

    let inner_engine = engine.clone();
    let rated = cars.then_compose(move |cars| {
        let updated: Vec<_> = cars
            .into_iter()
            .map(|mut car| {
                rating(&inner_engine, car.manufacturer).then_apply(move |rating| {
                    car.rating = rating;
                    car
                })
            })
            .collect();
        inner_engine
            .all_of(&updated)
            .then_apply(move |()| updated.iter().map(|car| car.join().unwrap()).collect::<Vec<_>>())
    });

    let ratings: Vec<_> = rated.join().unwrap().into_iter().map(|car| (car.id, car.rating)).collect();
    assert_eq!(ratings, vec![(1, 4.1), (2, 4.2), (3, 4.0), (4, -1.0)]);
}
