//! Core scheduler behavior: tasks, optional points, actors, and strategies.

#[macro_use]
mod common;

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use common::*;
use lockstep::runtime::context;
use lockstep::sync::{Mutex, Signal};
use lockstep::{
    ErrorKind, HaltEvent, Runtime, SchedulingPolicy, StateMachineBuilder, StrategyKind,
    TestConfig,
};

#[derive(Debug)]
struct E;
#[derive(Debug)]
struct F;
#[derive(Debug)]
struct G;
#[derive(Debug)]
struct Ping;
#[derive(Debug)]
struct Config {
    value: u32,
}

/// Two tasks increment an atomic with an optional point between the load
/// and the store.
fn racy_increments(runtime: &Runtime, suppressed: bool) {
    let counter = Arc::new(AtomicU32::new(0));
    let tasks: Vec<_> = (0..2)
        .map(|_| {
            let counter = Arc::clone(&counter);
            runtime.spawn(move || {
                if suppressed {
                    context::suppress();
                }
                let seen = counter.load(Ordering::SeqCst);
                context::interleave();
                counter.store(seen + 1, Ordering::SeqCst);
                if suppressed {
                    context::resume();
                }
            })
        })
        .collect();
    for task in tasks {
        task.join();
    }
    let total = counter.load(Ordering::SeqCst);
    runtime.assert(total == 2, "lost update");
}

#[test]
fn interleave_exposes_race() {
    init_test_logging();
    test_phase!("interleave_exposes_race");
    run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "lost update", |runtime| {
        racy_increments(runtime, false);
    });
    test_complete!("interleave_exposes_race");
}

#[test]
fn suppression_hides_optional_points() {
    init_test_logging();
    let report = run_expecting_success(dfs_config(), |runtime| racy_increments(runtime, true));
    assert!(report.exhausted, "{report}");
}

#[test]
fn suppression_shrinks_the_search_space() {
    init_test_logging();
    let body = |suppressed: bool| {
        move |runtime: &Runtime| {
            let task = runtime.spawn(|| {});
            if suppressed {
                context::suppress();
            }
            for _ in 0..3 {
                runtime.interleave();
            }
            if suppressed {
                context::resume();
            }
            task.join();
        }
    };
    let open = run_expecting_success(dfs_config(), body(false));
    let closed = run_expecting_success(dfs_config(), body(true));
    assert!(open.exhausted && closed.exhausted);
    assert_with_log!(
        closed.iterations < open.iterations,
        "suppressed points are not explored",
        open.iterations,
        closed.iterations
    );
}

#[test]
fn join_returns_task_result() {
    init_test_logging();
    run_expecting_success(dfs_config(), |runtime| {
        let task = runtime.spawn(|| 21 * 2);
        let value = task.join();
        runtime.assert(value == 42, "wrong join value");
    });
}

#[test]
fn panicking_task_is_an_assertion_failure() {
    init_test_logging();
    run_expecting_bug(
        dfs_config(),
        ErrorKind::AssertionFailure,
        "Op(1) panicked: boom",
        |runtime| {
            let task = runtime.spawn(|| panic!("boom"));
            task.join();
        },
    );
}

#[test]
fn hooks_report_systematic_policy_inside_a_run() {
    init_test_logging();
    assert_eq!(context::scheduling_policy(), SchedulingPolicy::Production);
    run_expecting_success(dfs_config(), |runtime| {
        runtime.assert(
            context::scheduling_policy() == SchedulingPolicy::Systematic,
            "policy inside a run",
        );
        runtime.assert(context::current_operation().is_some(), "current operation");
    });
}

#[test]
fn lost_update_under_mutex_found_by_every_strategy() {
    init_test_logging();
    let body = |runtime: &Runtime| {
        let counter = Arc::new(Mutex::new(0_u32));
        let tasks: Vec<_> = (0..2)
            .map(|_| {
                let counter = Arc::clone(&counter);
                runtime.spawn(move || {
                    let seen = *counter.lock();
                    *counter.lock() = seen + 1;
                })
            })
            .collect();
        for task in tasks {
            task.join();
        }
        runtime.assert(*counter.lock() == 2, "lost update");
    };
    for kind in [StrategyKind::Dfs, StrategyKind::Random, StrategyKind::Priority] {
        test_section!(kind.as_str());
        let config = TestConfig::new(kind)
            .iterations(1_000)
            .max_steps(100)
            .seed(DEFAULT_TEST_SEED);
        run_expecting_bug(config, ErrorKind::AssertionFailure, "lost update", body);
    }
}

#[test]
fn send_wakes_idle_actor() {
    init_test_logging();
    struct Counter {
        pings: u32,
        done: Arc<Signal>,
    }
    let def = StateMachineBuilder::<Counter>::new("Counter")
        .state("Init", |s| {
            s.start().on_event_do::<Ping, _>(|counter, cx| {
                counter.pings += 1;
                if counter.pings == 3 {
                    cx.goto_state("Done");
                }
            })
        })
        .state("Done", |s| s.on_entry(|counter, _| counter.done.notify()))
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let done = Arc::new(Signal::new());
        let actor = runtime.create_machine(
            &def,
            Counter {
                pings: 0,
                done: Arc::clone(&done),
            },
        );
        for _ in 0..3 {
            runtime.send_event(actor, Ping);
        }
        done.wait();
        runtime.assert(runtime.pending_events(actor) == 0, "mailbox drained");
    });
}

#[test]
fn push_and_pop_run_entry_and_exit() {
    init_test_logging();
    test_phase!("push_and_pop_run_entry_and_exit");
    struct Log {
        lines: Vec<&'static str>,
        done: Arc<Signal>,
    }
    let def = StateMachineBuilder::<Log>::new("Stack")
        .state("Init", |s| {
            s.start()
                .on_event_push::<E>("Pushed")
                .on_event_do::<G, _>(|log, cx| {
                    log.lines.push("G");
                    cx.assert(cx.current_state() == "Init", "G handled below the top");
                    cx.assert(
                        log.lines == ["enter", "exit", "enter", "exit", "G"],
                        "unexpected entry/exit order",
                    );
                    log.done.notify();
                })
        })
        .state("Pushed", |s| {
            s.on_entry(|log, _| log.lines.push("enter"))
                .on_exit(|log, _| log.lines.push("exit"))
                .on_event_do::<F, _>(|_, cx| cx.pop_state())
        })
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let done = Arc::new(Signal::new());
        let actor = runtime.create_machine(
            &def,
            Log {
                lines: Vec::new(),
                done: Arc::clone(&done),
            },
        );
        runtime.send_event(actor, E);
        runtime.send_event(actor, F);
        runtime.send_event(actor, E);
        runtime.send_event(actor, G);
        done.wait();
    });
    test_complete!("push_and_pop_run_entry_and_exit");
}

#[test]
fn unhandled_event_is_reported() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Strict")
        .state("Init", |s| s.start())
        .build()
        .expect("valid machine");
    run_expecting_bug(
        dfs_config(),
        ErrorKind::UnhandledEvent,
        "Machine 'Strict(1)' received event 'E' that cannot be handled.",
        move |runtime| {
            let actor = runtime.create_machine(&def, ());
            runtime.send_event(actor, E);
        },
    );
}

#[test]
fn unhandled_event_can_be_ignored() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Lenient")
        .state("Init", |s| s.start())
        .ignore_unhandled()
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let actor = runtime.create_machine(&def, ());
        runtime.send_event(actor, E);
    });
}

#[test]
fn halted_actor_drops_later_events() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Strict")
        .state("Init", |s| s.start())
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let actor = runtime.create_machine(&def, ());
        runtime.send_event(actor, HaltEvent);
        runtime.send_event(actor, E);
    });
}

#[test]
fn halt_from_an_action_stops_the_actor() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Stopper")
        .state("Init", |s| s.start().on_event_do::<F, _>(|_, cx| cx.halt()))
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let actor = runtime.create_machine(&def, ());
        runtime.send_event(actor, F);
        runtime.send_event(actor, E);
    });
}

#[test]
fn initial_event_reaches_start_entry() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Configured")
        .state("Init", |s| {
            s.start().on_entry(|_, cx| {
                let value = cx.received_event::<Config>().map(|c| c.value);
                cx.assert(value == Some(7), "initial event missing");
            })
        })
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        runtime.create_machine_with_event(&def, (), Config { value: 7 });
    });
}

#[test]
fn second_transition_in_one_action_is_rejected() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Greedy")
        .state("Init", |s| {
            s.start().on_entry(|_, cx| {
                cx.goto_state("A");
                cx.goto_state("B");
            })
        })
        .state("A", |s| s)
        .state("B", |s| s)
        .build()
        .expect("valid machine");
    run_expecting_bug_kind(dfs_config(), ErrorKind::AssertionFailure, move |runtime| {
        runtime.create_machine(&def, ());
    });
}

#[test]
fn actor_creates_and_messages_a_peer() {
    init_test_logging();
    struct Server {
        seen: Arc<AtomicU32>,
    }
    let server = StateMachineBuilder::<Server>::new("Server")
        .state("Init", |s| {
            s.start().on_event_do::<Ping, _>(|server, _| {
                server.seen.fetch_add(1, Ordering::SeqCst);
            })
        })
        .build()
        .expect("valid server");
    let client = StateMachineBuilder::<Arc<AtomicU32>>::new("Client")
        .state("Init", move |s| {
            let server = Arc::clone(&server);
            s.start().on_entry(move |seen, cx| {
                let peer = cx.create_machine(
                    &server,
                    Server {
                        seen: Arc::clone(seen),
                    },
                );
                cx.send_event(peer, Ping);
            })
        })
        .build()
        .expect("valid client");
    let report = run_expecting_success(dfs_config(), move |runtime| {
        runtime.create_machine(&client, Arc::new(AtomicU32::new(0)));
    });
    assert!(report.exhausted, "{report}");
}

#[test]
fn primitives_schedule_before_and_after_their_effect() {
    init_test_logging();
    test_phase!("primitives_schedule_before_and_after_their_effect");
    // Acquire before, acquire after, release after.
    let bug = run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "stop", |runtime| {
        let mutex = Mutex::new(0_u32);
        *mutex.lock() += 1;
        runtime.assert(false, "stop");
    });
    assert_eq!(bug.trace.len(), 3, "{:?}", bug.trace);

    // Notify before and after, wait before and after.
    let bug = run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "stop", |runtime| {
        let signal = Signal::new();
        signal.notify();
        signal.wait();
        runtime.assert(false, "stop");
    });
    assert_eq!(bug.trace.len(), 4, "{:?}", bug.trace);

    // A failed try_lock is still bracketed by two points.
    let bug = run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "stop", |runtime| {
        let mutex = Mutex::new(0_u32);
        let held = mutex.lock();
        let attempt = mutex.try_lock();
        runtime.assert(attempt.is_err(), "try_lock succeeded");
        drop(held);
        runtime.assert(false, "stop");
    });
    assert_eq!(bug.trace.len(), 5, "{:?}", bug.trace);
    test_complete!("primitives_schedule_before_and_after_their_effect");
}

#[derive(Debug)]
struct R;

#[test]
fn goto_out_of_pushed_state_keeps_the_state_below() {
    init_test_logging();
    test_phase!("goto_out_of_pushed_state_keeps_the_state_below");
    let def = StateMachineBuilder::<Arc<Signal>>::new("Symmetric")
        .state("Init", |s| {
            s.start()
                .on_entry(|_, cx| cx.raise_event(F))
                .on_event_goto::<F>("Mid")
                .on_event_do::<G, _>(|_, cx| cx.assert(false, "G reached the start state"))
        })
        .state("Mid", |s| {
            s.on_event_push::<E>("Pushed")
                .on_event_do::<G, _>(|done, cx| {
                    cx.assert(cx.current_state() == "Mid", "G handled above Mid");
                    done.notify();
                })
        })
        .state("Pushed", |s| {
            s.on_entry(|_, cx| cx.raise_event(R))
                .on_event_goto::<R>("Replaced")
        })
        .state("Replaced", |s| s)
        .build()
        .expect("valid machine");
    run_expecting_success(dfs_config(), move |runtime| {
        let done = Arc::new(Signal::new());
        let actor = runtime.create_machine(&def, Arc::clone(&done));
        runtime.send_event(actor, E);
        runtime.send_event(actor, G);
        done.wait();
    });
    test_complete!("goto_out_of_pushed_state_keeps_the_state_below");
}
