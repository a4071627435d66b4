//! Grouped states: qualified names, group-relative targets, and replay of a
//! monitor assertion reached through a chain of raised events.

#[macro_use]
mod common;

use std::sync::Arc;

use common::*;
use lockstep::{
    ErrorKind, MachineDefinition, MonitorDefinition, Runtime, StateMachineBuilder, TestEngine,
};

#[derive(Debug)]
struct E;

struct Safety;

fn raise_e<M>(_: &mut M, cx: &mut lockstep::Context<'_>) {
    cx.raise_event(E);
}

fn machine() -> Arc<MachineDefinition<()>> {
    StateMachineBuilder::<()>::new("M")
        .group("States1", |g| {
            g.state("S1", |s| s.start().on_entry(raise_e).on_event_goto::<E>("S2"))
                .state("S2", |s| s.on_entry(raise_e).on_event_goto::<E>("States2.S1"))
        })
        .group("States2", |g| {
            g.state("S1", |s| s.on_entry(raise_e).on_event_goto::<E>("S2"))
                .state("S2", |s| {
                    s.on_entry(|_, cx| cx.monitor::<Safety, E>(E))
                })
        })
        .build()
        .expect("valid machine")
}

fn safety() -> Arc<MonitorDefinition<Safety>> {
    StateMachineBuilder::<Safety>::new("Safety")
        .group("States1", |g| {
            g.state("S1", |s| s.start().on_event_goto::<E>("S2"))
                .state("S2", |s| s.on_entry(raise_e).on_event_goto::<E>("States2.S1"))
        })
        .group("States2", |g| {
            g.state("S1", |s| s.on_entry(raise_e).on_event_goto::<E>("S2"))
                .state("S2", |s| s.on_entry(|_, cx| cx.assert_true(false)))
        })
        .build_monitor()
        .expect("valid monitor")
}

fn group_test() -> impl Fn(&Runtime) + Clone + Send + Sync + 'static {
    let machine = machine();
    let safety = safety();
    move |runtime: &Runtime| {
        runtime.register_monitor(&safety, Safety);
        runtime.create_machine(&machine, ());
    }
}

#[test]
fn states_carry_group_qualified_names() {
    init_test_logging();
    let def = machine();
    let states: Vec<&str> = def.states().collect();
    assert_eq!(
        states,
        vec!["States1.S1", "States1.S2", "States2.S1", "States2.S2"]
    );
    assert_eq!(def.start_state(), "States1.S1");
    assert!(def.handles::<E>("States2.S1"));
    assert!(!def.handles::<E>("States2.S2"));
}

#[test]
fn monitor_assertion_is_found_and_replays() {
    init_test_logging();
    test_phase!("monitor_assertion_is_found_and_replays");
    let test = group_test();
    let bug = run_expecting_bug(
        dfs_config(),
        ErrorKind::AssertionFailure,
        "Detected an assertion failure.",
        test.clone(),
    );

    test_section!("replay");
    let engine = TestEngine::new(dfs_config()).expect("valid config");
    let replayed = engine.replay(&bug.trace, test);
    let again = replayed.first_bug().expect("replay reproduces the bug");
    assert_eq!(again.kind(), ErrorKind::AssertionFailure);
    assert_eq!(again.message(), "Detected an assertion failure.");
    assert_eq!(again.trace, bug.trace);
    test_complete!("monitor_assertion_is_found_and_replays");
}

#[test]
fn relative_target_prefers_own_group() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Relative")
        .state("Init", |s| s.start().on_entry(raise_e).on_event_goto::<E>("Inner.Go"))
        .state("Done", |s| s.on_entry(|_, cx| cx.assert(false, "top-level Done")))
        .group("Inner", |g| {
            g.state("Go", |s| s.on_entry(raise_e).on_event_goto::<E>("Done"))
                .state("Done", |s| s.on_entry(|_, cx| cx.assert(false, "Inner.Done")))
        })
        .build()
        .expect("valid machine");
    run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "Inner.Done", move |runtime| {
        runtime.create_machine(&def, ());
    });
}

#[test]
fn nested_groups_fall_back_to_outer_scope() {
    init_test_logging();
    let def = StateMachineBuilder::<()>::new("Nested")
        .group("Outer", |g| {
            g.state("Target", |s| s.on_entry(|_, cx| cx.assert(false, "Outer.Target")))
                .group("Inner", |g| {
                    g.state("Init", |s| {
                        s.start().on_entry(raise_e).on_event_goto::<E>("Target")
                    })
                })
        })
        .build()
        .expect("valid machine");
    assert_eq!(def.start_state(), "Outer.Inner.Init");
    run_expecting_bug(dfs_config(), ErrorKind::AssertionFailure, "Outer.Target", move |runtime| {
        runtime.create_machine(&def, ());
    });
}

#[test]
fn monitor_state_is_observable() {
    init_test_logging();
    let safety = StateMachineBuilder::<Safety>::new("Safety")
        .state("Idle", |s| s.start().on_event_goto::<E>("Seen"))
        .state("Seen", |s| s)
        .build_monitor()
        .expect("valid monitor");
    run_expecting_success(dfs_config(), move |runtime| {
        assert!(!runtime.has_monitor::<Safety>());
        runtime.register_monitor(&safety, Safety);
        assert_eq!(runtime.monitor_state::<Safety>().as_deref(), Some("Idle"));
        runtime.monitor::<Safety, E>(E);
        assert_eq!(runtime.monitor_state::<Safety>().as_deref(), Some("Seen"));
    });
}

#[test]
fn registering_a_monitor_twice_is_rejected() {
    init_test_logging();
    let safety = StateMachineBuilder::<Safety>::new("Safety")
        .state("Idle", |s| s.start())
        .build_monitor()
        .expect("valid monitor");
    run_expecting_bug(
        dfs_config(),
        ErrorKind::Configuration,
        "Monitor 'Safety' is already registered.",
        move |runtime| {
            runtime.register_monitor(&safety, Safety);
            runtime.register_monitor(&safety, Safety);
        },
    );
}

#[test]
fn monitors_cannot_push() {
    init_test_logging();
    let err = StateMachineBuilder::<Safety>::new("Pushy")
        .state("Init", |s| s.start().on_event_push::<E>("Other"))
        .state("Other", |s| s)
        .build_monitor()
        .expect_err("monitors cannot push");
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
