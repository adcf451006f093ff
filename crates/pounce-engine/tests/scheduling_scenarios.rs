//! Scheduling scenarios
//!
//! End-to-end checks of how compiled scripts yield, wait and restart across
//! frames, driven through the public `Engine` API with a headless host.

mod common;

use common::*;
use pounce_engine::vm::comparison::{equals, greater_than, less_than};
use pounce_engine::{EventKey, Value, compile_project};
use serde_json::json;

#[test]
fn test_single_move_is_one_continuation_and_finishes() {
    let stage = TargetBuilder::stage();
    let mut cat = TargetBuilder::sprite("Cat");
    cat.script(when_flag(), vec![move_steps(10.0)]);

    let tables = compile_project(&project(&[&stage, &cat])).unwrap();
    assert_eq!(tables[1].continuations.len(), 1);

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.green_flag();
    assert_eq!(engine.runtime().thread_count(), 1);
    engine.step().unwrap();
    assert!(engine.runtime().is_idle());
    let x = engine.runtime().find("Cat").and_then(|t| t.sprite()).map(|s| s.x);
    assert_eq!(x, Some(10.0));
}

#[test]
fn test_broadcast_and_wait_holds_the_caller() {
    let stage = TargetBuilder::stage().variable("n", json!(0));
    let mut cat = TargetBuilder::sprite("Cat");
    let wait_body = cat.stack(vec![broadcast_and_wait("x")]);
    cat.script(when_flag(), vec![repeat(3.0, wait_body)]);
    let listener_body = cat.stack(vec![change_var("n", 1.0)]);
    cat.script(when_received("x"), vec![repeat(2.0, listener_body)]);

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.green_flag();

    steps(&mut engine, 6);
    assert!(!engine.runtime().is_idle());

    steps(&mut engine, 6);
    assert!(!engine.runtime().is_idle());
    assert_eq!(stage_number(&engine, "n"), 6.0);

    engine.step().unwrap();
    assert!(engine.runtime().is_idle());
    assert_eq!(stage_number(&engine, "n"), 6.0);
}

#[test]
fn test_stop_this_script_when_touching_edge() {
    let stage = TargetBuilder::stage().variable("n", json!(0));
    let mut cat = TargetBuilder::sprite("Cat");
    let on_edge = cat.stack(vec![stop("this script")]);
    let touching = cat.touching("_edge_");
    let body = cat.stack(vec![change_var("n", 1.0), if_then(touching, on_edge)]);
    cat.script(when_flag(), vec![forever(body)]);

    let (mut engine, host) = engine(&[&stage, &cat]);
    engine.green_flag();
    steps(&mut engine, 3);
    assert_eq!(engine.runtime().thread_count(), 1);
    assert_eq!(stage_number(&engine, "n"), 3.0);

    host.set_touching("Cat", "_edge_", true);
    engine.step().unwrap();
    assert_eq!(stage_number(&engine, "n"), 4.0);
    assert!(engine.runtime().is_idle());
}

#[test]
fn test_moving_into_the_edge_stops_the_script() {
    let stage = TargetBuilder::stage();
    let mut cat = TargetBuilder::sprite("Cat").with("x", json!(230));
    let on_edge = cat.stack(vec![stop("this script")]);
    let touching = cat.touching("_edge_");
    let body = cat.stack(vec![move_steps(5.0), if_then(touching, on_edge)]);
    cat.script(when_flag(), vec![forever(body)]);

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.green_flag();
    engine.step().unwrap();
    assert!(!engine.runtime().is_idle());
    engine.step().unwrap();
    assert!(engine.runtime().is_idle());
    let x = engine.runtime().find("Cat").and_then(|t| t.sprite()).map(|s| s.x);
    assert_eq!(x, Some(240.0));
}

#[test]
fn test_rebroadcast_restarts_instead_of_duplicating() {
    let stage = TargetBuilder::stage();
    let mut cat = TargetBuilder::sprite("Cat");
    cat.script(when_received("go"), vec![wait(1.0)]);

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.broadcast("go");
    engine.broadcast("go");
    assert_eq!(engine.runtime().thread_count(), 1);

    steps(&mut engine, 2);
    let base = engine.runtime().threads().next().map(|t| t.base);
    engine.broadcast("GO");
    assert_eq!(engine.runtime().thread_count(), 1);
    let thread = engine.runtime().threads().next().unwrap();
    assert_eq!(Some(thread.continuation), base);
}

#[test]
fn test_unknown_opcode_is_skipped() {
    let stage = TargetBuilder::stage().variable("n", json!(0));
    let mut cat = TargetBuilder::sprite("Cat");
    cat.script(
        when_flag(),
        vec![
            change_var("n", 1.0),
            change_var("n", 1.0),
            json!({"opcode": "music_playDrumForBeats"}),
            change_var("n", 1.0),
            change_var("n", 1.0),
        ],
    );

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.green_flag();
    engine.step().unwrap();
    assert_eq!(stage_number(&engine, "n"), 4.0);
    assert!(engine.runtime().is_idle());
}

// ============================================================================
// Properties
// ============================================================================

fn busy_project() -> (TargetBuilder, TargetBuilder) {
    let stage = TargetBuilder::stage().variable("n", json!(0)).costumes(&["day", "night"]);
    let mut cat = TargetBuilder::sprite("Cat");
    let inner = cat.stack(vec![change_var("n", 1.0), wait(0.1)]);
    let touching = cat.touching("Dog");
    let branch = cat.stack(vec![broadcast_and_wait("ping")]);
    cat.script(when_flag(), vec![repeat(4.0, inner), if_then(touching, branch), say(text("done"))]);
    cat.script(when_received("ping"), vec![move_steps(3.0)]);
    (stage, cat)
}

#[test]
fn test_compilation_is_deterministic() {
    let (stage, cat) = busy_project();
    let project = project(&[&stage, &cat]);
    assert_eq!(compile_project(&project).unwrap(), compile_project(&project).unwrap());
}

#[test]
fn test_listing_is_brace_balanced() {
    let (stage, cat) = busy_project();
    let (engine, _host) = engine(&[&stage, &cat]);
    let dump = engine.dump();
    assert!(dump.contains("force_queue"));
    assert_eq!(dump.matches('{').count(), dump.matches('}').count());
}

#[test]
fn test_straight_line_script_runs_in_one_step() {
    let stage = TargetBuilder::stage().variable("n", json!(0)).variable("s", json!(""));
    let mut cat = TargetBuilder::sprite("Cat");
    cat.script(
        when_flag(),
        vec![
            set_var("n", num(5.0)),
            change_var("n", 2.5),
            set_var("s", text("hello")),
            move_steps(4.0),
        ],
    );

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.green_flag();
    assert_eq!(engine.run_until_idle(10).unwrap(), 1);
    assert_eq!(stage_number(&engine, "n"), 7.5);
    assert_eq!(engine.variable(None, "s"), Some(Value::from("hello")));
}

#[test]
fn test_blank_text_never_compares_with_numbers() {
    let blank = Value::from("   ");
    let five = Value::Number(5.0);
    assert_eq!(blank.to_number(), 0.0);
    assert!(!less_than(&blank, &five));
    assert!(!greater_than(&blank, &five));
    assert!(!equals(&blank, &five));
    assert!(less_than(&Value::from("apple"), &Value::from("Banana")));
    assert!(equals(&Value::from("HELLO"), &Value::from("hello")));
}

#[test]
fn test_key_events_include_any_key_listeners() {
    let stage = TargetBuilder::stage().variable("n", json!(0));
    let mut cat = TargetBuilder::sprite("Cat");
    cat.script(when_key("space"), vec![change_var("n", 1.0)]);
    cat.script(when_key("any"), vec![change_var("n", 10.0)]);

    let (mut engine, _host) = engine(&[&stage, &cat]);
    engine.press_key(" ");
    engine.step().unwrap();
    assert_eq!(stage_number(&engine, "n"), 11.0);

    engine.trigger(&EventKey::key("a"));
    engine.step().unwrap();
    assert_eq!(stage_number(&engine, "n"), 21.0);
}
