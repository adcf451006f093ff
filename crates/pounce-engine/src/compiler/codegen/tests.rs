//! Tests for the block compiler.

use super::*;
use crate::compiler::ir::{BinaryOp, Listing, LooksOp, MotionOp, Reg, VarRef};
use serde_json::json;

fn sprite(blocks: serde_json::Value) -> TargetData {
    serde_json::from_value(json!({
        "name": "Cat",
        "variables": {"v1": ["n", 0]},
        "costumes": [{"name": "idle"}, {"name": "walk"}],
        "sounds": [{"name": "meow"}],
        "blocks": blocks,
    }))
    .expect("valid target")
}

fn compile_source(target: &TargetData) -> Result<ScriptTable> {
    Compiler::new(target, None).compile()
}

fn compile_ok(target: &TargetData) -> ScriptTable {
    compile_source(target).expect("Compilation should succeed")
}

fn flag_script(first: &str) -> serde_json::Value {
    json!({"opcode": "event_whenflagclicked", "next": first, "topLevel": true})
}

fn change_n(next: Option<&str>) -> serde_json::Value {
    json!({
        "opcode": "data_changevariableby",
        "next": next,
        "fields": {"VARIABLE": ["n", "v1"]},
        "inputs": {"VALUE": [1, [4, "1"]]}
    })
}

fn entry(table: &ScriptTable, key: &EventKey) -> LabelId {
    table.listeners(key)[0]
}

#[test]
fn test_compiler_default() {
    let mut compiler = Compiler::default();
    let table = compiler.compile().expect("empty stage compiles");
    assert_eq!(table.script_count(), 0);
}

#[test]
fn test_straight_line_script_is_one_continuation() {
    let target = sprite(json!({
        "hat": flag_script("say"),
        "say": {"opcode": "looks_say", "inputs": {"MESSAGE": [1, [10, "hi"]]}}
    }));
    let table = compile_ok(&target);
    assert_eq!(table.continuations.len(), 1);
    let body = &table.continuations[entry(&table, &EventKey::GreenFlag).index()].body;
    assert_eq!(
        body,
        &vec![
            Stmt::Looks(LooksOp::Say { message: Expr::text("hi"), think: false }),
            Stmt::Return,
        ]
    );
}

#[test]
fn test_repeat_yields_per_iteration() {
    let target = sprite(json!({
        "hat": flag_script("loop"),
        "loop": {
            "opcode": "control_repeat",
            "inputs": {"TIMES": [1, [6, "3"]], "SUBSTACK": [2, "body"]}
        },
        "body": change_n(None)
    }));
    let table = compile_ok(&target);
    assert_eq!(table.continuations.len(), 2);

    let first = &table.continuations[0].body;
    assert_eq!(first[0], Stmt::Save);
    assert_eq!(first[1], Stmt::SetRegister(Reg::Count, Expr::number(3.0)));
    let Stmt::If { then, otherwise, .. } = &first[2] else {
        panic!("expected the loop test, got {:?}", first[2]);
    };
    assert_eq!(then.last(), Some(&Stmt::Queue(LabelId(1))));
    assert_eq!(otherwise, &vec![Stmt::Restore]);

    // The loop continuation re-tests the counter and then falls through.
    let resumed = &table.continuations[1].body;
    assert!(matches!(resumed[0], Stmt::If { .. }));
    assert_eq!(resumed.last(), Some(&Stmt::Return));
}

#[test]
fn test_warp_procedure_uses_native_loop() {
    let target = sprite(json!({
        "def": {
            "opcode": "procedures_definition",
            "next": "loop",
            "topLevel": true,
            "inputs": {"custom_block": [1, "proto"]}
        },
        "proto": {
            "opcode": "procedures_prototype",
            "shadow": true,
            "mutation": {
                "proccode": "spin",
                "argumentids": "[]",
                "argumentnames": "[]",
                "warp": "true"
            }
        },
        "loop": {
            "opcode": "control_repeat",
            "inputs": {"TIMES": [1, [6, "10"]], "SUBSTACK": [2, "body"]}
        },
        "body": change_n(None)
    }));
    let table = compile_ok(&target);
    let procedure = &table.procedures[0];
    assert!(procedure.warp);
    let body = &table.continuations[procedure.entry.index()].body;
    assert!(matches!(body[0], Stmt::Repeat { .. }));
    assert_eq!(body[1], Stmt::EndCall);
    assert_eq!(table.continuations.len(), 1);
}

#[test]
fn test_wait_inside_warp_still_yields() {
    let target = sprite(json!({
        "def": {
            "opcode": "procedures_definition",
            "next": "loop",
            "topLevel": true,
            "inputs": {"custom_block": [1, "proto"]}
        },
        "proto": {
            "opcode": "procedures_prototype",
            "shadow": true,
            "mutation": {"proccode": "pause", "warp": true}
        },
        "loop": {
            "opcode": "control_forever",
            "inputs": {"SUBSTACK": [2, "wait"]}
        },
        "wait": {"opcode": "control_wait", "inputs": {"DURATION": [1, [5, "1"]]}}
    }));
    let table = compile_ok(&target);
    let listing = table
        .continuations
        .iter()
        .map(|c| Listing(&c.body).to_string())
        .collect::<String>();
    assert!(listing.contains("force_queue"));
    assert!(!listing.contains("forever"));
}

#[test]
fn test_call_binds_arguments_by_position() {
    let target = sprite(json!({
        "hat": flag_script("call"),
        "call": {
            "opcode": "procedures_call",
            "inputs": {"b": [1, [10, "second"]], "a": [1, [10, "first"]]},
            "mutation": {"proccode": "pair %s %s", "argumentids": "[\"a\",\"b\"]"}
        },
        "def": {
            "opcode": "procedures_definition",
            "topLevel": true,
            "inputs": {"custom_block": [1, "proto"]}
        },
        "proto": {
            "opcode": "procedures_prototype",
            "shadow": true,
            "mutation": {
                "proccode": "pair %s %s",
                "argumentids": "[\"a\",\"b\"]",
                "argumentnames": "[\"x\",\"y\"]"
            }
        }
    }));
    let table = compile_ok(&target);
    let body = &table.continuations[entry(&table, &EventKey::GreenFlag).index()].body;
    let Stmt::Call { procedure, args, resume } = &body[0] else {
        panic!("expected a call, got {:?}", body[0]);
    };
    assert_eq!(table.procedures[procedure.index()].params, vec!["x", "y"]);
    assert_eq!(args, &vec![Expr::text("first"), Expr::text("second")]);
    assert_eq!(table.continuations[resume.index()].body, vec![Stmt::Return]);
}

#[test]
fn test_argument_reporter_resolves_position() {
    let target = sprite(json!({
        "def": {
            "opcode": "procedures_definition",
            "next": "set",
            "topLevel": true,
            "inputs": {"custom_block": [1, "proto"]}
        },
        "proto": {
            "opcode": "procedures_prototype",
            "shadow": true,
            "mutation": {
                "proccode": "store %s %s",
                "argumentids": "[\"a\",\"b\"]",
                "argumentnames": "[\"x\",\"y\"]"
            }
        },
        "set": {
            "opcode": "data_setvariableto",
            "fields": {"VARIABLE": ["n", "v1"]},
            "inputs": {"VALUE": [3, "arg", [10, ""]]}
        },
        "arg": {"opcode": "argument_reporter_string_number", "fields": {"VALUE": ["y", null]}}
    }));
    let table = compile_ok(&target);
    let body = &table.continuations[table.procedures[0].entry.index()].body;
    assert_eq!(body[0], Stmt::SetVariable { var: VarRef::local("n"), value: Expr::Argument(1) });
}

#[test]
fn test_undefined_procedure_is_noop() {
    let target = sprite(json!({
        "hat": flag_script("call"),
        "call": {"opcode": "procedures_call", "mutation": {"proccode": "missing"}}
    }));
    let table = compile_ok(&target);
    assert_eq!(table.continuations[0].body, vec![Stmt::Return]);
}

#[test]
fn test_stop_this_script_inside_procedure_ends_call() {
    let target = sprite(json!({
        "def": {
            "opcode": "procedures_definition",
            "next": "stop",
            "topLevel": true,
            "inputs": {"custom_block": [1, "proto"]}
        },
        "proto": {"opcode": "procedures_prototype", "shadow": true, "mutation": {"proccode": "quit"}},
        "stop": {"opcode": "control_stop", "fields": {"STOP_OPTION": ["this script", null]}}
    }));
    let table = compile_ok(&target);
    assert_eq!(table.continuations[0].body, vec![Stmt::EndCall]);
}

#[test]
fn test_unknown_opcode_is_skipped() {
    let target = sprite(json!({
        "hat": flag_script("odd"),
        "odd": {"opcode": "music_playDrumForBeats", "next": "next"},
        "next": change_n(None)
    }));
    let table = compile_ok(&target);
    let body = &table.continuations[0].body;
    assert_eq!(body.len(), 2);
    assert!(matches!(body[0], Stmt::ChangeVariable { .. }));
}

#[test]
fn test_missing_input_uses_default() {
    let target = sprite(json!({
        "hat": flag_script("move"),
        "move": {"opcode": "motion_movesteps"}
    }));
    let table = compile_ok(&target);
    assert_eq!(
        table.continuations[0].body[0],
        Stmt::Motion(MotionOp::Move(Expr::number(0.0)))
    );
}

#[test]
fn test_costume_name_folds_to_index() {
    let target = sprite(json!({
        "hat": flag_script("switch"),
        "switch": {"opcode": "looks_switchcostumeto", "inputs": {"COSTUME": [1, "menu"]}},
        "menu": {"opcode": "looks_costume", "shadow": true, "fields": {"COSTUME": ["walk", null]}}
    }));
    let table = compile_ok(&target);
    assert_eq!(
        table.continuations[0].body[0],
        Stmt::Looks(LooksOp::SwitchCostume(Expr::number(2.0)))
    );
}

#[test]
fn test_reporters_are_cast_to_slot_type() {
    let target = sprite(json!({
        "hat": flag_script("move"),
        "move": {"opcode": "motion_movesteps", "inputs": {"STEPS": [3, "join", [4, "10"]]}},
        "join": {
            "opcode": "operator_join",
            "inputs": {"STRING1": [1, [10, "1"]], "STRING2": [1, [10, "2"]]}
        }
    }));
    let table = compile_ok(&target);
    let Stmt::Motion(MotionOp::Move(steps)) = &table.continuations[0].body[0] else {
        panic!("expected a move");
    };
    assert!(matches!(steps, Expr::Cast(InputType::Number, _)));
}

#[test]
fn test_turn_left_negates_literal() {
    let target = sprite(json!({
        "hat": flag_script("turn"),
        "turn": {"opcode": "motion_turnleft", "inputs": {"DEGREES": [1, [8, "15"]]}}
    }));
    let table = compile_ok(&target);
    assert_eq!(
        table.continuations[0].body[0],
        Stmt::Motion(MotionOp::Turn(Expr::number(-15.0)))
    );
}

#[test]
fn test_arithmetic_reporter() {
    let target = sprite(json!({
        "hat": flag_script("set"),
        "set": {
            "opcode": "data_setvariableto",
            "fields": {"VARIABLE": ["n", "v1"]},
            "inputs": {"VALUE": [3, "add", [10, ""]]}
        },
        "add": {
            "opcode": "operator_add",
            "inputs": {"NUM1": [1, [4, "2"]], "NUM2": [1, [4, "abc"]]}
        }
    }));
    let table = compile_ok(&target);
    let Stmt::SetVariable { value, .. } = &table.continuations[0].body[0] else {
        panic!("expected an assignment");
    };
    assert_eq!(
        value,
        &Expr::Binary {
            op: BinaryOp::Add,
            lhs: Box::new(Expr::number(2.0)),
            rhs: Box::new(Expr::number(0.0)),
        }
    );
}

#[test]
fn test_listeners_per_event() {
    let target = sprite(json!({
        "a": {
            "opcode": "event_whenbroadcastreceived",
            "topLevel": true,
            "fields": {"BROADCAST_OPTION": ["Go", "b1"]}
        },
        "b": {"opcode": "event_whenkeypressed", "topLevel": true, "fields": {"KEY_OPTION": ["space", null]}},
        "c": {"opcode": "event_whenbroadcastreceived", "topLevel": true, "fields": {"BROADCAST_OPTION": ["go", "b1"]}},
        "d": {"opcode": "motion_movesteps", "topLevel": true}
    }));
    let table = compile_ok(&target);
    assert_eq!(table.listeners(&EventKey::message("GO")).len(), 2);
    assert_eq!(table.listeners(&EventKey::key(" ")).len(), 1);
    assert_eq!(table.script_count(), 3);
}

#[test]
fn test_cyclic_stack_is_rejected() {
    let target = sprite(json!({
        "hat": flag_script("a"),
        "a": change_n(Some("b")),
        "b": change_n(Some("a"))
    }));
    assert!(matches!(compile_source(&target), Err(Error::Project(_))));
}

#[test]
fn test_substack_containing_its_own_block_is_rejected() {
    let target = sprite(json!({
        "hat": flag_script("loop"),
        "loop": {"opcode": "control_forever", "inputs": {"SUBSTACK": [2, "loop"]}}
    }));
    assert!(matches!(compile_source(&target), Err(Error::Project(_))));
}

#[test]
fn test_reporter_feeding_itself_is_rejected() {
    let target = sprite(json!({
        "hat": flag_script("say"),
        "say": {"opcode": "looks_say", "inputs": {"MESSAGE": [3, "add", [10, ""]]}},
        "add": {"opcode": "operator_add", "inputs": {"NUM1": [3, "add", [4, ""]], "NUM2": [1, [4, "1"]]}}
    }));
    assert!(matches!(compile_source(&target), Err(Error::Project(_))));
}

#[test]
fn test_shared_reporter_is_not_a_cycle() {
    let target = sprite(json!({
        "hat": flag_script("say"),
        "say": {"opcode": "looks_say", "inputs": {"MESSAGE": [3, "add", [10, ""]]}},
        "add": {"opcode": "operator_add", "inputs": {"NUM1": [3, "two", [4, ""]], "NUM2": [3, "two", [4, ""]]}},
        "two": {"opcode": "operator_multiply", "inputs": {"NUM1": [1, [4, "1"]], "NUM2": [1, [4, "2"]]}}
    }));
    compile_ok(&target);
}
