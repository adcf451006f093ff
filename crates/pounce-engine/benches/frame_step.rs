//! Compile and frame-step throughput.
//!
//! - `compile`: compiling projects with a growing number of sprites
//! - `frame_step`: one frame with every sprite running a yielding loop

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;

use pounce_engine::{Engine, HeadlessHost, PlayerOptions, Project, compile_project};

/// A sprite that counts and moves forever, yielding every iteration.
fn busy_sprite(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "variables": {"count": ["count", 0]},
        "blocks": {
            "hat": {"opcode": "event_whenflagclicked", "next": "loop", "topLevel": true},
            "loop": {
                "opcode": "control_forever",
                "parent": "hat",
                "inputs": {"SUBSTACK": [2, "inc"]}
            },
            "inc": {
                "opcode": "data_changevariableby",
                "parent": "loop",
                "next": "move",
                "inputs": {"VALUE": [1, [4, "1"]]},
                "fields": {"VARIABLE": ["count", "count"]}
            },
            "move": {
                "opcode": "motion_movesteps",
                "parent": "inc",
                "next": "turn",
                "inputs": {"STEPS": [1, [4, "3"]]}
            },
            "turn": {
                "opcode": "motion_turnright",
                "parent": "move",
                "inputs": {"DEGREES": [1, [4, "7"]]}
            }
        }
    })
}

fn project(sprites: usize) -> Project {
    let mut targets = vec![json!({"name": "Stage", "isStage": true})];
    targets.extend((0..sprites).map(|i| busy_sprite(&format!("Sprite{i}"))));
    serde_json::from_value(json!({ "targets": targets })).expect("valid project")
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");
    for sprites in [1, 10, 100] {
        let project = project(sprites);
        group.throughput(Throughput::Elements(sprites as u64));
        group.bench_with_input(BenchmarkId::from_parameter(sprites), &project, |b, project| {
            b.iter(|| compile_project(black_box(project)).expect("compiles"));
        });
    }
    group.finish();
}

fn bench_frame_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_step");
    for sprites in [1, 10, 100] {
        let project = project(sprites);
        let options = PlayerOptions { seed: Some(1), ..Default::default() };
        let mut engine =
            Engine::new(&project, options, Box::new(HeadlessHost::new())).expect("loads");
        engine.green_flag();

        group.throughput(Throughput::Elements(sprites as u64));
        group.bench_function(BenchmarkId::from_parameter(sprites), |b| {
            b.iter(|| engine.step().expect("steps"));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_frame_step);
criterion_main!(benches);
