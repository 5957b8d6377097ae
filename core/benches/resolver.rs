//! Plan resolution cost on layered DAGs.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lineflow_core::executor::StepGraph;
use lineflow_core::{WorkflowDefinition, WorkflowStep};

/// `layers` x `width` steps; every step depends on two steps of the previous layer.
fn layered(layers: usize, width: usize) -> WorkflowDefinition {
    let mut def = WorkflowDefinition::new("bench");
    for layer in 0..layers {
        for i in 0..width {
            let mut step = WorkflowStep::new(format!("l{layer}s{i}"), "echo");
            if layer > 0 {
                step = step
                    .depends_on(format!("l{}s{}", layer - 1, i))
                    .depends_on(format!("l{}s{}", layer - 1, (i + 1) % width));
            }
            def = def.with_step(step);
        }
    }
    def
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    for (layers, width) in [(10, 10), (50, 20), (100, 50)] {
        let def = layered(layers, width);
        group.bench_with_input(
            BenchmarkId::from_parameter(layers * width),
            &def,
            |b, def| {
                b.iter(|| {
                    let graph = StepGraph::from_definition(black_box(def)).unwrap();
                    graph.resolve().unwrap()
                })
            },
        );
    }
    group.finish();
}

fn bench_validate(c: &mut Criterion) {
    let def = layered(50, 20);
    let graph = StepGraph::from_definition(&def).unwrap();
    c.bench_function("validate_1000", |b| b.iter(|| black_box(&graph).validate().unwrap()));
}

criterion_group!(benches, bench_resolve, bench_validate);
criterion_main!(benches);
