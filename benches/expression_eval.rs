//! Benchmarks the expression engine's three entry points in isolation from
//! the executor — condition evaluation, arithmetic, and interpolation.
//!
//! Bodies are intentionally non-foldable (the loop runs a variable mutation
//! through the store on every iteration) so the measured time reflects
//! repeated runtime evaluation rather than a single constant computation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipegraph::{apply_mutation, evaluate_condition, interpolate, VarType, VariableStore};

fn store_with(defs: &[&str]) -> VariableStore {
    let mut store = VariableStore::new();
    for d in defs {
        store.parse_definition(d).unwrap();
    }
    store
}

fn bench_condition_eval(c: &mut Criterion) {
    let store = store_with(&["%iCounter=0", "%iLimit=1000"]);
    c.bench_function("evaluate_condition__integer_comparison", |b| {
        b.iter(|| black_box(evaluate_condition(&store, "%iCounter<%iLimit")));
    });
}

fn bench_arithmetic_mutation_loop(c: &mut Criterion) {
    c.bench_function("apply_mutation__increment_1000", |b| {
        b.iter(|| {
            let mut store = store_with(&["%iTotal=0"]);
            for _ in 0..1000 {
                apply_mutation(&mut store, "%iTotal++").unwrap();
            }
            black_box(store.get("%iTotal").cloned());
        });
    });
}

fn bench_mutation_assignment_with_arithmetic(c: &mut Criterion) {
    c.bench_function("apply_mutation__scaled_assignment_1000", |b| {
        b.iter(|| {
            let mut store = store_with(&["%iA=2", "%iB=3", "%iOut=0"]);
            for _ in 0..1000 {
                apply_mutation(&mut store, "%iOut=%iA+%iB*2").unwrap();
            }
            black_box(store.get("%iOut").cloned());
        });
    });
}

fn bench_interpolate_template(c: &mut Criterion) {
    let mut store = store_with(&["%iK=0"]);
    store.define("%sLabel", VarType::String).unwrap();
    c.bench_function("interpolate__mutation_then_substitution", |b| {
        b.iter(|| {
            black_box(interpolate(&mut store, "count={%iK++} label=[%sLabel]"));
        });
    });
}

criterion_group!(
    benches,
    bench_condition_eval,
    bench_arithmetic_mutation_loop,
    bench_mutation_assignment_with_arithmetic,
    bench_interpolate_template
);
criterion_main!(benches);
