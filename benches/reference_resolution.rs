//! Resolution benchmark: whole-value substitution and string interpolation
//! against a populated execution context.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::json;

use skein::context::ExecutionContext;
use skein::resolver::resolve_value;
use skein::util::intern;

fn populated_context() -> ExecutionContext {
    let ctx = ExecutionContext::new([intern("fetch"), intern("stats")]);
    for (id, output) in [
        (
            "fetch",
            json!({"body": {"items": [{"name": "a"}, {"name": "b"}], "total": 2}}),
        ),
        ("stats", json!({"mean": 4.5, "count": 100})),
    ] {
        ctx.mark_ready(id).unwrap();
        ctx.mark_running(id).unwrap();
        ctx.complete_success(id, output, None, Duration::ZERO).unwrap();
    }
    ctx
}

fn bench_resolution(c: &mut Criterion) {
    let ctx = populated_context();
    let input = json!({"user": "bench"});

    let whole = json!("<fetch.body.items[1].name>");
    c.bench_function("resolve_whole_reference", |b| {
        b.iter(|| resolve_value(black_box(&whole), &ctx, &input).unwrap())
    });

    let interpolated = json!("user <input.user>: <stats.count> rows, mean <stats.mean>");
    c.bench_function("resolve_interpolated_string", |b| {
        b.iter(|| resolve_value(black_box(&interpolated), &ctx, &input).unwrap())
    });

    let nested = json!({
        "url": "https://api.test/<fetch.body.total>",
        "payload": {"items": "<fetch.body.items>", "stats": "<stats>"},
        "plain": {"a": 1, "b": [true, "text"]}
    });
    c.bench_function("resolve_nested_config", |b| {
        b.iter(|| resolve_value(black_box(&nested), &ctx, &input).unwrap())
    });

    let no_refs = json!("a plain string with no references at all");
    c.bench_function("resolve_plain_string", |b| {
        b.iter(|| resolve_value(black_box(&no_refs), &ctx, &input).unwrap())
    });
}

criterion_group!(benches, bench_resolution);
criterion_main!(benches);
