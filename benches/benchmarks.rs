use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;

use serde_json::json;

use apiary::{Factory, Hive, Registrations, Status, StatusConfig};

fn hive_creation_benchmark(c: &mut Criterion) {
    c.bench_function("hive_creation", |b| {
        b.iter(|| {
            let hive: Hive<i32> = Hive::new(black_box(42));
            hive
        });
    });
}

fn hive_read_benchmark(c: &mut Criterion) {
    let hive: Hive<i32> = Hive::new(42);

    c.bench_function("hive_read", |b| {
        b.iter(|| {
            black_box(hive.get());
        });
    });
}

fn hive_write_benchmark(c: &mut Criterion) {
    let hive: Hive<i32> = Hive::new(0);

    c.bench_function("hive_write", |b| {
        let mut i = 0;
        b.iter(|| {
            hive.set(black_box(i));
            i += 1;
        });
    });
}

fn hive_notify_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("hive_notify");
    for subscribers in [1usize, 10, 100] {
        group.bench_with_input(
            BenchmarkId::from_parameter(subscribers),
            &subscribers,
            |b, &subscribers| {
                let hive: Hive<i32> = Hive::new(0);
                for _ in 0..subscribers {
                    hive.subscribe(|n| {
                        black_box(*n);
                    })
                    .detach();
                }
                let mut i = 0;
                b.iter(|| {
                    hive.set(i);
                    i += 1;
                });
            },
        );
    }
    group.finish();
}

fn status_transition_benchmark(c: &mut Criterion) {
    let status: Status<&'static str> = Status::new(StatusConfig::default());

    c.bench_function("status_transition", |b| {
        b.iter(|| {
            status.operation("bench").loading(json!({}));
            status.operation("bench").idle();
        });
    });
}

fn status_primary_benchmark(c: &mut Criterion) {
    let status: Status<&'static str> = Status::new(StatusConfig::default());
    for i in 0..50 {
        status.operation(format!("op{i}")).loading(json!({}));
    }
    status.operation("failed").error(json!({}));

    c.bench_function("status_primary", |b| {
        b.iter(|| {
            black_box(status.primary());
        });
    });
}

fn factory_build_benchmark(c: &mut Criterion) {
    struct Cap(u64);

    c.bench_function("factory_build", |b| {
        b.iter(|| {
            let ctx = Factory::new()
                .install(|_| Ok(Registrations::single(Cap(1))))
                .install(|ctx| {
                    let cap = ctx.get::<Cap>()?;
                    Ok(Registrations::single(black_box(cap.0 + 1)))
                })
                .build()
                .unwrap();
            ctx
        });
    });
}

criterion_group!(
    benches,
    hive_creation_benchmark,
    hive_read_benchmark,
    hive_write_benchmark,
    hive_notify_benchmark,
    status_transition_benchmark,
    status_primary_benchmark,
    factory_build_benchmark
);
criterion_main!(benches);
