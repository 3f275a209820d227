//! Benchmark for pool acquire/release cycles.
//!
//! TARGET: an acquire + release pair well under a microsecond
//!
//! Run with: cargo bench --package tidepool_pool --bench pool_benchmark

#![allow(missing_docs)]

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tidepool_pool::{HostError, Instantiate, PoolArgs, PoolEngine, PrefabProducer};

struct Spark {
    position: [f32; 3],
    active: bool,
}

struct Scene;

impl Instantiate for Scene {
    type Template = [f32; 3];
    type Instance = Spark;
    type Parent = ();

    fn instantiate(&self, template: &[f32; 3], _parent: &()) -> Result<Spark, HostError> {
        Ok(Spark {
            position: *template,
            active: true,
        })
    }

    fn set_active(&self, instance: &mut Spark, active: bool) {
        instance.active = active;
    }

    fn set_parent(&self, _instance: &mut Spark, _parent: &()) {}

    fn destroy(&self, _instance: Spark) {}

    fn root(&self) {}
}

fn engine(amount: usize) -> PoolEngine<PrefabProducer<Scene>> {
    let mut engine = PoolEngine::new(PrefabProducer::new(Scene));
    engine
        .create_pool(
            PoolArgs::new("sparks", amount, [0.0; 3]).on_return(|spark: &mut Spark| {
                spark.position = [0.0; 3];
            }),
        )
        .unwrap();
    engine
}

fn bench_acquire_release(c: &mut Criterion) {
    let engine = engine(1024);

    c.bench_function("acquire_release_cycle", |b| {
        b.iter(|| {
            let spark = engine.acquire(black_box("sparks")).unwrap();
            engine.release("sparks", spark).unwrap();
        });
    });
}

fn bench_burst(c: &mut Criterion) {
    let engine = engine(1024);
    let mut group = c.benchmark_group("burst");
    group.throughput(Throughput::Elements(256));

    group.bench_function("acquire_256_release_256", |b| {
        b.iter(|| {
            let held: Vec<Spark> = (0..256)
                .map(|_| engine.acquire("sparks").unwrap())
                .collect();
            for spark in held {
                engine.release("sparks", black_box(spark)).unwrap();
            }
        });
    });
    group.finish();
}

fn bench_try_acquire_empty(c: &mut Criterion) {
    let engine = engine(0);

    c.bench_function("try_acquire_empty", |b| {
        b.iter(|| black_box(engine.try_acquire("sparks").unwrap().is_null()));
    });
}

criterion_group!(
    benches,
    bench_acquire_release,
    bench_burst,
    bench_try_acquire_empty
);
criterion_main!(benches);
