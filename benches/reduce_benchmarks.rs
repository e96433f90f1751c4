use async_reduce::{pool::ThreadPoolInner, reduce::Reducer};
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: Накладные расходы батча против последовательного прохода
fn bench_batch_map(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_map");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));

        group.bench_with_input(BenchmarkId::new("pool_map", size), &size, |b, &size| {
            let rt = create_runtime();
            let pool = rt.block_on(async { ThreadPoolInner::new(num_cpus::get()).unwrap() });
            let data: Vec<u64> = (0..size).collect();

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                let data = data.clone();
                async move {
                    let results = pool.map(|x: u64| black_box(x * 2), data).await.unwrap();
                    black_box(results);
                }
            });
        });

        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, &size| {
            let data: Vec<u64> = (0..size).collect();
            b.iter(|| {
                let results: Vec<u64> = data.iter().map(|x| black_box(x * 2)).collect();
                black_box(results);
            });
        });
    }

    group.finish();
}

// Benchmark 2: Масштабирование maximum по числу разделов
fn bench_maximum_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("maximum_scaling");
    group.sample_size(20);

    let size = 100_000u64;
    group.throughput(Throughput::Elements(size));

    for threads in [1usize, 2, 4, 8] {
        if threads <= num_cpus::get() * 2 {
            group.bench_with_input(
                BenchmarkId::new("threads", threads),
                &threads,
                |b, &threads| {
                    let rt = create_runtime();
                    let pool =
                        rt.block_on(async { ThreadPoolInner::new(num_cpus::get()).unwrap() });
                    let reducer = Reducer::with_pool(pool);
                    let data: Vec<u64> = (0..size).collect();

                    b.to_async(&rt).iter(|| {
                        let reducer = &reducer;
                        let data = data.clone();
                        async move {
                            let max = reducer
                                .maximum(threads, data, |a, b| a.cmp(b))
                                .await
                                .unwrap();
                            black_box(max);
                        }
                    });
                },
            );
        }
    }

    group.finish();
}

// Benchmark 3: Общий пул против одноразовых потоков на раздел
fn bench_pool_vs_ephemeral(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_vs_ephemeral");
    group.sample_size(20);

    let size = 100_000i64;
    group.throughput(Throughput::Elements(size as u64));
    let data: Vec<i64> = (0..size).collect();

    group.bench_function("with_pool", |b| {
        let rt = create_runtime();
        let pool = rt.block_on(async { ThreadPoolInner::new(num_cpus::get()).unwrap() });
        let reducer = Reducer::with_pool(pool);
        let data = data.clone();

        b.to_async(&rt).iter(|| {
            let reducer = &reducer;
            let data = data.clone();
            async move {
                let evens = reducer
                    .filter(num_cpus::get(), data, |v: &i64| v % 2 == 0)
                    .await
                    .unwrap();
                black_box(evens);
            }
        });
    });

    group.bench_function("ephemeral_threads", |b| {
        let rt = create_runtime();
        let reducer = Reducer::new();
        let data = data.clone();

        b.to_async(&rt).iter(|| {
            let reducer = &reducer;
            let data = data.clone();
            async move {
                let evens = reducer
                    .filter(num_cpus::get(), data, |v: &i64| v % 2 == 0)
                    .await
                    .unwrap();
                black_box(evens);
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_batch_map,
    bench_maximum_scaling,
    bench_pool_vs_ephemeral,
);

criterion_main!(benches);
