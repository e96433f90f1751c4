use async_reduce::{Config, Reducer, ThreadPoolInner};
use std::time::Instant;
use tokio::runtime::Builder;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let rt = Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
        .unwrap();

    rt.block_on(async {
        let pool = ThreadPoolInner::with_config(Config::default()).unwrap();
        let reducer = Reducer::with_pool(pool.clone());

        let values: Vec<u64> = (0..5_000_000).collect();
        let now = Instant::now();
        let max = reducer
            .maximum(num_cpus::get(), values, |a, b| a.cmp(b))
            .await
            .unwrap();
        println!("maximum: {:?}, elapsed: {:?}", max, now.elapsed());

        let metrics = pool.metrics();
        println!(
            "submitted: {}, completed: {}, success rate: {:.1}%",
            metrics.total_submitted,
            metrics.completed_tasks,
            metrics.success_rate() * 100.0
        );

        pool.close().await;
    });
}
