use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use crossbeam::queue::SegQueue;
use tokio::{sync::Notify, task::JoinHandle, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    batch::BatchBuffer,
    errors::{panic_message, BatchError, PoolError, TaskError},
    model::PoolMetrics,
};

/// Конфигурация пула воркеров
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: num_cpus::get(),
        }
    }
}

impl Config {
    pub fn cpu_bound() -> Self {
        Self {
            num_threads: num_cpus::get(),
        }
    }

    pub fn io_bound() -> Self {
        Self {
            num_threads: num_cpus::get() * 2,
        }
    }
}

/// Задача батча: замыкание, владеющее входным значением, индексом слота
/// и ссылкой на буфер своего батча.
pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

pub type ThreadPool = Arc<ThreadPoolInner>;

#[inline(always)]
fn unlikely(b: bool) -> bool {
    #[cold]
    fn cold() {}
    if !b {
        cold()
    }
    b
}

/// Пул с фиксированным набором долгоживущих воркеров и общей FIFO-очередью.
///
/// Число воркеров задается при конструировании и не меняется за время жизни
/// пула. Батчи от разных вызывающих перемешиваются в одной очереди, но буфер
/// результатов у каждого батча свой, поэтому параллельные батчи не портят
/// друг друга.
pub struct ThreadPoolInner {
    queue: SegQueue<Task>,
    global_notify: Notify,
    cancellation_token: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    idle_workers: AtomicUsize,
    queued_tasks: AtomicUsize,
    total_submitted: AtomicUsize,
    completed_tasks: Arc<AtomicUsize>,
    failed_tasks: Arc<AtomicUsize>,
    config: Config,
}

impl ThreadPoolInner {
    /// Создает пул с `num_threads` воркерами. Нулевое число потоков
    /// отклоняется до запуска чего бы то ни было.
    pub fn new(num_threads: usize) -> Result<ThreadPool, PoolError> {
        Self::with_config(Config { num_threads })
    }

    pub fn with_config(config: Config) -> Result<ThreadPool, PoolError> {
        if config.num_threads == 0 {
            return Err(PoolError::ZeroThreads);
        }

        let pool = Arc::new(ThreadPoolInner {
            queue: SegQueue::new(),
            global_notify: Notify::new(),
            cancellation_token: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
            idle_workers: AtomicUsize::new(0),
            queued_tasks: AtomicUsize::new(0),
            total_submitted: AtomicUsize::new(0),
            completed_tasks: Arc::new(AtomicUsize::new(0)),
            failed_tasks: Arc::new(AtomicUsize::new(0)),
            config,
        });

        // Запускаем воркеры; каждый сразу встает в ожидание на очереди
        let mut workers = pool.workers.lock().unwrap();
        for id in 0..pool.config.num_threads {
            let worker = Arc::clone(&pool);
            workers.push(tokio::spawn(async move { worker.worker_loop(id).await }));
        }
        drop(workers);

        Ok(pool)
    }

    #[inline(always)]
    fn push_task(&self, task: Task) {
        self.queued_tasks.fetch_add(1, Ordering::Relaxed);
        self.total_submitted.fetch_add(1, Ordering::Relaxed);
        self.queue.push(task);

        if unlikely(self.idle_workers.load(Ordering::Relaxed) > 0) {
            self.global_notify.notify_one();
        }
    }

    async fn worker_loop(&self, id: usize) {
        debug!(worker = id, "worker started");
        'outer: loop {
            if self.cancellation_token.is_cancelled() {
                break;
            }

            match self.queue.pop() {
                Some(task) => {
                    self.queued_tasks.fetch_sub(1, Ordering::Relaxed);
                    task();
                    tokio::task::yield_now().await;
                }
                None => {
                    self.idle_workers.fetch_add(1, Ordering::Release);

                    for _ in 0..2 {
                        if !self.queue.is_empty() {
                            self.idle_workers.fetch_sub(1, Ordering::Acquire);
                            continue 'outer;
                        }
                        std::hint::spin_loop();
                    }

                    tokio::select! {
                        _ = self.global_notify.notified() => {
                            self.idle_workers.fetch_sub(1, Ordering::Acquire);
                        }
                        _ = self.cancellation_token.cancelled() => {
                            self.idle_workers.fetch_sub(1, Ordering::Acquire);
                            break 'outer;
                        }
                    }
                }
            }
        }
        debug!(worker = id, "worker stopped");
    }

    /// Применяет `f` к каждому элементу на воркерах пула и возвращает
    /// результаты строго в порядке входа, независимо от порядка завершения.
    ///
    /// Паника на отдельном элементе не прерывает остальных: батч всегда
    /// досчитывается целиком, после чего все перехваченные сбои отдаются
    /// одним `BatchError` вместе с частичным буфером результатов. Если пул
    /// закрыли во время ожидания (или до вызова), возвращается то, что
    /// успело посчитаться, с флагом `shutdown`.
    pub async fn map<T, R, F>(&self, f: F, items: Vec<T>) -> Result<Vec<R>, BatchError<R>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let total = items.len();
        let f = Arc::new(f);
        let buffer = Arc::new(BatchBuffer::new(total));
        trace!(batch = total, "batch submitted");

        for (index, value) in items.into_iter().enumerate() {
            let f = Arc::clone(&f);
            let buffer = Arc::clone(&buffer);
            let completed = Arc::clone(&self.completed_tasks);
            let failed = Arc::clone(&self.failed_tasks);

            self.push_task(Box::new(move || {
                match panic::catch_unwind(AssertUnwindSafe(|| (*f)(value))) {
                    Ok(result) => {
                        completed.fetch_add(1, Ordering::Relaxed);
                        buffer.fulfill(index, result);
                    }
                    Err(payload) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        buffer.fail(TaskError::Panic {
                            index,
                            message: panic_message(payload),
                        });
                    }
                }
            }));
        }

        buffer.wait(&self.cancellation_token).await;

        let (slots, failures, complete) = buffer.drain();
        if complete && failures.is_empty() {
            Ok(slots
                .into_iter()
                .map(|slot| slot.expect("complete batch leaves no empty slot"))
                .collect())
        } else {
            if !complete {
                warn!(
                    finished = slots.iter().filter(|slot| slot.is_some()).count() + failures.len(),
                    total, "pool closed before batch completion"
                );
            }
            Err(BatchError {
                completed: slots,
                failures,
                shutdown: !complete,
            })
        }
    }

    /// Останавливает воркеры после их текущей задачи, будит ожидающих на
    /// пустой очереди и дожидается завершения каждого воркера. Задачи,
    /// оставшиеся в очереди, не запускаются; ожидающие батчи получают
    /// частичный результат.
    pub async fn close(&self) {
        debug!("pool shutdown requested");
        self.cancellation_token.cancel();
        self.global_notify.notify_waiters();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for worker in workers {
            let _ = worker.await;
        }
        debug!("pool shutdown complete");
    }

    /// `close` с верхней границей ожидания; false значит воркеры не уложились.
    pub async fn close_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.close()).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    #[inline]
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            workers: self.config.num_threads,
            idle_workers: self.idle_workers.load(Ordering::Relaxed),
            queued_tasks: self.queued_tasks.load(Ordering::Relaxed),
            total_submitted: self.total_submitted.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
        }
    }

    /// Мониторинг метрик с callback
    /// ВАЖНО: Вызовите token.cancel() для остановки мониторинга и освобождения памяти
    pub fn start_monitoring<F>(
        self: &Arc<Self>,
        interval: Duration,
        callback: F,
    ) -> CancellationToken
    where
        F: Fn(PoolMetrics) + Send + 'static,
    {
        let pool = Arc::clone(self);
        let token = CancellationToken::new();
        let token_clone = token.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        callback(pool.metrics());
                    }
                    _ = token_clone.cancelled() => {
                        drop(pool);
                        break;
                    }
                }
            }
        });

        token
    }

    /// Остановить мониторинг и дропнуть все ссылки
    pub fn stop_monitoring(token: CancellationToken) {
        token.cancel();
    }
}
